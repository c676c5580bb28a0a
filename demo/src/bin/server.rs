//! Demo server: seed random floats, fold the minimum.
//!
//! Run this, then point one or more `demo-client` processes at it. On
//! completion (or on Ctrl-C) the server dumps the aggregate and whatever
//! it still owes to timestamped files in the working directory.

use anyhow::Context;
use foreman_server::{Aggregator, FoldError, JobServer, ServerConfig};
use foreman_wire::{AnyCodec, CodecResult, JobValue};

const AUTHKEY: &str = "simple example";
const NUM_ARGS: usize = 10_000;

/// Keep the smallest result seen so far.
struct MinAggregator {
    codec: AnyCodec,
    min: f64,
}

impl Aggregator for MinAggregator {
    fn fold(&mut self, _arg: &JobValue, result: JobValue) -> Result<(), FoldError> {
        let value: f64 = result.decode(&self.codec)?;
        if value < self.min {
            self.min = value;
        }
        Ok(())
    }

    fn finalize(&mut self) {
        tracing::info!(min = self.min, "final result");
    }

    fn snapshot(&self, codec: &AnyCodec) -> CodecResult<JobValue> {
        JobValue::from_serialize(codec, &self.min)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ServerConfig::builder(AUTHKEY).build();
    let aggregate = MinAggregator {
        codec: AnyCodec::default(),
        min: f64::INFINITY,
    };
    let server = JobServer::bind(config, aggregate)
        .await
        .context("bind job server")?;

    for _ in 0..NUM_ARGS {
        server.put_arg(&fastrand::f64()).await?;
    }

    let report = server.run().await?;
    println!(
        "folded {} of {} results ({} leftover, {} failed)",
        report.counters.numresults, report.counters.numjobs, report.leftover_args, report.failures
    );
    Ok(())
}
