//! Demo client: pull arguments and hand them straight back.
//!
//! Usage: `demo-client [host]` (default `localhost`). Exits non-zero
//! only when the server cannot be reached at startup.

use std::process::ExitCode;

use foreman_client::{ClientConfig, JobClient, JobError};
use foreman_wire::JobValue;

const AUTHKEY: &str = "simple example";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let host = std::env::args().nth(1).unwrap_or_else(|| "localhost".to_owned());
    let config = ClientConfig::builder(host, AUTHKEY).build();

    let client = JobClient::new(
        config,
        |arg: &JobValue, _konst: Option<&JobValue>| -> Result<JobValue, JobError> {
            // The identity function: the aggregate is the minimum of the
            // seeded values themselves.
            Ok(arg.clone())
        },
    );

    match client.run().await {
        Ok(report) => {
            println!("processed {} jobs on {} workers", report.jobs_done, report.workers);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("client failed: {e}");
            ExitCode::FAILURE
        }
    }
}
