//! Server dispatcher
//!
//! [`JobServer`] owns the argument ledger, the counters, the queue
//! transport, and the user's aggregate. Life cycle: bind, seed with
//! [`JobServer::put_arg`], then [`JobServer::run`] - which drains the
//! result queue until every outstanding argument has been folded or
//! reported failed, and always finishes with the shutdown sequence:
//! settle, stop the reporter, tear down the transport, finalize, dump.
//!
//! The termination gate is `|ledger| - |fail_q| == 0`: failures are
//! terminal and never hold the loop open.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use foreman_core::{
    filename_timestamp, CounterSnapshot, Counters, Disposition, PeriodicTask, SignalRouter,
    StopFlag,
};
use foreman_wire::{
    write_dump, AnyCodec, CodecResult, JobValue, WireError, DUMP_KIND_AGGREGATE, DUMP_KIND_ARGS,
    DUMP_KIND_FAILURES,
};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::ledger::{ArgumentLedger, Discharge};
use crate::reporter::spawn_reporter;
use crate::transport::{QueueHub, QueueTransport};

/// Error type a user aggregator may return from `fold`.
pub type FoldError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// User-defined result aggregation.
///
/// The dispatcher is polymorphic over this capability set instead of
/// over inheritance: `fold` runs once per incoming result (single
/// writer, inside the drain loop), `finalize` once after the loop, and
/// `snapshot` produces the value persisted as the aggregate dump.
pub trait Aggregator: Send + 'static {
    /// Fold one `(argument, result)` pair into the aggregate.
    fn fold(&mut self, arg: &JobValue, result: JobValue) -> Result<(), FoldError>;

    /// Hook invoked once after the drain loop, before any dump.
    fn finalize(&mut self) {}

    /// Encode the current aggregate for the final-result dump.
    fn snapshot(&self, codec: &AnyCodec) -> CodecResult<JobValue>;
}

/// Default aggregator: collect every `(argument, result)` pair.
#[derive(Debug, Default)]
pub struct PairsAggregator {
    pairs: Vec<(JobValue, JobValue)>,
}

impl PairsAggregator {
    /// The pairs collected so far, in arrival order.
    pub fn pairs(&self) -> &[(JobValue, JobValue)] {
        &self.pairs
    }
}

impl Aggregator for PairsAggregator {
    fn fold(&mut self, arg: &JobValue, result: JobValue) -> Result<(), FoldError> {
        self.pairs.push((arg.clone(), result));
        Ok(())
    }

    fn snapshot(&self, codec: &AnyCodec) -> CodecResult<JobValue> {
        JobValue::from_serialize(codec, &self.pairs)
    }
}

/// Handle for requesting an orderly server shutdown from outside the
/// drain loop - tests, embedding applications, or anything else that
/// wants the signal path's behavior without a signal.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    stop: StopFlag,
}

impl ShutdownHandle {
    /// Request the same orderly shutdown a SIGINT would.
    pub fn shutdown(&self) {
        self.stop.trip();
    }

    /// Has shutdown been requested?
    pub fn is_shutting_down(&self) -> bool {
        self.stop.is_tripped()
    }
}

/// What a finished run looked like.
#[derive(Debug)]
#[non_exhaustive]
pub struct RunReport {
    /// Final counter values
    pub counters: CounterSnapshot,
    /// Results that arrived for arguments not in the ledger
    pub duplicate_results: u64,
    /// Arguments neither folded nor failed (contents of the args dump)
    pub leftover_args: usize,
    /// Failure records drained at shutdown
    pub failures: usize,
    /// True when the run ended on a shutdown request instead of a drain
    pub interrupted: bool,
    /// Where the aggregate dump was written, if it was
    pub aggregate_dump: Option<PathBuf>,
    /// Where the leftover-arguments dump was written, if it was
    pub args_dump: Option<PathBuf>,
    /// Where the failures dump was written, if it was
    pub failures_dump: Option<PathBuf>,
}

enum DrainEnd {
    /// Termination gate opened: nothing outstanding can still succeed.
    Complete,
    /// A shutdown request (signal or handle) ended the loop.
    Interrupted,
    /// The aggregator failed; shutdown still runs.
    Fault(ServerError),
}

/// The job-dispatch server.
pub struct JobServer<A: Aggregator> {
    config: ServerConfig,
    hub: Arc<QueueHub>,
    ledger: ArgumentLedger,
    counters: Arc<Counters>,
    transport: QueueTransport,
    aggregate: A,
    stop: StopFlag,
    owner_pid: u32,
}

impl<A: Aggregator> JobServer<A> {
    /// Bind the queue transport and construct an idle server.
    ///
    /// The transport starts serving immediately; clients may connect and
    /// wait on the job queue while the caller is still seeding.
    pub async fn bind(config: ServerConfig, aggregate: A) -> ServerResult<Self> {
        let hub = QueueHub::new();
        let counters = Arc::new(Counters::new());
        let transport = QueueTransport::bind(
            SocketAddr::new(config.bind_ip, config.port),
            config.authkey.clone(),
            config.codec,
            hub.clone(),
            config.const_args.clone(),
        )
        .await?;

        Ok(Self {
            ledger: ArgumentLedger::new(counters.clone()),
            counters,
            hub,
            transport,
            aggregate,
            stop: StopFlag::new(),
            owner_pid: std::process::id(),
            config,
        })
    }

    /// Address the transport actually listens on (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Shared counters, for embedding external progress consumers.
    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    /// Handle that requests the same orderly shutdown a signal would.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            stop: self.stop.clone(),
        }
    }

    /// Seed one argument: ledger, `numjobs`, and job queue move
    /// together. Seeding the same value twice enqueues it twice; the
    /// caller owns uniqueness if at-most-once-send is wanted.
    pub async fn put_arg<T: Serialize + ?Sized>(&self, arg: &T) -> ServerResult<()> {
        self.put_arg_value(JobValue::from_serialize(&self.config.codec, arg)?)
            .await
    }

    /// Seed one pre-encoded argument (e.g. read back from an args dump).
    pub async fn put_arg_value(&self, arg: JobValue) -> ServerResult<()> {
        self.ledger.register(&arg);
        self.hub
            .job_q
            .try_push(arg)
            .map_err(|_| ServerError::Internal("job queue rejected a seed".to_owned()))?;
        Ok(())
    }

    /// Seed a whole collection.
    pub async fn args_from_iter<T, I>(&self, args: I) -> ServerResult<()>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        for arg in args {
            self.put_arg(&arg).await?;
        }
        Ok(())
    }

    /// Drain results until the termination gate opens, then run the
    /// shutdown sequence. The sequence runs on every exit path - clean
    /// drain, shutdown request, or aggregator fault - so the dumps always
    /// reflect what is still owed.
    pub async fn run(mut self) -> ServerResult<RunReport> {
        if std::process::id() != self.owner_pid {
            return Err(ServerError::precondition(
                "run() must be called by the process that bound the server",
            ));
        }
        let seeded = self.counters.numjobs();
        let outstanding = self.ledger.len() as u64;
        if seeded != outstanding {
            return Err(ServerError::precondition(format!(
                "seed arguments through put_arg: numjobs = {seeded} but the ledger holds {outstanding}"
            )));
        }

        // Interrupt/terminate convert to an orderly exit here; the
        // transport serving task ignores both and is torn down last.
        let router = SignalRouter::install(
            Disposition::Exit(self.stop.clone()),
            Disposition::Exit(self.stop.clone()),
        )?;

        let reporter = if self.config.verbose > 0 && !self.config.no_status_bar {
            match spawn_reporter(self.counters.clone(), self.config.msg_interval) {
                Ok(reporter) => Some(reporter),
                Err(e) => {
                    warn!(error = %e, "status report unavailable");
                    None
                }
            }
        } else {
            None
        };

        info!(numjobs = seeded, "processing incoming results");
        let mut duplicate_results = 0u64;
        let drain = self.drain_loop(&mut duplicate_results).await;

        match &drain {
            DrainEnd::Complete => {
                debug!(
                    "termination gate open, settling {:?} for in-flight results",
                    self.config.settle_delay
                );
                tokio::time::sleep(self.config.settle_delay).await;
            }
            DrainEnd::Interrupted => {
                info!("shutdown requested, preparing dumps");
            }
            DrainEnd::Fault(e) => {
                error!(error = %e, "drain loop failed, preparing graceful shutdown");
            }
        }
        router.dismantle();

        let interrupted = matches!(drain, DrainEnd::Interrupted);
        let (report, dump_error) = self
            .shutdown_sequence(reporter, duplicate_results, interrupted)
            .await;

        if let DrainEnd::Fault(e) = drain {
            return Err(e);
        }
        match dump_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    async fn drain_loop(&mut self, duplicate_results: &mut u64) -> DrainEnd {
        let mut stop = self.stop.listen();
        loop {
            let pending = self.ledger.len().saturating_sub(self.hub.fail_q.len());
            if pending == 0 {
                return DrainEnd::Complete;
            }
            let popped = tokio::select! {
                _ = stop.tripped() => return DrainEnd::Interrupted,
                popped = self.hub.result_q.pop_timeout(self.config.result_poll) => popped,
            };
            let Some((arg, result)) = popped else { continue };
            match self.ledger.discharge(&arg) {
                Discharge::Removed => {
                    if let Err(e) = self.aggregate.fold(&arg, result) {
                        return DrainEnd::Fault(ServerError::aggregate(e));
                    }
                    let pending = self.ledger.len().saturating_sub(self.hub.fail_q.len()) as u64;
                    self.counters
                        .advance_results_to(self.counters.numjobs().saturating_sub(pending));
                }
                Discharge::NotOutstanding => {
                    *duplicate_results += 1;
                    warn!(?arg, "result for an argument not in the ledger, ignoring");
                }
            }
        }
    }

    /// The always-run tail: stop the reporter, tear down the transport,
    /// finalize, and write the three dumps. Dump failures are collected
    /// rather than short-circuiting, so a full disk on one file still
    /// leaves the others written.
    async fn shutdown_sequence(
        self,
        reporter: Option<PeriodicTask>,
        duplicate_results: u64,
        interrupted: bool,
    ) -> (RunReport, Option<ServerError>) {
        let Self {
            config,
            hub,
            ledger,
            counters,
            transport,
            mut aggregate,
            ..
        } = self;

        if let Some(reporter) = reporter {
            reporter.stop().await;
        }
        transport.shutdown(config.transport_shutdown_wait).await;

        aggregate.finalize();

        let stamp = filename_timestamp();
        let mut first_error: Option<ServerError> = None;

        let aggregate_dump = config
            .dump_aggregate
            .resolve(&config.dump_dir, DUMP_KIND_AGGREGATE, &stamp)
            .and_then(|path| {
                let written = aggregate
                    .snapshot(&config.codec)
                    .map_err(WireError::from)
                    .and_then(|value| {
                        write_dump(&config.codec, &path, DUMP_KIND_AGGREGATE, &value)
                    });
                match written {
                    Ok(()) => {
                        info!(path = %path.display(), "aggregate dumped");
                        Some(path)
                    }
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "aggregate dump failed");
                        first_error.get_or_insert(ServerError::dump(&path, e));
                        None
                    }
                }
            });

        // Drain failures first: an argument that failed stays in the
        // ledger, but it belongs to the failures dump, not the args dump.
        let failures = hub.fail_q.drain();
        let failed_args: HashSet<&JobValue> = failures.iter().map(|record| &record.arg).collect();
        let leftovers: Vec<JobValue> = ledger
            .snapshot()
            .into_iter()
            .filter(|arg| !failed_args.contains(arg))
            .collect();

        let args_dump = if leftovers.is_empty() {
            None
        } else {
            config
                .dump_args
                .resolve(&config.dump_dir, DUMP_KIND_ARGS, &stamp)
                .and_then(|path| {
                    match write_dump(&config.codec, &path, DUMP_KIND_ARGS, &leftovers) {
                        Ok(()) => {
                            info!(
                                path = %path.display(),
                                count = leftovers.len(),
                                "unprocessed arguments dumped"
                            );
                            Some(path)
                        }
                        Err(e) => {
                            error!(path = %path.display(), error = %e, "args dump failed");
                            first_error.get_or_insert(ServerError::dump(&path, e));
                            None
                        }
                    }
                })
        };

        let failures_dump = if failures.is_empty() {
            None
        } else {
            config
                .dump_failures
                .resolve(&config.dump_dir, DUMP_KIND_FAILURES, &stamp)
                .and_then(|path| {
                    match write_dump(&config.codec, &path, DUMP_KIND_FAILURES, &failures) {
                        Ok(()) => {
                            info!(
                                path = %path.display(),
                                count = failures.len(),
                                "failure records dumped"
                            );
                            Some(path)
                        }
                        Err(e) => {
                            error!(path = %path.display(), error = %e, "failures dump failed");
                            first_error.get_or_insert(ServerError::dump(&path, e));
                            None
                        }
                    }
                })
        };

        info!("job server shut down");
        (
            RunReport {
                counters: counters.snapshot(),
                duplicate_results,
                leftover_args: leftovers.len(),
                failures: failures.len(),
                interrupted,
                aggregate_dump,
                args_dump,
                failures_dump,
            },
            first_error,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DumpPolicy;
    use std::time::Duration;

    fn quick_config(dir: &std::path::Path) -> ServerConfig {
        ServerConfig::builder("unit test key")
            .bind_ip("127.0.0.1".parse().unwrap())
            .port(0)
            .dump_dir(dir)
            .no_status_bar(true)
            .settle_delay(Duration::from_millis(20))
            .result_poll(Duration::from_millis(20))
            .transport_shutdown_wait(Duration::from_millis(200))
            .build()
    }

    #[tokio::test]
    async fn zero_arguments_complete_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let server = JobServer::bind(quick_config(dir.path()), PairsAggregator::default())
            .await
            .unwrap();
        let report = server.run().await.unwrap();
        assert_eq!(report.counters.numjobs, 0);
        assert_eq!(report.counters.numresults, 0);
        assert_eq!(report.leftover_args, 0);
        assert!(!report.interrupted);
        // The aggregate dump is written even when empty; no args dump.
        assert!(report.aggregate_dump.is_some());
        assert!(report.args_dump.is_none());
        assert!(report.failures_dump.is_none());
    }

    #[tokio::test]
    async fn interrupt_with_no_clients_dumps_the_seeds() {
        let dir = tempfile::tempdir().unwrap();
        let server = JobServer::bind(quick_config(dir.path()), PairsAggregator::default())
            .await
            .unwrap();
        server.put_arg(&42u32).await.unwrap();
        let handle = server.shutdown_handle();
        assert!(!handle.is_shutting_down());
        handle.shutdown();

        let report = server.run().await.unwrap();
        assert!(report.interrupted);
        assert_eq!(report.leftover_args, 1);
        assert_eq!(report.counters.numresults, 0);
        let args_dump = report.args_dump.expect("args dump expected");

        let codec = AnyCodec::default();
        let leftovers: Vec<JobValue> =
            foreman_wire::read_dump(&codec, &args_dump, DUMP_KIND_ARGS).unwrap();
        assert_eq!(leftovers.len(), 1);
        assert_eq!(leftovers[0].decode::<u32>(&codec).unwrap(), 42);
        assert!(report.failures_dump.is_none());
    }

    #[tokio::test]
    async fn disabled_policies_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::builder("unit test key")
            .bind_ip("127.0.0.1".parse().unwrap())
            .port(0)
            .dump_dir(dir.path())
            .dump_aggregate(DumpPolicy::Disabled)
            .dump_args(DumpPolicy::Disabled)
            .dump_failures(DumpPolicy::Disabled)
            .no_status_bar(true)
            .settle_delay(Duration::from_millis(10))
            .result_poll(Duration::from_millis(10))
            .transport_shutdown_wait(Duration::from_millis(200))
            .build();
        let server = JobServer::bind(config, PairsAggregator::default())
            .await
            .unwrap();
        server.put_arg(&1u32).await.unwrap();
        server.shutdown_handle().shutdown();
        let report = server.run().await.unwrap();
        assert!(report.aggregate_dump.is_none());
        assert!(report.args_dump.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
