//! Worker pool supervisor
//!
//! Resolves the worker count, renices the process, installs the
//! terminate-children signal disposition over the per-worker stop flags,
//! and runs the workers to completion. The pool as a whole succeeds as
//! long as every worker started; what the workers encountered afterwards
//! (drained queue, lost server, stop request) lands in the report.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use foreman_core::{Disposition, SignalRouter, StopFlag};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::worker::{run_worker, JobFunction, WorkerExit};

/// The job-processing client: a pool of workers over one server.
pub struct JobClient {
    config: ClientConfig,
    func: Arc<dyn JobFunction>,
    stop: StopFlag,
}

/// Handle for stopping a running pool from outside - the signal path's
/// behavior without a signal.
#[derive(Debug, Clone)]
pub struct PoolShutdownHandle {
    stop: StopFlag,
}

impl PoolShutdownHandle {
    /// Request the same cooperative stop a SIGTERM would: every worker
    /// finishes (or returns) its current argument and exits.
    pub fn shutdown(&self) {
        self.stop.trip();
    }
}

/// What a finished pool run looked like.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientReport {
    /// Workers that were spawned
    pub workers: usize,
    /// Jobs processed and delivered across all workers
    pub jobs_done: u64,
    /// Per-item failures reported to the server
    pub failures: u64,
    /// True when at least one worker exited on a stop request
    pub cancelled: bool,
    /// True when at least one worker lost the server mid-run
    pub server_lost: bool,
}

impl JobClient {
    /// Create a client around a work function.
    pub fn new(config: ClientConfig, func: impl JobFunction) -> Self {
        Self::with_shared(config, Arc::new(func))
    }

    /// Create a client around an already-shared work function.
    pub fn with_shared(config: ClientConfig, func: Arc<dyn JobFunction>) -> Self {
        Self {
            config,
            func,
            stop: StopFlag::new(),
        }
    }

    /// Handle that stops the pool the way a termination signal would.
    pub fn shutdown_handle(&self) -> PoolShutdownHandle {
        PoolShutdownHandle {
            stop: self.stop.clone(),
        }
    }

    /// Spawn the workers and run them until the queue drains, the server
    /// goes away, or a stop is requested.
    ///
    /// Returns an error only when a worker could not be brought up at
    /// all (connect or authentication failure at startup) - the one
    /// condition a client process reports with a non-zero exit code.
    pub async fn run(self) -> ClientResult<ClientReport> {
        let workers = self.config.worker_count();
        renice(self.config.nice, self.config.quiet_warnings);

        info!(
            workers,
            host = %self.config.host,
            port = self.config.port,
            "starting worker pool"
        );

        let child_flags: Vec<StopFlag> = (0..workers).map(|_| StopFlag::new()).collect();
        let supervisor = StopFlag::new();
        let router = SignalRouter::install(
            Disposition::TerminateChildren {
                children: child_flags.clone(),
                supervisor: supervisor.clone(),
            },
            Disposition::TerminateChildren {
                children: child_flags.clone(),
                supervisor: supervisor.clone(),
            },
        )?;

        // The external handle behaves like the signal path: master flag
        // trips, every worker flag follows.
        let mut master = self.stop.listen();
        let propagation_flags = child_flags.clone();
        let propagation = tokio::spawn(async move {
            master.tripped().await;
            for flag in &propagation_flags {
                flag.trip();
            }
        });

        let config = Arc::new(self.config);
        let mut tasks = JoinSet::new();
        for (id, flag) in child_flags.iter().enumerate() {
            tasks.spawn(run_worker(
                id,
                config.clone(),
                self.func.clone(),
                flag.listen(),
            ));
        }

        let mut report = ClientReport {
            workers,
            jobs_done: 0,
            failures: 0,
            cancelled: false,
            server_lost: false,
        };
        let mut first_error: Option<ClientError> = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(worker)) => {
                    debug!(
                        worker = worker.id,
                        jobs_done = worker.jobs_done,
                        exit = ?worker.exit,
                        "worker finished"
                    );
                    report.jobs_done += worker.jobs_done;
                    report.failures += worker.failures;
                    match worker.exit {
                        WorkerExit::Cancelled => report.cancelled = true,
                        WorkerExit::ServerGone => report.server_lost = true,
                        WorkerExit::QueueDrained => {}
                    }
                }
                Ok(Err(e)) => {
                    error!(error = %e, "worker could not run; stopping the pool");
                    // One worker failing to come up takes the pool down:
                    // the rest would only hammer the same broken setup.
                    for flag in &child_flags {
                        flag.trip();
                    }
                    first_error.get_or_insert(e);
                }
                Err(join_error) => {
                    error!(error = %join_error, "worker task panicked");
                    first_error.get_or_insert(ClientError::WorkerPanic(join_error.to_string()));
                }
            }
        }
        router.dismantle();
        propagation.abort();

        info!(
            jobs_done = report.jobs_done,
            failures = report.failures,
            "worker pool finished"
        );
        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

/// Adjust the whole process's niceness; the workers all run inside it.
fn renice(nice: i32, quiet: bool) {
    if nice == 0 {
        return;
    }
    // SAFETY: setpriority only touches scheduler state of this process.
    let outcome = unsafe { libc::setpriority(libc::PRIO_PROCESS as _, 0, nice) };
    if outcome != 0 && !quiet {
        warn!(nice, "could not adjust process niceness");
    }
}
