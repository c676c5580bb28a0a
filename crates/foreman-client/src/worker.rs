//! Worker loop
//!
//! Each worker owns one connection and repeats: pull an argument with a
//! short timeout, run the user function on the blocking pool, push the
//! outcome. The fault taxonomy is the whole point:
//!
//! - job queue empty on timeout: orderly exit, there is no more work;
//! - transport gone: exit immediately, nothing can be saved from here;
//! - stop requested while holding an argument: put it back (best effort,
//!   bounded), then exit;
//! - user function error or panic: failure record to the fail queue,
//!   traceback to a local file, keep working - one bad argument must not
//!   poison the pool.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use foreman_core::{filename_timestamp, local_hostname, StopListener};
use foreman_wire::{FailureRecord, JobValue};

use crate::config::ClientConfig;
use crate::connection::ServerConnection;
use crate::error::ClientResult;

/// How long a worker waits on the job queue before deciding the work is
/// done.
const JOB_POLL: Duration = Duration::from_millis(100);

/// Bounded wait for result, failure, and re-queue pushes.
const PUT_TIMEOUT: Duration = Duration::from_secs(10);

/// The user-supplied work function.
///
/// Must be pure up to its error behavior: same argument and constant
/// args give the same result. It runs on the blocking pool, so it may
/// take as long as it needs; cancellation is only observed between
/// invocations. Closures with the matching signature implement this
/// trait.
pub trait JobFunction: Send + Sync + 'static {
    /// Process one argument.
    fn run(&self, arg: &JobValue, const_args: Option<&JobValue>) -> Result<JobValue, JobError>;
}

impl<F> JobFunction for F
where
    F: Fn(&JobValue, Option<&JobValue>) -> Result<JobValue, JobError> + Send + Sync + 'static,
{
    fn run(&self, arg: &JobValue, const_args: Option<&JobValue>) -> Result<JobValue, JobError> {
        self(arg, const_args)
    }
}

/// A fault raised by the user function.
///
/// `kind` is the symbolic fault-class name that ends up in the failure
/// record and the traceback file name; `detail` is free-form.
#[derive(Debug, Clone)]
pub struct JobError {
    kind: String,
    detail: String,
}

impl JobError {
    /// Create a job error with a fault-class name and detail text.
    pub fn new(kind: impl Into<String>, detail: impl ToString) -> Self {
        Self {
            kind: kind.into(),
            detail: detail.to_string(),
        }
    }

    /// The symbolic fault-class name.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The free-form detail text.
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for JobError {}

/// Why a worker's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    /// The job queue stayed empty for a full poll: no more work.
    QueueDrained,
    /// The connection died; nothing further can be delivered.
    ServerGone,
    /// A stop request was observed.
    Cancelled,
}

#[derive(Debug)]
pub(crate) struct WorkerReport {
    pub(crate) id: usize,
    pub(crate) jobs_done: u64,
    pub(crate) failures: u64,
    pub(crate) exit: WorkerExit,
}

pub(crate) async fn run_worker(
    id: usize,
    config: Arc<ClientConfig>,
    func: Arc<dyn JobFunction>,
    stop: StopListener,
) -> ClientResult<WorkerReport> {
    let mut conn = ServerConnection::connect(
        &config.host,
        config.port,
        &config.authkey,
        config.codec,
    )
    .await?;
    let const_args = conn.const_args().await?;
    debug!(worker = id, "worker online");

    let hostname = local_hostname();
    let mut jobs_done = 0u64;
    let mut failures = 0u64;

    let exit = loop {
        if stop.is_tripped() {
            break WorkerExit::Cancelled;
        }
        let arg = match conn.get_job(JOB_POLL).await {
            Ok(Some(arg)) => arg,
            Ok(None) => {
                debug!(worker = id, jobs_done, "job queue empty, worker done");
                break WorkerExit::QueueDrained;
            }
            Err(e) if e.is_transport() => {
                warn!(worker = id, error = %e, "server unreachable, worker exiting");
                break WorkerExit::ServerGone;
            }
            Err(e) => return Err(e),
        };

        // A stop that lands while we hold an unprocessed argument must
        // not lose it: put it back so another worker (or a resume run)
        // picks it up.
        if stop.is_tripped() {
            requeue(&mut conn, id, arg).await;
            break WorkerExit::Cancelled;
        }

        match execute(&func, &arg, const_args.as_ref()).await {
            Ok(result) => match conn.put_result(arg, result, PUT_TIMEOUT).await {
                Ok(true) => jobs_done += 1,
                Ok(false) => warn!(worker = id, "result queue full, result dropped"),
                Err(e) if e.is_transport() => {
                    warn!(worker = id, error = %e, "lost the server while delivering a result");
                    break WorkerExit::ServerGone;
                }
                Err(e) => return Err(e),
            },
            Err(job_error) => {
                failures += 1;
                let record = FailureRecord::new(arg.clone(), job_error.kind(), hostname.clone());
                match conn.put_failure(record, PUT_TIMEOUT).await {
                    Ok(delivered) => {
                        if !delivered {
                            warn!(worker = id, "fail queue full, failure report dropped");
                        }
                    }
                    Err(e) if e.is_transport() => {
                        warn!(worker = id, error = %e, "lost the server while reporting a failure");
                        break WorkerExit::ServerGone;
                    }
                    Err(e) => return Err(e),
                }
                write_traceback(&config.traceback_dir, &job_error, &arg).await;
                debug!(worker = id, kind = job_error.kind(), "failure reported, continuing");
            }
        }
    };

    Ok(WorkerReport {
        id,
        jobs_done,
        failures,
        exit,
    })
}

/// Run the user function on the blocking pool; a panic becomes a
/// failure of kind `panic` instead of taking the worker down.
async fn execute(
    func: &Arc<dyn JobFunction>,
    arg: &JobValue,
    const_args: Option<&JobValue>,
) -> Result<JobValue, JobError> {
    let func = func.clone();
    let arg = arg.clone();
    let const_args = const_args.cloned();
    match tokio::task::spawn_blocking(move || func.run(&arg, const_args.as_ref())).await {
        Ok(outcome) => outcome,
        Err(join_error) if join_error.is_panic() => {
            let payload = join_error.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "user function panicked".to_owned());
            Err(JobError::new("panic", message))
        }
        Err(join_error) => Err(JobError::new("cancelled", join_error)),
    }
}

async fn requeue(conn: &mut ServerConnection, id: usize, arg: JobValue) {
    info!(worker = id, "stop requested while holding an argument, putting it back");
    match conn.requeue_job(arg, PUT_TIMEOUT).await {
        Ok(true) => debug!(worker = id, "argument returned to the job queue"),
        Ok(false) => warn!(worker = id, "job queue full, argument lost on this side"),
        Err(e) => {
            warn!(worker = id, error = %e, "could not return the argument, it is lost on this side");
        }
    }
}

async fn write_traceback(dir: &Path, error: &JobError, arg: &JobValue) {
    let path = traceback_path(dir, error.kind());
    let body = format!(
        "error kind: {}\n\n{}\n\nargument: {:?}\nhost: {}\n",
        error.kind(),
        error.detail(),
        arg,
        local_hostname(),
    );
    match tokio::fs::write(&path, body).await {
        Ok(()) => debug!(path = %path.display(), "traceback written"),
        Err(e) => warn!(path = %path.display(), error = %e, "could not write traceback file"),
    }
}

fn traceback_path(dir: &Path, kind: &str) -> PathBuf {
    let kind: String = kind
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    dir.join(format!(
        "traceback_err_{kind}_{}_{}.trb",
        filename_timestamp(),
        std::process::id()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_wire::AnyCodec;

    #[tokio::test]
    async fn panics_become_failures_of_kind_panic() {
        let func: Arc<dyn JobFunction> = Arc::new(
            |_: &JobValue, _: Option<&JobValue>| -> Result<JobValue, JobError> {
                panic!("synthetic worker panic")
            },
        );
        let codec = AnyCodec::default();
        let arg = JobValue::from_serialize(&codec, &1u32).unwrap();
        let outcome = execute(&func, &arg, None).await;
        let error = outcome.unwrap_err();
        assert_eq!(error.kind(), "panic");
        assert!(error.detail().contains("synthetic worker panic"));
    }

    #[tokio::test]
    async fn successful_execution_passes_values_through() {
        let codec = AnyCodec::default();
        let func: Arc<dyn JobFunction> = Arc::new(
            move |arg: &JobValue, konst: Option<&JobValue>| -> Result<JobValue, JobError> {
                let n: u32 = arg.decode(&codec).map_err(|e| JobError::new("DecodeError", e))?;
                let offset: u32 = konst
                    .map(|k| k.decode(&codec).map_err(|e| JobError::new("DecodeError", e)))
                    .transpose()?
                    .unwrap_or(0);
                JobValue::from_serialize(&codec, &(n + offset))
                    .map_err(|e| JobError::new("EncodeError", e))
            },
        );
        let arg = JobValue::from_serialize(&codec, &5u32).unwrap();
        let konst = JobValue::from_serialize(&codec, &100u32).unwrap();
        let result = execute(&func, &arg, Some(&konst)).await.unwrap();
        assert_eq!(result.decode::<u32>(&codec).unwrap(), 105);
    }

    #[test]
    fn traceback_names_are_filesystem_safe() {
        let path = traceback_path(Path::new("/tmp"), "Codec error: bad/frame");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("traceback_err_Codec_error__bad_frame_"));
        assert!(name.ends_with(".trb"));
        assert!(!name.contains('/'));
    }
}
