//! Periodic tasks with a staged stop ladder
//!
//! A [`PeriodicTask`] runs a callable in its own tokio task, sleeping a
//! fixed interval between invocations. It stops when the callable
//! reports it is done, when its stop flag trips, or when a routed signal
//! trips the flag.
//!
//! Stopping is a ladder because the callable may be sleeping or stuck in
//! user code: first the flag (wait up to `2 * interval`), then an abort
//! (wait up to `5 * interval`), and as a last resort either detach the
//! task or ask the operator. The ladder bounds how long a caller can be
//! held up without ever discarding work before the final step.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::signal::{Disposition, SignalRouter, StopFlag};

/// Error type a periodic callable may return.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Per-signal behavior of a periodic task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalMode {
    /// Swallow the signal.
    Ignore,
    /// Trip the task's stop flag.
    Stop,
}

/// What to do when a task survives both the stop request and the abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastResort {
    /// Log and leave the task behind (headless default).
    #[default]
    Detach,
    /// Ask the operator on the controlling terminal.
    Prompt,
}

/// Builder for [`PeriodicTask`].
#[derive(Debug)]
pub struct PeriodicTaskBuilder {
    name: String,
    interval: Duration,
    signals: Option<(SignalMode, SignalMode)>,
    last_resort: LastResort,
}

impl PeriodicTaskBuilder {
    /// Start describing a task that runs every `interval`.
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            signals: None,
            last_resort: LastResort::default(),
        }
    }

    /// Install signal routing for this task (`interrupt`, `terminate`).
    /// Without this call the task reacts only to its own stop flag.
    #[must_use]
    pub fn signals(mut self, interrupt: SignalMode, terminate: SignalMode) -> Self {
        self.signals = Some((interrupt, terminate));
        self
    }

    /// Configure the final rung of the stop ladder.
    #[must_use]
    pub fn last_resort(mut self, last_resort: LastResort) -> Self {
        self.last_resort = last_resort;
        self
    }

    /// Spawn the task.
    ///
    /// `task` is invoked once per interval; `Ok(true)` means "done",
    /// `Ok(false)` means "call me again". An `Err` stops the loop and is
    /// logged; it does not take the process down.
    pub fn spawn<F>(self, mut task: F) -> io::Result<PeriodicTask>
    where
        F: FnMut() -> Result<bool, TaskError> + Send + 'static,
    {
        let flag = StopFlag::new();
        let router = match self.signals {
            Some((interrupt, terminate)) => Some(SignalRouter::install(
                disposition_for(interrupt, &flag),
                disposition_for(terminate, &flag),
            )?),
            None => None,
        };

        let mut listener = flag.listen();
        let name = self.name.clone();
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            loop {
                if listener.is_tripped() {
                    debug!(task = %name, "stop requested, leaving periodic loop");
                    return;
                }
                match task() {
                    Ok(false) => {}
                    Ok(true) => {
                        debug!(task = %name, "periodic task reports done");
                        return;
                    }
                    Err(e) => {
                        error!(task = %name, error = %e, "periodic task failed, stopping loop");
                        return;
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = listener.tripped() => {}
                }
            }
        });

        Ok(PeriodicTask {
            name: self.name,
            interval: self.interval,
            flag,
            handle,
            _router: router,
            last_resort: self.last_resort,
        })
    }
}

/// A running periodic task. See the module docs for the stop ladder.
#[derive(Debug)]
pub struct PeriodicTask {
    name: String,
    interval: Duration,
    flag: StopFlag,
    handle: JoinHandle<()>,
    _router: Option<SignalRouter>,
    last_resort: LastResort,
}

impl PeriodicTask {
    /// The stop flag; tripping it ends the loop at the next check.
    pub fn stop_flag(&self) -> StopFlag {
        self.flag.clone()
    }

    /// Has the loop already returned?
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Run the stop ladder to completion.
    pub async fn stop(mut self) {
        self.flag.trip();

        // Rung 1: the cooperative path. The loop checks the flag before
        // every invocation and during every sleep.
        let grace = ladder_wait(self.interval, 2);
        if tokio::time::timeout(grace, &mut self.handle).await.is_ok() {
            debug!(task = %self.name, "periodic task stopped on request");
            return;
        }

        // Rung 2: the task is stuck inside its callable. Abort it.
        warn!(task = %self.name, "periodic task still alive after stop request, aborting");
        self.handle.abort();
        let grace = ladder_wait(self.interval, 5);
        if tokio::time::timeout(grace, &mut self.handle).await.is_ok() {
            return;
        }

        // Rung 3: abort did not land either (blocking section). Detach or
        // hand the decision to the operator.
        match self.last_resort {
            LastResort::Detach => {
                warn!(task = %self.name, "periodic task unresponsive to abort, detaching");
            }
            LastResort::Prompt => {
                if prompt_detach(&self.name).await {
                    warn!(task = %self.name, "operator chose to detach the task");
                } else {
                    let _ = (&mut self.handle).await;
                }
            }
        }
    }
}

fn disposition_for(mode: SignalMode, flag: &StopFlag) -> Disposition {
    match mode {
        SignalMode::Ignore => Disposition::Ignore,
        SignalMode::Stop => Disposition::Exit(flag.clone()),
    }
}

fn ladder_wait(interval: Duration, factor: u32) -> Duration {
    // A zero interval must still leave the task a beat to notice the flag.
    (interval * factor).max(Duration::from_millis(50))
}

async fn prompt_detach(name: &str) -> bool {
    let name = name.to_owned();
    let answer = tokio::task::spawn_blocking(move || loop {
        eprint!("periodic task '{name}' will not stop; force-detach? [y/n]: ");
        let _ = io::stderr().flush();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return true;
        }
        match line.trim() {
            "y" | "Y" => return true,
            "n" | "N" => return false,
            _ => {}
        }
    })
    .await;
    answer.unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn runs_until_stopped() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let task = PeriodicTaskBuilder::new("ticker", Duration::from_millis(5))
            .spawn(move || {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(false)
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        task.stop().await;
        let after_stop = calls.load(Ordering::SeqCst);
        assert!(after_stop >= 2, "expected several invocations, got {after_stop}");

        // No further invocations after stop returned.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn done_return_ends_the_loop() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let task = PeriodicTaskBuilder::new("finite", Duration::from_millis(1))
            .spawn(move || Ok(seen.fetch_add(1, Ordering::SeqCst) + 1 >= 3))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(task.is_finished());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        task.stop().await;
    }

    #[tokio::test]
    async fn callable_error_stops_without_crashing() {
        let task = PeriodicTaskBuilder::new("faulty", Duration::from_millis(1))
            .spawn(|| Err("synthetic fault".into()))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(task.is_finished());
        task.stop().await;
    }

    #[tokio::test]
    async fn stop_flag_observed_mid_sleep() {
        let task = PeriodicTaskBuilder::new("sleeper", Duration::from_secs(3600))
            .spawn(|| Ok(false))
            .unwrap();
        // The loop is now in its hour-long sleep; stop must not wait it out.
        let started = std::time::Instant::now();
        task.stop().await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
