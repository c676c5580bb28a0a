//! Signal routing
//!
//! SIGINT and SIGTERM are turned into state, not control flow: a
//! [`StopFlag`] that interested tasks watch at their next suspension
//! point. Three dispositions cover every context in the framework:
//!
//! - [`Disposition::Ignore`] - swallow silently. Used by the transport
//!   serving task, which must outlive an interrupt long enough for the
//!   server to persist state.
//! - [`Disposition::Exit`] - trip one flag and let scoped shutdown
//!   unwind. Used by the dispatcher, workers, and periodic tasks.
//! - [`Disposition::TerminateChildren`] - trip every registered child's
//!   flag, then the supervisor's own. Used by the client worker pool.
//!
//! SIGKILL is not handled; there is nothing to do.

use std::io;
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Shared stop flag.
///
/// Starts un-tripped; [`StopFlag::trip`] is one-way and idempotent.
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone)]
pub struct StopFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl StopFlag {
    /// Create a fresh, un-tripped flag.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request a stop. Wakes every listener.
    pub fn trip(&self) {
        self.tx.send_replace(true);
    }

    /// Has a stop been requested?
    pub fn is_tripped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribe for await-able notification.
    pub fn listen(&self) -> StopListener {
        StopListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Await-able view of a [`StopFlag`].
#[derive(Debug, Clone)]
pub struct StopListener {
    rx: watch::Receiver<bool>,
}

impl StopListener {
    /// Has a stop been requested?
    pub fn is_tripped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the flag trips; returns immediately if it already has.
    pub async fn tripped(&mut self) {
        // An Err means every flag handle is gone; treat that as a stop.
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// What to do when a handled signal arrives.
#[derive(Debug, Clone)]
pub enum Disposition {
    /// Swallow the signal silently.
    Ignore,
    /// Trip the flag; scoped shutdown unwinds from there.
    Exit(StopFlag),
    /// Trip every child's flag, then the supervisor's own.
    TerminateChildren {
        /// Flags of the supervised tasks
        children: Vec<StopFlag>,
        /// The supervisor's own flag, tripped last
        supervisor: StopFlag,
    },
}

impl Disposition {
    pub(crate) fn apply(&self, signal_name: &str) {
        match self {
            Self::Ignore => debug!(signal = signal_name, "signal ignored"),
            Self::Exit(flag) => {
                info!(signal = signal_name, "signal received, requesting orderly shutdown");
                flag.trip();
            }
            Self::TerminateChildren {
                children,
                supervisor,
            } => {
                info!(
                    signal = signal_name,
                    children = children.len(),
                    "signal received, stopping supervised tasks"
                );
                for child in children {
                    child.trip();
                }
                supervisor.trip();
            }
        }
    }
}

/// Installed signal listeners for the current process.
///
/// Routes SIGINT and SIGTERM to their dispositions for as long as the
/// router lives. Several routers may coexist (each receives every
/// delivery), which is how a periodic task can ignore a signal the
/// dispatcher converts to exit.
#[derive(Debug)]
pub struct SignalRouter {
    handle: JoinHandle<()>,
}

impl SignalRouter {
    /// Install dispositions for SIGINT (`interrupt`) and SIGTERM
    /// (`terminate`). Must be called from within a tokio runtime.
    pub fn install(interrupt: Disposition, terminate: Disposition) -> io::Result<Self> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = sigint.recv() => match received {
                        Some(()) => interrupt.apply("SIGINT"),
                        None => break,
                    },
                    received = sigterm.recv() => match received {
                        Some(()) => terminate.apply("SIGTERM"),
                        None => break,
                    },
                }
            }
        });
        Ok(Self { handle })
    }

    /// Stop routing. Signal streams stay registered with the runtime but
    /// no disposition fires anymore.
    pub fn dismantle(self) {
        self.handle.abort();
    }
}

impl Drop for SignalRouter {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trip_wakes_listeners() {
        let flag = StopFlag::new();
        assert!(!flag.is_tripped());

        let mut listener = flag.listen();
        let waiter = tokio::spawn(async move {
            listener.tripped().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        flag.trip();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("listener should wake after trip")
            .unwrap();
        assert!(flag.is_tripped());
    }

    #[tokio::test]
    async fn late_listener_sees_the_trip() {
        let flag = StopFlag::new();
        flag.trip();
        flag.trip(); // idempotent
        let mut listener = flag.listen();
        tokio::time::timeout(Duration::from_secs(1), listener.tripped())
            .await
            .expect("already-tripped flag resolves immediately");
    }

    #[test]
    fn exit_disposition_trips_only_its_flag() {
        let ours = StopFlag::new();
        let other = StopFlag::new();
        Disposition::Exit(ours.clone()).apply("SIGINT");
        assert!(ours.is_tripped());
        assert!(!other.is_tripped());
    }

    #[test]
    fn terminate_children_trips_children_then_supervisor() {
        let children: Vec<StopFlag> = (0..3).map(|_| StopFlag::new()).collect();
        let supervisor = StopFlag::new();
        Disposition::TerminateChildren {
            children: children.clone(),
            supervisor: supervisor.clone(),
        }
        .apply("SIGTERM");
        assert!(children.iter().all(StopFlag::is_tripped));
        assert!(supervisor.is_tripped());
    }

    #[test]
    fn ignore_disposition_changes_nothing() {
        let flag = StopFlag::new();
        Disposition::Ignore.apply("SIGINT");
        assert!(!flag.is_tripped());
    }
}
