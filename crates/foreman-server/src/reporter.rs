//! Periodic progress report
//!
//! Consumes the dispatcher's counters at the configured interval and
//! logs elapsed time, throughput, and an ETA. Speed is averaged over a
//! sliding window of recent samples so a momentary stall does not zero
//! the estimate. Rendering (a terminal bar, a dashboard) is someone
//! else's job; this only emits `tracing` events.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use foreman_core::{
    humanize_speed, humanize_time, Counters, PeriodicTask, PeriodicTaskBuilder, SignalMode,
};

/// Samples kept for the sliding speed window.
const SPEED_CALC_CYCLES: usize = 10;

/// Spawn the status report task.
///
/// The task ignores interrupt/terminate; the dispatcher owns shutdown
/// and stops the report explicitly before tearing anything else down.
pub(crate) fn spawn_reporter(
    counters: Arc<Counters>,
    interval: Duration,
) -> io::Result<PeriodicTask> {
    let started = Instant::now();
    let mut samples: VecDeque<(Instant, u64)> = VecDeque::with_capacity(SPEED_CALC_CYCLES + 1);
    PeriodicTaskBuilder::new("status", interval)
        .signals(SignalMode::Ignore, SignalMode::Ignore)
        .spawn(move || {
            let snapshot = counters.snapshot();
            if snapshot.numresults == 0 {
                info!(target: "foreman::status", "waiting for the first result");
                return Ok(false);
            }

            let now = Instant::now();
            samples.push_back((now, snapshot.numresults));
            let (old_time, old_count) = if samples.len() > SPEED_CALC_CYCLES {
                samples.pop_front().unwrap_or((started, 0))
            } else {
                (started, 0)
            };

            let elapsed = (now - started).as_secs_f64();
            let window = (now - old_time).as_secs_f64().max(1e-9);
            let speed = (snapshot.numresults.saturating_sub(old_count)) as f64 / window;
            let eta = if speed > 0.0 {
                humanize_time((snapshot.remaining() as f64 / speed).ceil())
            } else {
                "--".to_owned()
            };

            info!(
                target: "foreman::status",
                "{} [{}] {}/{} ETA {}",
                humanize_time(elapsed),
                humanize_speed(speed),
                snapshot.numresults,
                snapshot.numjobs,
                eta,
            );
            Ok(snapshot.complete())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reporter_finishes_when_counts_complete() {
        let counters = Arc::new(Counters::new());
        for _ in 0..3 {
            counters.record_job();
        }
        let reporter = spawn_reporter(counters.clone(), Duration::from_millis(5)).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reporter.is_finished());

        counters.advance_results_to(3);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(reporter.is_finished());
        reporter.stop().await;
    }

    #[tokio::test]
    async fn reporter_stops_on_request_before_any_result() {
        let counters = Arc::new(Counters::new());
        counters.record_job();
        let reporter = spawn_reporter(counters, Duration::from_millis(5)).unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;
        reporter.stop().await;
    }
}
