use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::Ingestor;

/// Run a cycle now and then every `every`, for the life of the process.
///
/// A tick that lands while a cycle (from any trigger) is still running is
/// skipped. Returns `None` when `every` is zero, which disables the timer.
pub fn spawn(ingestor: Ingestor, every: Duration) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        tracing::info!("Scheduled ingestion disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let outcome = ingestor.run_cycle().await;
            if !outcome.started {
                tracing::debug!("Scheduled tick skipped, cycle already running");
            }
        }
    }))
}
