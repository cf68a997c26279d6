//! Periodic jobs run alongside the HTTP services in production.

use crate::backup::BackupService;
use crate::session::SessionStore;
use crate::CoreResult;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub const HOURLY: Duration = Duration::from_secs(60 * 60);
pub const DAILY: Duration = Duration::from_secs(24 * 60 * 60);
pub const WEEKLY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Runs `job` every `period`, first one period from now.
///
/// A failing run is logged; the next tick still fires.
pub fn run_every<F, Fut>(name: &'static str, period: Duration, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = CoreResult<()>> + Send,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            tracing::info!("scheduled job {} starting", name);
            match job().await {
                Ok(()) => tracing::info!("scheduled job {} finished", name),
                Err(e) => tracing::error!("scheduled job {} failed: {}", name, e),
            }
        }
    })
}

/// Starts the daily snapshot, weekly full backup and hourly session purge.
pub fn spawn_jobs(backups: Arc<BackupService>, sessions: SessionStore) -> Vec<JoinHandle<()>> {
    let daily = backups.clone();
    let snapshot = run_every("daily local backup", DAILY, move || {
        let backups = daily.clone();
        async move { backups.snapshot_local().await.map(|_| ()) }
    });

    let weekly = backups;
    let full = run_every("weekly full backup", WEEKLY, move || {
        let backups = weekly.clone();
        async move {
            let report = backups.run_all().await;
            if !report.success {
                tracing::warn!(
                    "weekly full backup incomplete (local: {}, csv: {}, db: {})",
                    report.local.success,
                    report.csv.success,
                    report.database.success
                );
            }
            Ok(())
        }
    });

    let purge = run_every("session purge", HOURLY, move || {
        let sessions = sessions.clone();
        async move {
            let removed = sessions.purge_expired();
            tracing::debug!("purged {} expired admin sessions", removed);
            Ok(())
        }
    });

    tracing::info!("scheduled jobs started");
    vec![snapshot, full, purge]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn job_keeps_running_after_a_failure() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let handle = run_every("flaky", HOURLY, move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(CoreError::InvalidInput("first run fails".into()))
                } else {
                    Ok(())
                }
            }
        });

        tokio::time::sleep(HOURLY / 2).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(HOURLY * 3).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        handle.abort();
    }
}
