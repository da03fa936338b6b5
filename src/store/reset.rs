//! Daily tally reset.
//!
//! A single background task wakes at the next scheduled wall-clock instant
//! (17:00 local by default), clears every tally, then waits out a short
//! cooldown before computing the following target. The cooldown keeps a
//! wake-up that lands right on the boundary from firing twice.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::ConfigError;
use crate::store::traits::TallyStore;

/// Default reset expression: every day at 17:00:00.
pub const DEFAULT_RESET_CRON: &str = "0 0 17 * * *";

/// Default pause after a reset before the next target is computed.
pub const DEFAULT_RESET_COOLDOWN: Duration = Duration::from_secs(60);

/// When the tallies are cleared.
#[derive(Debug, Clone)]
pub struct ResetSchedule {
    schedule: cron::Schedule,
    cooldown: Duration,
}

impl ResetSchedule {
    /// Parse a cron expression (seconds field first, as the `cron` crate expects).
    pub fn new(expression: &str, cooldown: Duration) -> Result<Self, ConfigError> {
        let schedule =
            cron::Schedule::from_str(expression).map_err(|e| ConfigError::InvalidValue {
                key: "reset_cron".to_string(),
                message: format!("invalid cron '{expression}': {e}"),
            })?;
        Ok(Self { schedule, cooldown })
    }

    /// Next fire instant strictly after `now`.
    ///
    /// When `now` is at or past today's target the result is tomorrow's.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.after(now).next()
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

impl Default for ResetSchedule {
    fn default() -> Self {
        Self {
            schedule: cron::Schedule::from_str(DEFAULT_RESET_CRON)
                .expect("default reset cron is valid"),
            cooldown: DEFAULT_RESET_COOLDOWN,
        }
    }
}

/// Source of the local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The real local clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Sleep for `duration` unless `cancel` fires first. Returns `false` if cancelled.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Spawn the reset loop. It runs until `cancel` is triggered.
pub fn spawn_reset_task(
    store: Arc<dyn TallyStore>,
    schedule: ResetSchedule,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = clock.now();
            let Some(target) = schedule.next_after(&now) else {
                error!("Reset schedule has no upcoming fire time, stopping reset task");
                break;
            };
            let wait = (target - now).to_std().unwrap_or(Duration::ZERO);

            info!(
                next_reset = %target.format("%Y-%m-%d %H:%M:%S"),
                wait_secs = wait.as_secs_f64(),
                "Scheduled tally reset"
            );

            if !sleep_or_cancel(wait, &cancel).await {
                break;
            }

            match store.reset_all().await {
                Ok(rows) => info!(rows, "Message tallies reset"),
                Err(e) => error!("Failed to reset message tallies: {}", e),
            }

            if !sleep_or_cancel(schedule.cooldown(), &cancel).await {
                break;
            }
        }
        info!("Reset task stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{NaiveDate, Timelike, Utc};

    use super::*;
    use crate::error::DatabaseError;

    fn at(day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2026, 6, day)
            .unwrap()
            .and_hms_opt(hour, min, sec)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn before_target_fires_same_day() {
        let schedule = ResetSchedule::default();
        let next = schedule.next_after(&at(15, 9, 30, 0)).unwrap();
        assert_eq!(next, at(15, 17, 0, 0));
    }

    #[test]
    fn after_target_fires_next_day() {
        let schedule = ResetSchedule::default();
        let next = schedule.next_after(&at(15, 18, 45, 12)).unwrap();
        assert_eq!(next, at(16, 17, 0, 0));
    }

    #[test]
    fn exactly_at_target_fires_next_day() {
        let schedule = ResetSchedule::default();
        let next = schedule.next_after(&at(15, 17, 0, 0)).unwrap();
        assert_eq!(next, at(16, 17, 0, 0));
    }

    #[test]
    fn custom_expression() {
        let schedule = ResetSchedule::new("0 30 4 * * *", DEFAULT_RESET_COOLDOWN).unwrap();
        let next = schedule.next_after(&at(15, 12, 0, 0)).unwrap();
        assert_eq!(next, at(16, 4, 30, 0));
    }

    #[test]
    fn invalid_expression_is_config_error() {
        let err = ResetSchedule::new("not a cron", DEFAULT_RESET_COOLDOWN).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "reset_cron"));
    }

    /// Local clock that advances with tokio's (pausable) time.
    struct ManualClock {
        base: DateTime<Local>,
        started: tokio::time::Instant,
    }

    impl ManualClock {
        fn new(hour: u32, min: u32, sec: u32) -> Self {
            let naive = NaiveDate::from_ymd_opt(2026, 6, 15)
                .unwrap()
                .and_hms_opt(hour, min, sec)
                .unwrap();
            Self {
                base: Local.from_local_datetime(&naive).earliest().unwrap(),
                started: tokio::time::Instant::now(),
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Local> {
            let elapsed = self.started.elapsed();
            self.base + chrono::Duration::from_std(elapsed).unwrap()
        }
    }

    /// Store stub that only counts resets.
    #[derive(Default)]
    struct CountingStore {
        resets: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TallyStore for CountingStore {
        async fn init_schema(&self) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn increment(&self, _: &str, _: &str) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn max_count(&self, _: &str) -> Result<u64, DatabaseError> {
            Ok(0)
        }
        async fn sender_count(&self, _: &str, _: &str) -> Result<u64, DatabaseError> {
            Ok(0)
        }
        async fn reset_all(&self) -> Result<u64, DatabaseError> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DatabaseError::Query("disk full".into()))
            } else {
                Ok(0)
            }
        }
        async fn close(&self) -> Result<(), DatabaseError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_at_target_then_waits_a_day() {
        let store = Arc::new(CountingStore::default());
        let clock = Arc::new(ManualClock::new(16, 59, 0));
        let cancel = CancellationToken::new();
        let handle = spawn_reset_task(
            store.clone(),
            ResetSchedule::default(),
            clock.clone(),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.resets.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.resets.load(Ordering::SeqCst), 1);

        // Still the same evening, next fire is tomorrow.
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(store.resets.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        assert_eq!(store.resets.load(Ordering::SeqCst), 2);
        assert_eq!(clock.now().hour(), 18);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn started_after_target_waits_until_tomorrow() {
        let store = Arc::new(CountingStore::default());
        let cancel = CancellationToken::new();
        let handle = spawn_reset_task(
            store.clone(),
            ResetSchedule::default(),
            Arc::new(ManualClock::new(17, 30, 0)),
            cancel.clone(),
        );

        // 23h later it is 16:30 the next day: not yet.
        tokio::time::sleep(Duration::from_secs(23 * 3600)).await;
        assert_eq!(store.resets.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(store.resets.load(Ordering::SeqCst), 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reset_keeps_loop_alive() {
        let store = Arc::new(CountingStore {
            fail: true,
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let handle = spawn_reset_task(
            store.clone(),
            ResetSchedule::default(),
            Arc::new(ManualClock::new(16, 0, 0)),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_secs(2 * 24 * 3600)).await;
        assert_eq!(store.resets.load(Ordering::SeqCst), 2);
        assert!(!handle.is_finished());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_sleeping_task() {
        let store = Arc::new(CountingStore::default());
        let cancel = CancellationToken::new();
        let handle = spawn_reset_task(
            store.clone(),
            ResetSchedule::default(),
            Arc::new(SystemClock),
            cancel.clone(),
        );

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(store.resets.load(Ordering::SeqCst), 0);
    }
}
