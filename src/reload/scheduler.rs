/// `reload/scheduler.rs` — periodic re-fetch of a watched source
///
/// Runs as a Tokio background task. Only one timer exists per scheduler:
/// arming again aborts the previous task first.
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Turns a requested interval into a usable period.
/// NaN, infinities and non-positive values fall back to `default_ms`;
/// anything else is clamped to at least 1 ms.
pub fn normalize_interval(interval_ms: f64, default_ms: u64) -> Duration {
    if !interval_ms.is_finite() || interval_ms <= 0.0 {
        return Duration::from_millis(default_ms.max(1));
    }
    Duration::from_millis((interval_ms as u64).max(1))
}

#[derive(Default)]
pub struct ReloadScheduler {
    period: Option<Duration>,
    task: Option<JoinHandle<()>>,
}

impl ReloadScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer. `poll` runs once per period, starting one period from now;
    /// returning `false` ends the task.
    pub fn enable<F, Fut>(&mut self, period: Duration, mut poll: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.disable();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !poll().await {
                    break;
                }
            }
        });
        self.period = Some(period);
        self.task = Some(task);
    }

    /// Cancel the timer. Safe to call when nothing is armed.
    pub fn disable(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::debug!("Watch timer cancelled");
        }
        self.period = None;
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }
}

impl Drop for ReloadScheduler {
    fn drop(&mut self) {
        self.disable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<bool> {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(true)
        }
    }

    #[test]
    fn bogus_intervals_fall_back_to_default() {
        assert_eq!(normalize_interval(0.0, 5_000), Duration::from_millis(5_000));
        assert_eq!(normalize_interval(f64::NAN, 5_000), Duration::from_millis(5_000));
        assert_eq!(normalize_interval(-3.0, 5_000), Duration::from_millis(5_000));
        assert_eq!(normalize_interval(f64::INFINITY, 5_000), Duration::from_millis(5_000));
    }

    #[test]
    fn tiny_intervals_clamp_to_one_millisecond() {
        assert_eq!(normalize_interval(0.25, 5_000), Duration::from_millis(1));
        assert_eq!(normalize_interval(250.0, 5_000), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn polls_once_per_period() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = ReloadScheduler::new();
        scheduler.enable(Duration::from_millis(10), counting(&counter));

        tokio::time::sleep(Duration::from_millis(35)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.period(), Some(Duration::from_millis(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn enabling_twice_keeps_a_single_timer() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = ReloadScheduler::new();
        scheduler.enable(Duration::from_millis(10), counting(&counter));
        scheduler.enable(Duration::from_millis(10), counting(&counter));

        tokio::time::sleep(Duration::from_millis(35)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn disable_stops_polling_and_is_idempotent() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = ReloadScheduler::new();
        scheduler.enable(Duration::from_millis(10), counting(&counter));
        tokio::time::sleep(Duration::from_millis(15)).await;

        scheduler.disable();
        scheduler.disable();
        let seen = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), seen);
        assert!(!scheduler.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_returning_false_ends_the_task() {
        let mut scheduler = ReloadScheduler::new();
        scheduler.enable(Duration::from_millis(10), || std::future::ready(false));
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(!scheduler.is_active());
    }
}
