//! One-shot resettable timer.
//!
//! A [`TimeoutManager`] runs a callback once after a fixed delay unless it is
//! reset or cleared first. Firing is terminal: the timer stays idle until the
//! next [`TimeoutManager::reset`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Runs a callback after a period of inactivity.
pub struct TimeoutManager {
    delay: Duration,
    callback: Callback,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl TimeoutManager {
    /// Creates an idle timer. Nothing is scheduled until [`Self::reset`].
    #[must_use]
    pub fn new(delay: Duration, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            delay,
            callback: Arc::new(callback),
            pending: Mutex::new(None),
        }
    }

    /// Returns the configured delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)starts the countdown, cancelling any pending run.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn reset(&self) {
        let callback = Arc::clone(&self.callback);
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });

        if let Some(previous) = self.slot().replace(handle) {
            previous.abort();
        }
    }

    /// Cancels the pending run, if any.
    pub fn clear(&self) {
        if let Some(previous) = self.slot().take() {
            previous.abort();
        }
    }

    /// Returns `true` while a run is scheduled and has not fired yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TimeoutManager {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for TimeoutManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutManager")
            .field("delay", &self.delay)
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_timer(delay_ms: u64) -> (TimeoutManager, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let timer = TimeoutManager::new(Duration::from_millis(delay_ms), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (timer, fired)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let (timer, fired) = counting_timer(100);
        timer.reset();

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_postpones_firing() {
        let (timer, fired) = counting_timer(100);
        timer.reset();

        tokio::time::sleep(Duration::from_millis(60)).await;
        timer.reset();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_pending_run() {
        let (timer, fired) = counting_timer(100);
        timer.reset();
        assert!(timer.is_pending());

        timer.clear();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn never_fires_without_reset() {
        let (_timer, fired) = counting_timer(10);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
