//! Trailing-edge debounce on the tokio timer

use crate::sync::lock;
use std::sync::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Runs only the last of a burst of calls, `delay` after the burst ends
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `f`, replacing whatever was pending. Runs `f` inline when
    /// the delay is zero or no runtime is available; returns whether it was
    /// deferred.
    pub fn call<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();

        let handle = match Handle::try_current() {
            Ok(handle) if !self.delay.is_zero() => handle,
            _ => {
                f();
                return false;
            }
        };

        let delay = self.delay;
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        });
        *lock(&self.pending) = Some(task);
        true
    }

    /// Drop the pending call, if any
    pub fn cancel(&self) -> bool {
        match lock(&self.pending).take() {
            Some(task) => {
                let was_pending = !task.is_finished();
                task.abort();
                was_pending
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.pending)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let count = Arc::new(AtomicUsize::new(0));
        let make = {
            let count = count.clone();
            move || {
                let count = count.clone();
                Box::new(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                }) as Box<dyn FnOnce() + Send>
            }
        };
        (count, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_once_after_delay() {
        let debouncer = Debouncer::new(Duration::from_millis(100));
        let (count, make) = counter();

        for _ in 0..5 {
            assert!(debouncer.call(make()));
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_call() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let (count, make) = counter();

        debouncer.call(make());
        assert!(debouncer.is_pending());
        assert!(debouncer.cancel());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_runs_inline_without_runtime() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let (count, make) = counter();

        assert!(!debouncer.call(make()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_delay_runs_inline() {
        let debouncer = Debouncer::new(Duration::ZERO);
        let (count, make) = counter();

        assert!(!debouncer.call(make()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
