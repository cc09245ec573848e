//! Cancellable delayed work.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A future that runs after a delay unless it's cancelled first.
///
/// The task always yields to the scheduler at least once before running,
/// even with a zero delay. Dropping the `DeferredTask` cancels it, so the
/// owner's map of pending tasks is also the cancellation mechanism.
#[derive(Debug)]
pub struct DeferredTask {
    handle: JoinHandle<()>,
}

impl DeferredTask {
    /// Spawns `work` to run after `delay`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F>(delay: Duration, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::task::yield_now().await;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            work.await;
        });
        Self { handle }
    }

    /// Cancels the task. A no-op if it already ran.
    pub fn cancel(self) {
        drop(self);
    }

    /// `true` once the work has run or the task was aborted.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for DeferredTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deferred_task_runs_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let task = DeferredTask::spawn(Duration::from_millis(100), async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_task_cancel_prevents_run() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let task = DeferredTask::spawn(Duration::from_millis(100), async move {
            flag.store(true, Ordering::SeqCst);
        });
        task.cancel();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_deferred_task_zero_delay_does_not_run_inline() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let _task = DeferredTask::spawn(Duration::ZERO, async move {
            flag.store(true, Ordering::SeqCst);
        });

        // Spawning never runs the work on the caller's stack.
        assert!(!fired.load(Ordering::SeqCst));

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(fired.load(Ordering::SeqCst));
    }
}
