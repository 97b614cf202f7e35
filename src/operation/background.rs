use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Bounded pool for operation bodies.
///
/// Submission never blocks the caller: the task is spawned immediately and
/// waits for a permit before the body starts, so at most `pool_size` bodies
/// execute concurrently while the rest queue in `Pending`.
#[derive(Debug, Clone)]
pub struct BackgroundExecutor {
    permits: Arc<Semaphore>,
}

impl BackgroundExecutor {
    #[must_use]
    pub fn new(pool_size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(pool_size.max(1))),
        }
    }

    pub fn spawn<F>(&self, work: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            // The semaphore is never closed while the executor lives.
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            work.await;
        })
    }

    #[must_use]
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_pool_bound_limits_concurrency() {
        let pool = BackgroundExecutor::new(1);
        let running = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let first_running = Arc::clone(&running);
        let first = pool.spawn(async move {
            first_running.fetch_add(1, Ordering::SeqCst);
            let _ = release_rx.await;
        });

        // Give the first task time to take the only permit.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let second_running = Arc::clone(&running);
        let second = pool.spawn(async move {
            second_running.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(running.load(Ordering::SeqCst), 1);

        release_tx.send(()).unwrap();
        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(running.load(Ordering::SeqCst), 2);
    }
}
