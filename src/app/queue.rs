use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Runs import jobs as tokio tasks, optionally capping how many run at once.
#[derive(Debug, Clone, Default)]
pub struct InProcessQueue {
    semaphore: Option<Arc<Semaphore>>,
}

impl InProcessQueue {
    pub fn unbounded() -> Self {
        Self { semaphore: None }
    }

    pub fn new(max_concurrency: Option<usize>) -> Self {
        Self {
            semaphore: max_concurrency.map(|n| Arc::new(Semaphore::new(n.max(1)))),
        }
    }

    pub fn spawn<F>(&self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        tokio::spawn(async move {
            let _permit = match semaphore {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        tracing::error!("job queue semaphore is closed");
                        return;
                    }
                },
                None => None,
            };
            fut.await;
        })
    }
}
