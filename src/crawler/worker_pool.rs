use crate::crawler::client::PageSource;
use crate::crawler::engine::{Crawler, PassSummary};
use crate::models::Task;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runs several tasks at once, one task per worker. Each task is still
/// crawled strictly page by page.
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
    sender: mpsc::Sender<Task>,
}

struct WorkerHandle {
    id: usize,
    handle: tokio::task::JoinHandle<PassSummary>,
}

impl WorkerPool {
    pub fn new<S: PageSource + 'static>(
        crawler: Crawler<S>,
        worker_count: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(worker_count.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..worker_count.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    crawler: crawler.clone(),
                    receiver: receiver.clone(),
                    shutdown: shutdown.clone(),
                };
                WorkerHandle {
                    id,
                    handle: tokio::spawn(worker.run()),
                }
            })
            .collect();

        Self { workers, sender }
    }

    /// Queues a task. Returns false once every worker has gone away.
    pub async fn submit(&self, task: Task) -> bool {
        self.sender.send(task).await.is_ok()
    }

    /// Closes the queue and waits for the workers to drain it.
    pub async fn finish(self) -> PassSummary {
        drop(self.sender);

        let (ids, handles): (Vec<_>, Vec<_>) = self
            .workers
            .into_iter()
            .map(|worker| (worker.id, worker.handle))
            .unzip();

        let mut summary = PassSummary::default();
        for (id, result) in ids.into_iter().zip(futures::future::join_all(handles).await) {
            match result {
                Ok(worker_summary) => summary.merge(worker_summary),
                Err(e) => error!("Worker {} panicked: {}", id, e),
            }
        }
        summary
    }
}

struct Worker<S> {
    id: usize,
    crawler: Crawler<S>,
    receiver: Arc<Mutex<mpsc::Receiver<Task>>>,
    shutdown: CancellationToken,
}

impl<S: PageSource + 'static> Worker<S> {
    async fn run(self) -> PassSummary {
        info!("Worker {} started", self.id);
        let mut summary = PassSummary::default();

        loop {
            let task = {
                let mut receiver = self.receiver.lock().await;
                match receiver.recv().await {
                    Some(task) => task,
                    None => break,
                }
            };

            if self.shutdown.is_cancelled() {
                continue;
            }

            let task_id = task.id;
            summary.record(task_id, self.crawler.crawl_task(task, &self.shutdown).await);
        }

        info!("Worker {} shutting down", self.id);
        summary
    }
}
