// Per-task crawl state machine.
//
// A task is RUNNING while `enabled` is set and DONE once disabled. Each
// iteration fetches one page at the task's watermark, registers the page's
// addresses, records its transactions and commits the new watermark. A crash
// anywhere in between is safe to resume: address upserts are conflict
// tolerant and duplicate transactions are no-ops.

use crate::config::Config;
use crate::crawler::client::{FetchError, PageSource};
use crate::crawler::models::{extract_page, ExtractedPage};
use crate::crawler::worker_pool::WorkerPool;
use crate::db::transaction::{add_transaction, InsertOutcome};
use crate::db::{task as task_store, StoreError};
use crate::models::{Task, TaskId, Transaction};
use crate::registry::AddressRegistry;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Task {task_id}: fetching {url} failed: {source}")]
    Fetch {
        task_id: TaskId,
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for CrawlError {
    fn from(err: sqlx::Error) -> Self {
        CrawlError::Store(StoreError::Database(err))
    }
}

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Pause before every request to the explorer.
    pub fetch_delay: Duration,
    pub workers: usize,
}

impl CrawlSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fetch_delay: config.fetch_delay,
            workers: config.crawl_workers,
        }
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            fetch_delay: Duration::from_millis(200),
            workers: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    /// `result` was null or an empty list.
    EmptyPage,
    /// A single record at the cursor block: the API echoed the last stored row.
    EchoedCursor,
    /// A recorded page left the cursor where it was, so the next request
    /// would repeat it.
    Stalled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageStats {
    pub last_block: u64,
    pub new_addresses: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Continue(PageStats),
    Done { last_block: u64, reason: DoneReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Done { last_block: u64, pages: usize },
    /// Shutdown was requested between pages; the task stays enabled.
    Interrupted { last_block: u64, pages: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub tasks: usize,
    pub completed: usize,
    pub interrupted: usize,
    pub failed: usize,
}

impl PassSummary {
    pub fn record(&mut self, task_id: TaskId, result: Result<TaskOutcome, CrawlError>) {
        self.tasks += 1;
        match result {
            Ok(TaskOutcome::Done { last_block, pages }) => {
                info!("Task {} done at block {} after {} pages", task_id, last_block, pages);
                self.completed += 1;
            }
            Ok(TaskOutcome::Interrupted { last_block, pages }) => {
                info!("Task {} interrupted at block {} after {} pages", task_id, last_block, pages);
                self.interrupted += 1;
            }
            Err(e) => {
                error!("Task {} halted, will resume next pass: {}", task_id, e);
                self.failed += 1;
            }
        }
    }

    pub fn merge(&mut self, other: PassSummary) {
        self.tasks += other.tasks;
        self.completed += other.completed;
        self.interrupted += other.interrupted;
        self.failed += other.failed;
    }
}

pub struct Crawler<S> {
    source: Arc<S>,
    registry: AddressRegistry,
    settings: CrawlSettings,
}

impl<S> Clone for Crawler<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            registry: self.registry.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S: PageSource + 'static> Crawler<S> {
    pub fn new(source: S, registry: AddressRegistry, settings: CrawlSettings) -> Self {
        Self {
            source: Arc::new(source),
            registry,
            settings,
        }
    }

    pub fn registry(&self) -> &AddressRegistry {
        &self.registry
    }

    /// Drains every enabled task. Per-task failures are logged and counted;
    /// only failing to read the task list aborts the pass.
    pub async fn run_pass(&self, shutdown: &CancellationToken) -> Result<PassSummary, CrawlError> {
        let tasks = task_store::list_enabled(self.registry.pool()).await?;
        if tasks.is_empty() {
            info!("No enabled tasks");
            return Ok(PassSummary::default());
        }

        info!("Crawling {} enabled tasks with {} worker(s)", tasks.len(), self.settings.workers);

        if self.settings.workers > 1 {
            let pool = WorkerPool::new(self.clone(), self.settings.workers, shutdown.clone());
            for task in tasks {
                if !pool.submit(task).await {
                    break;
                }
            }
            return Ok(pool.finish().await);
        }

        let mut summary = PassSummary::default();
        for task in tasks {
            if shutdown.is_cancelled() {
                info!("Shutdown requested, leaving remaining tasks for the next pass");
                break;
            }
            let task_id = task.id;
            summary.record(task_id, self.crawl_task(task, shutdown).await);
        }

        Ok(summary)
    }

    /// Loops one task page by page until it is DONE, shutdown is requested,
    /// or a store/transport failure halts it. A recorded page that leaves the
    /// cursor in place ends the task, since the next request would repeat it.
    pub async fn crawl_task(
        &self,
        mut task: Task,
        shutdown: &CancellationToken,
    ) -> Result<TaskOutcome, CrawlError> {
        info!("Task {}: crawling chain {} from block {}", task.id, task.chain, task.last_block);

        // The tracked address carries the task's initial annotations
        self.registry
            .merge_annotations(task.chain, &task.address, &task.tags, &task.services)
            .await?;

        let mut pages = 0;
        loop {
            if shutdown.is_cancelled() {
                return Ok(TaskOutcome::Interrupted {
                    last_block: task.last_block,
                    pages,
                });
            }

            let start = task.last_block;
            match self.process_page(&mut task).await? {
                PageOutcome::Continue(stats) => {
                    pages += 1;
                    debug!("Task {}: page {} committed: {:?}", task.id, pages, stats);

                    if stats.last_block == start {
                        self.finish(&mut task, DoneReason::Stalled).await?;
                        return Ok(TaskOutcome::Done {
                            last_block: task.last_block,
                            pages,
                        });
                    }
                }
                PageOutcome::Done { last_block, reason } => {
                    debug!("Task {}: finished ({:?})", task.id, reason);
                    return Ok(TaskOutcome::Done { last_block, pages });
                }
            }
        }
    }

    /// One iteration: fetch, decide termination, register, record, commit.
    ///
    /// A page with several records is recorded even when it does not raise
    /// the watermark: rows sharing the cursor block may have been cut off the
    /// previous page. `crawl_task` ends the task after such a page.
    pub async fn process_page(&self, task: &mut Task) -> Result<PageOutcome, CrawlError> {
        let url = task.page_url();
        debug!("Task {}: fetching {}", task.id, url);

        sleep(self.settings.fetch_delay).await;
        let page = self
            .source
            .fetch_page(&url)
            .await
            .map_err(|source| CrawlError::Fetch {
                task_id: task.id,
                url: url.clone(),
                source,
            })?;

        let records = match page.records {
            Some(records) if !records.is_empty() => records,
            _ => return self.finish(task, DoneReason::EmptyPage).await,
        };

        let extracted = extract_page(&records, task.id, &url);
        let watermark = extracted.watermark(task.last_block);
        if records.len() == 1 && watermark == task.last_block {
            return self.finish(task, DoneReason::EchoedCursor).await;
        }

        let new_addresses = self.register_addresses(task.chain, &extracted).await?;
        let mut stats = self.record_transactions(task, &url, &extracted).await?;
        stats.new_addresses = new_addresses;
        stats.skipped = extracted.skipped;

        task_store::advance(self.registry.pool(), task.id, watermark).await?;
        task.last_block = watermark;
        stats.last_block = watermark;

        Ok(PageOutcome::Continue(stats))
    }

    async fn finish(&self, task: &mut Task, reason: DoneReason) -> Result<PageOutcome, CrawlError> {
        task_store::disable(self.registry.pool(), task.id, task.last_block).await?;
        task.enabled = false;
        info!("Task {}: DONE at block {} ({:?})", task.id, task.last_block, reason);

        Ok(PageOutcome::Done {
            last_block: task.last_block,
            reason,
        })
    }

    async fn register_addresses(&self, chain: i64, page: &ExtractedPage) -> Result<usize, CrawlError> {
        let hashes: BTreeSet<Vec<u8>> = page
            .records
            .iter()
            .flat_map(|record| std::iter::once(&record.from).chain(record.to.as_ref()))
            .cloned()
            .collect();

        Ok(self.registry.upsert_addresses(chain, &hashes).await?)
    }

    async fn record_transactions(
        &self,
        task: &Task,
        url: &str,
        page: &ExtractedPage,
    ) -> Result<PageStats, CrawlError> {
        let mut stats = PageStats::default();

        for record in &page.records {
            let from = self.registry.resolve_address_ids(task.chain, &record.from).await?;
            let to = match &record.to {
                Some(hash) => self.registry.resolve_address_ids(task.chain, hash).await?,
                None => Vec::new(),
            };
            if from.is_empty() {
                warn!("Task {}: sender 0x{} is not registered", task.id, hex::encode(&record.from));
            }

            let transaction = Transaction {
                chain: task.chain,
                hash: record.hash.clone(),
                amount: record.amount,
                from,
                to,
                block_number: record.block_number,
            };

            match add_transaction(self.registry.pool(), &transaction).await {
                Ok(InsertOutcome::Inserted) => stats.inserted += 1,
                Ok(InsertOutcome::Duplicate) => stats.duplicates += 1,
                Err(e) => {
                    warn!(
                        "Task {}: skipping transaction 0x{} from {}: {}",
                        task.id,
                        hex::encode(&record.hash),
                        url,
                        e
                    );
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }
}
