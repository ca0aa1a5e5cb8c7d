//! Crawl progress orchestration
//!
//! The orchestrator owns the lifecycle of one crawl job at a time: it
//! starts the job, then runs two concurrent polling loops against the
//! crawl service. Status polling is cheap and runs on a short period;
//! content polling is heavier and runs on a longer one. Both feed the same
//! [`ContentReconciler`], whose ingestion is idempotent, so the loops may
//! observe overlapping snapshots in any relative order.
//!
//! Progress is published through a `tokio::sync::watch` channel: every
//! tick recomputes a [`ProgressSnapshot`] and the latest value wins.
//! Resubmitting a URL cancels that URL's previous job before the new one
//! starts; jobs for different URLs run independently, so concurrent
//! submissions never interfere with each other.

use crate::crawl::{ContentReconciler, CrawlClient, CrawlConfig, CrawlStatus, CrawledSite, JobStatus};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, instrument, warn};

/// Phase of the crawl-and-summarize pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Job submitted, no job id known yet
    Initializing,
    /// Job running, pages arriving
    Crawling,
    /// Crawl finished, summary generation pending
    Summarizing,
    /// Pipeline finished successfully
    Complete,
    /// Pipeline finished with a terminal error
    Failed,
}

/// The value published to consumers on every poll tick
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    /// Current phase
    pub phase: Phase,

    /// Completion percentage, clamped to 0..=100
    pub percent: u8,

    /// Pages fetched so far
    pub completed: u32,

    /// Total pages expected
    pub total: u32,

    /// Human-readable progress line
    pub status_text: String,
}

impl ProgressSnapshot {
    fn new(phase: Phase, completed: u32, total: u32, status_text: impl Into<String>) -> Self {
        Self {
            phase,
            percent: percent(completed, total),
            completed,
            total,
            status_text: status_text.into(),
        }
    }
}

/// Completion percentage from page counters, with a zero-total guard
pub fn percent(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let raw = (u64::from(completed) * 100) / u64::from(total);
    raw.min(100) as u8
}

/// Human-readable progress line for a crawl-status snapshot
pub fn progress_message(status: &CrawlStatus) -> String {
    match status.status {
        JobStatus::Scraping => format!(
            "Crawl in progress: {}/{} pages completed",
            status.completed, status.total
        ),
        JobStatus::Completed => format!("Crawl completed: {} pages crawled", status.completed),
        JobStatus::Failed => "Crawl failed".to_string(),
        JobStatus::Queued | JobStatus::Unknown => "Initializing crawl...".to_string(),
    }
}

/// The two crawl-service operations the orchestrator needs
///
/// Implemented by [`CrawlClient`]; tests substitute fakes.
pub trait CrawlSource: Send + Sync + 'static {
    /// Start a crawl job, returning the job id
    fn start(&self, url: &str) -> impl Future<Output = Result<String>> + Send;

    /// Fetch the current status of a job
    fn status(&self, job_id: &str) -> impl Future<Output = Result<CrawlStatus>> + Send;
}

impl CrawlSource for CrawlClient {
    fn start(&self, url: &str) -> impl Future<Output = Result<String>> + Send {
        self.start_crawl(url)
    }

    fn status(&self, job_id: &str) -> impl Future<Output = Result<CrawlStatus>> + Send {
        self.crawl_status(job_id)
    }
}

/// Cancellation plumbing for one job, shared between the returned handle
/// and the orchestrator's single-active-job slot
#[derive(Clone)]
struct JobGuard {
    driver: AbortHandle,
    content_task: Arc<StdMutex<Option<JoinHandle<()>>>>,
    cancelled: Arc<AtomicBool>,
}

impl JobGuard {
    /// Whether the driver task has already run to completion
    fn is_finished(&self) -> bool {
        self.driver.is_finished()
    }

    /// Stop both polling loops; idempotent
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.driver.abort();
        if let Some(task) = self
            .content_task
            .lock()
            .expect("content task lock poisoned")
            .take()
        {
            task.abort();
        }
    }
}

/// Handle to one in-flight crawl job
///
/// Dropping the handle does not stop the job; call [`CrawlHandle::cancel`]
/// to stop the local polling loops. There is no remote cancellation: the
/// crawl service keeps running its job either way.
pub struct CrawlHandle {
    progress: watch::Receiver<ProgressSnapshot>,
    job_id: watch::Receiver<Option<String>>,
    driver: JoinHandle<Result<CrawledSite>>,
    guard: JobGuard,
}

impl CrawlHandle {
    /// A receiver for progress snapshots; the latest value wins
    pub fn progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.clone()
    }

    /// A receiver that resolves to the job id once the service assigns one
    pub fn job_id(&self) -> watch::Receiver<Option<String>> {
        self.job_id.clone()
    }

    /// Wait for the crawl to finish and return the accumulated site
    pub async fn wait(self) -> Result<CrawledSite> {
        match self.driver.await {
            Ok(result) => result,
            // The driver only ever ends without a result via cancel()
            Err(_) => Err(Error::CrawlFailed),
        }
    }

    /// Stop both polling loops; idempotent
    pub fn cancel(&self) {
        self.guard.cancel();
    }
}

/// Orchestrates crawl jobs against a crawl source
///
/// Enforces at most one active job per URL: resubmitting a URL
/// synchronously cancels that URL's previous polling loops before
/// starting, while jobs for different URLs run side by side.
pub struct Orchestrator<S: CrawlSource> {
    source: Arc<S>,
    config: CrawlConfig,
    active: Mutex<HashMap<String, JobGuard>>,
}

impl<S: CrawlSource> Orchestrator<S> {
    /// Create a new orchestrator
    pub fn new(source: S, config: CrawlConfig) -> Self {
        Self {
            source: Arc::new(source),
            config,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Submit a URL for crawling, cancelling that URL's previous job first
    #[instrument(skip(self), level = "debug")]
    pub async fn submit(&self, url: &str) -> CrawlHandle {
        let mut active = self.active.lock().await;
        active.retain(|_, guard| !guard.is_finished());
        if let Some(previous) = active.remove(url) {
            debug!("Cancelling previous crawl job for {} before resubmission", url);
            previous.cancel();
        }

        let handle = spawn_job(self.source.clone(), self.config.clone(), url.to_string());
        active.insert(url.to_string(), handle.guard.clone());
        handle
    }
}

/// Spawn the driver task for one crawl job
fn spawn_job<S: CrawlSource>(source: Arc<S>, config: CrawlConfig, url: String) -> CrawlHandle {
    let (tx, rx) = watch::channel(ProgressSnapshot::new(
        Phase::Initializing,
        0,
        0,
        format!("Initiating crawl for {}...", url),
    ));
    let (job_id_tx, job_id_rx) = watch::channel(None);
    let content_task: Arc<StdMutex<Option<JoinHandle<()>>>> = Arc::new(StdMutex::new(None));
    let cancelled = Arc::new(AtomicBool::new(false));

    let driver = tokio::spawn(drive_crawl(
        source,
        config,
        url,
        tx,
        job_id_tx,
        content_task.clone(),
        cancelled.clone(),
    ));

    let guard = JobGuard {
        driver: driver.abort_handle(),
        content_task,
        cancelled,
    };

    CrawlHandle {
        progress: rx,
        job_id: job_id_rx,
        driver,
        guard,
    }
}

/// Run one crawl job end to end
///
/// Start the job, run the status loop here and the content loop as a
/// sibling task, and resolve to the accumulated site on completion.
async fn drive_crawl<S: CrawlSource>(
    source: Arc<S>,
    config: CrawlConfig,
    url: String,
    tx: watch::Sender<ProgressSnapshot>,
    job_id_tx: watch::Sender<Option<String>>,
    content_task: Arc<StdMutex<Option<JoinHandle<()>>>>,
    cancelled: Arc<AtomicBool>,
) -> Result<CrawledSite> {
    let job_id = match source.start(&url).await {
        Ok(id) => id,
        Err(err) => {
            warn!("Failed to initiate crawl for {}: {}", url, err);
            let _ = tx.send(ProgressSnapshot::new(Phase::Failed, 0, 0, err.user_message()));
            return Err(err);
        }
    };
    info!("Crawl initiated for {} with id {}", url, job_id);
    let _ = job_id_tx.send(Some(job_id.clone()));

    let reconciler = Arc::new(Mutex::new(ContentReconciler::new()));

    // Content polling runs independently on its own, longer period
    {
        let source = source.clone();
        let job_id = job_id.clone();
        let reconciler = reconciler.clone();
        let interval = config.content_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match source.status(&job_id).await {
                    Ok(snapshot) => {
                        let done = snapshot.status.is_terminal();
                        reconciler.lock().await.ingest(&snapshot);
                        // A terminal snapshot is final; no point polling on
                        if done {
                            break;
                        }
                    }
                    Err(err) => {
                        debug!("Content poll failed, will retry: {}", err);
                    }
                }
            }
        });
        // Hold the slot lock while checking the flag so a concurrent
        // cancel() either sees the stored task or we see the flag.
        let mut slot = content_task.lock().expect("content task lock poisoned");
        if cancelled.load(Ordering::SeqCst) {
            task.abort();
        } else {
            *slot = Some(task);
        }
    }

    let result = poll_status(&*source, &config, &job_id, &tx, &reconciler).await;

    // Status loop is done one way or the other; the content loop must not
    // outlive it.
    if let Some(task) = content_task
        .lock()
        .expect("content task lock poisoned")
        .take()
    {
        task.abort();
    }

    match result {
        Ok(()) => {
            let mut guard = reconciler.lock().await;
            if guard.is_empty() {
                let err = Error::NoContent;
                let _ = tx.send(ProgressSnapshot::new(Phase::Failed, 0, 0, err.user_message()));
                return Err(err);
            }
            let accumulated = std::mem::take(&mut *guard);
            drop(guard);

            let (completed, total) = accumulated.counters();
            let _ = tx.send(ProgressSnapshot::new(
                Phase::Summarizing,
                total.max(1),
                total.max(1),
                format!(
                    "Crawl completed: {} pages crawled. Generating summary...",
                    completed
                ),
            ));
            Ok(accumulated.into_site(url))
        }
        Err(err) => {
            let (completed, total, empty) = {
                let guard = reconciler.lock().await;
                let (completed, total) = guard.counters();
                (completed, total, guard.is_empty())
            };
            // Exhausting the budget without a single page is a content
            // failure, not a timeout
            let err = match err {
                Error::Timeout if empty => Error::NoContent,
                other => other,
            };
            let _ = tx.send(ProgressSnapshot::new(
                Phase::Failed,
                completed,
                total,
                err.user_message(),
            ));
            Err(err)
        }
    }
}

/// The bounded status-polling loop
///
/// Poll errors are transient: they are logged and retried on the next
/// tick. Only a `failed` job status or running out of attempts without
/// ever observing `completed` is fatal.
async fn poll_status<S: CrawlSource>(
    source: &S,
    config: &CrawlConfig,
    job_id: &str,
    tx: &watch::Sender<ProgressSnapshot>,
    reconciler: &Mutex<ContentReconciler>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(config.poll_interval);
    for attempt in 1..=config.max_attempts {
        ticker.tick().await;

        let snapshot = match source.status(job_id).await {
            Ok(snapshot) => snapshot,
            Err(err) if err.is_transient() => {
                debug!(
                    "Status poll {}/{} failed, will retry: {}",
                    attempt, config.max_attempts, err
                );
                continue;
            }
            Err(err) => return Err(err),
        };

        reconciler.lock().await.ingest(&snapshot);
        let _ = tx.send(ProgressSnapshot::new(
            Phase::Crawling,
            snapshot.completed,
            snapshot.total,
            progress_message(&snapshot),
        ));

        match snapshot.status {
            JobStatus::Completed => {
                info!(
                    "Crawl {} completed with {} pages",
                    job_id, snapshot.completed
                );
                return Ok(());
            }
            JobStatus::Failed => return Err(Error::CrawlFailed),
            _ => {}
        }
    }

    Err(Error::Timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::Page;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Fake crawl source that scripts status responses
    struct FakeSource {
        /// Status responses returned in order; the last one repeats
        script: Vec<CrawlStatus>,
        starts: AtomicU32,
        calls: AtomicU32,
        calls_by_job: StdMutex<HashMap<String, u32>>,
    }

    impl FakeSource {
        fn new(script: Vec<CrawlStatus>) -> Self {
            Self {
                script,
                starts: AtomicU32::new(0),
                calls: AtomicU32::new(0),
                calls_by_job: StdMutex::new(HashMap::new()),
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn calls_for(&self, job_id: &str) -> u32 {
            *self
                .calls_by_job
                .lock()
                .unwrap()
                .get(job_id)
                .unwrap_or(&0)
        }
    }

    impl CrawlSource for Arc<FakeSource> {
        fn start(&self, url: &str) -> impl Future<Output = Result<String>> + Send {
            // Each start gets a fresh id, like the real service
            let n = self.starts.fetch_add(1, Ordering::SeqCst) + 1;
            let id = format!("job-{}-{}", url, n);
            async move { Ok(id) }
        }

        fn status(&self, job_id: &str) -> impl Future<Output = Result<CrawlStatus>> + Send {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            *self
                .calls_by_job
                .lock()
                .unwrap()
                .entry(job_id.to_string())
                .or_insert(0) += 1;
            let snapshot = self
                .script
                .get(n)
                .or_else(|| self.script.last())
                .expect("script must not be empty")
                .clone();
            async move { Ok(snapshot) }
        }
    }

    fn running(completed: u32, total: u32) -> CrawlStatus {
        CrawlStatus {
            status: JobStatus::Scraping,
            completed,
            total,
            pages: vec![],
        }
    }

    fn completed_with(pages: Vec<Page>) -> CrawlStatus {
        let n = pages.len() as u32;
        CrawlStatus {
            status: JobStatus::Completed,
            completed: n,
            total: n,
            pages,
        }
    }

    fn page(url: &str) -> Page {
        Page {
            url: url.to_string(),
            title: "Title".to_string(),
            content: "content".to_string(),
            description: None,
        }
    }

    fn fast_config(max_attempts: u32) -> CrawlConfig {
        CrawlConfig::builder()
            .api_key("test")
            .max_attempts(max_attempts)
            .poll_interval(Duration::from_millis(5))
            .content_interval(Duration::from_millis(50))
            .build()
    }

    #[test]
    fn test_percent_clamps() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(5, 0), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(3, 3), 100);
        // Should not happen, but must not overflow past 100
        assert_eq!(percent(7, 3), 100);
    }

    #[tokio::test]
    async fn test_completion_hands_off_accumulated_site() {
        let source = Arc::new(FakeSource::new(vec![
            running(1, 2),
            completed_with(vec![page("https://a.test/"), page("https://a.test/b")]),
        ]));
        let orchestrator = Orchestrator::new(source.clone(), fast_config(10));

        let handle = orchestrator.submit("https://a.test").await;
        let mut progress = handle.progress();
        let site = handle.wait().await.unwrap();

        assert_eq!(site.pages.len(), 2);
        assert_eq!(site.url, "https://a.test");

        let last = progress.borrow_and_update().clone();
        assert_eq!(last.phase, Phase::Summarizing);
        assert_eq!(last.percent, 100);
    }

    #[tokio::test]
    async fn test_timeout_exhausts_budget_and_stops_polling() {
        let mut stuck = running(1, 3);
        stuck.pages = vec![page("https://slow.test/")];
        let source = Arc::new(FakeSource::new(vec![stuck]));
        let orchestrator = Orchestrator::new(source.clone(), fast_config(4));

        let handle = orchestrator.submit("https://slow.test").await;
        let mut progress = handle.progress();
        let result = handle.wait().await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(progress.borrow_and_update().phase, Phase::Failed);

        // Both loops must be stopped: no further client calls after failure
        let after_failure = source.call_count();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.call_count(), after_failure);
    }

    #[tokio::test]
    async fn test_job_failed_status_is_terminal() {
        let failed = CrawlStatus {
            status: JobStatus::Failed,
            completed: 0,
            total: 0,
            pages: vec![],
        };
        let source = Arc::new(FakeSource::new(vec![failed]));
        let orchestrator = Orchestrator::new(source.clone(), fast_config(10));

        let handle = orchestrator.submit("https://broken.test").await;
        let result = handle.wait().await;
        assert!(matches!(result, Err(Error::CrawlFailed)));
    }

    #[tokio::test]
    async fn test_exhausted_budget_with_no_pages_is_no_content() {
        let source = Arc::new(FakeSource::new(vec![running(0, 3)]));
        let orchestrator = Orchestrator::new(source.clone(), fast_config(4));

        let handle = orchestrator.submit("https://barren.test").await;
        let result = handle.wait().await;
        assert!(matches!(result, Err(Error::NoContent)));
    }

    #[tokio::test]
    async fn test_completed_with_zero_pages_is_no_content() {
        let source = Arc::new(FakeSource::new(vec![completed_with(vec![])]));
        let orchestrator = Orchestrator::new(source.clone(), fast_config(10));

        let handle = orchestrator.submit("https://empty.test").await;
        let result = handle.wait().await;
        assert!(matches!(result, Err(Error::NoContent)));
    }

    #[tokio::test]
    async fn test_resubmission_cancels_previous_job_for_same_url() {
        let source = Arc::new(FakeSource::new(vec![running(0, 5)]));
        let orchestrator = Orchestrator::new(source.clone(), fast_config(1000));

        let _first = orchestrator.submit("https://a.test").await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(source.calls_for("job-https://a.test-1") > 0);

        let second = orchestrator.submit("https://a.test").await;
        // Give cancellation a moment to land, then take the baseline
        tokio::time::sleep(Duration::from_millis(10)).await;
        let first_calls = source.calls_for("job-https://a.test-1");
        tokio::time::sleep(Duration::from_millis(100)).await;

        // No further polling attributable to the superseded job
        assert_eq!(source.calls_for("job-https://a.test-1"), first_calls);
        assert!(source.calls_for("job-https://a.test-2") > 0);
        second.cancel();
    }

    #[tokio::test]
    async fn test_jobs_for_different_urls_run_independently() {
        let source = Arc::new(FakeSource::new(vec![running(0, 5)]));
        let orchestrator = Orchestrator::new(source.clone(), fast_config(1000));

        let first = orchestrator.submit("https://a.test").await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(source.calls_for("job-https://a.test-1") > 0);
        let second = orchestrator.submit("https://b.test").await;

        // The first job keeps polling after the second is submitted
        tokio::time::sleep(Duration::from_millis(10)).await;
        let a_calls = source.calls_for("job-https://a.test-1");
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(source.calls_for("job-https://a.test-1") > a_calls);
        assert!(source.calls_for("job-https://b.test-2") > 0);

        first.cancel();
        second.cancel();
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let source = Arc::new(FakeSource::new(vec![running(0, 5)]));
        let orchestrator = Orchestrator::new(source.clone(), fast_config(1000));

        let handle = orchestrator.submit("https://a.test").await;
        handle.cancel();
        handle.cancel();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_cancel = source.call_count();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(source.call_count(), after_cancel);
    }
}
