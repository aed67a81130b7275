//! Paginated retrieval with quota-aware suspension.
//!
//! Every list operation in the exporter goes through [`Fetcher::fetch_all`].
//! The page closure performs exactly one request; the fetcher decides whether
//! to advance, wait for the quota window to reset, or give up and keep what it
//! has so far.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::api::{ApiError, MAX_PER_PAGE, Page, PageRequest, short_error_message};
use crate::clock::Clock;
use crate::shutdown::{Shutdown, Wake};

/// Shortest quota wait, so an already-past reset time cannot spin.
pub const MIN_RATE_LIMIT_WAIT: Duration = Duration::from_secs(1);

/// Items of a paginated walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched<T> {
    pub items: Vec<T>,
    /// False when an error or shutdown cut the walk short.
    pub complete: bool,
}

/// Drives page closures to completion.
#[derive(Clone)]
pub struct Fetcher {
    clock: Arc<dyn Clock>,
    per_page: u32,
    shutdown: Shutdown,
}

impl Fetcher {
    /// `per_page` is clamped to `1..=MAX_PER_PAGE`.
    pub fn new(clock: Arc<dyn Clock>, per_page: u32, shutdown: Shutdown) -> Self {
        Self {
            clock,
            per_page: per_page.clamp(1, MAX_PER_PAGE),
            shutdown,
        }
    }

    #[inline]
    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// Fetch every page of one resource and concatenate the items in order.
    ///
    /// `operation` and `target` only label log records. Quota exhaustion
    /// suspends until the reported reset and retries the same page; any other
    /// error ends the walk and returns what was collected so far.
    pub async fn fetch_all<T, F, Fut>(&self, operation: &str, target: &str, fetch_page: F) -> Vec<T>
    where
        F: FnMut(PageRequest) -> Fut,
        Fut: Future<Output = Result<Page<T>, ApiError>>,
    {
        self.fetch_pages(operation, target, fetch_page).await.items
    }

    /// Like [`fetch_all`](Self::fetch_all), but also reports whether the walk
    /// reached the last page.
    pub async fn fetch_pages<T, F, Fut>(
        &self,
        operation: &str,
        target: &str,
        mut fetch_page: F,
    ) -> Fetched<T>
    where
        F: FnMut(PageRequest) -> Fut,
        Fut: Future<Output = Result<Page<T>, ApiError>>,
    {
        let mut items = Vec::new();
        let mut request = PageRequest::first(self.per_page);

        let complete = loop {
            match fetch_page(request).await {
                Ok(page) => {
                    items.extend(page.items);
                    match page.next_page {
                        Some(next) if next > request.page => request = request.with_page(next),
                        _ => break true,
                    }
                }
                Err(ApiError::RateLimited { reset_at }) => {
                    if !self.wait_for_reset(operation, target, reset_at).await {
                        break false;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        operation,
                        target,
                        page = request.page,
                        fetched = items.len(),
                        error = %short_error_message(&e),
                        "Fetch failed, keeping partial results"
                    );
                    break false;
                }
            }
        };

        Fetched { items, complete }
    }

    /// Run a single non-paginated call under the same quota rules.
    pub async fn fetch_one<T, F, Fut>(&self, operation: &str, target: &str, mut call: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        loop {
            match call().await {
                Ok(value) => return Some(value),
                Err(ApiError::RateLimited { reset_at }) => {
                    if !self.wait_for_reset(operation, target, reset_at).await {
                        return None;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        operation,
                        target,
                        error = %short_error_message(&e),
                        "Fetch failed"
                    );
                    return None;
                }
            }
        }
    }

    /// Sleep until `reset_at`. Returns false if shutdown interrupted the wait.
    async fn wait_for_reset(&self, operation: &str, target: &str, reset_at: DateTime<Utc>) -> bool {
        let wait = quota_wait(reset_at, self.clock.now());
        tracing::warn!(
            operation,
            target,
            reset_at = %reset_at,
            wait_secs = wait.as_secs(),
            "Rate limit exhausted, waiting for reset"
        );

        match self.shutdown.sleep(wait).await {
            Wake::Elapsed => true,
            Wake::Stopped => {
                tracing::debug!(operation, target, "Quota wait interrupted by shutdown");
                false
            }
        }
    }
}

/// Time left until `reset_at`, never less than [`MIN_RATE_LIMIT_WAIT`].
pub fn quota_wait(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (reset_at - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
        .max(MIN_RATE_LIMIT_WAIT)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::clock::ManualClock;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn fetcher(per_page: u32) -> Fetcher {
        Fetcher::new(Arc::new(ManualClock::new(t0())), per_page, Shutdown::never())
    }

    #[test]
    fn quota_wait_is_floored() {
        assert_eq!(quota_wait(t0() + chrono::Duration::seconds(90), t0()), Duration::from_secs(90));
        assert_eq!(quota_wait(t0() - chrono::Duration::seconds(90), t0()), MIN_RATE_LIMIT_WAIT);
        assert_eq!(quota_wait(t0(), t0()), MIN_RATE_LIMIT_WAIT);
    }

    #[test]
    fn per_page_is_clamped() {
        assert_eq!(fetcher(500).per_page(), MAX_PER_PAGE);
        assert_eq!(fetcher(0).per_page(), 1);
        assert_eq!(fetcher(30).per_page(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn concatenates_pages_in_order() {
        let sizes = [200u32, 200, 50];
        let calls = Arc::new(AtomicU32::new(0));

        let fetched = fetcher(200)
            .fetch_all("list_workflow_runs", "octo/repo", |req| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let idx = (req.page - 1) as usize;
                    let start = sizes[..idx].iter().sum::<u32>();
                    let items: Vec<u32> = (start..start + sizes[idx]).collect();
                    if req.page < 3 {
                        Ok(Page::with_next(items, req.page + 1))
                    } else {
                        Ok(Page::last(items))
                    }
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(fetched.len(), 450);
        assert!(fetched.iter().copied().eq(0..450));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_reset_then_retries_same_page() {
        let reset_at = t0() + chrono::Duration::seconds(120);
        let seen_pages: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let started = tokio::time::Instant::now();

        let fetched = fetcher(100)
            .fetch_all("list_org_repos", "octo", |req| {
                let seen_pages = Arc::clone(&seen_pages);
                async move {
                    let mut seen = seen_pages.lock().unwrap_or_else(|e| e.into_inner());
                    seen.push(req.page);
                    match (req.page, seen.len()) {
                        (1, _) => Ok(Page::with_next(vec!["a"], 2)),
                        (2, 2) => Err(ApiError::RateLimited { reset_at }),
                        _ => Ok(Page::last(vec!["b"])),
                    }
                }
            })
            .await;

        assert!(started.elapsed() >= Duration::from_secs(120));
        assert_eq!(fetched, vec!["a", "b"]);
        assert_eq!(
            *seen_pages.lock().unwrap_or_else(|e| e.into_inner()),
            vec![1, 2, 2]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_exhausted_retries_once_after_reset() {
        let reset_at = t0() + chrono::Duration::seconds(30);
        let started = tokio::time::Instant::now();
        let call_times: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));

        let fetched = fetcher(100)
            .fetch_all("list_org_runners", "octo", |_| {
                let call_times = Arc::clone(&call_times);
                async move {
                    let mut times = call_times.lock().unwrap_or_else(|e| e.into_inner());
                    times.push(started.elapsed());
                    if times.len() == 1 {
                        Err(ApiError::RateLimited { reset_at })
                    } else {
                        Ok(Page::last(vec!["runner"]))
                    }
                }
            })
            .await;

        let times = call_times.lock().unwrap_or_else(|e| e.into_inner()).clone();
        assert_eq!(fetched, vec!["runner"]);
        assert_eq!(times.len(), 2);
        assert!(times[1] >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_return_partial_results() {
        let calls = Arc::new(AtomicU32::new(0));

        let fetched = fetcher(100)
            .fetch_all("list_workflow_jobs", "octo/repo#1", |req| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if req.page == 1 {
                        Ok(Page::with_next(vec![1, 2], 2))
                    } else {
                        Err(ApiError::api(502, "bad gateway"))
                    }
                }
            })
            .await;

        assert_eq!(fetched, vec![1, 2]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_pages_reports_incomplete_walks() {
        let fetched = fetcher(100)
            .fetch_pages("list_workflow_jobs", "octo/repo#1", |req| async move {
                if req.page == 1 {
                    Ok(Page::with_next(vec![1], 2))
                } else {
                    Err(ApiError::api(502, "bad gateway"))
                }
            })
            .await;
        assert_eq!(fetched.items, vec![1]);
        assert!(!fetched.complete);

        let fetched = fetcher(100)
            .fetch_pages("list_workflow_jobs", "octo/repo#1", |_| async {
                Ok(Page::last(vec![1, 2]))
            })
            .await;
        assert_eq!(fetched.items, vec![1, 2]);
        assert!(fetched.complete);
    }

    #[tokio::test(start_paused = true)]
    async fn self_referencing_next_page_terminates() {
        let calls = Arc::new(AtomicU32::new(0));

        let fetched = fetcher(100)
            .fetch_all("list_org_runners", "octo", |req| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Page::with_next(vec![req.page], req.page))
                }
            })
            .await;

        assert_eq!(fetched, vec![1]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_quota_wait() {
        let (trigger, shutdown) = Shutdown::new();
        let fetcher = Fetcher::new(Arc::new(ManualClock::new(t0())), 100, shutdown);
        let reset_at = t0() + chrono::Duration::hours(1);

        let task = tokio::spawn(async move {
            fetcher
                .fetch_all("list_org_repos", "octo", |req| async move {
                    if req.page == 1 {
                        Ok(Page::with_next(vec![1u32], 2))
                    } else {
                        Err(ApiError::RateLimited { reset_at })
                    }
                })
                .await
        });

        tokio::task::yield_now().await;
        trigger.trigger();

        assert_eq!(task.await.unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_one_retries_after_rate_limit() {
        let calls = Arc::new(AtomicU32::new(0));
        let reset_at = t0() + chrono::Duration::seconds(5);

        let value = fetcher(100)
            .fetch_one("get_run_usage", "octo/repo#9", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ApiError::RateLimited { reset_at })
                    } else {
                        Ok(1234u64)
                    }
                }
            })
            .await;

        assert_eq!(value, Some(1234));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_one_gives_up_on_other_errors() {
        let value: Option<u64> = fetcher(100)
            .fetch_one("get_run_usage", "octo/repo#9", || async {
                Err(ApiError::not_found("run 9"))
            })
            .await;
        assert!(value.is_none());
    }
}
