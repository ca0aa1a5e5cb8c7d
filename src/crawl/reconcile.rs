//! Content reconciliation for in-flight crawls
//!
//! A crawl job delivers overlapping page sets across polls: every status
//! snapshot may repeat pages from earlier snapshots alongside new ones.
//! The reconciler merges those snapshots into one accumulated result,
//! deduplicating by source URL so ingestion is idempotent and the two
//! polling loops can observe snapshots in any relative order.

use crate::crawl::{CrawlStatus, Page};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Title used until a crawled page provides one
const DEFAULT_TITLE: &str = "Untitled Website";

/// Accumulates pages from successive crawl-status snapshots
///
/// Append-only from the consumer's point of view: pages are never removed,
/// the main title is sticky once set, and page order is first-observed
/// order regardless of how often a page reappears in later snapshots.
#[derive(Debug, Default)]
pub struct ContentReconciler {
    seen: HashSet<String>,
    pages: Vec<Page>,
    sources: Vec<String>,
    main_title: Option<String>,
    combined: String,
    completed: u32,
    total: u32,
}

/// Snapshot-safe copy of the accumulated content for display
#[derive(Debug, Clone)]
pub struct PartialContent {
    /// Main title of the site (first non-empty page title observed)
    pub title: String,

    /// Combined markdown with per-page source separators
    pub content: String,

    /// Page URLs in first-observed order
    pub sources: Vec<String>,

    /// Accumulated pages
    pub pages: Vec<Page>,

    /// Pages fetched so far, per the latest snapshot
    pub completed: u32,

    /// Total pages expected, per the latest snapshot
    pub total: u32,
}

/// Final crawled-site bundle handed to summarization and chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledSite {
    /// Root URL the crawl was requested for
    pub url: String,

    /// Main title of the site
    pub title: String,

    /// All crawled pages in first-observed order
    pub pages: Vec<Page>,

    /// Total pages reported by the crawl service
    #[serde(rename = "totalPages")]
    pub total_pages: u32,
}

impl ContentReconciler {
    /// Create an empty reconciler
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a crawl-status snapshot into the accumulated content
    ///
    /// Pages already seen (by URL) are skipped entirely, so calling this
    /// with identical or overlapping snapshots is a no-op for the repeats.
    /// Progress counters only move forward; a stale snapshot from the
    /// slower polling loop cannot walk them back.
    pub fn ingest(&mut self, snapshot: &CrawlStatus) {
        for page in &snapshot.pages {
            if !self.seen.insert(page.url.clone()) {
                continue;
            }

            if self.main_title.is_none() && !page.title.is_empty() {
                self.main_title = Some(page.title.clone());
            }

            if self.combined.is_empty() {
                // First page opens the document with a title header
                self.combined.push_str(&format!("# {}\n\n", self.title()));
                if let Some(description) = &page.description {
                    if !description.is_empty() {
                        self.combined.push_str(&format!("{}\n\n", description));
                    }
                }
            } else {
                self.combined
                    .push_str(&format!("\n\n--- Content from {} ---\n\n", page.url));
            }

            self.combined.push_str(&page.content);
            self.sources.push(page.url.clone());
            self.pages.push(page.clone());
        }

        self.completed = self.completed.max(snapshot.completed);
        self.total = self.total.max(snapshot.total);
    }

    /// The accumulated main title, or the placeholder if none was seen yet
    pub fn title(&self) -> String {
        self.main_title
            .clone()
            .unwrap_or_else(|| DEFAULT_TITLE.to_string())
    }

    /// Whether no pages have been ingested yet
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Number of distinct pages ingested so far
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Latest progress counters as `(completed, total)`
    pub fn counters(&self) -> (u32, u32) {
        (self.completed, self.total)
    }

    /// Copy-on-read snapshot of the accumulated content
    pub fn partial(&self) -> PartialContent {
        PartialContent {
            title: self.title(),
            content: self.combined.clone(),
            sources: self.sources.clone(),
            pages: self.pages.clone(),
            completed: self.completed,
            total: self.total,
        }
    }

    /// Consume the reconciler into the final site bundle
    pub fn into_site(self, url: impl Into<String>) -> CrawledSite {
        let title = self.title();
        let total_pages = self.total.max(self.pages.len() as u32);
        CrawledSite {
            url: url.into(),
            title,
            pages: self.pages,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::JobStatus;

    fn page(url: &str, title: &str, content: &str) -> Page {
        Page {
            url: url.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            description: None,
        }
    }

    fn snapshot(pages: Vec<Page>, completed: u32, total: u32) -> CrawlStatus {
        CrawlStatus {
            status: JobStatus::Scraping,
            completed,
            total,
            pages,
        }
    }

    #[test]
    fn test_ingest_is_idempotent() {
        let snap = snapshot(
            vec![
                page("https://a.test/", "A", "alpha"),
                page("https://a.test/b", "B", "beta"),
            ],
            2,
            2,
        );

        let mut once = ContentReconciler::new();
        once.ingest(&snap);

        let mut twice = ContentReconciler::new();
        twice.ingest(&snap);
        twice.ingest(&snap);

        assert_eq!(once.page_count(), twice.page_count());
        assert_eq!(once.partial().content, twice.partial().content);
        assert_eq!(once.partial().sources, twice.partial().sources);
    }

    #[test]
    fn test_union_keeps_first_observed_order() {
        let mut reconciler = ContentReconciler::new();
        reconciler.ingest(&snapshot(vec![page("https://a.test/", "A", "alpha")], 1, 2));
        reconciler.ingest(&snapshot(
            vec![
                page("https://a.test/", "A", "alpha"),
                page("https://a.test/b", "B", "beta"),
            ],
            2,
            2,
        ));

        let partial = reconciler.partial();
        assert_eq!(partial.sources, vec!["https://a.test/", "https://a.test/b"]);
        assert_eq!(partial.pages.len(), 2);
    }

    #[test]
    fn test_main_title_is_sticky() {
        let mut reconciler = ContentReconciler::new();
        reconciler.ingest(&snapshot(vec![page("https://a.test/", "", "no title")], 1, 3));
        assert_eq!(reconciler.title(), "Untitled Website");

        reconciler.ingest(&snapshot(
            vec![page("https://a.test/b", "First Real Title", "beta")],
            2,
            3,
        ));
        assert_eq!(reconciler.title(), "First Real Title");

        reconciler.ingest(&snapshot(
            vec![page("https://a.test/c", "Different Title", "gamma")],
            3,
            3,
        ));
        assert_eq!(reconciler.title(), "First Real Title");
    }

    #[test]
    fn test_first_page_gets_header_later_pages_get_separator() {
        let mut reconciler = ContentReconciler::new();
        let mut first = page("https://a.test/", "Home", "welcome");
        first.description = Some("A fine site".to_string());
        reconciler.ingest(&snapshot(vec![first], 1, 2));
        reconciler.ingest(&snapshot(vec![page("https://a.test/b", "B", "beta")], 2, 2));

        let content = reconciler.partial().content;
        assert!(content.starts_with("# Home\n\nA fine site\n\n"));
        assert!(content.contains("--- Content from https://a.test/b ---"));
        assert!(content.contains("welcome"));
        assert!(content.contains("beta"));
    }

    #[test]
    fn test_counters_never_move_backward() {
        let mut reconciler = ContentReconciler::new();
        reconciler.ingest(&snapshot(vec![], 4, 10));
        // Stale snapshot from the slower loop
        reconciler.ingest(&snapshot(vec![], 2, 8));
        assert_eq!(reconciler.counters(), (4, 10));
    }

    #[test]
    fn test_into_site_uses_page_count_floor() {
        let mut reconciler = ContentReconciler::new();
        reconciler.ingest(&snapshot(vec![page("https://a.test/", "A", "alpha")], 1, 0));
        let site = reconciler.into_site("https://a.test");
        assert_eq!(site.total_pages, 1);
        assert_eq!(site.title, "A");
        assert_eq!(site.url, "https://a.test");
    }
}
