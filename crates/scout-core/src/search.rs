//! Citation search pipeline
//!
//! Implements `Searcher` on top of three leaf services:
//! 1. **Citations**: each query yields candidate source urls
//! 2. **Fetch**: pages are fetched through a bounded pool and cached
//! 3. **Analysis**: each page is analyzed through a bounded pool, with retry
//!
//! Results keep the order of the citations they came from.

use crate::collaborators::Searcher;
use crate::config::SearchConfig;
use crate::error::CollaboratorError;
use crate::retry::with_backoff;
use futures::stream::{self, StreamExt};
use moka::future::Cache;
use scout_graph::{SearchQuery, SearchResult};
use std::sync::Arc;

/// Finds source urls for a query
#[async_trait::async_trait]
pub trait CitationSource: Send + Sync {
    /// Urls cited for the query, possibly none
    async fn citations(&self, query: &SearchQuery) -> Result<Vec<String>, CollaboratorError>;
}

/// Retrieves the readable text of a page
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    /// Page text, or `None` when the page cannot be fetched
    async fn fetch(&self, url: &str) -> Option<String>;
}

/// Extracts facts answering a question from page text
#[async_trait::async_trait]
pub trait ContentAnalyzer: Send + Sync {
    /// Findings in the page, possibly none
    async fn analyze(
        &self,
        question: &str,
        url: &str,
        content: &str,
    ) -> Result<Vec<SearchResult>, CollaboratorError>;
}

/// Fetched pages keyed by url
#[derive(Debug, Clone)]
pub struct PageCache {
    inner: Cache<String, Arc<str>>,
}

impl PageCache {
    /// Create a cache holding up to `max_capacity` pages
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Cached page, or fetch and cache it; failed fetches are not cached
    pub async fn get_or_fetch(&self, url: &str, fetcher: &dyn PageFetcher) -> Option<Arc<str>> {
        self.inner
            .optionally_get_with(url.to_string(), async {
                fetcher.fetch(url).await.map(Arc::from)
            })
            .await
    }

    /// Approximate number of cached pages
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

/// `Searcher` built from citation, fetch and analysis services
pub struct CitationSearch {
    source: Arc<dyn CitationSource>,
    fetcher: Arc<dyn PageFetcher>,
    analyzer: Arc<dyn ContentAnalyzer>,
    pages: PageCache,
    config: SearchConfig,
}

impl CitationSearch {
    /// Assemble the pipeline
    #[must_use]
    pub fn new(
        source: Arc<dyn CitationSource>,
        fetcher: Arc<dyn PageFetcher>,
        analyzer: Arc<dyn ContentAnalyzer>,
        config: SearchConfig,
    ) -> Self {
        Self {
            source,
            fetcher,
            analyzer,
            pages: PageCache::new(config.page_cache_capacity),
            config,
        }
    }

    /// The page cache
    #[inline]
    #[must_use]
    pub fn pages(&self) -> &PageCache {
        &self.pages
    }

    async fn collect_citations(&self, queries: &[SearchQuery]) -> Result<Vec<String>, CollaboratorError> {
        let mut urls: Vec<String> = Vec::new();
        for query in queries {
            tracing::info!("Searching for: {}", query.query);
            for url in self.source.citations(query).await? {
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
        }
        Ok(urls)
    }

    async fn fetch_pages(&self, urls: Vec<String>) -> Vec<(String, Arc<str>)> {
        stream::iter(urls)
            .map(|url| async move {
                let page = self.pages.get_or_fetch(&url, self.fetcher.as_ref()).await;
                if page.is_none() {
                    tracing::warn!("Failed to fetch {}", url);
                }
                page.map(|p| (url, p))
            })
            .buffered(self.config.fetch_concurrency.max(1))
            .filter_map(|page| async move { page })
            .collect()
            .await
    }
}

#[async_trait::async_trait]
impl Searcher for CitationSearch {
    async fn search(
        &self,
        question: &str,
        queries: &[SearchQuery],
    ) -> Result<Vec<SearchResult>, CollaboratorError> {
        let urls = self.collect_citations(queries).await?;
        if urls.is_empty() {
            tracing::info!("No citations found for: {}", question);
            return Ok(Vec::new());
        }

        tracing::info!("Fetching {} citation(s)", urls.len());
        let pages = self.fetch_pages(urls).await;
        if pages.is_empty() {
            return Ok(Vec::new());
        }

        tracing::info!("Analyzing {} page(s)", pages.len());
        let retry = &self.config.retry;
        let analyses: Vec<Result<Vec<SearchResult>, CollaboratorError>> = stream::iter(pages)
            .map(|(url, page)| async move {
                let label = format!("analysis of {url}");
                with_backoff(retry, &label, || self.analyzer.analyze(question, &url, &page)).await
            })
            .buffered(self.config.analysis_concurrency.max(1))
            .collect()
            .await;

        let mut results = Vec::new();
        for analysis in analyses {
            results.extend(analysis?);
        }
        Ok(results)
    }
}

impl std::fmt::Debug for CitationSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CitationSearch")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticCitations(HashMap<String, Vec<String>>);

    #[async_trait::async_trait]
    impl CitationSource for StaticCitations {
        async fn citations(&self, query: &SearchQuery) -> Result<Vec<String>, CollaboratorError> {
            Ok(self.0.get(&query.query).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PageFetcher for CountingFetcher {
        async fn fetch(&self, url: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (!url.contains("broken")).then(|| format!("page text of {url}"))
        }
    }

    struct EchoAnalyzer {
        failures_left: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ContentAnalyzer for EchoAnalyzer {
        async fn analyze(
            &self,
            _question: &str,
            url: &str,
            content: &str,
        ) -> Result<Vec<SearchResult>, CollaboratorError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(CollaboratorError::Unavailable("rate limited".into()));
            }
            Ok(vec![SearchResult::new(format!("fact from {url}"), content, url)])
        }
    }

    fn pipeline(failures: usize) -> (CitationSearch, Arc<CountingFetcher>) {
        let citations = StaticCitations(HashMap::from([
            ("rent downtown".to_string(), vec!["https://a".to_string(), "https://broken".to_string()]),
            ("rent 2024".to_string(), vec!["https://a".to_string(), "https://b".to_string()]),
        ]));
        let fetcher = Arc::new(CountingFetcher::default());
        let search = CitationSearch::new(
            Arc::new(citations),
            fetcher.clone(),
            Arc::new(EchoAnalyzer {
                failures_left: AtomicUsize::new(failures),
            }),
            SearchConfig::default(),
        );
        (search, fetcher)
    }

    #[tokio::test]
    async fn no_citations_is_empty() {
        let (search, fetcher) = pipeline(0);
        let results = search
            .search("q", &[SearchQuery::new("unknown", "")])
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dedups_citations_and_skips_broken_pages() {
        let (search, _) = pipeline(0);
        let results = search
            .search(
                "rent",
                &[SearchQuery::new("rent downtown", ""), SearchQuery::new("rent 2024", "")],
            )
            .await
            .unwrap();
        let facts: Vec<_> = results.iter().map(|r| r.fact.as_str()).collect();
        assert_eq!(facts, vec!["fact from https://a", "fact from https://b"]);
    }

    #[tokio::test]
    async fn pages_are_cached_between_searches() {
        let (search, fetcher) = pipeline(0);
        let queries = [SearchQuery::new("rent 2024", "")];
        search.search("rent", &queries).await.unwrap();
        search.search("rent", &queries).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn analysis_is_retried() {
        let (search, _) = pipeline(2);
        let results = search
            .search("rent", &[SearchQuery::new("rent 2024", "")])
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface() {
        let (search, _) = pipeline(usize::MAX);
        let result = search
            .search("rent", &[SearchQuery::new("rent 2024", "")])
            .await;
        assert!(matches!(result, Err(CollaboratorError::Unavailable(_))));
    }
}
