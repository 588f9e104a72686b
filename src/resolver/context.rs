//! Resolution state for one parse call
//!
//! [`ExternalRefContext`] is created once per top-level parse, threaded by
//! `&mut` through the whole resolution call tree and dropped at the end.
//! [`VisitedRefs`] is the per-branch cycle guard: extending it yields a new
//! set and leaves the parent untouched, so sibling branches never see each
//! other's entries.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::SchemaCache;
use crate::config::ResolverConfig;
use crate::diagnostics::{DiagnosticCode, DiagnosticItem, Diagnostics};
use crate::fetch::SchemaFetcher;

// =============================================================================
// Visited refs
// =============================================================================

/// Persistent set of `$ref` keys followed on the current branch
#[derive(Debug, Clone, Default)]
pub struct VisitedRefs {
    head: Option<Rc<VisitedLink>>,
    len: usize,
}

#[derive(Debug)]
struct VisitedLink {
    key: String,
    parent: Option<Rc<VisitedLink>>,
}

impl VisitedRefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new set containing `key` plus everything in `self`
    pub fn with(&self, key: impl Into<String>) -> Self {
        Self {
            head: Some(Rc::new(VisitedLink {
                key: key.into(),
                parent: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        let mut link = self.head.as_deref();
        while let Some(current) = link {
            if current.key == key {
                return true;
            }
            link = current.parent.as_deref();
        }
        false
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// =============================================================================
// Document loading outcome
// =============================================================================

/// Why an external document could not be made available
#[derive(Debug, Clone, PartialEq)]
pub struct LoadFailure {
    pub code: DiagnosticCode,
    pub message: String,
}

impl LoadFailure {
    fn new(code: DiagnosticCode, message: String) -> Self {
        Self { code, message }
    }
}

// =============================================================================
// External ref context
// =============================================================================

type ProgressFn<'a> = Box<dyn FnMut(usize, usize, &str) + 'a>;

/// Mutable state shared by every step of one resolution pass
pub struct ExternalRefContext<'a> {
    /// Base URL of the root document
    pub base_url: Option<String>,
    /// Current nesting of external documents
    pub depth: usize,
    pub max_depth: usize,
    pub max_files: usize,
    /// `$ref`s expanded so far, internal and external
    pub expansions: usize,
    pub max_expansions: usize,
    /// Distinct external URLs attempted, in first-seen order
    pub fetched_urls: IndexSet<String>,
    pub diagnostics: Diagnostics,
    pub cache_hits: usize,
    pub cache_misses: usize,
    cache: Option<&'a mut SchemaCache>,
    fetcher: Option<&'a dyn SchemaFetcher>,
    on_progress: Option<ProgressFn<'a>>,
    documents: HashMap<String, Rc<Value>>,
    failures: HashMap<String, LoadFailure>,
}

impl fmt::Debug for ExternalRefContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalRefContext")
            .field("base_url", &self.base_url)
            .field("depth", &self.depth)
            .field("max_depth", &self.max_depth)
            .field("max_files", &self.max_files)
            .field("expansions", &self.expansions)
            .field("fetched_urls", &self.fetched_urls)
            .field("cache_hits", &self.cache_hits)
            .field("cache_misses", &self.cache_misses)
            .finish_non_exhaustive()
    }
}

impl Default for ExternalRefContext<'_> {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

impl<'a> ExternalRefContext<'a> {
    /// Context without fetcher or cache; external refs become warnings
    pub fn new(limits: ResolverConfig) -> Self {
        Self {
            base_url: None,
            depth: 0,
            max_depth: limits.max_depth,
            max_files: limits.max_files,
            expansions: 0,
            max_expansions: limits.max_expansions,
            fetched_urls: IndexSet::new(),
            diagnostics: Diagnostics::new(),
            cache_hits: 0,
            cache_misses: 0,
            cache: None,
            fetcher: None,
            on_progress: None,
            documents: HashMap::new(),
            failures: HashMap::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_cache(mut self, cache: &'a mut SchemaCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_fetcher(mut self, fetcher: &'a dyn SchemaFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Called with `(fetched so far, max files, url)` before each new fetch
    pub fn with_progress(mut self, on_progress: impl FnMut(usize, usize, &str) + 'a) -> Self {
        self.on_progress = Some(Box::new(on_progress));
        self
    }

    /// Record a recoverable problem
    pub fn warn(&mut self, code: DiagnosticCode, message: impl Into<String>, source_path: &str) {
        let message = message.into();
        warn!(code = %code, path = source_path, "{}", message);
        self.diagnostics
            .push(DiagnosticItem::new(code, message).at(source_path));
    }

    /// Warning messages in the order they were raised
    pub fn warnings(&self) -> Vec<String> {
        self.diagnostics.warning_messages()
    }

    /// Make the document at `url` available, fetching it at most once per
    /// context. Documents already loaded do not count against `max_files`.
    pub fn load_document(&mut self, url: &str) -> Result<Rc<Value>, LoadFailure> {
        if let Some(document) = self.documents.get(url) {
            return Ok(Rc::clone(document));
        }
        if let Some(failure) = self.failures.get(url) {
            return Err(failure.clone());
        }
        if self.fetched_urls.len() >= self.max_files {
            return Err(LoadFailure::new(
                DiagnosticCode::FileLimit,
                format!(
                    "Maximum number of external files ({}) reached; not loading '{}'",
                    self.max_files, url
                ),
            ));
        }
        let Some(fetcher) = self.fetcher else {
            return Err(LoadFailure::new(
                DiagnosticCode::ExternalRefUnavailable,
                format!("External reference '{}' cannot be resolved without a fetcher", url),
            ));
        };

        self.fetched_urls.insert(url.to_string());
        if let Some(on_progress) = self.on_progress.as_mut() {
            on_progress(self.fetched_urls.len(), self.max_files, url);
        }

        match self.fetch_through_cache(fetcher, url) {
            Ok(document) => {
                let document = Rc::new(document);
                self.documents.insert(url.to_string(), Rc::clone(&document));
                Ok(document)
            }
            Err(failure) => {
                self.failures.insert(url.to_string(), failure.clone());
                Err(failure)
            }
        }
    }

    fn fetch_through_cache(
        &mut self,
        fetcher: &dyn SchemaFetcher,
        url: &str,
    ) -> Result<Value, LoadFailure> {
        if let Some(cache) = self.cache.as_deref_mut() {
            if let Some(document) = cache.get(url) {
                self.cache_hits += 1;
                return Ok(document);
            }
            self.cache_misses += 1;
        }

        debug!(url, depth = self.depth, "fetching external schema");
        let text = fetcher.fetch_text(url).map_err(|e| {
            LoadFailure::new(
                DiagnosticCode::FetchFailed,
                format!("Failed to fetch external schema '{}': {}", url, e),
            )
        })?;
        let document: Value = serde_json::from_str(&text).map_err(|e| {
            LoadFailure::new(
                DiagnosticCode::InvalidFetchedDocument,
                format!("External schema '{}' is not valid JSON: {}", url, e),
            )
        })?;

        if let Some(cache) = self.cache.as_deref_mut() {
            if !cache.set(url, &document) {
                debug!(url, "external schema not cached");
            }
        }
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::error::FetchError;
    use std::cell::RefCell;

    #[test]
    fn test_visited_refs_are_branch_local() {
        let root = VisitedRefs::new().with("#/a");
        let left = root.with("#/b");
        let right = root.with("#/c");

        assert!(left.contains("#/a") && left.contains("#/b"));
        assert!(!left.contains("#/c"));
        assert!(right.contains("#/c") && !right.contains("#/b"));
        assert_eq!(root.len(), 1);
        assert_eq!(left.len(), 2);
    }

    #[test]
    fn test_documents_are_fetched_once() {
        let calls = RefCell::new(Vec::new());
        let fetcher = |url: &str| -> Result<String, FetchError> {
            calls.borrow_mut().push(url.to_string());
            Ok(r#"{"type":"string"}"#.to_string())
        };
        let mut ctx = ExternalRefContext::default().with_fetcher(&fetcher);

        ctx.load_document("a.json").unwrap();
        ctx.load_document("a.json").unwrap();
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(ctx.fetched_urls.len(), 1);
    }

    #[test]
    fn test_file_limit() {
        let fetcher = |_: &str| -> Result<String, FetchError> { Ok("{}".to_string()) };
        let mut ctx = ExternalRefContext::new(ResolverConfig { max_files: 1, ..ResolverConfig::default() })
            .with_fetcher(&fetcher);

        ctx.load_document("a.json").unwrap();
        let failure = ctx.load_document("b.json").unwrap_err();
        assert_eq!(failure.code, DiagnosticCode::FileLimit);
        // already loaded documents stay available
        assert!(ctx.load_document("a.json").is_ok());
    }

    #[test]
    fn test_cache_hits_and_misses() {
        let fetcher = |_: &str| -> Result<String, FetchError> { Ok(r#"{"type":"integer"}"#.to_string()) };
        let mut cache = SchemaCache::new(MemoryStore::new());
        {
            let mut ctx = ExternalRefContext::default()
                .with_fetcher(&fetcher)
                .with_cache(&mut cache);
            ctx.load_document("https://example.com/a.json").unwrap();
            assert_eq!((ctx.cache_hits, ctx.cache_misses), (0, 1));
        }
        let mut ctx = ExternalRefContext::default()
            .with_fetcher(&fetcher)
            .with_cache(&mut cache);
        ctx.load_document("https://example.com/a.json").unwrap();
        assert_eq!((ctx.cache_hits, ctx.cache_misses), (1, 0));
    }

    #[test]
    fn test_fetch_failures_are_remembered() {
        let calls = RefCell::new(0);
        let fetcher = |url: &str| -> Result<String, FetchError> {
            *calls.borrow_mut() += 1;
            Err(FetchError::NotFound(url.to_string()))
        };
        let mut ctx = ExternalRefContext::default().with_fetcher(&fetcher);

        let first = ctx.load_document("gone.json").unwrap_err();
        let second = ctx.load_document("gone.json").unwrap_err();
        assert_eq!(first, second);
        assert_eq!(first.code, DiagnosticCode::FetchFailed);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_progress_callback() {
        let seen = RefCell::new(Vec::new());
        let fetcher = |_: &str| -> Result<String, FetchError> { Ok("{}".to_string()) };
        let mut ctx = ExternalRefContext::default()
            .with_fetcher(&fetcher)
            .with_progress(|current, total, url| seen.borrow_mut().push((current, total, url.to_string())));

        ctx.load_document("a.json").unwrap();
        ctx.load_document("b.json").unwrap();
        drop(ctx);
        assert_eq!(
            seen.into_inner(),
            vec![(1, 50, "a.json".to_string()), (2, 50, "b.json".to_string())]
        );
    }
}
