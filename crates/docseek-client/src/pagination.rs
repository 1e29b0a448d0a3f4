//! Pagination cursor management for listing endpoints.
//!
//! A [`Cursor`] owns one [`Session`]: the query identity it is scoped to, the
//! results accumulated under it, and the offset of the next page. Fetching a
//! page is split in two steps so the session never depends on which response
//! arrives first:
//!
//! 1. `begin*` updates the session for the request about to be made and
//!    returns a [`PageTicket`] describing it.
//! 2. [`Cursor::complete`] merges the response, but only if the ticket is
//!    still the one the session is waiting for. Responses for superseded
//!    requests come back as [`PageOutcome::Stale`] and are discarded.
//!
//! The session is replaced as a whole on every change and shared through an
//! `Arc`, so a [`Cursor::snapshot`] never shows a half-merged page.
//!
//! [`SearchController`] and [`ResourceController`] drive a cursor against a
//! backend.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use docseek_core::{Resource, ResourcesPage, SearchRequest, SearchResponse, SearchResult};

use crate::client::{ResourceBackend, SearchBackend};
use crate::config::ClientConfig;
use crate::error::Result;

/// Identity used for listings that have no query.
const RESOURCES_IDENTITY: &str = "resources";

/// One page of a listing, independent of the endpoint it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Whether the backend has more items after this page.
    pub has_more: bool,
    /// Total number of matching items.
    pub total: usize,
}

impl From<SearchResponse> for Page<SearchResult> {
    fn from(response: SearchResponse) -> Self {
        Self {
            items: response.results,
            has_more: response.has_more,
            total: response.total_found,
        }
    }
}

impl From<ResourcesPage> for Page<Resource> {
    fn from(page: ResourcesPage) -> Self {
        Self {
            items: page.resources,
            has_more: page.has_more,
            total: page.total,
        }
    }
}

/// Accumulated state of one listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Session<T> {
    identity: Option<String>,
    results: Vec<T>,
    offset: usize,
    /// Results carried over from an earlier identity by an append search.
    retained: usize,
    limit: usize,
    has_more: bool,
    total: usize,
    error: Option<String>,
    in_flight: Option<u64>,
}

impl<T> Default for Session<T> {
    fn default() -> Self {
        Self {
            identity: None,
            results: Vec::new(),
            offset: 0,
            retained: 0,
            limit: 0,
            has_more: false,
            total: 0,
            error: None,
            in_flight: None,
        }
    }
}

impl<T> Session<T> {
    /// Query the session is scoped to.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Results accumulated so far.
    #[must_use]
    pub fn results(&self) -> &[T] {
        &self.results
    }

    /// Offset of the next page under the current query.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Page size of the most recent request.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Whether another page is available.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.has_more
    }

    /// Total matches reported by the last applied page.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Message of the last failed fetch.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether a fetch is outstanding.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Number of results fetched under the current query.
    #[must_use]
    pub fn fetched(&self) -> usize {
        self.results.len() - self.retained
    }
}

/// Search results accumulated for one query.
pub type SearchSession = Session<SearchResult>;

/// Resources accumulated by the listing.
pub type ResourceSession = Session<Resource>;

/// Describes one page request issued by a [`Cursor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTicket {
    /// Query identity the request belongs to.
    pub query: String,
    /// First item to fetch.
    pub offset: usize,
    /// Number of items to fetch.
    pub limit: usize,
    /// Whether results are appended rather than replaced.
    pub append: bool,
    generation: u64,
}

impl PageTicket {
    /// Sequence number distinguishing requests for the same page.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// Result of [`Cursor::complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// The page was merged.
    Applied {
        /// Items on the page.
        received: usize,
    },
    /// The request was superseded; the response was discarded.
    Stale,
    /// The request failed; the session error was set.
    Failed,
}

/// Single owner of a [`Session`].
#[derive(Debug, Clone)]
pub struct Cursor<T> {
    session: Arc<Session<T>>,
    generation: u64,
}

impl<T> Default for Cursor<T> {
    fn default() -> Self {
        Self {
            session: Arc::new(Session::default()),
            generation: 0,
        }
    }
}

impl<T: Clone> Cursor<T> {
    /// Create a cursor with an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session.
    #[must_use]
    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    /// Shared view of the current session.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Session<T>> {
        Arc::clone(&self.session)
    }

    /// Prepare a request for the first page of `query`.
    ///
    /// Without `append` the accumulated results are cleared. With `append`
    /// they are kept and the new pages are added after them. Either way a
    /// changed query restarts at offset 0, and any request still in flight is
    /// superseded.
    ///
    /// A blank query resets the session and returns `None`.
    pub fn begin(&mut self, query: &str, limit: usize, append: bool) -> Option<PageTicket> {
        let query = query.trim();
        if query.is_empty() {
            self.reset();
            return None;
        }

        let mut next = (*self.session).clone();
        let same_query = next.identity.as_deref() == Some(query);

        if !append {
            next.results.clear();
            next.offset = 0;
            next.retained = 0;
            next.has_more = false;
            next.total = 0;
        } else if !same_query {
            next.offset = 0;
            next.retained = next.results.len();
            next.has_more = false;
            next.total = 0;
        }

        next.identity = Some(query.to_string());
        next.limit = limit;
        next.error = None;
        Some(self.issue(next, append))
    }

    /// Prepare a request for the next page of the current query.
    ///
    /// Returns `None`, leaving the session untouched, when there is no query,
    /// no further page, or a fetch already in flight.
    pub fn begin_load_more(&mut self) -> Option<PageTicket> {
        let session = &self.session;
        if session.identity.is_none() || !session.has_more || session.in_flight.is_some() {
            return None;
        }
        let mut next = (**session).clone();
        next.error = None;
        Some(self.issue(next, true))
    }

    fn issue(&mut self, mut next: Session<T>, append: bool) -> PageTicket {
        self.generation += 1;
        next.in_flight = Some(self.generation);
        let ticket = PageTicket {
            query: next.identity.clone().unwrap_or_default(),
            offset: next.offset,
            limit: next.limit,
            append,
            generation: self.generation,
        };
        self.session = Arc::new(next);
        ticket
    }

    /// Merge the response for `ticket`.
    pub fn complete<E: fmt::Display>(
        &mut self,
        ticket: &PageTicket,
        result: std::result::Result<Page<T>, E>,
    ) -> PageOutcome {
        let current = &self.session;
        if current.in_flight != Some(ticket.generation)
            || current.identity.as_deref() != Some(ticket.query.as_str())
        {
            tracing::debug!(
                query = %ticket.query,
                offset = ticket.offset,
                "Discarding stale page"
            );
            return PageOutcome::Stale;
        }

        let mut next = (**current).clone();
        next.in_flight = None;

        let outcome = match result {
            Ok(page) => {
                let received = page.items.len();
                if ticket.append {
                    next.results.extend(page.items);
                } else {
                    next.results = page.items;
                }
                next.offset += received;
                next.has_more = page.has_more && received > 0;
                next.total = page.total;
                next.error = None;
                PageOutcome::Applied { received }
            }
            Err(e) => {
                tracing::warn!(
                    query = %ticket.query,
                    offset = ticket.offset,
                    error = %e,
                    "Page fetch failed"
                );
                next.error = Some(e.to_string());
                PageOutcome::Failed
            }
        };

        self.session = Arc::new(next);
        outcome
    }

    /// Restore the initial empty session. Outstanding requests become stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.session = Arc::new(Session::default());
    }
}

/// Cursor over search results.
pub type SearchCursor = Cursor<SearchResult>;

/// Cursor over the resource listing.
pub type ResourceCursor = Cursor<Resource>;

// =============================================================================
// Controllers
// =============================================================================

/// Runs searches against a backend and accumulates the results.
pub struct SearchController<B> {
    backend: B,
    cursor: SearchCursor,
    page_size: usize,
    top_k: u32,
    filters: Option<BTreeMap<String, serde_json::Value>>,
    search_time_ms: Option<f64>,
}

impl<B: SearchBackend> SearchController<B> {
    /// Create a controller using the page settings from `config`.
    #[must_use]
    pub fn new(backend: B, config: &ClientConfig) -> Self {
        Self {
            backend,
            cursor: SearchCursor::new(),
            page_size: config.search_page_size,
            top_k: config.search_top_k,
            filters: None,
            search_time_ms: None,
        }
    }

    /// Current session.
    #[must_use]
    pub fn session(&self) -> &SearchSession {
        self.cursor.session()
    }

    /// Server-side time of the last applied page.
    #[must_use]
    pub const fn search_time_ms(&self) -> Option<f64> {
        self.search_time_ms
    }

    /// Fetch the first page of `query`.
    ///
    /// Returns `None` for a blank query, which resets the session.
    pub async fn search(
        &mut self,
        query: &str,
        filters: Option<BTreeMap<String, serde_json::Value>>,
        append: bool,
    ) -> Option<PageOutcome> {
        self.filters = filters;
        let ticket = self.cursor.begin(query, self.page_size, append)?;
        Some(self.fetch(&ticket).await)
    }

    /// Fetch the next page of the current query.
    ///
    /// Returns `None` without issuing a request when there is nothing to load.
    pub async fn load_more(&mut self) -> Option<PageOutcome> {
        let ticket = self.cursor.begin_load_more()?;
        Some(self.fetch(&ticket).await)
    }

    /// Clear the session and filters.
    pub fn reset(&mut self) {
        self.cursor.reset();
        self.filters = None;
        self.search_time_ms = None;
    }

    async fn fetch(&mut self, ticket: &PageTicket) -> PageOutcome {
        let request = SearchRequest {
            query: ticket.query.clone(),
            top_k: self.top_k,
            filters: self.filters.clone(),
            offset: ticket.offset,
            limit: ticket.limit,
        };
        let result = self.backend.search(&request).await.map(|response| {
            self.search_time_ms = Some(response.search_time_ms);
            Page::from(response)
        });
        self.cursor.complete(ticket, result)
    }
}

/// Pages through the resource listing.
pub struct ResourceController<B> {
    backend: B,
    cursor: ResourceCursor,
    page_size: usize,
}

impl<B: ResourceBackend> ResourceController<B> {
    /// Create a controller using the page size from `config`.
    #[must_use]
    pub fn new(backend: B, config: &ClientConfig) -> Self {
        Self {
            backend,
            cursor: ResourceCursor::new(),
            page_size: config.resources_page_size,
        }
    }

    /// Current session.
    #[must_use]
    pub fn session(&self) -> &ResourceSession {
        self.cursor.session()
    }

    /// Reload the listing from the first page.
    pub async fn refresh(&mut self) -> PageOutcome {
        match self.cursor.begin(RESOURCES_IDENTITY, self.page_size, false) {
            Some(ticket) => self.fetch(&ticket).await,
            None => PageOutcome::Stale,
        }
    }

    /// Append the next page of the listing.
    pub async fn load_more(&mut self) -> Option<PageOutcome> {
        let ticket = self.cursor.begin_load_more()?;
        Some(self.fetch(&ticket).await)
    }

    async fn fetch(&mut self, ticket: &PageTicket) -> PageOutcome {
        let result: Result<Page<Resource>> = self
            .backend
            .list_resources(ticket.offset, ticket.limit)
            .await
            .map(Page::from);
        self.cursor.complete(ticket, result)
    }
}
