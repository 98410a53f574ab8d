//! Paged crawl of a folder query.
//!
//! An [`Enumeration`] pulls fixed-size pages until the query returns an empty
//! page. A page that fails to load is logged and skipped; the crawl continues
//! with the next offset. Partial results go to a [`ProgressSink`] at most once
//! per progress interval.

use bridge_traits::query::FolderQuery;
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_async::sync::CancellationToken;
use core_library::{ExtensionFilter, MediaKind, MediaRecord};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{Result, SyncError};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(3);

/// Consecutive failed pages after which the query is treated as exhausted.
const MAX_CONSECUTIVE_PAGE_FAILURES: usize = 3;

/// Receives partial crawl results.
pub trait ProgressSink: Send + Sync {
    /// `batch` holds the records found since the previous report;
    /// `discovered` is the running total for the session.
    fn report(&self, batch: Vec<MediaRecord>, discovered: usize);
}

/// Sink that drops every report.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _batch: Vec<MediaRecord>, _discovered: usize) {}
}

/// Everything one enumeration produced.
#[derive(Debug, Default)]
pub struct EnumerationOutcome {
    pub records: Vec<MediaRecord>,
    pub pages: usize,
    pub pages_lost: usize,
}

pub struct BatchEnumerator {
    kind: MediaKind,
    filter: ExtensionFilter,
    page_size: usize,
    progress_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl BatchEnumerator {
    pub fn new(kind: MediaKind, filter: ExtensionFilter, clock: Arc<dyn Clock>) -> Self {
        Self {
            kind,
            filter,
            page_size: DEFAULT_PAGE_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            clock,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Start a crawl of `query` from its first page.
    ///
    /// `already_fetched` seeds the running total passed to `sink`, so several
    /// queries crawled in one session report a single growing count.
    pub fn enumerate<'a>(
        &'a self,
        query: &'a dyn FolderQuery,
        already_fetched: usize,
        cancel: &'a CancellationToken,
        sink: &'a dyn ProgressSink,
    ) -> Enumeration<'a> {
        Enumeration {
            enumerator: self,
            query,
            cancel,
            sink,
            offset: 0,
            finished: false,
            consecutive_failures: 0,
            discovered: already_fetched,
            pending: Vec::new(),
            last_report: self.clock.now(),
            pages: 0,
            pages_lost: 0,
        }
    }
}

/// A single pass over a query. Not restartable.
pub struct Enumeration<'a> {
    enumerator: &'a BatchEnumerator,
    query: &'a dyn FolderQuery,
    cancel: &'a CancellationToken,
    sink: &'a dyn ProgressSink,
    offset: usize,
    finished: bool,
    consecutive_failures: usize,
    discovered: usize,
    pending: Vec<MediaRecord>,
    last_report: DateTime<Utc>,
    pages: usize,
    pages_lost: usize,
}

impl Enumeration<'_> {
    /// Next batch of records, or `None` once the query is exhausted.
    ///
    /// Returns [`SyncError::Cancelled`] if cancellation was requested before
    /// the next page fetch.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<MediaRecord>>> {
        let page_size = self.enumerator.page_size;

        loop {
            if self.finished {
                return Ok(None);
            }
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let offset = self.offset;
            self.offset += page_size;

            match self.query.get_page(offset, page_size).await {
                Ok(items) if items.is_empty() => {
                    self.finished = true;
                    return Ok(None);
                }
                Ok(items) => {
                    self.consecutive_failures = 0;
                    self.pages += 1;

                    let now = self.enumerator.clock.now();
                    let batch: Vec<MediaRecord> = items
                        .iter()
                        .filter(|item| !item.is_folder && self.enumerator.filter.accepts(&item.path))
                        .map(|item| MediaRecord::from_item(item, self.enumerator.kind, now))
                        .collect();

                    debug!(
                        source = self.query.source().as_str(),
                        page = self.pages,
                        offset,
                        count = batch.len(),
                        "Fetched page"
                    );
                    self.discovered += batch.len();
                    self.maybe_report(&batch, now);
                    return Ok(Some(batch));
                }
                Err(e) => {
                    self.pages_lost += 1;
                    self.consecutive_failures += 1;
                    warn!(
                        source = self.query.source().as_str(),
                        offset,
                        error = %e,
                        "Page fetch failed; skipping page"
                    );
                    if self.consecutive_failures >= MAX_CONSECUTIVE_PAGE_FAILURES {
                        warn!(offset, "Too many failed pages; ending enumeration");
                        self.finished = true;
                    }
                }
            }
        }
    }

    fn maybe_report(&mut self, batch: &[MediaRecord], now: DateTime<Utc>) {
        self.pending.extend_from_slice(batch);

        let elapsed = now
            .signed_duration_since(self.last_report)
            .to_std()
            .unwrap_or_default();
        if elapsed >= self.enumerator.progress_interval && !self.pending.is_empty() {
            self.sink
                .report(std::mem::take(&mut self.pending), self.discovered);
            self.last_report = now;
        }
    }

    /// Drain the enumeration into one outcome.
    pub async fn collect(mut self) -> Result<EnumerationOutcome> {
        let mut records = Vec::new();
        while let Some(batch) = self.next_batch().await? {
            records.extend(batch);
        }
        Ok(EnumerationOutcome {
            records,
            pages: self.pages,
            pages_lost: self.pages_lost,
        })
    }

    pub fn pages_lost(&self) -> usize {
        self.pages_lost
    }

    /// Running total including `already_fetched`
    pub fn discovered(&self) -> usize {
        self.discovered
    }
}
