//! Ingestion orchestrator.
//!
//! An [`Ingestor`] runs cycles: visit every registered source in order,
//! normalize and insert what it yields, and extract entities for articles
//! that were actually new. At most one cycle runs at a time across every
//! trigger (timer and on-demand); a request that finds a cycle running is
//! rejected, not queued.
//!
//! A backfill is a cycle that also walks each paginated source's archive,
//! page by page, until a page comes back empty, the page cap is reached, or
//! an entry older than the cutoff shows up.

pub mod scheduler;

use chrono::NaiveDate;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::extract::EntityExtractor;
use crate::fetch::{FetchError, RawEntry, SourceAdapter};
use crate::normalize::{entry_date, normalize};
use crate::source::SourceDescriptor;
use crate::storage::{InsertOutcome, Store, StoreError};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between consecutive archive pages of one source.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(1);

/// Proof that the holder is the only running cycle. Released on drop.
pub type CycleToken = OwnedMutexGuard<()>;

// ============================================================================
// Reports
// ============================================================================

/// Counters for one successfully retrieved source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Listing pages retrieved
    pub pages: usize,
    /// Raw entries yielded by the adapter
    pub entries: usize,
    /// New articles stored
    pub inserted: usize,
    /// Entries whose URL was already stored
    pub existing: usize,
    /// Entries without a usable title or link
    pub dropped: usize,
    /// Entities stored for the new articles
    pub entities: usize,
}

/// Outcome for a single source within a cycle.
#[derive(Debug)]
pub struct SourceReport {
    pub source: String,
    pub result: Result<SourceStats, FetchError>,
}

/// Summary of one completed (or aborted) cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// One entry per source visited, in registry order.
    pub sources: Vec<SourceReport>,
    /// Set when a store failure stopped the cycle early.
    pub aborted: Option<String>,
    pub elapsed: Duration,
}

impl CycleReport {
    pub fn inserted(&self) -> usize {
        self.stats().map(|s| s.inserted).sum()
    }

    pub fn entities(&self) -> usize {
        self.stats().map(|s| s.entities).sum()
    }

    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.result.is_err()).count()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    fn stats(&self) -> impl Iterator<Item = &SourceStats> {
        self.sources.iter().filter_map(|s| s.result.as_ref().ok())
    }
}

/// What a run or trigger request produced.
#[derive(Debug)]
pub struct CycleOutcome {
    /// False when another cycle was already running.
    pub started: bool,
    /// Present only when the caller waited for the cycle to finish.
    pub report: Option<CycleReport>,
}

impl CycleOutcome {
    fn rejected() -> Self {
        Self {
            started: false,
            report: None,
        }
    }
}

/// Limits for [`Ingestor::backfill`].
#[derive(Debug, Clone)]
pub struct BackfillOptions {
    /// An entry dated before this day ends its source's backfill. Entries
    /// with no recognizable date never do.
    pub cutoff: Option<NaiveDate>,
    pub page_delay: Duration,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            cutoff: None,
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }
}

/// Which pages of each source a cycle visits.
#[derive(Debug, Clone, Copy)]
enum Pass<'a> {
    Current,
    Backfill(&'a BackfillOptions),
}

#[derive(Debug, Error)]
enum SourceFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// Ingestor
// ============================================================================

/// Cheap to clone; all clones share the same exclusivity gate.
#[derive(Clone)]
pub struct Ingestor {
    sources: Arc<[SourceDescriptor]>,
    adapter: Arc<dyn SourceAdapter>,
    extractor: Arc<dyn EntityExtractor>,
    store: Store,
    fetch_timeout: Duration,
    gate: Arc<Mutex<()>>,
}

impl Ingestor {
    pub fn new(
        sources: Vec<SourceDescriptor>,
        adapter: Arc<dyn SourceAdapter>,
        extractor: Arc<dyn EntityExtractor>,
        store: Store,
    ) -> Self {
        Self {
            sources: sources.into(),
            adapter,
            extractor,
            store,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Upper bound on a single adapter call, retries included.
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn is_running(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    fn try_acquire(&self) -> Option<CycleToken> {
        self.gate.clone().try_lock_owned().ok()
    }

    /// Run one cycle to completion and return its report.
    ///
    /// Returns `started: false` immediately if a cycle is already running.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(token) = self.try_acquire() else {
            tracing::info!("Ingestion cycle already running, request rejected");
            return CycleOutcome::rejected();
        };

        let report = self.run_with_token(token, Pass::Current).await;
        CycleOutcome {
            started: true,
            report: Some(report),
        }
    }

    /// Run one cycle that also ingests older archive pages, and wait for it.
    ///
    /// Uses the same exclusivity gate as [`run_cycle`](Self::run_cycle).
    /// Sources without pagination are ingested exactly as in a normal cycle.
    pub async fn backfill(&self, options: &BackfillOptions) -> CycleOutcome {
        let Some(token) = self.try_acquire() else {
            tracing::info!("Ingestion cycle already running, backfill rejected");
            return CycleOutcome::rejected();
        };

        let report = self.run_with_token(token, Pass::Backfill(options)).await;
        CycleOutcome {
            started: true,
            report: Some(report),
        }
    }

    /// Start a cycle in the background and return without waiting for it.
    ///
    /// The token is taken before spawning, so `started: true` guarantees this
    /// request's cycle runs. Must be called from within a Tokio runtime.
    pub fn trigger(&self) -> CycleOutcome {
        let Some(token) = self.try_acquire() else {
            tracing::info!("Ingestion cycle already running, trigger rejected");
            return CycleOutcome::rejected();
        };

        let ingestor = self.clone();
        tokio::spawn(async move {
            ingestor.run_with_token(token, Pass::Current).await;
        });

        CycleOutcome {
            started: true,
            report: None,
        }
    }

    async fn run_with_token(&self, token: CycleToken, pass: Pass<'_>) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        tracing::info!(
            sources = self.sources.len(),
            backfill = matches!(pass, Pass::Backfill(_)),
            "Ingestion cycle started"
        );

        for source in self.sources.iter() {
            let result = match pass {
                Pass::Current => self.ingest_current(source).await,
                Pass::Backfill(options) => self.ingest_archive(source, options).await,
            };

            match result {
                Ok(stats) => {
                    tracing::debug!(
                        source = %source.name,
                        pages = stats.pages,
                        entries = stats.entries,
                        inserted = stats.inserted,
                        existing = stats.existing,
                        dropped = stats.dropped,
                        entities = stats.entities,
                        "Source ingested"
                    );
                    report.sources.push(SourceReport {
                        source: source.name.clone(),
                        result: Ok(stats),
                    });
                }
                Err(SourceFailure::Fetch(e)) => {
                    tracing::warn!(
                        source = %source.name,
                        variant = source.variant.label(),
                        kind = ?e.kind(),
                        error = %e,
                        "Source retrieval failed, continuing with next source"
                    );
                    report.sources.push(SourceReport {
                        source: source.name.clone(),
                        result: Err(e),
                    });
                }
                Err(SourceFailure::Store(e)) => {
                    tracing::error!(
                        source = %source.name,
                        error = %e,
                        "Store failure, aborting ingestion cycle"
                    );
                    report.aborted = Some(format!("{}: {}", source.name, e));
                    break;
                }
            }
        }

        report.elapsed = started.elapsed();
        drop(token);

        tracing::info!(
            inserted = report.inserted(),
            entities = report.entities(),
            failed_sources = report.failed_sources(),
            aborted = report.is_aborted(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Ingestion cycle finished"
        );

        report
    }

    async fn fetch(&self, source: &SourceDescriptor, page: u32) -> Result<Vec<RawEntry>, FetchError> {
        match tokio::time::timeout(self.fetch_timeout, self.adapter.fetch_page(source, page)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }

    async fn ingest_current(&self, source: &SourceDescriptor) -> Result<SourceStats, SourceFailure> {
        let entries = self.fetch(source, 0).await?;
        let mut stats = SourceStats {
            pages: 1,
            ..SourceStats::default()
        };
        self.ingest_entries(source, entries, &mut stats).await?;
        Ok(stats)
    }

    /// Page 0, then older pages until one is empty, the cap is reached, or an
    /// entry predates the cutoff. A failing page 0 fails the source; a later
    /// failing page only ends its archive walk.
    async fn ingest_archive(
        &self,
        source: &SourceDescriptor,
        options: &BackfillOptions,
    ) -> Result<SourceStats, SourceFailure> {
        let mut stats = SourceStats::default();

        for page in 0..source.max_pages() {
            if page > 0 {
                tokio::time::sleep(options.page_delay).await;
            }

            let entries = match self.fetch(source, page).await {
                Ok(entries) => entries,
                Err(e) if page == 0 => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(
                        source = %source.name,
                        page = page,
                        error = %e,
                        "Archive page failed, ending backfill for source"
                    );
                    break;
                }
            };
            stats.pages += 1;

            if entries.is_empty() {
                tracing::debug!(source = %source.name, page = page, "Archive exhausted");
                break;
            }

            let (entries, reached_cutoff) = split_at_cutoff(entries, options.cutoff);
            self.ingest_entries(source, entries, &mut stats).await?;

            if reached_cutoff {
                tracing::info!(source = %source.name, page = page, "Reached backfill cutoff");
                break;
            }
        }

        Ok(stats)
    }

    async fn ingest_entries(
        &self,
        source: &SourceDescriptor,
        entries: Vec<RawEntry>,
        stats: &mut SourceStats,
    ) -> Result<(), StoreError> {
        stats.entries += entries.len();

        for entry in entries {
            let Some(article) = normalize(entry, &source.name) else {
                stats.dropped += 1;
                continue;
            };

            match self.store.try_insert_article(&article).await? {
                InsertOutcome::AlreadyExists => stats.existing += 1,
                InsertOutcome::Inserted(id) => {
                    stats.inserted += 1;
                    let candidates = self.extractor.extract(&article.content).await;
                    stats.entities += self.store.insert_entities(id, &candidates).await?;
                }
            }
        }

        Ok(())
    }
}

/// Entries up to (not including) the first one dated before `cutoff`, and
/// whether such an entry was found. Listings are newest first.
fn split_at_cutoff(mut entries: Vec<RawEntry>, cutoff: Option<NaiveDate>) -> (Vec<RawEntry>, bool) {
    let Some(cutoff) = cutoff else {
        return (entries, false);
    };
    match entries
        .iter()
        .position(|e| entry_date(e).is_some_and(|d| d < cutoff))
    {
        Some(stop) => {
            entries.truncate(stop);
            (entries, true)
        }
        None => (entries, false),
    }
}
