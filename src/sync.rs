//! Catalog synchronisation: pull one page of popular movies from the provider
//! and upsert each entry into the catalog, keyed by the provider's id.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use jiff::Timestamp;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::{
    catalog::{MovieStore, UpsertOutcome},
    models::SyncedFields,
    tmdb::{FetchError, MovieProvider, PageEntry, PopularMovie},
};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("a catalog sync cycle is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CycleSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<ItemFailure>,
}

impl CycleSummary {
    pub fn succeeded(&self) -> usize {
        self.created + self.updated + self.unchanged
    }

    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created(_) => self.created += 1,
            UpsertOutcome::Updated(_) => self.updated += 1,
            UpsertOutcome::Unchanged(_) => self.unchanged += 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ItemFailure {
    pub external_id: String,
    pub title: String,
    pub error: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed(CycleSummary),
    FetchFailed { error: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct CycleReport {
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub outcome: CycleOutcome,
}

#[derive(Clone, Debug, Serialize)]
pub struct SyncStatus {
    pub running: bool,
    pub last_cycle: Option<CycleReport>,
}

/// Why a provider entry was not written.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Rejection {
    MissingExternalId,
    EmptyTitle,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingExternalId => f.write_str("missing external id"),
            Rejection::EmptyTitle => f.write_str("empty title"),
        }
    }
}

pub struct Synchronizer {
    provider: Arc<dyn MovieProvider>,
    store: Arc<dyn MovieStore>,
    running: AtomicBool,
    last_cycle: RwLock<Option<CycleReport>>,
}

impl Synchronizer {
    pub fn new(provider: Arc<dyn MovieProvider>, store: Arc<dyn MovieStore>) -> Self {
        Self { provider, store, running: AtomicBool::new(false), last_cycle: RwLock::new(None) }
    }

    /// Runs one fetch-and-upsert cycle.
    ///
    /// Returns [`SyncError::AlreadyRunning`] without touching the provider
    /// when another cycle is in flight, and [`SyncError::Fetch`] when the
    /// provider page could not be obtained. Per-item problems never abort
    /// the cycle; they are tallied in the returned summary.
    pub async fn run_cycle(&self) -> Result<CycleSummary, SyncError> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            info!("catalog sync already in progress, skipping this trigger");
            return Err(SyncError::AlreadyRunning);
        };

        let started_at = Timestamp::now();
        info!(%started_at, "catalog sync cycle started");

        let entries = match self.provider.popular_movies().await {
            Ok(entries) => entries,
            Err(err) => {
                error!(%started_at, error = %err, "catalog sync aborted, provider fetch failed");
                self.finish(started_at, CycleOutcome::FetchFailed { error: err.to_string() })
                    .await;
                return Err(err.into());
            },
        };
        debug!(items = entries.len(), "processing provider results");

        let mut summary = CycleSummary::default();
        for entry in entries {
            let item = match entry {
                Ok(item) => item,
                Err(malformed) => {
                    warn!(
                        external_id = ?malformed.id,
                        error = %malformed.error,
                        "skipping malformed provider entry"
                    );
                    summary.skipped += 1;
                    continue;
                },
            };
            let (external_id, fields) = match validate(item) {
                Ok(valid) => valid,
                Err((rejection, item)) => {
                    warn!(
                        external_id = ?item.id,
                        title = ?item.title,
                        reason = %rejection,
                        "skipping provider entry"
                    );
                    summary.skipped += 1;
                    continue;
                },
            };

            let title = fields.title.clone();
            match self.store.upsert_by_external_id(&external_id, fields).await {
                Ok(outcome) => {
                    debug!(
                        external_id = %external_id,
                        movie_id = outcome.id(),
                        outcome = ?outcome,
                        "upserted movie"
                    );
                    summary.record(outcome);
                },
                Err(err) => {
                    warn!(
                        external_id = %external_id,
                        title = %title,
                        error = %err,
                        "failed to upsert movie"
                    );
                    summary.failed += 1;
                    summary.errors.push(ItemFailure { external_id, title, error: err.to_string() });
                },
            }
        }

        info!(
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            skipped = summary.skipped,
            failed = summary.failed,
            "catalog sync cycle finished"
        );
        self.finish(started_at, CycleOutcome::Completed(summary.clone())).await;
        Ok(summary)
    }

    pub async fn status(&self) -> SyncStatus {
        SyncStatus {
            running: self.running.load(Ordering::Acquire),
            last_cycle: self.last_cycle.read().await.clone(),
        }
    }

    async fn finish(&self, started_at: Timestamp, outcome: CycleOutcome) {
        let report = CycleReport { started_at, finished_at: Timestamp::now(), outcome };
        *self.last_cycle.write().await = Some(report);
    }
}

fn validate(item: PopularMovie) -> Result<(String, SyncedFields), (Rejection, PopularMovie)> {
    let external_id = non_blank(item.id.as_deref());
    let Some(external_id) = external_id else {
        return Err((Rejection::MissingExternalId, item));
    };
    let title = non_blank(item.title.as_deref());
    let Some(title) = title else {
        return Err((Rejection::EmptyTitle, item));
    };

    // An empty or unparseable date is stored as "no date" rather than rejected.
    let release_date = item.release_date.as_deref().and_then(|s| s.trim().parse().ok());
    let poster_path = item.poster_path.filter(|p| !p.trim().is_empty());

    Ok((
        external_id,
        SyncedFields {
            title,
            overview: item.overview.unwrap_or_default(),
            release_date,
            poster_path,
        },
    ))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Owns the in-flight flag for the duration of one cycle, releasing it even
/// if the cycle future is dropped mid-way.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
