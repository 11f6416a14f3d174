//! Picklist expiry coordination.
//!
//! Ties the deferred job scheduler to the persistent picklist so the two
//! never drift apart: an entry is only persisted once its removal job is
//! scheduled, manual removal cancels the job before deleting the entry, and
//! the job's own firing path tolerates an entry that a manual removal
//! already deleted.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use stock_track_data::{
    CacheError, Datastore, PicklistEntry, QuoteCache, StoreError,
};

use crate::scheduler::{OneShotScheduler, ScheduleError};

/// Errors from picklist operations.
#[derive(Debug, Error)]
pub enum PicklistError {
    /// The ticker is already on the picklist.
    #[error("{ticker} already in picklist")]
    AlreadyExists {
        /// The duplicate ticker.
        ticker: String,
    },

    /// The ticker is not on the picklist.
    #[error("{ticker} not in picklist")]
    NotFound {
        /// The missing ticker.
        ticker: String,
    },

    /// The deferred removal job could not be scheduled or cancelled; the
    /// operation it belonged to was not committed.
    #[error(transparent)]
    Scheduling(#[from] ScheduleError),

    /// The quote for the new entry could not be fetched.
    #[error(transparent)]
    Fetch(#[from] CacheError),

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Drives the per-ticker picklist state machine: absent, or pending with a
/// live expiry job.
pub struct PicklistCoordinator {
    store: Datastore,
    cache: Arc<QuoteCache>,
    scheduler: Arc<dyn OneShotScheduler>,
    expiry: Duration,
    expire_command: String,
}

impl PicklistCoordinator {
    /// Creates a coordinator. `expire_command` is the program the deferred
    /// job invokes; the ticker is appended as `expire <ticker>`.
    #[must_use]
    pub fn new(
        store: Datastore,
        cache: Arc<QuoteCache>,
        scheduler: Arc<dyn OneShotScheduler>,
        expiry: Duration,
        expire_command: String,
    ) -> Self {
        Self {
            store,
            cache,
            scheduler,
            expiry,
            expire_command,
        }
    }

    /// Adds `ticker` to the picklist and schedules its removal one expiry
    /// window from now.
    ///
    /// The entry is persisted only after the job is scheduled; if the
    /// scheduler refuses, the add fails whole. If persisting fails after
    /// scheduling, the fresh job is cancelled so nothing pending outlives
    /// the failed add.
    ///
    /// # Errors
    /// Fails with [`PicklistError::AlreadyExists`] for a duplicate ticker,
    /// and propagates fetch, scheduling, and store failures.
    pub async fn add(&self, ticker: &str, note: &str) -> Result<PicklistEntry, PicklistError> {
        if self.store.picklist().contains(ticker) {
            return Err(PicklistError::AlreadyExists {
                ticker: ticker.to_string(),
            });
        }

        let prices = self.cache.get(ticker).await?;
        let command = format!("{} expire {}", self.expire_command, ticker);
        let job = self.scheduler.schedule(self.expiry, &command).await?;

        let entry = PicklistEntry {
            note: note.to_string(),
            added_at: Utc::now(),
            prices,
            job: Some(job),
        };
        if let Err(err) = self.store.picklist().write(ticker, &entry) {
            if let Err(cancel_err) = self.scheduler.cancel(job).await {
                warn!(ticker, %job, error = %cancel_err, "failed to roll back expiry job");
            }
            return Err(err.into());
        }
        self.store.record_history(ticker, "pick", &[note.to_string()])?;
        info!(ticker, %job, "added to picklist");
        Ok(entry)
    }

    /// Removes `ticker` from the picklist, cancelling its pending expiry
    /// job first so the job cannot fire against a half-removed entry.
    ///
    /// # Errors
    /// Fails with [`PicklistError::NotFound`] if the ticker is absent, and
    /// surfaces real cancellation failures (a job that already fired is not
    /// one).
    pub async fn remove(&self, ticker: &str) -> Result<(), PicklistError> {
        let Some(entry) = self.store.picklist().read(ticker)? else {
            return Err(PicklistError::NotFound {
                ticker: ticker.to_string(),
            });
        };

        if let Some(job) = entry.job {
            self.scheduler.cancel(job).await?;
        }
        self.store.picklist().delete(ticker)?;
        self.store.record_history(ticker, "unpick", &[])?;
        info!(ticker, "removed from picklist");
        Ok(())
    }

    /// The deferred job's action: remove `ticker` when its window elapses.
    ///
    /// Identical to [`Self::remove`] except that an already-removed ticker
    /// is a no-op success, since a manual removal may have won the race.
    ///
    /// # Errors
    /// Propagates store and real cancellation failures.
    pub async fn expire(&self, ticker: &str) -> Result<(), PicklistError> {
        match self.remove(ticker).await {
            Err(PicklistError::NotFound { .. }) => {
                debug!(ticker, "expiry fired for already-removed ticker");
                Ok(())
            }
            other => other,
        }
    }

    /// Every current picklist entry, sorted by ticker.
    ///
    /// # Errors
    /// Returns an error if the picklist cannot be read.
    pub fn entries(&self) -> Result<Vec<(String, PicklistEntry)>, PicklistError> {
        Ok(self.store.picklist().entries()?)
    }
}
