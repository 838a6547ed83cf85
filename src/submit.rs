//! Result Submission Client
//!
//! Packages settled draws for the store and handles administrator deletion of
//! history. Writes are best effort: a failure is logged and returned, and
//! whatever the caller already shows is left alone.

use crate::engine::{with_timeout, LotteryError};
use crate::metrics::LotteryMetrics;
use crate::model::{LotteryResult, Number};
use crate::store::ResultStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Caller privilege, established by the (external) authentication layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Privilege {
    #[default]
    Guest,
    Admin,
}

impl Privilege {
    pub fn is_admin(self) -> bool {
        self == Privilege::Admin
    }

    /// Fails with `LotteryError::Unauthorized` unless `self` is `Admin`.
    pub fn require_admin(self) -> Result<(), LotteryError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(LotteryError::Unauthorized)
        }
    }
}

/// Writes results to a [`ResultStore`] on behalf of one caller.
pub struct ResultSubmitter<S: ResultStore + ?Sized> {
    store: Arc<S>,
    privilege: Privilege,
    io_timeout: Duration,
    metrics: LotteryMetrics,
}

impl<S: ResultStore + ?Sized> Clone for ResultSubmitter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            privilege: self.privilege,
            io_timeout: self.io_timeout,
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: ResultStore + ?Sized> ResultSubmitter<S> {
    pub fn new(store: Arc<S>, privilege: Privilege, io_timeout: Duration, metrics: LotteryMetrics) -> Self {
        Self {
            store,
            privilege,
            io_timeout,
            metrics,
        }
    }

    pub fn privilege(&self) -> Privilege {
        self.privilege
    }

    /// Appends a result titled `title` holding `numbers`.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` for non-admin callers
    /// - `InvalidSubmission` for a blank title, no numbers, or repeated numbers
    /// - `Storage` / `Timeout` if the store fails; the draw itself is unaffected
    pub async fn submit(&self, title: &str, numbers: &[Number]) -> Result<LotteryResult, LotteryError> {
        self.privilege.require_admin()?;

        let title = title.trim();
        if title.is_empty() {
            return Err(LotteryError::InvalidSubmission("title must not be empty".to_string()));
        }
        if numbers.is_empty() {
            return Err(LotteryError::InvalidSubmission("numbers must not be empty".to_string()));
        }
        let mut seen = HashSet::with_capacity(numbers.len());
        if let Some(repeated) = numbers.iter().find(|n| !seen.insert(**n)) {
            return Err(LotteryError::InvalidSubmission(format!(
                "number {repeated} appears more than once"
            )));
        }

        self.metrics.inc_submissions();
        match with_timeout("submit result", self.io_timeout, self.store.append_result(title, numbers)).await {
            Ok(result) => {
                tracing::info!(
                    id = %result.id,
                    title = %result.title,
                    numbers = ?result.numbers,
                    "Recorded lottery result"
                );
                Ok(result)
            }
            Err(e) => {
                self.metrics.inc_submissions_failed();
                tracing::error!(
                    title = title,
                    numbers = ?numbers,
                    error = %e,
                    "Failed to record lottery result"
                );
                Err(e)
            }
        }
    }

    /// Deletes one result. Returns `Ok(false)` if `id` does not exist.
    pub async fn delete(&self, id: &str) -> Result<bool, LotteryError> {
        self.privilege.require_admin()?;

        let deleted = with_timeout("delete result", self.io_timeout, self.store.delete_result(id))
            .await
            .inspect_err(|e| tracing::error!(id = id, error = %e, "Failed to delete lottery result"))?;

        if deleted {
            self.metrics.inc_results_deleted();
            tracing::info!(id = id, "Deleted lottery result");
        } else {
            tracing::warn!(id = id, "Lottery result not found");
        }
        Ok(deleted)
    }

    /// Removes every result. Calling it on an empty history is fine.
    pub async fn clear_all(&self) -> Result<(), LotteryError> {
        self.privilege.require_admin()?;

        with_timeout("clear history", self.io_timeout, self.store.clear_results())
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to clear lottery history"))?;

        self.metrics.inc_history_cleared();
        tracing::info!("Cleared lottery history");
        Ok(())
    }
}
