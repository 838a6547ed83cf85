//! Lottery Service
//!
//! Request-facing operations over one store: configuration reads and writes,
//! history listing, result submission and deletion, and per-caller draw
//! engines. Every call carries the caller's [`Privilege`]; history reads are
//! public, everything else is admin-only.

use crate::engine::{with_timeout, DrawEngine, EngineConfig, LotteryError};
use crate::history::HistoryTracker;
use crate::metrics::LotteryMetrics;
use crate::model::{LotteryConfig, LotteryConfigPatch, LotteryResult, Number};
use crate::store::LotteryStore;
use crate::submit::{Privilege, ResultSubmitter};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct LotteryService<S: LotteryStore + ?Sized> {
    store: Arc<S>,
    config: EngineConfig,
    metrics: LotteryMetrics,
}

impl<S: LotteryStore + ?Sized> Clone for LotteryService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: LotteryStore + ?Sized> LotteryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_engine_config(store, EngineConfig::default())
    }

    pub fn with_engine_config(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            metrics: LotteryMetrics::new(),
        }
    }

    /// Replaces the metrics registry shared by everything this service creates.
    pub fn with_metrics(mut self, metrics: LotteryMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &LotteryMetrics {
        &self.metrics
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.config
    }

    fn history_tracker(&self) -> HistoryTracker<S> {
        HistoryTracker::new(Arc::clone(&self.store), self.config.io_timeout)
    }

    fn submitter(&self, privilege: Privilege) -> ResultSubmitter<S> {
        ResultSubmitter::new(
            Arc::clone(&self.store),
            privilege,
            self.config.io_timeout,
            self.metrics.clone(),
        )
    }

    // ========================================================================
    // CONFIGURATION
    // ========================================================================

    pub async fn config(&self, privilege: Privilege) -> Result<LotteryConfig, LotteryError> {
        privilege.require_admin()?;
        with_timeout("read config", self.config.io_timeout, self.store.config()).await
    }

    /// Merges `patch` into the stored configuration. Invalid merges are rejected
    /// and nothing is written.
    pub async fn update_config(
        &self,
        privilege: Privilege,
        patch: LotteryConfigPatch,
    ) -> Result<LotteryConfig, LotteryError> {
        privilege.require_admin()?;

        let updated = with_timeout("update config", self.config.io_timeout, self.store.update_config(patch))
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Rejected lottery configuration update"))?;

        tracing::info!(
            min = updated.min_number,
            max = updated.max_number,
            count = updated.count,
            title = %updated.title,
            "Updated lottery configuration"
        );
        Ok(updated)
    }

    // ========================================================================
    // HISTORY
    // ========================================================================

    /// All results, newest first.
    pub async fn history(&self) -> Result<Vec<LotteryResult>, LotteryError> {
        self.history_tracker().newest_first().await
    }

    /// The most recently stored result.
    pub async fn latest_result(&self) -> Result<Option<LotteryResult>, LotteryError> {
        with_timeout("read latest result", self.config.io_timeout, self.store.latest_result()).await
    }

    pub async fn latest_for_title(&self, title: &str) -> Result<Option<LotteryResult>, LotteryError> {
        self.history_tracker().latest_for_title(title).await
    }

    pub async fn latest_by_title(&self) -> Result<BTreeMap<String, LotteryResult>, LotteryError> {
        self.history_tracker().latest_by_title().await
    }

    pub async fn submit_result(
        &self,
        privilege: Privilege,
        title: &str,
        numbers: &[Number],
    ) -> Result<LotteryResult, LotteryError> {
        self.submitter(privilege).submit(title, numbers).await
    }

    pub async fn delete_result(&self, privilege: Privilege, id: &str) -> Result<bool, LotteryError> {
        self.submitter(privilege).delete(id).await
    }

    pub async fn clear_history(&self, privilege: Privilege) -> Result<(), LotteryError> {
        self.submitter(privilege).clear_all().await
    }

    // ========================================================================
    // DRAWS
    // ========================================================================

    /// Creates a draw engine for an administrator.
    pub fn engine(&self, privilege: Privilege) -> Result<DrawEngine<S, StdRng>, LotteryError> {
        privilege.require_admin()?;
        Ok(DrawEngine::new(
            Arc::clone(&self.store),
            StdRng::from_os_rng(),
            privilege,
            self.config.clone(),
            self.metrics.clone(),
        ))
    }
}
