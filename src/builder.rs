use crate::engine::{DrawEngine, EngineConfig, LotteryError};
use crate::metrics::LotteryMetrics;
use crate::store::{InMemoryStore, LotteryStore};
use crate::submit::Privilege;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

#[cfg(feature = "std")]
use crate::store::JsonFileStore;
#[cfg(feature = "std")]
use std::path::PathBuf;

/// Builder for `DrawEngine`.
///
/// Provides a fluent API for configuring and creating a `DrawEngine`.
pub struct DrawEngineBuilder<S: LotteryStore + ?Sized, R: Rng + Send = StdRng> {
    store: Option<Arc<S>>,
    rng: R,
    privilege: Privilege,
    config: EngineConfig,
    metrics: Option<LotteryMetrics>,
}

impl<S: LotteryStore + ?Sized> DrawEngineBuilder<S, StdRng> {
    /// Creates a new builder with default configuration and an OS-seeded generator.
    pub fn new() -> Self {
        Self {
            store: None,
            rng: StdRng::from_os_rng(),
            privilege: Privilege::Guest,
            config: EngineConfig::default(),
            metrics: None,
        }
    }

    /// Replaces the generator with one seeded from `seed`, for reproducible draws.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
}

impl<S: LotteryStore + ?Sized, R: Rng + Send> DrawEngineBuilder<S, R> {
    /// Sets the store (Required).
    pub fn store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses a different random source.
    pub fn rng<R2: Rng + Send>(self, rng: R2) -> DrawEngineBuilder<S, R2> {
        DrawEngineBuilder {
            store: self.store,
            rng,
            privilege: self.privilege,
            config: self.config,
            metrics: self.metrics,
        }
    }

    /// Sets the caller privilege. Defaults to `Guest`, which cannot draw.
    pub fn privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = privilege;
        self
    }

    /// Shares an existing metrics registry.
    pub fn metrics(mut self, metrics: LotteryMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Modifies the configuration via a closure.
    pub fn configure<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut EngineConfig),
    {
        f(&mut self.config);
        self
    }

    /// Builds the `DrawEngine`.
    ///
    /// # Errors
    ///
    /// Returns `LotteryError::MissingComponent` if no store was set.
    pub fn build(self) -> Result<DrawEngine<S, R>, LotteryError> {
        let store = self
            .store
            .ok_or_else(|| LotteryError::MissingComponent("store is required for DrawEngine".to_string()))?;

        Ok(DrawEngine::new(
            store,
            self.rng,
            self.privilege,
            self.config,
            self.metrics.unwrap_or_default(),
        ))
    }
}

impl<R: Rng + Send> DrawEngineBuilder<InMemoryStore, R> {
    /// Uses a fresh in-memory store.
    pub fn with_memory_store(mut self) -> Self {
        self.store = Some(Arc::new(InMemoryStore::new()));
        self
    }
}

#[cfg(feature = "std")]
impl<R: Rng + Send> DrawEngineBuilder<JsonFileStore, R> {
    /// Opens (or creates) the JSON document at `path` and uses it as the store.
    ///
    /// # feature="std" required
    pub async fn with_json_store(mut self, path: impl Into<PathBuf>) -> Result<Self, LotteryError> {
        let metrics = self.metrics.get_or_insert_with(LotteryMetrics::new).clone();
        let store = JsonFileStore::open_with_metrics(path, Some(metrics)).await?;
        self.store = Some(Arc::new(store));
        Ok(self)
    }
}

impl<S: LotteryStore + ?Sized> Default for DrawEngineBuilder<S, StdRng> {
    fn default() -> Self {
        Self::new()
    }
}
