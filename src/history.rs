//! History and De-duplication Tracker
//!
//! Computes the Used-Number Set from persisted results. The set is rebuilt from
//! the store each time it is requested; nothing is cached between draws.

use crate::engine::{with_timeout, LotteryError};
use crate::model::{range_span, LotteryResult, Number};
use crate::store::ResultStore;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

/// Which past results count as "already used" for a new draw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExclusionScope {
    /// Every stored result, regardless of prize tier.
    #[default]
    Global,
    /// Only results recorded under the same title as the draw.
    PerTitle,
}

/// Union of winning numbers across a set of results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedNumbers(BTreeSet<Number>);

impl UsedNumbers {
    pub fn from_results<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = &'a LotteryResult>,
    {
        Self(
            results
                .into_iter()
                .flat_map(|r| r.numbers.iter().copied())
                .collect(),
        )
    }

    /// Builds the set for a draw titled `title` under `scope`.
    pub fn scoped(results: &[LotteryResult], scope: ExclusionScope, title: &str) -> Self {
        match scope {
            ExclusionScope::Global => Self::from_results(results),
            ExclusionScope::PerTitle => {
                Self::from_results(results.iter().filter(|r| r.title == title))
            }
        }
    }

    pub fn contains(&self, number: Number) -> bool {
        self.0.contains(&number)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_set(&self) -> &BTreeSet<Number> {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = Number> + '_ {
        self.0.iter().copied()
    }

    /// Returns true if every value of `[min, max]` has been used.
    pub fn covers(&self, min: Number, max: Number) -> bool {
        if min > max {
            return false;
        }
        self.0.range(min..=max).count() as u128 == range_span(min, max)
    }
}

impl FromIterator<Number> for UsedNumbers {
    fn from_iter<I: IntoIterator<Item = Number>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Sorts results newest first by `timestamp`. Ties keep storage order.
pub fn newest_first(mut results: Vec<LotteryResult>) -> Vec<LotteryResult> {
    results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    results
}

/// Reads history through a [`ResultStore`] with a bounded wait.
pub struct HistoryTracker<S: ResultStore + ?Sized> {
    store: Arc<S>,
    io_timeout: Duration,
}

impl<S: ResultStore + ?Sized> Clone for HistoryTracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            io_timeout: self.io_timeout,
        }
    }
}

impl<S: ResultStore + ?Sized> HistoryTracker<S> {
    pub fn new(store: Arc<S>, io_timeout: Duration) -> Self {
        Self { store, io_timeout }
    }

    async fn load(&self) -> Result<Vec<LotteryResult>, LotteryError> {
        with_timeout("read history", self.io_timeout, self.store.history()).await
    }

    /// Union of numbers across all stored results.
    pub async fn used_numbers(&self) -> Result<UsedNumbers, LotteryError> {
        let results = self.load().await?;
        let used = UsedNumbers::from_results(&results);
        tracing::debug!(results = results.len(), used = used.len(), "Computed used numbers");
        Ok(used)
    }

    /// Union of numbers for a draw titled `title` under `scope`.
    pub async fn used_numbers_for(
        &self,
        scope: ExclusionScope,
        title: &str,
    ) -> Result<UsedNumbers, LotteryError> {
        let results = self.load().await?;
        let used = UsedNumbers::scoped(&results, scope, title);
        tracing::debug!(
            scope = ?scope,
            title = title,
            results = results.len(),
            used = used.len(),
            "Computed used numbers"
        );
        Ok(used)
    }

    /// Full history, newest first.
    pub async fn newest_first(&self) -> Result<Vec<LotteryResult>, LotteryError> {
        Ok(newest_first(self.load().await?))
    }

    /// Most recent result recorded under `title`.
    pub async fn latest_for_title(&self, title: &str) -> Result<Option<LotteryResult>, LotteryError> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|r| r.title == title)
            .max_by_key(|r| r.timestamp))
    }

    /// Most recent result for every title present in history.
    pub async fn latest_by_title(&self) -> Result<BTreeMap<String, LotteryResult>, LotteryError> {
        let mut latest: BTreeMap<String, LotteryResult> = BTreeMap::new();
        for result in self.load().await? {
            let newer = latest
                .get(&result.title)
                .map_or(true, |current| result.timestamp >= current.timestamp);
            if newer {
                latest.insert(result.title.clone(), result);
            }
        }
        Ok(latest)
    }
}
