//! Draw Engine Implementation
//!
//! Drives one draw at a time through `Idle → Rolling → Settled`: snapshots the
//! configuration and used numbers at start, re-rolls the display on a fixed
//! cadence, fixes distinct winners on stop and records them through the
//! submission client.

use crate::history::{ExclusionScope, HistoryTracker};
use crate::metrics::{self, LotteryMetrics};
use crate::model::{ConfigError, LotteryResult, Number};
use crate::state_machine::{DrawPhase, DrawSession, DrawState, RollingDraw};
use crate::store::LotteryStore;
use crate::submit::{Privilege, ResultSubmitter};
use rand::rngs::StdRng;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Engine timing and exclusion policy.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delay between rolling frames
    pub tick_interval: Duration,
    /// Frames rolled by [`DrawEngine::run`] before stopping
    pub roll_ticks: u32,
    /// Upper bound for every store call
    pub io_timeout: Duration,
    /// Which history entries exclude numbers from a new draw
    pub exclusion_scope: ExclusionScope,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            roll_ticks: 20,
            io_timeout: Duration::from_secs(5),
            exclusion_scope: ExclusionScope::Global,
        }
    }
}

impl EngineConfig {
    /// Total rolling time of a [`DrawEngine::run`] call, excluding I/O.
    pub fn roll_duration(&self) -> Duration {
        self.tick_interval.saturating_mul(self.roll_ticks)
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Error type for lottery operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LotteryError {
    #[error("Invalid lottery configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("Administrator privilege required")]
    Unauthorized,
    #[error("Cannot {action} while the draw is {state}")]
    InvalidTransition {
        state: DrawPhase,
        action: &'static str,
    },
    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),
    #[error("Missing component: {0}")]
    MissingComponent(String),
}

impl LotteryError {
    /// Returns true for failures of the persistence layer, which callers may retry.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            LotteryError::Storage(_) | LotteryError::Serialization(_) | LotteryError::Timeout { .. }
        )
    }
}

/// Runs a store call with an upper bound on the wait.
pub async fn with_timeout<T, F>(operation: &'static str, after: Duration, fut: F) -> Result<T, LotteryError>
where
    F: Future<Output = Result<T, LotteryError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation = operation,
                timeout_ms = after.as_millis() as u64,
                "Store operation timed out"
            );
            Err(LotteryError::Timeout { operation, after })
        }
    }
}

// ============================================================================
// DRAW ENGINE
// ============================================================================

/// One draw engine per display. Not reentrant: a single draw at a time.
pub struct DrawEngine<S: LotteryStore + ?Sized, R: Rng + Send = StdRng> {
    store: Arc<S>,
    history: HistoryTracker<S>,
    submitter: ResultSubmitter<S>,
    rng: R,
    config: EngineConfig,
    metrics: LotteryMetrics,
    state: DrawState,
    next_session: u64,
}

impl<S: LotteryStore + ?Sized, R: Rng + Send> DrawEngine<S, R> {
    /// Creates an idle engine.
    pub fn new(
        store: Arc<S>,
        rng: R,
        privilege: Privilege,
        config: EngineConfig,
        metrics: LotteryMetrics,
    ) -> Self {
        tracing::info!(
            privilege = ?privilege,
            io_timeout_ms = config.io_timeout.as_millis() as u64,
            scope = ?config.exclusion_scope,
            "Creating draw engine"
        );

        metrics.set_phase(DrawPhase::Idle);

        Self {
            history: HistoryTracker::new(Arc::clone(&store), config.io_timeout),
            submitter: ResultSubmitter::new(Arc::clone(&store), privilege, config.io_timeout, metrics.clone()),
            store,
            rng,
            config,
            metrics,
            state: DrawState::Idle,
            next_session: 1,
        }
    }

    pub fn state(&self) -> &DrawState {
        &self.state
    }

    pub fn phase(&self) -> DrawPhase {
        self.state.phase()
    }

    /// Session of the current or last draw.
    pub fn session(&self) -> Option<&DrawSession> {
        self.state.session()
    }

    /// Numbers currently shown: the rolling frame or the settled winners.
    pub fn displayed(&self) -> &[Number] {
        match &self.state {
            DrawState::Idle => &[],
            DrawState::Rolling(rolling) => rolling.displayed(),
            DrawState::Settled(settled) => &settled.numbers,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &LotteryMetrics {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn set_state(&mut self, state: DrawState) {
        self.metrics.set_phase(state.phase());
        self.state = state;
    }

    // ========================================================================
    // TRANSITIONS
    // ========================================================================

    /// `Idle | Settled → Rolling`.
    ///
    /// Reads the configuration and the used-number set once; both are frozen in
    /// the returned session. While already rolling this is a no-op returning the
    /// running session.
    ///
    /// # Errors
    ///
    /// `Unauthorized`, `InvalidConfig` for a stored configuration that fails
    /// validation, or a storage/timeout error. The engine state is unchanged on error.
    pub async fn start(&mut self) -> Result<DrawSession, LotteryError> {
        self.submitter.privilege().require_admin()?;

        if self.phase() == DrawPhase::Rolling {
            if let Some(session) = self.session() {
                tracing::warn!(session_id = session.id, "Draw already rolling, ignoring start");
                return Ok(session.clone());
            }
        }

        let config = with_timeout("read config", self.config.io_timeout, self.store.config()).await?;
        let used = self
            .history
            .used_numbers_for(self.config.exclusion_scope, config.effective_title())
            .await?;

        let session = DrawSession::new(self.next_session, &config, used).inspect_err(|e| {
            tracing::error!(error = %e, "Stored lottery configuration is invalid");
        })?;
        self.next_session += 1;

        if let DrawState::Settled(previous) = &self.state {
            if !previous.is_recorded() {
                tracing::warn!(
                    session_id = previous.session.id,
                    numbers = ?previous.numbers,
                    "Discarding settled draw that was never recorded"
                );
            }
        }

        metrics::trace_draw_started(
            session.id,
            &session.title,
            session.min_number,
            session.max_number,
            session.count,
            session.used.len(),
        );
        self.metrics.inc_draws_started();

        let rolling = RollingDraw::begin(session.clone(), &mut self.rng);
        self.set_state(DrawState::Rolling(rolling));
        Ok(session)
    }

    /// `Rolling → Rolling`: regenerates the displayed frame.
    pub fn tick(&mut self) -> Result<Vec<Number>, LotteryError> {
        match &mut self.state {
            DrawState::Rolling(rolling) => {
                let frame = rolling.tick(&mut self.rng).to_vec();
                self.metrics.inc_ticks();
                tracing::debug!(session_id = rolling.session().id, frame = ?frame, "Rolled frame");
                Ok(frame)
            }
            other => Err(LotteryError::InvalidTransition {
                state: other.phase(),
                action: "tick",
            }),
        }
    }

    /// `Rolling → Settled`, then records the result.
    ///
    /// The winners are fixed before the store is contacted. If recording fails
    /// the engine stays `Settled` with the winners intact and the error is
    /// returned; [`resubmit`](Self::resubmit) retries the write.
    pub async fn stop(&mut self) -> Result<LotteryResult, LotteryError> {
        let rolling = match std::mem::take(&mut self.state) {
            DrawState::Rolling(rolling) => rolling,
            other => {
                let state = other.phase();
                self.state = other;
                return Err(LotteryError::InvalidTransition { state, action: "stop" });
            }
        };

        let settled = rolling.finalize(&mut self.rng);
        let session_id = settled.session.id;

        if settled.reused > 0 {
            self.metrics.inc_exhausted_fallbacks();
            metrics::trace_range_exhausted(
                session_id,
                settled.session.min_number,
                settled.session.max_number,
                settled.reused,
            );
        }
        metrics::trace_draw_settled(session_id, &settled.session.title, &settled.numbers, settled.reused);
        self.metrics.inc_draws_settled();
        self.metrics.set_last_draw_size(settled.numbers.len() as u64);

        self.set_state(DrawState::Settled(settled));
        self.record_settled().await
    }

    /// Retries recording a settled draw. Returns the stored result if it was
    /// already recorded.
    pub async fn resubmit(&mut self) -> Result<LotteryResult, LotteryError> {
        self.record_settled().await
    }

    async fn record_settled(&mut self) -> Result<LotteryResult, LotteryError> {
        let (title, numbers) = match &self.state {
            DrawState::Settled(settled) => {
                if let Some(record) = &settled.record {
                    return Ok(record.clone());
                }
                (settled.session.title.clone(), settled.numbers.clone())
            }
            other => {
                return Err(LotteryError::InvalidTransition {
                    state: other.phase(),
                    action: "submit",
                })
            }
        };

        let result = self.submitter.submit(&title, &numbers).await?;
        self.metrics.inc_draws_recorded();
        if let DrawState::Settled(settled) = &mut self.state {
            settled.record = Some(result.clone());
        }
        Ok(result)
    }

    /// `Rolling → Idle`, discarding the draw. Returns false if nothing was rolling.
    pub fn cancel(&mut self) -> bool {
        match &self.state {
            DrawState::Rolling(rolling) => {
                metrics::trace_draw_cancelled(rolling.session().id, rolling.ticks());
                self.metrics.inc_draws_cancelled();
                self.set_state(DrawState::Idle);
                true
            }
            _ => false,
        }
    }

    // ========================================================================
    // FULL DRAW
    // ========================================================================

    /// Runs a whole draw: start, `roll_ticks` frames at `tick_interval`, stop.
    pub async fn run(&mut self) -> Result<LotteryResult, LotteryError> {
        self.start().await?;

        let period = self.config.tick_interval.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        interval.tick().await;

        for _ in 0..self.config.roll_ticks {
            interval.tick().await;
            self.tick()?;
        }

        self.stop().await
    }
}

// ============================================================================
// TESTS
// ============================================================================
