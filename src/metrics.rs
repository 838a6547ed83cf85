//! Lottery Metrics and Observability
//!
//! Counters for the draw lifecycle and result history, exported in Prometheus
//! text format, plus structured tracing helpers for lifecycle events.

use crate::state_machine::DrawPhase;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared lottery metrics. Cloning shares the same counters.
#[derive(Debug, Clone)]
pub struct LotteryMetrics {
    inner: Arc<LotteryMetricsInner>,
}

#[derive(Debug)]
struct LotteryMetricsInner {
    // Gauges
    phase: AtomicU64, // 0=idle, 1=rolling, 2=settled
    last_draw_size: AtomicU64,

    // Counters
    draws_started: AtomicU64,
    draws_settled: AtomicU64,
    draws_cancelled: AtomicU64,
    ticks_total: AtomicU64,
    exhausted_fallbacks: AtomicU64,
    submissions_total: AtomicU64,
    submissions_failed: AtomicU64,
    draws_recorded: AtomicU64,
    results_deleted: AtomicU64,
    history_cleared: AtomicU64,

    // None if the histogram could be neither registered nor created.
    #[cfg(feature = "observability")]
    store_write_duration: Option<prometheus::Histogram>,
}

impl Default for LotteryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl LotteryMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LotteryMetricsInner {
                phase: AtomicU64::new(0),
                last_draw_size: AtomicU64::new(0),
                draws_started: AtomicU64::new(0),
                draws_settled: AtomicU64::new(0),
                draws_cancelled: AtomicU64::new(0),
                ticks_total: AtomicU64::new(0),
                exhausted_fallbacks: AtomicU64::new(0),
                submissions_total: AtomicU64::new(0),
                submissions_failed: AtomicU64::new(0),
                draws_recorded: AtomicU64::new(0),
                results_deleted: AtomicU64::new(0),
                history_cleared: AtomicU64::new(0),
                #[cfg(feature = "observability")]
                store_write_duration: prometheus::register_histogram!(
                    "lottery_store_write_duration_seconds",
                    "Store document write duration in seconds",
                    prometheus::DEFAULT_BUCKETS.to_vec()
                )
                .or_else(|_| {
                    prometheus::Histogram::with_opts(prometheus::HistogramOpts::new(
                        "lottery_store_write_duration_seconds",
                        "Store document write duration in seconds",
                    ))
                })
                .ok(),
            }),
        }
    }

    // ========================================================================
    // GAUGES
    // ========================================================================

    pub fn set_phase(&self, phase: DrawPhase) {
        let value = match phase {
            DrawPhase::Idle => 0,
            DrawPhase::Rolling => 1,
            DrawPhase::Settled => 2,
        };
        self.inner.phase.store(value, Ordering::Relaxed);
    }

    pub fn set_last_draw_size(&self, size: u64) {
        self.inner.last_draw_size.store(size, Ordering::Relaxed);
    }

    // ========================================================================
    // COUNTERS
    // ========================================================================

    pub fn inc_draws_started(&self) {
        self.inner.draws_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_draws_settled(&self) {
        self.inner.draws_settled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_draws_cancelled(&self) {
        self.inner.draws_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ticks(&self) {
        self.inner.ticks_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_exhausted_fallbacks(&self) {
        self.inner.exhausted_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_submissions(&self) {
        self.inner.submissions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_submissions_failed(&self) {
        self.inner.submissions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a settled draw whose result reached the store.
    pub fn inc_draws_recorded(&self) {
        self.inner.draws_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_results_deleted(&self) {
        self.inner.results_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_history_cleared(&self) {
        self.inner.history_cleared.fetch_add(1, Ordering::Relaxed);
    }

    // ========================================================================
    // OBSERVABILITY
    // ========================================================================

    /// Observes a store document write.
    #[cfg_attr(not(feature = "observability"), allow(unused_variables))]
    pub fn observe_store_write(&self, duration: std::time::Duration) {
        #[cfg(feature = "observability")]
        if let Some(histogram) = &self.inner.store_write_duration {
            histogram.observe(duration.as_secs_f64());
        }
    }

    /// Store writes observed by the latency histogram.
    #[cfg(feature = "observability")]
    pub fn store_writes_observed(&self) -> u64 {
        self.inner
            .store_write_duration
            .as_ref()
            .map_or(0, |histogram| histogram.get_sample_count())
    }

    // ========================================================================
    // GETTERS
    // ========================================================================

    pub fn phase(&self) -> u64 {
        self.inner.phase.load(Ordering::Relaxed)
    }
    pub fn last_draw_size(&self) -> u64 {
        self.inner.last_draw_size.load(Ordering::Relaxed)
    }
    pub fn draws_started(&self) -> u64 {
        self.inner.draws_started.load(Ordering::Relaxed)
    }
    pub fn draws_settled(&self) -> u64 {
        self.inner.draws_settled.load(Ordering::Relaxed)
    }
    pub fn draws_cancelled(&self) -> u64 {
        self.inner.draws_cancelled.load(Ordering::Relaxed)
    }
    pub fn ticks_total(&self) -> u64 {
        self.inner.ticks_total.load(Ordering::Relaxed)
    }
    pub fn exhausted_fallbacks(&self) -> u64 {
        self.inner.exhausted_fallbacks.load(Ordering::Relaxed)
    }
    pub fn submissions_total(&self) -> u64 {
        self.inner.submissions_total.load(Ordering::Relaxed)
    }
    pub fn submissions_failed(&self) -> u64 {
        self.inner.submissions_failed.load(Ordering::Relaxed)
    }
    pub fn draws_recorded(&self) -> u64 {
        self.inner.draws_recorded.load(Ordering::Relaxed)
    }
    pub fn results_deleted(&self) -> u64 {
        self.inner.results_deleted.load(Ordering::Relaxed)
    }
    pub fn history_cleared(&self) -> u64 {
        self.inner.history_cleared.load(Ordering::Relaxed)
    }

    /// Settled draws whose result never reached the store.
    pub fn unrecorded_draws(&self) -> u64 {
        self.draws_settled().saturating_sub(self.draws_recorded())
    }

    // ========================================================================
    // PROMETHEUS EXPORT
    // ========================================================================

    /// Exports metrics in Prometheus text format.
    pub fn to_prometheus_text(&self) -> String {
        let mut output = String::new();

        macro_rules! gauge {
            ($name:expr, $help:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} gauge\n{} {}\n",
                    $name, $help, $name, $name, $value
                ));
            };
        }

        macro_rules! counter {
            ($name:expr, $help:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} counter\n{} {}\n",
                    $name, $help, $name, $name, $value
                ));
            };
        }

        gauge!(
            "lottery_phase",
            "Draw phase (0=idle, 1=rolling, 2=settled)",
            self.phase()
        );
        gauge!(
            "lottery_last_draw_size",
            "Winners in the last settled draw",
            self.last_draw_size()
        );

        counter!("lottery_draws_started", "Draws started", self.draws_started());
        counter!("lottery_draws_settled", "Draws settled", self.draws_settled());
        counter!(
            "lottery_draws_cancelled",
            "Draws cancelled while rolling",
            self.draws_cancelled()
        );
        counter!("lottery_ticks_total", "Rolling frames generated", self.ticks_total());
        counter!(
            "lottery_exhausted_fallbacks",
            "Draws that reused numbers from history",
            self.exhausted_fallbacks()
        );
        counter!(
            "lottery_submissions_total",
            "Result submissions attempted",
            self.submissions_total()
        );
        counter!(
            "lottery_submissions_failed",
            "Result submissions that failed",
            self.submissions_failed()
        );
        counter!(
            "lottery_draws_recorded",
            "Settled draws whose result was stored",
            self.draws_recorded()
        );
        counter!(
            "lottery_results_deleted",
            "Results deleted by id",
            self.results_deleted()
        );
        counter!(
            "lottery_history_cleared",
            "History clear operations",
            self.history_cleared()
        );

        output
    }
}

// ============================================================================
// TRACING HELPERS
// ============================================================================

pub fn trace_draw_started(session_id: u64, title: &str, min: i64, max: i64, count: u32, used: usize) {
    tracing::info!(
        session_id = session_id,
        title = title,
        min = min,
        max = max,
        count = count,
        used = used,
        event = "draw_started",
        "Started lottery draw"
    );
}

pub fn trace_draw_settled(session_id: u64, title: &str, numbers: &[i64], reused: usize) {
    tracing::info!(
        session_id = session_id,
        title = title,
        numbers = ?numbers,
        reused = reused,
        event = "draw_settled",
        "Settled lottery draw"
    );
}

pub fn trace_draw_cancelled(session_id: u64, ticks: u32) {
    tracing::info!(
        session_id = session_id,
        ticks = ticks,
        event = "draw_cancelled",
        "Cancelled lottery draw"
    );
}

/// Records that history covered the whole range and numbers were reused.
pub fn trace_range_exhausted(session_id: u64, min: i64, max: i64, reused: usize) {
    tracing::warn!(
        session_id = session_id,
        min = min,
        max = max,
        reused = reused,
        event = "range_exhausted",
        "Not enough unused numbers, reusing numbers from history"
    );
}
