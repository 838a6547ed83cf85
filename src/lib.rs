//! Festival Lottery Draw Core
//!
//! This crate implements the lottery draw used by the festival companion app:
//! a configurable number range, an animated rolling display, distinct winners
//! that avoid numbers already drawn, and a durable result history.

pub mod builder;
pub mod engine;
pub mod history;
pub mod metrics;
pub mod model;
pub mod pool;
pub mod service;
pub mod state_machine;
pub mod store;
pub mod submit;

pub use builder::DrawEngineBuilder;
pub use engine::{DrawEngine, EngineConfig, LotteryError};
pub use history::{ExclusionScope, HistoryTracker, UsedNumbers};
pub use metrics::LotteryMetrics;
pub use model::{ConfigError, LotteryConfig, LotteryConfigPatch, LotteryResult, Number};
pub use service::LotteryService;
pub use state_machine::{DrawPhase, DrawSession, DrawState};
pub use store::{ConfigStore, InMemoryStore, LotteryStore, ResultStore, StoreDocument};
pub use submit::{Privilege, ResultSubmitter};

#[cfg(feature = "std")]
pub use store::JsonFileStore;
