//! Draw Lifecycle
//!
//! Pure, synchronous part of a draw: `Idle → Rolling → Settled`. Nothing here
//! touches storage; the async [`DrawEngine`](crate::engine::DrawEngine) feeds
//! snapshots in and carries settled numbers out.

use crate::history::UsedNumbers;
use crate::model::{now_millis, ConfigError, LotteryConfig, LotteryResult, Number};
use crate::pool::{self, CandidatePool};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Lifecycle phase of a draw engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawPhase {
    Idle,
    Rolling,
    Settled,
}

impl fmt::Display for DrawPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawPhase::Idle => write!(f, "idle"),
            DrawPhase::Rolling => write!(f, "rolling"),
            DrawPhase::Settled => write!(f, "settled"),
        }
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Immutable snapshot taken when a draw starts.
///
/// Range, count, title and the used-number set are fixed for the whole draw;
/// later configuration or history changes do not reach an existing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawSession {
    pub id: u64,
    pub min_number: Number,
    pub max_number: Number,
    pub count: u32,
    pub title: String,
    pub used: UsedNumbers,
    pub started_at: i64,
}

impl DrawSession {
    /// Snapshots `config` and `used`. Fails if the configuration is invalid.
    pub fn new(id: u64, config: &LotteryConfig, used: UsedNumbers) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            id,
            min_number: config.min_number,
            max_number: config.max_number,
            count: config.count,
            title: config.effective_title().to_string(),
            used,
            started_at: now_millis(),
        })
    }

    pub fn contains(&self, number: Number) -> bool {
        (self.min_number..=self.max_number).contains(&number)
    }

    /// Returns true if history has used every number in range.
    pub fn is_exhausted(&self) -> bool {
        self.used.covers(self.min_number, self.max_number)
    }

    /// One frame of rolling numbers. Presentation only; repeats are allowed.
    fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Number> {
        (0..self.count)
            .map(|_| pool::sample(rng, self.min_number, self.max_number, self.used.as_set()))
            .collect()
    }
}

// ============================================================================
// ROLLING
// ============================================================================

/// A draw in progress.
#[derive(Debug, Clone)]
pub struct RollingDraw {
    session: DrawSession,
    displayed: Vec<Number>,
    ticks: u32,
}

impl RollingDraw {
    /// Enters `Rolling` with a first frame already on display.
    pub fn begin<R: Rng + ?Sized>(session: DrawSession, rng: &mut R) -> Self {
        let displayed = session.roll(rng);
        Self {
            session,
            displayed,
            ticks: 0,
        }
    }

    pub fn session(&self) -> &DrawSession {
        &self.session
    }

    /// Numbers currently on display.
    pub fn displayed(&self) -> &[Number] {
        &self.displayed
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Regenerates the displayed frame.
    pub fn tick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> &[Number] {
        self.displayed = self.session.roll(rng);
        self.ticks += 1;
        &self.displayed
    }

    /// Fixes the winning numbers and enters `Settled`.
    pub fn finalize<R: Rng + ?Sized>(self, rng: &mut R) -> SettledDraw {
        let selection = select_winners(&self.session, &self.displayed, rng);
        SettledDraw {
            session: self.session,
            numbers: selection.numbers,
            from_display: selection.from_display,
            reused: selection.reused,
            settled_at: now_millis(),
            record: None,
        }
    }
}

// ============================================================================
// SETTLED
// ============================================================================

/// A finished draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledDraw {
    pub session: DrawSession,
    /// Winning numbers, pairwise distinct, all within the session range
    pub numbers: Vec<Number>,
    /// How many winners were taken from the final displayed frame
    pub from_display: usize,
    /// How many winners repeat a number already present in history
    pub reused: usize,
    pub settled_at: i64,
    /// Stored result, once submission succeeded
    pub record: Option<LotteryResult>,
}

impl SettledDraw {
    pub fn is_recorded(&self) -> bool {
        self.record.is_some()
    }
}

/// Engine state. Rolling and settled states own their draw data.
#[derive(Debug, Clone, Default)]
pub enum DrawState {
    #[default]
    Idle,
    Rolling(RollingDraw),
    Settled(SettledDraw),
}

impl DrawState {
    pub fn phase(&self) -> DrawPhase {
        match self {
            DrawState::Idle => DrawPhase::Idle,
            DrawState::Rolling(_) => DrawPhase::Rolling,
            DrawState::Settled(_) => DrawPhase::Settled,
        }
    }

    pub fn session(&self) -> Option<&DrawSession> {
        match self {
            DrawState::Idle => None,
            DrawState::Rolling(rolling) => Some(rolling.session()),
            DrawState::Settled(settled) => Some(&settled.session),
        }
    }
}

// ============================================================================
// FINALIZATION
// ============================================================================

/// Outcome of [`select_winners`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub numbers: Vec<Number>,
    pub from_display: usize,
    pub reused: usize,
}

/// Chooses `session.count` distinct winners.
///
/// 1. Keep displayed numbers that are in range and unused (first occurrence wins).
/// 2. Take `count` of them evenly spaced by position, left to right.
/// 3. Top up from the range minus used minus chosen, drawn by index.
/// 4. If that runs dry, top up from the range minus chosen, reusing history.
///
/// Step 4 keeps winners distinct because a valid session has `count <= span`.
pub fn select_winners<R: Rng + ?Sized>(
    session: &DrawSession,
    displayed: &[Number],
    rng: &mut R,
) -> Selection {
    let count = session.count as usize;

    let mut seen = BTreeSet::new();
    let qualifying: Vec<Number> = displayed
        .iter()
        .copied()
        .filter(|&n| session.contains(n) && !session.used.contains(n) && seen.insert(n))
        .collect();

    let mut numbers = evenly_spaced(&qualifying, count);
    let from_display = numbers.len();

    let mut fresh = CandidatePool::excluding(
        session.min_number,
        session.max_number,
        session.used.iter().chain(numbers.iter().copied()),
    );
    while numbers.len() < count {
        match fresh.draw(rng) {
            Some(n) => numbers.push(n),
            None => break,
        }
    }

    let mut reused = 0;
    if numbers.len() < count {
        let mut any = CandidatePool::excluding(
            session.min_number,
            session.max_number,
            numbers.iter().copied(),
        );
        while numbers.len() < count {
            match any.draw(rng) {
                Some(n) => {
                    numbers.push(n);
                    reused += 1;
                }
                None => break,
            }
        }
    }

    Selection {
        numbers,
        from_display,
        reused,
    }
}

/// Picks `count` items at evenly spaced positions, keeping their order.
fn evenly_spaced(items: &[Number], count: usize) -> Vec<Number> {
    if items.len() <= count {
        return items.to_vec();
    }
    (0..count).map(|i| items[i * items.len() / count]).collect()
}
