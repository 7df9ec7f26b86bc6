//! Per-host communication patterns.
//!
//! ```text
//!   window: src ─► {dst: count} ─► normalised Pattern
//!                                   │ cosine vs. host library
//!                      ┌────────────┴────────────┐
//!              sim ≥ tresh_match           otherwise
//!           merge into entry, count+1    new entry, count 1
//!                      └────────────┬────────────┘
//!            prob = count / Σ counts, tail = Σ prob ≤ own
//!            alarm when tail ≤ tresh_alert
//! ```

pub mod detector;
pub mod library;
pub mod vector;

use serde::{Deserialize, Serialize};

use crate::error::{IdsError, IdsResult};
use crate::store::StoreConfig;

// ── Re-exports ──────────────────────────────────────────────────────

pub use detector::PatternSimilarity;
pub use library::{tail_probability, LibraryEntry, Match, PatternLibrary};
pub use vector::Pattern;

/// Default window length in seconds.
pub const DEFAULT_PERIOD_SECS: f64 = 4.0;

/// Default minimum cosine similarity to merge into a library entry.
pub const DEFAULT_TRESH_MATCH: f64 = 0.6;

/// Default tail probability at or below which a pattern is rare.
pub const DEFAULT_TRESH_ALERT: f64 = 0.7;

/// Default maximum library entries per host.
pub const DEFAULT_MAX_PATTERNS: usize = 64;

/// Pattern-similarity detector configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub id: String,
    pub period_secs: f64,
    pub tresh_match: f64,
    pub tresh_alert: f64,
    pub max_patterns: usize,
    pub store: StoreConfig,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            id: "pattern".into(),
            period_secs: DEFAULT_PERIOD_SECS,
            tresh_match: DEFAULT_TRESH_MATCH,
            tresh_alert: DEFAULT_TRESH_ALERT,
            max_patterns: DEFAULT_MAX_PATTERNS,
            store: StoreConfig::default(),
        }
    }
}

impl PatternConfig {
    pub fn validate(&self) -> IdsResult<()> {
        crate::window::duration_from_secs("pattern.period_secs", self.period_secs)?;
        if !(0.0..=1.0).contains(&self.tresh_match) {
            return Err(IdsError::invalid("pattern.tresh_match", "must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.tresh_alert) {
            return Err(IdsError::invalid("pattern.tresh_alert", "must be in [0, 1]"));
        }
        if self.max_patterns == 0 {
            return Err(IdsError::invalid("pattern.max_patterns", "must be at least 1"));
        }
        self.store.validate("pattern.store")
    }
}
