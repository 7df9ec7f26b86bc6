//! Sketch-divergence detection.
//!
//! ```text
//!   record ─► key (dst/src address) ─┬─► row 0: h0(k) ─► cell counter += v
//!                                    ├─► row 1: h1(k) ─► cell counter += v
//!                                    └─► ...
//!
//!   window close, per row:
//!     p = counters / Σ counters        q = LMS forecasts / Σ forecasts
//!     D = Σ (p−q)²/q ─► smoother (EWMA mean/std, debounce) ─► row alarm
//!
//!   detector alarm = at least `quorum` rows alarm
//! ```
//!
//! Collisions only ever add to a cell, so per-key estimates never fall
//! below the true count.

pub mod cell;
pub mod detector;
pub mod hash;
pub mod row;

use serde::{Deserialize, Serialize};

use crate::error::{IdsError, IdsResult};
use crate::store::DEFAULT_MAX_TRACKED_KEYS;

// ── Re-exports ──────────────────────────────────────────────────────

pub use cell::Cell;
pub use detector::SketchDivergence;
pub use hash::{sketch_key, HashRow, MERSENNE_61};
pub use row::{divergence, normalize, DivergenceSmoother, RowVerdict, SketchRow, SmoothingParams};

/// Default window length in seconds.
pub const DEFAULT_PERIOD_SECS: f64 = 15.0;

/// Default number of independent hash rows.
pub const DEFAULT_NROWS: usize = 4;

/// Default number of cells per row.
pub const DEFAULT_NCOLS: usize = 64;

/// Default LMS history length.
pub const DEFAULT_HISTORY: usize = 5;

/// Default width of the normal band in standard deviations.
pub const DEFAULT_COEF_BOUND: f64 = 3.0;

/// Default weight of the previous smoothed value.
pub const DEFAULT_COEF_FORE: f64 = 0.7;

/// Default number of consecutive exceedances before a row alarms.
pub const DEFAULT_CONSECUTIVE: u32 = 3;

/// Default spread floor, as a multiple of the smoothed mean.
pub const DEFAULT_SPREAD_FLOOR: f64 = 2.0;

/// Default exceedance streak after which a row accepts the new level.
pub const DEFAULT_MAX_FREEZE: u32 = 6;

/// Default number of row evaluations before alarms are allowed.
pub const DEFAULT_WARMUP: u32 = 10;

/// Default number of alarming rows needed for a detector alarm.
pub const DEFAULT_QUORUM: usize = 1;

/// Suspect keys reported per alarm.
pub const MAX_SUSPECTS: usize = 10;

/// Which address of a record keys the sketch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SketchKey {
    #[default]
    Destination,
    Source,
}

/// What a record contributes to its key's counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SketchInput {
    /// 1 per bare SYN, other records ignored.
    #[default]
    SynPackets,
    /// 1 per record.
    Packets,
    /// Record size in bytes.
    Bytes,
}

/// Sketch-divergence detector configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SketchConfig {
    pub id: String,
    pub period_secs: f64,
    pub nrows: usize,
    pub ncols: usize,
    /// Trailing history length `n` of each cell's forecaster.
    pub history: usize,
    pub coef_bound: f64,
    pub coef_fore: f64,
    pub consecutive: u32,
    pub spread_floor: f64,
    /// 0 disables re-baselining.
    pub max_freeze: u32,
    pub warmup: u32,
    pub quorum: usize,
    pub key: SketchKey,
    pub input: SketchInput,
    /// Seed for the hash-row parameters.
    pub seed: Option<u64>,
    /// Distinct keys remembered per window for suspect reporting.
    pub max_tracked_keys: usize,
}

impl Default for SketchConfig {
    fn default() -> Self {
        Self {
            id: "sketch".into(),
            period_secs: DEFAULT_PERIOD_SECS,
            nrows: DEFAULT_NROWS,
            ncols: DEFAULT_NCOLS,
            history: DEFAULT_HISTORY,
            coef_bound: DEFAULT_COEF_BOUND,
            coef_fore: DEFAULT_COEF_FORE,
            consecutive: DEFAULT_CONSECUTIVE,
            spread_floor: DEFAULT_SPREAD_FLOOR,
            max_freeze: DEFAULT_MAX_FREEZE,
            warmup: DEFAULT_WARMUP,
            quorum: DEFAULT_QUORUM,
            key: SketchKey::default(),
            input: SketchInput::default(),
            seed: None,
            max_tracked_keys: DEFAULT_MAX_TRACKED_KEYS,
        }
    }
}

impl SketchConfig {
    pub fn validate(&self) -> IdsResult<()> {
        crate::window::duration_from_secs("sketch.period_secs", self.period_secs)?;
        if self.nrows == 0 {
            return Err(IdsError::invalid("sketch.nrows", "must be at least 1"));
        }
        if self.ncols == 0 {
            return Err(IdsError::invalid("sketch.ncols", "must be at least 1"));
        }
        if self.history == 0 {
            return Err(IdsError::invalid("sketch.history", "must be at least 1"));
        }
        if !self.coef_bound.is_finite() || self.coef_bound < 0.0 {
            return Err(IdsError::invalid("sketch.coef_bound", "must be finite and >= 0"));
        }
        if !(0.0..1.0).contains(&self.coef_fore) {
            return Err(IdsError::invalid("sketch.coef_fore", "must be in [0, 1)"));
        }
        if self.consecutive == 0 {
            return Err(IdsError::invalid("sketch.consecutive", "must be at least 1"));
        }
        if !self.spread_floor.is_finite() || self.spread_floor < 0.0 {
            return Err(IdsError::invalid("sketch.spread_floor", "must be finite and >= 0"));
        }
        if self.max_freeze != 0 && self.max_freeze < self.consecutive {
            // a row would re-baseline before its streak could alarm
            return Err(IdsError::invalid(
                "sketch.max_freeze",
                format!("must be 0 or at least consecutive ({})", self.consecutive),
            ));
        }
        if self.quorum == 0 || self.quorum > self.nrows {
            return Err(IdsError::invalid(
                "sketch.quorum",
                format!("must be in 1..={}", self.nrows),
            ));
        }
        Ok(())
    }

    pub(crate) fn smoothing(&self) -> SmoothingParams {
        SmoothingParams {
            coef_bound: self.coef_bound,
            coef_fore: self.coef_fore,
            consecutive: self.consecutive,
            spread_floor: self.spread_floor,
            max_freeze: self.max_freeze,
            warmup: self.warmup,
        }
    }
}
