//! Flow-creation-rate analysis with an EWMA forecast and a one-sided CUSUM.
//!
//! ```text
//!   records ─► FlowCreationCounter ─► x_t (new flows per window)
//!                                      │
//!                                      ▼
//!   forecast x̂_t ─► upper = x̂_t + max(cthresh·σ, bigM)
//!   S_t = clamp(S_{t−1} + x_t − upper, 0, thresh_sum_upper)
//!   alarm when S_t > csum·σ
//! ```
//!
//! While alarming, the forecast is fed values resampled from the last
//! pre-attack observations so the attack does not become the baseline.

pub mod counter;
pub mod cusum;
pub mod detector;

use serde::{Deserialize, Serialize};

use crate::error::{IdsError, IdsResult};
use crate::store::DEFAULT_MAX_TRACKED_KEYS;

// ── Re-exports ──────────────────────────────────────────────────────

pub use counter::{CreationKey, FlowCreationCounter};
pub use cusum::{CusumParams, CusumStep, EwmaCusum};
pub use detector::FlowRateDetector;

/// Default window length in seconds.
pub const DEFAULT_PERIOD_SECS: f64 = 30.0;

/// Default time span covered by the error history, in seconds.
pub const DEFAULT_SPAN_SECS: f64 = 600.0;

/// Default EWMA weight of the newest observation.
pub const DEFAULT_ALPHA: f64 = 0.3;

/// Default control-limit width in standard deviations.
pub const DEFAULT_CTHRESH: f64 = 3.0;

/// Default floor of the control-limit width.
pub const DEFAULT_BIG_M: f64 = 1.0;

/// Default CUSUM alarm threshold in standard deviations.
pub const DEFAULT_CSUM: f64 = 3.0;

/// Default cap of the cumulative sum.
pub const DEFAULT_THRESH_SUM_UPPER: f64 = 100.0;

/// Default number of recorded errors before alarms are allowed.
pub const DEFAULT_MIN_HISTORY: usize = 5;

/// Default number of normal observations kept for resampling.
pub const DEFAULT_PRE_ATTACK: usize = 10;

/// EWMA-CUSUM detector configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EwmaCusumConfig {
    pub id: String,
    pub period_secs: f64,
    pub span_secs: f64,
    pub alpha: f64,
    pub cthresh: f64,
    pub big_m: f64,
    pub csum: f64,
    pub thresh_sum_upper: f64,
    pub min_history: usize,
    pub pre_attack: usize,
    /// Seed for pre-attack resampling.
    pub seed: Option<u64>,
    /// Flows remembered between windows.
    pub max_tracked_keys: usize,
}

impl Default for EwmaCusumConfig {
    fn default() -> Self {
        Self {
            id: "flow-rate".into(),
            period_secs: DEFAULT_PERIOD_SECS,
            span_secs: DEFAULT_SPAN_SECS,
            alpha: DEFAULT_ALPHA,
            cthresh: DEFAULT_CTHRESH,
            big_m: DEFAULT_BIG_M,
            csum: DEFAULT_CSUM,
            thresh_sum_upper: DEFAULT_THRESH_SUM_UPPER,
            min_history: DEFAULT_MIN_HISTORY,
            pre_attack: DEFAULT_PRE_ATTACK,
            seed: None,
            max_tracked_keys: DEFAULT_MAX_TRACKED_KEYS,
        }
    }
}

impl EwmaCusumConfig {
    pub fn validate(&self) -> IdsResult<()> {
        crate::window::duration_from_secs("flow_rate.period_secs", self.period_secs)?;
        crate::window::duration_from_secs("flow_rate.span_secs", self.span_secs)?;
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(IdsError::invalid("flow_rate.alpha", "must be in (0, 1]"));
        }
        for (field, v) in [
            ("flow_rate.cthresh", self.cthresh),
            ("flow_rate.big_m", self.big_m),
            ("flow_rate.csum", self.csum),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(IdsError::invalid(field, "must be finite and >= 0"));
            }
        }
        if !self.thresh_sum_upper.is_finite() || self.thresh_sum_upper <= 0.0 {
            return Err(IdsError::invalid("flow_rate.thresh_sum_upper", "must be positive"));
        }
        if self.min_history == 0 {
            return Err(IdsError::invalid("flow_rate.min_history", "must be at least 1"));
        }
        if self.pre_attack == 0 {
            return Err(IdsError::invalid("flow_rate.pre_attack", "must be at least 1"));
        }
        if self.max_tracked_keys == 0 {
            return Err(IdsError::invalid("flow_rate.max_tracked_keys", "must be at least 1"));
        }
        Ok(())
    }

    /// Error history bound `N = ceil(span / period)`.
    pub fn history_len(&self) -> usize {
        ((self.span_secs / self.period_secs).ceil() as usize).max(1)
    }

    pub(crate) fn params(&self) -> CusumParams {
        CusumParams {
            alpha: self.alpha,
            cthresh: self.cthresh,
            big_m: self.big_m,
            csum: self.csum,
            thresh_sum_upper: self.thresh_sum_upper,
            history: self.history_len(),
            min_history: self.min_history,
            pre_attack: self.pre_attack,
        }
    }
}
