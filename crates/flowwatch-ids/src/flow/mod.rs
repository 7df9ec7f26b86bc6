//! Per-flow baseline t-test.
//!
//! Each `(src, sport, dst, dport)` flow accumulates packet-size and
//! inter-packet-time moments for the current window. Once a flow has
//! `number_seen` packets in the window it is compared with its
//! historical record:
//!
//! ```text
//!   t_x   = (avg_x − hist_avg_x) / sqrt(var_x / n)
//!   score = sqrt(t_byte² + t_ipt²)          alarm when score > threshold
//! ```
//!
//! At window close the window's moments are merged into the historical
//! record with count weights.

pub mod baseline;
pub mod detector;
pub mod welford;

use serde::{Deserialize, Serialize};

use crate::error::{IdsError, IdsResult};
use crate::store::StoreConfig;

// ── Re-exports ──────────────────────────────────────────────────────

pub use baseline::{combine, flow_score, t_statistic, HistoricalRecord, WindowStats};
pub use detector::FlowTTest;
pub use welford::Welford;

/// Default window length in seconds.
pub const DEFAULT_PERIOD_SECS: f64 = 30.0;

/// Default alarm threshold on the combined score.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Default number of packets a flow needs in a window before scoring.
pub const DEFAULT_NUMBER_SEEN: u64 = 40;

/// Flows named per alarm.
pub const MAX_SUSPECTS: usize = 10;

/// Flow t-test detector configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowTTestConfig {
    pub id: String,
    pub period_secs: f64,
    pub threshold: f64,
    pub number_seen: u64,
    pub store: StoreConfig,
}

impl Default for FlowTTestConfig {
    fn default() -> Self {
        Self {
            id: "flow-ttest".into(),
            period_secs: DEFAULT_PERIOD_SECS,
            threshold: DEFAULT_THRESHOLD,
            number_seen: DEFAULT_NUMBER_SEEN,
            store: StoreConfig::default(),
        }
    }
}

impl FlowTTestConfig {
    pub fn validate(&self) -> IdsResult<()> {
        crate::window::duration_from_secs("flow_ttest.period_secs", self.period_secs)?;
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(IdsError::invalid("flow_ttest.threshold", "must be finite and >= 0"));
        }
        if self.number_seen < 2 {
            return Err(IdsError::invalid(
                "flow_ttest.number_seen",
                "must be at least 2 for a variance",
            ));
        }
        self.store.validate("flow_ttest.store")
    }
}
