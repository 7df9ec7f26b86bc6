//! Packet-size entropy per destination host.
//!
//! Each window builds a histogram of packet sizes per destination and
//! scores it as `sqrt(mode + 1) · H`, where `mode` is the index of the
//! fullest bin and `H` the Shannon entropy in bits. Floods of identical
//! packets collapse the histogram onto one bin and drive the score
//! towards 0, so a host alarms when its score falls below the threshold.
//!
//! With `training_windows > 0` the first windows only observe, and the
//! lowest score seen during training becomes the threshold.

pub mod detector;
pub mod histogram;

use serde::{Deserialize, Serialize};

use crate::error::{IdsError, IdsResult};
use crate::store::StoreConfig;

// ── Re-exports ──────────────────────────────────────────────────────

pub use detector::{EntropyProfile, HostProfile};
pub use histogram::{bin_index, shannon_entropy, SizeHistogram, PACKET_SIZE_EDGES};

/// Default window length in seconds.
pub const DEFAULT_PERIOD_SECS: f64 = 5.0;

/// Default score below which a host alarms.
pub const DEFAULT_THRESH: f64 = 0.5;

/// Default minimum packets for a host to be scored in a window.
pub const DEFAULT_MIN_PACKETS: u64 = 1;

/// Entropy-profile detector configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntropyConfig {
    pub id: String,
    pub period_secs: f64,
    /// Bin lower edges, strictly increasing.
    pub edges: Vec<u32>,
    pub thresh: f64,
    /// Observe-only windows before alarming.
    pub training_windows: u64,
    /// Replace `thresh` with the lowest score seen during training.
    pub trained_threshold: bool,
    pub min_packets: u64,
    pub store: StoreConfig,
}

impl Default for EntropyConfig {
    fn default() -> Self {
        Self {
            id: "entropy".into(),
            period_secs: DEFAULT_PERIOD_SECS,
            edges: PACKET_SIZE_EDGES.to_vec(),
            thresh: DEFAULT_THRESH,
            training_windows: 0,
            trained_threshold: true,
            min_packets: DEFAULT_MIN_PACKETS,
            store: StoreConfig::default(),
        }
    }
}

impl EntropyConfig {
    pub fn validate(&self) -> IdsResult<()> {
        crate::window::duration_from_secs("entropy.period_secs", self.period_secs)?;
        if self.edges.is_empty() {
            return Err(IdsError::invalid("entropy.edges", "must not be empty"));
        }
        if self.edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(IdsError::invalid("entropy.edges", "must be strictly increasing"));
        }
        if !self.thresh.is_finite() || self.thresh < 0.0 {
            return Err(IdsError::invalid("entropy.thresh", "must be a non-negative number"));
        }
        if self.min_packets == 0 {
            return Err(IdsError::invalid("entropy.min_packets", "must be at least 1"));
        }
        self.store.validate("entropy.store")
    }
}
