//! flowwatch: streaming anomaly detectors for network flow events.
//!
//! Records are parsed from capture text, cut into fixed-duration windows
//! and fed to a set of detectors. At each window close every detector
//! scores the window, emits an [`AlarmEvent`], then folds the window into
//! its baseline.
//!
//! ```text
//!  DirectorySource ──► FlowRecord ──► IdsEngine
//!                                       │ one WindowScheduler per period
//!                    ┌──────────────────┼───────────────────┐
//!                    ▼                  ▼                   ▼
//!             SketchDivergence   FlowRateDetector   FlowTTest, PatternSimilarity,
//!             (sketch)           (rate)             EntropyProfile, Whitelist
//!                    └──────────────────┼───────────────────┘
//!                                       ▼
//!                          AlarmSink (VecSink, JsonLinesSink)
//! ```
//!
//! Keyed baselines live in a bounded [`BaselineStore`] so long runs keep
//! a fixed memory ceiling.
//!
//! # Quick Start
//!
//! ```no_run
//! use flowwatch_ids::{DirectorySource, IdsConfig, IdsEngine, JsonLinesSink};
//!
//! # fn main() -> flowwatch_ids::IdsResult<()> {
//! let config = IdsConfig::default();
//! let mut engine = IdsEngine::from_config(&config)?;
//! let mut sink = JsonLinesSink::new(std::io::stdout());
//! engine.run(DirectorySource::open("captures/")?, &mut sink)?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod alarm;
pub mod config;
pub mod detector;
pub mod engine;
pub mod entropy;
pub mod error;
pub mod flow;
pub mod pattern;
pub mod rate;
pub mod record;
pub mod sketch;
pub mod source;
pub mod store;
pub mod whitelist;
pub mod window;

// ── Re-exports ──────────────────────────────────────────────────────

pub use alarm::{AlarmEvent, AlarmSink, DetectorId, DetectorKind, JsonLinesSink, VecSink};
pub use config::IdsConfig;
pub use detector::Detector;
pub use engine::{run_concurrent, IdsEngine};
pub use error::{IdsError, IdsResult};
pub use record::{ConnectionKey, FlowKey, FlowRecord, ParseError, Protocol, RecordParser};
pub use source::{DirectorySource, SourceStats};
pub use store::{BaselineStore, StoreConfig};
pub use window::{OrderingPolicy, SchedulerStats, Window, WindowScheduler};

// ── Detectors ───────────────────────────────────────────────────────

pub use entropy::{EntropyConfig, EntropyProfile};
pub use flow::{FlowTTest, FlowTTestConfig};
pub use pattern::{PatternConfig, PatternSimilarity};
pub use rate::{EwmaCusumConfig, FlowRateDetector};
pub use sketch::{SketchConfig, SketchDivergence};
pub use whitelist::{Whitelist, WhitelistConfig};
