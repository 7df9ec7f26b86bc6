//! The detector lifecycle shared by every variant.

use chrono::Duration;

use crate::alarm::{AlarmEvent, DetectorId, DetectorKind};
use crate::record::FlowRecord;
use crate::window::Window;

/// A windowed anomaly detector.
///
/// The scheduler drives each instance through
/// `update(record)*` → `evaluate(window)` → `roll_baseline(window)`
/// once per closed window, including windows that saw no records.
/// Implementations own their baseline state exclusively.
pub trait Detector: Send {
    fn id(&self) -> &DetectorId;

    fn kind(&self) -> DetectorKind;

    /// Window duration this detector is configured for.
    fn period(&self) -> Duration;

    /// Fold one record into the current window's accumulators.
    fn update(&mut self, record: &FlowRecord);

    /// Score the closed window. Never fails: undefined statistics
    /// produce a quiet event.
    fn evaluate(&mut self, window: &Window) -> AlarmEvent;

    /// Merge the closed window into the baseline and reset per-window state.
    fn roll_baseline(&mut self, window: &Window);
}
