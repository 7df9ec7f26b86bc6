//! Alarm events and the sinks that receive them.

use std::fmt;
use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::IdsResult;
use crate::window::Window;

/// Identifier of a configured detector instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DetectorId(pub String);

impl DetectorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DetectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Detector family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorKind {
    SketchDivergence,
    EwmaCusum,
    FlowTTest,
    PatternSimilarity,
    EntropyProfile,
    Whitelist,
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorKind::SketchDivergence => write!(f, "sketch-divergence"),
            DetectorKind::EwmaCusum => write!(f, "ewma-cusum"),
            DetectorKind::FlowTTest => write!(f, "flow-ttest"),
            DetectorKind::PatternSimilarity => write!(f, "pattern-similarity"),
            DetectorKind::EntropyProfile => write!(f, "entropy-profile"),
            DetectorKind::Whitelist => write!(f, "whitelist"),
        }
    }
}

/// Verdict of one detector for one closed window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub window_index: u64,
    pub window_start: DateTime<Utc>,
    pub detector_id: DetectorId,
    pub score: f64,
    pub alarm: bool,
    /// Hosts, keys or flows that drove the alarm. Empty when quiet.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suspects: Vec<String>,
}

impl AlarmEvent {
    /// Build an event. A non-finite score is reported as 0 without alarm.
    pub fn new(window: &Window, detector_id: &DetectorId, score: f64, alarm: bool) -> Self {
        let (score, alarm) = if score.is_finite() {
            (score, alarm)
        } else {
            (0.0, false)
        };
        Self {
            window_index: window.index,
            window_start: window.start,
            detector_id: detector_id.clone(),
            score,
            alarm,
            suspects: Vec::new(),
        }
    }

    /// Score 0, no alarm.
    pub fn quiet(window: &Window, detector_id: &DetectorId) -> Self {
        Self::new(window, detector_id, 0.0, false)
    }

    pub fn with_suspects(mut self, suspects: Vec<String>) -> Self {
        if self.alarm {
            self.suspects = suspects;
        }
        self
    }
}

/// Receiver of alarm events, in emission order.
pub trait AlarmSink {
    fn emit(&mut self, event: AlarmEvent) -> IdsResult<()>;

    fn flush(&mut self) -> IdsResult<()> {
        Ok(())
    }
}

impl<S: AlarmSink + ?Sized> AlarmSink for &mut S {
    fn emit(&mut self, event: AlarmEvent) -> IdsResult<()> {
        (**self).emit(event)
    }

    fn flush(&mut self) -> IdsResult<()> {
        (**self).flush()
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    events: Vec<AlarmEvent>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[AlarmEvent] {
        &self.events
    }

    pub fn alarms(&self) -> impl Iterator<Item = &AlarmEvent> {
        self.events.iter().filter(|e| e.alarm)
    }

    pub fn into_events(self) -> Vec<AlarmEvent> {
        self.events
    }
}

impl AlarmSink for VecSink {
    fn emit(&mut self, event: AlarmEvent) -> IdsResult<()> {
        self.events.push(event);
        Ok(())
    }
}

/// Writes each event as one JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: u64,
    alarms: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: 0,
            alarms: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn alarms(&self) -> u64 {
        self.alarms
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> AlarmSink for JsonLinesSink<W> {
    fn emit(&mut self, event: AlarmEvent) -> IdsResult<()> {
        if event.alarm {
            self.alarms += 1;
            info!(
                detector = %event.detector_id,
                window = event.window_index,
                score = event.score,
                suspects = event.suspects.len(),
                "alarm raised"
            );
        }
        serde_json::to_writer(&mut self.writer, &event)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> IdsResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn window() -> Window {
        Window::first(DateTime::from_timestamp(1_000, 0).unwrap(), Duration::seconds(1)).unwrap()
    }

    #[test]
    fn detector_kind_display() {
        assert_eq!(DetectorKind::SketchDivergence.to_string(), "sketch-divergence");
        assert_eq!(DetectorKind::FlowTTest.to_string(), "flow-ttest");
        assert_eq!(DetectorKind::EntropyProfile.to_string(), "entropy-profile");
    }

    #[test]
    fn non_finite_score_is_suppressed() {
        let id = DetectorId::new("flow-ttest");
        let ev = AlarmEvent::new(&window(), &id, f64::NAN, true);
        assert_eq!(ev.score, 0.0);
        assert!(!ev.alarm);
    }

    #[test]
    fn suspects_only_kept_on_alarm() {
        let id = DetectorId::new("pattern");
        let quiet = AlarmEvent::new(&window(), &id, 0.1, false).with_suspects(vec!["a".into()]);
        assert!(quiet.suspects.is_empty());
        let loud = AlarmEvent::new(&window(), &id, 0.9, true).with_suspects(vec!["a".into()]);
        assert_eq!(loud.suspects, vec!["a".to_string()]);
    }

    #[test]
    fn json_lines_sink_writes_one_object_per_line() {
        let id = DetectorId::new("sketch");
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.emit(AlarmEvent::quiet(&window(), &id)).unwrap();
        sink.emit(AlarmEvent::new(&window().next().unwrap(), &id, 2.5, true)).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.written(), 2);
        assert_eq!(sink.alarms(), 1);

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: AlarmEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.window_index, 1);
        assert!(second.alarm);
        assert_eq!(second.detector_id, id);
    }

    #[test]
    fn vec_sink_filters_alarms() {
        let id = DetectorId::new("cusum");
        let mut sink = VecSink::new();
        sink.emit(AlarmEvent::quiet(&window(), &id)).unwrap();
        sink.emit(AlarmEvent::new(&window(), &id, 1.0, true)).unwrap();
        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.alarms().count(), 1);
    }
}
