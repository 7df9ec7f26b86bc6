//! Fixed-duration windowing of the record stream.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::alarm::AlarmSink;
use crate::detector::Detector;
use crate::error::{IdsError, IdsResult};
use crate::record::FlowRecord;

/// A half-open time interval `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub index: u64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration: Duration,
}

impl Window {
    /// The window opening at `start`. Fails when its end is not a
    /// representable timestamp.
    pub fn first(start: DateTime<Utc>, duration: Duration) -> IdsResult<Self> {
        let end = start
            .checked_add_signed(duration)
            .ok_or(IdsError::TimeOverflow { index: 0, start })?;
        Ok(Self {
            index: 0,
            start,
            end,
            duration,
        })
    }

    /// The contiguous successor.
    pub fn next(&self) -> IdsResult<Self> {
        let index = self.index + 1;
        let end = self
            .end
            .checked_add_signed(self.duration)
            .ok_or(IdsError::TimeOverflow {
                index,
                start: self.end,
            })?;
        Ok(Self {
            index,
            start: self.end,
            end,
            duration: self.duration,
        })
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// What to do with a record stamped before the current window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderingPolicy {
    /// Drop it and count it.
    #[default]
    Reject,
    /// Deliver it to the current window anyway.
    Accept,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub records: u64,
    pub rejected: u64,
    pub windows: u64,
}

/// Drives a set of same-period detectors over a time-ordered stream.
///
/// The first record fixes the start of window 0. A record at or past the
/// current window's end closes it (evaluate, then roll baseline, on every
/// detector) and advances window by window, closing empty ones too, until
/// the record fits.
pub struct WindowScheduler {
    period: Duration,
    ordering: OrderingPolicy,
    detectors: Vec<Box<dyn Detector>>,
    current: Option<Window>,
    stats: SchedulerStats,
}

impl WindowScheduler {
    pub fn new(period: Duration, ordering: OrderingPolicy) -> IdsResult<Self> {
        if period <= Duration::zero() {
            return Err(IdsError::invalid("period", "must be positive"));
        }
        Ok(Self {
            period,
            ordering,
            detectors: Vec::new(),
            current: None,
            stats: SchedulerStats::default(),
        })
    }

    pub fn add_detector(&mut self, detector: Box<dyn Detector>) -> IdsResult<()> {
        if detector.period() != self.period {
            return Err(IdsError::PeriodMismatch {
                detector: detector.id().to_string(),
                detector_secs: secs(detector.period()),
                scheduler_secs: secs(self.period),
            });
        }
        self.detectors.push(detector);
        Ok(())
    }

    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> IdsResult<Self> {
        self.add_detector(detector)?;
        Ok(self)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn current_window(&self) -> Option<&Window> {
        self.current.as_ref()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    /// Names of the detectors, for logging.
    pub fn label(&self) -> String {
        self.detectors
            .iter()
            .map(|d| d.id().as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn ingest<S: AlarmSink + ?Sized>(
        &mut self,
        record: &FlowRecord,
        sink: &mut S,
    ) -> IdsResult<()> {
        let mut window = match self.current {
            Some(w) => w,
            None => {
                let w = Window::first(record.timestamp, self.period)?;
                debug!(start = %w.start, period_secs = secs(self.period), "first window opened");
                w
            }
        };

        if record.timestamp < window.start {
            match self.ordering {
                OrderingPolicy::Reject => {
                    self.stats.rejected += 1;
                    warn!(
                        ts = %record.timestamp,
                        window = window.index,
                        "record older than current window rejected"
                    );
                    self.current = Some(window);
                    return Ok(());
                }
                OrderingPolicy::Accept => {}
            }
        }

        while record.timestamp >= window.end {
            self.close(&window, sink)?;
            window = window.next()?;
        }

        self.current = Some(window);
        self.stats.records += 1;
        for detector in &mut self.detectors {
            detector.update(record);
        }
        Ok(())
    }

    /// Close the trailing window. A no-op before the first record.
    pub fn finish<S: AlarmSink + ?Sized>(&mut self, sink: &mut S) -> IdsResult<()> {
        if let Some(window) = self.current.take() {
            self.close(&window, sink)?;
        }
        sink.flush()
    }

    fn close<S: AlarmSink + ?Sized>(&mut self, window: &Window, sink: &mut S) -> IdsResult<()> {
        for detector in &mut self.detectors {
            let event = detector.evaluate(window);
            detector.roll_baseline(window);
            sink.emit(event)?;
        }
        self.stats.windows += 1;
        debug!(window = window.index, start = %window.start, "window closed");
        Ok(())
    }
}

pub(crate) fn secs(d: Duration) -> f64 {
    d.num_microseconds()
        .map(|us| us as f64 / 1e6)
        .unwrap_or_else(|| d.num_seconds() as f64)
}

/// Longest accepted period, span or learning phase: 366 days.
pub const MAX_DURATION_SECS: f64 = 366.0 * 86_400.0;

/// Positive, finite seconds up to [`MAX_DURATION_SECS`] as a [`Duration`].
pub fn duration_from_secs(field: &str, value: f64) -> IdsResult<Duration> {
    if !value.is_finite() || value <= 0.0 {
        return Err(IdsError::invalid(field, format!("{} is not a positive duration", value)));
    }
    if value > MAX_DURATION_SECS {
        return Err(IdsError::invalid(
            field,
            format!("{} exceeds the {}s limit", value, MAX_DURATION_SECS),
        ));
    }
    let micros = (value * 1e6).round();
    if micros < 1.0 {
        return Err(IdsError::invalid(field, format!("{} out of range", value)));
    }
    Ok(Duration::microseconds(micros as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{AlarmEvent, DetectorId, DetectorKind, VecSink};
    use crate::record::Protocol;
    use std::net::IpAddr;

    /// Counts records per window and reports the count as score.
    struct Counter {
        id: DetectorId,
        period: Duration,
        seen: u64,
    }

    impl Counter {
        fn new(secs: i64) -> Self {
            Self {
                id: DetectorId::new("counter"),
                period: Duration::seconds(secs),
                seen: 0,
            }
        }
    }

    impl Detector for Counter {
        fn id(&self) -> &DetectorId {
            &self.id
        }
        fn kind(&self) -> DetectorKind {
            DetectorKind::Whitelist
        }
        fn period(&self) -> Duration {
            self.period
        }
        fn update(&mut self, _record: &FlowRecord) {
            self.seen += 1;
        }
        fn evaluate(&mut self, window: &Window) -> AlarmEvent {
            AlarmEvent::new(window, &self.id, self.seen as f64, self.seen > 2)
        }
        fn roll_baseline(&mut self, _window: &Window) {
            self.seen = 0;
        }
    }

    fn rec(ts_ms: i64) -> FlowRecord {
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        FlowRecord::new(
            DateTime::from_timestamp_millis(ts_ms).unwrap(),
            ip,
            ip,
            Protocol::Udp,
            10,
        )
    }

    fn scheduler(ordering: OrderingPolicy) -> WindowScheduler {
        WindowScheduler::new(Duration::seconds(1), ordering)
            .unwrap()
            .with_detector(Box::new(Counter::new(1)))
            .unwrap()
    }

    #[test]
    fn windows_are_contiguous() {
        let start = DateTime::from_timestamp(10, 0).unwrap();
        let w = Window::first(start, Duration::seconds(5)).unwrap();
        let n = w.next().unwrap();
        assert_eq!(n.index, 1);
        assert_eq!(n.start, w.end);
        assert_eq!(n.end - n.start, n.duration);
        assert!(w.contains(w.start));
        assert!(!w.contains(w.end));
    }

    #[test]
    fn closes_windows_on_boundary_crossing() {
        let mut s = scheduler(OrderingPolicy::Reject);
        let mut sink = VecSink::new();
        for ts in [0, 100, 200, 999, 1000, 1500] {
            s.ingest(&rec(ts), &mut sink).unwrap();
        }
        assert_eq!(sink.events().len(), 1);
        assert_eq!(sink.events()[0].score, 4.0);
        assert!(sink.events()[0].alarm);

        s.finish(&mut sink).unwrap();
        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.events()[1].window_index, 1);
        assert_eq!(sink.events()[1].score, 2.0);
    }

    #[test]
    fn empty_windows_are_still_evaluated() {
        let mut s = scheduler(OrderingPolicy::Reject);
        let mut sink = VecSink::new();
        s.ingest(&rec(0), &mut sink).unwrap();
        s.ingest(&rec(4_200), &mut sink).unwrap();
        let idx: Vec<u64> = sink.events().iter().map(|e| e.window_index).collect();
        assert_eq!(idx, vec![0, 1, 2, 3]);
        assert_eq!(sink.events()[2].score, 0.0);
        assert_eq!(s.current_window().unwrap().index, 4);
        assert_eq!(s.stats().windows, 4);
    }

    #[test]
    fn out_of_order_records_are_rejected_by_default() {
        let mut s = scheduler(OrderingPolicy::Reject);
        let mut sink = VecSink::new();
        s.ingest(&rec(0), &mut sink).unwrap();
        s.ingest(&rec(2_500), &mut sink).unwrap();
        s.ingest(&rec(500), &mut sink).unwrap();
        assert_eq!(s.stats().rejected, 1);
        assert_eq!(s.stats().records, 2);

        let mut s = scheduler(OrderingPolicy::Accept);
        s.ingest(&rec(0), &mut sink).unwrap();
        s.ingest(&rec(2_500), &mut sink).unwrap();
        s.ingest(&rec(500), &mut sink).unwrap();
        assert_eq!(s.stats().rejected, 0);
        assert_eq!(s.stats().records, 3);
    }

    #[test]
    fn finish_without_records_emits_nothing() {
        let mut s = scheduler(OrderingPolicy::Reject);
        let mut sink = VecSink::new();
        s.finish(&mut sink).unwrap();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn period_mismatch_is_rejected() {
        let mut s = WindowScheduler::new(Duration::seconds(1), OrderingPolicy::Reject).unwrap();
        let err = s.add_detector(Box::new(Counter::new(5))).unwrap_err();
        assert!(matches!(err, IdsError::PeriodMismatch { .. }));
        assert!(WindowScheduler::new(Duration::zero(), OrderingPolicy::Reject).is_err());
    }

    #[test]
    fn duration_from_secs_validates() {
        assert_eq!(
            duration_from_secs("period", 0.5).unwrap(),
            Duration::milliseconds(500)
        );
        assert!(duration_from_secs("period", 0.0).is_err());
        assert!(duration_from_secs("period", f64::NAN).is_err());
        assert!(duration_from_secs("period", -3.0).is_err());
        assert!(duration_from_secs("period", MAX_DURATION_SECS).is_ok());
        assert!(duration_from_secs("period", MAX_DURATION_SECS + 1.0).is_err());
        assert!(duration_from_secs("period", 9.0e12).is_err());
    }

    #[test]
    fn windows_past_the_last_timestamp_are_errors() {
        let late = DateTime::<Utc>::MAX_UTC - Duration::seconds(3);
        assert!(matches!(
            Window::first(late, Duration::seconds(5)),
            Err(IdsError::TimeOverflow { index: 0, .. })
        ));
        let w = Window::first(late, Duration::seconds(2)).unwrap();
        assert!(matches!(w.next(), Err(IdsError::TimeOverflow { index: 1, .. })));
    }

    #[test]
    fn ingest_reports_overflow_instead_of_panicking() {
        let mut s = scheduler(OrderingPolicy::Reject);
        let mut sink = VecSink::new();
        let mut last = rec(0);
        last.timestamp = DateTime::<Utc>::MAX_UTC;
        let err = s.ingest(&last, &mut sink).unwrap_err();
        assert!(matches!(err, IdsError::TimeOverflow { .. }));
        assert!(sink.events().is_empty());
    }
}
