//! Wiring of detectors into schedulers, sequential and concurrent runs.
//!
//! Detectors sharing a period share one [`WindowScheduler`]. The
//! sequential engine feeds every scheduler from the calling thread.
//! [`run_concurrent`] instead gives each scheduler its own tokio task fed
//! through a bounded channel, so a slow detector group applies
//! backpressure to the reader without stalling the others.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::alarm::{AlarmEvent, AlarmSink, VecSink};
use crate::config::IdsConfig;
use crate::detector::Detector;
use crate::error::{IdsError, IdsResult};
use crate::record::FlowRecord;
use crate::window::{secs, OrderingPolicy, SchedulerStats, WindowScheduler};

/// Sequential driver over one scheduler per distinct period.
pub struct IdsEngine {
    schedulers: Vec<WindowScheduler>,
}

impl IdsEngine {
    pub fn new(detectors: Vec<Box<dyn Detector>>, ordering: OrderingPolicy) -> IdsResult<Self> {
        let mut schedulers: Vec<WindowScheduler> = Vec::new();
        for detector in detectors {
            let period = detector.period();
            match schedulers.iter_mut().find(|s| s.period() == period) {
                Some(s) => s.add_detector(detector)?,
                None => {
                    let mut s = WindowScheduler::new(period, ordering)?;
                    s.add_detector(detector)?;
                    schedulers.push(s);
                }
            }
        }
        if schedulers.is_empty() {
            warn!("engine built without detectors");
        }
        for s in &schedulers {
            debug!(period_secs = secs(s.period()), detectors = %s.label(), "scheduler ready");
        }
        Ok(Self { schedulers })
    }

    pub fn from_config(config: &IdsConfig) -> IdsResult<Self> {
        config.validate()?;
        Self::new(config.build_detectors()?, config.ordering)
    }

    pub fn schedulers(&self) -> &[WindowScheduler] {
        &self.schedulers
    }

    pub fn into_schedulers(self) -> Vec<WindowScheduler> {
        self.schedulers
    }

    pub fn stats(&self) -> Vec<SchedulerStats> {
        self.schedulers.iter().map(|s| s.stats()).collect()
    }

    pub fn ingest<S: AlarmSink + ?Sized>(&mut self, record: &FlowRecord, sink: &mut S) -> IdsResult<()> {
        for s in &mut self.schedulers {
            s.ingest(record, sink)?;
        }
        Ok(())
    }

    /// Close every trailing window and flush the sink.
    pub fn finish<S: AlarmSink + ?Sized>(&mut self, sink: &mut S) -> IdsResult<()> {
        for s in &mut self.schedulers {
            s.finish(sink)?;
        }
        Ok(())
    }

    /// Consume `records` to the end, then [`finish`](Self::finish).
    /// Stops at the first source error.
    pub fn run<I, S>(&mut self, records: I, sink: &mut S) -> IdsResult<()>
    where
        I: IntoIterator<Item = IdsResult<FlowRecord>>,
        S: AlarmSink + ?Sized,
    {
        for record in records {
            self.ingest(&record?, sink)?;
        }
        self.finish(sink)
    }
}

/// Run each scheduler on its own task. Records are shared between tasks
/// through `Arc` and each channel holds at most `capacity` of them.
///
/// `records` is drained on tokio's blocking pool, so a source doing file
/// I/O never stalls the runtime. The drained iterator is handed back with
/// the events, which come ordered by window start, then detector id.
pub async fn run_concurrent<I>(
    schedulers: Vec<WindowScheduler>,
    records: I,
    capacity: usize,
) -> IdsResult<(Vec<AlarmEvent>, I::IntoIter)>
where
    I: IntoIterator<Item = IdsResult<FlowRecord>>,
    I::IntoIter: Send + 'static,
{
    let capacity = capacity.max(1);
    let mut senders = Vec::with_capacity(schedulers.len());
    let mut tasks = Vec::with_capacity(schedulers.len());

    for mut scheduler in schedulers {
        let (tx, mut rx) = mpsc::channel::<Arc<FlowRecord>>(capacity);
        let label = scheduler.label();
        senders.push((label.clone(), tx));
        tasks.push(tokio::spawn(async move {
            let mut sink = VecSink::new();
            while let Some(record) = rx.recv().await {
                scheduler.ingest(&record, &mut sink)?;
            }
            scheduler.finish(&mut sink)?;
            let stats = scheduler.stats();
            debug!(
                detectors = %label,
                records = stats.records,
                windows = stats.windows,
                "scheduler task finished"
            );
            Ok::<_, IdsError>(sink.into_events())
        }));
    }

    let mut records = records.into_iter();
    let feeder = tokio::task::spawn_blocking(move || {
        let mut feed_error = None;
        for record in records.by_ref() {
            let record = match record {
                Ok(r) => Arc::new(r),
                Err(e) => {
                    feed_error = Some(e);
                    break;
                }
            };
            let closed = senders
                .iter()
                .find(|(_, tx)| tx.blocking_send(Arc::clone(&record)).is_err())
                .map(|(label, _)| label.clone());
            if let Some(label) = closed {
                feed_error = Some(IdsError::ChannelClosed(label));
                break;
            }
        }
        // dropping the senders ends the scheduler tasks
        drop(senders);
        (records, feed_error)
    });
    let (records, feed_error) = feeder.await?;

    // A task that failed closes its channel; report its own error first.
    let mut events = Vec::new();
    for task in tasks {
        events.extend(task.await??);
    }
    if let Some(e) = feed_error {
        return Err(e);
    }

    events.sort_by(|a, b| {
        a.window_start
            .cmp(&b.window_start)
            .then_with(|| a.detector_id.cmp(&b.detector_id))
    });
    info!(
        events = events.len(),
        alarms = events.iter().filter(|e| e.alarm).count(),
        "concurrent run complete"
    );
    Ok((events, records))
}
