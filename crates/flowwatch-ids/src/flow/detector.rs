use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::alarm::{AlarmEvent, DetectorId, DetectorKind};
use crate::detector::Detector;
use crate::error::IdsResult;
use crate::record::{FlowKey, FlowRecord};
use crate::store::BaselineStore;
use crate::window::{duration_from_secs, secs, Window};

use super::baseline::{flow_score, HistoricalRecord, WindowStats};
use super::{FlowTTestConfig, MAX_SUSPECTS};

/// Everything kept about one flow.
#[derive(Clone, Debug, Default)]
pub struct FlowState {
    /// Last packet time; persists across windows for the IPT series.
    pub last_packet: Option<DateTime<Utc>>,
    pub current: WindowStats,
    pub history: HistoricalRecord,
}

impl FlowState {
    fn record(&mut self, ts: DateTime<Utc>, size: u32) {
        let ipt = self
            .last_packet
            .map(|prev| secs(ts - prev).max(0.0))
            .unwrap_or(0.0);
        self.last_packet = Some(ts);
        self.current.push(size, ipt);
    }
}

/// Welch-style comparison of each flow's window with its history.
pub struct FlowTTest {
    id: DetectorId,
    config: FlowTTestConfig,
    period: Duration,
    flows: BaselineStore<FlowKey, FlowState>,
    /// Flows with packets in the current window.
    active: Vec<FlowKey>,
    window: u64,
}

impl FlowTTest {
    pub fn new(config: FlowTTestConfig) -> IdsResult<Self> {
        config.validate()?;
        let period = duration_from_secs("flow_ttest.period_secs", config.period_secs)?;
        Ok(Self {
            id: DetectorId::new(config.id.clone()),
            flows: BaselineStore::new(config.store.clone()),
            config,
            period,
            active: Vec::new(),
            window: 0,
        })
    }

    pub fn flow(&self, key: &FlowKey) -> Option<&FlowState> {
        self.flows.get(key)
    }

    pub fn tracked_flows(&self) -> usize {
        self.flows.len()
    }
}

impl Detector for FlowTTest {
    fn id(&self) -> &DetectorId {
        &self.id
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::FlowTTest
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn update(&mut self, record: &FlowRecord) {
        let key = record.flow_key();
        let (state, is_new) = self
            .flows
            .entry_or_insert_with(key, self.window, FlowState::default);
        if is_new {
            debug!(detector = %self.id, flow = %key, "new flow");
        }
        if state.current.packets() == 0 {
            self.active.push(key);
        }
        state.record(record.timestamp, record.size);
    }

    fn evaluate(&mut self, window: &Window) -> AlarmEvent {
        let mut score = 0.0_f64;
        let mut flagged: Vec<(f64, FlowKey)> = Vec::new();
        for key in &self.active {
            let Some(state) = self.flows.get(key) else {
                continue;
            };
            if state.current.packets() < self.config.number_seen || state.history.is_empty() {
                continue;
            }
            let Some(s) = flow_score(&state.current, &state.history) else {
                continue;
            };
            score = score.max(s);
            if s > self.config.threshold {
                flagged.push((s, *key));
            }
        }

        let alarm = !flagged.is_empty();
        if alarm {
            debug!(detector = %self.id, window = window.index, flows = flagged.len(), "flows deviate from baseline");
        }
        flagged.sort_by(|a, b| b.0.total_cmp(&a.0));
        let suspects = flagged
            .into_iter()
            .take(MAX_SUSPECTS)
            .map(|(_, k)| k.to_string())
            .collect();
        AlarmEvent::new(window, &self.id, score, alarm).with_suspects(suspects)
    }

    fn roll_baseline(&mut self, window: &Window) {
        for key in self.active.drain(..) {
            if let Some(state) = self.flows.get_mut(&key) {
                state.history.merge(&state.current, window.end);
                state.current = WindowStats::default();
            }
        }
        self.flows.maintain(window.index);
        self.window = window.index + 1;
    }
}
