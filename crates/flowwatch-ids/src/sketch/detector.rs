use std::collections::HashMap;
use std::net::IpAddr;

use chrono::Duration;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::alarm::{AlarmEvent, DetectorId, DetectorKind};
use crate::detector::Detector;
use crate::error::IdsResult;
use crate::record::FlowRecord;
use crate::window::{duration_from_secs, Window};

use super::hash::{sketch_key, HashRow};
use super::row::SketchRow;
use super::{SketchConfig, SketchInput, SketchKey, MAX_SUSPECTS};

/// Hashed per-key counters with adaptive forecasts and a row-quorum alarm.
pub struct SketchDivergence {
    id: DetectorId,
    config: SketchConfig,
    period: Duration,
    rows: Vec<SketchRow>,
    /// Keys seen this window, for naming suspects.
    window_keys: HashMap<u64, IpAddr>,
}

impl SketchDivergence {
    pub fn new(config: SketchConfig) -> IdsResult<Self> {
        config.validate()?;
        let period = duration_from_secs("sketch.period_secs", config.period_secs)?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let params = config.smoothing();
        let rows = (0..config.nrows)
            .map(|_| SketchRow::new(HashRow::random(&mut rng, config.ncols), config.history, params))
            .collect();
        Ok(Self {
            id: DetectorId::new(config.id.clone()),
            config,
            period,
            rows,
            window_keys: HashMap::new(),
        })
    }

    pub fn rows(&self) -> &[SketchRow] {
        &self.rows
    }

    /// Count-min estimate for an address in the current window.
    pub fn estimate(&self, ip: IpAddr) -> f64 {
        let key = sketch_key(ip);
        self.rows
            .iter()
            .map(|r| r.estimate(key))
            .fold(f64::INFINITY, f64::min)
    }

    fn contribution(&self, record: &FlowRecord) -> Option<f64> {
        match self.config.input {
            SketchInput::SynPackets => record.is_syn().then_some(1.0),
            SketchInput::Packets => Some(1.0),
            SketchInput::Bytes => Some(record.size as f64),
        }
    }

    fn suspects(&self, alarming: &[usize]) -> Vec<String> {
        let mut ranked: Vec<(f64, IpAddr)> = self
            .window_keys
            .iter()
            .filter_map(|(&key, &ip)| {
                let excess = alarming
                    .iter()
                    .filter_map(|&r| self.rows[r].excess(key))
                    .fold(f64::INFINITY, f64::min);
                (excess.is_finite() && excess > 0.0).then_some((excess, ip))
            })
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        ranked
            .into_iter()
            .take(MAX_SUSPECTS)
            .map(|(_, ip)| ip.to_string())
            .collect()
    }
}

impl Detector for SketchDivergence {
    fn id(&self) -> &DetectorId {
        &self.id
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::SketchDivergence
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn update(&mut self, record: &FlowRecord) {
        let Some(value) = self.contribution(record) else {
            return;
        };
        let ip = match self.config.key {
            SketchKey::Destination => record.dst,
            SketchKey::Source => record.src,
        };
        let key = sketch_key(ip);
        for row in &mut self.rows {
            row.update(key, value);
        }
        if self.window_keys.len() < self.config.max_tracked_keys {
            self.window_keys.entry(key).or_insert(ip);
        }
    }

    fn evaluate(&mut self, window: &Window) -> AlarmEvent {
        let mut score = 0.0_f64;
        let mut alarming = Vec::new();
        for (i, row) in self.rows.iter_mut().enumerate() {
            if let Some(verdict) = row.evaluate() {
                score = score.max(verdict.divergence);
                if verdict.alarm {
                    alarming.push(i);
                }
            }
        }

        let alarm = alarming.len() >= self.config.quorum;
        debug!(
            detector = %self.id,
            window = window.index,
            score,
            alarming_rows = alarming.len(),
            "sketch evaluated"
        );
        let event = AlarmEvent::new(window, &self.id, score, alarm);
        if alarm {
            let suspects = self.suspects(&alarming);
            event.with_suspects(suspects)
        } else {
            event
        }
    }

    fn roll_baseline(&mut self, _window: &Window) {
        for row in &mut self.rows {
            row.roll();
        }
        self.window_keys.clear();
    }
}
