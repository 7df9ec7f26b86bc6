use chrono::Duration;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::alarm::{AlarmEvent, DetectorId, DetectorKind};
use crate::detector::Detector;
use crate::error::IdsResult;
use crate::record::FlowRecord;
use crate::window::{duration_from_secs, Window};

use super::counter::FlowCreationCounter;
use super::cusum::EwmaCusum;
use super::EwmaCusumConfig;

/// EWMA-CUSUM over the number of flows created per window.
pub struct FlowRateDetector {
    id: DetectorId,
    period: Duration,
    counter: FlowCreationCounter,
    cusum: EwmaCusum,
}

impl FlowRateDetector {
    pub fn new(config: EwmaCusumConfig) -> IdsResult<Self> {
        config.validate()?;
        let period = duration_from_secs("flow_rate.period_secs", config.period_secs)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            id: DetectorId::new(config.id.clone()),
            period,
            counter: FlowCreationCounter::new(config.max_tracked_keys),
            cusum: EwmaCusum::new(config.params(), rng),
        })
    }

    pub fn cusum(&self) -> &EwmaCusum {
        &self.cusum
    }
}

impl Detector for FlowRateDetector {
    fn id(&self) -> &DetectorId {
        &self.id
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::EwmaCusum
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn update(&mut self, record: &FlowRecord) {
        self.counter.observe(record);
    }

    fn evaluate(&mut self, window: &Window) -> AlarmEvent {
        let created = self.counter.created() as f64;
        let step = self.cusum.observe(created);
        debug!(
            detector = %self.id,
            window = window.index,
            created,
            forecast = step.forecast,
            cusum = step.cusum,
            "flow rate evaluated"
        );
        AlarmEvent::new(window, &self.id, step.cusum, step.alarm)
    }

    fn roll_baseline(&mut self, _window: &Window) {
        self.counter.roll();
    }
}
