//! Connection whitelist.
//!
//! For `learning_secs` after the first record every connection
//! `(protocol, src, sport, dst, dport)` is accepted and remembered.
//! Afterwards each window alarms on connections that were never seen
//! while learning; the score is how many there were.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::alarm::{AlarmEvent, DetectorId, DetectorKind};
use crate::detector::Detector;
use crate::error::IdsResult;
use crate::record::{ConnectionKey, FlowRecord};
use crate::store::{BaselineStore, StoreConfig};
use crate::window::{duration_from_secs, Window};

/// Default window length in seconds.
pub const DEFAULT_PERIOD_SECS: f64 = 5.0;

/// Default learning phase in seconds.
pub const DEFAULT_LEARNING_SECS: f64 = 300.0;

/// Connections named per alarm.
pub const MAX_SUSPECTS: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhitelistConfig {
    pub id: String,
    pub period_secs: f64,
    pub learning_secs: f64,
    pub store: StoreConfig,
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        Self {
            id: "whitelist".into(),
            period_secs: DEFAULT_PERIOD_SECS,
            learning_secs: DEFAULT_LEARNING_SECS,
            store: StoreConfig::default(),
        }
    }
}

impl WhitelistConfig {
    pub fn validate(&self) -> IdsResult<()> {
        duration_from_secs("whitelist.period_secs", self.period_secs)?;
        self.learning()?;
        self.store.validate("whitelist.store")
    }

    /// The learning phase; zero disables it.
    fn learning(&self) -> IdsResult<Duration> {
        if self.learning_secs == 0.0 {
            return Ok(Duration::zero());
        }
        duration_from_secs("whitelist.learning_secs", self.learning_secs)
    }
}

/// Alarms on connections outside the learned set.
pub struct Whitelist {
    id: DetectorId,
    period: Duration,
    learning: Duration,
    learn_until: Option<DateTime<Utc>>,
    /// Learned connections and how often each was seen.
    known: BaselineStore<ConnectionKey, u64>,
    unknown: BTreeSet<ConnectionKey>,
    window: u64,
}

impl Whitelist {
    pub fn new(config: WhitelistConfig) -> IdsResult<Self> {
        config.validate()?;
        let period = duration_from_secs("whitelist.period_secs", config.period_secs)?;
        let learning = config.learning()?;
        Ok(Self {
            id: DetectorId::new(config.id),
            period,
            learning,
            learn_until: None,
            known: BaselineStore::new(config.store),
            unknown: BTreeSet::new(),
            window: 0,
        })
    }

    pub fn is_known(&self, key: &ConnectionKey) -> bool {
        self.known.contains(key)
    }

    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    /// End of the learning phase, once the first record has been seen.
    pub fn learn_until(&self) -> Option<DateTime<Utc>> {
        self.learn_until
    }
}

impl Detector for Whitelist {
    fn id(&self) -> &DetectorId {
        &self.id
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Whitelist
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn update(&mut self, record: &FlowRecord) {
        let learning = self.learning;
        let until = *self.learn_until.get_or_insert_with(|| {
            record
                .timestamp
                .checked_add_signed(learning)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
        let key = record.connection_key();
        if record.timestamp < until {
            let (hits, is_new) = self.known.entry_or_insert_with(key, self.window, || 0);
            *hits += 1;
            if is_new {
                debug!(detector = %self.id, connection = %key, "connection learned");
            }
        } else if let Some(hits) = self.known.get_mut(&key) {
            *hits += 1;
        } else {
            self.unknown.insert(key);
        }
    }

    fn evaluate(&mut self, window: &Window) -> AlarmEvent {
        let count = self.unknown.len();
        let alarm = count > 0;
        if alarm {
            info!(
                detector = %self.id,
                window = window.index,
                unknown = count,
                "connections outside the whitelist"
            );
        }
        let suspects = self
            .unknown
            .iter()
            .take(MAX_SUSPECTS)
            .map(|k| k.to_string())
            .collect();
        AlarmEvent::new(window, &self.id, count as f64, alarm).with_suspects(suspects)
    }

    fn roll_baseline(&mut self, window: &Window) {
        self.unknown.clear();
        self.known.maintain(window.index);
        self.window = window.index + 1;
    }
}
