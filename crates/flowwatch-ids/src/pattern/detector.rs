use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use chrono::Duration;
use tracing::debug;

use crate::alarm::{AlarmEvent, DetectorId, DetectorKind};
use crate::detector::Detector;
use crate::error::IdsResult;
use crate::record::FlowRecord;
use crate::store::BaselineStore;
use crate::window::{duration_from_secs, Window};

use super::library::{Match, PatternLibrary};
use super::vector::Pattern;
use super::PatternConfig;

/// A window's verdict for one host, committed at roll-over.
#[derive(Debug)]
struct Pending {
    host: IpAddr,
    pattern: Pattern,
    matched: Match,
}

/// Rarity of each host's destination fan-out against its own history.
pub struct PatternSimilarity {
    id: DetectorId,
    config: PatternConfig,
    period: Duration,
    current: HashMap<IpAddr, BTreeMap<IpAddr, u64>>,
    libraries: BaselineStore<IpAddr, PatternLibrary>,
    pending: Vec<Pending>,
}

impl PatternSimilarity {
    pub fn new(config: PatternConfig) -> IdsResult<Self> {
        config.validate()?;
        let period = duration_from_secs("pattern.period_secs", config.period_secs)?;
        Ok(Self {
            id: DetectorId::new(config.id.clone()),
            libraries: BaselineStore::new(config.store.clone()),
            config,
            period,
            current: HashMap::new(),
            pending: Vec::new(),
        })
    }

    pub fn library(&self, host: &IpAddr) -> Option<&PatternLibrary> {
        self.libraries.get(host)
    }
}

impl Detector for PatternSimilarity {
    fn id(&self) -> &DetectorId {
        &self.id
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::PatternSimilarity
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn update(&mut self, record: &FlowRecord) {
        *self
            .current
            .entry(record.src)
            .or_default()
            .entry(record.dst)
            .or_insert(0) += 1;
    }

    fn evaluate(&mut self, window: &Window) -> AlarmEvent {
        self.pending.clear();
        let mut hosts: Vec<&IpAddr> = self.current.keys().collect();
        hosts.sort();

        let mut lowest_tail = 1.0_f64;
        let mut suspects = Vec::new();
        for host in hosts {
            let pattern = Pattern::from_counts(&self.current[host]);
            let (matched, tail) = match self.libraries.get(host) {
                Some(lib) => {
                    let m = lib.classify(&pattern, self.config.tresh_match);
                    let tail = lib.tail_after(&m);
                    (m, tail)
                }
                None => (Match::New { similarity: None }, 1.0),
            };
            lowest_tail = lowest_tail.min(tail);
            if tail <= self.config.tresh_alert {
                debug!(
                    detector = %self.id,
                    window = window.index,
                    host = %host,
                    tail,
                    "rare communication pattern"
                );
                suspects.push(host.to_string());
            }
            self.pending.push(Pending {
                host: *host,
                pattern,
                matched,
            });
        }

        let alarm = !suspects.is_empty();
        AlarmEvent::new(window, &self.id, 1.0 - lowest_tail, alarm).with_suspects(suspects)
    }

    fn roll_baseline(&mut self, window: &Window) {
        let max_patterns = self.config.max_patterns;
        for p in self.pending.drain(..) {
            let (lib, is_new) =
                self.libraries
                    .entry_or_insert_with(p.host, window.index, PatternLibrary::new);
            if is_new {
                debug!(detector = %self.id, host = %p.host, "new host library");
            }
            lib.apply(p.pattern, p.matched, max_patterns);
        }
        self.current.clear();
        self.libraries.maintain(window.index);
    }
}
