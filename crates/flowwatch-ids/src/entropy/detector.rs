use std::collections::HashMap;
use std::net::IpAddr;

use chrono::Duration;
use tracing::{debug, info};

use crate::alarm::{AlarmEvent, DetectorId, DetectorKind};
use crate::detector::Detector;
use crate::error::IdsResult;
use crate::record::FlowRecord;
use crate::store::BaselineStore;
use crate::window::{duration_from_secs, Window};

use super::histogram::{bin_index, SizeHistogram};
use super::EntropyConfig;

/// What is remembered about one destination host.
#[derive(Clone, Debug, PartialEq)]
pub struct HostProfile {
    /// Lowest score the host has produced.
    pub min_score: f64,
    /// Windows in which the host was scored.
    pub windows: u64,
}

impl Default for HostProfile {
    fn default() -> Self {
        Self {
            min_score: f64::INFINITY,
            windows: 0,
        }
    }
}

/// Packet-size entropy of each destination host.
pub struct EntropyProfile {
    id: DetectorId,
    config: EntropyConfig,
    period: Duration,
    current: HashMap<IpAddr, SizeHistogram>,
    profiles: BaselineStore<IpAddr, HostProfile>,
    /// Scores computed by the last `evaluate`, folded in at roll-over.
    scored: Vec<(IpAddr, f64)>,
    threshold: f64,
    trained: u64,
    training_min: f64,
}

impl EntropyProfile {
    pub fn new(config: EntropyConfig) -> IdsResult<Self> {
        config.validate()?;
        let period = duration_from_secs("entropy.period_secs", config.period_secs)?;
        Ok(Self {
            id: DetectorId::new(config.id.clone()),
            profiles: BaselineStore::new(config.store.clone()),
            threshold: config.thresh,
            config,
            period,
            current: HashMap::new(),
            scored: Vec::new(),
            trained: 0,
            training_min: f64::INFINITY,
        })
    }

    /// Threshold in force; the trained minimum once training is over.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_training(&self) -> bool {
        self.trained < self.config.training_windows
    }

    pub fn profile(&self, host: &IpAddr) -> Option<&HostProfile> {
        self.profiles.get(host)
    }

    /// Lowest score `host` has produced so far.
    pub fn host_min_score(&self, host: &IpAddr) -> Option<f64> {
        self.profiles
            .get(host)
            .map(|p| p.min_score)
            .filter(|m| m.is_finite())
    }
}

impl Detector for EntropyProfile {
    fn id(&self) -> &DetectorId {
        &self.id
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::EntropyProfile
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn update(&mut self, record: &FlowRecord) {
        let bin = bin_index(&self.config.edges, record.size);
        let bins = self.config.edges.len();
        self.current
            .entry(record.dst)
            .or_insert_with(|| SizeHistogram::new(bins))
            .add(bin);
    }

    fn evaluate(&mut self, window: &Window) -> AlarmEvent {
        self.scored.clear();
        let mut hosts: Vec<(&IpAddr, &SizeHistogram)> = self
            .current
            .iter()
            .filter(|(_, h)| h.total() >= self.config.min_packets)
            .collect();
        hosts.sort_by_key(|(ip, _)| **ip);

        let training = self.is_training();
        let mut lowest: Option<f64> = None;
        let mut suspects = Vec::new();
        for (host, hist) in hosts {
            let score = hist.score();
            self.scored.push((*host, score));
            lowest = Some(lowest.map_or(score, |l| l.min(score)));
            if !training && score < self.threshold {
                debug!(
                    detector = %self.id,
                    window = window.index,
                    host = %host,
                    score,
                    host_min = ?self.host_min_score(host),
                    threshold = self.threshold,
                    "low packet-size entropy"
                );
                suspects.push(host.to_string());
            }
        }

        let Some(lowest) = lowest else {
            return AlarmEvent::quiet(window, &self.id);
        };
        AlarmEvent::new(window, &self.id, lowest, !suspects.is_empty()).with_suspects(suspects)
    }

    fn roll_baseline(&mut self, window: &Window) {
        let was_training = self.is_training();
        let any_scored = !self.scored.is_empty();
        for (host, score) in self.scored.drain(..) {
            let (profile, _) =
                self.profiles
                    .entry_or_insert_with(host, window.index, HostProfile::default);
            profile.min_score = profile.min_score.min(score);
            profile.windows += 1;
            if was_training {
                self.training_min = self.training_min.min(score);
            }
        }

        // windows without a scored host do not count towards training
        if was_training && any_scored {
            self.trained += 1;
            if !self.is_training() && self.config.trained_threshold && self.training_min.is_finite() {
                self.threshold = self.training_min;
                info!(
                    detector = %self.id,
                    threshold = self.threshold,
                    windows = self.trained,
                    "entropy threshold trained"
                );
            }
        }

        self.current.clear();
        self.profiles.maintain(window.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Protocol;
    use chrono::DateTime;

    fn send(d: &mut EntropyProfile, dst: u8, size: u32, n: usize) {
        for _ in 0..n {
            d.update(&FlowRecord::new(
                DateTime::from_timestamp(0, 0).unwrap(),
                IpAddr::from([10, 0, 0, 1]),
                IpAddr::from([10, 0, 1, dst]),
                Protocol::Udp,
                size,
            ));
        }
    }

    fn normal(d: &mut EntropyProfile, dst: u8) {
        send(d, dst, 300, 2);
        send(d, dst, 694, 4);
        send(d, dst, 59, 3);
        send(d, dst, 1200, 1);
    }

    fn flood(d: &mut EntropyProfile, dst: u8) {
        send(d, dst, 20, 9);
        send(d, dst, 694, 1);
    }

    fn close(d: &mut EntropyProfile, w: &Window) -> AlarmEvent {
        let ev = d.evaluate(w);
        d.roll_baseline(w);
        ev
    }

    fn first() -> Window {
        Window::first(DateTime::from_timestamp(0, 0).unwrap(), Duration::seconds(5)).unwrap()
    }

    #[test]
    fn mixed_sizes_are_quiet_and_flood_alarms() {
        let mut d = EntropyProfile::new(EntropyConfig::default()).unwrap();
        let w = first();
        normal(&mut d, 1);
        let ev = close(&mut d, &w);
        assert!(!ev.alarm);
        // mode bin 8, H ≈ 1.846
        assert!((ev.score - 3.0 * 1.846_439_3).abs() < 1e-6);

        let w = w.next().unwrap();
        flood(&mut d, 1);
        let ev = close(&mut d, &w);
        assert!(ev.alarm);
        assert!((ev.score - 0.468_995_6).abs() < 1e-6);
        assert_eq!(ev.suspects, vec!["10.0.1.1".to_string()]);
        assert_eq!(d.profile(&IpAddr::from([10, 0, 1, 1])).unwrap().windows, 2);
    }

    #[test]
    fn silent_hosts_are_not_scored() {
        let mut d = EntropyProfile::new(EntropyConfig::default()).unwrap();
        let w = first();
        let ev = close(&mut d, &w);
        assert!(!ev.alarm);
        assert_eq!(ev.score, 0.0);
        assert!(d.profile(&IpAddr::from([10, 0, 1, 1])).is_none());
    }

    #[test]
    fn training_sets_threshold_to_lowest_score() {
        let mut d = EntropyProfile::new(EntropyConfig {
            training_windows: 3,
            ..Default::default()
        })
        .unwrap();
        let mut w = first();
        for _ in 0..3 {
            assert!(d.is_training());
            flood(&mut d, 2);
            normal(&mut d, 1);
            assert!(!close(&mut d, &w).alarm);
            w = w.next().unwrap();
        }
        assert!(!d.is_training());
        assert!((d.threshold() - 0.468_995_6).abs() < 1e-6);

        // equal to the trained minimum is not below it
        flood(&mut d, 2);
        assert!(!close(&mut d, &w).alarm);
        w = w.next().unwrap();
        send(&mut d, 2, 20, 10);
        assert!(close(&mut d, &w).alarm);
    }

    #[test]
    fn fixed_threshold_survives_training() {
        let mut d = EntropyProfile::new(EntropyConfig {
            training_windows: 1,
            trained_threshold: false,
            ..Default::default()
        })
        .unwrap();
        let w = first();
        normal(&mut d, 1);
        close(&mut d, &w);
        assert_eq!(d.threshold(), 0.5);
    }

    #[test]
    fn min_packets_filters_sparse_hosts() {
        let mut d = EntropyProfile::new(EntropyConfig {
            min_packets: 5,
            ..Default::default()
        })
        .unwrap();
        let w = first();
        send(&mut d, 1, 20, 2);
        assert!(!close(&mut d, &w).alarm);
    }

    #[test]
    fn sparse_windows_do_not_use_up_training() {
        let mut d = EntropyProfile::new(EntropyConfig {
            training_windows: 1,
            min_packets: 5,
            ..Default::default()
        })
        .unwrap();
        let w = first();
        send(&mut d, 1, 20, 2);
        let ev = close(&mut d, &w);
        assert_eq!(ev.score, 0.0);
        assert!(d.is_training());
        assert_eq!(d.threshold(), 0.5);

        let w = w.next().unwrap();
        flood(&mut d, 1);
        assert!(!close(&mut d, &w).alarm);
        assert!(!d.is_training());
        assert!((d.threshold() - 0.468_995_6).abs() < 1e-6);
    }

    #[test]
    fn host_minimum_tracks_the_lowest_score() {
        let mut d = EntropyProfile::new(EntropyConfig::default()).unwrap();
        let host = IpAddr::from([10, 0, 1, 1]);
        assert_eq!(d.host_min_score(&host), None);

        let w = first();
        normal(&mut d, 1);
        close(&mut d, &w);
        assert!((d.host_min_score(&host).unwrap() - 3.0 * 1.846_439_3).abs() < 1e-6);

        let w = w.next().unwrap();
        flood(&mut d, 1);
        close(&mut d, &w);
        let w = w.next().unwrap();
        normal(&mut d, 1);
        close(&mut d, &w);
        assert!((d.host_min_score(&host).unwrap() - 0.468_995_6).abs() < 1e-6);
    }
}
