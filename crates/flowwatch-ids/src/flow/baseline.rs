use chrono::{DateTime, Utc};

use super::welford::Welford;

/// Count-weighted running average `(m·xa + n·xb) / (m + n)`.
pub fn combine(m: f64, xa: f64, n: f64, xb: f64) -> f64 {
    if m + n == 0.0 {
        0.0
    } else {
        (m * xa + n * xb) / (m + n)
    }
}

/// Per-window statistics of one flow.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindowStats {
    pub bytes: Welford,
    pub ipt: Welford,
    pub total_bytes: u64,
}

impl WindowStats {
    pub fn packets(&self) -> u64 {
        self.bytes.count()
    }

    pub fn push(&mut self, size: u32, ipt: f64) {
        self.bytes.push(size as f64);
        self.ipt.push(ipt);
        self.total_bytes += size as u64;
    }
}

/// Long-run statistics of one flow, merged once per window.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HistoricalRecord {
    pub packets: u64,
    pub avg_byte: f64,
    pub var_byte: f64,
    pub avg_ipt: f64,
    pub var_ipt: f64,
    pub updated: Option<DateTime<Utc>>,
}

impl HistoricalRecord {
    pub fn merge(&mut self, window: &WindowStats, at: DateTime<Utc>) {
        let n = window.packets();
        if n == 0 {
            return;
        }
        let (m, nf) = (self.packets as f64, n as f64);
        self.avg_byte = combine(m, self.avg_byte, nf, window.bytes.mean());
        self.var_byte = combine(m, self.var_byte, nf, window.bytes.variance());
        self.avg_ipt = combine(m, self.avg_ipt, nf, window.ipt.mean());
        self.var_ipt = combine(m, self.var_ipt, nf, window.ipt.variance());
        self.packets += n;
        self.updated = Some(at);
    }

    pub fn is_empty(&self) -> bool {
        self.packets == 0
    }
}

/// `(avg − hist_avg) / sqrt(var / n)`; undefined for zero variance.
pub fn t_statistic(avg: f64, hist_avg: f64, var: f64, n: u64) -> Option<f64> {
    if var > 0.0 && n > 0 {
        let t = (avg - hist_avg) / (var / n as f64).sqrt();
        t.is_finite().then_some(t)
    } else {
        None
    }
}

/// `sqrt(t_byte² + t_ipt²)`, defined only when both statistics are.
pub fn flow_score(window: &WindowStats, hist: &HistoricalRecord) -> Option<f64> {
    let n = window.packets();
    let t_byte = t_statistic(window.bytes.mean(), hist.avg_byte, window.bytes.variance(), n)?;
    let t_ipt = t_statistic(window.ipt.mean(), hist.avg_ipt, window.ipt.variance(), n)?;
    Some((t_byte * t_byte + t_ipt * t_ipt).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(samples: &[(u32, f64)]) -> WindowStats {
        let mut w = WindowStats::default();
        for &(s, i) in samples {
            w.push(s, i);
        }
        w
    }

    #[test]
    fn combine_weights_by_count() {
        assert_eq!(combine(3.0, 10.0, 1.0, 20.0), 12.5);
        assert_eq!(combine(0.0, 0.0, 4.0, 7.0), 7.0);
        assert_eq!(combine(0.0, 0.0, 0.0, 7.0), 0.0);
    }

    #[test]
    fn first_merge_adopts_window_stats() {
        let mut h = HistoricalRecord::default();
        let w = stats(&[(100, 0.0), (200, 1.0), (300, 2.0)]);
        h.merge(&w, Utc::now());
        assert_eq!(h.packets, 3);
        assert_eq!(h.avg_byte, 200.0);
        assert_eq!(h.var_byte, 10_000.0);
        assert_eq!(h.avg_ipt, 1.0);
    }

    #[test]
    fn second_merge_is_count_weighted() {
        let mut h = HistoricalRecord::default();
        h.merge(&stats(&[(100, 0.0), (100, 1.0)]), Utc::now());
        h.merge(&stats(&[(400, 1.0), (400, 1.0)]), Utc::now());
        assert_eq!(h.packets, 4);
        assert_eq!(h.avg_byte, 250.0);
    }

    #[test]
    fn zero_variance_yields_no_statistic() {
        assert_eq!(t_statistic(5.0, 1.0, 0.0, 10), None);
        assert_eq!(t_statistic(5.0, 1.0, 4.0, 0), None);
        assert_eq!(t_statistic(5.0, 1.0, 4.0, 4), Some(4.0));
    }

    #[test]
    fn score_needs_both_metrics() {
        let hist = HistoricalRecord {
            packets: 10,
            avg_byte: 100.0,
            avg_ipt: 1.0,
            ..HistoricalRecord::default()
        };
        // constant sizes: byte variance 0
        let w = stats(&[(100, 0.5), (100, 1.5)]);
        assert_eq!(flow_score(&w, &hist), None);

        let w = stats(&[(100, 0.5), (300, 1.5), (200, 1.0), (200, 1.0)]);
        let score = flow_score(&w, &hist).unwrap();
        // t_ipt = 0, t_byte = 100 / sqrt(var/4)
        let var = w.bytes.variance();
        assert!((score - 100.0 / (var / 4.0).sqrt()).abs() < 1e-9);
    }
}
