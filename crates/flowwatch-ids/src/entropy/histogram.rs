/// Packet-size bin lower edges, in bytes.
pub const PACKET_SIZE_EDGES: [u32; 15] = [
    0, 40, 60, 80, 100, 120, 200, 400, 600, 800, 1000, 1200, 1400, 1600, 2000,
];

/// Bin of `size`: the last edge not above it. Sizes below the first
/// edge land in bin 0.
pub fn bin_index(edges: &[u32], size: u32) -> usize {
    edges.partition_point(|&e| e <= size).saturating_sub(1)
}

/// Shannon entropy in bits of a count vector; zero counts contribute 0.
pub fn shannon_entropy(counts: &[u64]) -> f64 {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Packet-size histogram of one host over one window.
#[derive(Clone, Debug, PartialEq)]
pub struct SizeHistogram {
    counts: Vec<u64>,
}

impl SizeHistogram {
    pub fn new(bins: usize) -> Self {
        Self {
            counts: vec![0; bins.max(1)],
        }
    }

    pub fn from_counts(counts: Vec<u64>) -> Self {
        Self { counts }
    }

    pub fn add(&mut self, bin: usize) {
        if let Some(c) = self.counts.get_mut(bin) {
            *c += 1;
        }
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn probabilities(&self) -> Vec<f64> {
        let total = self.total();
        if total == 0 {
            return vec![0.0; self.counts.len()];
        }
        self.counts
            .iter()
            .map(|&c| c as f64 / total as f64)
            .collect()
    }

    /// First bin holding the maximum count.
    pub fn mode_index(&self) -> usize {
        let mut best = 0;
        for (i, &c) in self.counts.iter().enumerate() {
            if c > self.counts[best] {
                best = i;
            }
        }
        best
    }

    pub fn entropy(&self) -> f64 {
        shannon_entropy(&self.counts)
    }

    /// `sqrt(mode_index + 1) · H(histogram)`.
    pub fn score(&self) -> f64 {
        ((self.mode_index() + 1) as f64).sqrt() * self.entropy()
    }

    pub fn clear(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binning_follows_lower_edges() {
        let e = &PACKET_SIZE_EDGES;
        assert_eq!(bin_index(e, 0), 0);
        assert_eq!(bin_index(e, 39), 0);
        assert_eq!(bin_index(e, 40), 1);
        assert_eq!(bin_index(e, 59), 1);
        assert_eq!(bin_index(e, 1200), 11);
        assert_eq!(bin_index(e, 1999), 13);
        assert_eq!(bin_index(e, 2000), 14);
        assert_eq!(bin_index(e, 65_000), 14);
        assert_eq!(bin_index(&[10, 20], 5), 0);
    }

    #[test]
    fn entropy_reference_values() {
        assert_eq!(shannon_entropy(&[10, 0, 0]), 0.0);
        assert!((shannon_entropy(&[1, 1]) - 1.0).abs() < 1e-12);
        assert!((shannon_entropy(&[2, 2, 2, 2]) - 2.0).abs() < 1e-12);
        assert_eq!(shannon_entropy(&[0, 0]), 0.0);
    }

    #[test]
    fn mode_is_first_maximum() {
        let h = SizeHistogram::from_counts(vec![0, 3, 1, 3]);
        assert_eq!(h.mode_index(), 1);
    }

    #[test]
    fn score_weights_entropy_by_mode() {
        // uniform over bins 3 and 4: H = 1, mode = 3
        let h = SizeHistogram::from_counts(vec![0, 0, 0, 5, 5]);
        assert!((h.score() - 2.0).abs() < 1e-12);
        let single = SizeHistogram::from_counts(vec![0, 0, 9]);
        assert_eq!(single.score(), 0.0);
    }

    #[test]
    fn clear_resets_counts() {
        let mut h = SizeHistogram::new(3);
        h.add(1);
        h.add(7);
        assert_eq!(h.total(), 1);
        h.clear();
        assert_eq!(h.total(), 0);
    }
}
