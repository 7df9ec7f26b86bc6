use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

/// Norms below this are treated as the zero vector.
const NORM_EPSILON: f64 = 1e-10;

/// A host's destination distribution for one window, or a library
/// entry's running average of such distributions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pattern {
    weights: BTreeMap<IpAddr, f64>,
}

impl Pattern {
    /// Normalise destination counts to probabilities.
    pub fn from_counts(counts: &BTreeMap<IpAddr, u64>) -> Self {
        let total: u64 = counts.values().sum();
        let weights = if total == 0 {
            BTreeMap::new()
        } else {
            counts
                .iter()
                .map(|(ip, &c)| (*ip, c as f64 / total as f64))
                .collect()
        };
        Self { weights }
    }

    pub fn from_weights(weights: BTreeMap<IpAddr, f64>) -> Self {
        Self { weights }
    }

    pub fn weight(&self, dst: &IpAddr) -> f64 {
        self.weights.get(dst).copied().unwrap_or(0.0)
    }

    pub fn destinations(&self) -> impl Iterator<Item = &IpAddr> {
        self.weights.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    fn union_keys<'a>(&'a self, other: &'a Pattern) -> BTreeSet<&'a IpAddr> {
        self.weights.keys().chain(other.weights.keys()).collect()
    }

    /// Cosine similarity over the union of destinations, missing
    /// entries counted as zero. A zero vector is similar to nothing.
    pub fn similarity(&self, other: &Pattern) -> f64 {
        let mut dot = 0.0;
        let mut na = 0.0;
        let mut nb = 0.0;
        for key in self.union_keys(other) {
            let a = self.weight(key);
            let b = other.weight(key);
            dot += a * b;
            na += a * a;
            nb += b * b;
        }
        let (na, nb) = (na.sqrt(), nb.sqrt());
        if na < NORM_EPSILON || nb < NORM_EPSILON {
            return 0.0;
        }
        dot / (na * nb)
    }

    /// Fold `observed` into this running average of `count` patterns:
    /// `(count·self + observed) / (count + 1)`.
    pub fn adapt(&mut self, observed: &Pattern, count: u64) {
        let c = count as f64;
        let merged: BTreeMap<IpAddr, f64> = self
            .union_keys(observed)
            .into_iter()
            .map(|k| (*k, (c * self.weight(k) + observed.weight(k)) / (c + 1.0)))
            .collect();
        self.weights = merged;
    }
}
