use super::vector::Pattern;

/// A remembered pattern and how many windows matched it.
#[derive(Clone, Debug, PartialEq)]
pub struct LibraryEntry {
    pub pattern: Pattern,
    pub count: u64,
}

/// How an observed pattern relates to a host's library.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Match {
    /// Close enough to entry `index` to be merged into it.
    Existing { index: usize, similarity: f64 },
    /// Stored as a new entry. `similarity` is the best one found, if any.
    New { similarity: Option<f64> },
}

/// Patterns previously seen for one host.
#[derive(Clone, Debug, Default)]
pub struct PatternLibrary {
    entries: Vec<LibraryEntry>,
}

impl PatternLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|e| e.count).sum()
    }

    /// Most similar entry; ties go to the later entry.
    pub fn closest(&self, observed: &Pattern) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            let sim = entry.pattern.similarity(observed);
            match best {
                Some((_, s)) if sim < s => {}
                _ => best = Some((i, sim)),
            }
        }
        best
    }

    pub fn classify(&self, observed: &Pattern, tresh_match: f64) -> Match {
        match self.closest(observed) {
            Some((index, similarity)) if similarity >= tresh_match => {
                Match::Existing { index, similarity }
            }
            Some((_, similarity)) => Match::New {
                similarity: Some(similarity),
            },
            None => Match::New { similarity: None },
        }
    }

    /// Occurrence counts after applying `m`, and the index it lands on.
    fn counts_after(&self, m: &Match) -> (Vec<u64>, usize) {
        let mut counts: Vec<u64> = self.entries.iter().map(|e| e.count).collect();
        match *m {
            Match::Existing { index, .. } => {
                counts[index] += 1;
                (counts, index)
            }
            Match::New { .. } => {
                counts.push(1);
                let i = counts.len() - 1;
                (counts, i)
            }
        }
    }

    /// Tail probability of the entry `m` lands on, as if `m` were applied.
    pub fn tail_after(&self, m: &Match) -> f64 {
        let (counts, i) = self.counts_after(m);
        tail_probability(&counts, i)
    }

    pub fn probability(&self, index: usize) -> f64 {
        let total = self.total();
        match self.entries.get(index) {
            Some(e) if total > 0 => e.count as f64 / total as f64,
            _ => 0.0,
        }
    }

    pub fn tail(&self, index: usize) -> f64 {
        let counts: Vec<u64> = self.entries.iter().map(|e| e.count).collect();
        tail_probability(&counts, index)
    }

    /// Merge or insert. A full library first drops its least frequent
    /// entry (oldest among equals).
    pub fn apply(&mut self, observed: Pattern, m: Match, max_patterns: usize) {
        match m {
            Match::Existing { index, .. } => {
                if let Some(entry) = self.entries.get_mut(index) {
                    entry.pattern.adapt(&observed, entry.count);
                    entry.count += 1;
                }
            }
            Match::New { .. } => {
                if self.entries.len() >= max_patterns.max(1) {
                    if let Some(victim) = self
                        .entries
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, e)| e.count)
                        .map(|(i, _)| i)
                    {
                        self.entries.remove(victim);
                    }
                }
                self.entries.push(LibraryEntry {
                    pattern: observed,
                    count: 1,
                });
            }
        }
    }
}

/// Sum of the probabilities of all entries no more likely than `index`.
pub fn tail_probability(counts: &[u64], index: usize) -> f64 {
    let total: u64 = counts.iter().sum();
    let Some(&own) = counts.get(index) else {
        return 0.0;
    };
    if total == 0 {
        return 0.0;
    }
    let tail: u64 = counts.iter().filter(|&&c| c <= own).sum();
    tail as f64 / total as f64
}
