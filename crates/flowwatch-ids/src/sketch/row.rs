//! One hash row: its cells, the per-window divergence between observed
//! and forecast distributions, and the debounced smoothing of that series.

use super::cell::Cell;
use super::hash::HashRow;

/// `Σ (p_i − q_i)² / q_i`, skipping cells with `q_i = 0`.
pub fn divergence(p: &[f64], q: &[f64]) -> f64 {
    p.iter()
        .zip(q.iter())
        .filter(|(_, q)| **q != 0.0)
        .map(|(&p, &q)| (p - q) * (p - q) / q)
        .sum()
}

/// Normalise onto the probability simplex; all zeros stays all zeros.
pub fn normalize(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter().map(|v| v / total).collect()
    } else {
        vec![0.0; values.len()]
    }
}

/// Tuning of [`DivergenceSmoother`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmoothingParams {
    pub coef_bound: f64,
    pub coef_fore: f64,
    pub consecutive: u32,
    pub spread_floor: f64,
    pub max_freeze: u32,
    pub warmup: u32,
}

/// Outcome of one row evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RowVerdict {
    pub divergence: f64,
    pub filtered: f64,
    pub alarm: bool,
}

/// EWMA mean/std over the filtered divergence series with a
/// consecutive-exceedance debounce.
#[derive(Clone, Debug)]
pub struct DivergenceSmoother {
    params: SmoothingParams,
    mean: Option<f64>,
    variance: f64,
    filtered: f64,
    consecutive_exceed: u32,
    evaluations: u32,
}

impl DivergenceSmoother {
    pub fn new(params: SmoothingParams) -> Self {
        Self {
            params,
            mean: None,
            variance: 0.0,
            filtered: 0.0,
            consecutive_exceed: 0,
            evaluations: 0,
        }
    }

    pub fn mean(&self) -> Option<f64> {
        self.mean
    }

    pub fn std(&self) -> f64 {
        self.variance.sqrt()
    }

    /// Last accepted (or frozen) value of the filtered series.
    pub fn filtered(&self) -> f64 {
        self.filtered
    }

    pub fn consecutive_exceed(&self) -> u32 {
        self.consecutive_exceed
    }

    pub fn observe(&mut self, d: f64) -> RowVerdict {
        let p = self.params;
        let prev_mean = match self.mean {
            Some(m) => m,
            None => {
                self.mean = Some(d);
                self.variance = 0.0;
                self.filtered = d;
                return RowVerdict {
                    divergence: d,
                    filtered: d,
                    alarm: false,
                };
            }
        };

        let mean = p.coef_fore * prev_mean + (1.0 - p.coef_fore) * self.filtered;
        let spread = self.variance.sqrt().max(p.spread_floor * mean);
        let mut mean_out = mean;

        if d <= mean + p.coef_bound * spread {
            self.filtered = d;
            self.consecutive_exceed = 0;
        } else if p.max_freeze > 0 && self.consecutive_exceed >= p.max_freeze {
            // Sustained shift: accept the new level as normal.
            self.filtered = d;
            self.consecutive_exceed = 0;
            mean_out = d;
            self.variance = 0.0;
        } else {
            self.consecutive_exceed += 1;
        }

        let dev = self.filtered - mean_out;
        self.variance = p.coef_fore * self.variance + (1.0 - p.coef_fore) * dev * dev;
        self.mean = Some(mean_out);
        self.evaluations = self.evaluations.saturating_add(1);

        let alarm = d != self.filtered
            && self.consecutive_exceed >= p.consecutive
            && self.evaluations > p.warmup;
        RowVerdict {
            divergence: d,
            filtered: self.filtered,
            alarm,
        }
    }
}

/// Hash row with its cells and smoother.
#[derive(Clone, Debug)]
pub struct SketchRow {
    hash: HashRow,
    cells: Vec<Cell>,
    smoother: DivergenceSmoother,
    last: Option<RowVerdict>,
}

impl SketchRow {
    pub fn new(hash: HashRow, history_len: usize, params: SmoothingParams) -> Self {
        let cells = (0..hash.cells()).map(|_| Cell::new(history_len)).collect();
        Self {
            hash,
            cells,
            smoother: DivergenceSmoother::new(params),
            last: None,
        }
    }

    pub fn update(&mut self, key: u64, value: f64) {
        let slot = self.hash.slot(key);
        self.cells[slot].add(value);
    }

    /// Counter of the cell `key` maps to; never below the true count.
    pub fn estimate(&self, key: u64) -> f64 {
        self.cells[self.hash.slot(key)].counter()
    }

    /// Observed minus forecast for the cell `key` maps to.
    pub fn excess(&self, key: u64) -> Option<f64> {
        let cell = &self.cells[self.hash.slot(key)];
        cell.forecast().map(|f| cell.counter() - f)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn smoother(&self) -> &DivergenceSmoother {
        &self.smoother
    }

    pub fn last_verdict(&self) -> Option<RowVerdict> {
        self.last
    }

    /// Score the window. `None` until every cell has a full history.
    pub fn evaluate(&mut self) -> Option<RowVerdict> {
        self.last = None;
        if !self.cells.iter().all(Cell::is_primed) {
            return None;
        }
        let forecasts: Vec<f64> = self
            .cells
            .iter_mut()
            .map(|c| c.predict().unwrap_or(0.0))
            .collect();
        let counters: Vec<f64> = self.cells.iter().map(Cell::counter).collect();
        let p = normalize(&counters);
        let q = normalize(&forecasts);
        for (cell, (pi, qi)) in self.cells.iter_mut().zip(p.iter().zip(q.iter())) {
            cell.set_probabilities(*pi, *qi);
        }
        let verdict = self.smoother.observe(divergence(&p, &q));
        self.last = Some(verdict);
        Some(verdict)
    }

    /// Adapt every forecaster to this window's counts, then slide.
    pub fn roll(&mut self) {
        for cell in &mut self.cells {
            cell.adapt();
            cell.slide();
        }
    }
}
