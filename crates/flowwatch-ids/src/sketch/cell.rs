//! Sketch cell: a per-window counter plus a normalised LMS forecaster
//! over the cell's trailing history.

use std::collections::VecDeque;

/// One counter of a hash row.
#[derive(Clone, Debug)]
pub struct Cell {
    counter: f64,
    history: VecDeque<f64>,
    weights: Vec<f64>,
    forecast: Option<f64>,
    current_prob: f64,
    estimated_prob: f64,
}

impl Cell {
    /// A cell forecasting from the last `history_len` windows, weights
    /// starting uniform at `1/history_len`.
    pub fn new(history_len: usize) -> Self {
        let n = history_len.max(1);
        Self::with_weights(vec![1.0 / n as f64; n])
    }

    pub fn with_weights(weights: Vec<f64>) -> Self {
        Self {
            counter: 0.0,
            history: VecDeque::with_capacity(weights.len()),
            weights,
            forecast: None,
            current_prob: 0.0,
            estimated_prob: 0.0,
        }
    }

    pub fn add(&mut self, value: f64) {
        self.counter += value;
    }

    pub fn counter(&self) -> f64 {
        self.counter
    }

    pub fn history(&self) -> &VecDeque<f64> {
        &self.history
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// History holds a full `n` values, so a forecast exists.
    pub fn is_primed(&self) -> bool {
        self.history.len() == self.weights.len()
    }

    fn raw_forecast(&self) -> f64 {
        self.weights
            .iter()
            .zip(self.history.iter())
            .map(|(w, h)| w * h)
            .sum()
    }

    /// Compute and store the forecast for this window, clamped at zero.
    pub fn predict(&mut self) -> Option<f64> {
        if !self.is_primed() {
            self.forecast = None;
            return None;
        }
        let f = self.raw_forecast().max(0.0);
        self.forecast = Some(f);
        Some(f)
    }

    pub fn forecast(&self) -> Option<f64> {
        self.forecast
    }

    pub fn set_probabilities(&mut self, current: f64, estimated: f64) {
        self.current_prob = current;
        self.estimated_prob = estimated;
    }

    pub fn current_prob(&self) -> f64 {
        self.current_prob
    }

    pub fn estimated_prob(&self) -> f64 {
        self.estimated_prob
    }

    /// NLMS step with the window's counter as the observed value:
    /// `w += err·h / (2‖h‖²)`. Returns the prediction error, or `None`
    /// while the history is still filling.
    pub fn adapt(&mut self) -> Option<f64> {
        if !self.is_primed() {
            return None;
        }
        let error = self.counter - self.raw_forecast();
        let energy: f64 = self.history.iter().map(|h| h * h).sum();
        if energy > 0.0 {
            let step = 1.0 / (2.0 * energy);
            for (w, h) in self.weights.iter_mut().zip(self.history.iter()) {
                *w += step * error * h;
            }
        }
        Some(error)
    }

    /// Push the counter into the history and start a fresh window.
    pub fn slide(&mut self) {
        self.history.push_back(self.counter);
        while self.history.len() > self.weights.len() {
            self.history.pop_front();
        }
        self.counter = 0.0;
        self.forecast = None;
        self.current_prob = 0.0;
        self.estimated_prob = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_never_exceeds_n() {
        let mut cell = Cell::new(3);
        for v in 0..10 {
            cell.add(v as f64);
            cell.slide();
            assert!(cell.history().len() <= 3);
        }
        assert_eq!(cell.history().iter().copied().collect::<Vec<_>>(), vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn forecast_requires_full_history() {
        let mut cell = Cell::new(2);
        cell.add(4.0);
        assert_eq!(cell.predict(), None);
        cell.slide();
        cell.add(6.0);
        cell.slide();
        // uniform weights: mean of the history
        assert_eq!(cell.predict(), Some(5.0));
    }

    #[test]
    fn adapt_moves_weights_toward_observation() {
        let mut cell = Cell::with_weights(vec![0.0, 0.0]);
        cell.add(1.0);
        cell.slide();
        cell.add(1.0);
        cell.slide();
        cell.add(2.0);
        let err = cell.adapt().unwrap();
        assert_eq!(err, 2.0);
        // step = 1/(2*2), w = 0.25*2*1 each
        assert_eq!(cell.weights(), &[0.5, 0.5]);
    }

    #[test]
    fn adapt_skips_zero_energy_history() {
        let mut cell = Cell::new(2);
        cell.slide();
        cell.slide();
        cell.add(3.0);
        assert_eq!(cell.adapt(), Some(3.0));
        assert_eq!(cell.weights(), &[0.5, 0.5]);
    }

    #[test]
    fn negative_forecast_is_clamped() {
        let mut cell = Cell::with_weights(vec![-1.0]);
        cell.add(5.0);
        cell.slide();
        assert_eq!(cell.predict(), Some(0.0));
    }
}
