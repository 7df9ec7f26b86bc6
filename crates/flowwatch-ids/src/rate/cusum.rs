//! EWMA forecast with a one-sided CUSUM change detector on a scalar series.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Tuning of [`EwmaCusum`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CusumParams {
    pub alpha: f64,
    pub cthresh: f64,
    pub big_m: f64,
    pub csum: f64,
    pub thresh_sum_upper: f64,
    /// Error history bound `N`.
    pub history: usize,
    pub min_history: usize,
    /// Observations kept for resampling while under attack.
    pub pre_attack: usize,
}

/// Result of one observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CusumStep {
    pub observed: f64,
    pub forecast: f64,
    pub upper: f64,
    pub cusum: f64,
    pub threshold: f64,
    pub alarm: bool,
}

pub struct EwmaCusum {
    params: CusumParams,
    rng: StdRng,
    forecast: Option<f64>,
    errors: VecDeque<f64>,
    cusum: f64,
    pre_attack: VecDeque<f64>,
    under_attack: bool,
}

impl EwmaCusum {
    pub fn new(params: CusumParams, rng: StdRng) -> Self {
        Self {
            params,
            rng,
            forecast: None,
            errors: VecDeque::with_capacity(params.history),
            cusum: 0.0,
            pre_attack: VecDeque::with_capacity(params.pre_attack),
            under_attack: false,
        }
    }

    pub fn forecast(&self) -> Option<f64> {
        self.forecast
    }

    pub fn cusum(&self) -> f64 {
        self.cusum
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn under_attack(&self) -> bool {
        self.under_attack
    }

    /// Population standard deviation of the error history.
    pub fn error_std(&self) -> f64 {
        let n = self.errors.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.errors.iter().sum::<f64>() / n as f64;
        let var = self.errors.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n as f64;
        var.sqrt()
    }

    pub fn observe(&mut self, x: f64) -> CusumStep {
        let p = self.params;
        let Some(forecast) = self.forecast else {
            self.forecast = Some(x);
            self.remember_normal(x);
            return CusumStep {
                observed: x,
                forecast: x,
                upper: x,
                cusum: 0.0,
                threshold: 0.0,
                alarm: false,
            };
        };

        let std = self.error_std();
        let upper = forecast + (p.cthresh * std).max(p.big_m);
        let threshold = p.csum * std;
        let mut alarm = false;
        if self.errors.len() >= p.min_history {
            self.cusum = (self.cusum + (x - upper)).clamp(0.0, p.thresh_sum_upper);
            alarm = self.cusum > threshold;
        }

        let input = if alarm {
            // Keep the attack out of the baseline.
            self.pre_attack
                .make_contiguous()
                .choose(&mut self.rng)
                .copied()
                .unwrap_or(forecast)
        } else {
            self.errors.push_back(x - forecast);
            while self.errors.len() > p.history {
                self.errors.pop_front();
            }
            self.remember_normal(x);
            x
        };
        self.under_attack = alarm;
        self.forecast = Some(p.alpha * input + (1.0 - p.alpha) * forecast);

        CusumStep {
            observed: x,
            forecast,
            upper,
            cusum: self.cusum,
            threshold,
            alarm,
        }
    }

    fn remember_normal(&mut self, x: f64) {
        self.pre_attack.push_back(x);
        while self.pre_attack.len() > self.params.pre_attack {
            self.pre_attack.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn detector() -> EwmaCusum {
        EwmaCusum::new(
            CusumParams {
                alpha: 0.3,
                cthresh: 3.0,
                big_m: 1.0,
                csum: 3.0,
                thresh_sum_upper: 100.0,
                history: 20,
                min_history: 5,
                pre_attack: 10,
            },
            StdRng::seed_from_u64(1),
        )
    }

    #[test]
    fn first_value_initialises_forecast() {
        let mut d = detector();
        let step = d.observe(40.0);
        assert!(!step.alarm);
        assert_eq!(d.forecast(), Some(40.0));
        assert_eq!(d.error_count(), 0);
    }

    #[test]
    fn ewma_update() {
        let mut d = detector();
        d.observe(10.0);
        d.observe(20.0);
        // 0.3*20 + 0.7*10
        assert!((d.forecast().unwrap() - 13.0).abs() < 1e-12);
    }

    #[test]
    fn no_alarm_before_min_history() {
        let mut d = detector();
        d.observe(10.0);
        for _ in 0..4 {
            assert!(!d.observe(1_000.0).alarm);
        }
    }

    #[test]
    fn constant_series_never_alarms() {
        let mut d = detector();
        for _ in 0..200 {
            assert!(!d.observe(7.0).alarm);
        }
        assert_eq!(d.cusum(), 0.0);
    }

    #[test]
    fn step_change_alarms_and_spares_baseline() {
        let mut d = detector();
        let base = [10.0, 11.0, 9.0, 10.0, 12.0, 8.0, 10.0, 11.0, 9.0, 10.0];
        for x in base.iter().cycle().take(40) {
            d.observe(*x);
        }
        let before = d.forecast().unwrap();
        let errors = d.error_count();
        let step = d.observe(200.0);
        assert!(step.alarm);
        assert!(d.under_attack());
        assert_eq!(d.error_count(), errors);
        // resampled from the pre-attack values, not 200
        assert!(d.forecast().unwrap() < before + 2.0);
    }

    #[test]
    fn error_history_is_bounded() {
        let mut d = detector();
        for i in 0..100 {
            d.observe((i % 3) as f64);
        }
        assert!(d.error_count() <= 20);
    }

    #[test]
    fn cusum_is_capped() {
        let mut d = detector();
        for x in [5.0, 5.0, 6.0, 4.0, 5.0, 5.0, 6.0] {
            d.observe(x);
        }
        for _ in 0..50 {
            d.observe(1e6);
        }
        assert!(d.cusum() <= 100.0);
    }
}
