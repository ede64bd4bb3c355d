// SPDX-License-Identifier: Apache-2.0

use crate::config::{AverageMode, AveragingParams};
use std::collections::VecDeque;

/// Weighting strategy for the weighted averaging mode.
///
/// Implementations return one weight per buffered sample in buffer order
/// (oldest first) and must normalize the weights to sum to 1. The concrete
/// curve is a deployment-tunable choice, not a fixed constant.
pub trait Weighting: Send {
    /// Normalized weights for a buffer of `len` samples, oldest first.
    fn weights(&self, len: usize) -> Vec<f64>;
}

/// Geometric decay from a starting weight.
///
/// The newest sample gets `start`, each step toward older samples multiplies
/// by `factor`. A factor below 1 favors recent samples, above 1 favors older
/// ones. Weights are normalized before use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometricWeights {
    /// Weight of the most recent sample before normalization.
    pub start: f64,
    /// Multiplier applied per step toward older samples.
    pub factor: f64,
}

impl Weighting for GeometricWeights {
    fn weights(&self, len: usize) -> Vec<f64> {
        if len == 0 {
            return Vec::new();
        }

        // Oldest first: the sample at index i has age len - 1 - i.
        let mut weights: Vec<f64> = (0..len)
            .map(|i| self.start * self.factor.powi((len - 1 - i) as i32))
            .collect();

        let sum: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= sum;
        }
        weights
    }
}

/// Bounded temporal smoothing of the calibrated range.
///
/// Owns the fixed-capacity history buffer: once full, the oldest entry is
/// evicted before the newest is inserted. The output for each input sample
/// depends on the configured mode.
pub struct TemporalAverager {
    capacity: usize,
    mode: AverageMode,
    history: VecDeque<f64>,
    weighting: Box<dyn Weighting>,
}

impl TemporalAverager {
    /// Builds an averager with the default geometric weighting.
    pub fn new(params: &AveragingParams) -> TemporalAverager {
        TemporalAverager::with_weighting(
            params,
            Box::new(GeometricWeights {
                start: params.start_weight,
                factor: params.factor,
            }),
        )
    }

    /// Builds an averager with an injected weighting strategy.
    pub fn with_weighting(params: &AveragingParams, weighting: Box<dyn Weighting>) -> TemporalAverager {
        TemporalAverager {
            capacity: params.capacity.max(1),
            mode: params.mode,
            history: VecDeque::with_capacity(params.capacity.max(1)),
            weighting,
        }
    }

    /// Number of samples currently buffered.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether the history buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Inserts a new sample and returns the smoothed output.
    pub fn push(&mut self, sample_mm: f64) -> f64 {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(sample_mm);

        match self.mode {
            AverageMode::Off => sample_mm,
            AverageMode::Simple => {
                self.history.iter().sum::<f64>() / self.history.len() as f64
            }
            AverageMode::Weighted => {
                let weights = self.weighting.weights(self.history.len());
                self.history
                    .iter()
                    .zip(weights.iter())
                    .map(|(sample, weight)| sample * weight)
                    .sum()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mode: AverageMode, capacity: usize) -> AveragingParams {
        AveragingParams {
            mode,
            capacity,
            start_weight: 1.0,
            factor: 0.5,
        }
    }

    #[test]
    fn only_last_k_samples_participate() {
        let mut averager = TemporalAverager::new(&params(AverageMode::Simple, 3));

        for sample in [1.0, 2.0, 3.0, 4.0] {
            averager.push(sample);
        }
        // Buffer holds 2, 3, 4 after evicting 1.
        let smoothed = averager.push(5.0);

        assert_eq!(averager.len(), 3);
        assert!((smoothed - 4.0).abs() < 1e-12);
    }

    #[test]
    fn constant_input_converges_to_constant() {
        let mut averager = TemporalAverager::new(&params(AverageMode::Simple, 4));

        let mut smoothed = 0.0;
        for _ in 0..10 {
            smoothed = averager.push(42.5);
        }
        assert_eq!(smoothed, 42.5);
    }

    #[test]
    fn off_mode_is_identity() {
        let mut averager = TemporalAverager::new(&params(AverageMode::Off, 4));

        averager.push(10.0);
        averager.push(20.0);
        assert_eq!(averager.push(981.25), 981.25);
    }

    #[test]
    fn geometric_weights_sum_to_one() {
        for start in [0.1, 1.0, 3.0] {
            for factor in [0.25, 0.5, 0.9, 1.0, 1.5] {
                for len in 1..=8 {
                    let weights = GeometricWeights { start, factor }.weights(len);
                    let sum: f64 = weights.iter().sum();
                    assert!(
                        (sum - 1.0).abs() < 1e-12,
                        "weights must sum to 1 for start={} factor={} len={}",
                        start,
                        factor,
                        len
                    );
                }
            }
        }
    }

    #[test]
    fn decaying_factor_favors_recent_samples() {
        let weights = GeometricWeights {
            start: 1.0,
            factor: 0.5,
        }
        .weights(3);

        // Oldest first: 0.25, 0.5, 1.0 before normalization.
        assert!(weights[0] < weights[1] && weights[1] < weights[2]);
    }

    #[test]
    fn weighted_average_matches_hand_computation() {
        let mut averager = TemporalAverager::new(&params(AverageMode::Weighted, 3));

        averager.push(10.0);
        averager.push(20.0);
        let smoothed = averager.push(40.0);

        // Raw weights oldest-first are 0.25, 0.5, 1.0 -> 1/7, 2/7, 4/7.
        let expected = (10.0 + 2.0 * 20.0 + 4.0 * 40.0) / 7.0;
        assert!((smoothed - expected).abs() < 1e-12);
    }
}
