// SPDX-License-Identifier: Apache-2.0

//! Immutable node configuration.
//!
//! Every component borrows the parts of [`RangeConfig`] it needs at
//! construction time. The value is built once at startup from command line
//! arguments (and optional JSON resources) and never mutated afterwards.

use serde::Deserialize;
use std::time::Duration;

/// Radar sweep acquisition geometry.
///
/// Mirrors the front-end service configuration: the sweep starts at
/// `start_point` and advances `step_length` base steps per sample, where one
/// base step is `0.0025 / rf_factor` meters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SweepParams {
    /// First distance point of the sweep, in base steps.
    pub start_point: u32,
    /// Number of distance points per sweep.
    pub num_points: usize,
    /// Distance step between samples, in base steps.
    pub step_length: u32,
    /// Sweeps averaged into one frame by the front-end.
    pub sweeps_per_frame: usize,
    /// RF scaling factor applied to the base step length.
    pub rf_factor: f32,
    /// Base value of the temperature-dependent amplitude divisor.
    pub divisor_base: f32,
}

impl SweepParams {
    /// Base distance step in meters after RF scaling.
    pub fn rf_step(&self) -> f32 {
        0.0025 / self.rf_factor
    }

    /// Sample count the front-end must deliver for this configuration.
    pub fn expected_data_length(&self) -> usize {
        self.num_points * self.sweeps_per_frame
    }

    /// Distance in meters of sample `index`.
    pub fn distance_at(&self, index: usize) -> f32 {
        let rf_step = self.rf_step();
        index as f32 * rf_step * self.step_length as f32 + self.start_point as f32 * rf_step
    }
}

impl Default for SweepParams {
    fn default() -> Self {
        SweepParams {
            start_point: 80,
            num_points: 200,
            step_length: 2,
            sweeps_per_frame: 1,
            rf_factor: 1.0,
            divisor_base: 1600.0,
        }
    }
}

/// Piecewise-linear threshold curve parameters.
///
/// Three line segments over distance, delimited by four monotonically
/// increasing breakpoints. Distances outside every segment evaluate to a
/// threshold of zero.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThresholdParams {
    /// Segment domain breakpoints in meters, strictly increasing.
    pub breakpoints: [f32; 4],
    /// Per-segment slope, amplitude per meter.
    pub slopes: [f32; 3],
    /// Per-segment y-intercept, amplitude units.
    pub intercepts: [f32; 3],
}

impl Default for ThresholdParams {
    fn default() -> Self {
        ThresholdParams {
            breakpoints: [0.10, 0.35, 0.70, 1.10],
            slopes: [-4000.0, -1500.0, -500.0],
            intercepts: [2600.0, 1725.0, 1025.0],
        }
    }
}

/// Temporal averaging mode for the smoothed range output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AverageMode {
    /// Identity passthrough, no history is consulted.
    Off,
    /// Arithmetic mean over the history buffer.
    Simple,
    /// Weighted mean using the configured weighting strategy.
    Weighted,
}

/// Temporal averaging configuration.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AveragingParams {
    /// Averaging mode.
    pub mode: AverageMode,
    /// History buffer capacity in samples.
    pub capacity: usize,
    /// Starting weight for the weighted mode, most recent sample.
    pub start_weight: f64,
    /// Per-step decay factor for the weighted mode.
    pub factor: f64,
}

impl Default for AveragingParams {
    fn default() -> Self {
        AveragingParams {
            mode: AverageMode::Simple,
            capacity: 8,
            start_weight: 1.0,
            factor: 0.5,
        }
    }
}

/// Analog position channel calibration.
///
/// Two channels exist on the gateway node with the same conversion algorithm
/// but independent `start_voltage` constants.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalogParams {
    /// ADC reference voltage in volts.
    pub vref: f64,
    /// ADC resolution in bits.
    pub resolution_bits: u8,
    /// Raw samples taken per reading.
    pub oversample: u32,
    /// Settling delay between raw samples, in microseconds.
    pub settle_us: u64,
    /// Voltage at the zero position, in volts.
    pub start_voltage: f64,
    /// Millimeters per volt above the start voltage.
    pub scale: f64,
}

impl AnalogParams {
    /// Settling delay between raw ADC samples.
    pub fn settle(&self) -> Duration {
        Duration::from_micros(self.settle_us)
    }

    /// Largest raw code the ADC can produce.
    pub fn full_scale(&self) -> f64 {
        ((1u32 << self.resolution_bits) - 1) as f64
    }
}

impl Default for AnalogParams {
    fn default() -> Self {
        AnalogParams {
            vref: 3.3,
            resolution_bits: 12,
            oversample: 16,
            settle_us: 50,
            start_voltage: 0.5,
            scale: 250.0,
        }
    }
}

/// Outbound bus send policy.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct BusParams {
    /// Attempts per outbound message before reporting a soft failure.
    pub retry_budget: u32,
    /// Fixed delay between successive outbound sends, in milliseconds.
    pub send_delay_ms: u64,
}

impl BusParams {
    /// Delay inserted between successive outbound sends.
    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }
}

impl Default for BusParams {
    fn default() -> Self {
        BusParams {
            retry_budget: 10,
            send_delay_ms: 2,
        }
    }
}

/// Complete measuring-node configuration, constructed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    /// Sweep acquisition geometry.
    pub sweep: SweepParams,
    /// Threshold curve parameters.
    pub threshold: ThresholdParams,
    /// Temporal averaging configuration.
    pub averaging: AveragingParams,
    /// Outbound bus send policy.
    pub bus: BusParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_axis_matches_hand_computation() {
        let params = SweepParams {
            start_point: 100,
            num_points: 4,
            step_length: 2,
            sweeps_per_frame: 1,
            rf_factor: 1.0,
            divisor_base: 1600.0,
        };

        // rf_step = 0.0025, so d[i] = i * 0.005 + 0.25
        assert!((params.distance_at(0) - 0.25).abs() < 1e-6);
        assert!((params.distance_at(3) - 0.265).abs() < 1e-6);
        assert_eq!(params.expected_data_length(), 4);
    }

    #[test]
    fn analog_full_scale() {
        let params = AnalogParams {
            resolution_bits: 12,
            ..AnalogParams::default()
        };
        assert_eq!(params.full_scale(), 4095.0);
    }
}
