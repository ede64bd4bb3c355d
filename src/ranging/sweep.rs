// SPDX-License-Identifier: Apache-2.0

use crate::config::SweepParams;
use crate::ranging::RangingError;
use num::Complex;

/// One measurement cycle's worth of complex samples from the front-end.
///
/// Read-only to the processing pipeline. The temperature rides along because
/// the amplitude normalization divisor depends on it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sweep {
    /// Complex (I, Q) samples across the distance bins.
    pub samples: Vec<Complex<i16>>,
    /// Sensor temperature in device units.
    pub temperature: i16,
}

/// Per-sample amplitudes with their aligned distance axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AmplitudeProfile {
    /// Normalized amplitude per distance bin.
    pub amplitudes: Vec<u32>,
    /// Distance of each bin in meters.
    pub distances: Vec<f32>,
    /// Running maximum across the sweep.
    pub max_amplitude: u32,
    /// Temperature-dependent divisor applied to every sample.
    pub divisor: u16,
}

/// Temperature-dependent amplitude normalization divisor.
///
/// `max(1, round(-15 * temperature + base))`, clamped so a hot sensor can
/// never divide by zero or a negative value.
pub fn amplitude_divisor(temperature: i16, divisor_base: f32) -> u16 {
    let raw = -15.0 * temperature as f32 + divisor_base;
    if raw < 1.0 {
        1
    } else {
        raw.round() as u16
    }
}

/// Converts a sweep into an amplitude profile.
///
/// The squared magnitude of each sample is divided by the temperature
/// divisor and paired with its distance bin. Rejects sweeps whose length
/// does not match `num_points * sweeps_per_frame`; this is a configuration
/// mismatch between the front-end and the node, not a transient condition.
pub fn extract_amplitudes(
    sweep: &Sweep,
    params: &SweepParams,
) -> Result<AmplitudeProfile, RangingError> {
    let expected = params.expected_data_length();
    if sweep.samples.len() != expected {
        return Err(RangingError::SweepLength {
            expected,
            actual: sweep.samples.len(),
        });
    }

    let divisor = amplitude_divisor(sweep.temperature, params.divisor_base);

    let mut amplitudes = Vec::with_capacity(params.num_points);
    let mut distances = Vec::with_capacity(params.num_points);
    let mut max_amplitude = 0u32;

    for (index, sample) in sweep.samples.iter().take(params.num_points).enumerate() {
        let power = sample.re as i64 * sample.re as i64 + sample.im as i64 * sample.im as i64;
        let amplitude = (power as u64 / divisor as u64) as u32;

        if amplitude > max_amplitude {
            max_amplitude = amplitude;
        }

        amplitudes.push(amplitude);
        distances.push(params.distance_at(index));
    }

    Ok(AmplitudeProfile {
        amplitudes,
        distances,
        max_amplitude,
        divisor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> SweepParams {
        SweepParams {
            start_point: 100,
            num_points: 4,
            step_length: 2,
            sweeps_per_frame: 1,
            rf_factor: 1.0,
            divisor_base: 1600.0,
        }
    }

    #[test]
    fn divisor_follows_temperature() {
        // -15 * 25 + 1600 = 1225
        assert_eq!(amplitude_divisor(25, 1600.0), 1225);
        // -15 * 0 + 1600 = 1600
        assert_eq!(amplitude_divisor(0, 1600.0), 1600);
        // hot sensor clamps to 1 instead of going negative
        assert_eq!(amplitude_divisor(120, 1600.0), 1);
    }

    #[test]
    fn amplitudes_and_max_from_known_samples() {
        let sweep = Sweep {
            samples: vec![
                Complex::new(10, 0),
                Complex::new(0, 20),
                Complex::new(30, 40),
                Complex::new(0, 0),
            ],
            temperature: 106, // divisor = -15 * 106 + 1600 = 10
        };

        let profile = extract_amplitudes(&sweep, &test_params()).unwrap();

        assert_eq!(profile.divisor, 10);
        assert_eq!(profile.amplitudes, vec![10, 40, 250, 0]);
        assert_eq!(profile.max_amplitude, 250);
        assert!((profile.distances[0] - 0.25).abs() < 1e-6);
        assert!((profile.distances[1] - 0.255).abs() < 1e-6);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let sweep = Sweep {
            samples: vec![Complex::new(1, 1); 3],
            temperature: 25,
        };

        let err = extract_amplitudes(&sweep, &test_params()).unwrap_err();
        match err {
            RangingError::SweepLength { expected, actual } => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn full_scale_sample_does_not_overflow() {
        let params = SweepParams {
            num_points: 1,
            ..test_params()
        };
        let sweep = Sweep {
            samples: vec![Complex::new(i16::MIN, i16::MIN)],
            temperature: 120, // divisor clamps to 1
        };

        let profile = extract_amplitudes(&sweep, &params).unwrap();
        assert_eq!(profile.amplitudes[0], 2_147_483_648);
    }
}
