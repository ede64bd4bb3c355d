// SPDX-License-Identifier: Apache-2.0

//! Radar front-end capability interface.
//!
//! The vendor acquisition stack is an external collaborator: the node only
//! depends on this contract. A deterministic simulated front-end ships for
//! development and tests; hardware integrations implement the trait out of
//! crate.

use crate::config::SweepParams;
use crate::ranging::sweep::{amplitude_divisor, Sweep};
use log::debug;
use num::Complex;
use std::fmt;

/// Front-end failures.
///
/// Calibration failures are transient and retried once by [`recalibrate`];
/// everything else is fatal for the process because the hardware state is
/// unknown afterwards.
#[derive(Debug)]
pub enum FrontEndError {
    /// The sensor has not been calibrated and prepared.
    NotPrepared,
    /// Calibration or prepare sequence failed.
    Calibration(String),
    /// Measurement or readout failed.
    Acquisition(String),
    /// The sensor-ready signal did not arrive within the bounded wait.
    Timeout,
}

impl std::error::Error for FrontEndError {}

impl fmt::Display for FrontEndError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FrontEndError::NotPrepared => write!(f, "sensor not calibrated and prepared"),
            FrontEndError::Calibration(err) => write!(f, "calibration failed: {}", err),
            FrontEndError::Acquisition(err) => write!(f, "acquisition failed: {}", err),
            FrontEndError::Timeout => write!(f, "sensor ready timeout"),
        }
    }
}

/// One acquisition result.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// The acquired sweep with its temperature reading.
    pub sweep: Sweep,
    /// The current calibration is no longer valid for the temperature.
    pub calibration_needed: bool,
}

/// Capability contract of the external radar front-end.
pub trait RadarFrontEnd {
    /// Applies the sweep configuration to the sensor.
    fn configure(&mut self, params: &SweepParams) -> Result<(), FrontEndError>;

    /// Runs the calibration and prepare sequence.
    fn calibrate_and_prepare(&mut self) -> Result<(), FrontEndError>;

    /// Performs one measurement, blocking with bounded wait.
    fn measure(&mut self) -> Result<Measurement, FrontEndError>;
}

/// Recalibration sequence with a single retry.
///
/// Random disturbances can fail a calibration; one retry covers the
/// transient case before the failure is treated as fatal.
pub fn recalibrate(frontend: &mut dyn RadarFrontEnd) -> Result<(), FrontEndError> {
    match frontend.calibrate_and_prepare() {
        Ok(()) => Ok(()),
        Err(err) => {
            debug!("calibration attempt failed, retrying once: {}", err);
            frontend.calibrate_and_prepare()
        }
    }
}

/// Deterministic simulated front-end.
///
/// Produces a synthetic reflection: amplitudes sit at `noise_floor` before
/// the target distance and jump to `target_amplitude` from the target
/// onwards, so the threshold estimator locks to the configured distance.
/// Optionally raises `calibration_needed` on a fixed cycle interval to
/// exercise the recalibration path.
pub struct SimulatedFrontEnd {
    params: SweepParams,
    target_m: f32,
    noise_floor: u32,
    target_amplitude: u32,
    temperature: i16,
    recalibrate_every: Option<u32>,
    cycle: u32,
    prepared: bool,
}

impl SimulatedFrontEnd {
    /// Simulated reflection at `target_m` meters.
    pub fn new(params: &SweepParams, target_m: f32, temperature: i16) -> SimulatedFrontEnd {
        SimulatedFrontEnd {
            params: *params,
            target_m,
            noise_floor: 5,
            target_amplitude: 100_000,
            temperature,
            recalibrate_every: None,
            cycle: 0,
            prepared: false,
        }
    }

    /// Raise the recalibration flag every `cycles` measurements.
    pub fn with_recalibration_every(mut self, cycles: u32) -> SimulatedFrontEnd {
        self.recalibrate_every = Some(cycles);
        self
    }

    fn sample_for_amplitude(&self, amplitude: u32, divisor: u16) -> Complex<i16> {
        // Invert the extractor's |s|^2 / divisor so the pipeline sees the
        // requested amplitude after normalization.
        let magnitude = ((amplitude as f64 * divisor as f64).sqrt()).round();
        Complex::new(magnitude.min(i16::MAX as f64) as i16, 0)
    }
}

impl RadarFrontEnd for SimulatedFrontEnd {
    fn configure(&mut self, params: &SweepParams) -> Result<(), FrontEndError> {
        self.params = *params;
        Ok(())
    }

    fn calibrate_and_prepare(&mut self) -> Result<(), FrontEndError> {
        self.prepared = true;
        Ok(())
    }

    fn measure(&mut self) -> Result<Measurement, FrontEndError> {
        if !self.prepared {
            return Err(FrontEndError::NotPrepared);
        }

        self.cycle += 1;
        let calibration_needed = match self.recalibrate_every {
            Some(cycles) => self.cycle % cycles == 0,
            None => false,
        };

        let divisor = amplitude_divisor(self.temperature, self.params.divisor_base);
        let samples = (0..self.params.expected_data_length())
            .map(|index| {
                let amplitude = if self.params.distance_at(index % self.params.num_points)
                    >= self.target_m
                {
                    self.target_amplitude
                } else {
                    self.noise_floor
                };
                self.sample_for_amplitude(amplitude, divisor)
            })
            .collect();

        Ok(Measurement {
            sweep: Sweep {
                samples,
                temperature: self.temperature,
            },
            calibration_needed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RangeConfig, ThresholdParams};
    use crate::ranging::correction::DistanceCorrector;
    use crate::ranging::RangePipeline;

    #[test]
    fn measure_requires_prepare() {
        let params = SweepParams::default();
        let mut frontend = SimulatedFrontEnd::new(&params, 0.5, 25);

        assert!(matches!(
            frontend.measure(),
            Err(FrontEndError::NotPrepared)
        ));

        frontend.calibrate_and_prepare().unwrap();
        assert!(frontend.measure().is_ok());
    }

    #[test]
    fn recalibration_flag_follows_interval() {
        let params = SweepParams::default();
        let mut frontend = SimulatedFrontEnd::new(&params, 0.5, 25).with_recalibration_every(3);
        frontend.calibrate_and_prepare().unwrap();

        let flags: Vec<bool> = (0..6)
            .map(|_| frontend.measure().unwrap().calibration_needed)
            .collect();
        assert_eq!(flags, [false, false, true, false, false, true]);
    }

    #[test]
    fn recalibrate_retries_once() {
        struct Flaky {
            failures_left: u32,
            attempts: u32,
        }

        impl RadarFrontEnd for Flaky {
            fn configure(&mut self, _params: &SweepParams) -> Result<(), FrontEndError> {
                Ok(())
            }

            fn calibrate_and_prepare(&mut self) -> Result<(), FrontEndError> {
                self.attempts += 1;
                if self.failures_left > 0 {
                    self.failures_left -= 1;
                    return Err(FrontEndError::Calibration("disturbance".into()));
                }
                Ok(())
            }

            fn measure(&mut self) -> Result<Measurement, FrontEndError> {
                Err(FrontEndError::NotPrepared)
            }
        }

        let mut transient = Flaky {
            failures_left: 1,
            attempts: 0,
        };
        assert!(recalibrate(&mut transient).is_ok());
        assert_eq!(transient.attempts, 2);

        let mut persistent = Flaky {
            failures_left: 2,
            attempts: 0,
        };
        assert!(recalibrate(&mut persistent).is_err());
        assert_eq!(persistent.attempts, 2);
    }

    #[test]
    fn simulated_reflection_is_found_by_the_pipeline() {
        let config = RangeConfig {
            threshold: ThresholdParams {
                breakpoints: [0.0, 2.0, 3.0, 4.0],
                slopes: [0.0, 0.0, 0.0],
                intercepts: [1000.0, 0.0, 0.0],
            },
            ..RangeConfig::default()
        };

        let mut frontend = SimulatedFrontEnd::new(&config.sweep, 0.5, 25);
        frontend.calibrate_and_prepare().unwrap();

        let mut pipeline = RangePipeline::new(&config, DistanceCorrector::disabled()).unwrap();
        let measurement = frontend.measure().unwrap();
        let output = pipeline.process(&measurement.sweep).unwrap();

        let smoothed = output.smoothed_mm.expect("target must be detected");
        // The edge lands within one distance bin of the simulated target.
        let bin_mm = (config.sweep.rf_step() * config.sweep.step_length as f32 * 1000.0) as f64;
        assert!(
            (smoothed - 500.0).abs() <= bin_mm + 0.5,
            "smoothed {} mm too far from target",
            smoothed
        );
    }
}
