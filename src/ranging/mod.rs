// SPDX-License-Identifier: Apache-2.0

//! Range measurement pipeline.
//!
//! One cycle runs amplitude extraction, threshold-crossing estimation,
//! lookup-table correction and temporal averaging in sequence on the main
//! loop task. The pipeline owns the only cross-cycle state on the measuring
//! node, the averaging history buffer.

/// Bounded temporal averaging of the calibrated range
pub mod averaging;

/// Lookup-table distance correction
pub mod correction;

/// Sweep data and amplitude extraction
pub mod sweep;

/// Threshold curve and crossing estimator
pub mod threshold;

use crate::config::RangeConfig;
use averaging::TemporalAverager;
use correction::DistanceCorrector;
use std::fmt;
use sweep::Sweep;
use threshold::{first_crossing, ProcessedRecord, ThresholdCurve};

/// Errors produced by the measurement pipeline.
#[derive(Debug)]
pub enum RangingError {
    /// Sweep length does not match `num_points * sweeps_per_frame`.
    ///
    /// A configuration mismatch between front-end and node, not a transient
    /// condition; the cycle yields no detection and the loop continues.
    SweepLength {
        /// Samples the configuration requires.
        expected: usize,
        /// Samples the front-end delivered.
        actual: usize,
    },
    /// Threshold curve breakpoints are not strictly increasing.
    Breakpoints([f32; 4]),
}

impl std::error::Error for RangingError {}

impl fmt::Display for RangingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RangingError::SweepLength { expected, actual } => {
                write!(f, "sweep length {} does not match expected {}", actual, expected)
            }
            RangingError::Breakpoints(breakpoints) => {
                write!(f, "threshold breakpoints not increasing: {:?}", breakpoints)
            }
        }
    }
}

/// Result of one measurement cycle.
#[derive(Debug)]
pub struct CycleOutput {
    /// Processed record for telemetry; the zero record means no detection.
    pub record: ProcessedRecord,
    /// Smoothed calibrated distance in millimeters, when a detection exists.
    pub smoothed_mm: Option<f64>,
}

/// Per-cycle measurement pipeline for the measuring node.
pub struct RangePipeline {
    config: RangeConfig,
    curve: ThresholdCurve,
    corrector: DistanceCorrector,
    averager: TemporalAverager,
}

impl RangePipeline {
    /// Builds the pipeline from the node configuration and corrector.
    pub fn new(config: &RangeConfig, corrector: DistanceCorrector) -> Result<RangePipeline, RangingError> {
        Ok(RangePipeline {
            config: *config,
            curve: ThresholdCurve::new(&config.threshold)?,
            corrector,
            averager: TemporalAverager::new(&config.averaging),
        })
    }

    /// Processes one sweep into a telemetry record and smoothed range.
    ///
    /// No detection (including a crossing at sample 0) produces the zero
    /// sentinel record and leaves the averaging history untouched; a zero
    /// record is "no new estimate", never a zero-range reading.
    pub fn process(&mut self, sweep: &Sweep) -> Result<CycleOutput, RangingError> {
        let profile = sweep::extract_amplitudes(sweep, &self.config.sweep)?;

        let crossing = match first_crossing(&profile, &self.curve) {
            Some(crossing) => crossing,
            None => {
                return Ok(CycleOutput {
                    record: ProcessedRecord::none(),
                    smoothed_mm: None,
                })
            }
        };

        let raw_mm = crossing.selected as f64 * 1000.0;
        let corrected_mm = self.corrector.correct(raw_mm);
        let record = ProcessedRecord::from_crossing(&profile, &crossing, corrected_mm);
        let smoothed_mm = self.averager.push(corrected_mm);

        Ok(CycleOutput {
            record,
            smoothed_mm: Some(smoothed_mm),
        })
    }
}
