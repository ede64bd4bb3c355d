// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use rangepub::{
    bus,
    config::{
        AverageMode, AveragingParams, BusParams, RangeConfig, SweepParams, ThresholdParams,
    },
    frontend::{recalibrate, FrontEndError, RadarFrontEnd, SimulatedFrontEnd},
    ranging::{correction::CorrectionTable, correction::DistanceCorrector, RangePipeline},
    telemetry,
};
use socketcan::tokio::CanSocket;
use std::{
    path::PathBuf,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt as _, Layer as _, Registry};

/// Temporal averaging applied to the calibrated range.
#[derive(Copy, Clone, Debug, ValueEnum)]
enum Averaging {
    Off = 0,
    Simple = 1,
    Weighted = 2,
}

impl From<Averaging> for AverageMode {
    fn from(mode: Averaging) -> AverageMode {
        match mode {
            Averaging::Off => AverageMode::Off,
            Averaging::Simple => AverageMode::Simple,
            Averaging::Weighted => AverageMode::Weighted,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// can device connected to the telemetry bus
    #[arg(long, default_value = "can0")]
    can: String,

    /// First distance point of the sweep, in base steps.
    #[arg(long, env, default_value = "80")]
    start_point: u32,

    /// Number of distance points per sweep.
    #[arg(long, env, default_value = "200")]
    num_points: usize,

    /// Distance step between samples, in base steps.
    #[arg(long, env, default_value = "2")]
    step_length: u32,

    /// Sweeps averaged into one frame by the front-end.
    #[arg(long, env, default_value = "1")]
    sweeps_per_frame: usize,

    /// RF scaling factor applied to the base step length.
    #[arg(long, env, default_value = "1.0")]
    rf_factor: f32,

    /// Base value of the temperature-dependent amplitude divisor.
    #[arg(long, env, default_value = "1600.0")]
    divisor_base: f32,

    /// Threshold curve breakpoints in meters, strictly increasing.
    #[arg(
        long,
        env,
        default_value = "0.10 0.35 0.70 1.10",
        value_delimiter = ' ',
        num_args = 4
    )]
    breakpoints: Vec<f32>,

    /// Threshold curve segment slopes.
    #[arg(
        long,
        env,
        default_value = "-4000 -1500 -500",
        value_delimiter = ' ',
        num_args = 3,
        allow_hyphen_values = true
    )]
    slopes: Vec<f32>,

    /// Threshold curve segment intercepts.
    #[arg(
        long,
        env,
        default_value = "2600 1725 1025",
        value_delimiter = ' ',
        num_args = 3,
        allow_hyphen_values = true
    )]
    intercepts: Vec<f32>,

    /// Temporal averaging mode.
    #[arg(long, env, default_value = "simple")]
    averaging: Averaging,

    /// History buffer capacity in samples.
    #[arg(long, env, default_value = "8")]
    history: usize,

    /// Starting weight for weighted averaging.
    #[arg(long, env, default_value = "1.0")]
    start_weight: f64,

    /// Per-step decay factor for weighted averaging.
    #[arg(long, env, default_value = "0.5")]
    weight_factor: f64,

    /// Error-correction table JSON resource.
    #[arg(long, env)]
    error_table: Option<PathBuf>,

    /// Position-distance table JSON resource.
    #[arg(long, env)]
    position_table: Option<PathBuf>,

    /// Attempts per outbound bus message.
    #[arg(long, env, default_value = "10")]
    retry_budget: u32,

    /// Delay between successive outbound sends in milliseconds.
    #[arg(long, env, default_value = "2")]
    send_delay_ms: u64,

    /// Measurement cycle rate in frames per second.
    #[arg(long, env, default_value = "10.0")]
    frame_rate: f64,

    /// Simulated reflection distance in meters.
    #[arg(long, env, default_value = "0.5")]
    target: f32,

    /// Simulated sensor temperature in device units.
    #[arg(long, env, default_value = "25")]
    temperature: i16,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    rust_log: LevelFilter,
}

impl From<&Args> for RangeConfig {
    fn from(args: &Args) -> RangeConfig {
        RangeConfig {
            sweep: SweepParams {
                start_point: args.start_point,
                num_points: args.num_points,
                step_length: args.step_length,
                sweeps_per_frame: args.sweeps_per_frame,
                rf_factor: args.rf_factor,
                divisor_base: args.divisor_base,
            },
            threshold: ThresholdParams {
                breakpoints: [
                    args.breakpoints[0],
                    args.breakpoints[1],
                    args.breakpoints[2],
                    args.breakpoints[3],
                ],
                slopes: [args.slopes[0], args.slopes[1], args.slopes[2]],
                intercepts: [args.intercepts[0], args.intercepts[1], args.intercepts[2]],
            },
            averaging: AveragingParams {
                mode: args.averaging.into(),
                capacity: args.history,
                start_weight: args.start_weight,
                factor: args.weight_factor,
            },
            bus: BusParams {
                retry_budget: args.retry_budget,
                send_delay_ms: args.send_delay_ms,
            },
        }
    }
}

fn diagnostic_code(err: &FrontEndError) -> u32 {
    match err {
        FrontEndError::NotPrepared => 1,
        FrontEndError::Calibration(_) => 2,
        FrontEndError::Acquisition(_) => 3,
        FrontEndError::Timeout => 4,
    }
}

fn load_table(path: &Option<PathBuf>) -> Result<Option<CorrectionTable>, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Some(CorrectionTable::from_json_file(path)?)),
        None => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let stdout_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(args.rust_log);
    let subscriber = Registry::default().with(stdout_log);
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
    tracing_log::LogTracer::init()?;

    let config = RangeConfig::from(&args);

    let error_table = load_table(&args.error_table)?;
    let position_table = load_table(&args.position_table)?;
    if error_table.is_none() && position_table.is_none() {
        warn!("no correction tables configured, publishing raw estimates");
    }
    let corrector = DistanceCorrector::new(error_table, position_table);

    let pipeline = RangePipeline::new(&config, corrector)?;
    let can = CanSocket::open(&args.can)?;

    let mut frontend = SimulatedFrontEnd::new(&config.sweep, args.target, args.temperature);
    frontend.configure(&config.sweep)?;
    recalibrate(&mut frontend)?;
    info!(
        "sensor calibrated: {} points from step {} at step length {}",
        config.sweep.num_points, config.sweep.start_point, config.sweep.step_length
    );

    let cycle_period = Duration::from_secs_f64(1.0 / args.frame_rate.max(0.1));
    run(can, config, pipeline, frontend, cycle_period).await
}

async fn run(
    can: CanSocket,
    config: RangeConfig,
    mut pipeline: RangePipeline,
    mut frontend: impl RadarFrontEnd,
    cycle_period: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut ticker = tokio::time::interval(cycle_period);

    loop {
        ticker.tick().await;
        let started = Instant::now();

        let measurement = match frontend.measure() {
            Ok(measurement) => measurement,
            Err(err) => {
                // Hardware state is unknown after an acquisition failure;
                // report on the diagnostic channel and halt rather than
                // retry blind.
                error!("front-end failure: {}", err);
                let diagnostic = telemetry::error_message(diagnostic_code(&err), 1);
                if let Err(send_err) = bus::send_with_retry(&can, &diagnostic, &config.bus).await {
                    warn!("diagnostic report lost: {}", send_err);
                }
                return Err(err.into());
            }
        };

        if measurement.calibration_needed {
            warn!("calibration no longer valid for the current temperature");
            if let Err(err) = recalibrate(&mut frontend) {
                error!("recalibration failed: {}", err);
                let diagnostic = telemetry::error_message(diagnostic_code(&err), 1);
                if let Err(send_err) = bus::send_with_retry(&can, &diagnostic, &config.bus).await {
                    warn!("diagnostic report lost: {}", send_err);
                }
                return Err(err.into());
            }
            info!("sensor recalibrated");
            continue;
        }

        let output = match pipeline.process(&measurement.sweep) {
            Ok(output) => output,
            Err(err) => {
                // Configuration mismatch: no detection this cycle, the
                // loop continues.
                warn!("skipping cycle: {}", err);
                continue;
            }
        };

        let record = output.record;
        let mut cycle_clean = true;

        let amplitude =
            telemetry::amplitude_message(record.max_amplitude, record.first_threshold_y);
        if let Err(err) = bus::send_with_retry(&can, &amplitude, &config.bus).await {
            warn!("amplitude telemetry lost: {}", err);
            cycle_clean = false;
        }
        tokio::time::sleep(config.bus.send_delay()).await;

        let distance_mm = output.smoothed_mm.map(|mm| mm.round() as u32).unwrap_or(0);
        let range = telemetry::range_message(distance_mm, record.divisor, measurement.sweep.temperature);
        if let Err(err) = bus::send_with_retry(&can, &range, &config.bus).await {
            warn!("range telemetry lost: {}", err);
            cycle_clean = false;
        }
        tokio::time::sleep(config.bus.send_delay()).await;

        if cycle_clean {
            debug!(
                "cycle: {} mm in {} us",
                distance_mm,
                started.elapsed().as_micros()
            );
        }
    }
}
