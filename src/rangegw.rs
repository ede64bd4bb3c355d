use clap::{Parser, ValueEnum};
use log::{debug, error, info, warn};
use rangepub::{
    bus,
    config::AnalogParams,
    position::{
        AnalogPositionSensor, EncoderHandle, PositionSensor, QuadratureEncoder, SysfsAdc,
    },
    serial::SerialSink,
    telemetry::{self, TelemetryRecord},
};
use socketcan::tokio::CanSocket;
use std::{fs, path::PathBuf, time::Duration};

/// Reference position sensor fitted to this node.
#[derive(Copy, Clone, Debug, ValueEnum)]
enum SensorVariant {
    /// Oversampled analog string potentiometer.
    Analog,
    /// Interrupt-driven quadrature encoder.
    Quadrature,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// can device connected to the telemetry bus
    #[arg(long, default_value = "can0")]
    can: String,

    /// Serial device for the outbound frame link.
    #[arg(long, env, default_value = "/dev/ttyUSB0")]
    serial_port: String,

    /// Serial baud rate.
    #[arg(long, env, default_value = "250000")]
    baud: u32,

    /// Position sensor variant fitted to this node.
    #[arg(long, env, default_value = "analog")]
    position_sensor: SensorVariant,

    /// Sysfs ADC attribute of the string-potentiometer channel.
    #[arg(long, env, default_value = "/sys/bus/iio/devices/iio:device0/in_voltage0_raw")]
    pot_adc: PathBuf,

    /// Sysfs ADC attribute of the current/voltage telemetry channel.
    #[arg(long, env)]
    aux_adc: Option<PathBuf>,

    /// ADC reference voltage in volts.
    #[arg(long, env, default_value = "3.3")]
    vref: f64,

    /// ADC resolution in bits.
    #[arg(long, env, default_value = "12")]
    resolution_bits: u8,

    /// Raw ADC samples per position reading.
    #[arg(long, env, default_value = "16")]
    oversample: u32,

    /// Settling delay between raw ADC samples in microseconds.
    #[arg(long, env, default_value = "50")]
    settle_us: u64,

    /// Zero-position voltage of the string-potentiometer channel.
    #[arg(long, env, default_value = "0.5")]
    pot_start_voltage: f64,

    /// Zero-position voltage of the current/voltage channel.
    #[arg(long, env, default_value = "0.25")]
    aux_start_voltage: f64,

    /// Millimeters per volt above the start voltage.
    #[arg(long, env, default_value = "250.0")]
    scale: f64,

    /// Sysfs value file of encoder channel A.
    #[arg(long, env, default_value = "/sys/class/gpio/gpio17/value")]
    encoder_a: PathBuf,

    /// Sysfs value file of encoder channel B.
    #[arg(long, env, default_value = "/sys/class/gpio/gpio27/value")]
    encoder_b: PathBuf,

    /// Encoder channel poll interval in microseconds.
    #[arg(long, env, default_value = "500")]
    encoder_poll_us: u64,
}

impl Args {
    fn analog_params(&self, start_voltage: f64) -> AnalogParams {
        AnalogParams {
            vref: self.vref,
            resolution_bits: self.resolution_bits,
            oversample: self.oversample,
            settle_us: self.settle_us,
            start_voltage,
            scale: self.scale,
        }
    }
}

fn read_gpio(path: &PathBuf) -> bool {
    fs::read_to_string(path)
        .map(|raw| raw.trim() == "1")
        .unwrap_or(false)
}

/// Polls encoder channel A and feeds transitions into the counter handle.
///
/// A stand-in for the edge-triggered interrupt on microcontroller ports;
/// the decode itself is identical, one call per channel-A transition with
/// both channel states sampled together.
async fn watch_encoder(handle: EncoderHandle, channel_a: PathBuf, channel_b: PathBuf, poll: Duration) {
    let mut last_a = read_gpio(&channel_a);

    loop {
        tokio::time::sleep(poll).await;

        let a = read_gpio(&channel_a);
        if a != last_a {
            last_a = a;
            handle.on_channel_a_edge(a, read_gpio(&channel_b));
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    debug!("opening can interface {}", args.can);
    let sock = CanSocket::open(&args.can)?;

    debug!("opening serial sink {} at {} baud", args.serial_port, args.baud);
    let mut sink = SerialSink::open(&args.serial_port, args.baud, Duration::from_millis(100))?;

    let mut position: Box<dyn PositionSensor> = match args.position_sensor {
        SensorVariant::Analog => Box::new(AnalogPositionSensor::new(
            SysfsAdc::new(&args.pot_adc),
            args.analog_params(args.pot_start_voltage),
        )),
        SensorVariant::Quadrature => {
            let encoder = QuadratureEncoder::new();
            tokio::spawn(watch_encoder(
                encoder.handle(),
                args.encoder_a.clone(),
                args.encoder_b.clone(),
                Duration::from_micros(args.encoder_poll_us),
            ));
            Box::new(encoder)
        }
    };

    // Independent current/voltage channel, same conversion but its own
    // start-voltage calibration.
    let mut aux = args.aux_adc.as_ref().map(|path| {
        AnalogPositionSensor::new(SysfsAdc::new(path), args.analog_params(args.aux_start_voltage))
    });

    let (tx, rx) = kanal::bounded_async::<telemetry::BusMessage>(16);

    tokio::spawn(async move {
        loop {
            match bus::read_message(&sock).await {
                Ok(msg) => {
                    if tx.send(msg).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    error!("canbus error: {}", err);
                    return;
                }
            }
        }
    });

    info!("relaying bus telemetry to {}", args.serial_port);

    loop {
        let msg = rx.recv().await?;
        let record = telemetry::decode(&msg);

        let local_position = match record {
            TelemetryRecord::Range { .. } => {
                if let Some(aux) = aux.as_mut() {
                    match aux.read() {
                        Ok(reading) => debug!("aux channel: {}", reading),
                        Err(err) => warn!("aux channel read failed: {}", err),
                    }
                }

                match position.read() {
                    Ok(reading) => Some(reading.as_wire()),
                    Err(err) => {
                        warn!("position read failed: {}", err);
                        None
                    }
                }
            }
            _ => None,
        };

        if let TelemetryRecord::Unknown { id } = record {
            debug!("forwarding unrecognized bus id 0x{:X}", id);
        }

        let frame = telemetry::encode_frame(&record, local_position);
        if let Err(err) = sink.write_frame(&frame) {
            // Soft failure: the next cycle's data supersedes this frame.
            warn!("serial write failed: {}", err);
        }
    }
}
