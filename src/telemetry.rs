// SPDX-License-Identifier: Apache-2.0

//! Bus telemetry protocol and serial framing.
//!
//! The gateway is a protocol translator, not a pass-through: inbound bus
//! messages are dispatched on their numeric identifier into typed records,
//! then re-encoded into an outbound byte-framed protocol whose type codes
//! are an independent numbering space. Multi-byte fields are big-endian on
//! both sides.

use log::trace;
use std::fmt;

/// Start marker of every outbound serial frame.
pub const FRAME_START: u8 = 0x7E;

/// Bus identifier of the range telemetry message.
pub const RANGE_ID: u32 = 0x13;
/// Bus identifier of the amplitude telemetry message.
pub const AMPLITUDE_ID: u32 = 0x14;
/// Bus identifier of the error code/count diagnostic.
pub const ERROR_CODE_ID: u32 = 0x600;
/// Bus identifier of the error timestamp diagnostic.
pub const ERROR_TIMESTAMP_ID: u32 = 0x601;
/// Bus identifier of the error statistics diagnostic.
pub const ERROR_STATS_ID: u32 = 0x602;
/// Bus identifier of the error history chunk diagnostic.
pub const ERROR_HISTORY_ID: u32 = 0x603;
/// Bus identifier of the performance timing message.
pub const PERFORMANCE_ID: u32 = 0x700;

/// One inbound unit on the internal bus, keyed by numeric identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusMessage {
    /// 32-bit message identifier.
    pub id: u32,
    /// 8-byte payload, big-endian multi-byte fields.
    pub data: [u8; 8],
}

/// Telemetry decoded from one bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryRecord {
    /// Calibrated range measurement with its normalization context.
    Range {
        /// Smoothed distance in millimeters.
        distance_mm: u32,
        /// Temperature divisor used for the sweep.
        divisor: u16,
        /// Sensor temperature in device units.
        temperature: i16,
    },
    /// Sweep amplitude diagnostics.
    Amplitude {
        /// Running maximum amplitude of the sweep.
        max_amplitude: u32,
        /// Amplitude at the first threshold crossing.
        first_threshold_y: u32,
    },
    /// Diagnostic: error code and occurrence count.
    ErrorCode {
        /// Reported error code.
        error_code: u32,
        /// Occurrences of the code.
        error_count: u32,
    },
    /// Diagnostic: timestamp of the last error.
    ErrorTimestamp {
        /// Device timestamp of the error.
        timestamp: u32,
    },
    /// Diagnostic: aggregate error statistics.
    ErrorStats {
        /// Total errors since boot.
        total_errors: u32,
        /// Most recent error code.
        last_error: u32,
    },
    /// Diagnostic: chunk of the rolling error history.
    ErrorHistory {
        /// Four history slots carried by this chunk.
        errors: [u8; 4],
        /// Index of the chunk in the history window.
        chunk_index: u8,
    },
    /// Performance timing for one instrumented section.
    Performance {
        /// Identifier of the instrumented timer.
        timer_id: u8,
        /// Average duration in microseconds.
        avg_us: u16,
        /// Maximum duration in microseconds.
        max_us: u16,
        /// Minimum duration in microseconds.
        min_us: u16,
        /// Samples in the aggregate.
        sample_count: u8,
    },
    /// Unrecognized identifier, forwarded verbatim. Not an error.
    Unknown {
        /// The raw 32-bit identifier.
        id: u32,
    },
}

fn be_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

fn be_u16(data: &[u8]) -> u16 {
    u16::from_be_bytes([data[0], data[1]])
}

/// Decodes one bus message into a typed record.
///
/// Dispatch is on the message identifier; unrecognized identifiers decode
/// to [`TelemetryRecord::Unknown`] so the gateway can forward them.
pub fn decode(msg: &BusMessage) -> TelemetryRecord {
    let data = &msg.data;

    match msg.id {
        RANGE_ID => TelemetryRecord::Range {
            distance_mm: be_u32(&data[0..4]),
            divisor: be_u16(&data[4..6]),
            temperature: be_u16(&data[6..8]) as i16,
        },
        AMPLITUDE_ID => TelemetryRecord::Amplitude {
            max_amplitude: be_u32(&data[0..4]),
            first_threshold_y: be_u32(&data[4..8]),
        },
        ERROR_CODE_ID => TelemetryRecord::ErrorCode {
            error_code: be_u32(&data[0..4]),
            error_count: be_u32(&data[4..8]),
        },
        ERROR_TIMESTAMP_ID => TelemetryRecord::ErrorTimestamp {
            timestamp: be_u32(&data[0..4]),
        },
        ERROR_STATS_ID => TelemetryRecord::ErrorStats {
            total_errors: be_u32(&data[0..4]),
            last_error: be_u32(&data[4..8]),
        },
        ERROR_HISTORY_ID => TelemetryRecord::ErrorHistory {
            errors: [data[0], data[1], data[2], data[3]],
            chunk_index: data[4],
        },
        PERFORMANCE_ID => TelemetryRecord::Performance {
            timer_id: data[0],
            avg_us: be_u16(&data[1..3]),
            max_us: be_u16(&data[3..5]),
            min_us: be_u16(&data[5..7]),
            sample_count: data[7],
        },
        id => TelemetryRecord::Unknown { id },
    }
}

impl TelemetryRecord {
    /// Outbound frame type code.
    ///
    /// These are a distinct numbering space from the inbound identifiers.
    pub fn frame_type(&self) -> u8 {
        match self {
            TelemetryRecord::Range { .. } => 0x10,
            TelemetryRecord::Amplitude { .. } => 0x11,
            TelemetryRecord::ErrorCode { .. } => 0xA0,
            TelemetryRecord::ErrorTimestamp { .. } => 0xA1,
            TelemetryRecord::ErrorStats { .. } => 0xA2,
            TelemetryRecord::ErrorHistory { .. } => 0xA3,
            TelemetryRecord::Performance { .. } => 0xB0,
            TelemetryRecord::Unknown { .. } => 0xAF,
        }
    }

    fn payload(&self, position: Option<i32>) -> Vec<u8> {
        let mut payload = Vec::with_capacity(12);

        match self {
            TelemetryRecord::Range {
                distance_mm,
                divisor,
                temperature,
            } => {
                payload.extend_from_slice(&distance_mm.to_be_bytes());
                payload.extend_from_slice(&divisor.to_be_bytes());
                payload.extend_from_slice(&temperature.to_be_bytes());
                // Local reference position rides next to the bus-reported
                // range so a consumer can compare them directly.
                if let Some(position) = position {
                    payload.extend_from_slice(&position.to_be_bytes());
                }
            }
            TelemetryRecord::Amplitude {
                max_amplitude,
                first_threshold_y,
            } => {
                payload.extend_from_slice(&max_amplitude.to_be_bytes());
                payload.extend_from_slice(&first_threshold_y.to_be_bytes());
            }
            TelemetryRecord::ErrorCode {
                error_code,
                error_count,
            } => {
                payload.extend_from_slice(&error_code.to_be_bytes());
                payload.extend_from_slice(&error_count.to_be_bytes());
            }
            TelemetryRecord::ErrorTimestamp { timestamp } => {
                payload.extend_from_slice(&timestamp.to_be_bytes());
            }
            TelemetryRecord::ErrorStats {
                total_errors,
                last_error,
            } => {
                payload.extend_from_slice(&total_errors.to_be_bytes());
                payload.extend_from_slice(&last_error.to_be_bytes());
            }
            TelemetryRecord::ErrorHistory {
                errors,
                chunk_index,
            } => {
                payload.extend_from_slice(errors);
                payload.push(*chunk_index);
            }
            TelemetryRecord::Performance {
                timer_id,
                avg_us,
                max_us,
                min_us,
                sample_count,
            } => {
                payload.push(*timer_id);
                payload.extend_from_slice(&avg_us.to_be_bytes());
                payload.extend_from_slice(&max_us.to_be_bytes());
                payload.extend_from_slice(&min_us.to_be_bytes());
                payload.push(*sample_count);
            }
            TelemetryRecord::Unknown { id } => {
                payload.extend_from_slice(&id.to_be_bytes());
            }
        }

        payload
    }
}

/// Bytewise XOR of type, length and payload.
///
/// Detects any single-byte corruption; this is an integrity check, not a
/// cryptographic guarantee.
pub fn checksum(frame_type: u8, length: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(frame_type ^ length, |acc, byte| acc ^ byte)
}

/// Encodes one record into an outbound serial frame.
///
/// Layout: `[0x7E][type][length][payload...][checksum]`. The position, when
/// supplied, is appended to range payloads as a 4-byte big-endian integer.
/// Frames are constructed fresh per telemetry event and never persisted.
pub fn encode_frame(record: &TelemetryRecord, position: Option<i32>) -> Vec<u8> {
    let payload = record.payload(position);
    let frame_type = record.frame_type();
    let length = payload.len() as u8;

    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.push(FRAME_START);
    frame.push(frame_type);
    frame.push(length);
    frame.extend_from_slice(&payload);
    frame.push(checksum(frame_type, length, &payload));

    trace!("frame: {:02X?}", frame);
    frame
}

/// Serial frame validation errors.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameError {
    /// First byte is not the 0x7E start marker.
    StartMarker(u8),
    /// Frame shorter than its declared length.
    UnexpectedEndOfSlice(usize),
    /// Checksum mismatch, actual vs computed.
    Checksum(u8, u8),
}

impl std::error::Error for FrameError {}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FrameError::StartMarker(byte) => {
                write!(f, "unexpected start marker: 0x{:02X}", byte)
            }
            FrameError::UnexpectedEndOfSlice(size) => {
                write!(f, "unexpected end of slice: {}", size)
            }
            FrameError::Checksum(actual, computed) => {
                write!(f, "checksum 0x{:02X} does not match 0x{:02X}", actual, computed)
            }
        }
    }
}

/// A slice containing one validated outbound frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FrameSlice<'a> {
    slice: &'a [u8],
}

impl<'a> FrameSlice<'a> {
    /// Minimum length of a frame: marker, type, length, checksum.
    pub const MIN_LEN: usize = 4;

    /// Validates marker, declared length and checksum over the slice.
    pub fn from_slice(slice: &'a [u8]) -> Result<FrameSlice<'a>, FrameError> {
        if slice.len() < Self::MIN_LEN {
            return Err(FrameError::UnexpectedEndOfSlice(slice.len()));
        }
        if slice[0] != FRAME_START {
            return Err(FrameError::StartMarker(slice[0]));
        }

        let payload_len = slice[2] as usize;
        if slice.len() < Self::MIN_LEN + payload_len {
            return Err(FrameError::UnexpectedEndOfSlice(slice.len()));
        }

        let payload = &slice[3..3 + payload_len];
        let computed = checksum(slice[1], slice[2], payload);
        let actual = slice[3 + payload_len];
        if actual != computed {
            return Err(FrameError::Checksum(actual, computed));
        }

        Ok(FrameSlice {
            slice: &slice[..Self::MIN_LEN + payload_len],
        })
    }

    /// Outbound type code of the frame.
    pub fn frame_type(&self) -> u8 {
        self.slice[1]
    }

    /// Validated payload bytes.
    pub fn payload(&self) -> &'a [u8] {
        &self.slice[3..self.slice.len() - 1]
    }
}

/// Packs a range record into its outbound bus message.
pub fn range_message(distance_mm: u32, divisor: u16, temperature: i16) -> BusMessage {
    let mut data = [0u8; 8];
    data[0..4].copy_from_slice(&distance_mm.to_be_bytes());
    data[4..6].copy_from_slice(&divisor.to_be_bytes());
    data[6..8].copy_from_slice(&temperature.to_be_bytes());
    BusMessage { id: RANGE_ID, data }
}

/// Packs an amplitude record into its outbound bus message.
pub fn amplitude_message(max_amplitude: u32, first_threshold_y: u32) -> BusMessage {
    let mut data = [0u8; 8];
    data[0..4].copy_from_slice(&max_amplitude.to_be_bytes());
    data[4..8].copy_from_slice(&first_threshold_y.to_be_bytes());
    BusMessage { id: AMPLITUDE_ID, data }
}

/// Packs an error diagnostic into its outbound bus message.
///
/// Fatal conditions are reported on this channel before the process halts.
pub fn error_message(error_code: u32, error_count: u32) -> BusMessage {
    let mut data = [0u8; 8];
    data[0..4].copy_from_slice(&error_code.to_be_bytes());
    data[4..8].copy_from_slice(&error_count.to_be_bytes());
    BusMessage { id: ERROR_CODE_ID, data }
}
