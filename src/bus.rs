// SPDX-License-Identifier: Apache-2.0

use crate::config::BusParams;
use crate::telemetry::BusMessage;
use log::{debug, trace};
use socketcan::{tokio::CanSocket, CanFrame, EmbeddedFrame, ExtendedId, Id as CanId, StandardId};
use std::{fmt, io};

/// Bus transport error types.
#[derive(Debug)]
pub enum Error {
    /// I/O error from underlying socket operations
    Io(io::Error),
    /// Identifier does not fit the CAN id spaces
    InvalidId(u32),
    /// Send retry budget exhausted
    RetriesExhausted(u32),
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::InvalidId(id) => write!(f, "invalid bus id: 0x{:X}", id),
            Error::RetriesExhausted(attempts) => {
                write!(f, "send failed after {} attempts", attempts)
            }
        }
    }
}

fn to_can_id(id: u32) -> Result<CanId, Error> {
    if id <= 0x7FF {
        StandardId::new(id as u16)
            .map(CanId::Standard)
            .ok_or(Error::InvalidId(id))
    } else {
        ExtendedId::new(id)
            .map(CanId::Extended)
            .ok_or(Error::InvalidId(id))
    }
}

/// Reads the next data message from the bus.
///
/// Remote and error frames are not part of the telemetry protocol and are
/// skipped. Payloads shorter than 8 bytes are zero-padded so the decode
/// routines always see a full field layout.
pub async fn read_message(sock: &CanSocket) -> Result<BusMessage, Error> {
    loop {
        match sock.read_frame().await {
            Ok(CanFrame::Data(frame)) => {
                let id = match frame.id() {
                    CanId::Standard(id) => id.as_raw() as u32,
                    CanId::Extended(id) => id.as_raw(),
                };

                let mut data = [0u8; 8];
                let len = frame.data().len().min(8);
                data[..len].copy_from_slice(&frame.data()[..len]);

                return Ok(BusMessage { id, data });
            }
            Ok(frame) => trace!("skipping non-data frame: {:?}", frame),
            Err(err) => return Err(Error::Io(err)),
        }
    }
}

/// Sends one message, single attempt.
pub async fn send_message(sock: &CanSocket, msg: &BusMessage) -> Result<(), Error> {
    let id = to_can_id(msg.id)?;
    let frame = CanFrame::new(id, &msg.data).ok_or(Error::InvalidId(msg.id))?;
    sock.write_frame(frame).await?;
    Ok(())
}

/// Sends one message within the configured retry budget.
///
/// Exhausting the budget is a soft failure: the caller logs it and moves on
/// to the next cycle, whose data supersedes the lost message. Nothing is
/// queued for resend.
pub async fn send_with_retry(
    sock: &CanSocket,
    msg: &BusMessage,
    params: &BusParams,
) -> Result<(), Error> {
    let attempts = params.retry_budget.max(1);

    for attempt in 1..=attempts {
        match send_message(sock, msg).await {
            Ok(()) => return Ok(()),
            Err(Error::Io(err)) => {
                debug!("send 0x{:X} attempt {}/{} failed: {}", msg.id, attempt, attempts, err)
            }
            Err(err) => return Err(err),
        }
    }

    Err(Error::RetriesExhausted(attempts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_and_extended_id_split() {
        assert!(matches!(to_can_id(0x13), Ok(CanId::Standard(_))));
        assert!(matches!(to_can_id(0x7FF), Ok(CanId::Standard(_))));
        assert!(matches!(to_can_id(0x800), Ok(CanId::Extended(_))));
        assert!(matches!(to_can_id(0x1FFF_FFFF), Ok(CanId::Extended(_))));
        assert!(matches!(to_can_id(0x2000_0000), Err(Error::InvalidId(_))));
    }
}
