use log::trace;
use serialport::SerialPort;
use std::{io, io::Write, time::Duration};

/// Serial sink for outbound telemetry frames.
///
/// Thin wrapper over the port: frames are already framed and checksummed by
/// the telemetry codec, the sink only delivers bytes.
pub struct SerialSink {
    port: Box<dyn SerialPort>,
}

impl SerialSink {
    /// Opens the serial port with the given baud rate.
    pub fn open(path: &str, baud: u32, timeout: Duration) -> Result<SerialSink, serialport::Error> {
        let port = serialport::new(path, baud).timeout(timeout).open()?;
        Ok(SerialSink { port })
    }

    /// Writes one complete frame.
    pub fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        trace!("serial write: {:02X?}", frame);
        self.port.write_all(frame)?;
        self.port.flush()
    }
}
