//! Byte-duplex channel abstraction and its serial implementation.

use std::io;
use std::path::Path;

use serial2::SerialPort;

use crate::config::StreamConfig;
use crate::error::StreamError;

/// An already-open byte-oriented duplex channel to the controller.
///
/// `recv` blocks for at most the configured read timeout and reports an
/// expired timeout as zero bytes read, leaving timeout accounting to the
/// caller's poll budget.
pub trait Channel {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Serial link to the controller.
pub struct SerialChannel {
    port: SerialPort,
}

impl SerialChannel {
    pub fn open(path: &Path, config: &StreamConfig) -> Result<Self, StreamError> {
        let mut port = SerialPort::open(path, config.baud)?;
        port.set_read_timeout(config.read_timeout())?;
        port.set_write_timeout(config.write_timeout())?;
        tracing::info!("Connected to {} at {} baud", path.display(), config.baud);
        Ok(Self { port })
    }
}

impl Channel for SerialChannel {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            // Timeout reporting is platform-dependent.
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }
}
