//! Serial port line source.
//!
//! The gateway writes one JSON document per line. A read can time out halfway through a
//! line; whatever arrived so far is kept and the rest is picked up on a later poll.

use crate::config::SerialSettings;
use crate::driver::LineSource;
use crate::error::IngestError;
use serialport::SerialPort;
use std::io::{self, BufRead, BufReader};
use tracing::{info, warn};

/// Splits any buffered reader into lines, tolerating timeouts mid-line and capping
/// line length.
pub struct FramedReader<R> {
    inner: R,
    pending: Vec<u8>,
    max_frame_bytes: usize,
    discarding: bool,
}

impl<R: BufRead> FramedReader<R> {
    pub fn new(inner: R, max_frame_bytes: usize) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            max_frame_bytes,
            discarding: false,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Bytes of an unfinished line held over from earlier reads.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.inner.read_until(b'\n', &mut self.pending) {
            Ok(_) if self.pending.last() == Some(&b'\n') => self.complete_line(),
            Ok(_) => self.check_overflow(),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                self.check_overflow()
            }
            Err(e) => Err(e),
        }
    }

    fn complete_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut line = std::mem::take(&mut self.pending);
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        if self.discarding {
            // Tail of a line that already overflowed.
            self.discarding = false;
            return Ok(None);
        }
        if line.len() > self.max_frame_bytes {
            return Err(self.overflow_error());
        }
        Ok(Some(line))
    }

    fn check_overflow(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.pending.len() <= self.max_frame_bytes {
            return Ok(None);
        }
        self.pending.clear();
        if self.discarding {
            return Ok(None);
        }
        self.discarding = true;
        Err(self.overflow_error())
    }

    fn overflow_error(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame exceeds {} bytes, dropped", self.max_frame_bytes),
        )
    }
}

pub struct SerialSource {
    port_name: String,
    reader: FramedReader<BufReader<Box<dyn SerialPort>>>,
}

impl SerialSource {
    /// Opens the configured port. Failure here is fatal for the process.
    pub fn open(settings: &SerialSettings) -> Result<Self, IngestError> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .timeout(settings.read_timeout())
            .open()
            .map_err(|source| IngestError::StreamUnavailable {
                port: settings.port.clone(),
                source,
            })?;

        info!(
            port = %settings.port,
            baud_rate = settings.baud_rate,
            "serial port opened"
        );

        Ok(Self {
            port_name: settings.port.clone(),
            reader: FramedReader::new(BufReader::new(port), settings.max_frame_bytes),
        })
    }
}

impl LineSource for SerialSource {
    fn bytes_available(&mut self) -> io::Result<bool> {
        if !self.reader.get_ref().buffer().is_empty() {
            return Ok(true);
        }
        let waiting = self.reader.get_ref().get_ref().bytes_to_read()?;
        Ok(waiting > 0)
    }

    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.reader.next_line()
    }
}

impl Drop for SerialSource {
    fn drop(&mut self) {
        let pending = self.reader.pending_len();
        if pending > 0 {
            warn!(port = %self.port_name, pending, "closing serial port with an unfinished line");
        }
    }
}
