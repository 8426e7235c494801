/*!
Scripted serial source for running the kernel without a gateway plugged in.

Bytes pushed by the test land in an internal buffer; the kernel's driver reads them back
line by line exactly as it would from the port. Read failures and disconnects can be
injected between lines.
*/

use serde_json::Value;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use tracker_kernel::LineSource;

#[derive(Default)]
struct Inner {
    buffer: Vec<u8>,
    failures: VecDeque<io::ErrorKind>,
    disconnected: bool,
    lines_served: usize,
}

/// Cloneable handle: keep one clone in the test, give another to the driver.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one complete line; the newline is added here.
    pub fn push_line(&self, line: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.buffer.extend_from_slice(line.as_bytes());
        inner.buffer.push(b'\n');
    }

    /// Queue raw bytes, no framing added. Use it for split or garbage frames.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.inner.lock().unwrap().buffer.extend_from_slice(bytes);
    }

    pub fn push_json(&self, doc: &Value) {
        self.push_line(&doc.to_string());
    }

    /// Next read fails with `kind`, then things go back to normal.
    pub fn fail_next(&self, kind: io::ErrorKind) {
        self.inner.lock().unwrap().failures.push_back(kind);
    }

    /// Every access fails until `reconnect`.
    pub fn disconnect(&self) {
        self.inner.lock().unwrap().disconnected = true;
    }

    pub fn reconnect(&self) {
        self.inner.lock().unwrap().disconnected = false;
    }

    pub fn pending_bytes(&self) -> usize {
        self.inner.lock().unwrap().buffer.len()
    }

    pub fn lines_served(&self) -> usize {
        self.inner.lock().unwrap().lines_served
    }

    /// True once every other clone (the driver's included) has been dropped.
    pub fn is_released(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }
}

impl LineSource for ScriptedSource {
    fn bytes_available(&mut self) -> io::Result<bool> {
        let inner = self.inner.lock().unwrap();
        if inner.disconnected {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device disconnected"));
        }
        Ok(!inner.failures.is_empty() || !inner.buffer.is_empty())
    }

    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(kind) = inner.failures.pop_front() {
            return Err(io::Error::new(kind, "scripted read failure"));
        }
        if inner.disconnected {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device disconnected"));
        }

        let Some(pos) = inner.buffer.iter().position(|b| *b == b'\n') else {
            return Ok(None);
        };
        let mut line: Vec<u8> = inner.buffer.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        inner.lines_served += 1;
        Ok(Some(line))
    }
}
