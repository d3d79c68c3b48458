//! Incoming-byte-to-line framer.

/// Buffers incoming bytes and yields complete newline-terminated lines.
///
/// The trailing fragment after the last newline stays buffered across
/// pushes, so lines split over multiple chunks reassemble correctly.
/// Completed lines are decoded lossily as UTF-8 and trimmed; empty lines
/// are dropped.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    /// Create an empty framer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
        }
    }

    /// Feed a chunk of bytes, returning the complete lines it unlocked.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Drop any buffered partial line.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
