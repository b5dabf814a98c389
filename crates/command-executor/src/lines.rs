//! Incremental line splitting for pipe output
//!
//! Pipes deliver arbitrary byte chunks. A [`LineBuffer`] holds the bytes after
//! the last newline until the next chunk from the same pipe arrives, so a line
//! (or a multi-byte UTF-8 character) split across reads is reassembled before
//! it is decoded.

/// Buffers a partial line between reads of one pipe
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes.
    ///
    /// Empty lines between consecutive newlines are returned as empty strings.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(String::from_utf8_lossy(&self.pending[start..end]).into_owned());
            start = end + 1;
        }
        self.pending.drain(..start);

        lines
    }

    /// Take the trailing fragment at end of stream, if it is non-empty
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    /// Returns true if no partial line is held
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
