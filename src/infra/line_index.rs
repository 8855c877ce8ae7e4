//! Filepath: src/infra/line_index.rs
//! Newline index with LF/CRLF-robust line/byte mapping.
//!
//! Every strategy in the indexer and every section in an extracted
//! context reports byte spans relative to the original buffer; this
//! index is the single place where lines and bytes are converted.
//!
//! Notes
//! - Lines are 1-based externally.
//! - An empty buffer has 0 lines.
//! - A non-empty buffer without '\n' has 1 line.
//! - A trailing '\n' does not open a new (empty) line.
//! - For ranges, end is exclusive (Rust slicing convention).

#[derive(Debug, Clone)]
pub struct NewlineIndex {
    /// Byte positions of every '\n' in the buffer.
    nl_positions: Vec<usize>,
    /// Total byte length of the buffer.
    len: usize,
}

impl NewlineIndex {
    /// Build an index recording positions of '\n'.
    pub fn build(bytes: &[u8]) -> Self {
        let mut nl_positions = Vec::with_capacity(bytes.len() / 48);
        let mut i = 0usize;

        // Single pass; record every '\n' offset.
        while let Some(pos) = memchr::memchr(b'\n', &bytes[i..]) {
            let abs = i + pos;
            nl_positions.push(abs);
            i = abs + 1;
        }

        Self {
            nl_positions,
            len: bytes.len(),
        }
    }

    /// Total number of logical lines.
    pub fn line_count(&self) -> usize {
        if self.len == 0 {
            return 0;
        }
        match self.nl_positions.last() {
            // Final newline terminates the last line
            Some(&last) if last + 1 == self.len => self.nl_positions.len(),
            _ => self.nl_positions.len() + 1,
        }
    }

    /// Start byte (inclusive) of a 1-based line.
    pub fn start_byte_of_line(&self, line1: usize) -> Option<usize> {
        if line1 == 0 || line1 > self.line_count() {
            return None;
        }
        if line1 == 1 {
            return Some(0);
        }
        self.nl_positions.get(line1 - 2).map(|&prev_nl| prev_nl + 1)
    }

    /// End byte (exclusive) of a 1-based line, excluding the terminator.
    /// For CRLF, excludes the trailing '\r' as well.
    pub fn end_byte_of_line(&self, line1: usize, bytes: &[u8]) -> Option<usize> {
        if line1 == 0 || line1 > self.line_count() {
            return None;
        }

        if let Some(&nl) = self.nl_positions.get(line1 - 1) {
            if nl > 0 && bytes.get(nl - 1) == Some(&b'\r') {
                return Some(nl - 1);
            }
            return Some(nl);
        }

        // Last line without trailing '\n' ends at EOF.
        Some(self.len)
    }

    /// 1-based line number containing the given byte offset.
    /// A '\n' belongs to the line it terminates. Returns 0 for empty buffers.
    pub fn line_of_byte(&self, byte: usize) -> usize {
        if self.len == 0 {
            return 0;
        }
        let before = self.nl_positions.partition_point(|&nl| nl < byte.min(self.len));
        (before + 1).min(self.line_count())
    }

    /// 1-based line of the last byte inside `[start, end)`.
    pub fn last_line_of_span(&self, start: usize, end: usize) -> usize {
        if end <= start {
            return self.line_of_byte(start);
        }
        self.line_of_byte(end - 1)
    }

    /// Byte offset of a (1-based line, 0-based char column) position.
    pub fn offset_of(&self, line1: usize, char_col: usize, text: &str) -> Option<usize> {
        let start = self.start_byte_of_line(line1).or_else(|| {
            // Positions just past a final newline sit on a phantom line
            (line1 == self.line_count() + 1).then_some(self.len)
        })?;
        let rest = text.get(start..)?;
        let offset = rest
            .char_indices()
            .nth(char_col)
            .map(|(b, _)| b)
            .unwrap_or(rest.len());
        Some(start + offset)
    }
}
