//! Line/column positions for diagnostics.
//!
//! The AST and diagnostics use byte offsets; the CLI renders them as
//! line/column pairs through a [`LineMap`].

use serde::{Deserialize, Serialize};

/// A position in a source file (0-indexed line and byte column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// 0-indexed line number
    pub line: u32,
    /// 0-indexed byte column within the line
    pub column: u32,
}

impl Position {
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Line map for efficient offset -> position conversion.
///
/// Stores the starting offset of each line. Both `\n` and `\r\n` line
/// endings are recognized; a lone `\r` also terminates a line.
#[derive(Debug, Clone)]
pub struct LineMap {
    /// Starting offset of each line (`line_starts[0]` is always 0)
    line_starts: Vec<u32>,
}

impl LineMap {
    /// Build a line map from source text.
    #[must_use]
    pub fn build(source: &str) -> Self {
        let bytes = source.as_bytes();
        let mut line_starts = vec![0u32];
        let mut pos = 0usize;

        while let Some(idx) = memchr::memchr2(b'\n', b'\r', &bytes[pos..]) {
            let at = pos + idx;
            if bytes[at] == b'\r' && bytes.get(at + 1) == Some(&b'\n') {
                line_starts.push((at + 2) as u32);
                pos = at + 2;
            } else {
                line_starts.push((at + 1) as u32);
                pos = at + 1;
            }
        }

        Self { line_starts }
    }

    /// Convert a byte offset to a 0-indexed line/column position.
    #[must_use]
    pub fn position(&self, offset: u32) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert_point) => insert_point.saturating_sub(1),
        };
        let line_start = self.line_starts.get(line).copied().unwrap_or(0);
        Position {
            line: line as u32,
            column: offset.saturating_sub(line_start),
        }
    }

    /// Get the number of lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_offsets_across_unix_newlines() {
        let map = LineMap::build("ab\ncd\nef");
        assert_eq!(map.position(0), Position::new(0, 0));
        assert_eq!(map.position(4), Position::new(1, 1));
        assert_eq!(map.position(7), Position::new(2, 1));
        assert_eq!(map.line_count(), 3);
    }

    #[test]
    fn maps_offsets_across_windows_newlines() {
        let map = LineMap::build("ab\r\ncd\r\nef");
        assert_eq!(map.position(4), Position::new(1, 0));
        assert_eq!(map.position(9), Position::new(2, 1));
    }

    #[test]
    fn lone_carriage_return_ends_a_line() {
        let map = LineMap::build("a\rb");
        assert_eq!(map.position(2), Position::new(1, 0));
    }
}
