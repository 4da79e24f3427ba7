use serde::{Deserialize, Serialize};

/// A located range of source bytes.
///
/// `start_byte` is a 0-based byte offset. Lines and columns are 1-based and
/// columns count bytes. `end_line` is 0 when the span ends on its start line,
/// and `end_col` is the column of the first byte after the span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Span {
    #[serde(default)]
    pub start_byte: usize,
    #[serde(default)]
    pub byte_len: usize,
    #[serde(default)]
    pub start_line: usize,
    #[serde(default)]
    pub start_col: usize,
    #[serde(default)]
    pub end_line: usize,
    #[serde(default)]
    pub end_col: usize,
}

impl Span {
    /// Selection covering `byte_len` bytes from `start_byte`; line fields are left at zero.
    pub fn bytes(start_byte: usize, byte_len: usize) -> Self {
        Self {
            start_byte,
            byte_len,
            ..Self::default()
        }
    }

    pub fn end_byte(&self) -> usize {
        self.start_byte + self.byte_len
    }

    pub fn contains(&self, other: &Span) -> bool {
        other.start_byte >= self.start_byte && other.end_byte() <= self.end_byte()
    }
}

/// Byte offset to line/column conversion for one file.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(source: &[u8]) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.iter().enumerate() {
            if *b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            line_starts,
            len: source.len(),
        }
    }

    /// 1-based (line, column) of a byte offset.
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (line + 1, offset - self.line_starts[line] + 1)
    }

    pub fn span(&self, start: usize, end: usize) -> Span {
        let (start_line, start_col) = self.position(start);
        let (line, end_col) = self.position(end);
        Span {
            start_byte: start,
            byte_len: end.saturating_sub(start),
            start_line,
            start_col,
            end_line: if line == start_line { 0 } else { line },
            end_col,
        }
    }

    pub fn node_span(&self, node: &tree_sitter::Node) -> Span {
        self.span(node.start_byte(), node.end_byte())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_first_line() {
        let index = LineIndex::new(b"package p\n");
        assert_eq!(index.position(0), (1, 1));
        assert_eq!(index.position(8), (1, 9));
    }

    #[test]
    fn test_position_after_newline() {
        let index = LineIndex::new(b"a\nbc\n\nd");
        assert_eq!(index.position(2), (2, 1));
        assert_eq!(index.position(3), (2, 2));
        assert_eq!(index.position(5), (3, 1));
        assert_eq!(index.position(6), (4, 1));
    }

    #[test]
    fn test_span_same_line_has_zero_end_line() {
        let index = LineIndex::new(b"var X int\n");
        let span = index.span(4, 5);
        assert_eq!(span.start_line, 1);
        assert_eq!(span.start_col, 5);
        assert_eq!(span.end_line, 0);
        assert_eq!(span.end_col, 6);
        assert_eq!(span.byte_len, 1);
    }

    #[test]
    fn test_span_multi_line() {
        let index = LineIndex::new(b"func F() {\n}\n");
        let span = index.span(0, 12);
        assert_eq!(span.end_line, 2);
        assert_eq!(span.end_col, 2);
    }

    #[test]
    fn test_contains() {
        let outer = Span::bytes(10, 20);
        assert!(outer.contains(&Span::bytes(12, 3)));
        assert!(outer.contains(&Span::bytes(10, 20)));
        assert!(!outer.contains(&Span::bytes(28, 5)));
    }
}
