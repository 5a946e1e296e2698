//! Source code span tracking

/// Location of a token in the source: byte range plus the 1-indexed line and
/// column where it starts. Lines are what runtime diagnostics report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// Byte offset from the start of the source (inclusive)
    pub start: usize,
    /// Byte offset from the start of the source (exclusive)
    pub end: usize,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed, counted in bytes)
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Span {
            start,
            end,
            line,
            column,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Extracts the text covered by this span from the source code.
    pub fn extract<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    /// Span covering `self` through the end of `other`.
    pub fn to(&self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
            column: self.column,
        }
    }
}

impl Default for Span {
    fn default() -> Self {
        Span {
            start: 0,
            end: 0,
            line: 1,
            column: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_extract() {
        let source = "<?php echo 'hello';";
        let span = Span::new(6, 10, 1, 7);
        assert_eq!(span.extract(source), "echo");
        assert_eq!(span.len(), 4);
    }

    #[test]
    fn test_span_to_keeps_start_line() {
        let a = Span::new(6, 10, 2, 1);
        let b = Span::new(11, 18, 3, 4);
        let joined = a.to(b);
        assert_eq!(joined.start, 6);
        assert_eq!(joined.end, 18);
        assert_eq!(joined.line, 2);
    }

    #[test]
    fn test_span_default_is_empty() {
        let span = Span::default();
        assert!(span.is_empty());
        assert_eq!(span.line, 1);
    }
}
