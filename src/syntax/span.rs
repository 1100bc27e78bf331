use serde::{Deserialize, Serialize};

/// Byte range of a syntax element plus the 1-based line/column of its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: u32, end: u32, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Smallest span covering both `self` and `other`
    pub fn merge(&self, other: &Span) -> Span {
        let (first, _) = if self.start <= other.start {
            (self, other)
        } else {
            (other, self)
        };
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: first.line,
            column: first.column,
        }
    }

    pub fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_earliest_position() {
        let a = Span::new(10, 14, 2, 3);
        let b = Span::new(2, 6, 1, 3);
        let merged = a.merge(&b);
        assert_eq!(merged.start, 2);
        assert_eq!(merged.end, 14);
        assert_eq!(merged.line, 1);
    }

    #[test]
    fn test_contains_is_half_open() {
        let span = Span::new(4, 8, 1, 5);
        assert!(span.contains(4));
        assert!(span.contains(7));
        assert!(!span.contains(8));
    }
}
