use serde::{Deserialize, Serialize};

/// A location in the shading-language source.
///
/// The parser that produced the AST records these; the backend only carries
/// them through to diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    /// Source file path as the parser saw it.
    #[serde(default)]
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
    /// 0-based byte offset of the first character.
    #[serde(default)]
    pub start: u32,
    /// 0-based byte offset one past the last character.
    #[serde(default)]
    pub end: u32,
}

impl Span {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            start: 0,
            end: 0,
        }
    }

    /// Attach the byte range covered by this span.
    pub fn with_range(mut self, start: u32, end: u32) -> Self {
        self.start = start;
        self.end = end.max(start);
        self
    }

    /// Byte range suitable for source-snippet rendering; never empty.
    pub fn byte_range(&self) -> std::ops::Range<usize> {
        let start = self.start as usize;
        let end = (self.end as usize).max(start + 1);
        start..end
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}
