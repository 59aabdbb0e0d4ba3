//! Source locations shared by the lexer, parser, and VM error paths.

use std::fmt;
use std::rc::Rc;

/// A position in a source file, used to report lex/parse errors and, via the
/// parser's IP-to-location map, to report VM execution errors too.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: Rc<str>,
    pub row: usize,
    pub col: usize,
}

impl Location {
    pub fn new(file: Rc<str>, row: usize, col: usize) -> Location {
        Location { file, row, col }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.row, self.col)
    }
}
