//! Delegating XML element handlers.
//!
//! A document is processed by a graph of cooperating [`ElementHandler`]s, each
//! responsible for one subtree of elements. The [`TokenStream`] always hands
//! parser events to a single *active* handler; when a start tag matches a
//! registered child handler, that child becomes active, and when the matching
//! end tag arrives control returns to the handler registered for it. The
//! handoff stack is implicit in these reassignments.
//!
//! [`QuickXmlReader`] drives a handler graph from raw XML bytes using
//! quick-xml as tokenizer.

use std::fmt;

pub use error::{Error, Reason, Result};
pub use handler::{ElementHandler, HandlerBase, HandlerRef, WeakHandlerRef};
pub use reader::QuickXmlReader;
pub use stream::TokenStream;

mod error;
mod handler;
mod reader;
mod stream;

/// Position in the source document, for diagnostics only.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct TextPosition {
    offset: usize,
    line: usize,
    column: usize,
}

impl TextPosition {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    /// Byte offset from the start of the document.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 1-based line number.
    pub fn line(&self) -> usize {
        self.line
    }

    /// 1-based column number.
    pub fn column(&self) -> usize {
        self.column
    }
}

impl fmt::Display for TextPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Attribute of a start tag, with the value already unescaped.
#[derive(Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("value", &self.value)
            .finish()
    }
}
