use std::fmt;
use std::str::Utf8Error;

use crate::TextPosition;

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal processing error, carrying the document position it occurred at.
///
/// There is no recovery path: an error raised anywhere in the handler graph
/// propagates unmodified to whoever started the parse.
pub struct Error {
    position: TextPosition,
    reason: Reason,
}

impl Error {
    pub fn new(position: TextPosition, reason: Reason) -> Self {
        Self { position, reason }
    }

    /// Structured content failure, raised by handler hooks when element
    /// content is semantically invalid.
    pub fn content(position: TextPosition, message: impl Into<String>) -> Self {
        Self::new(position, Reason::Content(message.into()))
    }

    pub fn position(&self) -> TextPosition {
        self.position
    }

    pub fn reason(&self) -> &Reason {
        &self.reason
    }
}

pub enum Reason {
    /// Element content rejected by a handler.
    Content(String),
    /// Tokenizer-level failure: IO, encoding or XML syntax.
    Xml(quick_xml::Error),
    /// Tag name is not valid UTF-8.
    Utf8(Utf8Error),
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Content(message) => write!(f, "{}", message),
            Reason::Xml(err) => write!(f, "XML error: {}", err),
            Reason::Utf8(err) => write!(f, "UTF-8 error: {}", err),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.position, self.reason)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("position", &self.position)
            .field("message", &self.reason.to_string())
            .finish()
    }
}

impl std::error::Error for Error {}
