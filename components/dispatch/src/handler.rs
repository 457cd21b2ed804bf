use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use log::{trace, warn};

use crate::error::{Error, Result};
use crate::{Attribute, TextPosition};

/// Shared reference to a handler in the graph.
pub type HandlerRef = Rc<RefCell<dyn ElementHandler>>;

/// Non-owning reference, used for the child-to-parent direction so a wired
/// graph carries no reference cycles.
pub type WeakHandlerRef = Weak<RefCell<dyn ElementHandler>>;

/// Callback contract for one element type.
///
/// The [`TokenStream`](crate::TokenStream) invokes these hooks on whichever
/// handler is currently active; see the dispatch rules there. Every concrete
/// handler embeds a [`HandlerBase`] and exposes it through `base`/`base_mut`.
pub trait ElementHandler {
    fn base(&self) -> &HandlerBase;

    fn base_mut(&mut self) -> &mut HandlerBase;

    /// The handler is about to become (or stays) active for this start tag.
    /// Attributes have not been processed yet.
    fn on_start(&mut self, name: &str) -> Result<()>;

    /// Called after `on_start`, only when the start tag carries at least one
    /// attribute.
    fn on_attributes(&mut self, name: &str, attributes: &[Attribute]) -> Result<()>;

    /// A child tag is opening below this handler. Runs on the still-active
    /// handler before any delegation decision.
    fn on_descend(&mut self, name: &str) -> Result<()>;

    /// One raw text chunk. An element's text may arrive as several chunks;
    /// accumulate with [`HandlerBase::append_value`].
    fn on_characters(&mut self, chunk: &str) -> Result<()>;

    /// An end tag arrived while this handler is active, either its own or
    /// that of a descendant it did not delegate.
    fn on_end(&mut self, name: &str) -> Result<()>;

    /// Control has returned after `child`'s subtree closed. Operates on
    /// already-validated child state and must not fail; a violated
    /// expectation here is a wiring bug, not a document problem.
    fn on_return(&mut self, name: &str, child: &HandlerRef);
}

/// State every element handler carries: its own tag, the text value
/// accumulated so far, the delegation tables and the last recorded document
/// position.
///
/// Handler lookup is case-insensitive. Keys are normalized at registration,
/// so case-variant registrations collapse onto one entry and the last one
/// wins; tag names coming from the document are never normalized.
pub struct HandlerBase {
    tag: String,
    value: String,
    start_handlers: HashMap<String, HandlerRef>,
    end_handlers: HashMap<String, WeakHandlerRef>,
    position: TextPosition,
}

impl HandlerBase {
    /// `tag` is the element name this handler is responsible for, kept
    /// verbatim.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            value: String::new(),
            start_handlers: HashMap::new(),
            end_handlers: HashMap::new(),
            position: TextPosition::default(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Text accumulated for this element so far.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    pub fn append_value(&mut self, chunk: &str) {
        self.value.push_str(chunk);
    }

    /// Clears the accumulated value. A handler instance is reused across
    /// occurrences of its element, so call this before the next occurrence
    /// if a stale value would leak.
    pub fn reset(&mut self) {
        self.value.clear();
    }

    /// Registers `handler` to take over when a child tag `tag` opens.
    /// Replaces any previous registration for the same tag.
    pub fn add_start_handler(&mut self, tag: &str, handler: &HandlerRef) {
        trace!("{}: start handler for <{}>", self.tag, tag);
        self.start_handlers
            .insert(tag.to_lowercase(), Rc::clone(handler));
    }

    pub fn remove_start_handler(&mut self, tag: &str) {
        trace!("{}: removing start handler for <{}>", self.tag, tag);
        self.start_handlers.remove(&tag.to_lowercase());
    }

    /// Registers `handler` to regain control when the tag `tag` closes.
    /// In general that is the parent handler, but it may be any handler.
    pub fn add_end_handler(&mut self, tag: &str, handler: &HandlerRef) {
        trace!("{}: end handler for </{}>", self.tag, tag);
        self.end_handlers
            .insert(tag.to_lowercase(), Rc::downgrade(handler));
    }

    pub fn remove_end_handler(&mut self, tag: &str) {
        trace!("{}: removing end handler for </{}>", self.tag, tag);
        self.end_handlers.remove(&tag.to_lowercase());
    }

    pub(crate) fn find_start_handler(&self, name: &str) -> Option<HandlerRef> {
        self.start_handlers
            .get(&name.to_lowercase())
            .map(Rc::clone)
    }

    pub(crate) fn find_end_handler(&self, name: &str) -> Option<HandlerRef> {
        let handler = self.end_handlers.get(&name.to_lowercase())?;
        let upgraded = handler.upgrade();
        if upgraded.is_none() {
            // Registered receiver was dropped; by contract a miss, not an
            // error.
            warn!("{}: end handler for </{}> is gone", self.tag, name);
        }
        upgraded
    }

    /// Document position recorded when this handler last became active.
    pub fn position(&self) -> TextPosition {
        self.position
    }

    pub fn set_position(&mut self, position: TextPosition) {
        self.position = position;
    }

    /// Structured content failure at this handler's recorded position.
    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::content(self.position, message)
    }
}

impl fmt::Display for HandlerBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_empty() {
            write!(f, "{}", self.tag)
        } else {
            write!(f, "{}={}", self.tag, self.value)
        }
    }
}
