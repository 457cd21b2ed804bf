use std::rc::Rc;

use log::trace;

use crate::error::Result;
use crate::handler::HandlerRef;
use crate::{Attribute, TextPosition};

/// Event distributor between the tokenizer and the handler graph.
///
/// Holds the single *active receiver*: the handler that gets the next event.
/// The tokenizer adapter stamps the current document position and feeds each
/// token to [`element_open`](Self::element_open),
/// [`characters`](Self::characters) or
/// [`element_close`](Self::element_close); those reassign the active receiver
/// according to the handlers' delegation tables.
///
/// There is no explicit stack of open elements. Descending hands the receiver
/// to the registered child handler, and the matching end tag hands it to
/// whichever handler registered for that end tag, which restores the parent
/// for correctly wired graphs.
pub struct TokenStream {
    active: HandlerRef,
    position: TextPosition,
}

impl TokenStream {
    /// Starts with `root` as active receiver.
    pub fn new(root: HandlerRef) -> Self {
        Self {
            active: root,
            position: TextPosition::default(),
        }
    }

    pub fn active_receiver(&self) -> HandlerRef {
        Rc::clone(&self.active)
    }

    pub fn set_active_receiver(&mut self, handler: HandlerRef) {
        self.active = handler;
    }

    /// Position of the token about to be dispatched.
    pub fn position(&self) -> TextPosition {
        self.position
    }

    pub fn set_position(&mut self, position: TextPosition) {
        self.position = position;
    }

    /// Dispatches a start tag.
    ///
    /// The active handler is told a child is starting, then either the
    /// registered start handler for `name` or the active handler itself
    /// becomes the receiver, gets its position stamped and handles the tag.
    /// `on_attributes` runs only when `attributes` is non-empty.
    pub fn element_open(&mut self, name: &str, attributes: &[Attribute]) -> Result<()> {
        let active = Rc::clone(&self.active);
        active.borrow_mut().on_descend(name)?;

        let next = active
            .borrow()
            .base()
            .find_start_handler(name)
            .unwrap_or_else(|| Rc::clone(&active));
        if !Rc::ptr_eq(&next, &active) {
            trace!("<{}>: descending into {}", name, next.borrow().base().tag());
        }

        next.borrow_mut().base_mut().set_position(self.position);
        self.active = Rc::clone(&next);

        next.borrow_mut().on_start(name)?;
        if !attributes.is_empty() {
            next.borrow_mut().on_attributes(name, attributes)?;
        }
        Ok(())
    }

    /// Dispatches one text chunk to the active handler, verbatim. Chunks are
    /// not concatenated here; accumulation is the handler's business.
    pub fn characters(&mut self, chunk: &str) -> Result<()> {
        self.active.borrow_mut().on_characters(chunk)
    }

    /// Dispatches an end tag.
    ///
    /// The active handler sees `on_end` unconditionally. If it registered an
    /// end handler for `name`, that handler becomes the receiver and is
    /// handed the finished child; otherwise the active handler simply stays
    /// active (how a handler consumes child tags it never delegated).
    pub fn element_close(&mut self, name: &str) -> Result<()> {
        let active = Rc::clone(&self.active);
        active.borrow_mut().on_end(name)?;

        let receiver = active.borrow().base().find_end_handler(name);
        if let Some(receiver) = receiver {
            trace!(
                "</{}>: returning to {}",
                name,
                receiver.borrow().base().tag()
            );
            self.active = Rc::clone(&receiver);
            receiver.borrow_mut().on_return(name, &active);
        }
        Ok(())
    }
}
