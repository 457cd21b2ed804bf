use std::io::Cursor;
use std::str::from_utf8;

use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Reason, Result};
use crate::handler::HandlerRef;
use crate::stream::TokenStream;
use crate::{Attribute, TextPosition};

/// Drives a handler graph from raw XML bytes, with quick-xml as tokenizer.
///
/// Every tokenizer event is stamped with its document position and fed to the
/// [`TokenStream`]. Well-formedness is quick-xml's business; a malformed
/// document surfaces as [`Reason::Xml`] and aborts the parse.
pub struct QuickXmlReader<'r> {
    bytes: &'r [u8],
    reader: quick_xml::Reader<Cursor<&'r [u8]>>,
    stream: TokenStream,
    last_offset: usize,
    offset: usize,
    // incremental line/column tracking over already scanned bytes
    scanned: usize,
    line: usize,
    column: usize,
}

impl<'r> QuickXmlReader<'r> {
    /// `root` is the initially active handler; it sees every event until it
    /// delegates.
    pub fn new(bytes: &'r [u8], root: HandlerRef) -> Self {
        Self {
            bytes,
            reader: quick_xml::Reader::from_reader(Cursor::new(bytes)),
            stream: TokenStream::new(root),
            last_offset: 0,
            offset: 0,
            scanned: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn stream(&self) -> &TokenStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut TokenStream {
        &mut self.stream
    }

    /// Processes the whole document, dispatching every element and text token
    /// to the handler graph. All-or-nothing: the first failure aborts.
    pub fn parse(&mut self) -> Result<()> {
        let mut buffer: Vec<u8> = Vec::with_capacity(1024);

        loop {
            match self.read_event(&mut buffer)? {
                Event::Start(start) => {
                    self.open(&start)?;
                }
                Event::Empty(start) => {
                    // an empty tag is an open/close pair to the handler graph
                    self.open(&start)?;
                    let name = conv_utf8(start.name(), self.stream.position())?;
                    self.stream.element_close(name)?;
                }
                Event::End(end) => {
                    self.stamp_position();
                    let name = conv_utf8(end.name(), self.stream.position())?;
                    self.stream.element_close(name)?;
                }
                Event::Text(text) => {
                    let chunk = text
                        .unescape_and_decode(&self.reader)
                        .map_err(|err| self.xml_error(err))?;
                    if !chunk.is_empty() {
                        self.stamp_position();
                        self.stream.characters(&chunk)?;
                    }
                }
                Event::CData(text) => {
                    // CDATA content is delivered raw; quick-xml's CData event
                    // holds an escaped copy, so undo that to get the raw bytes
                    self.stamp_position();
                    let raw = text.unescaped().map_err(|err| self.xml_error(err))?;
                    let chunk = conv_utf8(&raw, self.stream.position())?;
                    self.stream.characters(chunk)?;
                }
                Event::Decl(_) | Event::DocType(_) | Event::Comment(_) | Event::PI(_) => {}
                Event::Eof => return Ok(()),
            }
            buffer.clear();
        }
    }

    fn open(&mut self, start: &BytesStart) -> Result<()> {
        self.stamp_position();
        let name = conv_utf8(start.name(), self.stream.position())?;
        let attributes = self.collect_attributes(start)?;
        self.stream.element_open(name, &attributes)
    }

    fn collect_attributes(&mut self, start: &BytesStart) -> Result<Vec<Attribute>> {
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|err| self.xml_error(err))?;
            let name = conv_utf8(attribute.key, self.stream.position())?;
            let value = attribute
                .unescape_and_decode_value(&self.reader)
                .map_err(|err| self.xml_error(err))?;
            attributes.push(Attribute::new(name, value));
        }
        Ok(attributes)
    }

    fn read_event<'a>(&mut self, buffer: &'a mut Vec<u8>) -> Result<Event<'a>> {
        self.last_offset = self.offset;
        let evt = self.reader.read_event(buffer);
        self.offset = self.reader.buffer_position();
        evt.map_err(|err| self.xml_error(err))
    }

    /// Records the position of the token just read on the stream, so every
    /// dispatched event and the handlers activated by it see where in the
    /// document they are.
    fn stamp_position(&mut self) {
        let position = self.position_at(self.last_offset);
        self.stream.set_position(position);
    }

    fn position_at(&mut self, offset: usize) -> TextPosition {
        while self.scanned < offset && self.scanned < self.bytes.len() {
            if self.bytes[self.scanned] == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.scanned += 1;
        }
        TextPosition::new(offset, self.line, self.column)
    }

    fn xml_error(&mut self, err: quick_xml::Error) -> Error {
        let offset = self.reader.buffer_position();
        Error::new(self.position_at(offset), Reason::Xml(err))
    }
}

fn conv_utf8(s: &[u8], position: TextPosition) -> Result<&str> {
    from_utf8(s).map_err(|err| Error::new(position, Reason::Utf8(err)))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::QuickXmlReader;
    use crate::error::Reason;
    use crate::handler::{ElementHandler, HandlerBase, HandlerRef};
    use crate::{Attribute, Result};

    /// Collects everything delivered to it.
    struct Sink {
        base: HandlerBase,
        opened: Vec<String>,
        attributes: Vec<Attribute>,
    }

    impl Sink {
        fn create(tag: &str) -> Rc<RefCell<Sink>> {
            Rc::new(RefCell::new(Sink {
                base: HandlerBase::new(tag),
                opened: vec![],
                attributes: vec![],
            }))
        }
    }

    fn handler(sink: &Rc<RefCell<Sink>>) -> HandlerRef {
        Rc::<RefCell<Sink>>::clone(sink)
    }

    impl ElementHandler for Sink {
        fn base(&self) -> &HandlerBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut HandlerBase {
            &mut self.base
        }

        fn on_start(&mut self, name: &str) -> Result<()> {
            self.opened.push(name.to_string());
            Ok(())
        }

        fn on_attributes(&mut self, _name: &str, attributes: &[Attribute]) -> Result<()> {
            self.attributes.extend_from_slice(attributes);
            Ok(())
        }

        fn on_descend(&mut self, _name: &str) -> Result<()> {
            Ok(())
        }

        fn on_characters(&mut self, chunk: &str) -> Result<()> {
            self.base.append_value(chunk);
            Ok(())
        }

        fn on_end(&mut self, _name: &str) -> Result<()> {
            Ok(())
        }

        fn on_return(&mut self, _name: &str, _child: &HandlerRef) {}
    }

    #[test]
    fn delivers_text_to_root_handler() {
        let root = Sink::create("root");
        let mut reader = QuickXmlReader::new(b"<root>hello</root>", handler(&root));
        reader.parse().unwrap();
        assert_eq!("hello", root.borrow().base.value());
        assert_eq!(vec!["root"], root.borrow().opened);
    }

    #[test]
    fn attribute_values_are_unescaped() {
        let root = Sink::create("root");
        let mut reader = QuickXmlReader::new(
            b"<root name=\"a&amp;b\"/>",
            handler(&root),
        );
        reader.parse().unwrap();
        assert_eq!(vec![Attribute::new("name", "a&b")], root.borrow().attributes);
    }

    #[test]
    fn empty_tag_without_attributes_skips_attribute_hook() {
        let root = Sink::create("root");
        let mut reader = QuickXmlReader::new(b"<foo/>", handler(&root));
        reader.parse().unwrap();
        assert!(root.borrow().attributes.is_empty());
        assert_eq!(vec!["foo"], root.borrow().opened);
    }

    #[test]
    fn text_entities_are_unescaped() {
        let root = Sink::create("root");
        let mut reader = QuickXmlReader::new(b"<root>a&lt;b</root>", handler(&root));
        reader.parse().unwrap();
        assert_eq!("a<b", root.borrow().base.value());
    }

    #[test]
    fn cdata_is_delivered_raw() {
        let root = Sink::create("root");
        let mut reader = QuickXmlReader::new(
            b"<root><![CDATA[a&lt;b]]></root>",
            handler(&root),
        );
        reader.parse().unwrap();
        assert_eq!("a&lt;b", root.borrow().base.value());
    }

    #[test]
    fn prolog_and_comments_are_skipped() {
        let root = Sink::create("root");
        let mut reader = QuickXmlReader::new(
            b"<?xml version=\"1.0\"?><!-- c --><root>x</root>",
            handler(&root),
        );
        reader.parse().unwrap();
        assert_eq!("x", root.borrow().base.value());
        assert_eq!(vec!["root"], root.borrow().opened);
    }

    #[test]
    fn malformed_document_fails_with_xml_reason() {
        let root = Sink::create("root");
        let mut reader = QuickXmlReader::new(b"<root></other>", handler(&root));
        let err = reader.parse().unwrap_err();
        assert!(matches!(err.reason(), Reason::Xml(_)));
    }

    #[test]
    fn positions_track_lines() {
        let root = Sink::create("root");
        let mut reader = QuickXmlReader::new(b"<root>\n  <sub/>\n</root>", handler(&root));
        reader.parse().unwrap();
        // <sub/> has no handler, so it restamped the still-active root
        // handler with its own position on the second line
        assert_eq!(2, root.borrow().base.position().line());
    }
}
