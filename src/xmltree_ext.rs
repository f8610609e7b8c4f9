use std::borrow::Cow;
use std::io::{Read, Write};

use xml::EmitterConfig;
use xml::common::XmlVersion;
use xml::writer::EventWriter;
use xml::writer::XmlEvent as XmlWEvent;
use xmltree::Element;

use crate::{DavError, DavResult};

pub(crate) trait ElementExt {
    fn new2<'a, N: Into<&'a str>>(n: N) -> Self;
    fn text<T: Into<String>>(self, t: T) -> Self;
    fn ns<S: Into<String>>(self, namespace: S) -> Self;
    fn push(&mut self, e: Element);
    fn parse2<R: Read>(r: R) -> DavResult<Element>;
    fn write_ev<W: Write>(&self, emitter: &mut EventWriter<W>) -> xml::writer::Result<()>;
}

impl ElementExt for Element {
    // build an element from a possibly prefixed name like "D:href".
    fn new2<'a, N: Into<&'a str>>(n: N) -> Element {
        let mut v = n.into().splitn(2, ':');
        let first = v.next().unwrap_or("");
        match v.next() {
            None => Element::new(first),
            Some(name) => {
                let mut e = Element::new(name);
                e.prefix = Some(first.to_string());
                e
            }
        }
    }

    fn text<T: Into<String>>(mut self, t: T) -> Element {
        self.text = Some(t.into());
        self
    }

    // attach the namespace the element's prefix (or, without a prefix,
    // the default namespace) is bound to; write_ev declares it.
    fn ns<S: Into<String>>(mut self, namespace: S) -> Element {
        self.namespace = Some(namespace.into());
        self
    }

    fn push(&mut self, e: Element) {
        self.children.push(e);
    }

    fn parse2<R: Read>(r: R) -> DavResult<Element> {
        match Element::parse(r) {
            Ok(elem) => Ok(elem),
            Err(xmltree::ParseError::MalformedXml(_)) => Err(DavError::XmlParseError),
            Err(_) => Err(DavError::XmlReadError),
        }
    }

    fn write_ev<W: Write>(&self, emitter: &mut EventWriter<W>) -> xml::writer::Result<()> {
        let name = match self.prefix.as_deref() {
            Some(p) => format!("{}:{}", p, self.name),
            None => self.name.clone(),
        };
        let mut ev = XmlWEvent::start_element(name.as_str());
        for (k, v) in &self.attributes {
            ev = ev.attr(k.as_str(), v);
        }
        if let Some(ns) = self.namespace.as_deref() {
            ev = match self.prefix.as_deref() {
                Some(p) => ev.ns(p, ns),
                None => ev.default_ns(ns),
            };
        }
        emitter.write(ev)?;
        if let Some(t) = self.text.as_deref() {
            emitter.write(XmlWEvent::characters(t))?;
        }
        for elem in &self.children {
            elem.write_ev(emitter)?;
        }
        emitter.write(XmlWEvent::end_element())
    }
}

// an emitter for a whole response document.
pub(crate) fn emitter<W: Write>(w: W) -> DavResult<EventWriter<W>> {
    let mut emitter = EventWriter::new_with_config(
        w,
        EmitterConfig {
            normalize_empty_elements: false,
            perform_indent: false,
            indent_string: Cow::Borrowed(""),
            ..Default::default()
        },
    );
    emitter.write(XmlWEvent::StartDocument {
        version: XmlVersion::Version10,
        encoding: Some("utf-8"),
        standalone: None,
    })?;
    Ok(emitter)
}

// serialize a single element as a document-less fragment, the form the
// store keeps dead properties in.
pub(crate) fn element_to_string(e: &Element) -> DavResult<String> {
    let mut emitter = EventWriter::new_with_config(
        Vec::new(),
        EmitterConfig {
            normalize_empty_elements: false,
            perform_indent: false,
            indent_string: Cow::Borrowed(""),
            write_document_declaration: false,
            ..Default::default()
        },
    );
    e.write_ev(&mut emitter)?;
    String::from_utf8(emitter.into_inner()).map_err(|_| DavError::XmlReadError)
}
