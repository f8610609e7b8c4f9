//! Writer for 207 Multi-Status response bodies.
use bytes::Bytes;
use xml::writer::{EventWriter, XmlEvent};

use crate::DavResult;
use crate::props::{NS_DAV, PropStat};
use crate::xmltree_ext::{ElementExt, emitter};

pub(crate) struct MultiStatus {
    w: EventWriter<Vec<u8>>,
}

fn text_elem<W: std::io::Write>(
    w: &mut EventWriter<W>,
    name: &str,
    text: &str,
) -> xml::writer::Result<()> {
    w.write(XmlEvent::start_element(name))?;
    if !text.is_empty() {
        w.write(XmlEvent::characters(text))?;
    }
    w.write(XmlEvent::end_element())
}

impl MultiStatus {
    pub fn new() -> DavResult<MultiStatus> {
        let mut w = emitter(Vec::new())?;
        w.write(XmlEvent::start_element("D:multistatus").ns("D", NS_DAV))?;
        Ok(MultiStatus { w })
    }

    /// One `<D:response>` with a `<D:propstat>` per partition. Empty
    /// partitions are skipped; the status is a literal HTTP status line.
    pub fn add_response(&mut self, href: &str, propstats: Vec<PropStat>) -> DavResult<()> {
        self.w.write(XmlEvent::start_element("D:response"))?;
        text_elem(&mut self.w, "D:href", href)?;
        for ps in propstats {
            if ps.props.is_empty() {
                continue;
            }
            self.w.write(XmlEvent::start_element("D:propstat"))?;
            self.w.write(XmlEvent::start_element("D:prop"))?;
            for prop in &ps.props {
                prop.write_ev(&mut self.w)?;
            }
            self.w.write(XmlEvent::end_element())?; // prop
            text_elem(&mut self.w, "D:status", &format!("HTTP/1.1 {}", ps.status))?;
            self.w.write(XmlEvent::end_element())?; // propstat
        }
        self.w.write(XmlEvent::end_element())?; // response
        Ok(())
    }

    pub fn finish(mut self) -> DavResult<Bytes> {
        self.w.write(XmlEvent::end_element())?; // multistatus
        Ok(Bytes::from(self.w.into_inner()))
    }
}
