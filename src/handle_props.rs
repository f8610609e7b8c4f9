use std::io::Cursor;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use headers::HeaderMapExt;
use http::StatusCode as SC;
use http::{Request, Response};
use log::debug;
use xmltree::Element;

use crate::DavResult;
use crate::body::Body;
use crate::davheaders::{self, Depth};
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::handler::DavInner;
use crate::multistatus::MultiStatus;
use crate::props::{self, PropOp, PropQuery};
use crate::store::Meta;
use crate::xmltree_ext::ElementExt;

// these tags are the valid children of <propfind>.
fn parse_propfind(xmldata: &[u8]) -> DavResult<PropQuery> {
    if xmldata.is_empty() {
        return Ok(PropQuery::AllProp);
    }
    let mut tree = Element::parse2(Cursor::new(xmldata))?;
    if tree.name != "propfind" {
        return Err(DavError::XmlParseError);
    }
    let pos = tree
        .children
        .iter()
        .position(|e| matches!(e.name.as_str(), "allprop" | "propname" | "prop"))
        .ok_or(DavError::XmlParseError)?;
    let elem = tree.children.remove(pos);
    Ok(match elem.name.as_str() {
        "allprop" => PropQuery::AllProp,
        "propname" => PropQuery::PropNames,
        _ => PropQuery::Prop(elem.children),
    })
}

// every <prop> child under <set> and <remove>, tagged with its operation.
fn parse_propertyupdate(xmldata: &[u8]) -> DavResult<Vec<(PropOp, Element)>> {
    let tree = Element::parse2(Cursor::new(xmldata))?;
    if tree.name != "propertyupdate" {
        return Err(DavError::XmlParseError);
    }
    let mut items = Vec::new();
    for elem in &tree.children {
        let op = match elem.name.as_str() {
            "set" => PropOp::Set,
            "remove" => PropOp::Remove,
            _ => continue,
        };
        for prop in elem.children.iter().filter(|e| e.name == "prop") {
            for name_elem in &prop.children {
                items.push((op, name_elem.clone()));
            }
        }
    }
    Ok(items)
}

impl DavInner {
    pub(crate) async fn handle_propfind(
        &self,
        req: &Request<()>,
        mut path: DavPath,
        xmldata: &[u8],
    ) -> DavResult<Response<Body>> {
        // No lock evaluation here: PROPFIND only reads.
        let depth = match req.headers().typed_get::<Depth>() {
            Some(d) => d,
            None => Depth::Infinity,
        };

        let meta = self.store.metadata(&path).await?;
        path.add_slash_if(meta.is_collection());

        let query = parse_propfind(xmldata)?;
        debug!("propfind {} depth {:?}", path, depth);

        let mut ms = MultiStatus::new()?;
        self.propfind_resource(&mut ms, &path, &meta, &query).await?;
        if meta.is_collection() && depth != Depth::Zero {
            self.propfind_collection(&mut ms, path, depth, &query).await?;
        }

        let mut res = Response::new(Body::from(ms.finish()?));
        res.headers_mut().typed_insert(davheaders::ContentType(
            "application/xml; charset=utf-8".to_string(),
        ));
        *res.status_mut() = SC::MULTI_STATUS;
        Ok(res)
    }

    async fn propfind_resource(
        &self,
        ms: &mut MultiStatus,
        path: &DavPath,
        meta: &Meta,
        query: &PropQuery,
    ) -> DavResult<()> {
        let propstats =
            props::get_property_values(self.store.as_ref(), &self.locks, path, meta, query).await?;
        ms.add_response(&path.as_url_string_with_prefix(), propstats)
    }

    // walk the children, depth-bounded.
    fn propfind_collection<'a>(
        &'a self,
        ms: &'a mut MultiStatus,
        path: DavPath,
        depth: Depth,
        query: &'a PropQuery,
    ) -> BoxFuture<'a, DavResult<()>> {
        async move {
            let entries = match self.store.read_dir(&path).await {
                Ok(entries) => entries,
                Err(e) => {
                    // a collection that cannot be listed is skipped.
                    debug!("read_dir error on {}: {:?}", path, e);
                    return Ok(());
                }
            };
            for entry in entries {
                let mut npath = path.clone();
                npath.push_segment(&entry.name);
                npath.add_slash_if(entry.meta.is_collection());
                self.propfind_resource(&mut *ms, &npath, &entry.meta, query).await?;
                if depth == Depth::Infinity && entry.meta.is_collection() {
                    self.propfind_collection(&mut *ms, npath, depth, query).await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    pub(crate) async fn handle_proppatch(
        &self,
        req: &Request<()>,
        mut path: DavPath,
        xmldata: &[u8],
    ) -> DavResult<Response<Body>> {
        self.check_condition(&path, req).await?;

        let meta = self.store.metadata(&path).await?;
        path.add_slash_if(meta.is_collection());

        let items = parse_propertyupdate(xmldata)?;
        debug!("proppatch {} ({} properties)", path, items.len());
        let propstats = props::set_property_values(self.store.as_ref(), &path, items).await?;

        let mut ms = MultiStatus::new()?;
        ms.add_response(&path.as_url_string_with_prefix(), propstats)?;

        let mut res = Response::new(Body::from(ms.finish()?));
        res.headers_mut().typed_insert(davheaders::ContentType(
            "application/xml; charset=utf-8".to_string(),
        ));
        *res.status_mut() = SC::MULTI_STATUS;
        Ok(res)
    }
}
