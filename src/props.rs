//! The DAV property model.
//!
//! Live properties are computed from resource metadata at request time,
//! dispatched on the resource kind (file or collection). Dead properties
//! are opaque XML fragments persisted as store attributes. Either way a
//! property resolution ends up in one of the multistatus partitions:
//! 200 for resolved, 404 for unknown (PROPFIND), 422 for rejected
//! updates (PROPPATCH).
use std::io::Cursor;

use http::StatusCode;
use xmltree::Element;

use crate::DavResult;
use crate::davpath::DavPath;
use crate::handle_lock::{list_lockdiscovery, list_supportedlock};
use crate::lock::LockManager;
use crate::store::{DavStore, Meta};
use crate::util::{systemtime_to_httpdate, systemtime_to_rfc3339};
use crate::xmltree_ext::{ElementExt, element_to_string};

pub(crate) const NS_DAV: &str = "DAV:";

// standard properties, tried for allprop/propnames.
// see http://www.webdav.org/specs/rfc2518.html#dav.properties
pub(crate) const LIVE_PROPERTIES: &[&str] = &[
    "creationdate",
    "displayname",
    "getcontentlanguage",
    "getcontentlength",
    "getcontenttype",
    "getetag",
    "getlastmodified",
    "lockdiscovery",
    "resourcetype",
    "source",
    "supportedlock",
];

// non-standard, only resolved when requested by name.
pub(crate) const QUOTA_PROPERTIES: &[&str] = &[
    "quota",
    "quotaused",
    "quota-available-bytes",
    "quota-used-bytes",
];

/// What a PROPFIND asks for.
pub(crate) enum PropQuery {
    AllProp,
    PropNames,
    Prop(Vec<Element>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PropOp {
    Set,
    Remove,
}

/// One multistatus partition: a status and the properties in it.
pub(crate) struct PropStat {
    pub status: StatusCode,
    pub props: Vec<Element>,
}

// outcome of resolving a single property.
enum Resolution {
    // resolved to a value.
    Value(Element),
    // resolved, but nothing is emitted (collections suppress the
    // content-* properties this way).
    Empty,
    // no such property on this resource.
    Missing,
}

// flat attribute key for a qualified property name: clark notation
// "{namespace}name"; DAV: and unqualified names map to the bare name.
pub(crate) fn clark_key(ns: Option<&str>, name: &str) -> String {
    match ns {
        Some(ns) if !ns.is_empty() && ns != NS_DAV => format!("{{{}}}{}", ns, name),
        _ => name.to_string(),
    }
}

fn clark_parts(key: &str) -> (Option<&str>, &str) {
    if let Some(rest) = key.strip_prefix('{') {
        if let Some(end) = rest.find('}') {
            return (Some(&rest[..end]), &rest[end + 1..]);
        }
    }
    (None, key)
}

fn is_live_name(el: &Element) -> bool {
    let ns = el.namespace.as_deref();
    (ns.is_none() || ns == Some(NS_DAV))
        && (LIVE_PROPERTIES.contains(&el.name.as_str())
            || QUOTA_PROPERTIES.contains(&el.name.as_str()))
}

fn bare_element(el: &Element) -> Element {
    let mut e = Element::new(&el.name);
    e.prefix = el.prefix.clone();
    e.namespace = el.namespace.clone();
    e
}

fn strip_value(el: &mut Element) {
    el.text = None;
    el.children.clear();
}

fn live_property(name: &str, path: &DavPath, meta: &Meta, locks: &LockManager) -> Resolution {
    let collection = meta.is_collection();
    let dav = |n: &str| Element::new2(format!("D:{}", n).as_str());
    match name {
        "creationdate" => match meta.created {
            Some(t) => Resolution::Value(dav(name).text(systemtime_to_rfc3339(t))),
            None => Resolution::Missing,
        },
        "displayname" => Resolution::Value(dav(name).text(path.file_name())),
        "getcontentlanguage" => {
            if collection {
                Resolution::Empty
            } else {
                Resolution::Missing
            }
        }
        "getcontentlength" => {
            if collection {
                Resolution::Empty
            } else {
                Resolution::Value(dav(name).text(meta.len.to_string()))
            }
        }
        "getcontenttype" => {
            if collection {
                Resolution::Empty
            } else {
                let mime = mime_guess::from_path(path.file_name())
                    .first_raw()
                    .unwrap_or("application/octet-stream");
                Resolution::Value(dav(name).text(mime))
            }
        }
        "getetag" => Resolution::Value(dav(name).text(meta.etag())),
        "getlastmodified" => {
            Resolution::Value(dav(name).text(systemtime_to_httpdate(meta.modified)))
        }
        "lockdiscovery" => Resolution::Value(list_lockdiscovery(locks, path)),
        "resourcetype" => {
            let mut el = dav(name);
            if collection {
                el.push(Element::new2("D:collection"));
            }
            Resolution::Value(el)
        }
        "source" => Resolution::Missing,
        "supportedlock" => Resolution::Value(list_supportedlock()),
        "quota" | "quota-available-bytes" => {
            if collection {
                Resolution::Value(dav(name).text(i64::MAX.to_string()))
            } else {
                Resolution::Missing
            }
        }
        "quotaused" | "quota-used-bytes" => {
            if collection {
                Resolution::Value(dav(name).text("0"))
            } else {
                Resolution::Missing
            }
        }
        _ => Resolution::Missing,
    }
}

// read a dead property back from its attribute. stored values are XML
// fragments; anything else is wrapped as a plain text value.
async fn dead_property(store: &dyn DavStore, path: &DavPath, key: &str) -> Option<Element> {
    let value = store.get_attr(path, key).await.ok()??;
    if value.starts_with('<') {
        if let Ok(el) = Element::parse2(Cursor::new(value.as_bytes())) {
            return Some(el);
        }
    }
    let (ns, name) = clark_parts(key);
    let mut el = Element::new(name);
    if let Some(ns) = ns {
        el = el.ns(ns);
    }
    Some(el.text(value))
}

/// Resolve the properties a PROPFIND asks for, partitioned into
/// 200 and 404 propstat groups. Empty partitions are omitted.
pub(crate) async fn get_property_values(
    store: &dyn DavStore,
    locks: &LockManager,
    path: &DavPath,
    meta: &Meta,
    query: &PropQuery,
) -> DavResult<Vec<PropStat>> {
    let mut ok: Vec<Element> = Vec::new();
    let mut missing: Vec<Element> = Vec::new();
    let names_only = matches!(query, PropQuery::PropNames);

    match query {
        PropQuery::AllProp | PropQuery::PropNames => {
            for name in LIVE_PROPERTIES {
                match live_property(name, path, meta, locks) {
                    Resolution::Value(mut el) => {
                        if names_only {
                            strip_value(&mut el);
                        }
                        ok.push(el);
                    }
                    Resolution::Empty => {}
                    Resolution::Missing => {
                        missing.push(Element::new2(format!("D:{}", name).as_str()))
                    }
                }
            }
            // and everything the store has attributes for.
            if let Ok(keys) = store.attr_names(path).await {
                for key in keys {
                    if let Some(mut el) = dead_property(store, path, &key).await {
                        if names_only {
                            strip_value(&mut el);
                        }
                        ok.push(el);
                    }
                }
            }
        }
        PropQuery::Prop(requested) => {
            for req in requested {
                if is_live_name(req) {
                    match live_property(&req.name, path, meta, locks) {
                        Resolution::Value(el) => ok.push(el),
                        Resolution::Empty => {}
                        Resolution::Missing => missing.push(bare_element(req)),
                    }
                    continue;
                }
                let key = clark_key(req.namespace.as_deref(), &req.name);
                match dead_property(store, path, &key).await {
                    Some(el) => ok.push(el),
                    None => missing.push(bare_element(req)),
                }
            }
        }
    }

    let mut out = Vec::new();
    if !ok.is_empty() {
        out.push(PropStat {
            status: StatusCode::OK,
            props: ok,
        });
    }
    if !missing.is_empty() {
        out.push(PropStat {
            status: StatusCode::NOT_FOUND,
            props: missing,
        });
    }
    Ok(out)
}

/// Apply a PROPPATCH: set or remove each requested property,
/// partitioned into 200 and 422 propstat groups. Live properties cannot
/// be updated; a failing store write fails only that property.
pub(crate) async fn set_property_values(
    store: &dyn DavStore,
    path: &DavPath,
    items: Vec<(PropOp, Element)>,
) -> DavResult<Vec<PropStat>> {
    let mut ok: Vec<Element> = Vec::new();
    let mut failed: Vec<Element> = Vec::new();

    for (op, el) in items {
        if is_live_name(&el) {
            failed.push(bare_element(&el));
            continue;
        }
        let key = clark_key(el.namespace.as_deref(), &el.name);
        let value = match op {
            PropOp::Set => Some(element_to_string(&el)?),
            PropOp::Remove => None,
        };
        match store.set_attr(path, &key, value).await {
            Ok(()) => ok.push(bare_element(&el)),
            Err(_) => failed.push(bare_element(&el)),
        }
    }

    let mut out = Vec::new();
    if !ok.is_empty() {
        out.push(PropStat {
            status: StatusCode::OK,
            props: ok,
        });
    }
    if !failed.is_empty() {
        out.push(PropStat {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            props: failed,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clark_roundtrip() {
        let key = clark_key(Some("urn:example:props"), "color");
        assert_eq!(key, "{urn:example:props}color");
        assert_eq!(clark_parts(&key), (Some("urn:example:props"), "color"));
        assert_eq!(clark_key(Some(NS_DAV), "displayname"), "displayname");
        assert_eq!(clark_key(None, "plain"), "plain");
        assert_eq!(clark_parts("plain"), (None, "plain"));
    }
}
