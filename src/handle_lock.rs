use std::io::Cursor;
use std::time::Duration;

use headers::HeaderMapExt;
use http::StatusCode as SC;
use http::{Request, Response};
use log::debug;
use xmltree::Element;

use crate::DavResult;
use crate::body::Body;
use crate::davheaders::{self, DavTimeout};
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::handler::DavInner;
use crate::lock::{Lock, LockManager, LockScope};
use crate::xmltree_ext::{ElementExt, emitter};

impl DavInner {
    pub(crate) async fn handle_lock(
        &self,
        req: &Request<()>,
        path: DavPath,
        xmldata: &[u8],
    ) -> DavResult<Response<Body>> {
        let existed = self.store.metadata(&path).await.is_ok();

        // precondition evaluation. when it resolves an existing lock
        // the request is a refresh; a conflict made up of shared locks
        // only does not end the request, the acquisition below gets to
        // decide whether the new lock is compatible.
        match self.evaluate_condition(&path, req).await {
            Ok(eval) => {
                if !eval.result {
                    return Err(SC::PRECONDITION_FAILED.into());
                }
                if let Some(lock) = eval.matched.first() {
                    debug!("lock refresh {}", lock.token);
                    let timeout = get_timeout(req);
                    let lock = self
                        .locks
                        .refresh(&lock.path, &lock.token, timeout)
                        .unwrap_or_else(|| lock.clone());
                    return lock_response(&lock, existed);
                }
            }
            Err(DavError::LockConflict(locks)) => {
                if locks.iter().any(|l| l.scope == LockScope::Exclusive) {
                    return Err(DavError::LockConflict(locks));
                }
            }
            Err(e) => return Err(e),
        }

        // Depth: 1 is invalid for LOCK.
        let deep = match req.headers().typed_get::<davheaders::Depth>() {
            Some(davheaders::Depth::Infinity) | None => true,
            Some(davheaders::Depth::Zero) => false,
            Some(davheaders::Depth::One) => return Err(SC::BAD_REQUEST.into()),
        };

        // parse the lockinfo body.
        if xmldata.is_empty() {
            return Err(SC::BAD_REQUEST.into());
        }
        let tree = Element::parse2(Cursor::new(xmldata))?;
        if tree.name != "lockinfo" {
            return Err(DavError::XmlParseError);
        }

        let mut scope: Option<LockScope> = None;
        let mut write_type = false;
        let mut owner: Option<Element> = None;
        for elem in &tree.children {
            match elem.name.as_str() {
                "lockscope" if elem.children.len() == 1 => {
                    match elem.children[0].name.as_str() {
                        "exclusive" => scope = Some(LockScope::Exclusive),
                        "shared" => scope = Some(LockScope::Shared),
                        _ => return Err(DavError::XmlParseError),
                    }
                }
                "locktype" if elem.children.len() == 1 => {
                    match elem.children[0].name.as_str() {
                        "write" => write_type = true,
                        _ => return Err(DavError::XmlParseError),
                    }
                }
                "owner" => {
                    let mut o = elem.clone();
                    o.prefix = Some("D".to_string());
                    owner = Some(o);
                }
                _ => return Err(DavError::XmlParseError),
            }
        }
        let Some(scope) = scope else {
            return Err(DavError::XmlParseError);
        };
        if !write_type {
            return Err(DavError::XmlParseError);
        }

        if owner.is_none() {
            if let Some(principal) = &self.principal {
                owner = Some(Element::new2("D:owner").text(principal.as_str()));
            }
        }

        let mut lock = Lock::new(path, scope);
        lock.owner = owner;
        lock.deep = deep;
        lock.timeout = get_timeout(req);
        debug!("lock request {:?} deep={} on {}", lock.scope, lock.deep, lock.path);

        match self.locks.acquire(lock) {
            Ok(lock) => lock_response(&lock, existed),
            Err(_) => Err(SC::LOCKED.into()),
        }
    }

    pub(crate) async fn handle_unlock(
        &self,
        req: &Request<()>,
        path: DavPath,
    ) -> DavResult<Response<Body>> {
        // Lock-Token header is required, surrounding angle brackets are
        // not part of the token.
        let token = req
            .headers()
            .typed_get::<davheaders::LockToken>()
            .ok_or(DavError::Status(SC::BAD_REQUEST))?;
        let token = token.0.trim_matches(|c| c == '<' || c == '>').to_string();
        debug!("unlock {} on {}", token, path);

        if self.locks.release(&path, &token) {
            let mut res = Response::new(Body::empty());
            *res.status_mut() = SC::NO_CONTENT;
            Ok(res)
        } else {
            Err(SC::UNAUTHORIZED.into())
        }
    }
}

// response to a granted or refreshed lock: Lock-Token header plus a
// lockdiscovery body. 201 if the resource did not exist before; the
// resource itself is not created by LOCK.
fn lock_response(lock: &Lock, existed: bool) -> DavResult<Response<Body>> {
    let mut res = Response::new(Body::empty());
    res.headers_mut()
        .typed_insert(davheaders::LockToken(format!("<{}>", lock.token)));
    res.headers_mut().typed_insert(davheaders::ContentType(
        "application/xml; charset=utf-8".to_string(),
    ));
    *res.status_mut() = if existed { SC::OK } else { SC::CREATED };

    let mut prop = Element::new2("D:prop").ns("DAV:");
    let mut discovery = Element::new2("D:lockdiscovery");
    discovery.push(activelock_element(lock));
    prop.push(discovery);

    let mut w = emitter(Vec::new())?;
    prop.write_ev(&mut w)?;
    *res.body_mut() = Body::from(w.into_inner());
    Ok(res)
}

// the D:activelock element describing one held lock.
pub(crate) fn activelock_element(lock: &Lock) -> Element {
    let mut actlock = Element::new2("D:activelock");

    let mut elem = Element::new2("D:lockscope");
    elem.push(match lock.scope {
        LockScope::Exclusive => Element::new2("D:exclusive"),
        LockScope::Shared => Element::new2("D:shared"),
    });
    actlock.push(elem);

    let mut elem = Element::new2("D:locktype");
    elem.push(Element::new2("D:write"));
    actlock.push(elem);

    actlock.push(Element::new2("D:depth").text(if lock.deep { "Infinity" } else { "0" }));

    actlock.push(Element::new2("D:timeout").text(match lock.timeout {
        None => "Infinite".to_string(),
        Some(d) => format!("Second-{}", d.as_secs()),
    }));

    let mut token = Element::new2("D:locktoken");
    token.push(Element::new2("D:href").text(lock.token.clone()));
    actlock.push(token);

    let mut root = Element::new2("D:lockroot");
    root.push(Element::new2("D:href").text(lock.path.as_url_string_with_prefix()));
    actlock.push(root);

    if let Some(owner) = &lock.owner {
        actlock.push(owner.clone());
    }

    actlock
}

// the D:lockdiscovery property value for a resource.
pub(crate) fn list_lockdiscovery(locks: &LockManager, path: &DavPath) -> Element {
    let mut elem = Element::new2("D:lockdiscovery");
    for lock in locks.discover(path) {
        elem.push(activelock_element(&lock));
    }
    elem
}

// the D:supportedlock property value: exclusive and shared write locks.
pub(crate) fn list_supportedlock() -> Element {
    let mut elem = Element::new2("D:supportedlock");
    for scope in ["D:exclusive", "D:shared"] {
        let mut entry = Element::new2("D:lockentry");
        let mut lockscope = Element::new2("D:lockscope");
        lockscope.push(Element::new2(scope));
        entry.push(lockscope);
        let mut locktype = Element::new2("D:locktype");
        locktype.push(Element::new2("D:write"));
        entry.push(locktype);
        elem.push(entry);
    }
    elem
}

// process the Timeout: header; the first value wins.
fn get_timeout(req: &Request<()>) -> Option<Duration> {
    match req.headers().typed_get::<davheaders::Timeout>() {
        Some(davheaders::Timeout(values)) => match values.first() {
            Some(DavTimeout::Infinite) | None => None,
            Some(DavTimeout::Seconds(n)) => Some(Duration::from_secs(u64::from(*n))),
        },
        None => None,
    }
}
