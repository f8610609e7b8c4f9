use http::{Request, Response, header::HeaderValue};

use crate::DavResult;
use crate::body::Body;
use crate::handler::DavInner;
use crate::util::DavMethodSet;

impl DavInner {
    pub(crate) async fn handle_options(&self, _req: &Request<()>) -> DavResult<Response<Body>> {
        let mut res = Response::new(Body::empty());
        let h = res.headers_mut();
        // locking (class 2) is always advertised: the handler always
        // carries a lock manager.
        h.insert("DAV", HeaderValue::from_static("1,2"));
        h.insert("MS-Author-Via", HeaderValue::from_static("DAV"));
        let allow = self.allow.unwrap_or_else(DavMethodSet::all).allow_value();
        if let Ok(value) = HeaderValue::from_str(&allow) {
            h.insert("Allow", value);
        }
        h.insert("Content-Length", HeaderValue::from_static("0"));
        Ok(res)
    }
}
