use http::StatusCode as SC;
use http::header::HeaderValue;
use http::{Request, Response};

use crate::DavResult;
use crate::body::Body;
use crate::davpath::DavPath;
use crate::handler::DavInner;
use crate::util::systemtime_to_httpdate;

impl DavInner {
    // plain whole-body file serving; never consults the lock table.
    pub(crate) async fn handle_gethead(
        &self,
        _req: &Request<()>,
        path: DavPath,
        head: bool,
    ) -> DavResult<Response<Body>> {
        let meta = self.store.metadata(&path).await?;
        if meta.is_collection() {
            return Err(SC::NOT_IMPLEMENTED.into());
        }

        let mut res = Response::new(Body::empty());
        let mime = mime_guess::from_path(path.file_name())
            .first_raw()
            .unwrap_or("application/octet-stream");
        let h = res.headers_mut();
        h.insert("Content-Type", HeaderValue::from_static(mime));
        if let Ok(value) = HeaderValue::from_str(&meta.len.to_string()) {
            h.insert("Content-Length", value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", meta.etag())) {
            h.insert("ETag", value);
        }
        if let Ok(value) = HeaderValue::from_str(&systemtime_to_httpdate(meta.modified)) {
            h.insert("Last-Modified", value);
        }

        if !head {
            let data = self.store.read(&path).await?;
            *res.body_mut() = Body::from(data);
        }
        Ok(res)
    }
}
