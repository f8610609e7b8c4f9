use http::StatusCode as SC;
use http::{Request, Response};

use crate::DavResult;
use crate::body::Body;
use crate::davpath::DavPath;
use crate::handler::DavInner;

impl DavInner {
    // RFC 4918 9.3.1 MKCOL Status Codes. A non-empty request body was
    // already refused with 415 by the dispatcher.
    pub(crate) async fn handle_mkcol(
        &self,
        req: &Request<()>,
        mut path: DavPath,
    ) -> DavResult<Response<Body>> {
        self.check_condition(&path, req).await?;

        if self.store.metadata(&path).await.is_ok() {
            return Err(SC::METHOD_NOT_ALLOWED.into());
        }
        if !self.has_parent_collection(&path).await {
            return Err(SC::CONFLICT.into());
        }

        path.add_slash();
        self.store.create_collection(&path).await?;

        let mut res = Response::new(Body::empty());
        *res.status_mut() = SC::CREATED;
        Ok(res)
    }
}
