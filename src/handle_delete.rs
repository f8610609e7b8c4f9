use http::StatusCode as SC;
use http::{Request, Response};

use log::debug;

use crate::DavResult;
use crate::body::Body;
use crate::davpath::DavPath;
use crate::handler::DavInner;

impl DavInner {
    pub(crate) async fn handle_delete(
        &self,
        req: &Request<()>,
        path: DavPath,
    ) -> DavResult<Response<Body>> {
        self.check_condition(&path, req).await?;

        if self.store.metadata(&path).await.is_err() {
            return Err(SC::NOT_FOUND.into());
        }

        // the whole subtree goes; the store reports how many resources
        // that actually removed.
        let deleted = self.store.delete(&path).await?;
        debug!("deleted {} objects under {}", deleted, path);
        if deleted == 0 {
            return Err(SC::FORBIDDEN.into());
        }

        Ok(Response::new(Body::empty()))
    }
}
