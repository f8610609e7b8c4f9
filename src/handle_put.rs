use std::error::Error as StdError;

use bytes::{Buf, Bytes};
use http::StatusCode as SC;
use http::{Request, Response};
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use log::debug;

use crate::DavResult;
use crate::body::Body;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::handler::DavInner;

impl DavInner {
    pub(crate) async fn handle_put<ReqBody, ReqData, ReqError>(
        &self,
        req: &Request<()>,
        path: DavPath,
        body: ReqBody,
    ) -> DavResult<Response<Body>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        self.check_condition(&path, req).await?;

        // writing data on a collection is forbidden.
        if let Ok(meta) = self.store.metadata(&path).await {
            if meta.is_collection() {
                return Err(SC::FORBIDDEN.into());
            }
        }
        let parent = path.parent();
        match self.store.metadata(&parent).await {
            Err(_) => return Err(SC::FORBIDDEN.into()),
            Ok(m) if !m.is_collection() => return Err(SC::CONFLICT.into()),
            Ok(_) => {}
        }

        // stream the request body to the store.
        let mut sink = self.store.open_write(&path).await?;
        let mut count: u64 = 0;
        let mut body = std::pin::pin!(body);
        while let Some(res) = body.frame().await {
            let mut frame = res.map_err(|_| {
                DavError::IoError(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "UnexpectedEof",
                ))
            })?;
            let Some(buf) = frame.data_mut() else {
                continue;
            };
            while buf.has_remaining() {
                let chunk = buf.chunk();
                let len = chunk.len();
                sink.write_bytes(Bytes::copy_from_slice(chunk)).await?;
                buf.advance(len);
                count += len as u64;
            }
        }
        sink.flush().await?;
        debug!("wrote {} bytes to {}", count, path);

        let mut res = Response::new(Body::empty());
        *res.status_mut() = SC::CREATED;
        Ok(res)
    }
}
