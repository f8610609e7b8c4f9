//
// This module contains the main entry point of the library, DavHandler.
//
use std::collections::HashMap;
use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use bytes::Buf;
use http::{Request, Response, StatusCode};
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use log::debug;

use crate::body::Body;
use crate::condition::{IfHeader, parse_if_header};
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::lock::{Evaluation, LockManager};
use crate::store::DavStore;
use crate::util::{DavMethod, DavMethodSet, dav_method};
use crate::DavResult;

// request bodies read up front are capped at this size; only PUT
// streams its body to the store.
const MAX_BODY: usize = 65536;

/// WebDAV request handler.
///
/// Build one with [`builder`](Self::builder), then call
/// [`handle`](Self::handle) for every request. The handler is cheap to
/// clone; clones share the store and the lock table.
#[derive(Clone, Default)]
pub struct DavHandler {
    config: Arc<DavConfig>,
}

/// Configuration of the handler.
#[derive(Clone, Default)]
pub struct DavConfig {
    // Prefix to be stripped off when handling request.
    pub(crate) prefix: Option<String>,
    // Store backend.
    pub(crate) store: Option<Box<dyn DavStore>>,
    // The lock table.
    pub(crate) locks: Option<LockManager>,
    // Set of allowed methods (None means "all methods").
    pub(crate) allow: Option<DavMethodSet>,
    // Principal is webdav speak for "user"; used as the fallback lock
    // owner when a LOCK request body does not name one.
    pub(crate) principal: Option<String>,
}

impl DavConfig {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the configuration that was built to generate a [`DavHandler`].
    pub fn build_handler(self) -> DavHandler {
        DavHandler {
            config: Arc::new(self),
        }
    }

    /// Prefix to be stripped off before translating the rest of the
    /// request path to a store path.
    pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the store to use.
    pub fn store(mut self, store: Box<dyn DavStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the lock manager to use. Without one, a fresh, empty lock
    /// table is created for the handler.
    pub fn lock_manager(mut self, locks: LockManager) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Which methods to allow (default is all methods).
    pub fn methods(mut self, allow: DavMethodSet) -> Self {
        self.allow = Some(allow);
        self
    }

    /// Set the name of the "webdav principal". This will be the owner
    /// of any created locks that do not name one.
    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }
}

// The actual inner struct.
//
// At the start of the request, DavConfig is used to generate a DavInner
// struct. DavInner::handle then handles the request.
pub(crate) struct DavInner {
    pub prefix: String,
    pub store: Box<dyn DavStore>,
    pub locks: LockManager,
    pub allow: Option<DavMethodSet>,
    pub principal: Option<String>,
}

impl From<&DavConfig> for DavInner {
    fn from(cfg: &DavConfig) -> Self {
        DavInner {
            prefix: cfg.prefix.clone().unwrap_or_default(),
            store: cfg
                .store
                .clone()
                .expect("store must be configured with DavConfig::store"),
            locks: cfg.locks.clone().unwrap_or_default(),
            allow: cfg.allow,
            principal: cfg.principal.clone(),
        }
    }
}

impl DavHandler {
    /// Return a configuration builder.
    pub fn builder() -> DavConfig {
        DavConfig::new()
    }

    /// Process a WebDAV request.
    pub async fn handle<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
    {
        if self.config.store.is_none() {
            debug!("no store configured, refusing request {}", req.uri());
            return Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .header("Content-Length", "0")
                .body(Body::empty())
                .unwrap();
        }
        let inner = DavInner::from(self.config.as_ref());
        inner.handle(req).await
    }
}

impl DavInner {
    // drain request body and return it, bounded by max_size.
    async fn read_request<ReqBody, ReqData, ReqError>(
        &self,
        body: ReqBody,
        max_size: usize,
    ) -> DavResult<Vec<u8>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let mut data = Vec::new();
        let mut body = std::pin::pin!(body);

        while let Some(res) = body.frame().await {
            let mut frame = res.map_err(|_| {
                DavError::IoError(io::Error::new(io::ErrorKind::UnexpectedEof, "UnexpectedEof"))
            })?;
            let Some(buf) = frame.data_mut() else {
                continue;
            };
            while buf.has_remaining() {
                if data.len() + buf.remaining() > max_size {
                    return Err(StatusCode::PAYLOAD_TOO_LARGE.into());
                }
                let chunk = buf.chunk();
                let len = chunk.len();
                data.extend_from_slice(chunk);
                buf.advance(len);
            }
        }
        Ok(data)
    }

    // Evaluate the If: header against held locks and resource etags.
    //
    // The header is parsed first; then the etags of the context resource
    // and of every tagged resource are resolved from the store, so that
    // the lock manager can run the evaluation without doing any I/O
    // while it holds the lock table.
    pub(crate) async fn evaluate_condition(
        &self,
        path: &DavPath,
        req: &Request<()>,
    ) -> DavResult<Evaluation> {
        let header: Option<IfHeader> = match req.headers().get("if") {
            None => None,
            Some(value) => {
                let s = value.to_str().map_err(|_| DavError::ConditionSyntax {
                    header: String::new(),
                    pos: 0,
                })?;
                if s.trim().is_empty() {
                    None
                } else {
                    let parsed = parse_if_header(s).map_err(|e| DavError::ConditionSyntax {
                        header: e.header,
                        pos: e.pos,
                    })?;
                    Some(parsed)
                }
            }
        };

        let mut etags: HashMap<String, String> = HashMap::new();
        if let Ok(meta) = self.store.metadata(path).await {
            etags.insert(path.key().to_string(), meta.etag());
        }
        if let Some(header) = &header {
            for list in &header.0 {
                let Some(url) = &list.resource else { continue };
                let Ok(p) = DavPath::from_str(url.path(), &self.prefix) else {
                    continue;
                };
                if !etags.contains_key(p.key()) {
                    if let Ok(meta) = self.store.metadata(&p).await {
                        etags.insert(p.key().to_string(), meta.etag());
                    }
                }
            }
        }

        let eval = self.locks.evaluate(path, header.as_ref(), &etags)?;
        if !eval.result {
            debug!("precondition fail: If {:?}", header);
        }
        Ok(eval)
    }

    // Like evaluate_condition, but a false result is already mapped to
    // 412. This is pipeline stage two of every mutating method.
    pub(crate) async fn check_condition(
        &self,
        path: &DavPath,
        req: &Request<()>,
    ) -> DavResult<Evaluation> {
        let eval = self.evaluate_condition(path, req).await?;
        if !eval.result {
            return Err(StatusCode::PRECONDITION_FAILED.into());
        }
        Ok(eval)
    }

    // helper.
    pub(crate) async fn has_parent_collection(&self, path: &DavPath) -> bool {
        let parent = path.parent();
        self.store
            .metadata(&parent)
            .await
            .map(|m| m.is_collection())
            .unwrap_or(false)
    }

    // internal dispatcher.
    async fn handle<ReqBody, ReqData, ReqError>(self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        // Turn any DavError results into a HTTP error response.
        match self.handle2(req).await {
            Ok(resp) => {
                debug!("== END REQUEST result OK");
                resp
            }
            Err(err) => {
                debug!("== END REQUEST result {:?}", err);
                Response::builder()
                    .status(err.statuscode())
                    .header("Content-Length", "0")
                    .body(Body::empty())
                    .unwrap()
            }
        }
    }

    // internal dispatcher part 2.
    async fn handle2<ReqBody, ReqData, ReqError>(
        self,
        req: Request<ReqBody>,
    ) -> DavResult<Response<Body>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let (req, body) = {
            let (parts, body) = req.into_parts();
            (Request::from_parts(parts, ()), body)
        };

        // translate HTTP method to Webdav method.
        let method = match dav_method(req.method()) {
            Ok(m) => m,
            Err(e) => {
                debug!("refusing method {} request {}", req.method(), req.uri());
                return Err(e);
            }
        };

        // see if the method is allowed.
        if let Some(allow) = self.allow {
            if !allow.contains(method) {
                debug!("method {} not allowed on request {}", req.method(), req.uri());
                return Err(StatusCode::METHOD_NOT_ALLOWED.into());
            }
        }

        // make sure the request path is valid.
        let path = DavPath::from_uri(req.uri(), &self.prefix)?;

        // PUT is the only method that streams its body to the backend.
        // The other methods either expect no body, or a small XML one
        // that is read up front.
        let (body_strm, body_data) = match method {
            DavMethod::Put => (Some(body), Vec::new()),
            _ => (None, self.read_request(body, MAX_BODY).await?),
        };

        // Not all methods accept a body.
        match method {
            DavMethod::Put | DavMethod::PropFind | DavMethod::PropPatch | DavMethod::Lock => {}
            _ => {
                if !body_data.is_empty() {
                    return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE.into());
                }
            }
        }

        debug!("== START REQUEST {:?} {}", method, path);

        match method {
            DavMethod::Options => self.handle_options(&req).await,
            DavMethod::PropFind => self.handle_propfind(&req, path, &body_data).await,
            DavMethod::PropPatch => self.handle_proppatch(&req, path, &body_data).await,
            DavMethod::MkCol => self.handle_mkcol(&req, path).await,
            DavMethod::Delete => self.handle_delete(&req, path).await,
            DavMethod::Lock => self.handle_lock(&req, path, &body_data).await,
            DavMethod::Unlock => self.handle_unlock(&req, path).await,
            DavMethod::Head | DavMethod::Get => {
                self.handle_gethead(&req, path, method == DavMethod::Head).await
            }
            DavMethod::Copy | DavMethod::Move => self.handle_copymove(&req, path, method).await,
            DavMethod::Put => self.handle_put(&req, path, body_strm.unwrap()).await,
        }
    }
}
