use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use headers::HeaderMapExt;
use http::StatusCode as SC;
use http::{Request, Response};
use log::debug;

use crate::DavResult;
use crate::body::Body;
use crate::davheaders::{self, Depth};
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::handler::DavInner;
use crate::store::FsError;
use crate::util::DavMethod;

impl DavInner {
    // recursively copy a subtree, bounded by depth.
    fn do_copy<'a>(
        &'a self,
        source: DavPath,
        topdest: &'a DavPath,
        dest: DavPath,
        depth: Depth,
    ) -> BoxFuture<'a, DavResult<()>> {
        async move {
            debug!("do_copy {} {} depth {:?}", source, dest, depth);

            // when doing "COPY /a/b /a/b/c" make sure we don't
            // recursively copy /a/b/c/ into /a/b/c.
            if &source == topdest {
                return Ok(());
            }

            let meta = self.store.metadata(&source).await?;

            if !meta.is_collection() {
                let data = self.store.read(&source).await?;
                let mut sink = self.store.open_write(&dest).await?;
                sink.write_bytes(data).await?;
                sink.flush().await?;
                self.copy_attrs(&source, &dest).await?;
                return Ok(());
            }

            match self.store.create_collection(&dest).await {
                Ok(()) | Err(FsError::Exists) => {}
                Err(e) => return Err(e.into()),
            }
            self.copy_attrs(&source, &dest).await?;

            // only recurse when Depth > 0.
            let next_depth = match depth {
                Depth::Zero => return Ok(()),
                Depth::One => Depth::Zero,
                Depth::Infinity => Depth::Infinity,
            };

            for entry in self.store.read_dir(&source).await? {
                let mut nsrc = source.clone();
                let mut ndest = dest.clone();
                nsrc.push_segment(&entry.name);
                ndest.push_segment(&entry.name);
                if entry.meta.is_collection() {
                    nsrc.add_slash();
                    ndest.add_slash();
                }
                self.do_copy(nsrc, topdest, ndest, next_depth).await?;
            }
            Ok(())
        }
        .boxed()
    }

    // dead properties travel with the resource.
    async fn copy_attrs(&self, source: &DavPath, dest: &DavPath) -> DavResult<()> {
        for name in self.store.attr_names(source).await? {
            if let Some(value) = self.store.get_attr(source, &name).await? {
                self.store.set_attr(dest, &name, Some(value)).await?;
            }
        }
        Ok(())
    }

    pub(crate) async fn handle_copymove(
        &self,
        req: &Request<()>,
        mut path: DavPath,
        method: DavMethod,
    ) -> DavResult<Response<Body>> {
        // get and check headers.
        let overwrite = req
            .headers()
            .typed_get::<davheaders::Overwrite>()
            .map_or(true, |o| o.0);
        // MOVE always acts on the whole subtree.
        let depth = match req.headers().typed_get::<Depth>() {
            Some(d) if method == DavMethod::Copy => d,
            _ => Depth::Infinity,
        };

        // decode and validate the destination.
        let dest = req
            .headers()
            .typed_get::<davheaders::Destination>()
            .ok_or(DavError::Status(SC::BAD_REQUEST))?;
        let mut dest = DavPath::from_str(&dest.0, &self.prefix)
            .map_err(|_| DavError::Status(SC::BAD_REQUEST))?;

        // source must exist.
        let meta = self.store.metadata(&path).await?;
        path.add_slash_if(meta.is_collection());
        dest.add_slash_if(meta.is_collection());

        // evaluate the precondition against the destination, and for
        // MOVE against the source as well.
        self.check_condition(&dest, req).await?;
        if method == DavMethod::Move {
            self.check_condition(&path, req).await?;
        }

        if path == dest {
            return Err(SC::FORBIDDEN.into());
        }

        // RFC 4918 9.8.4, 9.9.4: 204 when we replace, 201 when we create.
        let dest_exists = self.store.metadata(&dest).await.is_ok();
        let status = if dest_exists {
            if !overwrite {
                return Err(SC::PRECONDITION_FAILED.into());
            }
            SC::NO_CONTENT
        } else {
            if !self.has_parent_collection(&dest).await {
                return Err(SC::CONFLICT.into());
            }
            SC::CREATED
        };

        // overwrite means replace, not merge.
        if dest_exists {
            self.store.delete(&dest).await?;
        }

        self.do_copy(path.clone(), &dest, dest.clone(), depth).await?;
        if method == DavMethod::Move {
            self.store.delete(&path).await?;
        }

        let mut res = Response::new(Body::empty());
        *res.status_mut() = status;
        Ok(res)
    }
}
