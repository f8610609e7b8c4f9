//! `Webdav` (RFC4918) is HTTP (GET/HEAD/PUT/DELETE) plus a bunch of extra
//! methods for authoring and locking remote resources.
//!
//! This crate implements a webdav handler for Rust, using the types from
//! the `http` crate. You supply a "store" for backend storage (a
//! hierarchical namespace of files and collections that can also carry
//! flat attributes, used for DAV properties), and a `LockManager` that
//! owns the webdav lock table. With some glue code the handler can be
//! used from HTTP server libraries/frameworks such as hyper or axum.
//!
//! The handler implements the authoring methods (PUT, MKCOL, COPY, MOVE,
//! DELETE), locking (LOCK/UNLOCK) with full `If:` header conditional
//! request evaluation, and property query/update (PROPFIND/PROPPATCH)
//! with multistatus responses. GET/HEAD/OPTIONS are passed through to the
//! store so the handler can double as a plain fileserver.
//!
//! Included is one store:
//!
//! - memstore: ephemeral in-memory store. supports DAV properties.
//!
//! Locks are kept in process memory and live until UNLOCK; lock timeouts
//! are recorded and reported, and can be reaped explicitly with
//! [`LockManager::purge_expired`].
//!
//! Example:
//!
//! ```no_run
//! use davkit::{DavHandler, LockManager, MemStore};
//!
//! let dav = DavHandler::builder()
//!     .store(MemStore::new())
//!     .lock_manager(LockManager::new())
//!     .build_handler();
//! ```
//!
//! Every incoming `http::Request` is then passed to `dav.handle(req)`,
//! which resolves to an `http::Response<davkit::Body>`.

mod davheaders;
mod errors;
mod handle_copymove;
mod handle_delete;
mod handle_gethead;
mod handle_lock;
mod handle_mkcol;
mod handle_options;
mod handle_props;
mod handle_put;
mod handler;
mod multistatus;
mod props;
mod util;
mod xmltree_ext;

pub mod body;
pub mod condition;
pub mod davpath;
pub mod lock;
pub mod memstore;
pub mod store;

pub(crate) use crate::errors::{DavError, DavResult};

pub use crate::body::Body;
pub use crate::davpath::DavPath;
pub use crate::handler::{DavConfig, DavHandler};
pub use crate::lock::{Lock, LockManager, LockScope};
pub use crate::memstore::MemStore;
pub use crate::store::{DavStore, FsError};
pub use crate::util::{DavMethod, DavMethodSet};
