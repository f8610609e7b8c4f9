//! Contains the structs and traits that define a resource store backend.
//!
//! The handler core never touches storage directly; everything goes
//! through [`DavStore`]. A store is a hierarchical namespace of files and
//! collections. Every resource can additionally carry a flat set of
//! named string attributes, which the handler uses to persist dead DAV
//! properties.
use std::error::Error;
use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use dyn_clone::{DynClone, clone_trait_object};
use futures_util::future::BoxFuture;

use crate::davpath::DavPath;

/// Errors the store can return. The handler maps these to HTTP status
/// codes at the dispatch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotFound,
    Exists,
    Forbidden,
    /// a path segment other than the last resolved to a file.
    IsFile,
    NotImplemented,
    GeneralFailure,
}

pub type FsResult<T> = Result<T, FsError>;

/// Convenience alias for the boxed futures the store traits return.
pub type FsFuture<'a, T> = BoxFuture<'a, FsResult<T>>;

impl std::fmt::Display for FsError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Error for FsError {}

/// The kind of a resource: a plain file or a collection (directory).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    File,
    Collection,
}

/// Resource metadata: kind, size and timestamps in one lookup.
#[derive(Debug, Clone)]
pub struct Meta {
    pub kind: ResourceKind,
    pub len: u64,
    pub modified: SystemTime,
    pub created: Option<SystemTime>,
}

impl Meta {
    pub fn is_collection(&self) -> bool {
        self.kind == ResourceKind::Collection
    }

    /// Strong etag over length and modification time, apache style.
    pub fn etag(&self) -> String {
        if let Ok(t) = self.modified.duration_since(UNIX_EPOCH) {
            let micros = t.as_secs() * 1_000_000 + u64::from(t.subsec_nanos()) / 1000;
            return format!("{:x}-{:x}", self.len, micros);
        }
        format!("{:x}", self.len)
    }
}

/// A directory entry: the child's name plus its metadata.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub meta: Meta,
}

/// The trait that defines a resource store.
///
/// Methods return boxed futures so the trait stays object safe; a store
/// handle is cloned into every request.
pub trait DavStore: Debug + Send + Sync + DynClone {
    /// Metadata of the resource at `path` (this doubles as the
    /// existence check).
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Meta>;

    /// The ordered children of a collection.
    fn read_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Vec<DirEntry>>;

    /// Read the full contents of a file.
    fn read<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Bytes>;

    /// Open a file for writing, creating or truncating it. The parent
    /// must exist and be a collection.
    fn open_write<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavSink>>;

    /// Create a collection. The parent must exist and be a collection.
    fn create_collection<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()>;

    /// Recursively delete the resource and everything below it.
    /// Returns the number of resources actually removed.
    fn delete<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, usize>;

    /// Names of all attributes present on the resource.
    fn attr_names<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Vec<String>>;

    /// Read one attribute.
    fn get_attr<'a>(&'a self, path: &'a DavPath, name: &'a str) -> FsFuture<'a, Option<String>>;

    /// Write one attribute. `None` removes it.
    fn set_attr<'a>(
        &'a self,
        path: &'a DavPath,
        name: &'a str,
        value: Option<String>,
    ) -> FsFuture<'a, ()>;
}

clone_trait_object! {DavStore}

/// Byte sink returned by [`DavStore::open_write`].
pub trait DavSink: Debug + Send {
    /// Append a chunk.
    fn write_bytes<'a>(&'a mut self, buf: Bytes) -> FsFuture<'a, ()>;

    /// Flush; the write is visible to other requests afterwards.
    fn flush<'a>(&'a mut self) -> FsFuture<'a, ()>;
}
