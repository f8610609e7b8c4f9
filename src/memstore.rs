//! Simple in-memory store.
//!
//! This implementation has state - if you create a new instance in a
//! handler(), it will be empty every time.
//!
//! This means you have to create the instance once, using `MemStore::new`,
//! store it in your handler struct, and clone() it every time you pass it
//! to the DavHandler. As a MemStore struct is just a handle, cloning is
//! cheap.
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use bytes::Bytes;
use futures_util::FutureExt;
use log::trace;

use crate::davpath::DavPath;
use crate::store::*;

type Table = BTreeMap<String, MemNode>;

/// Ephemeral in-memory store.
#[derive(Debug)]
pub struct MemStore {
    table: Arc<Mutex<Table>>,
}

#[derive(Debug, Clone)]
enum MemNode {
    Dir(MemDirNode),
    File(MemFileNode),
}

#[derive(Debug, Clone)]
struct MemDirNode {
    attrs: HashMap<String, String>,
    mtime: SystemTime,
    crtime: SystemTime,
}

#[derive(Debug, Clone)]
struct MemFileNode {
    attrs: HashMap<String, String>,
    mtime: SystemTime,
    crtime: SystemTime,
    data: Vec<u8>,
}

#[derive(Debug)]
struct MemSink {
    table: Arc<Mutex<Table>>,
    key: String,
}

// node map key: the path with the trailing slash stripped, "/" for root.
fn node_key(path: &DavPath) -> String {
    let s = path.as_str();
    match s.strip_suffix('/') {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => "/".to_string(),
    }
}

fn parent_key(key: &str) -> String {
    match key.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => key[..i].to_string(),
    }
}

fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or("")
}

// prefix that all strict descendants of `key` start with.
fn child_prefix(key: &str) -> String {
    if key == "/" {
        "/".to_string()
    } else {
        format!("{}/", key)
    }
}

impl MemStore {
    /// Create a new "memstore" store, with just the root collection in it.
    pub fn new() -> Box<MemStore> {
        let mut table = Table::new();
        table.insert("/".to_string(), MemNode::new_dir());
        Box::new(MemStore {
            table: Arc::new(Mutex::new(table)),
        })
    }

    // parent must exist and be a collection.
    fn check_parent(table: &Table, key: &str) -> FsResult<()> {
        match table.get(&parent_key(key)) {
            Some(MemNode::Dir(_)) => Ok(()),
            Some(MemNode::File(_)) => Err(FsError::IsFile),
            None => Err(FsError::NotFound),
        }
    }

    fn touch_parent(table: &mut Table, key: &str) {
        if let Some(node) = table.get_mut(&parent_key(key)) {
            node.set_mtime(SystemTime::now());
        }
    }
}

impl Clone for MemStore {
    fn clone(&self) -> Self {
        MemStore {
            table: Arc::clone(&self.table),
        }
    }
}

impl DavStore for MemStore {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Meta> {
        async move {
            let table = self.table.lock().unwrap();
            let node = table.get(&node_key(path)).ok_or(FsError::NotFound)?;
            Ok(node.meta())
        }
        .boxed()
    }

    fn read_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Vec<DirEntry>> {
        async move {
            let table = self.table.lock().unwrap();
            let key = node_key(path);
            match table.get(&key) {
                Some(MemNode::Dir(_)) => {}
                Some(MemNode::File(_)) => return Err(FsError::Forbidden),
                None => return Err(FsError::NotFound),
            }
            let prefix = child_prefix(&key);
            let mut v = Vec::new();
            for (k, node) in table.range(prefix.clone()..) {
                if !k.starts_with(&prefix) {
                    break;
                }
                let rest = &k[prefix.len()..];
                if rest.is_empty() || rest.contains('/') {
                    continue;
                }
                v.push(DirEntry {
                    name: rest.to_string(),
                    meta: node.meta(),
                });
            }
            Ok(v)
        }
        .boxed()
    }

    fn read<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Bytes> {
        async move {
            let table = self.table.lock().unwrap();
            match table.get(&node_key(path)) {
                Some(MemNode::File(f)) => Ok(Bytes::from(f.data.clone())),
                Some(MemNode::Dir(_)) => Err(FsError::Forbidden),
                None => Err(FsError::NotFound),
            }
        }
        .boxed()
    }

    fn open_write<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavSink>> {
        async move {
            let mut table = self.table.lock().unwrap();
            let key = node_key(path);
            match table.get_mut(&key) {
                Some(MemNode::Dir(_)) => return Err(FsError::Forbidden),
                Some(MemNode::File(f)) => {
                    f.data.clear();
                    f.mtime = SystemTime::now();
                }
                None => {
                    Self::check_parent(&table, &key)?;
                    table.insert(key.clone(), MemNode::new_file());
                    Self::touch_parent(&mut table, &key);
                }
            }
            Ok(Box::new(MemSink {
                table: Arc::clone(&self.table),
                key,
            }) as Box<dyn DavSink>)
        }
        .boxed()
    }

    fn create_collection<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("memstore: create_collection {:?}", path);
            let mut table = self.table.lock().unwrap();
            let key = node_key(path);
            if table.contains_key(&key) {
                return Err(FsError::Exists);
            }
            Self::check_parent(&table, &key)?;
            table.insert(key.clone(), MemNode::new_dir());
            Self::touch_parent(&mut table, &key);
            Ok(())
        }
        .boxed()
    }

    fn delete<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, usize> {
        async move {
            let mut table = self.table.lock().unwrap();
            let key = node_key(path);
            if key == "/" {
                return Err(FsError::Forbidden);
            }
            let prefix = child_prefix(&key);
            // keys sharing the "/key" string prefix are contiguous; filter
            // out siblings like "/keyx" that share it without being below.
            let doomed: Vec<String> = table
                .range(key.clone()..)
                .map(|(k, _)| k)
                .take_while(|k| k.starts_with(&key))
                .filter(|k| *k == &key || k.starts_with(&prefix))
                .cloned()
                .collect();
            let count = doomed.len();
            for k in doomed {
                table.remove(&k);
            }
            if count > 0 {
                Self::touch_parent(&mut table, &key);
            }
            trace!("memstore: delete {:?}: {} removed", path, count);
            Ok(count)
        }
        .boxed()
    }

    fn attr_names<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Vec<String>> {
        async move {
            let table = self.table.lock().unwrap();
            let node = table.get(&node_key(path)).ok_or(FsError::NotFound)?;
            let mut names: Vec<String> = node.attrs().keys().cloned().collect();
            names.sort();
            Ok(names)
        }
        .boxed()
    }

    fn get_attr<'a>(&'a self, path: &'a DavPath, name: &'a str) -> FsFuture<'a, Option<String>> {
        async move {
            let table = self.table.lock().unwrap();
            let node = table.get(&node_key(path)).ok_or(FsError::NotFound)?;
            Ok(node.attrs().get(name).cloned())
        }
        .boxed()
    }

    fn set_attr<'a>(
        &'a self,
        path: &'a DavPath,
        name: &'a str,
        value: Option<String>,
    ) -> FsFuture<'a, ()> {
        async move {
            let mut table = self.table.lock().unwrap();
            let node = table.get_mut(&node_key(path)).ok_or(FsError::NotFound)?;
            match value {
                Some(v) => {
                    node.attrs_mut().insert(name.to_string(), v);
                }
                None => {
                    node.attrs_mut().remove(name);
                }
            }
            Ok(())
        }
        .boxed()
    }
}

impl DavSink for MemSink {
    fn write_bytes<'a>(&'a mut self, buf: Bytes) -> FsFuture<'a, ()> {
        async move {
            let mut table = self.table.lock().unwrap();
            match table.get_mut(&self.key) {
                Some(MemNode::File(f)) => {
                    f.data.extend_from_slice(&buf);
                    Ok(())
                }
                _ => Err(FsError::NotFound),
            }
        }
        .boxed()
    }

    fn flush<'a>(&'a mut self) -> FsFuture<'a, ()> {
        async move {
            let mut table = self.table.lock().unwrap();
            match table.get_mut(&self.key) {
                Some(node) => {
                    node.set_mtime(SystemTime::now());
                    Ok(())
                }
                None => Err(FsError::NotFound),
            }
        }
        .boxed()
    }
}

impl MemNode {
    fn new_dir() -> MemNode {
        MemNode::Dir(MemDirNode {
            attrs: HashMap::new(),
            mtime: SystemTime::now(),
            crtime: SystemTime::now(),
        })
    }

    fn new_file() -> MemNode {
        MemNode::File(MemFileNode {
            attrs: HashMap::new(),
            mtime: SystemTime::now(),
            crtime: SystemTime::now(),
            data: Vec::new(),
        })
    }

    fn meta(&self) -> Meta {
        match self {
            MemNode::Dir(d) => Meta {
                kind: ResourceKind::Collection,
                len: 0,
                modified: d.mtime,
                created: Some(d.crtime),
            },
            MemNode::File(f) => Meta {
                kind: ResourceKind::File,
                len: f.data.len() as u64,
                modified: f.mtime,
                created: Some(f.crtime),
            },
        }
    }

    fn set_mtime(&mut self, tm: SystemTime) {
        match self {
            MemNode::Dir(d) => d.mtime = tm,
            MemNode::File(f) => f.mtime = tm,
        }
    }

    fn attrs(&self) -> &HashMap<String, String> {
        match self {
            MemNode::Dir(d) => &d.attrs,
            MemNode::File(f) => &f.attrs,
        }
    }

    fn attrs_mut(&mut self) -> &mut HashMap<String, String> {
        match self {
            MemNode::Dir(d) => &mut d.attrs,
            MemNode::File(f) => &mut f.attrs,
        }
    }
}
