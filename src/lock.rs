//! The lock manager is responsible for exclusive and shared write locks
//! on the DAV server. It is used to acquire a lock, release a lock,
//! discover existing locks, and evaluate `If:` header conditions against
//! them.
//!
//! A `LockManager` is an explicit instance: create one with
//! [`LockManager::new`], hand it to the `DavHandler` builder, and clone
//! it wherever needed - it is just a handle around the shared lock
//! table. Every table operation runs under a single short mutex section;
//! no store I/O ever happens while the table is locked.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use log::trace;
use parking_lot::Mutex;
use uuid::Uuid;
use xmltree::Element;

use crate::condition::{IfHeader, IfItem};
use crate::davpath::DavPath;

/// Scope of a write lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    Exclusive,
    Shared,
}

/// A granted write lock.
#[derive(Debug, Clone)]
pub struct Lock {
    /// Resource the lock was taken on.
    pub path: DavPath,
    pub scope: LockScope,
    /// Owner as submitted in the LOCK request body, echoed back in
    /// lockdiscovery.
    pub owner: Option<Element>,
    /// Depth: true means the lock covers the whole subtree.
    pub deep: bool,
    /// Requested timeout; `None` is infinite. Stored and reported, only
    /// enforced through [`LockManager::purge_expired`].
    pub timeout: Option<Duration>,
    pub acquired_at: SystemTime,
    /// Unique opaque token, `opaquelocktoken:<uuid>`.
    pub token: String,
}

impl Lock {
    /// Build a new, not yet acquired lock with a fresh token.
    pub fn new(path: DavPath, scope: LockScope) -> Lock {
        Lock {
            path,
            scope,
            owner: None,
            deep: false,
            timeout: None,
            acquired_at: SystemTime::now(),
            token: format!("opaquelocktoken:{}", Uuid::new_v4()),
        }
    }

    fn expired(&self, now: SystemTime) -> bool {
        match self.timeout {
            Some(t) => self.acquired_at + t < now,
            None => false,
        }
    }
}

/// A held lock stands in the way of the attempted operation. Carries
/// every lock that contributed to the conflict.
#[derive(Debug, Clone)]
pub struct LockConflict {
    pub locks: Vec<Lock>,
}

impl LockConflict {
    pub fn has_exclusive(&self) -> bool {
        self.locks.iter().any(|l| l.scope == LockScope::Exclusive)
    }
}

/// Result of evaluating an `If:` header.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Value of the OR over all condition lists.
    pub result: bool,
    /// Held locks whose token was named by any condition list.
    pub matched: Vec<Lock>,
}

// resource key -> locks held directly on that resource, insertion order.
type LockTable = HashMap<String, Vec<Lock>>;

/// The lock table and its operations.
#[derive(Debug, Clone, Default)]
pub struct LockManager {
    table: Arc<Mutex<LockTable>>,
}

// all keys from the resource up to "/", nearest first.
fn ancestor_keys(key: &str) -> Vec<String> {
    let mut v = vec![key.to_string()];
    let mut k = key;
    while k != "/" {
        k = match k.rfind('/') {
            Some(0) | None => "/",
            Some(i) => &k[..i],
        };
        v.push(k.to_string());
    }
    v
}

// prefix shared by all strict descendants of `key`.
fn descendant_prefix(key: &str) -> String {
    if key == "/" {
        "/".to_string()
    } else {
        format!("{}/", key)
    }
}

// own locks first, else the nearest locked ancestor's list.
fn discover_in(table: &LockTable, key: &str) -> Vec<Lock> {
    for k in ancestor_keys(key) {
        if let Some(locks) = table.get(&k) {
            if !locks.is_empty() {
                return locks.clone();
            }
        }
    }
    Vec::new()
}

// header etags come as "abc", W/"abc" or bare; held etags are bare.
fn etag_matches(header_tag: &str, actual: &str) -> bool {
    let t = header_tag.strip_prefix("W/").unwrap_or(header_tag);
    let t = t.strip_prefix('"').and_then(|t| t.strip_suffix('"')).unwrap_or(t);
    t == actual
}

impl LockManager {
    /// Create a new, empty lock manager.
    pub fn new() -> LockManager {
        LockManager::default()
    }

    /// Acquire a lock. Checks for conflicts up and down the path first:
    /// on the way up every locked ancestor is inspected, and for a deep
    /// lock every locked descendant as well. A conflict exists whenever
    /// the requested lock or the held lock is exclusive.
    pub fn acquire(&self, lock: Lock) -> Result<Lock, LockConflict> {
        let mut table = self.table.lock();
        let key = lock.path.key().to_string();

        for k in ancestor_keys(&key) {
            if let Some(held) = table.get(&k) {
                if !held.is_empty()
                    && (lock.scope == LockScope::Exclusive
                        || held.iter().any(|h| h.scope == LockScope::Exclusive))
                {
                    trace!("acquire {}: conflict at {}", lock.token, k);
                    return Err(LockConflict {
                        locks: held.clone(),
                    });
                }
            }
        }

        if lock.deep {
            let prefix = descendant_prefix(&key);
            for (k, held) in table.iter() {
                if k != &key
                    && k.starts_with(&prefix)
                    && !held.is_empty()
                    && (lock.scope == LockScope::Exclusive
                        || held.iter().any(|h| h.scope == LockScope::Exclusive))
                {
                    trace!("acquire {}: conflict below at {}", lock.token, k);
                    return Err(LockConflict {
                        locks: held.clone(),
                    });
                }
            }
        }

        trace!("acquire {}: granted on {}", lock.token, key);
        table.entry(key).or_default().push(lock.clone());
        Ok(lock)
    }

    /// Release the lock with the given token. Returns true if it was
    /// removed, true as well if the resource holds no locks at all, and
    /// false only if locks exist but none match the token.
    pub fn release(&self, path: &DavPath, token: &str) -> bool {
        let mut table = self.table.lock();
        let key = path.key();
        match table.get_mut(key) {
            None => true,
            Some(locks) => match locks.iter().position(|l| l.token == token) {
                Some(idx) => {
                    locks.remove(idx);
                    if locks.is_empty() {
                        table.remove(key);
                    }
                    true
                }
                None => false,
            },
        }
    }

    /// Locks covering the resource: its own, or else the nearest locked
    /// ancestor's. Empty if nothing up the path is locked.
    pub fn discover(&self, path: &DavPath) -> Vec<Lock> {
        let table = self.table.lock();
        discover_in(&table, path.key())
    }

    /// Reset the timeout of a held lock, returning the updated lock.
    pub fn refresh(&self, path: &DavPath, token: &str, timeout: Option<Duration>) -> Option<Lock> {
        let mut table = self.table.lock();
        let locks = table.get_mut(path.key())?;
        let lock = locks.iter_mut().find(|l| l.token == token)?;
        lock.timeout = timeout;
        lock.acquired_at = SystemTime::now();
        trace!("refresh {}", token);
        Some(lock.clone())
    }

    /// Evaluate an `If:` header condition against the lock table.
    ///
    /// The lists of the header are OR'ed, the conditions within a list
    /// AND'ed. State tokens are matched case-sensitively against the
    /// locks covering the list's resource; etags against the entries of
    /// `etags`, which the caller resolved up front (keyed by
    /// [`DavPath::key`], so no store I/O happens under the table mutex).
    ///
    /// A missing header (`None`) evaluates to true only if the context
    /// resource is unlocked. And independent of the disjunction's value:
    /// if the context resource is covered by a lock and no condition
    /// list named a valid held token, the evaluation fails with a
    /// `LockConflict` carrying the held locks.
    pub fn evaluate(
        &self,
        path: &DavPath,
        header: Option<&IfHeader>,
        etags: &HashMap<String, String>,
    ) -> Result<Evaluation, LockConflict> {
        let table = self.table.lock();
        let context_locks = discover_in(&table, path.key());

        let Some(header) = header else {
            if !context_locks.is_empty() {
                return Err(LockConflict {
                    locks: context_locks,
                });
            }
            return Ok(Evaluation {
                result: true,
                matched: Vec::new(),
            });
        };

        let mut result = false;
        let mut matched: Vec<Lock> = Vec::new();

        for list in &header.0 {
            // resolve the resource this list applies to.
            let (locks, ekey, valid) = match &list.resource {
                None => (context_locks.clone(), path.key().to_string(), true),
                Some(url) => match DavPath::from_str(url.path(), path.prefix()) {
                    Ok(p) => {
                        let l = discover_in(&table, p.key());
                        (l, p.key().to_string(), true)
                    }
                    // resource outside our namespace: conditions on it
                    // can never hold.
                    Err(_) => (Vec::new(), String::new(), false),
                },
            };

            let mut list_ok = true;
            for cond in &list.conditions {
                let holds = match &cond.item {
                    IfItem::StateToken(token) => {
                        let found = valid && locks.iter().any(|l| &l.token == token);
                        if found {
                            for l in locks.iter().filter(|l| &l.token == token) {
                                if !matched.iter().any(|m| m.token == l.token) {
                                    matched.push(l.clone());
                                }
                            }
                        }
                        trace!("evaluate: is-locked-with({}) = {}", token, found);
                        found
                    }
                    IfItem::ETag(tag) => {
                        let m = valid
                            && etags.get(&ekey).is_some_and(|actual| etag_matches(tag, actual));
                        trace!("evaluate: matches-etag({}) = {}", tag, m);
                        m
                    }
                };
                let holds = if cond.negate { !holds } else { holds };
                list_ok = list_ok && holds;
            }
            result = result || list_ok;
        }

        // locked, but no valid token presented.
        if !context_locks.is_empty() && matched.is_empty() {
            return Err(LockConflict {
                locks: context_locks,
            });
        }

        Ok(Evaluation { result, matched })
    }

    /// Drop every lock whose timeout has elapsed at `now`. Returns the
    /// number of locks removed. This is never called automatically:
    /// without it, lock timeouts are purely declarative.
    pub fn purge_expired(&self, now: SystemTime) -> usize {
        let mut table = self.table.lock();
        let mut removed = 0;
        table.retain(|_, locks| {
            let before = locks.len();
            locks.retain(|l| !l.expired(now));
            removed += before - locks.len();
            !locks.is_empty()
        });
        removed
    }
}
