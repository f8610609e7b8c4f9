use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use http::method::InvalidMethod;

use crate::DavResult;
use crate::errors::DavError;

/// HTTP Methods supported by DavHandler.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[repr(u32)]
pub enum DavMethod {
    Head = 0x0001,
    Get = 0x0002,
    Put = 0x0004,
    Options = 0x0008,
    PropFind = 0x0010,
    PropPatch = 0x0020,
    MkCol = 0x0040,
    Copy = 0x0080,
    Move = 0x0100,
    Delete = 0x0200,
    Lock = 0x0400,
    Unlock = 0x0800,
}

// translate method into our own enum that has webdav methods as well.
pub(crate) fn dav_method(m: &http::Method) -> DavResult<DavMethod> {
    let m = match *m {
        http::Method::HEAD => DavMethod::Head,
        http::Method::GET => DavMethod::Get,
        http::Method::PUT => DavMethod::Put,
        http::Method::DELETE => DavMethod::Delete,
        http::Method::OPTIONS => DavMethod::Options,
        _ => match m.as_str() {
            "PROPFIND" => DavMethod::PropFind,
            "PROPPATCH" => DavMethod::PropPatch,
            "MKCOL" => DavMethod::MkCol,
            "COPY" => DavMethod::Copy,
            "MOVE" => DavMethod::Move,
            "LOCK" => DavMethod::Lock,
            "UNLOCK" => DavMethod::Unlock,
            _ => return Err(DavError::UnknownDavMethod),
        },
    };
    Ok(m)
}

const ALL_METHODS: &[(DavMethod, &str)] = &[
    (DavMethod::Head, "HEAD"),
    (DavMethod::Get, "GET"),
    (DavMethod::Put, "PUT"),
    (DavMethod::Options, "OPTIONS"),
    (DavMethod::PropFind, "PROPFIND"),
    (DavMethod::PropPatch, "PROPPATCH"),
    (DavMethod::MkCol, "MKCOL"),
    (DavMethod::Copy, "COPY"),
    (DavMethod::Move, "MOVE"),
    (DavMethod::Delete, "DELETE"),
    (DavMethod::Lock, "LOCK"),
    (DavMethod::Unlock, "UNLOCK"),
];

/// A set of allowed [`DavMethod`]s.
#[derive(Clone, Copy, Debug)]
pub struct DavMethodSet(u32);

impl DavMethodSet {
    /// New set, all methods allowed.
    pub fn all() -> DavMethodSet {
        DavMethodSet(0xffffffff)
    }

    /// New empty set.
    pub fn none() -> DavMethodSet {
        DavMethodSet(0)
    }

    /// Add a method.
    pub fn add(&mut self, m: DavMethod) -> &Self {
        self.0 |= m as u32;
        self
    }

    /// Remove a method.
    pub fn remove(&mut self, m: DavMethod) -> &Self {
        self.0 &= !(m as u32);
        self
    }

    /// Check if a method is in the set.
    pub fn contains(&self, m: DavMethod) -> bool {
        self.0 & (m as u32) > 0
    }

    /// Generate a DavMethodSet from a list of method names. The group
    /// aliases "webdav-ro" and "webdav-rw" are also understood.
    pub fn from_vec(v: Vec<impl AsRef<str>>) -> Result<DavMethodSet, InvalidMethod> {
        const RO: u32 = DavMethod::Head as u32
            | DavMethod::Get as u32
            | DavMethod::Options as u32
            | DavMethod::PropFind as u32;

        let mut m: u32 = 0;
        for w in &v {
            m |= match w.as_ref().to_lowercase().as_str() {
                "head" => DavMethod::Head as u32,
                "get" => DavMethod::Get as u32,
                "put" => DavMethod::Put as u32,
                "delete" => DavMethod::Delete as u32,
                "options" => DavMethod::Options as u32,
                "propfind" => DavMethod::PropFind as u32,
                "proppatch" => DavMethod::PropPatch as u32,
                "mkcol" => DavMethod::MkCol as u32,
                "copy" => DavMethod::Copy as u32,
                "move" => DavMethod::Move as u32,
                "lock" => DavMethod::Lock as u32,
                "unlock" => DavMethod::Unlock as u32,
                "webdav-ro" => RO,
                "webdav-rw" => 0xffffffff,
                _ => {
                    // A trick to get at the value of http::method::InvalidMethod.
                    let invalid_method = http::method::Method::from_bytes(b"").unwrap_err();
                    return Err(invalid_method);
                }
            };
        }
        Ok(DavMethodSet(m))
    }

    // value for the Allow: response header.
    pub(crate) fn allow_value(&self) -> String {
        ALL_METHODS
            .iter()
            .filter(|(m, _)| self.contains(*m))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join(",")
    }
}

pub(crate) fn systemtime_to_httpdate(t: SystemTime) -> String {
    DateTime::<Utc>::from(t)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

pub(crate) fn systemtime_to_rfc3339(t: SystemTime) -> String {
    DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Secs, true)
}
