//! Utility module to handle the path part of an URL as a store path.
//!
//! A `DavPath` is the percent-decoded, normalized path of a request,
//! relative to the configured URL prefix. The trailing slash is
//! significant: it marks the path as naming a collection.
use std::error::Error;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::errors::DavError;

// Encode all non-unreserved characters, except '/'.
// See RFC3986, and https://en.wikipedia.org/wiki/Percent-encoding .
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Path information relative to a prefix.
#[derive(Clone)]
pub struct DavPath {
    path: String,
    prefix: String,
}

/// Error returned by the `DavPath` constructors.
#[derive(Debug)]
pub enum ParseError {
    /// cannot parse
    InvalidPath,
    /// outside of prefix
    IllegalPath,
    /// too many dotdots, or a fragment
    ForbiddenPath,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Error for ParseError {}

impl From<ParseError> for DavError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::InvalidPath => DavError::InvalidPath,
            ParseError::IllegalPath => DavError::IllegalPath,
            ParseError::ForbiddenPath => DavError::ForbiddenPath,
        }
    }
}

// make the path safe:
// - the raw path must consist of printable ascii
// - must be absolute
// - remove the query part (everything after ?), refuse fragments
// - merge consecutive slashes
// - process . and .., refusing escapes above the root
// - decode percent encoded bytes, failing on invalid encodings
// - no NUL or '/' inside a decoded segment
fn normalize_path(rp: &str) -> Result<String, ParseError> {
    if rp.bytes().any(|x| !(32..127).contains(&x)) {
        return Err(ParseError::InvalidPath);
    }

    let mut rawpath = rp;
    if let Some(pos) = rawpath.find(['?', '#']) {
        if rawpath.as_bytes()[pos] == b'#' {
            return Err(ParseError::ForbiddenPath);
        }
        rawpath = &rawpath[..pos];
    }

    if !rawpath.starts_with('/') {
        return Err(ParseError::InvalidPath);
    }

    let isdir = rawpath.ends_with('/');
    let mut segs: Vec<String> = Vec::new();
    for segment in rawpath.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segs.pop().is_none() {
                    return Err(ParseError::ForbiddenPath);
                }
            }
            s => {
                let decoded = percent_decode_str(s)
                    .decode_utf8()
                    .map_err(|_| ParseError::InvalidPath)?;
                if decoded.contains(['\0', '/']) {
                    return Err(ParseError::InvalidPath);
                }
                segs.push(decoded.into_owned());
            }
        }
    }

    let mut path = String::with_capacity(rawpath.len());
    for seg in &segs {
        path.push('/');
        path.push_str(seg);
    }
    if isdir || path.is_empty() {
        path.push('/');
    }
    Ok(path)
}

/// Comparison ignores any trailing slash, so /foo == /foo/
impl PartialEq for DavPath {
    fn eq(&self, rhs: &DavPath) -> bool {
        self.prefix == rhs.prefix && self.key() == rhs.key()
    }
}

impl std::fmt::Display for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_url_string_with_prefix())
    }
}

impl std::fmt::Debug for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self.as_url_string_with_prefix())
    }
}

impl DavPath {
    /// from an URL encoded path and (not encoded) prefix.
    pub fn from_str(src: &str, prefix: &str) -> Result<DavPath, ParseError> {
        let path = normalize_path(src)?;
        let prefix = prefix.trim_end_matches('/');
        if !path.starts_with(prefix) {
            return Err(ParseError::IllegalPath);
        }
        if path.len() != prefix.len() && path.as_bytes().get(prefix.len()) != Some(&b'/') {
            return Err(ParseError::IllegalPath);
        }
        let mut rest = &path[prefix.len()..];
        if rest.is_empty() {
            rest = "/";
        }
        Ok(DavPath {
            path: rest.to_string(),
            prefix: prefix.to_string(),
        })
    }

    /// from request.uri
    pub(crate) fn from_uri(uri: &http::uri::Uri, prefix: &str) -> Result<DavPath, ParseError> {
        match uri.path() {
            // asterisk-form, only OPTIONS sends this.
            "*" => Ok(DavPath {
                path: "/".to_string(),
                prefix: String::new(),
            }),
            path if path.starts_with('/') => DavPath::from_str(path, prefix),
            _ => Err(ParseError::InvalidPath),
        }
    }

    /// as decoded string, no prefix.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// The path with the trailing slash removed (the root stays "/").
    /// This is the form the lock table and etag maps are keyed by.
    pub(crate) fn key(&self) -> &str {
        match self.path.strip_suffix('/') {
            Some(p) if !p.is_empty() => p,
            _ => &self.path,
        }
    }

    /// as URL encoded string, with prefix.
    pub fn as_url_string_with_prefix(&self) -> String {
        let mut p = utf8_percent_encode(&self.prefix, PATH_ENCODE_SET).to_string();
        p.push_str(&utf8_percent_encode(&self.path, PATH_ENCODE_SET).to_string());
        p
    }

    /// is this a collection i.e. does the original URL path end in "/".
    pub fn is_collection(&self) -> bool {
        self.path.ends_with('/')
    }

    /// return the URL prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// add a slash to the end of the path (if not already present).
    pub(crate) fn add_slash(&mut self) {
        if !self.is_collection() {
            self.path.push('/');
        }
    }

    pub(crate) fn add_slash_if(&mut self, b: bool) {
        if b && !self.is_collection() {
            self.path.push('/');
        }
    }

    /// The parent collection. The parent of the root is the root.
    pub(crate) fn parent(&self) -> DavPath {
        let key = self.key();
        let path = match key.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(i) => format!("{}/", &key[..i]),
        };
        DavPath {
            path,
            prefix: self.prefix.clone(),
        }
    }

    /// The filename is the last segment of the path. Can be empty.
    pub(crate) fn file_name(&self) -> &str {
        self.path.split('/').filter(|s| !s.is_empty()).next_back().unwrap_or("")
    }

    /// Add a segment to the end of the path.
    pub(crate) fn push_segment(&mut self, seg: &str) {
        if !self.is_collection() {
            self.path.push('/');
        }
        self.path.push_str(seg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize() {
        let p = DavPath::from_str("/a//b/./c%20d", "").unwrap();
        assert_eq!(p.as_str(), "/a/b/c d");
        assert!(!p.is_collection());
        let p = DavPath::from_str("/a/b/../c/", "").unwrap();
        assert_eq!(p.as_str(), "/a/c/");
        assert!(p.is_collection());
    }

    #[test]
    fn dotdot_escape_refused() {
        assert!(DavPath::from_str("/../etc/passwd", "").is_err());
        assert!(DavPath::from_str("/a/../../b", "").is_err());
    }

    #[test]
    fn fragment_refused() {
        assert!(DavPath::from_str("/a/b#frag", "").is_err());
    }

    #[test]
    fn prefix_stripping() {
        let p = DavPath::from_str("/dav/a/b", "/dav").unwrap();
        assert_eq!(p.as_str(), "/a/b");
        assert_eq!(p.as_url_string_with_prefix(), "/dav/a/b");
        assert!(DavPath::from_str("/other/a", "/dav").is_err());
        let root = DavPath::from_str("/dav", "/dav").unwrap();
        assert_eq!(root.as_str(), "/");
    }

    #[test]
    fn trailing_slash_equality() {
        let a = DavPath::from_str("/a/b", "").unwrap();
        let b = DavPath::from_str("/a/b/", "").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.key(), "/a/b");
        assert_eq!(b.key(), "/a/b");
    }

    #[test]
    fn parent_and_filename() {
        let p = DavPath::from_str("/a/b/c/", "").unwrap();
        assert_eq!(p.parent().as_str(), "/a/b/");
        assert_eq!(p.file_name(), "c");
        let root = DavPath::from_str("/", "").unwrap();
        assert_eq!(root.parent().as_str(), "/");
        assert_eq!(root.file_name(), "");
    }
}
