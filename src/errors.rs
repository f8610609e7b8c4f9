use std::error::Error;
use std::io;

use http::StatusCode;

use crate::lock::{Lock, LockConflict, LockScope};
use crate::store::FsError;

pub(crate) type DavResult<T> = Result<T, DavError>;

#[derive(Debug)]
pub(crate) enum DavError {
    XmlReadError,  // error reading/parsing xml
    XmlParseError, // error interpreting xml
    InvalidPath,   // error parsing path
    IllegalPath,   // path not valid here
    ForbiddenPath, // too many dotdots, or a fragment
    UnknownDavMethod,
    // Malformed If: header. Carries the offending header and the byte
    // offset of the token that failed to parse.
    ConditionSyntax { header: String, pos: usize },
    // A held lock stands in the way. Carries the conflicting locks.
    LockConflict(Vec<Lock>),
    Status(StatusCode),
    FsError(FsError),
    IoError(io::Error),
    XmlWriterError(xml::writer::Error),
}

impl std::fmt::Display for DavError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DavError::XmlWriterError(_) => write!(f, "XML generate error"),
            DavError::IoError(_) => write!(f, "I/O error"),
            DavError::ConditionSyntax { header, pos } => {
                write!(f, "syntax error in condition '{}' at {}", header, pos)
            }
            DavError::LockConflict(locks) => write!(f, "conflicting locks: {:?}", locks),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl Error for DavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DavError::FsError(e) => Some(e),
            DavError::IoError(e) => Some(e),
            DavError::XmlWriterError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StatusCode> for DavError {
    fn from(sc: StatusCode) -> Self {
        DavError::Status(sc)
    }
}

impl From<FsError> for DavError {
    fn from(e: FsError) -> Self {
        DavError::FsError(e)
    }
}

impl From<io::Error> for DavError {
    fn from(e: io::Error) -> Self {
        DavError::IoError(e)
    }
}

impl From<xml::writer::Error> for DavError {
    fn from(e: xml::writer::Error) -> Self {
        DavError::XmlWriterError(e)
    }
}

impl From<LockConflict> for DavError {
    fn from(e: LockConflict) -> Self {
        DavError::LockConflict(e.locks)
    }
}

pub(crate) fn fserror_to_status(e: FsError) -> StatusCode {
    match e {
        FsError::NotFound => StatusCode::NOT_FOUND,
        FsError::Exists => StatusCode::METHOD_NOT_ALLOWED,
        FsError::Forbidden => StatusCode::FORBIDDEN,
        FsError::IsFile => StatusCode::CONFLICT,
        FsError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        FsError::GeneralFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl DavError {
    pub(crate) fn statuscode(&self) -> StatusCode {
        match self {
            DavError::XmlReadError => StatusCode::BAD_REQUEST,
            DavError::XmlParseError => StatusCode::BAD_REQUEST,
            DavError::InvalidPath => StatusCode::BAD_REQUEST,
            DavError::IllegalPath => StatusCode::BAD_GATEWAY,
            DavError::ForbiddenPath => StatusCode::FORBIDDEN,
            DavError::UnknownDavMethod => StatusCode::NOT_IMPLEMENTED,
            DavError::ConditionSyntax { .. } => StatusCode::PRECONDITION_FAILED,
            DavError::LockConflict(locks) => {
                if locks.iter().any(|l| l.scope == LockScope::Exclusive) {
                    StatusCode::LOCKED
                } else {
                    StatusCode::PRECONDITION_FAILED
                }
            }
            DavError::Status(sc) => *sc,
            DavError::FsError(e) => fserror_to_status(*e),
            DavError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DavError::XmlWriterError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
