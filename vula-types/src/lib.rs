//! Primitives shared by the rest of the vula workspace: fixed-length
//! base64-stringified byte arrays, the DNS-form hostname type, and the
//! handful of error kinds that don't belong to any one layer.

mod bytes;
mod hostname;

pub use bytes::{B64Bytes, B64DecodeError};
pub use hostname::{Hostname, InvalidHostname};

/// The error kinds named in the descriptor/peer/engine state model. Each
/// crate that produces one of these wraps it in its own error enum rather
/// than returning this type directly, the same way the teacher's
/// `ServerError` owns a small, closed set of variants instead of exposing
/// `rusqlite::Error` at its public boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadSignature,
    Replay,
    ExpiredDescriptor,
    Bogon,
    NameConflict,
    IpConflict,
    PkConflict,
    GatewayConflict,
    SchemaError,
    NotFound,
    DescriptorTooLarge,
    CorruptState,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BadSignature => "BadSignature",
            Self::Replay => "Replay",
            Self::ExpiredDescriptor => "ExpiredDescriptor",
            Self::Bogon => "Bogon",
            Self::NameConflict => "NameConflict",
            Self::IpConflict => "IpConflict",
            Self::PkConflict => "PkConflict",
            Self::GatewayConflict => "GatewayConflict",
            Self::SchemaError => "SchemaError",
            Self::NotFound => "NotFound",
            Self::DescriptorTooLarge => "DescriptorTooLarge",
            Self::CorruptState => "CorruptState",
        };
        f.write_str(s)
    }
}
