use thiserror::Error;
use vula_types::{B64DecodeError, ErrorKind, InvalidHostname};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("missing field {0:?}")]
    MissingField(String),

    #[error("invalid value {1:?} for field {0:?}")]
    InvalidField(String, String),

    #[error("invalid hostname: {0}")]
    InvalidHostname(#[from] InvalidHostname),

    #[error("invalid key encoding: {0}")]
    InvalidKey(#[from] B64DecodeError),

    #[error("signature does not verify")]
    BadSignature,

    #[error("descriptor is not yet valid or has expired")]
    ExpiredDescriptor,

    #[error("descriptor must advertise at least one IPv4 or IPv6 address")]
    NoAddresses,

    #[error("no room for chunked field {key:?} at record size {record_max}")]
    DescriptorTooLarge { key: String, record_max: usize },
}

impl DescriptorError {
    /// The §7 error kind this variant is reported under. A descriptor that
    /// fails to parse is bucketed under `BadSignature` along with one that
    /// fails to verify: both mean "cannot be trusted", and neither gets far
    /// enough to reach a more specific check.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField(_)
            | Self::InvalidField(_, _)
            | Self::InvalidHostname(_)
            | Self::InvalidKey(_)
            | Self::NoAddresses
            | Self::BadSignature => ErrorKind::BadSignature,
            Self::ExpiredDescriptor => ErrorKind::ExpiredDescriptor,
            Self::DescriptorTooLarge { .. } => ErrorKind::DescriptorTooLarge,
        }
    }
}
