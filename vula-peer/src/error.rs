use std::net::IpAddr;

use thiserror::Error;
use vula_descriptor::VerifyKeyBytes;
use vula_types::ErrorKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("no peer found matching the given key")]
    NotFound,

    #[error("descriptor vf {new_vf} is not strictly greater than stored vf {stored_vf}")]
    Replay { stored_vf: u64, new_vf: u64 },
}

impl PeerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::Replay { .. } => ErrorKind::Replay,
        }
    }
}

/// A single reason the whole-state validator (§4.E) rejected a candidate
/// state. Each variant carries enough detail to build the "enumerate
/// colliding peer pairs" messages spec.md requires.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("peers {first} and {second} both claim enabled address {address}")]
    IpConflict {
        first: VerifyKeyBytes,
        second: VerifyKeyBytes,
        address: IpAddr,
    },

    #[error("peers {first} and {second} both resolve to display name {name:?}")]
    NameConflict {
        first: VerifyKeyBytes,
        second: VerifyKeyBytes,
        name: String,
    },

    #[error("more than one peer is flagged use_as_gateway: {0:?}")]
    GatewayConflict(Vec<VerifyKeyBytes>),

    #[error("peer {vk} has no enabled IP address")]
    NoEnabledAddress { vk: VerifyKeyBytes },

    #[error("peer {vk} has an enabled address {address} outside of every current subnet")]
    Bogon { vk: VerifyKeyBytes, address: IpAddr },

    #[error("peer {vk}'s descriptor vk does not match its map key")]
    KeyMismatch { vk: VerifyKeyBytes },
}

impl SchemaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IpConflict { .. } => ErrorKind::IpConflict,
            Self::NameConflict { .. } => ErrorKind::NameConflict,
            Self::GatewayConflict(_) => ErrorKind::GatewayConflict,
            Self::Bogon { .. } => ErrorKind::Bogon,
            Self::NoEnabledAddress { .. } | Self::KeyMismatch { .. } => ErrorKind::SchemaError,
        }
    }
}
