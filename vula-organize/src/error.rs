use thiserror::Error;
use vula_descriptor::DescriptorError;
use vula_peer::{PeerError, SchemaError};
use vula_types::ErrorKind;

/// The error taxonomy this crate can surface, matching the kinds named in
/// spec.md §7 that aren't already owned by `vula-descriptor`/`vula-peer`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("state file is corrupt: {0}")]
    CorruptState(String),

    #[error("io error persisting state: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// The §7 error kind, for callers (the eventual CLI shim's exit-code
    /// mapping, §6 "Exit codes") that need to classify a failure without
    /// string-matching `Display` output.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Descriptor(e) => e.kind(),
            Self::Peer(e) => e.kind(),
            Self::Schema(e) => e.kind(),
            Self::CorruptState(_) | Self::Io(_) => ErrorKind::CorruptState,
        }
    }
}
