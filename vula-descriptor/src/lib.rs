//! The signed, self-describing peer descriptor exchanged over mDNS, and the
//! TXT-record chunking used to fit it into a DNS-SD record set.

pub mod chunk;
mod descriptor;
mod error;

pub use chunk::{chunk, unchunk};
pub use descriptor::{Descriptor, PqPublicKey, SignatureBytes, VerifyKeyBytes, WgPublicKey, MAX_CLOCK_SKEW};
pub use error::DescriptorError;

/// The mDNS service label descriptors are published under (§6).
pub const SERVICE_LABEL: &str = "_opabinia._udp.local.";
