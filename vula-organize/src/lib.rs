//! The transactional event engine and organize-policy rules: the
//! single-writer core that owns `vula_peer::State` end to end, from
//! dispatch through validation, commit, persistence, and post-commit
//! triggers.

mod collaborators;
mod engine;
mod error;
#[cfg(feature = "cli-support")]
mod logging;
mod persistence;
mod result;
mod rules;

pub use collaborators::{Collaborators, HostsFileCollaborators, NullCollaborators};
pub use engine::Organize;
pub use error::EngineError;
#[cfg(feature = "cli-support")]
pub use logging::init_logging;
pub use result::{Action, EventResult, Trigger, TriggerResult, WriteKind, WriteOp};
pub use rules::PrefsField;

pub use persistence::{load, save};
