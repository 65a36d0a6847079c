use vula_descriptor::VerifyKeyBytes;

/// One of the named outcomes an organize-rule event can produce (spec.md
/// §4.G "Actions"). The observable half of a [`EventResult`] — `writes` is
/// the mechanical half underneath it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    AcceptNewPeer(VerifyKeyBytes),
    UpdatePeerDescriptor(VerifyKeyBytes),
    RemovePeer(VerifyKeyBytes),
    Reject(String),
    Ignore(String),
    AdjustToNewSystemState,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::AcceptNewPeer(vk) => write!(f, "ACCEPT_NEW_PEER({})", vk.to_base64()),
            Action::UpdatePeerDescriptor(vk) => write!(f, "UPDATE_PEER_DESCRIPTOR({})", vk.to_base64()),
            Action::RemovePeer(vk) => write!(f, "REMOVE_PEER({})", vk.to_base64()),
            Action::Reject(reason) => write!(f, "REJECT({reason})"),
            Action::Ignore(reason) => write!(f, "IGNORE({reason})"),
            Action::AdjustToNewSystemState => write!(f, "ADJUST_TO_NEW_SYSTEM_STATE"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteKind {
    Set,
    Add,
    Remove,
}

/// One mutation an action applied to `next_state`, recorded for the
/// replay property (§4.F "Write operations" / §8 "Replay property").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteOp {
    pub kind: WriteKind,
    pub path: String,
    pub value: String,
}

impl WriteOp {
    pub fn set(path: impl Into<String>, value: impl Into<String>) -> Self {
        WriteOp {
            kind: WriteKind::Set,
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn add(path: impl Into<String>, value: impl Into<String>) -> Self {
        WriteOp {
            kind: WriteKind::Add,
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn remove(path: impl Into<String>, value: impl Into<String>) -> Self {
        WriteOp {
            kind: WriteKind::Remove,
            path: path.into(),
            value: value.into(),
        }
    }
}

/// A post-commit side effect, registered as data rather than a closure
/// (§9 "Triggers") so it can be dispatched against whichever
/// `Collaborators` implementation the caller wired up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trigger {
    pub name: String,
    pub args: Vec<String>,
}

impl Trigger {
    pub fn new(name: &str, args: Vec<String>) -> Self {
        Trigger {
            name: name.to_string(),
            args,
        }
    }
}

/// The outcome of invoking one trigger's named collaborator method. Caught
/// per-call: a failing trigger never aborts the ones after it (§4.F step 8,
/// §7 "Trigger failures").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerResult {
    pub trigger: Trigger,
    pub outcome: Result<String, String>,
}

/// The record of one event's execution (spec.md §3/§4.F): what it decided
/// (`actions`), how it mutated state (`writes`), what it asked to happen
/// afterward (`triggers`/`trigger_results`), and whether it was rolled back
/// (`error`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventResult {
    pub event: String,
    pub actions: Vec<Action>,
    pub writes: Vec<WriteOp>,
    pub triggers: Vec<Trigger>,
    pub trigger_results: Vec<TriggerResult>,
    pub error: Option<String>,
}

impl EventResult {
    pub fn new(event: &str) -> Self {
        EventResult {
            event: event.to_string(),
            ..Default::default()
        }
    }

    /// `"OK: <actions>"` or `"ERROR: <kind>: <detail>"` (§7 "User-visible
    /// behavior").
    pub fn summary(&self) -> String {
        match &self.error {
            Some(err) => format!("ERROR: {err}"),
            None => {
                let actions = self
                    .actions
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("OK: {actions}")
            },
        }
    }
}
