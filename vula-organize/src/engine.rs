use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;
use vula_descriptor::Descriptor;
use vula_peer::{Peer, State, SystemState};

use crate::collaborators::{Collaborators, NullCollaborators};
use crate::error::EngineError;
use crate::persistence;
use crate::result::{Action, EventResult, Trigger, TriggerResult, WriteKind};
use crate::rules;

/// The engine handle: the single mutual-exclusion lock around `State`
/// (spec.md §5 "Scheduling model"), mirroring the way `server::Context`
/// wraps a `Mutex` around the database. Every public method here is one
/// RPC procedure from §6 ("RPC surface").
pub struct Organize<C: Collaborators = NullCollaborators> {
    state: Mutex<State>,
    collaborators: C,
    state_path: Option<PathBuf>,
}

impl Organize<NullCollaborators> {
    pub fn new(state: State) -> Self {
        Organize {
            state: Mutex::new(state),
            collaborators: NullCollaborators,
            state_path: None,
        }
    }
}

impl<C: Collaborators> Organize<C> {
    pub fn with_collaborators(state: State, collaborators: C) -> Self {
        Organize {
            state: Mutex::new(state),
            collaborators,
            state_path: None,
        }
    }

    /// Loads state from `path`, validating it, and persists back to `path`
    /// after every successful commit (§4.I "Persistence").
    pub fn load(path: impl AsRef<Path>, collaborators: C) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let state = persistence::load(&path)?;
        Ok(Organize {
            state: Mutex::new(state),
            collaborators,
            state_path: Some(path),
        })
    }

    pub fn persist_to(&mut self, path: impl Into<PathBuf>) {
        self.state_path = Some(path.into());
    }

    /// A read-only snapshot of the current state; cheap because `State` is
    /// a plain `Clone` (§9 "Deep cloning state per event").
    pub fn snapshot(&self) -> State {
        self.state.lock().clone()
    }

    pub fn show_peer(&self, vk_base64: &str) -> Option<Peer> {
        let state = self.state.lock();
        state
            .peers
            .iter()
            .find(|(vk, _)| vk.to_base64() == vk_base64)
            .map(|(_, peer)| peer.clone())
    }

    pub fn peer_ids(&self, enabled_only: bool) -> Vec<String> {
        self.state
            .lock()
            .peers
            .values()
            .filter(|peer| !enabled_only || peer.enabled)
            .map(Peer::id)
            .collect()
    }

    /// Runs `handler` against a fresh clone of the live state, validates
    /// it, and either commits-and-triggers or rolls back (§4.F
    /// "Execution", steps 1-9).
    fn apply<F>(&self, event_name: &str, handler: F) -> EventResult
    where
        F: FnOnce(&mut State, &mut EventResult),
    {
        let mut guard = self.state.lock();
        let mut next_state = guard.clone();
        let mut result = EventResult::new(event_name);

        handler(&mut next_state, &mut result);

        if result.error.is_none() {
            if let Err(schema_err) = next_state.validate() {
                result.error = Some(format!("{}: {schema_err}", schema_err.kind()));
            }
        }

        if result.error.is_some() {
            log::warn!("event {event_name} rolled back: {}", result.error.as_deref().unwrap_or(""));
            return result;
        }

        *guard = next_state;
        log::info!("event {event_name} committed: {}", result.summary());

        if let Some(path) = &self.state_path {
            if let Err(err) = persistence::save(path, &guard) {
                log::warn!("failed to persist state after {event_name}: {err}");
            }
        }

        let hosts_entries: Vec<(String, IpAddr)> = guard
            .enabled_hostnames()
            .into_iter()
            .map(|(name, addr)| (name.to_string(), addr))
            .collect();
        let descriptors: Vec<String> = guard.peers.values().map(|peer| peer.descriptor().encode_line()).collect();
        drop(guard);

        for trigger in result.triggers.clone() {
            let outcome = self.run_trigger(&trigger, &hosts_entries, &descriptors);
            if let Err(err) = &outcome {
                log::warn!("trigger {} failed: {err}", trigger.name);
            }
            result.trigger_results.push(TriggerResult {
                trigger,
                outcome,
            });
        }

        result
    }

    fn run_trigger(
        &self,
        trigger: &Trigger,
        hosts_entries: &[(String, IpAddr)],
        descriptors: &[String],
    ) -> Result<String, String> {
        match trigger.name.as_str() {
            "sync_peer" => self.collaborators.sync_peer(trigger.args.first().map(String::as_str).unwrap_or("")),
            "sync_peer_removed" => self
                .collaborators
                .sync_peer_removed(trigger.args.first().map(String::as_str).unwrap_or("")),
            "sync_interface" => self.collaborators.sync_interface(),
            "sync_hosts" => self.collaborators.sync_hosts(hosts_entries),
            "sync_publish" => self.collaborators.sync_publish(descriptors),
            other => Err(format!("unknown trigger: {other}")),
        }
    }

    pub fn new_system_state(&self, snapshot: SystemState) -> EventResult {
        self.apply("NEW_SYSTEM_STATE", |state, result| {
            rules::new_system_state(state, result, snapshot)
        })
    }

    pub fn incoming_descriptor(&self, descriptor: Descriptor, now: SystemTime) -> EventResult {
        self.apply("INCOMING_DESCRIPTOR", |state, result| {
            rules::incoming_descriptor(state, result, descriptor, now)
        })
    }

    pub fn process_descriptor_string(&self, line: &str, now: SystemTime) -> EventResult {
        match Descriptor::parse_line(line) {
            Ok(descriptor) => self.incoming_descriptor(descriptor, now),
            Err(err) => {
                let mut result = EventResult::new("INCOMING_DESCRIPTOR");
                result.actions.push(Action::Reject(err.to_string()));
                result
            },
        }
    }

    pub fn user_edit(&self, op: WriteKind, path: &str, value: &str) -> EventResult {
        self.apply("USER_EDIT", |state, result| {
            if let Err(err) = rules::user_edit(state, result, op, path, value) {
                result.error = Some(format!("{}: {err}", vula_types::ErrorKind::SchemaError));
            }
        })
    }

    pub fn release_gateway(&self) -> EventResult {
        self.apply("RELEASE_GATEWAY", |state, result| rules::release_gateway(state, result))
    }

    pub fn expire_tick(&self, now: u64) -> EventResult {
        self.apply("EXPIRE_TICK", |state, result| rules::expire_tick(state, result, now))
    }

    pub fn show_prefs(&self) -> vula_peer::Prefs {
        self.state.lock().prefs.clone()
    }

    /// The textual form of every peer's currently-stored descriptor,
    /// keyed by `vk` (used by `sync_publish` and the `our_latest_descriptors`
    /// query from §6).
    pub fn our_latest_descriptors(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .peers
            .values()
            .map(|peer| (peer.id(), peer.descriptor().encode_line()))
            .collect()
    }
}
