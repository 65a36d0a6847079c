use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use vula_peer::{Prefs, State, SystemState};

use crate::error::EngineError;

const STATE_VERSION: u32 = 1;

/// The on-disk shape of `State` (spec.md §6 "Persisted state file"): a
/// single TOML document, `{version, peers, prefs, system_state}`. Kept as
/// its own DTO, distinct from `vula_peer::State`, the way the teacher keeps
/// `ConfigFile` distinct from the in-memory types it populates.
#[derive(Serialize, Deserialize)]
struct PersistedState {
    version: u32,
    #[serde(default)]
    peers: std::collections::BTreeMap<String, vula_peer::Peer>,
    #[serde(default)]
    prefs: Prefs,
    #[serde(default)]
    system_state: SystemState,
}

impl From<&State> for PersistedState {
    fn from(state: &State) -> Self {
        PersistedState {
            version: STATE_VERSION,
            peers: state.peers.iter().map(|(vk, peer)| (vk.to_base64(), peer.clone())).collect(),
            prefs: state.prefs.clone(),
            system_state: state.system.clone(),
        }
    }
}

impl TryFrom<PersistedState> for State {
    type Error = EngineError;

    fn try_from(persisted: PersistedState) -> Result<Self, Self::Error> {
        let mut peers = std::collections::BTreeMap::new();
        for (vk_b64, peer) in persisted.peers {
            let vk = vula_descriptor::VerifyKeyBytes::from_base64(&vk_b64)
                .map_err(|err| EngineError::CorruptState(format!("bad peer key {vk_b64:?}: {err}")))?;
            peers.insert(vk, peer);
        }

        let state = State {
            peers,
            prefs: persisted.prefs,
            system: persisted.system_state,
        };
        state
            .validate()
            .map_err(|err| EngineError::CorruptState(err.to_string()))?;
        Ok(state)
    }
}

/// Loads and validates a state file. Any parse failure or invariant
/// violation is fatal (`CorruptState`, §7 "Propagation") — this crate never
/// guesses at a partially-readable state.
pub fn load(path: &Path) -> Result<State, EngineError> {
    let contents = std::fs::read_to_string(path)?;
    let persisted: PersistedState =
        toml::from_str(&contents).map_err(|err| EngineError::CorruptState(err.to_string()))?;
    persisted.try_into()
}

/// Atomically overwrites `path` with the serialized state: write to a
/// `NamedTempFile` in the same directory, then `persist()` (rename) over
/// the destination, so a crash mid-write never corrupts the last-good file
/// (§4.I "Persistence", §5 "Shared resources").
pub fn save(path: &Path, state: &State) -> Result<(), EngineError> {
    let persisted = PersistedState::from(state);
    let body = toml::to_string_pretty(&persisted).expect("State always serializes to TOML");

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(body.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| EngineError::Io(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;
    use vula_descriptor::{Descriptor, PqPublicKey, WgPublicKey};
    use vula_peer::Peer;

    fn sample_state() -> State {
        let signing_key = SigningKey::generate(&mut OsRng);
        let descriptor = Descriptor::sign(
            &signing_key,
            WgPublicKey::from([1u8; 32]),
            PqPublicKey::from([2u8; 64]),
            1,
            3600,
            51820,
            "alice.local".parse().unwrap(),
            vec!["10.0.0.1".parse().unwrap()],
            vec![],
            vec![],
            false,
        );
        let mut state = State::default();
        state
            .system
            .current_subnets
            .insert("10.0.0.0/24".parse().unwrap(), vec![]);
        let peer = Peer::from_descriptor(descriptor, false, true);
        state.peers.insert(peer.vk(), peer);
        state
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        let state = sample_state();

        save(&path, &state).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded, state);
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "only the final file should remain, no leftover temp file");
    }

    #[test]
    fn corrupt_toml_is_reported_not_panicked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();
        assert!(matches!(load(&path), Err(EngineError::CorruptState(_))));
    }

    #[test]
    fn state_failing_validation_is_corrupt_not_panicked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        let mut state = sample_state();
        let mut second = vula_peer::Peer::from_descriptor(
            Descriptor::sign(
                &SigningKey::generate(&mut OsRng),
                WgPublicKey::from([9u8; 32]),
                PqPublicKey::from([9u8; 64]),
                1,
                3600,
                51820,
                "bob.local".parse().unwrap(),
                vec!["10.0.0.1".parse().unwrap()],
                vec![],
                vec![],
                false,
            ),
            false,
            true,
        );
        second.use_as_gateway = false;
        state.peers.insert(second.vk(), second);
        // two peers sharing the enabled IP 10.0.0.1: writing this directly
        // bypasses the engine's validate-before-commit, simulating a
        // hand-edited or corrupted file.
        save(&path, &state).unwrap();
        assert!(matches!(load(&path), Err(EngineError::CorruptState(_))));
    }
}
