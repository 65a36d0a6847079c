use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use vula_descriptor::VerifyKeyBytes;
use vula_types::Hostname;

use crate::error::{PeerError, SchemaError};
use crate::peer::Peer;
use crate::prefs::Prefs;
use crate::system_state::SystemState;

/// The engine root (spec.md §3 "State"): the full peer set plus
/// preferences plus the local-network snapshot. `vula_organize::Engine`
/// wraps this with the event log and the write-op machinery; this crate
/// only owns the data and its own validation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct State {
    pub peers: BTreeMap<VerifyKeyBytes, Peer>,
    pub prefs: Prefs,
    pub system: SystemState,
}

impl State {
    pub fn with_ip(&self, addr: IpAddr) -> Result<&Peer, PeerError> {
        self.peers
            .values()
            .find(|peer| peer.has_ip(addr))
            .ok_or(PeerError::NotFound)
    }

    pub fn with_hostname(&self, name: &str) -> Result<&Peer, PeerError> {
        self.peers
            .values()
            .find(|peer| peer.nicknames().contains(name))
            .ok_or(PeerError::NotFound)
    }

    pub fn by_pk(&self, pk: &vula_descriptor::WgPublicKey) -> Result<&Peer, PeerError> {
        self.peers
            .values()
            .find(|peer| &peer.descriptor().pk == pk)
            .ok_or(PeerError::NotFound)
    }

    pub fn with_use_as_gateway(&self) -> Option<&Peer> {
        self.peers.values().find(|peer| peer.use_as_gateway)
    }

    /// Rebuilds all five aggregate invariants from scratch (§4.E) in one
    /// pass over `ip → [vk]` / `name → [vk]` / gateway-count maps, rather
    /// than re-running per-field schemas. Invariant 5 (strictly monotonic
    /// `vf` per peer) is enforced at the write boundary in
    /// [`Peer::apply_descriptor_update`] instead of here: `State` only ever
    /// holds a peer's *current* descriptor, so there is no history left to
    /// re-check.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut by_ip: BTreeMap<IpAddr, Vec<VerifyKeyBytes>> = BTreeMap::new();
        let mut by_name: BTreeMap<String, Vec<VerifyKeyBytes>> = BTreeMap::new();
        let mut gateways: Vec<VerifyKeyBytes> = Vec::new();

        for (key, peer) in &self.peers {
            if peer.vk() != *key {
                return Err(SchemaError::KeyMismatch { vk: *key });
            }

            if peer.use_as_gateway {
                gateways.push(*key);
            }

            if !peer.enabled {
                continue;
            }

            // Invariant 2 is "petname or *enabled nickname*", not just the
            // single resolved display name: every enabled nickname is
            // written to the hosts file by `enabled_hostnames`, so every one
            // of them has to be collision-checked, not only `peer.name()`'s
            // pick of the first one.
            let mut names: BTreeSet<String> = peer.enabled_names().into_iter().map(|h| h.to_string()).collect();
            if !peer.petname.is_empty() {
                names.insert(peer.petname.clone());
            }
            for name in names {
                by_name.entry(name).or_default().push(*key);
            }

            let mut has_enabled_address = false;
            for addr in peer.enabled_v4_addrs() {
                has_enabled_address = true;
                by_ip.entry(IpAddr::V4(addr)).or_default().push(*key);
            }
            for addr in peer.enabled_v6_addrs() {
                has_enabled_address = true;
                by_ip.entry(IpAddr::V6(addr)).or_default().push(*key);
            }

            if !has_enabled_address {
                return Err(SchemaError::NoEnabledAddress { vk: *key });
            }

            if !self.prefs.accept_nonlocal {
                for (addr, _) in peer.v4_addrs().all().filter(|(_, enabled)| *enabled) {
                    if !self.system.contains(IpAddr::V4(*addr)) {
                        return Err(SchemaError::Bogon {
                            vk: *key,
                            address: IpAddr::V4(*addr),
                        });
                    }
                }
                for (addr, _) in peer.v6_addrs().all().filter(|(_, enabled)| *enabled) {
                    if !self.system.contains(IpAddr::V6(*addr)) {
                        return Err(SchemaError::Bogon {
                            vk: *key,
                            address: IpAddr::V6(*addr),
                        });
                    }
                }
            }
        }

        if gateways.len() > 1 {
            return Err(SchemaError::GatewayConflict(gateways));
        }

        for (address, vks) in by_ip {
            if vks.len() > 1 {
                return Err(SchemaError::IpConflict {
                    first: vks[0],
                    second: vks[1],
                    address,
                });
            }
        }

        for (name, vks) in by_name {
            if vks.len() > 1 {
                return Err(SchemaError::NameConflict {
                    first: vks[0],
                    second: vks[1],
                    name,
                });
            }
        }

        Ok(())
    }

    /// Every hostname any enabled peer currently resolves to, used to keep
    /// `/etc/hosts` (or equivalent) in sync (§4.H).
    pub fn enabled_hostnames(&self) -> Vec<(Hostname, IpAddr)> {
        let mut out = Vec::new();
        for peer in self.peers.values() {
            if !peer.enabled {
                continue;
            }
            let addrs: Vec<IpAddr> = peer
                .enabled_v4_addrs()
                .into_iter()
                .map(IpAddr::V4)
                .chain(peer.enabled_v6_addrs().into_iter().map(IpAddr::V6))
                .collect();
            let Some(addr) = addrs.into_iter().next() else {
                continue;
            };
            for name in peer.enabled_names() {
                out.push((name, addr));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;
    use vula_descriptor::{Descriptor, PqPublicKey, WgPublicKey};

    fn peer_with(hostname: &str, ip: &str) -> Peer {
        let signing_key = SigningKey::generate(&mut OsRng);
        let descriptor = Descriptor::sign(
            &signing_key,
            WgPublicKey::from([1u8; 32]),
            PqPublicKey::from([2u8; 64]),
            1,
            3600,
            51820,
            hostname.parse().unwrap(),
            vec![ip.parse().unwrap()],
            vec![],
            vec![],
            false,
        );
        Peer::from_descriptor(descriptor, false, true)
    }

    fn insert(state: &mut State, peer: Peer) {
        state.peers.insert(peer.vk(), peer);
    }

    #[test]
    fn empty_state_is_valid() {
        assert!(State::default().validate().is_ok());
    }

    #[test]
    fn duplicate_enabled_ip_is_rejected() {
        let mut state = State::default();
        state
            .system
            .current_subnets
            .insert("10.0.0.0/24".parse().unwrap(), vec![]);
        insert(&mut state, peer_with("alice.local", "10.0.0.1"));
        insert(&mut state, peer_with("bob.local", "10.0.0.1"));
        assert!(matches!(state.validate(), Err(SchemaError::IpConflict { .. })));
    }

    #[test]
    fn bogon_address_is_rejected_unless_accept_nonlocal() {
        let mut state = State::default();
        state
            .system
            .current_subnets
            .insert("10.0.0.0/24".parse().unwrap(), vec![]);
        insert(&mut state, peer_with("alice.local", "10.0.2.1"));
        assert!(matches!(state.validate(), Err(SchemaError::Bogon { .. })));

        state.prefs.accept_nonlocal = true;
        assert!(state.validate().is_ok());
    }

    #[test]
    fn shared_secondary_nickname_is_rejected_even_when_names_differ() {
        let mut state = State::default();
        state
            .system
            .current_subnets
            .insert("10.0.0.0/24".parse().unwrap(), vec![]);
        let mut alice = peer_with("alice.local", "10.0.0.1");
        alice.add_nickname("shared.local".parse().unwrap());
        let bob = peer_with("shared.local", "10.0.0.2");
        insert(&mut state, alice);
        insert(&mut state, bob);
        assert!(matches!(state.validate(), Err(SchemaError::NameConflict { .. })));
    }

    #[test]
    fn second_gateway_is_rejected() {
        let mut state = State::default();
        state
            .system
            .current_subnets
            .insert("10.0.0.0/24".parse().unwrap(), vec![]);
        let mut alice = peer_with("alice.local", "10.0.0.1");
        alice.use_as_gateway = true;
        let mut bob = peer_with("bob.local", "10.0.0.2");
        bob.use_as_gateway = true;
        insert(&mut state, alice);
        insert(&mut state, bob);
        assert!(matches!(state.validate(), Err(SchemaError::GatewayConflict(_))));
    }
}
