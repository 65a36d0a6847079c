use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};
use vula_descriptor::{Descriptor, VerifyKeyBytes};
use vula_types::Hostname;

use crate::error::PeerError;

/// An insertion-ordered `name -> enabled` list. Updates move the touched
/// entry to the front, so the most recently seen hostname is always
/// `entries[0]` — this is what lets `Peer::name` resolve to "whatever the
/// peer is calling itself now" after a descriptor update (spec.md §8
/// scenario 4), without needing a separate "primary hostname" field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicknameList(Vec<(Hostname, bool)>);

impl NicknameList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `name` at the front, enabled, removing any prior entry for it.
    pub fn insert_front(&mut self, name: Hostname) {
        self.0.retain(|(existing, _)| existing != &name);
        self.0.insert(0, (name, true));
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.0.iter_mut().find(|(existing, _)| &**existing == name) {
            Some(entry) => {
                entry.1 = enabled;
                true
            },
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|(existing, _)| &**existing != name);
        self.0.len() != before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(existing, _)| &**existing == name)
    }

    pub fn enabled_names(&self) -> Vec<Hostname> {
        self.0.iter().filter(|(_, enabled)| *enabled).map(|(name, _)| name.clone()).collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &(Hostname, bool)> {
        self.0.iter()
    }
}

/// An insertion-ordered `address -> enabled` list, generic over IPv4/IPv6.
/// Never stores the same address twice; inserting an address already
/// present just re-enables it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrList<A: Copy + PartialEq>(Vec<(A, bool)>);

impl<A: Copy + PartialEq> AddrList<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `addr`, setting `enabled = true`. A no-op on the ordering if
    /// `addr` is already present (it is just re-enabled).
    pub fn insert(&mut self, addr: A) {
        match self.0.iter_mut().find(|(existing, _)| *existing == addr) {
            Some(entry) => entry.1 = true,
            None => self.0.push((addr, true)),
        }
    }

    pub fn set_enabled(&mut self, addr: A, enabled: bool) -> bool {
        match self.0.iter_mut().find(|(existing, _)| *existing == addr) {
            Some(entry) => {
                entry.1 = enabled;
                true
            },
            None => false,
        }
    }

    pub fn remove(&mut self, addr: A) -> bool {
        let before = self.0.len();
        self.0.retain(|(existing, _)| *existing != addr);
        self.0.len() != before
    }

    pub fn contains(&self, addr: A) -> bool {
        self.0.iter().any(|(existing, _)| *existing == addr)
    }

    pub fn enabled(&self) -> impl Iterator<Item = A> + '_ {
        self.0.iter().filter(|(_, enabled)| *enabled).map(|(addr, _)| *addr)
    }

    pub fn all(&self) -> impl Iterator<Item = &(A, bool)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An in-memory peer, keyed externally by its descriptor's `vk`
/// (spec.md §3 "Peer").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    descriptor: Descriptor,
    pub petname: String,
    nicknames: NicknameList,
    v4addrs: AddrList<Ipv4Addr>,
    v6addrs: AddrList<Ipv6Addr>,
    pub use_as_gateway: bool,
    pub pinned: bool,
    pub enabled: bool,
    pub verified: bool,
}

impl Peer {
    /// Creates a peer from a freshly accepted descriptor (the
    /// `ACCEPT_NEW_PEER` action, §4.G). `hostname_allowed` gates whether
    /// `descriptor.hostname` is inserted as an enabled nickname, per the
    /// hostname policy (§4.G "Hostname policy"): a peer whose self-reported
    /// name falls outside `prefs.local_domains` is still accepted, just
    /// without that name enabled.
    pub fn from_descriptor(descriptor: Descriptor, pinned: bool, hostname_allowed: bool) -> Self {
        let mut nicknames = NicknameList::new();
        if hostname_allowed {
            nicknames.insert_front(descriptor.hostname.clone());
        }
        let mut v4addrs = AddrList::new();
        for addr in &descriptor.v4a {
            v4addrs.insert(*addr);
        }
        let mut v6addrs = AddrList::new();
        for addr in &descriptor.v6a {
            v6addrs.insert(*addr);
        }
        Peer {
            descriptor,
            petname: String::new(),
            nicknames,
            v4addrs,
            v6addrs,
            use_as_gateway: false,
            pinned,
            enabled: true,
            verified: false,
        }
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn vk(&self) -> VerifyKeyBytes {
        self.descriptor.vk
    }

    /// Base64 `vk`, the peer's stable identity string.
    pub fn id(&self) -> String {
        self.descriptor.vk.to_base64()
    }

    /// `petname` if set, else the first enabled nickname, else an empty
    /// string (a peer with no enabled nicknames has no display name until
    /// the user picks one).
    pub fn name(&self) -> String {
        if !self.petname.is_empty() {
            return self.petname.clone();
        }
        self.nicknames
            .enabled_names()
            .into_iter()
            .next()
            .map(|h| h.to_string())
            .unwrap_or_default()
    }

    pub fn nicknames(&self) -> &NicknameList {
        &self.nicknames
    }

    pub fn enabled_names(&self) -> Vec<Hostname> {
        self.nicknames.enabled_names()
    }

    pub fn v4_addrs(&self) -> &AddrList<Ipv4Addr> {
        &self.v4addrs
    }

    pub fn v6_addrs(&self) -> &AddrList<Ipv6Addr> {
        &self.v6addrs
    }

    pub fn enabled_v4_addrs(&self) -> Vec<Ipv4Addr> {
        self.v4addrs.enabled().collect()
    }

    pub fn enabled_v6_addrs(&self) -> Vec<Ipv6Addr> {
        self.v6addrs.enabled().collect()
    }

    /// Whether this peer, if enabled, has at least one enabled address
    /// (per-peer invariant, §3).
    pub fn has_enabled_address(&self) -> bool {
        self.v4addrs.enabled().next().is_some() || self.v6addrs.enabled().next().is_some()
    }

    pub fn has_ip(&self, addr: std::net::IpAddr) -> bool {
        match addr {
            std::net::IpAddr::V4(v4) => self.v4addrs.contains(v4),
            std::net::IpAddr::V6(v6) => self.v6addrs.contains(v6),
        }
    }

    pub fn has_enabled_ip(&self, addr: std::net::IpAddr) -> bool {
        match addr {
            std::net::IpAddr::V4(v4) => self.v4addrs.enabled().any(|a| a == v4),
            std::net::IpAddr::V6(v6) => self.v6addrs.enabled().any(|a| a == v6),
        }
    }

    /// Replaces the descriptor with a newer one, merging in any new
    /// addresses and hostname (§4.B "apply-descriptor-update", §4.G step 3).
    /// Fails with [`PeerError::Replay`] if `new.vf` is not strictly greater
    /// than the stored descriptor's `vf` (monotone-`vf` invariant).
    /// `hostname_allowed` gates adding the new hostname as an enabled
    /// nickname, same as [`Peer::from_descriptor`].
    pub fn apply_descriptor_update(&mut self, new: Descriptor, hostname_allowed: bool) -> Result<(), PeerError> {
        if new.vf <= self.descriptor.vf {
            return Err(PeerError::Replay {
                stored_vf: self.descriptor.vf,
                new_vf: new.vf,
            });
        }

        if hostname_allowed && new.hostname != self.descriptor.hostname {
            self.nicknames.insert_front(new.hostname.clone());
        }
        for addr in &new.v4a {
            self.v4addrs.insert(*addr);
        }
        for addr in &new.v6a {
            self.v6addrs.insert(*addr);
        }
        self.descriptor = new;
        Ok(())
    }

    pub fn add_nickname(&mut self, name: Hostname) {
        self.nicknames.insert_front(name);
    }

    pub fn remove_nickname(&mut self, name: &str) -> bool {
        self.nicknames.remove(name)
    }

    pub fn set_nickname_enabled(&mut self, name: &str, enabled: bool) -> bool {
        self.nicknames.set_enabled(name, enabled)
    }

    pub fn add_ipv4(&mut self, addr: Ipv4Addr) {
        self.v4addrs.insert(addr);
    }

    pub fn add_ipv6(&mut self, addr: Ipv6Addr) {
        self.v6addrs.insert(addr);
    }

    pub fn remove_ipv4(&mut self, addr: Ipv4Addr) -> bool {
        self.v4addrs.remove(addr)
    }

    pub fn remove_ipv6(&mut self, addr: Ipv6Addr) -> bool {
        self.v6addrs.remove(addr)
    }

    pub fn set_ipv4_enabled(&mut self, addr: Ipv4Addr, enabled: bool) -> bool {
        self.v4addrs.set_enabled(addr, enabled)
    }

    pub fn set_ipv6_enabled(&mut self, addr: Ipv6Addr, enabled: bool) -> bool {
        self.v6addrs.set_enabled(addr, enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;
    use vula_descriptor::{PqPublicKey, WgPublicKey};

    fn descriptor(hostname: &str, vf: u64, ip: &str) -> Descriptor {
        let signing_key = SigningKey::generate(&mut OsRng);
        Descriptor::sign(
            &signing_key,
            WgPublicKey::from([1u8; 32]),
            PqPublicKey::from([2u8; 64]),
            vf,
            3600,
            51820,
            hostname.parse().unwrap(),
            vec![ip.parse().unwrap()],
            vec![],
            vec![],
            false,
        )
    }

    #[test]
    fn name_falls_back_to_first_enabled_nickname() {
        let peer = Peer::from_descriptor(descriptor("alice.local", 1, "10.0.0.1"), false, true);
        assert_eq!(peer.name(), "alice.local");
    }

    #[test]
    fn update_prepends_new_hostname_and_keeps_old_enabled() {
        let mut peer = Peer::from_descriptor(descriptor("alice.local", 1, "10.0.0.1"), false, true);
        peer.apply_descriptor_update(descriptor("alice-1.local", 2, "10.0.0.1"), true).unwrap();
        assert_eq!(
            peer.enabled_names().iter().map(|h| h.to_string()).collect::<Vec<_>>(),
            vec!["alice-1.local".to_string(), "alice.local".to_string()]
        );
        peer.set_nickname_enabled("alice.local", false);
        assert_eq!(
            peer.enabled_names().iter().map(|h| h.to_string()).collect::<Vec<_>>(),
            vec!["alice-1.local".to_string()]
        );
    }

    #[test]
    fn replay_is_rejected() {
        let mut peer = Peer::from_descriptor(descriptor("alice.local", 5, "10.0.0.1"), false, true);
        let err = peer.apply_descriptor_update(descriptor("alice.local", 5, "10.0.0.1"), true).unwrap_err();
        assert_eq!(
            err,
            PeerError::Replay {
                stored_vf: 5,
                new_vf: 5
            }
        );
    }
}
