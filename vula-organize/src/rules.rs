use std::net::IpAddr;
use std::time::SystemTime;

use vula_descriptor::Descriptor;
use vula_peer::{Peer, State, SystemState};

use crate::result::{Action, EventResult, Trigger, WriteKind, WriteOp};

fn sync_triggers_for(result: &mut EventResult, vk: &str) {
    result.triggers.push(Trigger::new("sync_peer", vec![vk.to_string()]));
    result.triggers.push(Trigger::new("sync_hosts", vec![]));
    result.triggers.push(Trigger::new("sync_publish", vec![]));
}

fn enabled_addrs(peer: &Peer) -> Vec<IpAddr> {
    peer.enabled_v4_addrs()
        .into_iter()
        .map(IpAddr::V4)
        .chain(peer.enabled_v6_addrs().into_iter().map(IpAddr::V6))
        .collect()
}

/// `NEW_SYSTEM_STATE(snapshot)` (§4.G).
pub fn new_system_state(state: &mut State, result: &mut EventResult, snapshot: SystemState) {
    state.system = snapshot;
    result.writes.push(WriteOp::set("system", "replaced"));
    result.actions.push(Action::AdjustToNewSystemState);
    result.triggers.push(Trigger::new("sync_interface", vec![]));
    result.triggers.push(Trigger::new("sync_publish", vec![]));

    let accept_nonlocal = state.prefs.accept_nonlocal;
    let stale: Vec<_> = state
        .peers
        .iter()
        .filter(|(_, peer)| {
            if peer.pinned || !peer.enabled {
                return false;
            }
            let addrs = enabled_addrs(peer);
            !addrs.is_empty() && addrs.iter().all(|addr| !accept_nonlocal && !state.system.contains(*addr))
        })
        .map(|(vk, _)| *vk)
        .collect();

    for vk in stale {
        remove_peer(state, result, vk);
    }

    elect_gateway(state, result);
}

/// Gateway election (§4.G "Gateway election"): a peer may be flagged
/// `use_as_gateway` only if `prefs.accept_default_route` is set, the peer
/// is pinned, and one of its enabled IPs equals a current system gateway.
/// Demotes any peer that no longer qualifies, then promotes the first
/// (by `vk`, for determinism) eligible peer if none is currently flagged —
/// this is also how `RELEASE_GATEWAY` gets undone, per §9's note that the
/// next `NEW_SYSTEM_STATE` re-promotes a pinned peer once its IP reappears
/// as a system gateway.
fn elect_gateway(state: &mut State, result: &mut EventResult) {
    let accept_default_route = state.prefs.accept_default_route;
    let gateways = state.system.gateways.clone();

    let is_eligible = |peer: &Peer| -> bool {
        accept_default_route && peer.enabled && peer.pinned && enabled_addrs(peer).iter().any(|addr| gateways.contains(addr))
    };

    let demote: Vec<_> = state
        .peers
        .iter()
        .filter(|(_, peer)| peer.use_as_gateway && !is_eligible(peer))
        .map(|(vk, _)| *vk)
        .collect();
    for vk in demote {
        if let Some(peer) = state.peers.get_mut(&vk) {
            peer.use_as_gateway = false;
            result.writes.push(WriteOp::set(format!("peers.{}.use_as_gateway", vk.to_base64()), "false"));
        }
    }

    if !state.peers.values().any(|peer| peer.use_as_gateway) {
        let elected = state.peers.iter().find(|(_, peer)| is_eligible(peer)).map(|(vk, _)| *vk);
        if let Some(vk) = elected {
            if let Some(peer) = state.peers.get_mut(&vk) {
                peer.use_as_gateway = true;
                result.writes.push(WriteOp::set(format!("peers.{}.use_as_gateway", vk.to_base64()), "true"));
            }
        }
    }
}

/// `INCOMING_DESCRIPTOR(desc)` (§4.G). `now` is captured by the caller, per
/// the event-determinism contract (§4.F "Contract") — nothing in here reads
/// the system clock.
pub fn incoming_descriptor(state: &mut State, result: &mut EventResult, desc: Descriptor, now: SystemTime) {
    if let Err(err) = desc.verify(now) {
        result.actions.push(Action::Reject(format!("{}: {err}", err.kind())));
        return;
    }

    let addrs: Vec<IpAddr> = desc
        .v4a
        .iter()
        .copied()
        .map(IpAddr::V4)
        .chain(desc.v6a.iter().copied().map(IpAddr::V6))
        .collect();

    if !state.prefs.accept_nonlocal && addrs.iter().any(|addr| !state.system.contains(*addr)) {
        result
            .actions
            .push(Action::Reject(format!("{}: address outside configured subnets", vula_types::ErrorKind::Bogon)));
        return;
    }

    if let Some(existing) = state.peers.get(&desc.vk).cloned() {
        if desc.vf > existing.descriptor().vf {
            let vk = desc.vk;
            let hostname_allowed = state.prefs.allows_domain(&desc.hostname);
            let mut peer = existing;
            // apply_descriptor_update() already checked vf > stored.vf above; it cannot fail here.
            peer.apply_descriptor_update(desc, hostname_allowed).expect("vf already checked strictly greater");
            state.peers.insert(vk, peer);
            result.writes.push(WriteOp::set(format!("peers.{}", vk.to_base64()), "updated"));
            result.actions.push(Action::UpdatePeerDescriptor(vk));
            sync_triggers_for(result, &vk.to_base64());
        } else {
            result.actions.push(Action::Ignore(vula_types::ErrorKind::Replay.to_string()));
        }
        return;
    }

    // {pk, ip, hostname} conflict resolution order (§4.G "Tie-breaking").
    let mut conflict: Option<(vula_descriptor::VerifyKeyBytes, vula_types::ErrorKind)> = None;
    if let Ok(peer) = state.by_pk(&desc.pk) {
        conflict = Some((peer.vk(), vula_types::ErrorKind::PkConflict));
    }
    if conflict.is_none() {
        for addr in &addrs {
            if let Ok(peer) = state.with_ip(*addr) {
                conflict = Some((peer.vk(), vula_types::ErrorKind::IpConflict));
                break;
            }
        }
    }
    if conflict.is_none() {
        if let Ok(peer) = state.with_hostname(&desc.hostname) {
            conflict = Some((peer.vk(), vula_types::ErrorKind::NameConflict));
        }
    }

    if let Some((conflicting_vk, kind)) = conflict {
        let conflicting = state.peers.get(&conflicting_vk).expect("conflict vk came from state");
        let pin_protected = conflicting.pinned || (state.prefs.pin_new_peers && conflicting.enabled);
        if pin_protected && conflicting.enabled {
            result.actions.push(Action::Reject(format!("{kind}: peer is pinned")));
            return;
        }
        remove_peer(state, result, conflicting_vk);
        accept_new_peer(state, result, desc);
        return;
    }

    accept_new_peer(state, result, desc);
}

fn accept_new_peer(state: &mut State, result: &mut EventResult, desc: Descriptor) {
    let vk = desc.vk;
    let pinned = state.prefs.pin_new_peers;
    let hostname_allowed = state.prefs.allows_domain(&desc.hostname);
    let peer = Peer::from_descriptor(desc, pinned, hostname_allowed);
    state.peers.insert(vk, peer);
    result.writes.push(WriteOp::add(format!("peers.{}", vk.to_base64()), "created"));
    result.actions.push(Action::AcceptNewPeer(vk));
    sync_triggers_for(result, &vk.to_base64());
}

fn remove_peer(state: &mut State, result: &mut EventResult, vk: vula_descriptor::VerifyKeyBytes) {
    state.peers.remove(&vk);
    result.writes.push(WriteOp::remove(format!("peers.{}", vk.to_base64()), "removed"));
    result.actions.push(Action::RemovePeer(vk));
    result.triggers.push(Trigger::new("sync_peer_removed", vec![vk.to_base64()]));
    result.triggers.push(Trigger::new("sync_hosts", vec![]));
}

/// One field a `USER_EDIT` event may touch (spec.md §4.C "Prefs model").
/// The field schema is closed: any other path is an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrefsField {
    PinNewPeers,
    AcceptNonlocal,
    AutoRepair,
    EphemeralMode,
    AcceptDefaultRoute,
    RecordEvents,
    OverwriteUnpinned,
    EnableIpv4,
    EnableIpv6,
    SubnetsAllowed,
    SubnetsForbidden,
    IfacePrefixAllowed,
    LocalDomains,
    ExpireTime,
    PrimaryIp,
}

impl PrefsField {
    pub fn from_path(path: &str) -> Option<Self> {
        Some(match path {
            "pin_new_peers" => PrefsField::PinNewPeers,
            "accept_nonlocal" => PrefsField::AcceptNonlocal,
            "auto_repair" => PrefsField::AutoRepair,
            "ephemeral_mode" => PrefsField::EphemeralMode,
            "accept_default_route" => PrefsField::AcceptDefaultRoute,
            "record_events" => PrefsField::RecordEvents,
            "overwrite_unpinned" => PrefsField::OverwriteUnpinned,
            "enable_ipv4" => PrefsField::EnableIpv4,
            "enable_ipv6" => PrefsField::EnableIpv6,
            "subnets_allowed" => PrefsField::SubnetsAllowed,
            "subnets_forbidden" => PrefsField::SubnetsForbidden,
            "iface_prefix_allowed" => PrefsField::IfacePrefixAllowed,
            "local_domains" => PrefsField::LocalDomains,
            "expire_time" => PrefsField::ExpireTime,
            "primary_ip" => PrefsField::PrimaryIp,
            _ => return None,
        })
    }
}

/// `USER_EDIT(op, path, value)` (§4.G). Unknown `path`s and type mismatches
/// fail the event with an error (rolled back by the caller), matching the
/// "field schema is closed" rule in §4.C.
pub fn user_edit(
    state: &mut State,
    result: &mut EventResult,
    op: WriteKind,
    path: &str,
    value: &str,
) -> Result<(), String> {
    let field = PrefsField::from_path(path).ok_or_else(|| format!("unknown prefs field: {path}"))?;

    let as_bool = |value: &str| -> Result<bool, String> {
        value.parse::<bool>().map_err(|_| format!("expected a boolean, got {value:?}"))
    };

    match field {
        PrefsField::PinNewPeers if op == WriteKind::Set => state.prefs.pin_new_peers = as_bool(value)?,
        PrefsField::AcceptNonlocal if op == WriteKind::Set => state.prefs.accept_nonlocal = as_bool(value)?,
        PrefsField::AutoRepair if op == WriteKind::Set => state.prefs.auto_repair = as_bool(value)?,
        PrefsField::EphemeralMode if op == WriteKind::Set => state.prefs.ephemeral_mode = as_bool(value)?,
        PrefsField::AcceptDefaultRoute if op == WriteKind::Set => {
            state.prefs.accept_default_route = as_bool(value)?
        },
        PrefsField::RecordEvents if op == WriteKind::Set => state.prefs.record_events = as_bool(value)?,
        PrefsField::OverwriteUnpinned if op == WriteKind::Set => {
            state.prefs.overwrite_unpinned = as_bool(value)?
        },
        PrefsField::EnableIpv4 if op == WriteKind::Set => state.prefs.enable_ipv4 = as_bool(value)?,
        PrefsField::EnableIpv6 if op == WriteKind::Set => state.prefs.enable_ipv6 = as_bool(value)?,
        PrefsField::ExpireTime if op == WriteKind::Set => {
            state.prefs.expire_time = value.parse::<u64>().map_err(|_| format!("expected an integer, got {value:?}"))?
        },
        PrefsField::PrimaryIp if op == WriteKind::Set => {
            state.prefs.primary_ip = if value.is_empty() {
                None
            } else {
                Some(value.parse::<IpAddr>().map_err(|_| format!("invalid IP address: {value:?}"))?)
            }
        },
        PrefsField::SubnetsAllowed => apply_list_op(&mut state.prefs.subnets_allowed, op, value),
        PrefsField::SubnetsForbidden => apply_list_op(&mut state.prefs.subnets_forbidden, op, value),
        PrefsField::IfacePrefixAllowed => apply_list_op(&mut state.prefs.iface_prefix_allowed, op, value),
        PrefsField::LocalDomains => apply_list_op(&mut state.prefs.local_domains, op, value),
        _ => return Err(format!("{path} does not support {op:?}")),
    }

    let write = match op {
        WriteKind::Set => WriteOp::set(format!("prefs.{path}"), value),
        WriteKind::Add => WriteOp::add(format!("prefs.{path}"), value),
        WriteKind::Remove => WriteOp::remove(format!("prefs.{path}"), value),
    };
    result.writes.push(write);
    Ok(())
}

/// Set-semantic ordered list mutation: ADD removes any existing equal entry
/// then appends, REMOVE deletes it, SET replaces wholesale (§4.F "Write
/// operations").
fn apply_list_op(list: &mut Vec<String>, op: WriteKind, value: &str) {
    match op {
        WriteKind::Set => *list = value.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect(),
        WriteKind::Add => {
            list.retain(|existing| existing != value);
            list.push(value.to_string());
        },
        WriteKind::Remove => list.retain(|existing| existing != value),
    }
}

/// `RELEASE_GATEWAY()` (§4.G).
pub fn release_gateway(state: &mut State, result: &mut EventResult) {
    for (vk, peer) in state.peers.iter_mut() {
        if peer.use_as_gateway {
            peer.use_as_gateway = false;
            result.writes.push(WriteOp::set(format!("peers.{}.use_as_gateway", vk.to_base64()), "false"));
        }
    }
}

/// `EXPIRE_TICK(now)` (§4.G). `now` is seconds since epoch, captured by the
/// caller.
pub fn expire_tick(state: &mut State, result: &mut EventResult, now: u64) {
    let expire_time = state.prefs.expire_time;
    let expired: Vec<_> = state
        .peers
        .iter()
        .filter(|(_, peer)| !peer.pinned && peer.descriptor().expires_at() < now.saturating_sub(expire_time))
        .map(|(vk, _)| *vk)
        .collect();

    for vk in expired {
        remove_peer(state, result, vk);
    }
}
