use std::collections::BTreeMap;
use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use vula_types::B64Bytes;

/// A snapshot of the local network the engine uses to decide whether an
/// address is "ours" (spec.md §3 "SystemState", §4.D). Rebuilt wholesale by
/// the `NEW_SYSTEM_STATE` event; nothing in this crate queries the kernel
/// directly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemState {
    pub current_subnets: BTreeMap<IpNet, Vec<IpAddr>>,
    pub current_interfaces: BTreeMap<String, Vec<IpAddr>>,
    pub our_wg_pk: Option<B64Bytes<32>>,
    pub gateways: Vec<IpAddr>,
    pub has_v6: bool,
}

impl SystemState {
    /// The subnet (if any) in `current_subnets` containing `addr`.
    pub fn subnet_containing(&self, addr: IpAddr) -> Option<IpNet> {
        self.current_subnets
            .keys()
            .find(|subnet| subnet.contains(&addr))
            .copied()
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        self.subnet_containing(addr).is_some()
    }

    pub fn is_gateway(&self, addr: IpAddr) -> bool {
        self.gateways.contains(&addr)
    }

    /// Every address across `current_subnets`, flattened (§4.D): the set of
    /// IPs this host itself currently holds locally, in subnet-key then
    /// per-subnet order.
    pub fn ips(&self) -> Vec<IpAddr> {
        self.current_subnets.values().flatten().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnet_containing_finds_the_right_cidr() {
        let mut system = SystemState::default();
        system.current_subnets.insert(
            "10.0.0.0/24".parse().unwrap(),
            vec!["10.0.0.9".parse().unwrap()],
        );
        assert_eq!(
            system.subnet_containing("10.0.0.1".parse().unwrap()),
            Some("10.0.0.0/24".parse().unwrap())
        );
        assert_eq!(system.subnet_containing("10.0.2.1".parse().unwrap()), None);
    }

    #[test]
    fn ips_flattens_every_subnet() {
        let mut system = SystemState::default();
        system
            .current_subnets
            .insert("10.0.0.0/24".parse().unwrap(), vec!["10.0.0.9".parse().unwrap()]);
        system
            .current_subnets
            .insert("192.168.1.0/24".parse().unwrap(), vec!["192.168.1.5".parse().unwrap()]);
        let mut ips = system.ips();
        ips.sort();
        assert_eq!(
            ips,
            vec!["10.0.0.9".parse::<IpAddr>().unwrap(), "192.168.1.5".parse().unwrap()]
        );
    }
}
