use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Validated user preferences (spec.md §3 "Prefs", §4.C). A pure value
/// object: equality is by field, and nothing here reaches into `State`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefs {
    pub pin_new_peers: bool,
    pub accept_nonlocal: bool,
    pub auto_repair: bool,
    pub ephemeral_mode: bool,
    pub accept_default_route: bool,
    pub record_events: bool,
    pub overwrite_unpinned: bool,
    pub enable_ipv4: bool,
    pub enable_ipv6: bool,
    pub subnets_allowed: Vec<String>,
    pub subnets_forbidden: Vec<String>,
    pub iface_prefix_allowed: Vec<String>,
    pub local_domains: Vec<String>,
    pub expire_time: u64,
    pub primary_ip: Option<IpAddr>,
}

impl Default for Prefs {
    fn default() -> Self {
        Prefs {
            pin_new_peers: false,
            accept_nonlocal: false,
            auto_repair: true,
            ephemeral_mode: false,
            accept_default_route: false,
            record_events: true,
            overwrite_unpinned: true,
            enable_ipv4: true,
            enable_ipv6: true,
            subnets_allowed: Vec::new(),
            subnets_forbidden: Vec::new(),
            iface_prefix_allowed: Vec::new(),
            local_domains: vec!["local".to_string()],
            expire_time: 3600,
            primary_ip: None,
        }
    }
}

impl Prefs {
    /// Whether `name` matches one of `local_domains`, trailing-dot
    /// normalized (§4.G "Hostname policy").
    pub fn allows_domain(&self, name: &str) -> bool {
        let name = name.trim_end_matches('.');
        self.local_domains.iter().any(|domain| {
            let domain = domain.trim_end_matches('.');
            name == domain || name.ends_with(&format!(".{domain}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allows_plain_local() {
        let prefs = Prefs::default();
        assert!(prefs.allows_domain("alice.local"));
        assert!(prefs.allows_domain("alice.local."));
        assert!(!prefs.allows_domain("alice.example.com"));
    }

    #[test]
    fn empty_local_domains_allows_nothing() {
        let prefs = Prefs {
            local_domains: Vec::new(),
            ..Prefs::default()
        };
        assert!(!prefs.allows_domain("alice.local"));
    }
}
