use std::net::IpAddr;
use std::path::PathBuf;

use hostsfile::HostsBuilder;

/// The §6 "Collaborator method surface" — the only way the engine's
/// post-commit triggers reach the outside world. Mirrors the way
/// `server::Context` is the single handle threaded through the teacher's
/// request handlers: no event handler or action holds a socket, a netlink
/// handle, or a file path directly, only this trait object.
///
/// No method here returns until its side effect is applied or has failed;
/// callers are expected to call these only from trigger dispatch, which
/// already isolates failures per-call.
pub trait Collaborators {
    /// Program/refresh a kernel WireGuard peer: endpoint, allowed IPs,
    /// preshared key.
    fn sync_peer(&self, vk: &str) -> Result<String, String>;

    /// Remove a kernel WireGuard peer.
    fn sync_peer_removed(&self, vk: &str) -> Result<String, String>;

    /// Ensure the WireGuard interface exists, is up, and has its private
    /// key/listen port set.
    fn sync_interface(&self) -> Result<String, String>;

    /// Rewrite the hosts file section from `entries` (hostname, IP pairs).
    fn sync_hosts(&self, entries: &[(String, IpAddr)]) -> Result<String, String>;

    /// Hand the external mDNS publisher the current descriptor map.
    fn sync_publish(&self, descriptors: &[String]) -> Result<String, String>;
}

/// Logs every call at `debug` and returns `Ok(())`, exactly as one would
/// stub a trigger target in tests. The default collaborator.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullCollaborators;

impl Collaborators for NullCollaborators {
    fn sync_peer(&self, vk: &str) -> Result<String, String> {
        log::debug!("sync_peer({vk}) [null collaborator]");
        Ok(format!("sync_peer({vk}): no-op"))
    }

    fn sync_peer_removed(&self, vk: &str) -> Result<String, String> {
        log::debug!("sync_peer_removed({vk}) [null collaborator]");
        Ok(format!("sync_peer_removed({vk}): no-op"))
    }

    fn sync_interface(&self) -> Result<String, String> {
        log::debug!("sync_interface() [null collaborator]");
        Ok("sync_interface: no-op".to_string())
    }

    fn sync_hosts(&self, entries: &[(String, IpAddr)]) -> Result<String, String> {
        log::debug!("sync_hosts({} entries) [null collaborator]", entries.len());
        Ok("sync_hosts: no-op".to_string())
    }

    fn sync_publish(&self, descriptors: &[String]) -> Result<String, String> {
        log::debug!("sync_publish({} descriptors) [null collaborator]", descriptors.len());
        Ok("sync_publish: no-op".to_string())
    }
}

/// The one adapter built on a real collaborator dependency: `sync_hosts`
/// rewrites a tagged section of a hosts file via `hostsfile::HostsBuilder`.
/// Every other method logs and no-ops, demonstrating the trigger plumbing
/// end-to-end without reimplementing a WireGuard backend or mDNS publisher.
pub struct HostsFileCollaborators {
    tag: String,
    hosts_path: PathBuf,
}

impl HostsFileCollaborators {
    pub fn new(tag: impl Into<String>, hosts_path: impl Into<PathBuf>) -> Self {
        HostsFileCollaborators {
            tag: tag.into(),
            hosts_path: hosts_path.into(),
        }
    }
}

impl Collaborators for HostsFileCollaborators {
    fn sync_peer(&self, vk: &str) -> Result<String, String> {
        log::debug!("sync_peer({vk}) [hosts-file collaborator: no-op]");
        Ok(format!("sync_peer({vk}): no-op"))
    }

    fn sync_peer_removed(&self, vk: &str) -> Result<String, String> {
        log::debug!("sync_peer_removed({vk}) [hosts-file collaborator: no-op]");
        Ok(format!("sync_peer_removed({vk}): no-op"))
    }

    fn sync_interface(&self) -> Result<String, String> {
        log::debug!("sync_interface() [hosts-file collaborator: no-op]");
        Ok("sync_interface: no-op".to_string())
    }

    fn sync_hosts(&self, entries: &[(String, IpAddr)]) -> Result<String, String> {
        let mut builder = HostsBuilder::new(self.tag.clone());
        for (hostname, addr) in entries {
            builder.add_hostname(*addr, hostname);
        }
        builder
            .write_to(&self.hosts_path)
            .map(|changed| format!("sync_hosts: wrote {} entries (changed={changed})", entries.len()))
            .map_err(|err| err.to_string())
    }

    fn sync_publish(&self, descriptors: &[String]) -> Result<String, String> {
        log::debug!("sync_publish({} descriptors) [hosts-file collaborator: no-op]", descriptors.len());
        Ok("sync_publish: no-op".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_collaborators_always_succeed() {
        let collaborators = NullCollaborators;
        assert!(collaborators.sync_peer("vk").is_ok());
        assert!(collaborators.sync_peer_removed("vk").is_ok());
        assert!(collaborators.sync_interface().is_ok());
        assert!(collaborators.sync_hosts(&[]).is_ok());
        assert!(collaborators.sync_publish(&[]).is_ok());
    }

    #[test]
    fn hosts_file_collaborator_writes_a_section() {
        let dir = tempfile::tempdir().unwrap();
        let hosts_path = dir.path().join("hosts");
        std::fs::write(&hosts_path, "127.0.0.1 localhost\n").unwrap();

        let collaborators = HostsFileCollaborators::new("vula", &hosts_path);
        let entries = vec![("alice.local".to_string(), "10.0.0.1".parse().unwrap())];
        assert!(collaborators.sync_hosts(&entries).is_ok());

        let contents = std::fs::read_to_string(&hosts_path).unwrap();
        assert!(contents.contains("# DO NOT EDIT vula BEGIN"));
        assert!(contents.contains("10.0.0.1 alice.local"));
    }
}
