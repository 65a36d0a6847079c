use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Matches a single DNS label per hostname(7): alphanumerics, with interior
/// (never leading/trailing) dashes.
static LABEL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([a-zA-Z0-9]-?)*[a-zA-Z0-9]$").unwrap());

/// A DNS-form hostname, e.g. `alice.local` or `alice.local.`. The trailing
/// dot is preserved verbatim since it is significant to descriptor parsing
/// and to local-domain suffix matching (§4.G "Hostname policy").
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hostname(String);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidHostname {
    #[error("hostname exceeds 63 octets")]
    TooLong,
    #[error("hostname is empty")]
    Empty,
    #[error("hostname label {0:?} is not a valid DNS label")]
    InvalidLabel(String),
}

impl Hostname {
    pub fn is_valid(name: &str) -> bool {
        Self::validate(name).is_ok()
    }

    fn validate(name: &str) -> Result<(), InvalidHostname> {
        let without_trailing_dot = name.strip_suffix('.').unwrap_or(name);
        if without_trailing_dot.is_empty() {
            return Err(InvalidHostname::Empty);
        }
        if without_trailing_dot.len() > 63 {
            return Err(InvalidHostname::TooLong);
        }
        for label in without_trailing_dot.split('.') {
            if label.is_empty() || !LABEL_REGEX.is_match(label) {
                return Err(InvalidHostname::InvalidLabel(label.to_string()));
            }
        }
        Ok(())
    }

    /// The hostname with any trailing dot stripped, for suffix comparisons.
    pub fn trim_trailing_dot(&self) -> &str {
        self.0.strip_suffix('.').unwrap_or(&self.0)
    }

    /// True if this hostname is `domain` or a subdomain of it, ignoring
    /// trailing-dot differences on either side.
    pub fn is_in_domain(&self, domain: &str) -> bool {
        let name = self.trim_trailing_dot();
        let domain = domain.strip_suffix('.').unwrap_or(domain);
        if domain.is_empty() {
            return false;
        }
        name == domain || name.ends_with(&format!(".{domain}"))
    }
}

impl FromStr for Hostname {
    type Err = InvalidHostname;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::validate(name)?;
        Ok(Self(name.to_string()))
    }
}

impl Deref for Hostname {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dns_form_names() {
        assert!(Hostname::is_valid("alice.local"));
        assert!(Hostname::is_valid("alice.local."));
        assert!(Hostname::is_valid("alice-1.local"));
    }

    #[test]
    fn rejects_empty_and_bad_labels() {
        assert!(!Hostname::is_valid(""));
        assert!(!Hostname::is_valid("."));
        assert!(!Hostname::is_valid("-alice.local"));
        assert!(!Hostname::is_valid("alice_bad.local"));
    }

    #[test]
    fn rejects_over_63_octets() {
        let long = "a".repeat(64);
        assert!(!Hostname::is_valid(&long));
    }

    #[test]
    fn domain_match_ignores_trailing_dot() {
        let name: Hostname = "alice.local.".parse().unwrap();
        assert!(name.is_in_domain("local"));
        assert!(name.is_in_domain("local."));
        assert!(!name.is_in_domain("example"));
    }
}
