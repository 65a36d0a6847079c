use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use vula_types::{B64Bytes, Hostname};

use crate::error::DescriptorError;

/// Allowed clock skew when checking that a descriptor's `vf` is not in the
/// future (§3 "Invariants").
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(300);

pub type WgPublicKey = B64Bytes<32>;
pub type PqPublicKey = B64Bytes<64>;
pub type VerifyKeyBytes = B64Bytes<32>;
pub type SignatureBytes = B64Bytes<64>;

/// The signed, self-describing peer announcement carried over mDNS
/// (spec §3 "Descriptor", §4.A).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub pk: WgPublicKey,
    pub c: PqPublicKey,
    pub vk: VerifyKeyBytes,
    pub s: SignatureBytes,
    pub vf: u64,
    pub dt: u64,
    pub port: u16,
    pub hostname: Hostname,
    pub v4a: Vec<Ipv4Addr>,
    pub v6a: Vec<Ipv6Addr>,
    pub r: Vec<IpNet>,
    pub e: bool,
}

impl Descriptor {
    /// Builds and signs a descriptor from its unsigned fields using `signing_key`.
    #[allow(clippy::too_many_arguments)]
    pub fn sign(
        signing_key: &SigningKey,
        pk: WgPublicKey,
        c: PqPublicKey,
        vf: u64,
        dt: u64,
        port: u16,
        hostname: Hostname,
        v4a: Vec<Ipv4Addr>,
        v6a: Vec<Ipv6Addr>,
        r: Vec<IpNet>,
        ephemeral: bool,
    ) -> Descriptor {
        let vk = VerifyKeyBytes::from(signing_key.verifying_key().to_bytes());
        let mut descriptor = Descriptor {
            pk,
            c,
            vk,
            s: SignatureBytes::from([0u8; 64]),
            vf,
            dt,
            port,
            hostname,
            v4a,
            v6a,
            r,
            e: ephemeral,
        };
        let canonical = descriptor.canonical_bytes();
        let signature: Signature = signing_key.sign(&canonical);
        descriptor.s = SignatureBytes::from(signature.to_bytes());
        descriptor
    }

    /// `vf + dt`: the instant after which this descriptor is expired.
    pub fn expires_at(&self) -> u64 {
        self.vf.saturating_add(self.dt)
    }

    /// Whether `self.vf` is plausible (not unreasonably far in the future)
    /// and the descriptor has not yet expired, as of `now`.
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        let now_secs = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let skew = MAX_CLOCK_SKEW.as_secs();
        self.vf <= now_secs.saturating_add(skew) && self.expires_at() >= now_secs
    }

    /// Verifies `s` against `vk` over the canonical serialization, and that
    /// the descriptor is fresh as of `now`. This is the sole gate for
    /// accepting a descriptor off the wire (§4.A, §4.G step 1).
    pub fn verify(&self, now: SystemTime) -> Result<(), DescriptorError> {
        let verifying_key = VerifyingKey::from_bytes(self.vk.as_bytes())
            .map_err(|_| DescriptorError::BadSignature)?;
        let signature = Signature::from_bytes(self.s.as_bytes());
        let canonical = self.canonical_bytes();
        verifying_key
            .verify(&canonical, &signature)
            .map_err(|_| DescriptorError::BadSignature)?;

        if self.v4a.is_empty() && self.v6a.is_empty() {
            return Err(DescriptorError::NoAddresses);
        }

        if !self.is_fresh(now) {
            return Err(DescriptorError::ExpiredDescriptor);
        }

        Ok(())
    }

    /// The canonical byte serialization signed and verified: all fields
    /// except `s`, sorted lexicographically by key, joined with `;`
    /// (§4.A "Signing").
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut fields = self.to_fields();
        fields.remove("s");
        join_fields(&fields).into_bytes()
    }

    /// The full field map, including `s`, used for TXT-record embedding and
    /// for the one-line textual form.
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("pk".to_string(), self.pk.to_base64());
        fields.insert("c".to_string(), self.c.to_base64());
        fields.insert("vk".to_string(), self.vk.to_base64());
        fields.insert("s".to_string(), self.s.to_base64());
        fields.insert("vf".to_string(), self.vf.to_string());
        fields.insert("dt".to_string(), self.dt.to_string());
        fields.insert("port".to_string(), self.port.to_string());
        fields.insert("hostname".to_string(), self.hostname.to_string());
        if !self.v4a.is_empty() {
            fields.insert("v4a".to_string(), join_addrs(&self.v4a));
        }
        if !self.v6a.is_empty() {
            fields.insert("v6a".to_string(), join_addrs(&self.v6a));
        }
        if !self.r.is_empty() {
            fields.insert("r".to_string(), join_addrs(&self.r));
        }
        fields.insert("e".to_string(), if self.e { "1".to_string() } else { "0".to_string() });
        fields
    }

    /// One-line `key=value;key=value` encoding, suitable for a QR code or
    /// manual entry (§4.A "Textual form").
    pub fn encode_line(&self) -> String {
        join_fields(&self.to_fields())
    }

    pub fn parse_line(line: &str) -> Result<Descriptor, DescriptorError> {
        let mut fields = BTreeMap::new();
        for pair in line.split(';') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| DescriptorError::InvalidField("(pair)".to_string(), pair.to_string()))?;
            fields.insert(key.to_string(), value.to_string());
        }
        Self::parse_fields(&fields)
    }

    /// Parses a descriptor from an (already unchunked) TXT-record field map.
    /// Unknown keys are ignored, as required by §4.A "Parse policy".
    pub fn parse_fields(fields: &BTreeMap<String, String>) -> Result<Descriptor, DescriptorError> {
        let get = |key: &'static str| -> Result<&String, DescriptorError> {
            fields.get(key).ok_or(DescriptorError::MissingField(key.to_string()))
        };

        let pk = WgPublicKey::from_base64(get("pk")?)?;
        let c = PqPublicKey::from_base64(get("c")?)?;
        let vk = VerifyKeyBytes::from_base64(get("vk")?)?;
        let s = SignatureBytes::from_base64(get("s")?)?;
        let vf = parse_u64(get("vf")?, "vf")?;
        let dt = parse_u64(get("dt")?, "dt")?;
        let port = get("port")?
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| DescriptorError::InvalidField("port".to_string(), get("port").unwrap().clone()))?;
        let hostname: Hostname = get("hostname")?
            .parse()
            .map_err(DescriptorError::InvalidHostname)?;
        let v4a = match fields.get("v4a") {
            Some(s) if !s.is_empty() => split_parse(s, "v4a")?,
            _ => Vec::new(),
        };
        let v6a = match fields.get("v6a") {
            Some(s) if !s.is_empty() => split_parse(s, "v6a")?,
            _ => Vec::new(),
        };
        let r = match fields.get("r") {
            Some(s) if !s.is_empty() => split_parse(s, "r")?,
            _ => Vec::new(),
        };
        let e = match fields.get("e").map(|s| s.as_str()) {
            Some("1") | Some("true") => true,
            Some("0") | Some("false") | None => false,
            Some(other) => return Err(DescriptorError::InvalidField("e".to_string(), other.to_string())),
        };

        Ok(Descriptor {
            pk,
            c,
            vk,
            s,
            vf,
            dt,
            port,
            hostname,
            v4a,
            v6a,
            r,
            e,
        })
    }
}

fn join_fields(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";")
}

fn join_addrs<T: ToString>(addrs: &[T]) -> String {
    addrs.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

fn split_parse<T: std::str::FromStr>(value: &str, field: &'static str) -> Result<Vec<T>, DescriptorError> {
    value
        .split(',')
        .map(|part| {
            part.parse::<T>()
                .map_err(|_| DescriptorError::InvalidField(field.to_string(), part.to_string()))
        })
        .collect()
}

fn parse_u64(value: &str, field: &'static str) -> Result<u64, DescriptorError> {
    value
        .parse::<u64>()
        .map_err(|_| DescriptorError::InvalidField(field.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    fn sample_descriptor() -> (SigningKey, Descriptor) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let descriptor = Descriptor::sign(
            &signing_key,
            WgPublicKey::from([7u8; 32]),
            PqPublicKey::from([9u8; 64]),
            1_700_000_000,
            3600,
            51820,
            "alice.local".parse().unwrap(),
            vec!["10.0.0.1".parse().unwrap()],
            vec![],
            vec![],
            false,
        );
        (signing_key, descriptor)
    }

    #[test]
    fn signature_verifies_against_its_own_key() {
        let (_signing_key, descriptor) = sample_descriptor();
        let now = UNIX_EPOCH + Duration::from_secs(descriptor.vf + 10);
        assert!(descriptor.verify(now).is_ok());
    }

    #[test]
    fn tampering_breaks_verification() {
        let (_signing_key, mut descriptor) = sample_descriptor();
        descriptor.port = 12345;
        let now = UNIX_EPOCH + Duration::from_secs(descriptor.vf + 10);
        assert_eq!(descriptor.verify(now), Err(DescriptorError::BadSignature));
    }

    #[test]
    fn expired_descriptor_fails_verification() {
        let (_signing_key, descriptor) = sample_descriptor();
        let now = UNIX_EPOCH + Duration::from_secs(descriptor.expires_at() + 10);
        assert_eq!(descriptor.verify(now), Err(DescriptorError::ExpiredDescriptor));
    }

    #[test]
    fn encode_then_parse_round_trips() {
        let (_signing_key, descriptor) = sample_descriptor();
        let line = descriptor.encode_line();
        let parsed = Descriptor::parse_line(&line).unwrap();
        assert_eq!(descriptor, parsed);
    }

    #[test]
    fn round_trips_through_chunked_fields() {
        let (_signing_key, descriptor) = sample_descriptor();
        let fields = descriptor.to_fields();
        let chunked = crate::chunk::chunk(&fields, 16).unwrap();
        let unchunked = crate::chunk::unchunk(&chunked);
        let parsed = Descriptor::parse_fields(&unchunked).unwrap();
        assert_eq!(descriptor, parsed);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let (_signing_key, descriptor) = sample_descriptor();
        let mut fields = descriptor.to_fields();
        fields.insert("future_field".to_string(), "whatever".to_string());
        let parsed = Descriptor::parse_fields(&fields).unwrap();
        assert_eq!(descriptor, parsed);
    }
}
