use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A fixed-length byte array that stringifies as unpadded base64, the way
/// `wireguard-control::Key` stringifies its 32 raw bytes. Used for every
/// binary descriptor field (`pk`, `c`, `vk`, `s`) so that encoding, parsing,
/// and `Display` all agree on one representation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct B64Bytes<const N: usize>(pub [u8; N]);

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum B64DecodeError {
    #[error("invalid base64")]
    InvalidBase64,
    #[error("decoded length {actual} does not match expected length {expected}")]
    WrongLength { expected: usize, actual: usize },
}

impl<const N: usize> B64Bytes<N> {
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        base64::encode_config(self.0, base64::STANDARD_NO_PAD)
    }

    pub fn from_base64(s: &str) -> Result<Self, B64DecodeError> {
        let decoded = base64::decode_config(s, base64::STANDARD_NO_PAD)
            .or_else(|_| base64::decode(s))
            .map_err(|_| B64DecodeError::InvalidBase64)?;
        Self::from_slice(&decoded)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, B64DecodeError> {
        if bytes.len() != N {
            return Err(B64DecodeError::WrongLength {
                expected: N,
                actual: bytes.len(),
            });
        }
        let mut buf = [0u8; N];
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }
}

impl<const N: usize> From<[u8; N]> for B64Bytes<N> {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes)
    }
}

impl<const N: usize> AsRef<[u8]> for B64Bytes<N> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const N: usize> fmt::Display for B64Bytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl<const N: usize> fmt::Debug for B64Bytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.to_base64();
        write!(f, "<b64:{}...({})>", &s[..s.len().min(6)], N)
    }
}

impl<const N: usize> FromStr for B64Bytes<N> {
    type Err = B64DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl<const N: usize> Serialize for B64Bytes<N> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de, const N: usize> Deserialize<'de> for B64Bytes<N> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_base64() {
        let bytes = B64Bytes::<10>([b'A'; 10]);
        let encoded = bytes.to_base64();
        let decoded: B64Bytes<10> = encoded.parse().unwrap();
        assert_eq!(bytes, decoded);
    }

    #[test]
    fn rejects_wrong_length() {
        let too_short = base64::encode_config([0u8; 5], base64::STANDARD_NO_PAD);
        assert_eq!(
            B64Bytes::<10>::from_base64(&too_short),
            Err(B64DecodeError::WrongLength {
                expected: 10,
                actual: 5
            })
        );
    }

    #[test]
    fn debug_shows_prefix_and_length() {
        let bytes = B64Bytes::<4>([0, 0, 0, 0]);
        assert_eq!(format!("{bytes:?}"), format!("<b64:{}...(4)>", bytes.to_base64()));
    }
}
