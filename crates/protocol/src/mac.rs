//! Normalized gateway hardware addresses.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ProtocolError;

/// A gateway hardware address in canonical form.
///
/// The canonical form is six uppercase hex pairs joined by colons
/// (`AA:BB:CC:DD:EE:FF`). All code paths that persist or compare gateway
/// identities go through this type, so a MAC read back from any store is
/// byte-identical to the one written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mac(String);

impl Mac {
    /// Parses a hardware address from any common notation.
    ///
    /// Accepts colon, dash and dot separators as well as bare hex, in any
    /// case: `aa-bb-cc-dd-ee-ff`, `AABB.CCDD.EEFF` and `aabbccddeeff` all
    /// normalize to `AA:BB:CC:DD:EE:FF`.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let hex: String = raw
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.' | ' '))
            .collect();
        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ProtocolError::InvalidMac(raw.to_string()));
        }
        let upper = hex.to_ascii_uppercase();
        let pairs: Vec<&str> = (0..6).map(|i| &upper[i * 2..i * 2 + 2]).collect();
        Ok(Self(pairs.join(":")))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Mac {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Mac {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Mac::parse(&raw).map_err(serde::de::Error::custom)
    }
}
