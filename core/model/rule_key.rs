use serde::de::Visitor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::*;

pub const RULE_KEY_LEN: usize = 32;

/// A SHA-256 digest over everything that can affect a rule's outputs.
///
/// Rule keys are recomputed on every build and are only ever persisted as cache keys.
///
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleKey([u8; RULE_KEY_LEN]);

impl RuleKey {
    pub fn from_bytes(bytes: [u8; RULE_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; RULE_KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleKey({})", self)
    }
}

impl FromStr for RuleKey {
    type Err = RuleKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != RULE_KEY_LEN * 2 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(RuleKeyParseError(s.to_string()));
        }
        let mut bytes = [0u8; RULE_KEY_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| RuleKeyParseError(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0:?} is not a 64 character hexadecimal rule key")]
pub struct RuleKeyParseError(String);

impl Serialize for RuleKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

struct RuleKeyVisitor;

impl Visitor<'_> for RuleKeyVisitor {
    type Value = RuleKey;

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse().map_err(E::custom)
    }

    fn expecting(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.write_str("a hex-encoded sha256 digest")
    }
}

impl<'de> Deserialize<'de> for RuleKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(RuleKeyVisitor)
    }
}
