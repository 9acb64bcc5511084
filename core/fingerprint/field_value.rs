use crate::model::RuleKey;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const TAG_ABSENT: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_STR: u8 = 0x03;
const TAG_PATH: u8 = 0x04;
const TAG_LIST: u8 = 0x05;
const TAG_SET: u8 = 0x06;
const TAG_MAP: u8 = 0x07;
const TAG_FILE_HASH: u8 = 0x08;
const TAG_RULE_KEY: u8 = 0x09;

/// A typed value that goes into a rule key.
///
/// Every variant has exactly one byte encoding: a tag byte followed by a payload where every
/// variable-length part is prefixed by its length as a little-endian `u64`. `Set`s are encoded
/// with their elements sorted by their own encodings (and de-duplicated), and `Map`s are keyed by
/// a `BTreeMap`, so neither depends on insertion order. `List`s keep their order.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Absent,
    Bool(bool),
    Int(i64),
    Str(String),
    Path(PathBuf),
    List(Vec<FieldValue>),
    Set(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
    FileHash { path: PathBuf, digest: [u8; 32] },
    RuleKey(RuleKey),
}

impl FieldValue {
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub fn set<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        Self::Set(items.into_iter().map(Into::into).collect())
    }

    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// The canonical encoding of this value.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![];
        self.encode_into(&mut out);
        out
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            FieldValue::Absent => out.push(TAG_ABSENT),
            FieldValue::Bool(b) => {
                out.push(TAG_BOOL);
                out.push(*b as u8);
            }
            FieldValue::Int(i) => {
                out.push(TAG_INT);
                out.extend_from_slice(&i.to_le_bytes());
            }
            FieldValue::Str(s) => {
                out.push(TAG_STR);
                write_bytes(out, s.as_bytes());
            }
            FieldValue::Path(path) => {
                out.push(TAG_PATH);
                write_path(out, path);
            }
            FieldValue::List(items) => {
                out.push(TAG_LIST);
                write_len(out, items.len());
                for item in items {
                    item.encode_into(out);
                }
            }
            FieldValue::Set(items) => {
                let mut encoded: Vec<Vec<u8>> = items.iter().map(FieldValue::encode).collect();
                encoded.sort();
                encoded.dedup();
                out.push(TAG_SET);
                write_len(out, encoded.len());
                for item in encoded {
                    out.extend_from_slice(&item);
                }
            }
            FieldValue::Map(entries) => {
                out.push(TAG_MAP);
                write_len(out, entries.len());
                for (key, value) in entries {
                    write_bytes(out, key.as_bytes());
                    value.encode_into(out);
                }
            }
            FieldValue::FileHash { path, digest } => {
                out.push(TAG_FILE_HASH);
                write_path(out, path);
                out.extend_from_slice(digest);
            }
            FieldValue::RuleKey(key) => {
                out.push(TAG_RULE_KEY);
                out.extend_from_slice(key.as_bytes());
            }
        }
    }
}

pub(crate) fn write_len(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(&(len as u64).to_le_bytes());
}

pub(crate) fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_len(out, bytes.len());
    out.extend_from_slice(bytes);
}

// Paths are encoded component by component, so `a/b` and `a//b/` are the same path on every
// platform.
fn write_path(out: &mut Vec<u8>, path: &Path) {
    let components: Vec<&[u8]> = path
        .components()
        .map(|c| c.as_os_str().as_encoded_bytes())
        .collect();
    write_len(out, components.len());
    for component in components {
        write_bytes(out, component);
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<PathBuf> for FieldValue {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for FieldValue {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<RuleKey> for FieldValue {
    fn from(value: RuleKey) -> Self {
        Self::RuleKey(value)
    }
}

impl<V: Into<FieldValue>> From<Option<V>> for FieldValue {
    fn from(value: Option<V>) -> Self {
        match value {
            Some(value) => value.into(),
            None => Self::Absent,
        }
    }
}

impl<V: Into<FieldValue>> From<Vec<V>> for FieldValue {
    fn from(value: Vec<V>) -> Self {
        Self::list(value)
    }
}

/// A single named entry in a rule key.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    name: String,
    value: FieldValue,
}

impl Contribution {
    pub fn new<N, V>(name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<FieldValue>,
    {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }
}
