//! Bencode value tree

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// Dictionary representation: raw byte keys in lexicographic order
pub type BencodeDict = BTreeMap<Vec<u8>, BencodeValue>;

/// A decoded bencode value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    Integer(i64),
    Bytes(Vec<u8>),
    List(Vec<BencodeValue>),
    Dict(BencodeDict),
}

impl BencodeValue {
    /// Create an empty dictionary
    pub fn dict() -> Self {
        BencodeValue::Dict(BTreeMap::new())
    }

    /// Create an empty list
    pub fn list() -> Self {
        BencodeValue::List(Vec::new())
    }

    /// Builder-style insert for dictionaries; no-op on other kinds
    pub fn insert(mut self, key: impl AsRef<[u8]>, value: impl Into<BencodeValue>) -> Self {
        if let BencodeValue::Dict(ref mut d) = self {
            d.insert(key.as_ref().to_vec(), value.into());
        }
        self
    }

    /// Builder-style push for lists; no-op on other kinds
    pub fn push(mut self, value: impl Into<BencodeValue>) -> Self {
        if let BencodeValue::List(ref mut l) = self {
            l.push(value.into());
        }
        self
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            BencodeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Byte string as UTF-8, `None` if the bytes are not valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            BencodeValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BencodeDict> {
        match self {
            BencodeValue::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Look up a key when this value is a dictionary
    pub fn get(&self, key: &[u8]) -> Option<&BencodeValue> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Short name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            BencodeValue::Integer(_) => "integer",
            BencodeValue::Bytes(_) => "byte string",
            BencodeValue::List(_) => "list",
            BencodeValue::Dict(_) => "dictionary",
        }
    }
}

impl From<i64> for BencodeValue {
    fn from(value: i64) -> Self {
        BencodeValue::Integer(value)
    }
}

impl From<&str> for BencodeValue {
    fn from(value: &str) -> Self {
        BencodeValue::Bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for BencodeValue {
    fn from(value: String) -> Self {
        BencodeValue::Bytes(value.into_bytes())
    }
}

impl From<Vec<u8>> for BencodeValue {
    fn from(value: Vec<u8>) -> Self {
        BencodeValue::Bytes(value)
    }
}

impl From<&[u8]> for BencodeValue {
    fn from(value: &[u8]) -> Self {
        BencodeValue::Bytes(value.to_vec())
    }
}

impl From<Vec<BencodeValue>> for BencodeValue {
    fn from(value: Vec<BencodeValue>) -> Self {
        BencodeValue::List(value)
    }
}

impl From<BencodeDict> for BencodeValue {
    fn from(value: BencodeDict) -> Self {
        BencodeValue::Dict(value)
    }
}

/// JSON-style rendering: byte strings become (lossy) text.
impl Serialize for BencodeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BencodeValue::Integer(i) => serializer.serialize_i64(*i),
            BencodeValue::Bytes(b) => serializer.serialize_str(&String::from_utf8_lossy(b)),
            BencodeValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            BencodeValue::Dict(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(&String::from_utf8_lossy(key), value)?;
                }
                map.end()
            }
        }
    }
}
