/// JSON documents exchanged in `Json` packets.
///
/// 64-bit sizes travel as decimal strings so that peers whose JSON numbers
/// are doubles do not lose precision above 2^53. Integers are still accepted
/// on decode for peers that send plain numbers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Item type used when a legacy header omits `"type"`.
pub const TYPE_FILE: &str = "file";

/// Item type for directory entries.
pub const TYPE_DIRECTORY: &str = "directory";

/// First packet of every transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferHeader {
    /// Name of the sending device.
    pub name: String,
    /// Total content bytes across all items.
    #[serde(with = "decimal")]
    pub size: u64,
    /// Number of items that follow.
    #[serde(with = "decimal")]
    pub count: u32,
}

/// Metadata preceding each item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemHeader {
    /// Relative path using `/` separators.
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    /// Present only when content packets follow.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "decimal::option"
    )]
    pub size: Option<u64>,
    /// Handler-specific extension fields.
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl TransferHeader {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

impl ItemHeader {
    pub fn new(name: impl Into<String>, item_type: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            item_type: Some(item_type.into()),
            size: (size > 0).then_some(size),
            properties: Map::new(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Item type, falling back to the legacy convention when absent:
    /// `"directory": true` means a directory, anything else a file.
    pub fn resolved_type(&self) -> &str {
        match &self.item_type {
            Some(t) => t,
            None => {
                let is_dir = self
                    .properties
                    .get(TYPE_DIRECTORY)
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if is_dir { TYPE_DIRECTORY } else { TYPE_FILE }
            }
        }
    }

    /// Number of content bytes that follow this header (0 = none).
    pub fn content_size(&self) -> u64 {
        self.size.unwrap_or(0)
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Boolean extension field; missing or non-boolean reads as false.
    pub fn flag(&self, key: &str) -> bool {
        self.property(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Integer extension field given either as a JSON number or a decimal string.
    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.property(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Serde adapter: integers written as decimal strings, read from strings or numbers.
pub(crate) mod decimal {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Decimal {
        Text(String),
        Number(u64),
    }

    fn convert<T, E>(raw: Decimal) -> Result<T, E>
    where
        T: FromStr + TryFrom<u64>,
        E: Error,
    {
        match raw {
            Decimal::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid decimal integer \"{}\"", s))),
            Decimal::Number(n) => {
                T::try_from(n).map_err(|_| E::custom(format!("integer {} out of range", n)))
            }
        }
    }

    pub fn serialize<T: Display, S: Serializer>(value: &T, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(d: D) -> Result<T, D::Error>
    where
        T: FromStr + TryFrom<u64>,
        D: Deserializer<'de>,
    {
        convert(Decimal::deserialize(d)?)
    }

    pub mod option {
        use super::*;

        pub fn serialize<T: Display, S: Serializer>(
            value: &Option<T>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => s.collect_str(v),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, T, D>(d: D) -> Result<Option<T>, D::Error>
        where
            T: FromStr + TryFrom<u64>,
            D: Deserializer<'de>,
        {
            match Option::<Decimal>::deserialize(d)? {
                Some(raw) => convert(raw).map(Some),
                None => Ok(None),
            }
        }
    }
}
