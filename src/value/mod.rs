//! Store-native dynamic values
//!
//! Every payload read from the store is decoded into the closed [`Value`]
//! variant before it is coerced into a typed field. The encoding on the wire
//! is JSON: scalars, arrays and objects.
//!
//! Integral numbers are kept exact in [`Value::Integer`]; anything with a
//! fraction or exponent is carried as an `f64` in [`Value::Number`].

mod duration;

pub use duration::*;


use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::time::Duration;

use serde::ser::SerializeMap;
use serde::ser::SerializeSeq;
use serde::Serialize;
use serde::Serializer;

/// Decoded, untyped value as observed in the store
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Integer(i128),
    Number(f64),
    Bool(bool),
    String(String),
    Sequence(Vec<Value>),
    Mapping(BTreeMap<String, Value>),
}

impl Value {
    /// Short name of the variant, used in coercion errors
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) | Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
        }
    }

    /// Decode a raw store payload
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        let json: serde_json::Value = serde_json::from_slice(bytes)?;
        Ok(Self::from(json))
    }

    /// Encode into the JSON wire form
    pub fn encode(&self) -> std::result::Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl Serialize for Value {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Integer(n) => serialize_integer(*n, serializer),
            Value::Number(n) => serialize_number(*n, serializer),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::String(s) => serializer.serialize_str(s),
            Value::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Mapping(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

fn serialize_integer<S: Serializer>(
    n: i128,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    if let Ok(n) = i64::try_from(n) {
        serializer.serialize_i64(n)
    } else if let Ok(n) = u64::try_from(n) {
        serializer.serialize_u64(n)
    } else {
        serializer.serialize_i128(n)
    }
}

/// Integral numbers are written without a fractional part so that `30`
/// round-trips as `30` rather than `30.0`.
fn serialize_number<S: Serializer>(
    n: f64,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    const EXACT: f64 = 9_007_199_254_740_992.0; // 2^53
    if !n.is_finite() {
        return Err(serde::ser::Error::custom(format!("non-finite number {n}")));
    }
    if n.fract() == 0.0 && n.abs() <= EXACT {
        serializer.serialize_i64(n as i64)
    } else {
        serializer.serialize_f64(n)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i.into())
                } else if let Some(u) = n.as_u64() {
                    Value::Integer(u.into())
                } else {
                    Value::Number(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Sequence(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(entries) => {
                Value::Mapping(entries.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

macro_rules! integer_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Integer(n as i128)
                }
            }
        )*
    };
}

integer_from!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Durations travel as nanoseconds
impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Value::Integer(i128::try_from(d.as_nanos()).unwrap_or(i128::MAX))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Sequence(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(entries: BTreeMap<String, T>) -> Self {
        Value::Mapping(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl<T: Into<Value>> From<HashMap<String, T>> for Value {
    fn from(entries: HashMap<String, T>) -> Self {
        Value::Mapping(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// A set is a mapping whose values carry no information
impl From<BTreeSet<String>> for Value {
    fn from(members: BTreeSet<String>) -> Self {
        Value::Mapping(
            members
                .into_iter()
                .map(|m| (m, Value::Mapping(BTreeMap::new())))
                .collect(),
        )
    }
}

impl From<HashSet<String>> for Value {
    fn from(members: HashSet<String>) -> Self {
        Value::from(members.into_iter().collect::<BTreeSet<_>>())
    }
}
