use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::hash::BuildHasher;
use std::time::Duration;

use serde::ser::SerializeMap;
use serde::ser::SerializeSeq;
use serde::Serialize;
use serde::Serializer;

use crate::CoercionError;
use crate::Value;

/// Bit width of a fixed-size integer field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    pub fn bits(self) -> u32 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
            IntWidth::W64 => 64,
        }
    }
}

/// Declared static type of a configuration field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Bool,
    Int(IntWidth),
    Uint(IntWidth),
    Float,
    String,
    Duration,
    /// Set of strings, stored as a mapping whose keys are the members
    StringSet,
    Sequence(Box<FieldType>),
    /// Sequence that must hold exactly `len` elements
    Array(Box<FieldType>, usize),
    Mapping(Box<FieldType>),
}

impl fmt::Display for FieldType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            FieldType::Bool => write!(f, "bool"),
            FieldType::Int(w) => write!(f, "int{}", w.bits()),
            FieldType::Uint(w) => write!(f, "uint{}", w.bits()),
            FieldType::Float => write!(f, "float64"),
            FieldType::String => write!(f, "string"),
            FieldType::Duration => write!(f, "duration"),
            FieldType::StringSet => write!(f, "set<string>"),
            FieldType::Sequence(inner) => write!(f, "[]{inner}"),
            FieldType::Array(inner, len) => write!(f, "[{len}]{inner}"),
            FieldType::Mapping(inner) => write!(f, "map<string, {inner}>"),
        }
    }
}

/// Owned, typed value of a configuration field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Duration(Duration),
    StringSet(BTreeSet<String>),
    Sequence(Vec<FieldValue>),
    Mapping(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "int",
            FieldValue::Uint(_) => "uint",
            FieldValue::Float(_) => "float",
            FieldValue::String(_) => "string",
            FieldValue::Duration(_) => "duration",
            FieldValue::StringSet(_) => "set",
            FieldValue::Sequence(_) => "sequence",
            FieldValue::Mapping(_) => "mapping",
        }
    }

    /// Convert into the Rust type backing a record field
    pub fn into_typed<T: ConfigField>(self) -> std::result::Result<T, CoercionError> {
        T::from_field_value(self)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(n) => Some(*n),
            FieldValue::Uint(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            FieldValue::Duration(d) => Some(*d),
            _ => None,
        }
    }
}

impl From<FieldValue> for Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Bool(b) => Value::Bool(b),
            FieldValue::Int(n) => Value::Integer(n.into()),
            FieldValue::Uint(n) => Value::Integer(n.into()),
            FieldValue::Float(n) => Value::Number(n),
            FieldValue::String(s) => Value::String(s),
            FieldValue::Duration(d) => Value::from(d),
            FieldValue::StringSet(members) => Value::from(members),
            FieldValue::Sequence(items) => Value::Sequence(items.into_iter().map(Value::from).collect()),
            FieldValue::Mapping(entries) => {
                Value::Mapping(entries.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Serialization goes straight from the typed value so 64-bit integers and
/// nanosecond durations are written exactly.
impl Serialize for FieldValue {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::Int(n) => serializer.serialize_i64(*n),
            FieldValue::Uint(n) => serializer.serialize_u64(*n),
            FieldValue::Float(n) => {
                if !n.is_finite() {
                    return Err(serde::ser::Error::custom(format!("non-finite number {n}")));
                }
                serializer.serialize_f64(*n)
            }
            FieldValue::String(s) => serializer.serialize_str(s),
            FieldValue::Duration(d) => {
                let nanos = u64::try_from(d.as_nanos())
                    .map_err(|_| serde::ser::Error::custom(format!("duration {d:?} overflows nanoseconds")))?;
                serializer.serialize_u64(nanos)
            }
            FieldValue::StringSet(members) => {
                let mut map = serializer.serialize_map(Some(members.len()))?;
                for member in members {
                    map.serialize_entry(member, &EmptyObject)?;
                }
                map.end()
            }
            FieldValue::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            FieldValue::Mapping(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

/// `{}`
struct EmptyObject;

impl Serialize for EmptyObject {
    fn serialize<S>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_map(Some(0))?.end()
    }
}

/// Rust types that can back a synced record field
pub trait ConfigField: Sized {
    fn field_type() -> FieldType;

    fn to_field_value(&self) -> FieldValue;

    fn from_field_value(value: FieldValue) -> std::result::Result<Self, CoercionError>;
}

fn mismatch<T: ConfigField>(value: &FieldValue) -> CoercionError {
    CoercionError::Mismatch {
        from: value.kind(),
        to: T::field_type(),
    }
}

macro_rules! signed_field {
    ($($t:ty => $w:expr),*) => {
        $(
            impl ConfigField for $t {
                fn field_type() -> FieldType {
                    FieldType::Int($w)
                }

                fn to_field_value(&self) -> FieldValue {
                    FieldValue::Int(*self as i64)
                }

                fn from_field_value(value: FieldValue) -> std::result::Result<Self, CoercionError> {
                    let n = value.as_i64().ok_or_else(|| mismatch::<Self>(&value))?;
                    <$t>::try_from(n).map_err(|_| CoercionError::OutOfRange {
                        value: n as f64,
                        to: Self::field_type(),
                    })
                }
            }
        )*
    };
}

macro_rules! unsigned_field {
    ($($t:ty => $w:expr),*) => {
        $(
            impl ConfigField for $t {
                fn field_type() -> FieldType {
                    FieldType::Uint($w)
                }

                fn to_field_value(&self) -> FieldValue {
                    FieldValue::Uint(*self as u64)
                }

                fn from_field_value(value: FieldValue) -> std::result::Result<Self, CoercionError> {
                    let n = match value {
                        FieldValue::Uint(n) => n,
                        FieldValue::Int(n) if n >= 0 => n as u64,
                        other => return Err(mismatch::<Self>(&other)),
                    };
                    <$t>::try_from(n).map_err(|_| CoercionError::OutOfRange {
                        value: n as f64,
                        to: Self::field_type(),
                    })
                }
            }
        )*
    };
}

signed_field!(i8 => IntWidth::W8, i16 => IntWidth::W16, i32 => IntWidth::W32, i64 => IntWidth::W64);
unsigned_field!(u8 => IntWidth::W8, u16 => IntWidth::W16, u32 => IntWidth::W32, u64 => IntWidth::W64);

impl ConfigField for f64 {
    fn field_type() -> FieldType {
        FieldType::Float
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Float(*self)
    }

    fn from_field_value(value: FieldValue) -> std::result::Result<Self, CoercionError> {
        match value {
            FieldValue::Float(n) => Ok(n),
            FieldValue::Int(n) => Ok(n as f64),
            FieldValue::Uint(n) => Ok(n as f64),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl ConfigField for bool {
    fn field_type() -> FieldType {
        FieldType::Bool
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Bool(*self)
    }

    fn from_field_value(value: FieldValue) -> std::result::Result<Self, CoercionError> {
        match value {
            FieldValue::Bool(b) => Ok(b),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl ConfigField for String {
    fn field_type() -> FieldType {
        FieldType::String
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::String(self.clone())
    }

    fn from_field_value(value: FieldValue) -> std::result::Result<Self, CoercionError> {
        match value {
            FieldValue::String(s) => Ok(s),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl ConfigField for Duration {
    fn field_type() -> FieldType {
        FieldType::Duration
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Duration(*self)
    }

    fn from_field_value(value: FieldValue) -> std::result::Result<Self, CoercionError> {
        match value {
            FieldValue::Duration(d) => Ok(d),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl ConfigField for BTreeSet<String> {
    fn field_type() -> FieldType {
        FieldType::StringSet
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::StringSet(self.clone())
    }

    fn from_field_value(value: FieldValue) -> std::result::Result<Self, CoercionError> {
        match value {
            FieldValue::StringSet(members) => Ok(members),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<S: BuildHasher + Default> ConfigField for HashSet<String, S> {
    fn field_type() -> FieldType {
        FieldType::StringSet
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::StringSet(self.iter().cloned().collect())
    }

    fn from_field_value(value: FieldValue) -> std::result::Result<Self, CoercionError> {
        match value {
            FieldValue::StringSet(members) => Ok(members.into_iter().collect()),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: ConfigField> ConfigField for Vec<T> {
    fn field_type() -> FieldType {
        FieldType::Sequence(Box::new(T::field_type()))
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Sequence(self.iter().map(T::to_field_value).collect())
    }

    fn from_field_value(value: FieldValue) -> std::result::Result<Self, CoercionError> {
        match value {
            FieldValue::Sequence(items) => items.into_iter().map(T::from_field_value).collect(),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: ConfigField, const N: usize> ConfigField for [T; N] {
    fn field_type() -> FieldType {
        FieldType::Array(Box::new(T::field_type()), N)
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Sequence(self.iter().map(T::to_field_value).collect())
    }

    fn from_field_value(value: FieldValue) -> std::result::Result<Self, CoercionError> {
        let items = match value {
            FieldValue::Sequence(items) => items,
            other => return Err(mismatch::<Self>(&other)),
        };
        let actual = items.len();
        let typed = items
            .into_iter()
            .map(T::from_field_value)
            .collect::<std::result::Result<Vec<T>, _>>()?;
        typed
            .try_into()
            .map_err(|_| CoercionError::Length { expected: N, actual })
    }
}

impl<T: ConfigField> ConfigField for BTreeMap<String, T> {
    fn field_type() -> FieldType {
        FieldType::Mapping(Box::new(T::field_type()))
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Mapping(self.iter().map(|(k, v)| (k.clone(), v.to_field_value())).collect())
    }

    fn from_field_value(value: FieldValue) -> std::result::Result<Self, CoercionError> {
        match value {
            FieldValue::Mapping(entries) => entries
                .into_iter()
                .map(|(k, v)| T::from_field_value(v).map(|v| (k, v)))
                .collect(),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: ConfigField, S: BuildHasher + Default> ConfigField for HashMap<String, T, S> {
    fn field_type() -> FieldType {
        FieldType::Mapping(Box::new(T::field_type()))
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Mapping(self.iter().map(|(k, v)| (k.clone(), v.to_field_value())).collect())
    }

    fn from_field_value(value: FieldValue) -> std::result::Result<Self, CoercionError> {
        match value {
            FieldValue::Mapping(entries) => entries
                .into_iter()
                .map(|(k, v)| T::from_field_value(v).map(|v| (k, v)))
                .collect(),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}
