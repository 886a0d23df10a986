//! Type Coercer
//!
//! Total function from a decoded [`Value`] and a declared [`FieldType`] to a
//! typed [`FieldValue`]. Every supported target kind is listed explicitly;
//! anything else is a [`CoercionError::Mismatch`].

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::parse_duration;
use crate::CoercionError;
use crate::FieldType;
use crate::FieldValue;
use crate::IntWidth;
use crate::Value;

/// Coerce a decoded value into the declared field type.
///
/// Numbers convert pragmatically: fractional parts truncate toward zero and
/// only the range of the declared width is enforced.
pub fn coerce(
    value: &Value,
    target: &FieldType,
) -> std::result::Result<FieldValue, CoercionError> {
    match (target, value) {
        (FieldType::Bool, Value::Bool(b)) => Ok(FieldValue::Bool(*b)),

        (FieldType::Int(width), Value::Integer(n)) => exact_int(*n, *width, target),
        (FieldType::Uint(width), Value::Integer(n)) => exact_uint(*n, *width, target),
        (FieldType::Float, Value::Integer(n)) => Ok(FieldValue::Float(*n as f64)),
        (FieldType::Duration, Value::Integer(n)) => match exact_uint(*n, IntWidth::W64, target)? {
            FieldValue::Uint(nanos) => Ok(FieldValue::Duration(Duration::from_nanos(nanos))),
            _ => Err(out_of_range(*n as f64, target)),
        },

        (FieldType::Int(width), Value::Number(n)) => coerce_int(*n, *width, target),
        (FieldType::Uint(width), Value::Number(n)) => coerce_uint(*n, *width, target),
        (FieldType::Float, Value::Number(n)) => Ok(FieldValue::Float(*n)),

        (FieldType::String, Value::String(s)) => Ok(FieldValue::String(s.clone())),

        (FieldType::Duration, Value::Number(n)) => coerce_nanos(*n, target),
        (FieldType::Duration, Value::String(s)) => parse_duration(s).map(FieldValue::Duration),

        // Key set of the mapping; values are discarded
        (FieldType::StringSet, Value::Mapping(entries)) => {
            Ok(FieldValue::StringSet(entries.keys().cloned().collect()))
        }
        (FieldType::StringSet, Value::Sequence(items)) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(nested(
                    format!("[{idx}]"),
                    CoercionError::Mismatch {
                        from: other.kind(),
                        to: FieldType::String,
                    },
                )),
            })
            .collect::<std::result::Result<BTreeSet<_>, _>>()
            .map(FieldValue::StringSet),

        (FieldType::StringSet, Value::Null) => Ok(FieldValue::StringSet(BTreeSet::new())),
        (FieldType::Sequence(_), Value::Null) => Ok(FieldValue::Sequence(Vec::new())),
        (FieldType::Mapping(_), Value::Null) => Ok(FieldValue::Mapping(BTreeMap::new())),

        (FieldType::Sequence(inner), Value::Sequence(items)) => coerce_items(items, inner),
        (FieldType::Array(inner, len), Value::Sequence(items)) => {
            if items.len() != *len {
                return Err(CoercionError::Length {
                    expected: *len,
                    actual: items.len(),
                });
            }
            coerce_items(items, inner)
        }

        (FieldType::Mapping(inner), Value::Mapping(entries)) => entries
            .iter()
            .map(|(k, v)| {
                coerce(v, inner)
                    .map(|typed| (k.clone(), typed))
                    .map_err(|e| nested(k.clone(), e))
            })
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()
            .map(FieldValue::Mapping),

        (to, from) => Err(CoercionError::Mismatch {
            from: from.kind(),
            to: to.clone(),
        }),
    }
}

fn coerce_items(
    items: &[Value],
    inner: &FieldType,
) -> std::result::Result<FieldValue, CoercionError> {
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| coerce(item, inner).map_err(|e| nested(format!("[{idx}]"), e)))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(FieldValue::Sequence)
}

fn nested(
    path: String,
    source: CoercionError,
) -> CoercionError {
    CoercionError::Nested {
        path,
        source: Box::new(source),
    }
}

fn out_of_range(
    n: f64,
    target: &FieldType,
) -> CoercionError {
    CoercionError::OutOfRange {
        value: n,
        to: target.clone(),
    }
}

fn exact_int(
    n: i128,
    width: IntWidth,
    target: &FieldType,
) -> std::result::Result<FieldValue, CoercionError> {
    let bound = 1i128 << (width.bits() - 1);
    if n < -bound || n >= bound {
        return Err(out_of_range(n as f64, target));
    }
    i64::try_from(n)
        .map(FieldValue::Int)
        .map_err(|_| out_of_range(n as f64, target))
}

fn exact_uint(
    n: i128,
    width: IntWidth,
    target: &FieldType,
) -> std::result::Result<FieldValue, CoercionError> {
    let bound = 1i128 << width.bits();
    if n < 0 || n >= bound {
        return Err(out_of_range(n as f64, target));
    }
    u64::try_from(n)
        .map(FieldValue::Uint)
        .map_err(|_| out_of_range(n as f64, target))
}

fn coerce_int(
    n: f64,
    width: IntWidth,
    target: &FieldType,
) -> std::result::Result<FieldValue, CoercionError> {
    if !n.is_finite() {
        return Err(out_of_range(n, target));
    }
    let truncated = n.trunc();
    // 2^(bits-1) is exactly representable for every width
    let bound = 2f64.powi(width.bits() as i32 - 1);
    if truncated < -bound || truncated >= bound {
        return Err(out_of_range(n, target));
    }
    Ok(FieldValue::Int(truncated as i64))
}

fn coerce_uint(
    n: f64,
    width: IntWidth,
    target: &FieldType,
) -> std::result::Result<FieldValue, CoercionError> {
    if !n.is_finite() {
        return Err(out_of_range(n, target));
    }
    let truncated = n.trunc();
    let bound = 2f64.powi(width.bits() as i32);
    if truncated < 0.0 || truncated >= bound {
        return Err(out_of_range(n, target));
    }
    Ok(FieldValue::Uint(truncated as u64))
}

fn coerce_nanos(
    n: f64,
    target: &FieldType,
) -> std::result::Result<FieldValue, CoercionError> {
    match coerce_uint(n, IntWidth::W64, target) {
        Ok(FieldValue::Uint(nanos)) => Ok(FieldValue::Duration(Duration::from_nanos(nanos))),
        _ => Err(out_of_range(n, target)),
    }
}
