//! Schema Registry and Type Coercer
//!
//! A configuration record declares its synced fields through
//! [`ConfigRecord`]: logical name, static [`FieldType`] and a slot index.
//! [`SchemaRegistry`] turns those declarations into the immutable name index
//! used by every other component, and [`coerce`] converts decoded store values
//! into [`FieldValue`]s of the declared type.

mod coerce;
mod field;
mod record;
mod registry;

pub use coerce::*;
pub use field::*;
pub use record::*;
pub use registry::*;

#[cfg(test)]
mod registry_test;
