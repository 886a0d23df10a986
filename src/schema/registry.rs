use std::collections::HashMap;

use tracing::debug;

use crate::ConfigRecord;
use crate::FieldType;
use crate::SchemaError;

/// One synced field: logical name, declared type, slot in the record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaEntry {
    pub name: String,
    pub field: &'static str,
    pub field_type: FieldType,
    pub slot: usize,
}

/// Immutable mapping from logical name to [`SchemaEntry`]
///
/// Built once when the client is constructed and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: Vec<SchemaEntry>,
    by_name: HashMap<String, usize>,
}

impl SchemaRegistry {
    /// Derive the registry from the record's field declarations.
    ///
    /// # Errors
    /// - [`SchemaError::MissingName`] if a field declares an empty name
    /// - [`SchemaError::DuplicateName`] if two fields share a name
    /// - [`SchemaError::NotAddressable`] if a declared slot cannot be read
    ///   on `record`
    pub fn build<R: ConfigRecord>(record: &R) -> std::result::Result<Self, SchemaError> {
        let mut registry = Self::default();

        for descriptor in R::fields() {
            if descriptor.name.is_empty() {
                return Err(SchemaError::MissingName {
                    field: descriptor.field.to_string(),
                });
            }

            if record.get_field(descriptor.slot).is_none() {
                return Err(SchemaError::NotAddressable {
                    field: descriptor.field.to_string(),
                    slot: descriptor.slot,
                });
            }

            if let Some(&existing) = registry.by_name.get(descriptor.name) {
                return Err(SchemaError::DuplicateName {
                    name: descriptor.name.to_string(),
                    first: registry.entries[existing].field.to_string(),
                    second: descriptor.field.to_string(),
                });
            }

            registry
                .by_name
                .insert(descriptor.name.to_string(), registry.entries.len());
            registry.entries.push(SchemaEntry {
                name: descriptor.name.to_string(),
                field: descriptor.field,
                field_type: descriptor.field_type,
                slot: descriptor.slot,
            });
        }

        debug!(fields = registry.entries.len(), "schema registry built");
        Ok(registry)
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<&SchemaEntry> {
        self.by_name.get(name).map(|&idx| &self.entries[idx])
    }

    pub fn contains(
        &self,
        name: &str,
    ) -> bool {
        self.by_name.contains_key(name)
    }

    /// Entries in declaration order
    pub fn entries(&self) -> impl Iterator<Item = &SchemaEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
