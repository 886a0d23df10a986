use std::time::Duration;

use super::*;
use crate::CoercionError;
use crate::SchemaError;

crate::config_record! {
    #[derive(Debug, Clone, Default)]
    struct ServiceConfig {
        #[config("timeout")]
        timeout: i64,
        #[config("mode")]
        mode: String,
        #[config("poll")]
        poll: Duration,
    }
}

/// Hand-written record with a single `i64` slot and caller-chosen descriptors
macro_rules! manual_record {
    ($name:ident, [$($desc:expr),* $(,)?]) => {
        #[derive(Default)]
        struct $name {
            value: i64,
        }

        impl ConfigRecord for $name {
            fn fields() -> Vec<FieldDescriptor> {
                vec![$($desc),*]
            }

            fn get_field(
                &self,
                slot: usize,
            ) -> Option<FieldValue> {
                (slot == 0).then_some(FieldValue::Int(self.value))
            }

            fn set_field(
                &mut self,
                slot: usize,
                value: FieldValue,
            ) -> std::result::Result<(), CoercionError> {
                if slot != 0 {
                    return Err(CoercionError::UnknownSlot(slot));
                }
                self.value = value.into_typed()?;
                Ok(())
            }
        }
    };
}

fn int64() -> FieldType {
    FieldType::Int(IntWidth::W64)
}

manual_record!(Untagged, [FieldDescriptor::new("counter", "", int64(), 0)]);
manual_record!(
    Duplicated,
    [
        FieldDescriptor::new("counter", "counter", int64(), 0),
        FieldDescriptor::new("counter_copy", "counter", int64(), 0),
    ]
);
manual_record!(Dangling, [FieldDescriptor::new("ghost", "ghost", int64(), 7)]);

#[test]
fn build_should_index_every_declared_field() {
    let registry = SchemaRegistry::build(&ServiceConfig::default()).unwrap();

    assert_eq!(registry.len(), 3);
    let timeout = registry.get("timeout").unwrap();
    assert_eq!(timeout.field, "timeout");
    assert_eq!(timeout.field_type, int64());
    assert_eq!(timeout.slot, 0);
    assert_eq!(registry.get("poll").unwrap().field_type, FieldType::Duration);
    assert!(registry.get("missing").is_none());
    assert!(registry.contains("mode"));
    assert!(!registry.contains("missing"));

    let names: Vec<_> = registry.entries().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["timeout", "mode", "poll"]);
}

#[test]
fn build_should_fail_when_a_field_has_no_name() {
    assert_eq!(
        SchemaRegistry::build(&Untagged::default()).unwrap_err(),
        SchemaError::MissingName {
            field: "counter".to_string()
        }
    );
}

#[test]
fn build_should_fail_on_duplicate_names() {
    assert_eq!(
        SchemaRegistry::build(&Duplicated::default()).unwrap_err(),
        SchemaError::DuplicateName {
            name: "counter".to_string(),
            first: "counter".to_string(),
            second: "counter_copy".to_string(),
        }
    );
}

#[test]
fn build_should_fail_when_slot_is_not_addressable() {
    assert_eq!(
        SchemaRegistry::build(&Dangling::default()).unwrap_err(),
        SchemaError::NotAddressable {
            field: "ghost".to_string(),
            slot: 7
        }
    );
}

#[test]
fn generated_accessors_should_round_trip_slots() {
    let mut record = ServiceConfig::default();

    record.set_field(1, FieldValue::String("production".into())).unwrap();
    record
        .set_field(2, FieldValue::Duration(Duration::from_secs(5)))
        .unwrap();

    assert_eq!(record.mode, "production");
    assert_eq!(record.get_field(2), Some(FieldValue::Duration(Duration::from_secs(5))));
    assert_eq!(record.get_field(3), None);
    assert_eq!(
        record.set_field(9, FieldValue::Int(1)),
        Err(CoercionError::UnknownSlot(9))
    );
    assert!(record.set_field(0, FieldValue::Bool(true)).is_err());
}
