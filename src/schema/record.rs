use crate::CoercionError;
use crate::FieldType;
use crate::FieldValue;

/// Static description of one record field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Rust identifier of the field, used in error messages
    pub field: &'static str,
    /// Logical name, the key suffix under the prefix. Empty means undeclared.
    pub name: &'static str,
    pub field_type: FieldType,
    /// Stable slot identity used by [`ConfigRecord::get_field`] and
    /// [`ConfigRecord::set_field`]
    pub slot: usize,
}

impl FieldDescriptor {
    pub fn new(
        field: &'static str,
        name: &'static str,
        field_type: FieldType,
        slot: usize,
    ) -> Self {
        Self {
            field,
            name,
            field_type,
            slot,
        }
    }
}

/// Capability-based accessor over a caller-owned configuration record
///
/// Implementors expose their fields by slot index instead of being inspected
/// at runtime. [`config_record!`](crate::config_record) generates this impl
/// for plain structs.
pub trait ConfigRecord: Send + Sync + 'static {
    /// Field declarations, in declaration order
    fn fields() -> Vec<FieldDescriptor>;

    /// Read the current value held in `slot`
    fn get_field(
        &self,
        slot: usize,
    ) -> Option<FieldValue>;

    /// Replace the value held in `slot`
    fn set_field(
        &mut self,
        slot: usize,
        value: FieldValue,
    ) -> std::result::Result<(), CoercionError>;
}

/// Declare a struct whose fields are synced under a prefix
///
/// Each field carries its logical name in `#[config("...")]`; any further
/// attributes (docs, serde) follow it.
///
/// ```
/// use std::time::Duration;
///
/// d_config::config_record! {
///     #[derive(Debug, Clone)]
///     pub struct ServerConfig {
///         #[config("timeout")]
///         pub timeout: i64,
///         #[config("mode")]
///         /// Deployment mode
///         pub mode: String,
///         #[config("poll_interval")]
///         pub poll_interval: Duration,
///     }
/// }
/// ```
#[macro_export]
macro_rules! config_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                #[config($key:literal)]
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $ty,
            )*
        }

        impl $crate::ConfigRecord for $name {
            fn fields() -> ::std::vec::Vec<$crate::FieldDescriptor> {
                let mut fields = ::std::vec::Vec::new();
                $(
                    let slot = fields.len();
                    fields.push($crate::FieldDescriptor::new(
                        stringify!($field),
                        $key,
                        <$ty as $crate::ConfigField>::field_type(),
                        slot,
                    ));
                )*
                fields
            }

            #[allow(unused_assignments, unused_mut, unused_variables)]
            fn get_field(
                &self,
                slot: usize,
            ) -> ::std::option::Option<$crate::FieldValue> {
                let mut index = 0usize;
                $(
                    if index == slot {
                        return ::std::option::Option::Some(
                            <$ty as $crate::ConfigField>::to_field_value(&self.$field),
                        );
                    }
                    index += 1;
                )*
                ::std::option::Option::None
            }

            #[allow(unused_assignments, unused_mut, unused_variables)]
            fn set_field(
                &mut self,
                slot: usize,
                value: $crate::FieldValue,
            ) -> ::std::result::Result<(), $crate::CoercionError> {
                let mut index = 0usize;
                $(
                    if index == slot {
                        self.$field = <$ty as $crate::ConfigField>::from_field_value(value)?;
                        return ::std::result::Result::Ok(());
                    }
                    index += 1;
                )*
                ::std::result::Result::Err($crate::CoercionError::UnknownSlot(slot))
            }
        }
    };
}
