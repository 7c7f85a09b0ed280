// SPDX-License-Identifier: GPL-3.0-only

//! Conversions between storage-types values and D-Bus variants

use std::collections::HashMap;

use storage_types::{ObjectPath, OptionBag, OptionValue, PropertyBag, PropertyValue};
use zbus::zvariant::{self, OwnedValue, Value};

/// Property map of one interface as it travels on the bus
pub type WireProperties = HashMap<String, OwnedValue>;

pub fn to_value(value: &PropertyValue) -> zvariant::Result<OwnedValue> {
    let value = match value {
        PropertyValue::Bool(value) => Value::from(*value),
        PropertyValue::U64(value) => Value::from(*value),
        PropertyValue::I64(value) => Value::from(*value),
        PropertyValue::Str(value) => Value::from(value.clone()),
        PropertyValue::StrList(values) => Value::from(values.clone()),
        PropertyValue::Path(path) => Value::from(to_object_path(path)?),
        PropertyValue::PathList(paths) => {
            let paths = paths
                .iter()
                .map(to_object_path)
                .collect::<zvariant::Result<Vec<_>>>()?;
            Value::from(paths)
        }
    };
    OwnedValue::try_from(value)
}

pub fn to_wire_properties(bag: &PropertyBag) -> zvariant::Result<WireProperties> {
    bag.iter()
        .map(|(name, value)| Ok((name.clone(), to_value(value)?)))
        .collect()
}

/// Best-effort decoding of a variant into a property value
pub fn from_value(value: &Value<'_>) -> Option<PropertyValue> {
    match value {
        Value::Bool(value) => Some(PropertyValue::Bool(*value)),
        Value::U8(value) => Some(PropertyValue::U64(u64::from(*value))),
        Value::U16(value) => Some(PropertyValue::U64(u64::from(*value))),
        Value::U32(value) => Some(PropertyValue::U64(u64::from(*value))),
        Value::U64(value) => Some(PropertyValue::U64(*value)),
        Value::I16(value) => Some(PropertyValue::I64(i64::from(*value))),
        Value::I32(value) => Some(PropertyValue::I64(i64::from(*value))),
        Value::I64(value) => Some(PropertyValue::I64(*value)),
        Value::Str(value) => Some(PropertyValue::Str(value.as_str().to_string())),
        Value::ObjectPath(path) => ObjectPath::new(path.as_str()).ok().map(PropertyValue::Path),
        Value::Value(inner) => from_value(inner),
        Value::Array(array) => {
            let items: Vec<&Value<'_>> = array.iter().collect();
            if !items.is_empty()
                && items
                    .iter()
                    .all(|item| matches!(item, Value::ObjectPath(_)))
            {
                let paths = items
                    .iter()
                    .filter_map(|item| match item {
                        Value::ObjectPath(path) => ObjectPath::new(path.as_str()).ok(),
                        _ => None,
                    })
                    .collect();
                Some(PropertyValue::PathList(paths))
            } else {
                let strings = items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Str(value) => Some(value.as_str().to_string()),
                        _ => None,
                    })
                    .collect();
                Some(PropertyValue::StrList(strings))
            }
        }
        _ => None,
    }
}

pub fn from_wire_properties(properties: &WireProperties) -> PropertyBag {
    properties
        .iter()
        .filter_map(|(name, value)| from_value(value).map(|value| (name.clone(), value)))
        .collect()
}

/// Decode a method's trailing `a{sv}` argument; unsupported variant types are dropped
pub fn options_from_wire(options: &HashMap<String, OwnedValue>) -> OptionBag {
    let mut bag = OptionBag::new();
    for (name, value) in options {
        let decoded = match &**value {
            Value::Bool(value) => Some(OptionValue::Bool(*value)),
            Value::U32(value) => Some(OptionValue::U64(u64::from(*value))),
            Value::U64(value) => Some(OptionValue::U64(*value)),
            Value::I32(value) => Some(OptionValue::I64(i64::from(*value))),
            Value::I64(value) => Some(OptionValue::I64(*value)),
            Value::Str(value) => Some(OptionValue::Str(value.as_str().to_string())),
            _ => None,
        };
        match decoded {
            Some(decoded) => bag.insert(name.clone(), decoded),
            None => tracing::debug!("Ignoring option {name} with unsupported type"),
        }
    }
    bag
}

fn to_object_path(path: &ObjectPath) -> zvariant::Result<zvariant::ObjectPath<'static>> {
    zvariant::ObjectPath::try_from(path.as_str().to_string())
}
