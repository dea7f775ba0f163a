use crate::id::IdKind;
use crate::schema::{FieldDescriptor, FieldKind};
use crate::value::Value;

/// Records that a path currently holds materialized documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulatedMarker {
    pub collection: String,
    pub is_virtual: bool,
}

impl PopulatedMarker {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            is_virtual: false,
        }
    }
}

/// Classify a value written directly to a field.
///
/// Reference (and undeclared) fields receiving documents become populated;
/// receiving raw identifiers leaves them unpopulated. An array mixing
/// documents and identifiers is cast to identifiers. Embedded fields turn
/// documents into subdocuments.
pub(crate) fn classify(
    descriptor: Option<&FieldDescriptor>,
    value: Value,
) -> (Value, Option<PopulatedMarker>) {
    match descriptor.map(|d| &d.kind) {
        Some(FieldKind::Plain) => (value, None),
        Some(FieldKind::Embedded(_)) => (embed(value), None),
        Some(FieldKind::Reference(r)) => classify_reference(cast_ids(value, r.id_kind)),
        None => classify_reference(value),
    }
}

fn classify_reference(value: Value) -> (Value, Option<PopulatedMarker>) {
    match value {
        Value::Populated(doc) => {
            let marker = PopulatedMarker::new(doc.model());
            (Value::Populated(doc), Some(marker))
        }
        Value::Array(items) => {
            let first_doc = items.iter().find_map(|v| match v {
                Value::Populated(d) => Some(d.model().to_string()),
                _ => None,
            });
            let has_raw = items
                .iter()
                .any(|v| !v.is_placeholder() && !v.is_populated());
            match first_doc {
                Some(collection) if !has_raw => {
                    (Value::Array(items), Some(PopulatedMarker::new(collection)))
                }
                Some(_) => {
                    let mut value = Value::Array(items);
                    depopulate_value(&mut value);
                    (value, None)
                }
                None => (Value::Array(items), None),
            }
        }
        other => (other, None),
    }
}

fn embed(value: Value) -> Value {
    match value {
        Value::Populated(doc) => Value::Embedded(doc.into_embedded()),
        Value::Array(items) => Value::Array(items.into_iter().map(embed).collect()),
        other => other,
    }
}

/// Cast the raw identifiers of a reference value to the declared kind.
/// Values that do not cast are kept as written.
pub(crate) fn cast_ids(value: Value, kind: IdKind) -> Value {
    match value {
        Value::Scalar(raw) => Value::Scalar(kind.cast(&raw).unwrap_or(raw)),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| cast_ids(v, kind)).collect())
        }
        other => other,
    }
}

/// Replace populated documents with their identifiers, in place.
pub(crate) fn depopulate_value(value: &mut Value) {
    match value {
        Value::Populated(doc) => {
            *value = doc.id().cloned().map_or(Value::Null, Value::Scalar);
        }
        Value::Array(items) => items.iter_mut().for_each(depopulate_value),
        _ => {}
    }
}
