use bson::Bson;
use bson::oid::ObjectId;

use crate::document::Document;
use crate::id::IdKind;

/// A field value inside a [`Document`] tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Undefined,
    /// Any non-container bson value; identifiers live here until populated.
    Scalar(Bson),
    Array(Vec<Value>),
    /// A subdocument owned by its parent.
    Embedded(Document),
    /// A materialized top-level document from another collection.
    Populated(Box<Document>),
}

impl Value {
    /// Convert a bson value without schema knowledge. Nested documents
    /// become ad-hoc embedded documents.
    pub fn from_bson(value: Bson) -> Self {
        match value {
            Bson::Null => Value::Null,
            Bson::Undefined => Value::Undefined,
            Bson::Array(items) => Value::Array(items.into_iter().map(Value::from_bson).collect()),
            Bson::Document(d) => Value::Embedded(Document::adhoc_embedded(d)),
            other => Value::Scalar(other),
        }
    }

    /// Persisted form: populated documents collapse to their `_id`.
    pub fn to_bson(&self) -> Bson {
        match self {
            Value::Null => Bson::Null,
            Value::Undefined => Bson::Undefined,
            Value::Scalar(b) => b.clone(),
            Value::Array(items) => Bson::Array(items.iter().map(Value::to_bson).collect()),
            Value::Embedded(d) => Bson::Document(d.to_bson()),
            Value::Populated(d) => d.id().cloned().unwrap_or(Bson::Null),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    pub fn is_populated(&self) -> bool {
        matches!(self, Value::Populated(_))
    }

    pub fn as_scalar(&self) -> Option<&Bson> {
        match self {
            Value::Scalar(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Bson::as_str)
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The document behind an embedded or populated value.
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Embedded(d) => Some(d),
            Value::Populated(d) => Some(d.as_ref()),
            _ => None,
        }
    }

    /// True when the value is, or directly contains, a populated document.
    pub fn contains_documents(&self) -> bool {
        match self {
            Value::Populated(_) => true,
            Value::Array(items) => items.iter().any(Value::is_populated),
            _ => false,
        }
    }

    /// The identifier this value stands for: the raw id itself, or the
    /// `_id` of a populated document.
    pub(crate) fn identifier(&self, kind: IdKind) -> Option<Bson> {
        match self {
            Value::Scalar(b) => kind.cast(b),
            Value::Populated(d) => d.id().and_then(|id| kind.cast(id)),
            _ => None,
        }
    }
}

impl From<Bson> for Value {
    fn from(value: Bson) -> Self {
        Value::from_bson(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Scalar(Bson::String(value.to_string()))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Scalar(Bson::String(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Scalar(Bson::Int32(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Scalar(Bson::Int64(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Scalar(Bson::Double(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Scalar(Bson::Boolean(value))
    }
}

impl From<ObjectId> for Value {
    fn from(value: ObjectId) -> Self {
        Value::Scalar(Bson::ObjectId(value))
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        if doc.is_embedded() {
            Value::Embedded(doc)
        } else {
            Value::Populated(Box::new(doc))
        }
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
