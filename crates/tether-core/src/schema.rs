use std::collections::BTreeMap;
use std::sync::Arc;

use crate::id::IdKind;

/// Field path → descriptor lookup consumed by the population pipeline.
pub trait SchemaLookup {
    /// Describe a dot-separated path. Paths may cross embedded documents
    /// and arrays of embedded documents (`comments._creator`).
    fn describe(&self, path: &str) -> Option<FieldDescriptor>;
}

/// Where a reference field points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    /// Always the named collection.
    Static(String),
    /// The collection named by a sibling field of the owning document.
    Dynamic(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub target: RefTarget,
    pub id_kind: IdKind,
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Plain,
    Reference(Reference),
    Embedded(Arc<Schema>),
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub kind: FieldKind,
    pub is_array: bool,
}

impl FieldDescriptor {
    pub fn plain() -> Self {
        Self {
            kind: FieldKind::Plain,
            is_array: false,
        }
    }

    pub fn reference(collection: impl Into<String>) -> Self {
        Self::referencing(RefTarget::Static(collection.into()), false)
    }

    pub fn reference_array(collection: impl Into<String>) -> Self {
        Self::referencing(RefTarget::Static(collection.into()), true)
    }

    /// A reference whose collection is read from `discriminator` on the
    /// owning document.
    pub fn dynamic(discriminator: impl Into<String>) -> Self {
        Self::referencing(RefTarget::Dynamic(discriminator.into()), false)
    }

    pub fn dynamic_array(discriminator: impl Into<String>) -> Self {
        Self::referencing(RefTarget::Dynamic(discriminator.into()), true)
    }

    pub fn embedded(schema: Arc<Schema>) -> Self {
        Self {
            kind: FieldKind::Embedded(schema),
            is_array: false,
        }
    }

    pub fn embedded_array(schema: Arc<Schema>) -> Self {
        Self {
            kind: FieldKind::Embedded(schema),
            is_array: true,
        }
    }

    /// Override the identifier type of a reference. No-op on other kinds.
    pub fn id_kind(mut self, id_kind: IdKind) -> Self {
        if let FieldKind::Reference(r) = &mut self.kind {
            r.id_kind = id_kind;
        }
        self
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match &self.kind {
            FieldKind::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn embedded_schema(&self) -> Option<&Arc<Schema>> {
        match &self.kind {
            FieldKind::Embedded(s) => Some(s),
            _ => None,
        }
    }

    fn referencing(target: RefTarget, is_array: bool) -> Self {
        Self {
            kind: FieldKind::Reference(Reference {
                target,
                id_kind: IdKind::Any,
            }),
            is_array,
        }
    }
}

/// Declared shape of one model (or of an embedded document type).
#[derive(Debug, Clone, Default)]
pub struct Schema {
    name: String,
    fields: BTreeMap<String, FieldDescriptor>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields.insert(name.into(), descriptor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SchemaLookup for Schema {
    fn describe(&self, path: &str) -> Option<FieldDescriptor> {
        match path.split_once('.') {
            None => self.fields.get(path).cloned(),
            Some((head, rest)) => self.fields.get(head)?.embedded_schema()?.describe(rest),
        }
    }
}
