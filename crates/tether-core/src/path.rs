use crate::document::Document;
use crate::error::PopulateError;
use crate::schema::SchemaLookup;
use crate::value::Value;

/// One step of a dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
    pub name: String,
    /// `Some(is_array)` when the schema declares this prefix as a
    /// subdocument (or array of them); `None` lets the live value decide.
    pub crosses_array: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedPath {
    pub raw: String,
    pub segments: Vec<Segment>,
}

impl ParsedPath {
    pub fn parse<S: SchemaLookup + ?Sized>(schema: &S, path: &str) -> Self {
        let names: Vec<&str> = path.split('.').collect();
        let mut prefix = String::new();
        let segments = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                if i > 0 {
                    prefix.push('.');
                }
                prefix.push_str(name);
                let crosses_array = if i + 1 < names.len() {
                    schema
                        .describe(&prefix)
                        .and_then(|d| d.embedded_schema().map(|_| d.is_array))
                } else {
                    None
                };
                Segment {
                    name: (*name).to_string(),
                    crosses_array,
                }
            })
            .collect();
        Self {
            raw: path.to_string(),
            segments,
        }
    }

    pub fn leaf(&self) -> &str {
        self.segments.last().map_or("", |s| s.name.as_str())
    }
}

/// True when `candidate` is `path` itself or a path below it.
pub(crate) fn is_within(candidate: &str, path: &str) -> bool {
    candidate
        .strip_prefix(path)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

pub(crate) type Visitor<'f> = dyn FnMut(&mut Document, &str) -> Result<(), PopulateError> + 'f;

/// Call `visit(owner, leaf)` for every document that owns the leaf field
/// of `path`, in document order.
///
/// Intermediate segments descend through subdocuments, populated
/// documents and arrays of either. Missing fields and placeholders end
/// the walk silently. A live value contradicting the declared shape of a
/// segment is an [`PopulateError::Assignment`].
pub(crate) fn visit_owners(
    doc: &mut Document,
    path: &ParsedPath,
    visit: &mut Visitor<'_>,
) -> Result<(), PopulateError> {
    walk(doc, &path.segments, &path.raw, visit)
}

fn walk(
    doc: &mut Document,
    segments: &[Segment],
    raw: &str,
    visit: &mut Visitor<'_>,
) -> Result<(), PopulateError> {
    let [head, rest @ ..] = segments else {
        return Ok(());
    };
    if rest.is_empty() {
        return visit(doc, &head.name);
    }
    let Some(value) = doc.fields.get_mut(&head.name) else {
        return Ok(());
    };
    match value {
        Value::Null | Value::Undefined => Ok(()),
        Value::Embedded(child) => {
            if head.crosses_array == Some(true) {
                return Err(shape_error(raw, &head.name, "an array of subdocuments"));
            }
            walk(child, rest, raw, visit)
        }
        Value::Populated(child) => {
            if head.crosses_array == Some(true) {
                return Err(shape_error(raw, &head.name, "an array of subdocuments"));
            }
            walk(child, rest, raw, visit)
        }
        Value::Array(items) => {
            if head.crosses_array == Some(false) {
                return Err(shape_error(raw, &head.name, "a subdocument"));
            }
            for item in items.iter_mut() {
                match item {
                    Value::Embedded(child) => walk(child, rest, raw, visit)?,
                    Value::Populated(child) => walk(child, rest, raw, visit)?,
                    _ => {}
                }
            }
            Ok(())
        }
        Value::Scalar(_) => {
            if head.crosses_array.is_some() {
                return Err(shape_error(raw, &head.name, "a subdocument"));
            }
            Ok(())
        }
    }
}

/// Lenient form of [`visit_owners`]: a value contradicting the declared
/// shape ends that branch of the walk instead of failing it.
pub(crate) fn for_each_owner(
    doc: &mut Document,
    path: &ParsedPath,
    visit: &mut dyn FnMut(&mut Document, &str),
) {
    descend(doc, &path.segments, visit);
}

fn descend(doc: &mut Document, segments: &[Segment], visit: &mut dyn FnMut(&mut Document, &str)) {
    let [head, rest @ ..] = segments else {
        return;
    };
    if rest.is_empty() {
        visit(doc, &head.name);
        return;
    }
    match doc.fields.get_mut(&head.name) {
        Some(Value::Embedded(child)) => descend(child, rest, visit),
        Some(Value::Populated(child)) => descend(child, rest, visit),
        Some(Value::Array(items)) => {
            for item in items.iter_mut() {
                match item {
                    Value::Embedded(child) => descend(child, rest, visit),
                    Value::Populated(child) => descend(child, rest, visit),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn shape_error(path: &str, segment: &str, expected: &str) -> PopulateError {
    PopulateError::assignment(path, format!("`{segment}` should hold {expected}"))
}
