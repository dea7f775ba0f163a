use serde::{Deserialize, Deserializer, Serialize};
use tether_query::{FilterGroup, Projection, QueryOptions, parse_sort};

use crate::error::PopulateError;

/// Options for populating one path (or several, space-delimited).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathSpec {
    pub path: String,
    /// Projection in select syntax: `"name email"` or `"-email"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterGroup>,
    #[serde(default)]
    pub options: QueryOptions,
    /// Explicit target collection, overriding the schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Paths to populate on the fetched documents themselves.
    #[serde(
        default,
        deserialize_with = "deserialize_nested",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub populate: Vec<PathSpec>,
}

impl PathSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    pub fn filter(mut self, filter: FilterGroup) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sort in shorthand syntax, e.g. `"name -age"`.
    pub fn sort(mut self, sort: &str) -> Self {
        self.options.sort = parse_sort(sort);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.options.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn populate(mut self, nested: impl Into<PathSpec>) -> Self {
        self.populate.push(nested.into());
        self
    }

    pub(crate) fn projection(&self) -> Result<Option<Projection>, PopulateError> {
        self.select
            .as_deref()
            .map(Projection::parse)
            .transpose()
            .map_err(PopulateError::from)
    }
}

impl From<&str> for PathSpec {
    fn from(path: &str) -> Self {
        PathSpec::new(path)
    }
}

impl From<String> for PathSpec {
    fn from(path: String) -> Self {
        PathSpec::new(path)
    }
}

/// Every call shape `populate` accepts.
///
/// Deserializes from JSON as `null` (flush), a path string, a spec object,
/// or an array of any of these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PopulateArgs {
    /// No paths: execute whatever earlier calls accumulated.
    #[default]
    Flush,
    Paths(String),
    Spec(PathSpec),
    List(Vec<PopulateArgs>),
}

impl From<()> for PopulateArgs {
    fn from(_: ()) -> Self {
        PopulateArgs::Flush
    }
}

impl From<&str> for PopulateArgs {
    fn from(paths: &str) -> Self {
        PopulateArgs::Paths(paths.to_string())
    }
}

impl From<String> for PopulateArgs {
    fn from(paths: String) -> Self {
        PopulateArgs::Paths(paths)
    }
}

impl From<PathSpec> for PopulateArgs {
    fn from(spec: PathSpec) -> Self {
        PopulateArgs::Spec(spec)
    }
}

impl<T: Into<PopulateArgs>> From<Vec<T>> for PopulateArgs {
    fn from(items: Vec<T>) -> Self {
        PopulateArgs::List(items.into_iter().map(Into::into).collect())
    }
}

/// Expand call arguments into one spec per individual path.
///
/// Validates everything before returning so callers can merge the result
/// without partial side effects.
pub(crate) fn normalize(args: PopulateArgs) -> Result<Vec<PathSpec>, PopulateError> {
    let mut out = Vec::new();
    collect(args, &mut out)?;
    Ok(out)
}

fn collect(args: PopulateArgs, out: &mut Vec<PathSpec>) -> Result<(), PopulateError> {
    match args {
        PopulateArgs::Flush => Ok(()),
        PopulateArgs::Paths(paths) => expand(PathSpec::new(paths), out),
        PopulateArgs::Spec(spec) => expand(spec, out),
        PopulateArgs::List(items) => items.into_iter().try_for_each(|item| collect(item, out)),
    }
}

fn expand(mut spec: PathSpec, out: &mut Vec<PathSpec>) -> Result<(), PopulateError> {
    let paths: Vec<String> = spec.path.split_whitespace().map(str::to_string).collect();
    if paths.is_empty() {
        return Err(PopulateError::Validation(format!(
            "populate path must not be empty (got {:?})",
            spec.path
        )));
    }
    if let Some(bad) = paths.iter().find(|p| p.split('.').any(str::is_empty)) {
        return Err(PopulateError::Validation(format!(
            "invalid populate path: {bad:?}"
        )));
    }
    spec.projection()?;

    let mut nested = Vec::new();
    for child in std::mem::take(&mut spec.populate) {
        expand(child, &mut nested)?;
    }
    spec.populate = nested;

    for path in paths {
        out.push(PathSpec {
            path,
            ..spec.clone()
        });
    }
    Ok(())
}

fn deserialize_nested<'de, D>(deserializer: D) -> Result<Vec<PathSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    fn flatten(args: PopulateArgs, out: &mut Vec<PathSpec>) {
        match args {
            PopulateArgs::Flush => {}
            PopulateArgs::Paths(paths) => out.push(PathSpec::new(paths)),
            PopulateArgs::Spec(spec) => out.push(spec),
            PopulateArgs::List(items) => items.into_iter().for_each(|i| flatten(i, out)),
        }
    }

    let mut out = Vec::new();
    flatten(PopulateArgs::deserialize(deserializer)?, &mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use tether_query::Sort;

    use super::*;

    fn paths(specs: &[PathSpec]) -> Vec<&str> {
        specs.iter().map(|s| s.path.as_str()).collect()
    }

    #[test]
    fn space_delimited_string_expands() {
        let specs = normalize("_creator fans".into()).unwrap();
        assert_eq!(paths(&specs), vec!["_creator", "fans"]);
    }

    #[test]
    fn spec_options_replicated_across_paths() {
        let spec = PathSpec::new("_creator  fans")
            .select("-email")
            .sort("name")
            .model("User");
        let specs = normalize(spec.into()).unwrap();
        assert_eq!(specs.len(), 2);
        for s in &specs {
            assert_eq!(s.select.as_deref(), Some("-email"));
            assert_eq!(s.options.sort, vec![Sort::asc("name")]);
            assert_eq!(s.model.as_deref(), Some("User"));
        }
    }

    #[test]
    fn lists_flatten_in_order() {
        let args = PopulateArgs::List(vec![
            "a b".into(),
            PathSpec::new("c").into(),
            PopulateArgs::List(vec!["d".into()]),
            PopulateArgs::Flush,
        ]);
        let specs = normalize(args).unwrap();
        assert_eq!(paths(&specs), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn flush_yields_nothing() {
        assert!(normalize(().into()).unwrap().is_empty());
    }

    #[test]
    fn empty_path_rejected() {
        let err = normalize("   ".into()).unwrap_err();
        assert!(matches!(err, PopulateError::Validation(_)));
        let err = normalize(PathSpec::new("").into()).unwrap_err();
        assert!(matches!(err, PopulateError::Validation(_)));
        let err = normalize("comments..x".into()).unwrap_err();
        assert!(matches!(err, PopulateError::Validation(_)));
    }

    #[test]
    fn one_bad_entry_fails_whole_list() {
        let args: PopulateArgs = vec![PathSpec::new("ok"), PathSpec::new(" ")].into();
        assert!(normalize(args).is_err());
    }

    #[test]
    fn invalid_select_rejected() {
        let err = normalize(PathSpec::new("fans").select("name -email").into()).unwrap_err();
        assert!(err.to_string().contains("cannot mix"));
    }

    #[test]
    fn nested_populate_normalized() {
        let spec = PathSpec::new("fans").populate("blogposts friends");
        let specs = normalize(spec.into()).unwrap();
        assert_eq!(paths(&specs[0].populate), vec!["blogposts", "friends"]);
    }

    #[test]
    fn deserialize_call_shapes() {
        let args: PopulateArgs = serde_json::from_str(r#""_creator fans""#).unwrap();
        assert_eq!(args, PopulateArgs::Paths("_creator fans".into()));

        let args: PopulateArgs = serde_json::from_str("null").unwrap();
        assert_eq!(args, PopulateArgs::Flush);

        let args: PopulateArgs = serde_json::from_str(
            r#"[ "title", { "path": "fans", "select": "-email", "options": { "sort": "name" },
                 "populate": "blogposts" } ]"#,
        )
        .unwrap();
        let specs = normalize(args).unwrap();
        assert_eq!(paths(&specs), vec!["title", "fans"]);
        assert_eq!(specs[1].options.sort, vec![Sort::asc("name")]);
        assert_eq!(paths(&specs[1].populate), vec!["blogposts"]);
    }

    #[test]
    fn deserialize_match_clause() {
        let spec: PathSpec = serde_json::from_str(
            r#"{ "path": "fans", "match": { "logical": "and", "children": [
                 { "condition": { "field": "age", "operator": "gte", "value": 21 } } ] } }"#,
        )
        .unwrap();
        assert!(spec.filter.is_some());
    }
}
