use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Parse a space-delimited sort string like `"name -age"`.
///
/// A leading `-` sorts descending, a leading `+` (or nothing) ascending.
/// Empty tokens are ignored, so `""` yields no sort keys.
pub fn parse_sort(spec: &str) -> Vec<Sort> {
    spec.split_whitespace()
        .filter_map(|token| {
            if let Some(field) = token.strip_prefix('-') {
                (!field.is_empty()).then(|| Sort::desc(field))
            } else {
                let field = token.strip_prefix('+').unwrap_or(token);
                (!field.is_empty()).then(|| Sort::asc(field))
            }
        })
        .collect()
}

/// Accepts either the string shorthand or an explicit list of sort keys.
pub(crate) fn deserialize_sort<'de, D>(deserializer: D) -> Result<Vec<Sort>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SortSpec {
        Shorthand(String),
        Keys(Vec<Sort>),
    }

    Ok(match Option::<SortSpec>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(SortSpec::Shorthand(s)) => parse_sort(&s),
        Some(SortSpec::Keys(keys)) => keys,
    })
}
