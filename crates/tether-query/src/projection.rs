use std::fmt;

/// Parse error for projection strings.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionError(pub String);

impl fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projection error: {}", self.0)
    }
}

impl std::error::Error for ProjectionError {}

/// Which fields of a fetched row survive.
///
/// Parsed from the space-delimited select syntax: `"name email"` keeps only
/// those fields (plus `_id`), `"-email"` drops `email` and keeps the rest.
/// The two styles cannot be mixed, except that `-_id` may appear in an
/// inclusion projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Include { fields: Vec<String>, keep_id: bool },
    Exclude(Vec<String>),
}

impl Projection {
    pub fn parse(spec: &str) -> Result<Self, ProjectionError> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();

        for token in spec.split_whitespace() {
            let (excluded, field) = match token.strip_prefix('-') {
                Some(field) => (true, field),
                None => (false, token.strip_prefix('+').unwrap_or(token)),
            };
            if field.is_empty() || field.split('.').any(str::is_empty) {
                return Err(ProjectionError(format!("invalid field in select: {token:?}")));
            }
            if excluded {
                exclude.push(field.to_string());
            } else {
                include.push(field.to_string());
            }
        }

        match (include.is_empty(), exclude.is_empty()) {
            (true, true) => Err(ProjectionError("empty select".into())),
            (true, false) => Ok(Projection::Exclude(exclude)),
            (false, true) => Ok(Projection::Include {
                fields: include,
                keep_id: true,
            }),
            (false, false) => {
                if exclude.iter().all(|f| f == "_id") {
                    Ok(Projection::Include {
                        fields: include,
                        keep_id: false,
                    })
                } else {
                    Err(ProjectionError(format!(
                        "cannot mix inclusion and exclusion in select: {spec:?}"
                    )))
                }
            }
        }
    }

    /// True when `field` (a top-level or dotted path) is guaranteed to be
    /// absent from projected rows.
    pub fn excludes(&self, field: &str) -> bool {
        match self {
            Projection::Exclude(fields) => fields.iter().any(|f| f == field),
            Projection::Include { fields, keep_id } => {
                if field == "_id" {
                    return !keep_id;
                }
                !fields.iter().any(|f| {
                    f == field
                        || f.strip_prefix(field).is_some_and(|rest| rest.starts_with('.'))
                        || field.strip_prefix(f.as_str()).is_some_and(|rest| rest.starts_with('.'))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_inclusion() {
        let p = Projection::parse("name email").unwrap();
        assert_eq!(
            p,
            Projection::Include {
                fields: vec!["name".into(), "email".into()],
                keep_id: true
            }
        );
        assert!(p.excludes("age"));
        assert!(!p.excludes("name"));
        assert!(!p.excludes("_id"));
    }

    #[test]
    fn parse_exclusion() {
        let p = Projection::parse("-email").unwrap();
        assert_eq!(p, Projection::Exclude(vec!["email".into()]));
        assert!(p.excludes("email"));
        assert!(!p.excludes("name"));
    }

    #[test]
    fn inclusion_may_drop_id() {
        let p = Projection::parse("name -_id").unwrap();
        assert!(p.excludes("_id"));
        assert!(!p.excludes("name"));
    }

    #[test]
    fn mixed_styles_rejected() {
        let err = Projection::parse("name -email").unwrap_err();
        assert!(err.0.contains("cannot mix"));
    }

    #[test]
    fn empty_rejected() {
        assert!(Projection::parse("  ").is_err());
        assert!(Projection::parse("-").is_err());
        assert!(Projection::parse("a..b").is_err());
    }

    #[test]
    fn dotted_inclusion_keeps_parent() {
        let p = Projection::parse("address.city").unwrap();
        assert!(!p.excludes("address"));
        assert!(!p.excludes("address.city"));
        assert!(p.excludes("address.zip"));
    }
}
