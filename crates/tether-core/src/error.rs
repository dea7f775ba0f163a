use tether_query::ProjectionError;

/// Failure reported by a [`QueryExecutor`](crate::QueryExecutor).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("fetch timed out")]
    Timeout,
}

#[derive(Debug, thiserror::Error)]
pub enum PopulateError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("fetch from `{collection}` failed: {source}")]
    Fetch {
        collection: String,
        #[source]
        source: FetchError,
    },

    #[error("cannot assign `{path}`: {reason}")]
    Assignment { path: String, reason: String },
}

impl PopulateError {
    pub(crate) fn assignment(path: &str, reason: impl Into<String>) -> Self {
        PopulateError::Assignment {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ProjectionError> for PopulateError {
    fn from(e: ProjectionError) -> Self {
        PopulateError::Validation(e.to_string())
    }
}
