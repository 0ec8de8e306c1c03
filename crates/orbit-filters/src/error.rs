use thiserror::Error;

/// Errors raised while building filter criteria.
///
/// Compilation itself cannot fail; anything malformed is caught here, when
/// the request value is constructed.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Unknown field, malformed identifier, unknown enum value, wrong type.
    #[error("invalid filter: {0}")]
    Validation(String),
}

impl From<serde_json::Error> for FilterError {
    fn from(e: serde_json::Error) -> Self {
        FilterError::Validation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;
