use thiserror::Error;

/// Errors from decoding or encoding wire events.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The token is neither an object nor an array of objects.
    #[error("unsupported token shape: {0}")]
    UnsupportedShape(&'static str),

    /// The kind tag is outside the closed event schema.
    #[error("unknown event kind: {0}")]
    UnknownKind(String),

    /// A required field is absent, null, or blank.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A field is present but has the wrong type or an unparseable value.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// The input is not valid JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
