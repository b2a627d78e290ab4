//! Authorization error types

use thiserror::Error;

/// Fatal conditions that abort an authorization request
///
/// These are distinct from a `Rejected` verdict: a rejection is a valid
/// answer, an error means no answer could be produced for this input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// SQL text failed to parse
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Construct the authorizer refuses to reason about
    #[error("unsupported construct: {0}")]
    Unsupported(String),

    /// Structurally invalid parse tree
    #[error("malformed expression: {0}")]
    Malformed(String),

    /// Caller cancelled the request
    #[error("authorization cancelled")]
    Cancelled,
}

impl From<sqlparser::parser::ParserError> for AuthzError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        AuthzError::Syntax(err.to_string())
    }
}

/// Result type for authorization operations
pub type AuthzResult<T> = Result<T, AuthzError>;
