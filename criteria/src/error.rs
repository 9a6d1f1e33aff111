use thiserror::Error;

/// A descriptor or facet filter the compiler refuses to turn into criteria.
///
/// These indicate a programming error upstream; compilation fails fast
/// rather than producing a partial query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompilationError {
    #[error("group id is empty")]
    EmptyGroupId,

    #[error("{kind} group has an empty scope id")]
    EmptyScopeId { kind: &'static str },

    #[error("invalid facet `{facet}`: {reason}")]
    InvalidFacet { facet: String, reason: String },

    #[error("window size must be greater than zero")]
    InvalidWindowSize,

    #[error("invalid compiler configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CompilationError>;
