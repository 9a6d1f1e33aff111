use monitor_criteria::CompilationError;
use monitor_protocol::GroupId;
use monitor_protocol::QueryServiceError;
use thiserror::Error;

/// A response that arrived for a group that was deactivated or whose
/// descriptor changed since the request left. Never surfaced to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("stale response for group {group} (generation {generation})")]
pub struct StaleWindowError {
    pub group: GroupId,
    pub generation: u64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MonitorError {
    #[error("criteria compilation failed: {0}")]
    Compilation(#[from] CompilationError),

    #[error("query failed: {0}")]
    Query(#[from] QueryServiceError),

    #[error("group {0} is not active")]
    Deactivated(GroupId),

    #[error("request for group {0} was superseded by a newer refresh")]
    Superseded(GroupId),

    #[error("invalid monitor configuration: {0}")]
    Config(String),
}

impl MonitorError {
    /// Whether the same request may succeed on a later refetch.
    pub fn is_transient(&self) -> bool {
        matches!(self, MonitorError::Query(err) if err.is_transient())
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
