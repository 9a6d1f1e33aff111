use thiserror::Error;

/// Failures reported by a query service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryServiceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("malformed criteria: {0}")]
    MalformedCriteria(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl QueryServiceError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Backend(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_and_backend_errors_are_transient() {
        assert!(QueryServiceError::Network("reset".into()).is_transient());
        assert!(QueryServiceError::Backend("503".into()).is_transient());
        assert!(!QueryServiceError::Unauthorized("token".into()).is_transient());
        assert!(!QueryServiceError::MalformedCriteria("bad".into()).is_transient());
    }
}
