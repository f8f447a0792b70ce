//! Error taxonomy shared by every pairlink crate.

/// Error taxonomy for the pairing and relay paths.
///
/// None of these are process-fatal: each one degrades only the request or
/// event that produced it.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RelayError {
    /// The OS secure random source could not be read.
    #[error("secure random source unavailable: {0}")]
    RandomSourceUnavailable(String),

    /// An expected configuration value is absent.
    #[error("{0} not configured")]
    ConfigurationMissing(&'static str),

    /// An expected local resource is absent.
    #[error("{0}")]
    ResourceNotFound(String),

    /// The inbound message handler failed for a single message.
    #[error("message handler failed: {0}")]
    HandlerFailure(String),

    /// The external chat session or its transport failed.
    #[error("session error: {0}")]
    ExternalCollaboratorFailure(String),
}

impl RelayError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::RandomSourceUnavailable(_) => "random_source_unavailable",
            Self::ConfigurationMissing(_) => "configuration_missing",
            Self::ResourceNotFound(_) => "resource_not_found",
            Self::HandlerFailure(_) => "handler_failure",
            Self::ExternalCollaboratorFailure(_) => "external_collaborator_failure",
        }
    }

    /// Whether the caller supplied or deployed something wrong, as opposed to
    /// a runtime failure on our side.
    pub fn is_client_facing(&self) -> bool {
        matches!(self, Self::ConfigurationMissing(_) | Self::ResourceNotFound(_))
    }
}

impl From<rand::Error> for RelayError {
    fn from(e: rand::Error) -> Self {
        Self::RandomSourceUnavailable(e.to_string())
    }
}
