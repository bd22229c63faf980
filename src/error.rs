use thiserror::Error;

/// Main error type for the end-to-end check.
#[derive(Debug, Error)]
pub enum TesterError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} API returned {status}: {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to resolve host {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Networking API error: {0}")]
    Network(#[from] NetworkError),

    #[error("Execution {execution_id} of workflow {workflow} ended with status {status}: {error}")]
    ExecutionFailed {
        execution_id: String,
        workflow: String,
        status: String,
        error: String,
    },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Setup failed: {0}")]
    SetupFailed(String),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Teardown failed: {}", .0.join("; "))]
    Teardown(Vec<String>),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Failures reported by the cloud networking API.
///
/// Kept apart from [`TesterError`] so callers can treat a failed rule creation
/// as recoverable without inspecting error text.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
}

impl NetworkError {
    /// Map a non-success response from the networking service.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => NetworkError::Auth(message),
            404 => NetworkError::NotFound(message),
            409 => NetworkError::Conflict(message),
            _ => NetworkError::Api { status, message },
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, NetworkError::Conflict(_))
    }
}

pub type Result<T, E = TesterError> = std::result::Result<T, E>;
