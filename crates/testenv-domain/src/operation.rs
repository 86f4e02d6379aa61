use serde::{Deserialize, Serialize};

/// The closed set of error codes a provider may return. Order matches §6 of
/// the governing design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotImplemented,
    NotFound,
    AlreadyExists,
    InvalidSpec,
    ProviderError,
    Timeout,
    PermissionDenied,
    ResourceBusy,
    DependencyFailed,
}

impl ErrorCode {
    /// Whether the engine should carry this code's `retryable` flag as
    /// `true` by default when a provider omits it. The engine itself never
    /// acts on this — see Design Notes' Open Question.
    pub fn default_retryable(&self) -> bool {
        matches!(self, ErrorCode::Timeout | ErrorCode::ResourceBusy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationError {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl OperationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let retryable = code.default_retryable();
        OperationError { code, message: message.into(), retryable, details: None }
    }
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// The standardised result shape every provider tool call returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<serde_json::Value>,
}

impl OperationResult {
    pub fn ok(resource: serde_json::Value) -> Self {
        OperationResult { success: true, error: None, resource: Some(resource) }
    }

    pub fn err(error: OperationError) -> Self {
        OperationResult { success: false, error: Some(error), resource: None }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(&self.error, Some(e) if e.code == ErrorCode::NotFound)
    }
}
