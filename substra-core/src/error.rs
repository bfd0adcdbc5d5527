use std::fmt::Display;

use crate::model::AssetType;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, Copy)]
pub enum ErrorType {
    /// Referenced key is absent from the store.
    NotFound,
    /// Key collision on a non-idempotent add.
    AlreadyExists,
    /// Malformed cross-field combination or forbidden relinking.
    InvalidRequest,
    /// Executor returned non-zero or staging/finalization failed.
    ExecutionFailure,
    /// Operation is not provided by the local backend.
    NotImplemented,
    Timeout,
    Cancelled,
    IoError,
    SerializationError,
    General,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    pub error_type: ErrorType,
    pub message: String,
    pub key: Option<String>,
    /// Log captured from the executor, if any was produced before the failure.
    pub log: Option<String>,
}

impl Error {
    pub fn new(error_type: ErrorType, message: String) -> Self {
        Error {
            error_type,
            message,
            key: None,
            log: None,
        }
    }

    pub fn from_error<E: Display>(error_type: ErrorType, error: E) -> Self {
        Error::new(error_type, error.to_string())
    }

    pub fn from_result<T, E: Display>(error_type: ErrorType, result: Result<T, E>) -> Result<T, Self> {
        result.map_err(|e| Error::from_error(error_type, e))
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.to_owned());
        self
    }

    pub fn with_log(mut self, log: String) -> Self {
        self.log = Some(log);
        self
    }

    pub fn not_found(asset_type: AssetType, key: &str) -> Self {
        Error::new(
            ErrorType::NotFound,
            format!("{} '{}' not found", asset_type, key),
        )
        .with_key(key)
    }

    pub fn already_exists(asset_type: AssetType, key: &str) -> Self {
        Error::new(
            ErrorType::AlreadyExists,
            format!("{} '{}' already exists", asset_type, key),
        )
        .with_key(key)
    }

    pub fn invalid_request(message: String) -> Self {
        Error::new(ErrorType::InvalidRequest, message)
    }

    pub fn execution_failure(message: String) -> Self {
        Error::new(ErrorType::ExecutionFailure, message)
    }

    pub fn not_implemented(operation: &str) -> Self {
        Error::new(
            ErrorType::NotImplemented,
            format!("Operation '{}' is not supported by the local backend", operation),
        )
    }

    pub fn timeout(key: &str, seconds: f64) -> Self {
        Error::new(
            ErrorType::Timeout,
            format!("Execution of '{}' timed out after {:.1}s", key, seconds),
        )
        .with_key(key)
    }

    pub fn cancelled(key: &str) -> Self {
        Error::new(ErrorType::Cancelled, format!("Execution of '{}' was cancelled", key))
            .with_key(key)
    }

    pub fn general_error(message: String) -> Self {
        Error::new(ErrorType::General, message)
    }

    /// True for errors that terminate a unit rather than reject a request.
    pub fn is_execution_error(&self) -> bool {
        matches!(
            self.error_type,
            ErrorType::ExecutionFailure | ErrorType::Timeout | ErrorType::Cancelled
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.error_type == ErrorType::NotFound
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::from_error(ErrorType::IoError, error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::from_error(ErrorType::SerializationError, error)
    }
}
