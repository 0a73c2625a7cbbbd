use thiserror::Error;

/// Errors that can occur during automation operations
#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Platform error: {0}")]
    PlatformError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Injection failed: {0}")]
    InjectionFailed(String),

    #[error("Invocation rejected by target: {0}")]
    InvocationRejected(String),
}

impl AutomationError {
    /// Whether another attempt of the same operation could plausibly succeed.
    ///
    /// `InvalidArgument` means the configuration itself is wrong (e.g. a
    /// coordinate outside the screen); retrying cannot change that.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AutomationError::InvalidArgument(_))
    }
}
