//! Error types for the storage add-on tooling
//!
//! Errors fall in two tiers. Fatal errors stop the caller's larger workflow
//! (a disable that cannot complete, bad arguments). Recovered errors are
//! reported to the user and swallowed so that an enclosing cluster create
//! keeps going.

use thiserror::Error;

/// Unified error type for the add-on tooling
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Argument Errors
    // =========================================================================
    #[error("{0}")]
    InvalidArgument(String),

    // =========================================================================
    // Resource Provider Errors
    // =========================================================================
    #[error("Resource provider {namespace} is not registered: {reason}")]
    ProviderRegistration { namespace: String, reason: String },

    // =========================================================================
    // Extension Errors
    // =========================================================================
    #[error("Extension type {extension_type} not installed on cluster.\nAborting disabling of Azure Container Storage.")]
    ExtensionNotInstalled { extension_type: String },

    #[error("Extension type {extension_type} already installed on cluster.\nAborting installation of Azure Container Storage.")]
    ExtensionAlreadyInstalled { extension_type: String },

    #[error("{operation} of extension {name} ended in state {state}: {message}")]
    OperationFailed {
        operation: String,
        name: String,
        state: String,
        message: String,
    },

    #[error("{operation} of extension {name} did not finish within {seconds}s")]
    OperationTimeout {
        operation: String,
        name: String,
        seconds: u64,
    },

    #[error("{0}")]
    ValidationFailed(String),

    #[error("Failure observed while disabling Azure Container Storage.\nError: {0}")]
    DisableFailed(String),

    // =========================================================================
    // Role Assignment Errors
    // =========================================================================
    #[error("Role assignment failed: {role} on {scope} - {reason}")]
    RoleAssignment {
        role: String,
        scope: String,
        reason: String,
    },

    // =========================================================================
    // Resource Manager Errors
    // =========================================================================
    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Resource manager returned {status}: {code} - {message}")]
    Arm {
        status: u16,
        code: String,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Compose file parse error: {0}")]
    ComposeParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How far an error is allowed to travel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTier {
    /// Propagated to the caller; aborts the enclosing command
    Fatal,
    /// Reported to the user; the enclosing command continues
    Recovered,
}

impl Error {
    /// Classify this error
    pub fn tier(&self) -> ErrorTier {
        match self {
            Error::ExtensionNotInstalled { .. }
            | Error::InvalidArgument(_)
            | Error::ValidationFailed(_)
            | Error::DisableFailed(_)
            | Error::Configuration(_)
            | Error::ComposeParse(_)
            | Error::Io(_) => ErrorTier::Fatal,

            Error::ProviderRegistration { .. }
            | Error::ExtensionAlreadyInstalled { .. }
            | Error::OperationFailed { .. }
            | Error::OperationTimeout { .. }
            | Error::RoleAssignment { .. } => ErrorTier::Recovered,

            _ => ErrorTier::Fatal,
        }
    }

    /// Check if this error is fatal
    pub fn is_fatal(&self) -> bool {
        matches!(self.tier(), ErrorTier::Fatal)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::Arm { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias for the add-on tooling
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_tiers() {
        let err = Error::ExtensionNotInstalled {
            extension_type: "microsoft.azurecontainerstorage".into(),
        };
        assert_eq!(err.tier(), ErrorTier::Fatal);

        let err = Error::ExtensionAlreadyInstalled {
            extension_type: "microsoft.azurecontainerstorage".into(),
        };
        assert_eq!(err.tier(), ErrorTier::Recovered);

        let err = Error::OperationFailed {
            operation: "create".into(),
            name: "azurecontainerstorage".into(),
            state: "Failed".into(),
            message: "boom".into(),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_transient() {
        let throttled = Error::Arm {
            status: 429,
            code: "TooManyRequests".into(),
            message: "slow down".into(),
        };
        assert!(throttled.is_transient());

        let missing = Error::Arm {
            status: 404,
            code: "NotFound".into(),
            message: "gone".into(),
        };
        assert!(!missing.is_transient());
        assert!(!Error::InvalidArgument("bad".into()).is_transient());
    }

    #[test]
    fn test_not_installed_message() {
        let err = Error::ExtensionNotInstalled {
            extension_type: "microsoft.azurecontainerstorage".into(),
        };
        assert_eq!(
            err.to_string(),
            "Extension type microsoft.azurecontainerstorage not installed on cluster.\n\
             Aborting disabling of Azure Container Storage."
        );
    }
}
