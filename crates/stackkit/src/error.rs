//! Error types for stack deployment.
//!
//! Every error maps to an [`ErrorCategory`] that carries a short description
//! and advice for the user.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::ReconcileAction;

/// Categories of deployment errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Local template file could not be read
    LocalRead,
    /// Content store rejected the upload
    Upload,
    /// One or more templates failed remote validation
    Validation,
    /// Create/update request was rejected by the control plane
    Submit,
    /// Stack reached a terminal failure state
    Convergence,
    /// Could not talk to the control plane
    Transport,
    /// Convergence wait exceeded the configured timeout
    Timeout,
    /// The template batch itself is malformed
    Batch,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::LocalRead => "Template file unreadable",
            Self::Upload => "Template upload failed",
            Self::Validation => "Template validation failed",
            Self::Submit => "Stack request rejected",
            Self::Convergence => "Stack failed to converge",
            Self::Transport => "Control plane unreachable",
            Self::Timeout => "Timed out waiting for stack",
            Self::Batch => "Invalid template batch",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::LocalRead => "Check that the template path exists and is readable",
            Self::Upload => "Check bucket permissions and that the bucket exists in the region",
            Self::Validation => "Fix the reported template errors and run again",
            Self::Submit => "Inspect the template or the stack's current state",
            Self::Convergence => "Inspect the stack events in the console; failed creations are left in place",
            Self::Transport => "Check credentials, region and network connectivity",
            Self::Timeout => "The stack operation is still running remotely; check its status",
            Self::Batch => "Fix the template list in the configuration",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// A single template that failed remote validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Template name from the descriptor
    pub template: String,
    /// Message returned by the template check
    pub message: String,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.template, self.message)
    }
}

fn list_failures(failures: &[ValidationFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur while deploying a template batch.
#[derive(Debug, Error)]
pub enum Error {
    /// Local template file missing or unreadable
    #[error("cannot read template '{template}' at {}: {source}", path.display())]
    LocalRead {
        /// Template name
        template: String,
        /// Path that failed to open or read
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Content store write failure
    #[error("failed to upload '{template}' to {key}: {message}")]
    Upload {
        /// Template name
        template: String,
        /// Remote object key
        key: String,
        /// Details from the content store
        message: String,
    },

    /// One or more templates failed validation
    #[error("{} template(s) failed validation: {}", failures.len(), list_failures(failures))]
    BatchValidation {
        /// Every failing template, in declared order
        failures: Vec<ValidationFailure>,
    },

    /// Create/update request rejected
    #[error("{action} request for stack '{stack}' rejected: {message}")]
    Submit {
        /// Stack name
        stack: String,
        /// Request that was rejected
        action: ReconcileAction,
        /// Details from the control plane
        message: String,
    },

    /// Stack reached a terminal failure state
    #[error("stack '{stack}' failed to converge: {status}{}", reason.as_ref().map(|r| format!(" ({r})")).unwrap_or_default())]
    Convergence {
        /// Stack name
        stack: String,
        /// Terminal status reported by the control plane
        status: String,
        /// Status reason, when the control plane provides one
        reason: Option<String>,
    },

    /// Control plane transport/auth failure
    #[error("{operation} failed{}: {message}", stack.as_ref().map(|s| format!(" for stack '{s}'")).unwrap_or_default())]
    Transport {
        /// Operation that failed (e.g. "describe-stacks")
        operation: String,
        /// Stack involved, if any
        stack: Option<String>,
        /// Details from the transport
        message: String,
    },

    /// Convergence wait exceeded the configured timeout
    #[error("timed out after {}s waiting for stack '{stack}' (last status {last_status})", waited.as_secs())]
    WaitTimeout {
        /// Stack name
        stack: String,
        /// Time spent waiting
        waited: Duration,
        /// Last observed status
        last_status: String,
    },

    /// Two descriptors share a stack name
    #[error("stack '{0}' is declared more than once")]
    DuplicateStack(String),

    /// Two descriptors map to the same remote key
    #[error("templates '{first}' and '{second}' upload to the same key {key}")]
    DuplicateKey {
        /// Remote object key
        key: String,
        /// First template using the key
        first: String,
        /// Second template using the key
        second: String,
    },

    /// A required executable could not be found
    #[error("{0} not found in PATH")]
    ExecutableNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::LocalRead { .. } => ErrorCategory::LocalRead,
            Error::Upload { .. } => ErrorCategory::Upload,
            Error::BatchValidation { .. } => ErrorCategory::Validation,
            Error::Submit { .. } => ErrorCategory::Submit,
            Error::Convergence { .. } => ErrorCategory::Convergence,
            Error::Transport { .. } => ErrorCategory::Transport,
            Error::WaitTimeout { .. } => ErrorCategory::Timeout,
            Error::DuplicateStack(_) | Error::DuplicateKey { .. } => ErrorCategory::Batch,
            _ => ErrorCategory::Other,
        }
    }

    /// Build a transport error for an operation.
    pub fn transport(
        operation: impl Into<String>,
        stack: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Error::Transport {
            operation: operation.into(),
            stack: stack.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Result type for deployment operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        let err = Error::WaitTimeout {
            stack: "net".to_string(),
            waited: Duration::from_secs(90),
            last_status: "CREATE_IN_PROGRESS".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Timeout);
        assert_eq!(
            Error::DuplicateStack("net".to_string()).category(),
            ErrorCategory::Batch
        );
        assert_eq!(
            Error::transport("describe-stacks", None, "expired token").category(),
            ErrorCategory::Transport
        );
        assert_eq!(Error::Other("x".to_string()).category(), ErrorCategory::Other);
    }

    #[test]
    fn test_batch_validation_lists_every_failure() {
        let err = Error::BatchValidation {
            failures: vec![
                ValidationFailure {
                    template: "network".to_string(),
                    message: "bad syntax".to_string(),
                },
                ValidationFailure {
                    template: "cluster".to_string(),
                    message: "unknown resource type".to_string(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 template(s) failed validation"));
        assert!(msg.contains("network: bad syntax"));
        assert!(msg.contains("cluster: unknown resource type"));
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_transport_message_names_stack() {
        let err = Error::transport("describe-stacks", Some("granta-network"), "expired token");
        assert_eq!(
            err.to_string(),
            "describe-stacks failed for stack 'granta-network': expired token"
        );

        let err = Error::transport("validate-template", None, "connection reset");
        assert_eq!(err.to_string(), "validate-template failed: connection reset");
    }

    #[test]
    fn test_submit_error_is_not_fatal() {
        let err = Error::Submit {
            stack: "granta-cluster".to_string(),
            action: ReconcileAction::Update,
            message: "No updates are to be performed.".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Submit);
        assert!(err.to_string().starts_with("update request for stack 'granta-cluster'"));
    }
}
