//! Backend abstraction for the remote services a deployment talks to.
//!
//! Three collaborators are involved:
//! - [`ContentStore`] holds uploaded template artifacts
//! - [`ControlPlane`] creates, updates and reports on stacks
//! - [`TemplateChecker`] validates an uploaded template
//!
//! [`aws::AwsCliBackend`] implements all three by driving the `aws` CLI.

pub mod aws;
#[cfg(test)]
pub(crate) mod fake;

use crate::error::{Error, Result};
use crate::status::StackStatus;
use crate::types::{CreateStackRequest, UpdateStackRequest};

/// Object store for template artifacts.
pub trait ContentStore: Send + Sync {
    /// Write `body` under `key`, overwriting any existing object.
    ///
    /// Returns the URL the control plane can read the object from.
    fn put(&self, key: &str, body: &[u8]) -> Result<String>;
}

/// Stack control plane.
pub trait ControlPlane: Send + Sync {
    /// Look up a stack by name. `Ok(None)` means the stack does not exist.
    fn describe(&self, stack_name: &str) -> Result<Option<StackStatus>>;

    /// Submit a create request.
    fn create(&self, request: &CreateStackRequest) -> Result<()>;

    /// Submit an update request.
    fn update(&self, request: &UpdateStackRequest) -> Result<()>;

    /// Current status of a stack that is expected to exist.
    fn poll_status(&self, stack_name: &str) -> Result<StackStatus> {
        self.describe(stack_name)?.ok_or_else(|| {
            Error::transport(
                "describe-stacks",
                Some(stack_name),
                "stack disappeared while waiting",
            )
        })
    }

    /// Reason attached to the stack's current status, if any.
    fn status_reason(&self, _stack_name: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Remote template check.
pub trait TemplateChecker: Send + Sync {
    /// Validate the template at `template_url`.
    ///
    /// Any error, including the checker being unreachable, counts as a
    /// validation failure for that template.
    fn validate(&self, template_url: &str) -> Result<()>;
}
