//! # stackkit
//!
//! Deploy an ordered batch of CloudFormation templates.
//!
//! This crate provides:
//! - Uploading template files to a content store ([`ArtifactStore`])
//! - Validating every uploaded template in one pass ([`TemplateValidator`])
//! - Reconciling each template against its stack, creating or updating it and
//!   waiting for convergence ([`StackReconciler`])
//! - Running the three steps across a batch ([`Orchestrator`])
//!
//! ## Example
//!
//! ```no_run
//! use stackkit::backend::aws::{AwsCliBackend, AwsTarget};
//! use stackkit::{
//!     ArtifactStore, CancelToken, NoProgress, Orchestrator, StackReconciler, TemplateBatch,
//!     TemplateDescriptor, TemplateValidator, WaitConfig,
//! };
//!
//! let backend = AwsCliBackend::new(AwsTarget {
//!     region: "us-west-2".to_string(),
//!     bucket: "granta-cf-templates".to_string(),
//!     profile: None,
//! })
//! .expect("aws CLI not available");
//!
//! let batch = TemplateBatch::new(vec![
//!     TemplateDescriptor::new("network", "templates/network.yaml", "granta-network"),
//!     TemplateDescriptor::new("cluster", "templates/cluster.yaml", "granta-cluster"),
//! ])
//! .expect("duplicate stack name");
//!
//! let orchestrator = Orchestrator::new(
//!     ArtifactStore::new(&backend, ""),
//!     TemplateValidator::new(&backend),
//!     StackReconciler::new(&backend, WaitConfig::default(), CancelToken::new()),
//!     1,
//! );
//! let report = orchestrator.run(&batch, &mut NoProgress).expect("deploy failed");
//! assert!(report.is_success());
//! ```
//!
//! ## Ordering
//!
//! Declared order is dependency order. Stacks are reconciled one at a time,
//! in that order; a stack that fails to converge stops the run so nothing
//! built on top of it is attempted.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifact;
pub mod backend;
pub mod error;
pub mod orchestrator;
pub mod reconcile;
pub mod status;
pub mod types;
pub mod validate;
pub mod wait;

pub use artifact::ArtifactStore;
pub use error::{Error, ErrorCategory, Result, ValidationFailure};
pub use orchestrator::{DeployProgress, NoProgress, Orchestrator, Phase};
pub use reconcile::{DEFAULT_CAPABILITIES, StackReconciler};
pub use status::{StackStatus, StatusPhase};
pub use types::{
    Capability, CreateStackRequest, ReconcileAction, ReconcileOutcome, ReconcilePlan, RunReport,
    RunStatus, StackExistence, TemplateBatch, TemplateDescriptor, TerminalState,
    UpdateStackRequest, UploadedArtifact, WaitConfig,
};
pub use validate::TemplateValidator;
pub use wait::{CancelToken, Clock, ManualClock, SystemClock};
