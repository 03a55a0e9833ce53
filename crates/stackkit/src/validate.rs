//! Remote template validation.

use rayon::prelude::*;

use crate::backend::TemplateChecker;
use crate::error::{Error, Result, ValidationFailure};
use crate::types::UploadedArtifact;

/// Validates uploaded templates with a [`TemplateChecker`].
pub struct TemplateValidator<'a> {
    checker: &'a dyn TemplateChecker,
}

impl<'a> TemplateValidator<'a> {
    /// Create a validator.
    pub fn new(checker: &'a dyn TemplateChecker) -> Self {
        Self { checker }
    }

    /// Validate one artifact.
    pub fn validate(&self, artifact: &UploadedArtifact) -> std::result::Result<(), ValidationFailure> {
        self.checker
            .validate(&artifact.remote_url)
            .map_err(|e| ValidationFailure {
                template: artifact.descriptor.name.clone(),
                message: e.to_string(),
            })
    }

    /// Validate every artifact, then fail if any of them failed.
    ///
    /// Validation never stops early: the error lists every failing template
    /// in declared order. `on_result` is called once per artifact, also in
    /// declared order.
    pub fn validate_all(
        &self,
        artifacts: &[UploadedArtifact],
        jobs: usize,
        on_result: &mut dyn FnMut(&UploadedArtifact, Option<&ValidationFailure>),
    ) -> Result<()> {
        let results: Vec<std::result::Result<(), ValidationFailure>> =
            if jobs <= 1 || artifacts.len() <= 1 {
                artifacts.iter().map(|a| self.validate(a)).collect()
            } else {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(jobs)
                    .build()
                    .map_err(|e| {
                        Error::Other(format!("Failed to create validation thread pool: {e}"))
                    })?;
                pool.install(|| artifacts.par_iter().map(|a| self.validate(a)).collect())
            };

        let mut failures = Vec::new();
        for (artifact, result) in artifacts.iter().zip(results) {
            match result {
                Ok(()) => on_result(artifact, None),
                Err(failure) => {
                    log::warn!("{failure}");
                    on_result(artifact, Some(&failure));
                    failures.push(failure);
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::BatchValidation { failures })
        }
    }
}
