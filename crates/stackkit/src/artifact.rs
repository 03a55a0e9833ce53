//! Template upload.
//!
//! Each template is opened, read and closed before its bytes are handed to
//! the content store, so at most one template file is open at a time and a
//! bad path is reported before anything is written for it.

use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::backend::ContentStore;
use crate::error::{Error, Result};
use crate::types::{TemplateBatch, TemplateDescriptor, UploadedArtifact};

/// Uploads template files to a [`ContentStore`].
pub struct ArtifactStore<'a> {
    store: &'a dyn ContentStore,
    key_prefix: String,
}

impl<'a> ArtifactStore<'a> {
    /// Create a store writing keys under `key_prefix` (may be empty).
    pub fn new(store: &'a dyn ContentStore, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
        }
    }

    /// Remote key for a template.
    pub fn key_for(&self, descriptor: &TemplateDescriptor) -> String {
        remote_key(&self.key_prefix, &descriptor.local_path)
    }

    /// Upload one template.
    pub fn upload(&self, descriptor: &TemplateDescriptor) -> Result<UploadedArtifact> {
        let key = self.key_for(descriptor);
        let body = fs::read(&descriptor.local_path).map_err(|source| Error::LocalRead {
            template: descriptor.name.clone(),
            path: descriptor.local_path.clone(),
            source,
        })?;
        let digest = blake3::hash(&body).to_hex().to_string();

        let remote_url = self
            .store
            .put(&key, &body)
            .map_err(|e| Error::Upload {
                template: descriptor.name.clone(),
                key: key.clone(),
                message: e.to_string(),
            })?;
        log::info!("Uploaded {} to {}", descriptor.name, remote_url);

        Ok(UploadedArtifact {
            descriptor: descriptor.clone(),
            key,
            remote_url,
            digest,
            size: body.len() as u64,
        })
    }

    /// Upload every template in declared order, stopping at the first error.
    ///
    /// With `jobs > 1` uploads run concurrently; the returned artifacts and
    /// the reported error are still those of the first template in declared
    /// order.
    pub fn upload_all(
        &self,
        batch: &TemplateBatch,
        jobs: usize,
        on_uploaded: &mut dyn FnMut(&UploadedArtifact),
    ) -> Result<Vec<UploadedArtifact>> {
        self.check_keys(batch)?;

        if jobs <= 1 || batch.len() <= 1 {
            let mut artifacts = Vec::with_capacity(batch.len());
            for descriptor in batch.templates() {
                let artifact = self.upload(descriptor)?;
                on_uploaded(&artifact);
                artifacts.push(artifact);
            }
            return Ok(artifacts);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create upload thread pool: {e}")))?;
        let results: Vec<Result<UploadedArtifact>> = pool.install(|| {
            batch
                .templates()
                .par_iter()
                .map(|descriptor| self.upload(descriptor))
                .collect()
        });

        let mut artifacts = Vec::with_capacity(results.len());
        for result in results {
            let artifact = result?;
            on_uploaded(&artifact);
            artifacts.push(artifact);
        }
        Ok(artifacts)
    }

    /// Reject batches where two templates would overwrite each other.
    fn check_keys(&self, batch: &TemplateBatch) -> Result<()> {
        let mut seen: HashMap<String, &str> = HashMap::new();
        for descriptor in batch.templates() {
            let key = self.key_for(descriptor);
            if let Some(first) = seen.get(&key) {
                return Err(Error::DuplicateKey {
                    key,
                    first: (*first).to_string(),
                    second: descriptor.name.clone(),
                });
            }
            seen.insert(key, &descriptor.name);
        }
        Ok(())
    }
}

/// Derive the content-store key for a template file.
///
/// The key is the prefix joined with the file name, so the same file always
/// lands on the same object.
pub fn remote_key(prefix: &str, path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        file_name
    } else {
        format!("{prefix}/{file_name}")
    }
}
