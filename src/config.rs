//! Deployment configuration.
//!
//! The config file names the target account location and the ordered list of
//! templates. Lookup order when no path is given on the command line or in
//! `STACKUP_CONFIG`:
//!
//! 1. `./stackup.toml`
//! 2. `<config dir>/stackup/stackup.toml` (e.g. `~/.config/stackup/stackup.toml`)

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use stackkit::backend::aws::AwsTarget;
use stackkit::{Capability, DEFAULT_CAPABILITIES, TemplateBatch, TemplateDescriptor, WaitConfig};

/// Default config file name
pub const CONFIG_FILE: &str = "stackup.toml";

/// Top-level deployment config
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    /// Region every call goes to
    pub region: String,

    /// Bucket that receives uploaded templates
    pub bucket: String,

    /// Prefix for uploaded object keys
    #[serde(default)]
    pub key_prefix: String,

    /// Named CLI profile
    #[serde(default)]
    pub profile: Option<String>,

    /// Parallel uploads and validations
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Capabilities granted on every create and update
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<Capability>,

    /// Convergence wait settings
    #[serde(default)]
    pub wait: WaitSection,

    /// Templates in dependency order
    #[serde(default)]
    pub templates: Vec<TemplateEntry>,

    /// Directory the config was loaded from; relative template paths
    /// resolve against it
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// `[wait]` table
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitSection {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for WaitSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            timeout_secs: None,
        }
    }
}

/// One `[[templates]]` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateEntry {
    pub name: String,
    pub path: String,
    pub stack: String,
}

fn default_jobs() -> usize {
    1
}

fn default_capabilities() -> Vec<Capability> {
    DEFAULT_CAPABILITIES.to_vec()
}

fn default_poll_interval() -> u64 {
    15
}

/// Find the config file to load.
pub fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return Ok(local);
    }

    if let Some(dir) = dirs::config_dir() {
        let global = dir.join("stackup").join(CONFIG_FILE);
        if global.exists() {
            log::debug!("Using config from {}", global.display());
            return Ok(global);
        }
    }

    bail!("No {CONFIG_FILE} found in the current directory; pass one with --config")
}

impl DeployConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    /// Parse and validate config text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Check the config for values that can never deploy.
    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            bail!("region cannot be empty");
        }
        if self.bucket.trim().is_empty() {
            bail!("bucket cannot be empty");
        }
        if self.templates.is_empty() {
            bail!("at least one [[templates]] entry is required");
        }
        if self.wait.poll_interval_secs == 0 {
            bail!("wait.poll_interval_secs must be greater than zero");
        }

        let mut stacks = HashSet::new();
        for entry in &self.templates {
            if entry.name.is_empty() || entry.path.is_empty() || entry.stack.is_empty() {
                bail!("template entries need a name, path and stack");
            }
            if !stacks.insert(entry.stack.as_str()) {
                bail!("stack '{}' is declared more than once", entry.stack);
            }
        }

        Ok(())
    }

    /// Absolute (or config-relative) path of a template file.
    pub fn template_path(&self, entry: &TemplateEntry) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(&entry.path).as_ref());
        if expanded.is_absolute() {
            expanded
        } else {
            self.base_dir.join(expanded)
        }
    }

    /// Declared templates as a batch, in config order.
    pub fn batch(&self) -> Result<TemplateBatch> {
        let descriptors = self
            .templates
            .iter()
            .map(|entry| {
                TemplateDescriptor::new(&entry.name, self.template_path(entry), &entry.stack)
            })
            .collect();
        Ok(TemplateBatch::new(descriptors)?)
    }

    /// Where templates and stacks live.
    pub fn target(&self) -> AwsTarget {
        AwsTarget {
            region: self.region.clone(),
            bucket: self.bucket.clone(),
            profile: self.profile.clone(),
        }
    }

    /// Convergence wait settings.
    pub fn wait_config(&self) -> WaitConfig {
        WaitConfig::new(
            Duration::from_secs(self.wait.poll_interval_secs),
            self.wait.timeout_secs.map(Duration::from_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
region = "us-west-2"
bucket = "granta-cf-templates"

[[templates]]
name = "network"
path = "templates/network.yaml"
stack = "granta-network"

[[templates]]
name = "cluster"
path = "/srv/templates/cluster.yaml"
stack = "granta-cluster"
"#;

    #[test]
    fn test_defaults() {
        let config = DeployConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.key_prefix, "");
        assert_eq!(config.profile, None);
        assert_eq!(config.jobs, 1);
        assert_eq!(config.capabilities, [Capability::Iam]);
        assert_eq!(config.wait_config(), WaitConfig::default());
    }

    #[test]
    fn test_full_config() {
        let config = DeployConfig::parse(
            r#"
region = "eu-west-1"
bucket = "templates"
key_prefix = "prod"
profile = "deploy"
jobs = 4
capabilities = ["CAPABILITY_NAMED_IAM", "CAPABILITY_AUTO_EXPAND"]

[wait]
poll_interval_secs = 5
timeout_secs = 600

[[templates]]
name = "network"
path = "network.yaml"
stack = "net"
"#,
        )
        .unwrap();

        assert_eq!(config.jobs, 4);
        assert_eq!(
            config.capabilities,
            [Capability::NamedIam, Capability::AutoExpand]
        );
        assert_eq!(
            config.wait_config(),
            WaitConfig::new(Duration::from_secs(5), Some(Duration::from_secs(600)))
        );
        assert_eq!(
            config.target(),
            AwsTarget {
                region: "eu-west-1".to_string(),
                bucket: "templates".to_string(),
                profile: Some("deploy".to_string()),
            }
        );
    }

    #[test]
    fn test_rejects_empty_region() {
        let err = DeployConfig::parse(&MINIMAL.replace("us-west-2", "")).unwrap_err();
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn test_rejects_missing_templates() {
        let err =
            DeployConfig::parse("region = \"us-west-2\"\nbucket = \"b\"\n").unwrap_err();
        assert!(err.to_string().contains("templates"));
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let text = format!("{MINIMAL}\n[wait]\npoll_interval_secs = 0\n");
        assert!(DeployConfig::parse(&text).is_err());
    }

    #[test]
    fn test_rejects_duplicate_stacks() {
        let err = DeployConfig::parse(&MINIMAL.replace("granta-cluster", "granta-network"))
            .unwrap_err();
        assert!(err.to_string().contains("granta-network"));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let text = MINIMAL.replace("bucket =", "buckett = \"x\"\nbucket =");
        assert!(DeployConfig::parse(&text).is_err());
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, MINIMAL).unwrap();

        let config = DeployConfig::load(&path).unwrap();
        let batch = config.batch().unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.templates()[0].local_path,
            dir.path().join("templates/network.yaml")
        );
        assert_eq!(
            batch.templates()[1].local_path,
            PathBuf::from("/srv/templates/cluster.yaml")
        );
        assert_eq!(batch.templates()[1].stack_name, "granta-cluster");
    }

    #[test]
    fn test_load_missing_file() {
        let err = DeployConfig::load(Path::new("/does/not/exist/stackup.toml")).unwrap_err();
        assert!(err.to_string().contains("Could not read"));
    }

    #[test]
    fn test_locate_prefers_explicit_path() {
        let path = locate(Some(Path::new("prod.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("prod.toml"));
    }
}
