//! Backend that drives the `aws` CLI.
//!
//! Credentials and SDK configuration stay with the CLI; every call passes the
//! configured region (and profile, when set) explicitly.

use serde::Deserialize;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use super::{ContentStore, ControlPlane, TemplateChecker};
use crate::error::{Error, Result};
use crate::status::StackStatus;
use crate::types::{Capability, CreateStackRequest, UpdateStackRequest};

/// Where templates and stacks live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsTarget {
    /// Region for every call (e.g. "us-west-2")
    pub region: String,
    /// Bucket that holds uploaded templates
    pub bucket: String,
    /// Named CLI profile; the CLI default chain is used when `None`
    pub profile: Option<String>,
}

/// Backend that executes real `aws` commands.
pub struct AwsCliBackend {
    aws_path: PathBuf,
    target: AwsTarget,
}

impl AwsCliBackend {
    /// Create a backend for `target`.
    ///
    /// Returns an error if the `aws` executable is not in PATH.
    pub fn new(target: AwsTarget) -> Result<Self> {
        let aws_path =
            which::which("aws").map_err(|_| Error::ExecutableNotFound("aws".to_string()))?;
        Ok(Self { aws_path, target })
    }

    /// Create a backend with an explicit executable path.
    pub fn with_executable(aws_path: impl Into<PathBuf>, target: AwsTarget) -> Self {
        Self {
            aws_path: aws_path.into(),
            target,
        }
    }

    /// The target this backend deploys to.
    pub fn target(&self) -> &AwsTarget {
        &self.target
    }

    fn global_args(&self) -> Vec<String> {
        let mut args = vec![
            "--region".to_string(),
            self.target.region.clone(),
            "--output".to_string(),
            "json".to_string(),
        ];
        if let Some(profile) = &self.target.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args
    }

    /// Run an aws command, optionally feeding `stdin`.
    fn run_aws(&self, args: &[String], stdin: Option<&[u8]>) -> Result<Output> {
        log::debug!("aws {}", args.join(" "));

        let mut cmd = Command::new(&self.aws_path);
        cmd.args(args)
            .args(self.global_args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }
        // Own process group: a terminal Ctrl-C is for us, not the in-flight call.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn()?;
        if let Some(body) = stdin {
            // Dropping the handle closes the pipe so the CLI sees EOF.
            let mut pipe = child
                .stdin
                .take()
                .ok_or_else(|| Error::Other("aws stdin unavailable".to_string()))?;
            match pipe.write_all(body) {
                Ok(()) => {}
                // The CLI quit early; its exit status and stderr say why.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                    log::debug!("aws closed stdin after a partial write");
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(e.into());
                }
            }
        }
        Ok(child.wait_with_output()?)
    }

    /// Run an aws command and return stdout, or stderr as the error message.
    fn run_checked(&self, args: &[String]) -> std::result::Result<String, String> {
        match self.run_aws(args, None) {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            }
            Ok(output) => Err(stderr_message(&output)),
            Err(e) => Err(e.to_string()),
        }
    }

    fn describe_raw(&self, stack_name: &str) -> Result<Option<DescribedStack>> {
        let args = strings(&["cloudformation", "describe-stacks", "--stack-name", stack_name]);
        match self.run_checked(&args) {
            Ok(stdout) => parse_describe(&stdout),
            Err(message) if is_stack_missing(&message) => Ok(None),
            Err(message) => Err(Error::transport("describe-stacks", Some(stack_name), message)),
        }
    }
}

impl ContentStore for AwsCliBackend {
    fn put(&self, key: &str, body: &[u8]) -> Result<String> {
        let dest = format!("s3://{}/{}", self.target.bucket, key);
        let args = strings(&["s3", "cp", "-", &dest]);
        let output = self.run_aws(&args, Some(body))?;
        if !output.status.success() {
            return Err(Error::Other(stderr_message(&output)));
        }
        Ok(object_url(&self.target, key))
    }
}

impl ControlPlane for AwsCliBackend {
    fn describe(&self, stack_name: &str) -> Result<Option<StackStatus>> {
        Ok(self.describe_raw(stack_name)?.map(|s| s.status))
    }

    fn create(&self, request: &CreateStackRequest) -> Result<()> {
        self.run_checked(&create_args(request))
            .map(|_| ())
            .map_err(Error::Other)
    }

    fn update(&self, request: &UpdateStackRequest) -> Result<()> {
        self.run_checked(&update_args(request))
            .map(|_| ())
            .map_err(Error::Other)
    }

    fn status_reason(&self, stack_name: &str) -> Result<Option<String>> {
        Ok(self.describe_raw(stack_name)?.and_then(|s| s.reason))
    }
}

impl TemplateChecker for AwsCliBackend {
    fn validate(&self, template_url: &str) -> Result<()> {
        let args = strings(&[
            "cloudformation",
            "validate-template",
            "--template-url",
            template_url,
        ]);
        self.run_checked(&args).map(|_| ()).map_err(Error::Other)
    }
}

// ============================================================================
// Request building and output parsing
// ============================================================================

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| (*s).to_string()).collect()
}

fn capability_args(args: &mut Vec<String>, capabilities: &[Capability]) {
    if !capabilities.is_empty() {
        args.push("--capabilities".to_string());
        args.extend(capabilities.iter().map(|c| c.as_str().to_string()));
    }
}

/// Arguments for `cloudformation create-stack`.
pub fn create_args(request: &CreateStackRequest) -> Vec<String> {
    let mut args = strings(&[
        "cloudformation",
        "create-stack",
        "--stack-name",
        &request.stack_name,
        "--template-url",
        &request.template_url,
    ]);
    capability_args(&mut args, &request.capabilities);
    if request.disable_rollback {
        args.push("--disable-rollback".to_string());
    }
    args
}

/// Arguments for `cloudformation update-stack`.
pub fn update_args(request: &UpdateStackRequest) -> Vec<String> {
    let mut args = strings(&[
        "cloudformation",
        "update-stack",
        "--stack-name",
        &request.stack_name,
        "--template-url",
        &request.template_url,
    ]);
    capability_args(&mut args, &request.capabilities);
    args
}

/// Public URL of an object in the template bucket.
pub fn object_url(target: &AwsTarget, key: &str) -> String {
    format!(
        "https://{}.s3.{}.amazonaws.com/{}",
        target.bucket, target.region, key
    )
}

/// Whether a describe failure means the stack does not exist.
pub fn is_stack_missing(stderr: &str) -> bool {
    stderr.contains("does not exist")
}

fn stderr_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("aws exited with {}", output.status)
    } else {
        stderr
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStacksOutput {
    #[serde(default)]
    stacks: Vec<StackSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackSummary {
    stack_status: String,
    #[serde(default)]
    stack_status_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DescribedStack {
    status: StackStatus,
    reason: Option<String>,
}

fn parse_describe(stdout: &str) -> Result<Option<DescribedStack>> {
    let output: DescribeStacksOutput = serde_json::from_str(stdout)?;
    Ok(output.stacks.into_iter().next().map(|s| DescribedStack {
        status: StackStatus::new(s.stack_status),
        reason: s.stack_status_reason,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> AwsTarget {
        AwsTarget {
            region: "us-west-2".to_string(),
            bucket: "granta-cf-templates".to_string(),
            profile: None,
        }
    }

    #[test]
    fn test_create_args_disable_rollback_and_capabilities() {
        let args = create_args(&CreateStackRequest {
            stack_name: "granta-network".to_string(),
            template_url: "https://b/network.yaml".to_string(),
            capabilities: vec![Capability::Iam],
            disable_rollback: true,
        });
        assert_eq!(
            args,
            [
                "cloudformation",
                "create-stack",
                "--stack-name",
                "granta-network",
                "--template-url",
                "https://b/network.yaml",
                "--capabilities",
                "CAPABILITY_IAM",
                "--disable-rollback",
            ]
        );
    }

    #[test]
    fn test_update_args_have_no_rollback_flag() {
        let args = update_args(&UpdateStackRequest {
            stack_name: "granta-network".to_string(),
            template_url: "https://b/network.yaml".to_string(),
            capabilities: vec![Capability::Iam, Capability::AutoExpand],
        });
        assert!(args.iter().all(|a| !a.contains("rollback")));
        assert!(args.ends_with(&[
            "--capabilities".to_string(),
            "CAPABILITY_IAM".to_string(),
            "CAPABILITY_AUTO_EXPAND".to_string(),
        ]));
    }

    #[test]
    fn test_object_url() {
        assert_eq!(
            object_url(&target(), "templates/network.yaml"),
            "https://granta-cf-templates.s3.us-west-2.amazonaws.com/templates/network.yaml"
        );
    }

    #[cfg(unix)]
    fn fake_aws(dir: &tempfile::TempDir, script: &str) -> AwsCliBackend {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("aws");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        AwsCliBackend::with_executable(path, target())
    }

    #[cfg(unix)]
    #[test]
    fn test_put_reports_cli_error_when_stdin_is_refused() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = fake_aws(
            &dir,
            "echo 'An error occurred (AccessDenied) when calling the PutObject operation: Access Denied' >&2\nexit 1",
        );

        let err = backend.put("network.yaml", &vec![b'x'; 1024 * 1024]).unwrap_err();

        match err {
            Error::Other(message) => assert!(message.contains("AccessDenied"), "{message}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_put_streams_body_and_returns_object_url() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = dir.path().join("body");
        let backend = fake_aws(&dir, &format!("cat > '{}'", sink.display()));

        let url = backend.put("stacks/network.yaml", b"Resources: {}\n").unwrap();

        assert_eq!(
            url,
            "https://granta-cf-templates.s3.us-west-2.amazonaws.com/stacks/network.yaml"
        );
        assert_eq!(std::fs::read(&sink).unwrap(), b"Resources: {}\n");
    }

    #[test]
    fn test_stack_missing_detection() {
        assert!(is_stack_missing(
            "An error occurred (ValidationError) when calling the DescribeStacks operation: \
             Stack with id granta-network does not exist"
        ));
        assert!(!is_stack_missing(
            "An error occurred (ExpiredToken) when calling the DescribeStacks operation"
        ));
    }

    #[test]
    fn test_parse_describe() {
        let json = r#"{
            "Stacks": [{
                "StackName": "granta-network",
                "StackStatus": "UPDATE_ROLLBACK_COMPLETE",
                "StackStatusReason": "Resource update cancelled",
                "CreationTime": "2024-03-01T10:00:00Z"
            }]
        }"#;
        let described = parse_describe(json).unwrap().unwrap();
        assert_eq!(described.status.as_str(), "UPDATE_ROLLBACK_COMPLETE");
        assert_eq!(described.reason.as_deref(), Some("Resource update cancelled"));

        assert_eq!(parse_describe(r#"{"Stacks": []}"#).unwrap(), None);
    }

    #[test]
    fn test_global_args_include_profile() {
        let backend = AwsCliBackend::with_executable(
            "/usr/bin/aws",
            AwsTarget {
                profile: Some("deploy".to_string()),
                ..target()
            },
        );
        assert_eq!(
            backend.global_args(),
            ["--region", "us-west-2", "--output", "json", "--profile", "deploy"]
        );
    }
}
