//! terraform CLI wrapper
//!
//! Runs terraform commands in a working directory holding the synthesized
//! `main.tf.json`.

use crate::error::{Result, TerraformError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;

/// Synthesized configuration file name inside the working directory
pub const MAIN_FILE: &str = "main.tf.json";

/// Saved plan file name inside the working directory
pub const PLAN_FILE: &str = "tfplan";

/// Local state file written by terraform
pub const STATE_FILE: &str = "terraform.tfstate";

/// terraform CLI wrapper
pub struct Terraform {
    binary: String,
    workdir: PathBuf,
}

impl Terraform {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            binary: "terraform".to_string(),
            workdir: workdir.into(),
        }
    }

    /// Use a different executable (e.g. `tofu`)
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn has_state(&self) -> bool {
        self.workdir.join(STATE_FILE).exists()
    }

    pub fn has_plan(&self) -> bool {
        self.workdir.join(PLAN_FILE).exists()
    }

    /// Check that terraform is installed and return its version
    pub async fn version(&self) -> Result<TerraformVersion> {
        let which = Command::new("which").arg(&self.binary).output().await?;
        if !which.status.success() {
            return Err(TerraformError::TerraformNotFound);
        }

        let output = self.run_command(&["version", "-json"]).await?;
        let version: TerraformVersion = serde_json::from_str(&output)?;
        Ok(version)
    }

    /// Write the synthesized document into the working directory
    pub async fn write_document(&self, document: &serde_json::Value) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.workdir).await?;
        let path = self.workdir.join(MAIN_FILE);
        tokio::fs::write(&path, serde_json::to_string_pretty(document)?).await?;
        tracing::debug!("Wrote {}", path.display());
        Ok(path)
    }

    async fn run_raw(&self, args: &[&str]) -> Result<Output> {
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(&self.workdir);
        cmd.args(args);
        cmd.env("TF_IN_AUTOMATION", "1");
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {} {}", self.binary, args.join(" "));

        Ok(cmd.output().await?)
    }

    /// Run a terraform command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let output = self.run_raw(args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TerraformError::CommandFailed(stderr.to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Initialize providers
    pub async fn init(&self) -> Result<()> {
        self.run_command(&["init", "-input=false", "-no-color"])
            .await?;
        Ok(())
    }

    /// Save a plan to [`PLAN_FILE`] and report whether it contains changes
    pub async fn plan(&self, replace: &[String], destroy: bool) -> Result<bool> {
        let args = plan_args(replace, destroy);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run_raw(&args).await?;

        // -detailed-exitcode: 0 = 変更なし, 2 = 変更あり
        match output.status.code() {
            Some(0) => Ok(false),
            Some(2) => Ok(true),
            _ => Err(TerraformError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            )),
        }
    }

    /// Render the saved plan as JSON
    pub async fn show_plan(&self) -> Result<serde_json::Value> {
        let output = self.run_command(&["show", "-json", PLAN_FILE]).await?;
        Ok(serde_json::from_str(&output)?)
    }

    /// Render the current state as JSON
    pub async fn show_state(&self) -> Result<serde_json::Value> {
        let output = self.run_command(&["show", "-json"]).await?;
        Ok(serde_json::from_str(&output)?)
    }

    /// Apply the plan saved by [`Terraform::plan`]
    ///
    /// terraform refuses a saved plan once the state has moved on, so drift
    /// between plan and apply surfaces as a command failure. The plan file is
    /// removed after a successful apply.
    pub async fn apply_plan(&self) -> Result<()> {
        let args = apply_plan_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_command(&args).await?;
        tokio::fs::remove_file(self.workdir.join(PLAN_FILE)).await?;
        Ok(())
    }

    /// Destroy every resource in the state
    pub async fn destroy(&self) -> Result<()> {
        self.run_command(&["destroy", "-input=false", "-no-color", "-auto-approve"])
            .await?;
        Ok(())
    }

    /// Read outputs of the current state
    pub async fn output(&self) -> Result<BTreeMap<String, TerraformOutput>> {
        let output = self.run_command(&["output", "-json"]).await?;
        if output.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&output)?)
    }
}

/// Arguments of `terraform plan`
pub fn plan_args(replace: &[String], destroy: bool) -> Vec<String> {
    let mut args = vec![
        "plan".to_string(),
        "-input=false".to_string(),
        "-no-color".to_string(),
        "-detailed-exitcode".to_string(),
        format!("-out={}", PLAN_FILE),
    ];
    if destroy {
        args.push("-destroy".to_string());
    }
    args.extend(replace.iter().map(|a| format!("-replace={}", a)));
    args
}

/// Arguments of `terraform apply` for the saved plan
///
/// No `-replace` or `-auto-approve`: a saved plan already records the forced
/// replacements and applies without a prompt.
pub fn apply_plan_args() -> Vec<String> {
    vec![
        "apply".to_string(),
        "-input=false".to_string(),
        "-no-color".to_string(),
        PLAN_FILE.to_string(),
    ]
}

/// `terraform version -json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerraformVersion {
    pub terraform_version: String,
    #[serde(default)]
    pub platform: Option<String>,
}

/// One entry of `terraform output -json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerraformOutput {
    pub value: serde_json::Value,
    #[serde(default)]
    pub sensitive: bool,
}
