//! Terraform engine error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TerraformError {
    #[error("terraform not found. Please install: https://developer.hashicorp.com/terraform/install")]
    TerraformNotFound,

    #[error("terraform command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid plan output: {0}")]
    InvalidPlan(String),

    #[error("Saved plan does not match: {0}. Run plan again")]
    StalePlan(String),

    #[error("Invalid state output: {0}")]
    InvalidState(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Engine error: {0}")]
    CloudError(#[from] tierflow_cloud::CloudError),
}

impl From<TerraformError> for tierflow_cloud::CloudError {
    fn from(e: TerraformError) -> Self {
        match e {
            TerraformError::TerraformNotFound => {
                tierflow_cloud::CloudError::EngineNotFound(e.to_string())
            }
            TerraformError::CommandFailed(msg) => tierflow_cloud::CloudError::CommandFailed(msg),
            TerraformError::CloudError(inner) => inner,
            other => tierflow_cloud::CloudError::Provider(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TerraformError>;
