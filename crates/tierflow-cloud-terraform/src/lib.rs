//! Terraform engine for tierflow
//!
//! This crate implements the [`Engine`](tierflow_cloud::Engine) trait on top
//! of the terraform CLI. The synthesized `main.tf.json` is written to the
//! stack's working directory and terraform keeps its own state next to it.
//!
//! # Requirements
//!
//! - `terraform` (or a compatible binary such as `tofu`) must be installed
//! - AWS credentials are taken from the usual environment and profile chain
//!
//! # Example
//!
//! ```ignore
//! use tierflow_cloud::{Engine, PlanOptions, ResourceSet};
//! use tierflow_cloud_terraform::TerraformEngine;
//!
//! let engine = TerraformEngine::new(".", "serverless");
//! let plan = engine.plan(&resources, &PlanOptions::default()).await?;
//! println!("{}", plan.summary());
//! ```

pub mod engine;
pub mod error;
pub mod terraform;

pub use engine::{TerraformEngine, actions_from_plan, state_from_show};
pub use error::{Result, TerraformError};
pub use terraform::{Terraform, TerraformOutput, TerraformVersion};
