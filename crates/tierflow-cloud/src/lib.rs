//! Provisioning engines for tierflow
//!
//! This crate provides the engine abstraction used to reconcile a
//! synthesized stack with real infrastructure:
//!
//! - [`Engine`] trait implemented by each provisioning backend
//! - [`planner`] which diffs desired resources against recorded state
//! - [`StateManager`] for the `.tierflow/<stack>/state.json` file
//! - [`LocalEngine`] which simulates provider-computed attributes

pub mod action;
pub mod engine;
pub mod error;
pub mod interpolate;
pub mod local;
pub mod planner;
pub mod state;

pub use action::{Action, ActionResult, ActionType, ApplyResult, Plan, PlanSummary};
pub use engine::{AuthStatus, Engine, OutputConfig, ResourceConfig, ResourceSet};
pub use error::{CloudError, Result};
pub use local::LocalEngine;
pub use planner::{PlanOptions, diff};
pub use state::{GlobalState, ResourceState, ResourceStatus, StateLock, StateManager};
