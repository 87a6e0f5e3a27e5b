//! Provisioning engine trait definition

use crate::action::{ApplyResult, Plan};
use crate::error::Result;
use crate::planner::PlanOptions;
use crate::state::GlobalState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tierflow_core::{SynthesizedStack, synth::to_terraform_json};

/// Provisioning engine trait
///
/// An engine receives the validated resource set of a stack and reconciles
/// real infrastructure with it. Implementations must honor the ordering
/// carried by [`ResourceSet`]: a dependency is always handled before its
/// dependents, and the reverse on destruction.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Engine name (e.g., "local", "terraform")
    fn name(&self) -> &str;

    /// Human-readable name
    fn display_name(&self) -> &str;

    /// Check that the engine can act on behalf of the caller
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Recorded state of the stack
    async fn get_state(&self) -> Result<GlobalState>;

    /// Compute the actions needed to make reality match `desired`
    async fn plan(&self, desired: &ResourceSet, options: &PlanOptions) -> Result<Plan>;

    /// Execute a plan previously produced by [`Engine::plan`]
    async fn apply(&self, desired: &ResourceSet, plan: &Plan) -> Result<ApplyResult>;

    /// Destroy every resource of the stack in reverse dependency order
    async fn destroy_all(&self, desired: &ResourceSet) -> Result<ApplyResult>;

    /// Resolved stack outputs after the last apply
    async fn outputs(&self) -> Result<BTreeMap<String, serde_json::Value>>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether the engine can be used
    pub authenticated: bool,

    /// Account or identity information
    pub account_info: Option<String>,

    /// Error message if not usable
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Set of desired resources handed to an engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSet {
    /// Stack name
    pub stack: String,

    /// Deployment region
    pub region: String,

    /// Resources in dependency order
    pub resources: Vec<ResourceConfig>,

    /// Declared outputs
    pub outputs: Vec<OutputConfig>,

    /// Synthesized engine document
    pub document: serde_json::Value,
}

impl ResourceSet {
    pub fn new(stack: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            region: region.into(),
            ..Default::default()
        }
    }

    /// Build the resource set of a synthesized stack
    pub fn from_stack(stack: &SynthesizedStack) -> Self {
        let graph = stack.graph();
        let resources = graph
            .topological_order()
            .into_iter()
            .map(|resource| ResourceConfig {
                resource_type: resource.kind().type_name().to_string(),
                id: resource.address.to_string(),
                provider: resource.kind().provider().to_string(),
                config: resource.to_json(),
                depends_on: graph
                    .dependencies_of(&resource.address)
                    .into_iter()
                    .map(|a| a.to_string())
                    .collect(),
                force_new: resource
                    .kind()
                    .replace_on_change()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            })
            .collect();

        let outputs = stack
            .outputs()
            .iter()
            .map(|o| OutputConfig {
                name: o.name.clone(),
                value: o.value.to_json(),
                sensitive: o.sensitive,
            })
            .collect();

        Self {
            stack: stack.name().to_string(),
            region: stack.region().to_string(),
            resources,
            outputs,
            document: to_terraform_json(stack),
        }
    }

    pub fn add(&mut self, resource: ResourceConfig) {
        self.resources.push(resource);
    }

    pub fn get(&self, id: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceConfig> {
        self.resources.iter()
    }

    pub fn by_type(&self, resource_type: &str) -> Vec<&ResourceConfig> {
        self.resources
            .iter()
            .filter(|r| r.resource_type == resource_type)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Desired configuration of a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource type (e.g., "aws_subnet")
    pub resource_type: String,

    /// Resource address (type.name)
    pub id: String,

    /// Provider name
    pub provider: String,

    /// Declared attributes with `${...}` references left unresolved
    pub config: serde_json::Value,

    /// Addresses of direct dependencies
    pub depends_on: Vec<String>,

    /// Attributes whose change forces replacement
    pub force_new: Vec<String>,
}

impl ResourceConfig {
    pub fn new(resource_type: impl Into<String>, name: &str) -> Self {
        let resource_type = resource_type.into();
        Self {
            id: format!("{}.{}", resource_type, name),
            resource_type,
            provider: "aws".to_string(),
            config: serde_json::Value::Object(serde_json::Map::new()),
            depends_on: Vec::new(),
            force_new: Vec::new(),
        }
    }

    pub fn with_config(mut self, key: &str, value: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = &mut self.config {
            map.insert(key.to_string(), value);
        }
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    pub fn force_new(mut self, key: impl Into<String>) -> Self {
        self.force_new.push(key.into());
        self
    }

    /// Get a configuration value
    pub fn get_config(&self, key: &str) -> Option<&serde_json::Value> {
        self.config.get(key)
    }

    pub fn get_config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    /// Resource name part of the address
    pub fn name(&self) -> &str {
        self.id
            .split_once('.')
            .map(|(_, name)| name)
            .unwrap_or(&self.id)
    }
}

/// Declared output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub name: String,
    pub value: serde_json::Value,
    pub sensitive: bool,
}
