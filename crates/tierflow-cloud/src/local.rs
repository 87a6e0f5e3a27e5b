//! Local engine
//!
//! Reconciles a stack against a state file without calling any cloud API.
//! Computed attributes (IDs, ARNs, endpoints, generated passwords) are
//! simulated so that references resolve exactly as they would against a
//! real account. Useful for dry runs and for exercising plans in tests.

use crate::action::{Action, ActionType, ApplyResult, Plan};
use crate::engine::{AuthStatus, Engine, ResourceConfig, ResourceSet};
use crate::error::{CloudError, Result};
use crate::interpolate;
use crate::planner::{PlanOptions, diff};
use crate::state::{GlobalState, ResourceState, ResourceStatus, StateManager};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Instant;
use tierflow_core::ResourceKind;

/// Account number used in simulated ARNs
pub const LOCAL_ACCOUNT_ID: &str = "000000000000";

const DEFAULT_SPECIAL: &str = "!@#$%&*()-_=+[]{}<>:?";
const ALPHANUMERIC: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Engine that records resources in the local state directory
pub struct LocalEngine {
    region: String,
    state: StateManager,
}

impl LocalEngine {
    pub fn new(project_root: impl AsRef<Path>, stack: &str, region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            state: StateManager::new(project_root, stack),
        }
    }

    /// Create, update or replace one resource in `state`
    fn provision(
        &self,
        state: &mut GlobalState,
        resource: &ResourceConfig,
        action_type: ActionType,
    ) -> Result<String> {
        let kind: ResourceKind = resource.resource_type.parse()?;
        let resolved = interpolate::resolve(&resource.id, &resource.config, &|address, attr| {
            state.attribute(address, attr).cloned()
        })?;
        let Value::Object(resolved) = resolved else {
            return Err(CloudError::InvalidConfig(format!(
                "{}: configuration must be an object",
                resource.id
            )));
        };

        let previous = state.get_resource(&resource.id);
        let computed = match (action_type, previous) {
            (ActionType::Update, Some(previous)) => {
                let mut kept: BTreeMap<String, Value> = kind
                    .computed_attributes()
                    .iter()
                    .filter_map(|attr| {
                        previous
                            .attributes
                            .get(*attr)
                            .map(|v| (attr.to_string(), v.clone()))
                    })
                    .collect();
                if kind == ResourceKind::SsmParameter {
                    let version = kept.get("version").and_then(Value::as_i64).unwrap_or(1);
                    kept.insert("version".to_string(), json!(version + 1));
                }
                kept
            }
            _ => simulate(kind, &resolved, &self.region),
        };

        let id = computed
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(&resource.id)
            .to_string();
        let created_at = match (action_type, previous) {
            (ActionType::Update, Some(previous)) => previous.created_at,
            _ => Utc::now(),
        };

        let mut recorded = ResourceState::new(&id, &resource.resource_type)
            .with_status(ResourceStatus::Available)
            .with_config(resource.config.clone())
            .with_depends_on(resource.depends_on.clone());
        recorded.created_at = created_at;
        recorded.attributes = resolved.into_iter().collect();
        recorded.attributes.extend(computed);

        state.set_resource(resource.id.clone(), recorded);
        Ok(id)
    }

    fn resolve_outputs(desired: &ResourceSet, state: &GlobalState) -> BTreeMap<String, Value> {
        let mut outputs = BTreeMap::new();
        for output in &desired.outputs {
            match interpolate::resolve(&output.name, &output.value, &|address, attr| {
                state.attribute(address, attr).cloned()
            }) {
                Ok(value) => {
                    outputs.insert(output.name.clone(), value);
                }
                Err(e) => tracing::warn!("Output {} could not be resolved: {}", output.name, e),
            }
        }
        outputs
    }
}

#[async_trait]
impl Engine for LocalEngine {
    fn name(&self) -> &str {
        "local"
    }

    fn display_name(&self) -> &str {
        "Local state"
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        Ok(AuthStatus::ok(format!(
            "account {} ({})",
            LOCAL_ACCOUNT_ID,
            self.state.state_dir().display()
        )))
    }

    async fn get_state(&self) -> Result<GlobalState> {
        self.state.load().await
    }

    async fn plan(&self, desired: &ResourceSet, options: &PlanOptions) -> Result<Plan> {
        let state = self.state.load().await?;
        let plan = diff(desired, &state, options)?;
        tracing::info!(summary = %plan.summary(), "Planned stack {}", desired.stack);
        Ok(plan)
    }

    async fn apply(&self, desired: &ResourceSet, plan: &Plan) -> Result<ApplyResult> {
        let lock = self.state.acquire_lock().await?;
        let mut state = self.state.load().await?;
        let started = Instant::now();
        let mut result = ApplyResult::new();

        // Addresses given a new identifier by this run
        let mut renewed: BTreeSet<String> = BTreeSet::new();
        let changes: Vec<&Action> = plan.changes().collect();

        for (position, action) in changes.iter().enumerate() {
            tracing::debug!(action = %action.action_type, resource = %action.resource_id, "Applying");

            let outcome = match action.action_type {
                ActionType::Delete => state
                    .remove_resource(&action.resource_id)
                    .map(|r| format!("Deleted {} ({})", action.resource_id, r.id))
                    .ok_or_else(|| CloudError::ResourceNotFound(action.resource_id.clone())),
                ActionType::Create | ActionType::Update | ActionType::Replace => {
                    match desired.get(&action.resource_id) {
                        Some(resource) => self
                            .provision(&mut state, resource, action.action_type)
                            .map(|id| format!("{} {} ({})", action.action_type, action.resource_id, id)),
                        None => Err(CloudError::ResourceNotFound(action.resource_id.clone())),
                    }
                }
                ActionType::NoOp => continue,
            };

            match outcome {
                Ok(message) => {
                    tracing::info!("{}", message);
                    if matches!(action.action_type, ActionType::Create | ActionType::Replace) {
                        renewed.insert(action.resource_id.clone());
                    }
                    result.add_success(action.id.clone(), message);
                }
                Err(e) => {
                    tracing::error!(resource = %action.resource_id, "Apply failed: {}", e);
                    result.add_failure(action.id.clone(), e.to_string());
                    taint_pending(&mut state, desired, &changes[position..], &renewed);
                    break;
                }
            }
        }

        state.outputs = if state.is_empty() {
            BTreeMap::new()
        } else {
            Self::resolve_outputs(desired, &state)
        };
        self.state.save(&mut state).await?;
        lock.release().await?;

        result.duration_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn destroy_all(&self, desired: &ResourceSet) -> Result<ApplyResult> {
        let plan = self.plan(desired, &PlanOptions::destroy()).await?;
        self.apply(desired, &plan).await
    }

    async fn outputs(&self) -> Result<BTreeMap<String, Value>> {
        Ok(self.state.load().await?.outputs)
    }
}

/// Taint recorded resources whose action did not run but which depend on a
/// resource renewed earlier in the same apply
///
/// Their stored attributes still hold the old identifiers, and with the
/// renewal already recorded the next plan would otherwise see nothing to do.
fn taint_pending(
    state: &mut GlobalState,
    desired: &ResourceSet,
    pending: &[&Action],
    renewed: &BTreeSet<String>,
) {
    for action in pending {
        if action.action_type == ActionType::Delete {
            continue;
        }
        let declared = desired
            .get(&action.resource_id)
            .map(|r| r.depends_on.as_slice())
            .unwrap_or_default();
        let Some(recorded) = state.resources.get_mut(&action.resource_id) else {
            continue;
        };
        let stale = declared
            .iter()
            .chain(&recorded.depends_on)
            .any(|dep| renewed.contains(dep));
        if stale {
            tracing::warn!(resource = %action.resource_id, "Marking resource as tainted");
            recorded.status = ResourceStatus::Tainted;
        }
    }
}

fn hex_id(prefix: &str) -> String {
    format!("{}-{:017x}", prefix, rand::random::<u64>())
}

fn public_ip() -> String {
    format!(
        "52.{}.{}.{}",
        rand::random::<u8>(),
        rand::random::<u8>(),
        rand::random::<u8>()
    )
}

fn string_attr<'a>(resolved: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    resolved.get(key).and_then(Value::as_str)
}

fn generate_password(resolved: &Map<String, Value>) -> String {
    let length = resolved.get("length").and_then(Value::as_u64).unwrap_or(16) as usize;
    let special = resolved.get("special").and_then(Value::as_bool).unwrap_or(true);

    let mut charset: Vec<char> = ALPHANUMERIC.chars().collect();
    if special {
        let extra = string_attr(resolved, "override_special").unwrap_or(DEFAULT_SPECIAL);
        charset.extend(extra.chars());
    }

    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| charset[rng.gen_range(0..charset.len())])
        .collect()
}

/// Attributes the provider would assign on creation
fn simulate(kind: ResourceKind, resolved: &Map<String, Value>, region: &str) -> BTreeMap<String, Value> {
    let account = LOCAL_ACCOUNT_ID;
    let ec2_arn = |resource: &str, id: &str| format!("arn:aws:ec2:{region}:{account}:{resource}/{id}");
    let name = |key: &str| string_attr(resolved, key).unwrap_or_default().to_string();

    let mut attrs = BTreeMap::new();
    let mut set = |key: &str, value: Value| {
        attrs.insert(key.to_string(), value);
    };

    match kind {
        ResourceKind::Vpc => {
            let id = hex_id("vpc");
            let main_route_table = hex_id("rtb");
            set("arn", json!(ec2_arn("vpc", &id)));
            set("default_route_table_id", json!(main_route_table));
            set("main_route_table_id", json!(main_route_table));
            set("id", json!(id));
        }
        ResourceKind::InternetGateway => {
            let id = hex_id("igw");
            set("arn", json!(ec2_arn("internet-gateway", &id)));
            set("id", json!(id));
        }
        ResourceKind::Subnet => {
            let id = hex_id("subnet");
            set("arn", json!(ec2_arn("subnet", &id)));
            set("id", json!(id));
        }
        ResourceKind::RouteTable => {
            let id = hex_id("rtb");
            set("arn", json!(ec2_arn("route-table", &id)));
            set("id", json!(id));
        }
        ResourceKind::Route => set("id", json!(hex_id("r"))),
        ResourceKind::RouteTableAssociation => set("id", json!(hex_id("rtbassoc"))),
        ResourceKind::Eip => {
            let id = hex_id("eipalloc");
            set("allocation_id", json!(id));
            set("public_ip", json!(public_ip()));
            set("id", json!(id));
        }
        ResourceKind::NatGateway => {
            set("public_ip", json!(public_ip()));
            set("id", json!(hex_id("nat")));
        }
        ResourceKind::VpcEndpoint => {
            let id = hex_id("vpce");
            set("arn", json!(ec2_arn("vpc-endpoint", &id)));
            set("prefix_list_id", json!(format!("pl-{:08x}", rand::random::<u32>())));
            set("id", json!(id));
        }
        ResourceKind::DbSubnetGroup => {
            let group = name("name");
            set("arn", json!(format!("arn:aws:rds:{region}:{account}:subgrp:{group}")));
            set("id", json!(group));
        }
        ResourceKind::DbInstance => {
            let identifier = string_attr(resolved, "identifier")
                .map(str::to_string)
                .unwrap_or_else(|| format!("db-{:026x}", rand::random::<u128>() >> 24));
            let port = resolved.get("port").and_then(Value::as_u64).unwrap_or(5432);
            let address = format!(
                "{}.c{:011x}.{}.rds.amazonaws.com",
                identifier,
                rand::random::<u64>() >> 20,
                region
            );
            set("arn", json!(format!("arn:aws:rds:{region}:{account}:db:{identifier}")));
            set("endpoint", json!(format!("{}:{}", address, port)));
            set("address", json!(address));
            set("port", json!(port));
            set("identifier", json!(identifier));
            set("id", json!(identifier));
        }
        ResourceKind::SsmParameter => {
            let path = name("name");
            set("arn", json!(format!("arn:aws:ssm:{region}:{account}:parameter{path}")));
            set("version", json!(1));
            set("id", json!(path));
        }
        ResourceKind::RandomPassword => {
            set("result", json!(generate_password(resolved)));
            set("id", json!("none"));
        }
        ResourceKind::S3Bucket => {
            let bucket = name("bucket");
            set("arn", json!(format!("arn:aws:s3:::{bucket}")));
            set("bucket_domain_name", json!(format!("{bucket}.s3.amazonaws.com")));
            set("id", json!(bucket));
        }
        ResourceKind::S3BucketLifecycleConfiguration | ResourceKind::S3BucketNotification => {
            set("id", json!(name("bucket")));
        }
        ResourceKind::SqsQueue => {
            let queue = name("name");
            let url = format!("https://sqs.{region}.amazonaws.com/{account}/{queue}");
            set("arn", json!(format!("arn:aws:sqs:{region}:{account}:{queue}")));
            set("url", json!(url));
            set("id", json!(url));
        }
        ResourceKind::SqsQueuePolicy => set("id", json!(name("queue_url"))),
        ResourceKind::DynamodbTable => {
            let table = name("name");
            let arn = format!("arn:aws:dynamodb:{region}:{account}:table/{table}");
            set(
                "stream_arn",
                json!(format!("{}/stream/{}", arn, Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f"))),
            );
            set("arn", json!(arn));
            set("id", json!(table));
        }
        ResourceKind::AppautoscalingTarget => {
            set(
                "arn",
                json!(format!(
                    "arn:aws:application-autoscaling:{region}:{account}:scalable-target/{:020x}",
                    rand::random::<u64>()
                )),
            );
            set("id", json!(name("resource_id")));
        }
        ResourceKind::AppautoscalingPolicy => {
            let policy = name("name");
            set(
                "arn",
                json!(format!(
                    "arn:aws:autoscaling:{region}:{account}:scalingPolicy:{:x}:resource/dynamodb/{}:policyName/{}",
                    rand::random::<u64>(),
                    name("resource_id"),
                    policy
                )),
            );
            set("id", json!(policy));
        }
    }

    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateManager;
    use tempfile::tempdir;
    use tierflow_core::{Stack, StackConfig};

    fn default_set() -> ResourceSet {
        let stack = Stack::new(StackConfig::default()).synthesize().unwrap();
        ResourceSet::from_stack(&stack)
    }

    fn engine(root: &Path, set: &ResourceSet) -> LocalEngine {
        LocalEngine::new(root, &set.stack, &set.region)
    }

    fn password_of(state: &GlobalState) -> String {
        state
            .resources
            .values()
            .find(|r| r.resource_type == "random_password")
            .and_then(|r| r.get_attribute::<String>("result"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_apply_then_plan_is_idempotent() {
        let dir = tempdir().unwrap();
        let set = default_set();
        let engine = engine(dir.path(), &set);

        let plan = engine.plan(&set, &PlanOptions::default()).await.unwrap();
        assert_eq!(plan.summary().create, 38);

        let result = engine.apply(&set, &plan).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.succeeded.len(), 38);
        let password = password_of(&engine.get_state().await.unwrap());

        let again = engine.plan(&set, &PlanOptions::default()).await.unwrap();
        assert!(!again.has_changes(), "{}", again.summary());
        assert_eq!(again.summary().no_change, 38);

        let result = engine.apply(&set, &again).await.unwrap();
        assert!(result.succeeded.is_empty());
        assert_eq!(password_of(&engine.get_state().await.unwrap()), password);
    }

    #[tokio::test]
    async fn test_references_resolve_to_dependency_attributes() {
        let dir = tempdir().unwrap();
        let set = default_set();
        let engine = engine(dir.path(), &set);

        let plan = engine.plan(&set, &PlanOptions::default()).await.unwrap();
        engine.apply(&set, &plan).await.unwrap();
        let state = engine.get_state().await.unwrap();

        let vpc = set.by_type("aws_vpc")[0];
        let vpc_id = state.get_resource(&vpc.id).unwrap().id.clone();
        assert!(vpc_id.starts_with("vpc-"));

        for subnet in set.by_type("aws_subnet") {
            let recorded = state.get_resource(&subnet.id).unwrap();
            assert_eq!(recorded.get_attribute::<String>("vpc_id"), Some(vpc_id.clone()));
        }

        let password = password_of(&state);
        let db = set.by_type("aws_db_instance")[0];
        let recorded = state.get_resource(&db.id).unwrap();
        assert_eq!(recorded.get_attribute::<String>("password"), Some(password.clone()));
        assert_eq!(password.chars().count(), 16);

        let endpoint: String = recorded.get_attribute("endpoint").unwrap();
        assert!(endpoint.ends_with(".us-west-2.rds.amazonaws.com:5432"));
    }

    #[tokio::test]
    async fn test_outputs_are_recorded() {
        let dir = tempdir().unwrap();
        let set = default_set();
        let engine = engine(dir.path(), &set);

        let plan = engine.plan(&set, &PlanOptions::default()).await.unwrap();
        engine.apply(&set, &plan).await.unwrap();

        let outputs = engine.outputs().await.unwrap();
        assert_eq!(outputs.len(), 17);
        let queue_url = outputs["sqs_queue_url"].as_str().unwrap();
        assert!(queue_url.starts_with("https://sqs.us-west-2.amazonaws.com/000000000000/"));
        assert!(outputs["vpc_id"].as_str().unwrap().starts_with("vpc-"));
    }

    #[tokio::test]
    async fn test_forced_password_replace_changes_result() {
        let dir = tempdir().unwrap();
        let set = default_set();
        let engine = engine(dir.path(), &set);

        let plan = engine.plan(&set, &PlanOptions::default()).await.unwrap();
        engine.apply(&set, &plan).await.unwrap();
        let before = password_of(&engine.get_state().await.unwrap());

        let address = set.by_type("random_password")[0].id.clone();
        let options = PlanOptions::default().with_replace(&address);
        let plan = engine.plan(&set, &options).await.unwrap();
        assert_eq!(plan.action_for(&address).unwrap().action_type, ActionType::Replace);

        // Resources reading the password are updated in place
        let db = set.by_type("aws_db_instance")[0];
        assert_eq!(plan.action_for(&db.id).unwrap().action_type, ActionType::Update);

        engine.apply(&set, &plan).await.unwrap();
        let state = engine.get_state().await.unwrap();
        let after = password_of(&state);
        assert_ne!(before, after);
        assert_eq!(
            state.get_resource(&db.id).unwrap().get_attribute::<String>("password"),
            Some(after)
        );
    }

    #[tokio::test]
    async fn test_sort_key_change_plans_replace() {
        let dir = tempdir().unwrap();
        let set = default_set();
        let engine = engine(dir.path(), &set);

        let plan = engine.plan(&set, &PlanOptions::default()).await.unwrap();
        engine.apply(&set, &plan).await.unwrap();

        let mut config = StackConfig::default();
        if let Some(table) = config.table.as_mut() {
            table.sort_key = "Version".to_string();
        }
        let changed = ResourceSet::from_stack(&Stack::new(config).synthesize().unwrap());

        let plan = engine.plan(&changed, &PlanOptions::default()).await.unwrap();
        let table = changed.by_type("aws_dynamodb_table")[0];
        let action = plan.action_for(&table.id).unwrap();
        assert_eq!(action.action_type, ActionType::Replace);
        assert!(action.description.contains("range_key"));
    }

    #[tokio::test]
    async fn test_destroy_removes_everything() {
        let dir = tempdir().unwrap();
        let set = default_set();
        let engine = engine(dir.path(), &set);

        let plan = engine.plan(&set, &PlanOptions::default()).await.unwrap();
        engine.apply(&set, &plan).await.unwrap();

        let destroy = engine.plan(&set, &PlanOptions::destroy()).await.unwrap();
        let order: Vec<&str> = destroy.actions.iter().map(|a| a.resource_id.as_str()).collect();
        let position = |id: &str| order.iter().position(|a| *a == id).unwrap();
        for resource in set.iter() {
            for dep in &resource.depends_on {
                assert!(position(&resource.id) < position(dep));
            }
        }

        let result = engine.destroy_all(&set).await.unwrap();
        assert_eq!(result.succeeded.len(), 38);
        let state = engine.get_state().await.unwrap();
        assert!(state.is_empty());
        assert!(state.outputs.is_empty());
    }

    #[tokio::test]
    async fn test_interrupted_apply_taints_dependents() {
        let dir = tempdir().unwrap();
        let set = default_set();
        let engine = engine(dir.path(), &set);

        let plan = engine.plan(&set, &PlanOptions::default()).await.unwrap();
        engine.apply(&set, &plan).await.unwrap();

        let password = set.by_type("random_password")[0].id.clone();
        let db = set.by_type("aws_db_instance")[0].id.clone();
        let options = PlanOptions::default().with_replace(&password);
        let plan = engine.plan(&set, &options).await.unwrap();
        assert_eq!(plan.action_for(&db).unwrap().action_type, ActionType::Update);

        // The instance reads an attribute the password never has, so its update fails
        let mut broken = set.clone();
        for resource in &mut broken.resources {
            if resource.id == db {
                resource.config["password"] = json!(format!("${{{}.missing}}", password));
            }
        }
        let result = engine.apply(&broken, &plan).await.unwrap();
        assert!(!result.is_success());
        assert_eq!(result.failed[0].action_id, format!("update-{}", db));
        assert!(
            result
                .succeeded
                .iter()
                .any(|r| r.action_id == format!("replace-{}", password))
        );

        let state = engine.get_state().await.unwrap();
        assert_eq!(state.get_resource(&db).unwrap().status, ResourceStatus::Tainted);
        assert_eq!(
            state.get_resource(&password).unwrap().status,
            ResourceStatus::Available
        );

        // With the original declarations the instance is replaced, not skipped
        let next = engine.plan(&set, &PlanOptions::default()).await.unwrap();
        assert_eq!(next.action_for(&db).unwrap().action_type, ActionType::Replace);
        assert_eq!(next.action_for(&password).unwrap().action_type, ActionType::NoOp);

        let result = engine.apply(&set, &next).await.unwrap();
        assert!(result.is_success());
        let state = engine.get_state().await.unwrap();
        assert_eq!(state.get_resource(&db).unwrap().status, ResourceStatus::Available);
        assert_eq!(
            state.get_resource(&db).unwrap().get_attribute::<String>("password"),
            Some(password_of(&state))
        );
    }

    #[tokio::test]
    async fn test_apply_fails_while_locked() {
        let dir = tempdir().unwrap();
        let set = default_set();
        let engine = engine(dir.path(), &set);

        let _lock = StateManager::new(dir.path(), &set.stack)
            .acquire_lock()
            .await
            .unwrap();
        let plan = engine.plan(&set, &PlanOptions::default()).await.unwrap();
        assert!(matches!(
            engine.apply(&set, &plan).await,
            Err(CloudError::LockError(_))
        ));
    }

    #[test]
    fn test_generated_password_honors_policy() {
        let mut resolved = Map::new();
        resolved.insert("length".to_string(), json!(40));
        resolved.insert("special".to_string(), json!(true));
        resolved.insert("override_special".to_string(), json!("#"));

        let password = generate_password(&resolved);
        assert_eq!(password.len(), 40);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric() || c == '#'));
    }
}
