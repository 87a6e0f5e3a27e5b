//! Terraform engine implementation

use crate::error::{Result, TerraformError};
use crate::terraform::Terraform;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tierflow_cloud::state::STATE_DIR;
use tierflow_cloud::{
    Action, ActionType, ApplyResult, AuthStatus, Engine, GlobalState, Plan, PlanOptions,
    ResourceSet, ResourceState, ResourceStatus,
};

/// Engine that delegates provisioning to the terraform CLI
///
/// The synthesized document is written to `.tierflow/<stack>/terraform/`
/// and terraform keeps its own state there.
pub struct TerraformEngine {
    terraform: Terraform,
}

impl TerraformEngine {
    pub fn new(project_root: impl AsRef<Path>, stack: &str) -> Self {
        let workdir = project_root
            .as_ref()
            .join(STATE_DIR)
            .join(stack)
            .join("terraform");
        Self {
            terraform: Terraform::new(workdir),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.terraform = self.terraform.with_binary(binary);
        self
    }

    async fn prepare(&self, desired: &ResourceSet) -> Result<()> {
        self.terraform.write_document(&desired.document).await?;
        self.terraform.init().await
    }
}

#[async_trait]
impl Engine for TerraformEngine {
    fn name(&self) -> &str {
        "terraform"
    }

    fn display_name(&self) -> &str {
        "Terraform CLI"
    }

    async fn check_auth(&self) -> tierflow_cloud::Result<AuthStatus> {
        match self.terraform.version().await {
            Ok(version) => Ok(AuthStatus::ok(format!(
                "terraform {}",
                version.terraform_version
            ))),
            Err(TerraformError::TerraformNotFound) => {
                Ok(AuthStatus::failed("terraform がインストールされていません"))
            }
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn get_state(&self) -> tierflow_cloud::Result<GlobalState> {
        if !self.terraform.has_state() {
            return Ok(GlobalState::new());
        }
        let json = self.terraform.show_state().await?;
        Ok(state_from_show(&json)?)
    }

    async fn plan(
        &self,
        desired: &ResourceSet,
        options: &PlanOptions,
    ) -> tierflow_cloud::Result<Plan> {
        for address in &options.replace {
            if desired.get(address).is_none() {
                return Err(tierflow_cloud::CloudError::InvalidConfig(format!(
                    "Cannot replace unknown resource: {}",
                    address
                )));
            }
        }

        self.prepare(desired).await?;
        let has_changes = self
            .terraform
            .plan(&options.replace, options.destroy)
            .await?;
        tracing::debug!(has_changes, "terraform plan finished");

        let json = self.terraform.show_plan().await?;
        Ok(actions_from_plan(&json, desired)?)
    }

    async fn apply(&self, desired: &ResourceSet, plan: &Plan) -> tierflow_cloud::Result<ApplyResult> {
        let mut result = ApplyResult::new();
        if !plan.has_changes() {
            return Ok(result);
        }

        let start = std::time::Instant::now();
        if !self.terraform.has_plan() {
            return Err(TerraformError::StalePlan("no saved plan".into()).into());
        }

        // The saved plan is what terraform runs; refuse if it is not the plan being confirmed
        let saved = actions_from_plan(&self.terraform.show_plan().await?, desired)?;
        if !same_changes(&saved, plan) {
            return Err(TerraformError::StalePlan(format!(
                "saved plan has {}, confirmed plan has {}",
                saved.summary(),
                plan.summary()
            ))
            .into());
        }

        match self.terraform.apply_plan().await {
            Ok(()) => {
                for action in plan.changes() {
                    result.add_success(action.id.clone(), action.description.clone());
                }
            }
            Err(e) => result.add_failure("apply".to_string(), e.to_string()),
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn destroy_all(&self, desired: &ResourceSet) -> tierflow_cloud::Result<ApplyResult> {
        let mut result = ApplyResult::new();
        let start = std::time::Instant::now();

        let recorded = self.get_state().await?;
        self.prepare(desired).await?;

        match self.terraform.destroy().await {
            Ok(()) => {
                for address in recorded.resources.keys() {
                    result.add_success(
                        format!("delete-{}", address),
                        format!("{} を削除しました", address),
                    );
                }
            }
            Err(e) => result.add_failure("destroy".to_string(), e.to_string()),
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    async fn outputs(&self) -> tierflow_cloud::Result<BTreeMap<String, Value>> {
        if !self.terraform.has_state() {
            return Ok(BTreeMap::new());
        }
        let outputs = self.terraform.output().await?;
        Ok(outputs.into_iter().map(|(k, v)| (k, v.value)).collect())
    }
}

/// Whether two plans change the same resources in the same way
pub fn same_changes(a: &Plan, b: &Plan) -> bool {
    let changes = |plan: &Plan| {
        let mut changes: Vec<(String, ActionType)> = plan
            .changes()
            .map(|action| (action.resource_id.clone(), action.action_type))
            .collect();
        changes.sort_by(|x, y| x.0.cmp(&y.0));
        changes
    };
    changes(a) == changes(b)
}

/// Convert `terraform show -json <plan>` into a plan
///
/// Deletions come first, then the remaining actions in the dependency order
/// of `desired`.
pub fn actions_from_plan(json: &Value, desired: &ResourceSet) -> Result<Plan> {
    let Some(changes) = json.get("resource_changes") else {
        return Ok(Plan::empty());
    };
    let changes = changes
        .as_array()
        .ok_or_else(|| TerraformError::InvalidPlan("resource_changes is not an array".into()))?;

    let mut actions: Vec<(usize, Action)> = Vec::new();
    for change in changes {
        let address = change
            .get("address")
            .and_then(Value::as_str)
            .ok_or_else(|| TerraformError::InvalidPlan("resource change without address".into()))?;
        let resource_type = change.get("type").and_then(Value::as_str).unwrap_or_default();
        let verbs: Vec<&str> = change
            .pointer("/change/actions")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let action_type = match verbs.as_slice() {
            ["create"] => ActionType::Create,
            ["update"] => ActionType::Update,
            ["delete"] => ActionType::Delete,
            ["delete", "create"] | ["create", "delete"] => ActionType::Replace,
            ["no-op"] | ["read"] => ActionType::NoOp,
            other => {
                return Err(TerraformError::InvalidPlan(format!(
                    "{}: unknown actions {:?}",
                    address, other
                )));
            }
        };

        let position = match action_type {
            ActionType::Delete => 0,
            _ => desired
                .iter()
                .position(|r| r.id == address)
                .map(|p| p + 1)
                .unwrap_or(usize::MAX),
        };

        let mut action = Action::new(
            action_type,
            resource_type,
            address,
            format!("{} {}", action_type, address),
        );
        if let Some(reasons) = change.get("action_reason") {
            action = action.with_detail("reason", reasons.clone());
        }
        actions.push((position, action));
    }

    actions.sort_by_key(|(position, _)| *position);
    Ok(Plan::new(actions.into_iter().map(|(_, a)| a).collect()))
}

/// Convert `terraform show -json` of the current state into recorded state
pub fn state_from_show(json: &Value) -> Result<GlobalState> {
    let mut state = GlobalState::new();
    let Some(resources) = json.pointer("/values/root_module/resources") else {
        return Ok(state);
    };
    let resources = resources
        .as_array()
        .ok_or_else(|| TerraformError::InvalidState("resources is not an array".into()))?;

    for resource in resources {
        let address = resource
            .get("address")
            .and_then(Value::as_str)
            .ok_or_else(|| TerraformError::InvalidState("resource without address".into()))?;
        let resource_type = resource.get("type").and_then(Value::as_str).unwrap_or_default();
        let values = resource
            .get("values")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let id = values
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(address)
            .to_string();
        let depends_on: Vec<String> = resource
            .get("depends_on")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        let mut recorded = ResourceState::new(id, resource_type)
            .with_status(ResourceStatus::Available)
            .with_depends_on(depends_on);
        recorded.attributes = values.into_iter().collect();
        state.set_resource(address.to_string(), recorded);
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tierflow_cloud::ResourceConfig;

    fn desired() -> ResourceSet {
        let mut set = ResourceSet::new("demo", "us-west-2");
        set.add(ResourceConfig::new("aws_vpc", "main"));
        set.add(ResourceConfig::new("aws_subnet", "a").depends_on("aws_vpc.main"));
        set
    }

    #[test]
    fn test_actions_from_plan() {
        let plan_json = json!({
            "format_version": "1.2",
            "resource_changes": [
                {"address": "aws_subnet.a", "type": "aws_subnet",
                 "change": {"actions": ["delete", "create"]},
                 "action_reason": "replace_because_cannot_update"},
                {"address": "aws_vpc.main", "type": "aws_vpc",
                 "change": {"actions": ["update"]}},
                {"address": "aws_eip.old", "type": "aws_eip",
                 "change": {"actions": ["delete"]}}
            ]
        });

        let plan = actions_from_plan(&plan_json, &desired()).unwrap();
        let order: Vec<(&str, ActionType)> = plan
            .actions
            .iter()
            .map(|a| (a.resource_id.as_str(), a.action_type))
            .collect();
        assert_eq!(
            order,
            vec![
                ("aws_eip.old", ActionType::Delete),
                ("aws_vpc.main", ActionType::Update),
                ("aws_subnet.a", ActionType::Replace),
            ]
        );
        assert_eq!(
            plan.summary().to_string(),
            "0 to create, 1 to update, 1 to replace, 1 to delete, 0 unchanged"
        );
    }

    #[test]
    fn test_noop_plan() {
        let plan_json = json!({
            "resource_changes": [
                {"address": "aws_vpc.main", "type": "aws_vpc", "change": {"actions": ["no-op"]}}
            ]
        });
        let plan = actions_from_plan(&plan_json, &desired()).unwrap();
        assert!(!plan.has_changes());
    }

    #[test]
    fn test_plan_without_changes_key() {
        let plan = actions_from_plan(&json!({"format_version": "1.2"}), &desired()).unwrap();
        assert!(plan.actions.is_empty());
    }

    #[test]
    fn test_unknown_action_is_error() {
        let plan_json = json!({
            "resource_changes": [
                {"address": "aws_vpc.main", "type": "aws_vpc", "change": {"actions": ["forget"]}}
            ]
        });
        assert!(matches!(
            actions_from_plan(&plan_json, &desired()),
            Err(TerraformError::InvalidPlan(_))
        ));
    }

    #[test]
    fn test_same_changes_ignores_order_and_noops() {
        let saved = Plan::new(vec![
            Action::new(ActionType::Create, "aws_vpc", "aws_vpc.main", ""),
            Action::new(ActionType::Replace, "aws_subnet", "aws_subnet.a", ""),
        ]);
        let confirmed = Plan::new(vec![
            Action::new(ActionType::Replace, "aws_subnet", "aws_subnet.a", "replace"),
            Action::new(ActionType::NoOp, "aws_eip", "aws_eip.nat", ""),
            Action::new(ActionType::Create, "aws_vpc", "aws_vpc.main", "create"),
        ]);
        assert!(same_changes(&saved, &confirmed));

        let drifted = Plan::new(vec![
            Action::new(ActionType::Create, "aws_vpc", "aws_vpc.main", ""),
            Action::new(ActionType::Update, "aws_subnet", "aws_subnet.a", ""),
        ]);
        assert!(!same_changes(&saved, &drifted));
    }

    #[tokio::test]
    async fn test_apply_requires_saved_plan() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TerraformEngine::new(dir.path(), "demo");
        let plan = Plan::new(vec![Action::new(
            ActionType::Create,
            "aws_vpc",
            "aws_vpc.main",
            "",
        )]);

        let err = engine.apply(&desired(), &plan).await.unwrap_err();
        assert!(err.to_string().contains("no saved plan"), "{}", err);
    }

    #[tokio::test]
    async fn test_apply_without_changes_skips_terraform() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TerraformEngine::new(dir.path(), "demo");
        let result = engine.apply(&desired(), &Plan::empty()).await.unwrap();
        assert!(result.is_success());
        assert!(result.succeeded.is_empty());
    }

    #[test]
    fn test_state_from_show() {
        let show = json!({
            "values": {"root_module": {"resources": [
                {"address": "aws_vpc.main", "type": "aws_vpc", "name": "main",
                 "values": {"id": "vpc-0abc", "cidr_block": "15.32.0.0/16"}},
                {"address": "aws_subnet.a", "type": "aws_subnet", "name": "a",
                 "values": {"id": "subnet-0def", "vpc_id": "vpc-0abc"},
                 "depends_on": ["aws_vpc.main"]}
            ]}}
        });

        let state = state_from_show(&show).unwrap();
        assert_eq!(state.resources.len(), 2);
        assert_eq!(state.get_resource("aws_vpc.main").unwrap().id, "vpc-0abc");
        assert_eq!(
            state.attribute("aws_subnet.a", "vpc_id"),
            Some(&json!("vpc-0abc"))
        );
        assert_eq!(
            state.get_resource("aws_subnet.a").unwrap().depends_on,
            vec!["aws_vpc.main".to_string()]
        );
    }

    #[test]
    fn test_empty_show_is_empty_state() {
        let state = state_from_show(&json!({"format_version": "1.0"})).unwrap();
        assert!(state.is_empty());
    }
}
