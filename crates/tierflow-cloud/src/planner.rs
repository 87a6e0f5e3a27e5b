//! Diffing desired resources against recorded state

use crate::action::{Action, ActionType, Plan};
use crate::engine::{ResourceConfig, ResourceSet};
use crate::error::{CloudError, Result};
use crate::interpolate;
use crate::state::{GlobalState, ResourceState, ResourceStatus};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};

/// Options that alter how a plan is computed
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Resource addresses to destroy and recreate even when unchanged
    pub replace: Vec<String>,

    /// Plan the destruction of every recorded resource
    pub destroy: bool,
}

impl PlanOptions {
    pub fn destroy() -> Self {
        Self {
            destroy: true,
            ..Default::default()
        }
    }

    pub fn with_replace(mut self, address: impl Into<String>) -> Self {
        self.replace.push(address.into());
        self
    }
}

/// Compute the actions that turn `state` into `desired`
///
/// Deletions of resources no longer declared come first, dependents before
/// their dependencies. The remaining actions follow the dependency order of
/// `desired`. Configs are compared before reference resolution, so applying
/// a plan and planning again yields no changes.
pub fn diff(desired: &ResourceSet, state: &GlobalState, options: &PlanOptions) -> Result<Plan> {
    for address in &options.replace {
        if desired.get(address).is_none() {
            return Err(CloudError::InvalidConfig(format!(
                "Cannot replace unknown resource: {}",
                address
            )));
        }
    }

    if options.destroy {
        let all: BTreeSet<&str> = state.resources.keys().map(String::as_str).collect();
        let actions = deletion_order(state, &all)
            .into_iter()
            .filter_map(|address| state.get_resource(address).map(|r| delete_action(address, r)))
            .collect();
        return Ok(Plan::new(actions));
    }

    let mut actions = Vec::new();

    let orphans: BTreeSet<&str> = state
        .resources
        .keys()
        .map(String::as_str)
        .filter(|address| desired.get(address).is_none())
        .collect();
    for address in deletion_order(state, &orphans) {
        if let Some(recorded) = state.get_resource(address) {
            actions.push(delete_action(address, recorded));
        }
    }

    // Created or replaced resources get new IDs, so references to them change too
    let mut renewed: BTreeSet<String> = BTreeSet::new();

    for resource in desired.iter() {
        let action = match state.get_resource(&resource.id) {
            None => {
                renewed.insert(resource.id.clone());
                Action::new(
                    ActionType::Create,
                    &resource.resource_type,
                    &resource.id,
                    format!("Create {}", resource.id),
                )
            }
            Some(recorded) => {
                let changed = changed_keys(&resource.config, &recorded.config);
                let forced = options.replace.contains(&resource.id);
                let tainted = recorded.status == ResourceStatus::Tainted;
                let replace_keys: Vec<&String> = resource
                    .force_new
                    .iter()
                    .filter(|key| {
                        changed.contains(*key)
                            || references_renewed(resource.config.get(key.as_str()), &renewed)
                    })
                    .collect();

                let action = if forced || tainted || !replace_keys.is_empty() {
                    renewed.insert(resource.id.clone());
                    let reason = if forced {
                        "replacement requested".to_string()
                    } else if tainted {
                        "tainted by an interrupted apply".to_string()
                    } else {
                        format!(
                            "{} forces replacement",
                            replace_keys
                                .iter()
                                .map(|k| k.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        )
                    };
                    Action::new(
                        ActionType::Replace,
                        &resource.resource_type,
                        &resource.id,
                        format!("Replace {} ({})", resource.id, reason),
                    )
                } else if !changed.is_empty() || references_renewed(Some(&resource.config), &renewed)
                {
                    Action::new(
                        ActionType::Update,
                        &resource.resource_type,
                        &resource.id,
                        format!("Update {} in place", resource.id),
                    )
                } else {
                    Action::new(
                        ActionType::NoOp,
                        &resource.resource_type,
                        &resource.id,
                        format!("{} is up to date", resource.id),
                    )
                };
                action.with_detail("changed", json!(changed.iter().collect::<Vec<_>>()))
            }
        };

        actions.push(with_dependencies(action, resource));
    }

    Ok(Plan::new(actions))
}

fn with_dependencies(action: Action, resource: &ResourceConfig) -> Action {
    if resource.depends_on.is_empty() {
        action
    } else {
        action.with_detail("depends_on", json!(resource.depends_on))
    }
}

fn delete_action(address: &str, recorded: &ResourceState) -> Action {
    Action::new(
        ActionType::Delete,
        &recorded.resource_type,
        address,
        format!("Delete {}", address),
    )
}

/// Top-level keys whose value differs between two configs
fn changed_keys(desired: &Value, recorded: &Value) -> BTreeSet<String> {
    let empty = serde_json::Map::new();
    let desired = desired.as_object().unwrap_or(&empty);
    let recorded = recorded.as_object().unwrap_or(&empty);

    desired
        .keys()
        .chain(recorded.keys())
        .filter(|key| desired.get(*key) != recorded.get(*key))
        .cloned()
        .collect()
}

fn references_renewed(value: Option<&Value>, renewed: &BTreeSet<String>) -> bool {
    value.is_some_and(|v| {
        interpolate::references(v)
            .iter()
            .any(|r| renewed.contains(&r.address))
    })
}

/// Order `subset` so that every resource comes before the resources it
/// depends on, using the dependencies recorded in state
pub(crate) fn deletion_order<'a>(state: &'a GlobalState, subset: &BTreeSet<&'a str>) -> Vec<&'a str> {
    let mut dependents: BTreeMap<&str, usize> = subset.iter().map(|a| (*a, 0)).collect();
    for address in subset {
        if let Some(recorded) = state.get_resource(address) {
            for dep in &recorded.depends_on {
                if let Some(count) = dependents.get_mut(dep.as_str()) {
                    *count += 1;
                }
            }
        }
    }

    let mut order = Vec::with_capacity(subset.len());
    let mut remaining: BTreeSet<&str> = subset.clone();
    while !remaining.is_empty() {
        let ready: Vec<&str> = remaining
            .iter()
            .rev()
            .copied()
            .filter(|a| dependents.get(a) == Some(&0))
            .collect();

        if ready.is_empty() {
            tracing::warn!(
                "Recorded dependencies contain a cycle; deleting remaining resources as recorded"
            );
            order.extend(remaining.iter().rev().copied());
            break;
        }

        for address in ready {
            remaining.remove(address);
            order.push(address);
            if let Some(recorded) = state.get_resource(address) {
                for dep in &recorded.depends_on {
                    if let Some(count) = dependents.get_mut(dep.as_str()) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired() -> ResourceSet {
        let mut set = ResourceSet::new("demo", "us-west-2");
        set.add(
            ResourceConfig::new("aws_vpc", "main")
                .with_config("cidr_block", json!("10.0.0.0/16"))
                .with_config("tags", json!({"Name": "main"}))
                .force_new("cidr_block"),
        );
        set.add(
            ResourceConfig::new("aws_subnet", "a")
                .with_config("vpc_id", json!("${aws_vpc.main.id}"))
                .with_config("cidr_block", json!("10.0.1.0/24"))
                .depends_on("aws_vpc.main")
                .force_new("vpc_id")
                .force_new("cidr_block"),
        );
        set.add(
            ResourceConfig::new("aws_route_table", "rt")
                .with_config("tags", json!({"Subnet": "${aws_subnet.a.id}"}))
                .depends_on("aws_subnet.a"),
        );
        set
    }

    fn recorded(set: &ResourceSet) -> GlobalState {
        let mut state = GlobalState::new();
        for r in set.iter() {
            state.set_resource(
                r.id.clone(),
                ResourceState::new(format!("id-{}", r.name()), &r.resource_type)
                    .with_status(ResourceStatus::Available)
                    .with_config(r.config.clone())
                    .with_depends_on(r.depends_on.clone()),
            );
        }
        state
    }

    fn kinds(plan: &Plan) -> Vec<(String, ActionType)> {
        plan.actions
            .iter()
            .map(|a| (a.resource_id.clone(), a.action_type))
            .collect()
    }

    #[test]
    fn test_empty_state_creates_everything_in_order() {
        let plan = diff(&desired(), &GlobalState::new(), &PlanOptions::default()).unwrap();
        assert_eq!(
            kinds(&plan),
            vec![
                ("aws_vpc.main".to_string(), ActionType::Create),
                ("aws_subnet.a".to_string(), ActionType::Create),
                ("aws_route_table.rt".to_string(), ActionType::Create),
            ]
        );
    }

    #[test]
    fn test_unchanged_state_is_noop() {
        let set = desired();
        let plan = diff(&set, &recorded(&set), &PlanOptions::default()).unwrap();
        assert!(!plan.has_changes());
        assert_eq!(plan.summary().no_change, 3);
    }

    #[test]
    fn test_tag_change_is_update() {
        let set = desired();
        let state = recorded(&set);
        let mut changed = set.clone();
        changed.resources[0] = changed.resources[0]
            .clone()
            .with_config("tags", json!({"Name": "renamed"}));

        let plan = diff(&changed, &state, &PlanOptions::default()).unwrap();
        let vpc = plan.action_for("aws_vpc.main").unwrap();
        assert_eq!(vpc.action_type, ActionType::Update);
        assert_eq!(vpc.details["changed"], json!(["tags"]));
        assert_eq!(plan.summary().no_change, 2);
    }

    #[test]
    fn test_replacement_cascades_to_dependents() {
        let set = desired();
        let state = recorded(&set);
        let mut changed = set.clone();
        changed.resources[0] = changed.resources[0]
            .clone()
            .with_config("cidr_block", json!("10.1.0.0/16"));

        let plan = diff(&changed, &state, &PlanOptions::default()).unwrap();
        assert_eq!(
            kinds(&plan),
            vec![
                ("aws_vpc.main".to_string(), ActionType::Replace),
                ("aws_subnet.a".to_string(), ActionType::Replace),
                ("aws_route_table.rt".to_string(), ActionType::Update),
            ]
        );
        assert!(plan.actions[0].description.contains("cidr_block"));
    }

    #[test]
    fn test_forced_replace() {
        let set = desired();
        let options = PlanOptions::default().with_replace("aws_route_table.rt");
        let plan = diff(&set, &recorded(&set), &options).unwrap();
        assert_eq!(
            plan.action_for("aws_route_table.rt").unwrap().action_type,
            ActionType::Replace
        );
        assert_eq!(plan.summary().replace, 1);
    }

    #[test]
    fn test_tainted_resource_is_replaced() {
        let set = desired();
        let mut state = recorded(&set);
        if let Some(subnet) = state.resources.get_mut("aws_subnet.a") {
            subnet.status = ResourceStatus::Tainted;
        }

        let plan = diff(&set, &state, &PlanOptions::default()).unwrap();
        assert_eq!(
            kinds(&plan),
            vec![
                ("aws_vpc.main".to_string(), ActionType::NoOp),
                ("aws_subnet.a".to_string(), ActionType::Replace),
                ("aws_route_table.rt".to_string(), ActionType::Update),
            ]
        );
        assert!(
            plan.action_for("aws_subnet.a")
                .unwrap()
                .description
                .contains("tainted")
        );
    }

    #[test]
    fn test_replace_unknown_resource_is_error() {
        let options = PlanOptions::default().with_replace("aws_vpc.missing");
        assert!(matches!(
            diff(&desired(), &GlobalState::new(), &options),
            Err(CloudError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_removed_resources_are_deleted_first() {
        let set = desired();
        let state = recorded(&set);
        let mut shrunk = ResourceSet::new("demo", "us-west-2");
        shrunk.add(set.resources[0].clone());

        let plan = diff(&shrunk, &state, &PlanOptions::default()).unwrap();
        assert_eq!(
            kinds(&plan),
            vec![
                ("aws_route_table.rt".to_string(), ActionType::Delete),
                ("aws_subnet.a".to_string(), ActionType::Delete),
                ("aws_vpc.main".to_string(), ActionType::NoOp),
            ]
        );
    }

    #[test]
    fn test_destroy_reverses_dependencies() {
        let set = desired();
        let plan = diff(&set, &recorded(&set), &PlanOptions::destroy()).unwrap();
        assert_eq!(
            plan.actions
                .iter()
                .map(|a| a.resource_id.as_str())
                .collect::<Vec<_>>(),
            vec!["aws_route_table.rt", "aws_subnet.a", "aws_vpc.main"]
        );
        assert_eq!(plan.summary().delete, 3);
    }

    #[test]
    fn test_destroy_with_empty_state() {
        let plan = diff(&desired(), &GlobalState::new(), &PlanOptions::destroy()).unwrap();
        assert!(!plan.has_changes());
    }
}
