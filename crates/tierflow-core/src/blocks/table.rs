//! KeyValueTable ブロック
//!
//! パーティションキーとソートキー（どちらも文字列）の複合キーを持つテーブルと、
//! 読み取り/書き込みそれぞれのオートスケーリングのターゲットとポリシーを宣言する。

use super::{Declarations, Scope};
use crate::error::{Result, StackError};
use crate::model::{
    AutoscalingConfig, Output, ResourceAddress, ResourceKind, ScalingDimension, TableConfig, Value,
};
use crate::validate::{Rule, Violation};
use std::collections::BTreeSet;

/// 1 つのスケーリング次元に対応するターゲットとポリシー
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingHandle {
    pub target: ResourceAddress,
    pub policy: ResourceAddress,
}

/// KeyValueTable ブロックが公開するハンドル
#[derive(Debug, Clone, PartialEq)]
pub struct TableHandle {
    pub table: ResourceAddress,
    pub scaling: Vec<ScalingHandle>,
}

/// KeyValueTable ブロックを宣言
pub fn key_value_table(scope: &Scope, config: &TableConfig) -> Result<(Declarations, TableHandle)> {
    if config.partition_key.is_empty() || config.sort_key.is_empty() {
        return Err(StackError::InvalidConfig(format!(
            "table {}: partition-key と sort-key は必須です",
            config.name
        )));
    }

    let mut seen = BTreeSet::new();
    let mut violations = Vec::new();
    for scaling in &config.autoscaling {
        if !seen.insert(scaling.dimension) {
            return Err(StackError::InvalidConfig(format!(
                "table {}: autoscaling \"{}\" が重複しています",
                config.name, scaling.dimension
            )));
        }
        violations.extend(check_scaling(scope, config, scaling));
    }
    if !violations.is_empty() {
        return Err(StackError::Validation(violations));
    }

    let mut decls = Declarations::new();

    let table = decls.add(
        scope
            .resource(ResourceKind::DynamodbTable, "table")
            .with("name", config.name.as_str())
            .with("billing_mode", "PROVISIONED")
            .with("read_capacity", config.read_capacity)
            .with("write_capacity", config.write_capacity)
            .with("hash_key", config.partition_key.as_str())
            .with("range_key", config.sort_key.as_str())
            .with(
                "attribute",
                Value::list([
                    Value::map([("name", config.partition_key.as_str()), ("type", "S")]),
                    Value::map([("name", config.sort_key.as_str()), ("type", "S")]),
                ]),
            ),
    );

    let scaling = config
        .autoscaling
        .iter()
        .map(|scaling| declare_scaling(&mut decls, scope, &table, scaling))
        .collect();

    decls.output(Output::new("dynamodb_table_name", table.attr("name")));
    decls.output(Output::new("dynamodb_table_arn", table.attr("arn")));

    Ok((decls, TableHandle { table, scaling }))
}

fn check_scaling(scope: &Scope, config: &TableConfig, scaling: &AutoscalingConfig) -> Vec<Violation> {
    let target = scope.name(&format!("{}_target", scaling.dimension));
    let mut violations = Vec::new();
    if scaling.min_capacity == 0 || scaling.min_capacity >= scaling.max_capacity {
        violations.push(Violation::new(
            Rule::Autoscaling,
            target.as_str(),
            format!(
                "0 < min < max である必要があります（min={}, max={}）",
                scaling.min_capacity, scaling.max_capacity
            ),
        ));
    }
    let capacity = match scaling.dimension {
        ScalingDimension::Read => config.read_capacity,
        ScalingDimension::Write => config.write_capacity,
    };
    if capacity < scaling.min_capacity || capacity > scaling.max_capacity {
        violations.push(Violation::new(
            Rule::Autoscaling,
            target.as_str(),
            format!(
                "{} ({}) がスケーリング範囲 [{}, {}] の外です",
                scaling.dimension.capacity_attribute(),
                capacity,
                scaling.min_capacity,
                scaling.max_capacity
            ),
        ));
    }
    if !(scaling.target_utilization > 0.0 && scaling.target_utilization <= 100.0) {
        violations.push(Violation::new(
            Rule::Autoscaling,
            scope.name(&format!("{}_policy", scaling.dimension)),
            format!(
                "目標使用率は (0, 100] の範囲で指定してください（{}）",
                scaling.target_utilization
            ),
        ));
    }
    violations
}

/// ターゲットと、そのターゲットの属性を参照するポリシーを宣言
fn declare_scaling(
    decls: &mut Declarations,
    scope: &Scope,
    table: &ResourceAddress,
    scaling: &AutoscalingConfig,
) -> ScalingHandle {
    let target = decls.add(
        scope
            .resource(
                ResourceKind::AppautoscalingTarget,
                &format!("{}_target", scaling.dimension),
            )
            .with("max_capacity", scaling.max_capacity)
            .with("min_capacity", scaling.min_capacity)
            .with(
                "resource_id",
                Value::concat([Value::from("table/"), Value::from(table.attr("name"))]),
            )
            .with("scalable_dimension", scaling.dimension.scalable_dimension())
            .with("service_namespace", "dynamodb"),
    );

    let metric = scaling.dimension.predefined_metric();
    let policy = decls.add(
        scope
            .resource(
                ResourceKind::AppautoscalingPolicy,
                &format!("{}_policy", scaling.dimension),
            )
            .with(
                "name",
                Value::concat([
                    Value::from(format!("{}:", metric)),
                    Value::from(target.attr("resource_id")),
                ]),
            )
            .with("policy_type", "TargetTrackingScaling")
            .with("resource_id", target.attr("resource_id"))
            .with("scalable_dimension", target.attr("scalable_dimension"))
            .with("service_namespace", target.attr("service_namespace"))
            .with(
                "target_tracking_scaling_policy_configuration",
                Value::map([
                    (
                        "predefined_metric_specification",
                        Value::map([("predefined_metric_type", metric)]),
                    ),
                    ("target_value", Value::from(scaling.target_utilization)),
                ]),
            ),
    );

    ScalingHandle { target, policy }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(config: &TableConfig) -> Result<(Declarations, TableHandle)> {
        key_value_table(&Scope::new("table"), config)
    }

    #[test]
    fn test_table_declarations() {
        let (decls, handle) = build(&TableConfig::default()).unwrap();
        assert_eq!(decls.count(ResourceKind::DynamodbTable), 1);
        assert_eq!(decls.count(ResourceKind::AppautoscalingTarget), 2);
        assert_eq!(decls.count(ResourceKind::AppautoscalingPolicy), 2);
        assert_eq!(handle.scaling.len(), 2);
        assert_eq!(decls.outputs.len(), 2);
    }

    #[test]
    fn test_compound_string_key() {
        let (decls, handle) = build(&TableConfig::default()).unwrap();
        let table = decls.find(&handle.table).unwrap();
        assert_eq!(table.get("hash_key").and_then(Value::as_str), Some("token"));
        assert_eq!(table.get("range_key").and_then(Value::as_str), Some("deviceid"));
        let attributes = table.get("attribute").and_then(Value::as_list).unwrap();
        assert_eq!(attributes.len(), 2);
        for attribute in attributes {
            assert_eq!(attribute.get("type").and_then(Value::as_str), Some("S"));
        }
    }

    #[test]
    fn test_policy_references_target() {
        let (decls, handle) = build(&TableConfig::default()).unwrap();
        for pair in &handle.scaling {
            let policy = decls.find(&pair.policy).unwrap();
            for key in ["resource_id", "scalable_dimension", "service_namespace"] {
                let reference = policy.get(key).and_then(Value::as_reference).unwrap();
                assert_eq!(reference.address, pair.target, "{}", key);
            }
        }
    }

    #[test]
    fn test_scaling_ranges() {
        let (decls, handle) = build(&TableConfig::default()).unwrap();
        let read = decls.find(&handle.scaling[0].target).unwrap();
        assert_eq!(read.get("min_capacity"), Some(&Value::Int(10)));
        assert_eq!(read.get("max_capacity"), Some(&Value::Int(100)));
        assert_eq!(
            read.get("scalable_dimension").and_then(Value::as_str),
            Some("dynamodb:table:ReadCapacityUnits")
        );

        let write = decls.find(&handle.scaling[1].target).unwrap();
        assert_eq!(write.get("min_capacity"), Some(&Value::Int(5)));
        assert_eq!(write.get("max_capacity"), Some(&Value::Int(25)));
    }

    #[test]
    fn test_invalid_scaling_rejected() {
        let mut config = TableConfig::default();
        config.autoscaling[0].min_capacity = 0;
        config.autoscaling[1].target_utilization = 120.0;
        match build(&config) {
            Err(StackError::Validation(violations)) => {
                assert_eq!(violations.len(), 2);
                assert!(violations.iter().all(|v| v.rule == Rule::Autoscaling));
            }
            other => panic!("expected validation error, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn test_capacity_outside_scaling_range() {
        let config = TableConfig {
            read_capacity: 5,
            write_capacity: 30,
            ..Default::default()
        };
        match build(&config) {
            Err(StackError::Validation(violations)) => {
                let resources: Vec<_> = violations.iter().map(|v| v.resource.as_str()).collect();
                assert_eq!(resources, vec!["table_read_target", "table_write_target"]);
                assert!(violations[0].message.contains("read_capacity (5)"));
                assert!(violations[1].message.contains("[5, 25]"));
            }
            other => panic!("expected validation error, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn test_capacity_on_range_bounds() {
        let config = TableConfig {
            read_capacity: 100,
            write_capacity: 5,
            ..Default::default()
        };
        assert!(build(&config).is_ok());
    }

    #[test]
    fn test_duplicate_dimension_rejected() {
        let mut config = TableConfig::default();
        config.autoscaling[1].dimension = ScalingDimension::Read;
        assert!(matches!(build(&config), Err(StackError::InvalidConfig(_))));
    }
}
