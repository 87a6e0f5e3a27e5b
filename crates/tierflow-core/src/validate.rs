//! グラフ全体の検証
//!
//! スタックファイルの内容に関係なく成り立つべきトポロジー上の規則を検査する。
//! 違反は最初の 1 件で止めずにすべて集める。

use crate::graph::ResourceGraph;
use crate::model::{Ipv4Cidr, Resource, ResourceAddress, ResourceKind, ScalingDimension, Value};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// 検証規則
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rule {
    /// サブネット CIDR は VPC の範囲内で互いに重ならない
    SubnetCidr,
    /// ルートテーブルごとにデフォルトルートは 1 つ、階層に応じた宛先
    DefaultRoute,
    /// サブネットはちょうど 1 つのルートテーブルに関連付く
    RouteTableAssociation,
    /// ゲートウェイエンドポイントは VPC のすべてのルートテーブルに付く
    EndpointRouteTables,
    /// サブネットグループは単一 VPC、マルチ AZ なら 2 AZ 以上
    SubnetGroup,
    /// 移行日数 < 失効日数
    Lifecycle,
    /// 0 < min < max、テーブル容量は [min, max] 内、目標値は (0, 100]
    Autoscaling,
    /// キュー通知には送信元 ARN で絞ったキューポリシーが必要
    NotificationPolicy,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::SubnetCidr => "subnet-cidr",
            Rule::DefaultRoute => "default-route",
            Rule::RouteTableAssociation => "route-table-association",
            Rule::EndpointRouteTables => "endpoint-route-tables",
            Rule::SubnetGroup => "subnet-group",
            Rule::Lifecycle => "lifecycle",
            Rule::Autoscaling => "autoscaling",
            Rule::NotificationPolicy => "notification-policy",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 規則違反
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub rule: Rule,
    /// 違反したリソース
    pub resource: String,
    pub message: String,
}

impl Violation {
    pub fn new(rule: Rule, resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule,
            resource: resource.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.rule, self.resource, self.message)
    }
}

/// すべての規則でグラフを検証
pub fn validate(graph: &ResourceGraph) -> Vec<Violation> {
    let mut violations = Vec::new();
    check_subnet_cidrs(graph, &mut violations);
    check_default_routes(graph, &mut violations);
    check_route_table_associations(graph, &mut violations);
    check_endpoint_route_tables(graph, &mut violations);
    check_subnet_groups(graph, &mut violations);
    check_lifecycles(graph, &mut violations);
    check_autoscaling(graph, &mut violations);
    check_notification_policies(graph, &mut violations);

    tracing::debug!(violations = violations.len(), "Validated resource graph");
    violations
}

/// 属性が参照ならその参照先アドレス
fn ref_target<'a>(resource: &'a Resource, key: &str) -> Option<&'a ResourceAddress> {
    resource
        .get(key)
        .and_then(Value::as_reference)
        .map(|r| &r.address)
}

fn cidr_of(resource: &Resource) -> Option<Ipv4Cidr> {
    resource
        .get("cidr_block")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

fn int_of(value: Option<&Value>) -> Option<i64> {
    value.and_then(Value::as_i64)
}

/// 規則 1: サブネット CIDR
fn check_subnet_cidrs(graph: &ResourceGraph, violations: &mut Vec<Violation>) {
    let mut by_vpc: BTreeMap<&ResourceAddress, Vec<(&Resource, Ipv4Cidr)>> = BTreeMap::new();

    for subnet in graph.by_kind(ResourceKind::Subnet) {
        let Some(cidr) = cidr_of(subnet) else {
            violations.push(Violation::new(
                Rule::SubnetCidr,
                subnet.address.to_string(),
                "cidr_block が有効な IPv4 CIDR ではありません",
            ));
            continue;
        };
        let Some(vpc_address) = ref_target(subnet, "vpc_id") else {
            violations.push(Violation::new(
                Rule::SubnetCidr,
                subnet.address.to_string(),
                "vpc_id が VPC への参照ではありません",
            ));
            continue;
        };

        if let Some(vpc_cidr) = graph.get(vpc_address).and_then(cidr_of) {
            let inside = if cidr.prefix() > vpc_cidr.prefix() {
                vpc_cidr.strictly_contains(&cidr)
            } else {
                vpc_cidr.contains(&cidr)
            };
            if !inside {
                violations.push(Violation::new(
                    Rule::SubnetCidr,
                    subnet.address.to_string(),
                    format!("{} は VPC の範囲 {} に含まれません", cidr, vpc_cidr),
                ));
            }
        }
        by_vpc.entry(vpc_address).or_default().push((subnet, cidr));
    }

    for subnets in by_vpc.values() {
        for (i, (a, a_cidr)) in subnets.iter().enumerate() {
            for (b, b_cidr) in &subnets[i + 1..] {
                if a_cidr.overlaps(b_cidr) {
                    violations.push(Violation::new(
                        Rule::SubnetCidr,
                        b.address.to_string(),
                        format!("{} は {} ({}) と重なっています", b_cidr, a.address, a_cidr),
                    ));
                }
            }
        }
    }
}

/// ルートテーブルに関連付いたサブネット
fn associated_subnets<'a>(
    graph: &'a ResourceGraph,
    route_table: &ResourceAddress,
) -> Vec<&'a Resource> {
    graph
        .by_kind(ResourceKind::RouteTableAssociation)
        .into_iter()
        .filter(|a| ref_target(a, "route_table_id") == Some(route_table))
        .filter_map(|a| ref_target(a, "subnet_id").and_then(|s| graph.get(s)))
        .collect()
}

/// 規則 2: デフォルトルート
fn check_default_routes(graph: &ResourceGraph, violations: &mut Vec<Violation>) {
    let any = Ipv4Cidr::any().to_string();

    for table in graph.by_kind(ResourceKind::RouteTable) {
        let defaults: Vec<&Resource> = graph
            .by_kind(ResourceKind::Route)
            .into_iter()
            .filter(|r| ref_target(r, "route_table_id") == Some(&table.address))
            .filter(|r| r.get("destination_cidr_block").and_then(Value::as_str) == Some(any.as_str()))
            .collect();

        if defaults.len() != 1 {
            violations.push(Violation::new(
                Rule::DefaultRoute,
                table.address.to_string(),
                format!("0.0.0.0/0 のルートが {} 件あります（1 件である必要があります）", defaults.len()),
            ));
            continue;
        }

        let route = defaults[0];
        let via_igw = ref_target(route, "gateway_id")
            .is_some_and(|a| a.kind == ResourceKind::InternetGateway);
        let via_nat = ref_target(route, "nat_gateway_id")
            .is_some_and(|a| a.kind == ResourceKind::NatGateway);

        let subnets = associated_subnets(graph, &table.address);
        let public = subnets
            .iter()
            .any(|s| s.get("map_public_ip_on_launch").and_then(Value::as_bool) == Some(true));
        let private = subnets
            .iter()
            .any(|s| s.get("map_public_ip_on_launch").and_then(Value::as_bool) != Some(true));

        if public && !via_igw {
            violations.push(Violation::new(
                Rule::DefaultRoute,
                table.address.to_string(),
                "パブリックサブネットのデフォルトルートはインターネットゲートウェイ宛てである必要があります",
            ));
        }
        if private && !via_nat {
            violations.push(Violation::new(
                Rule::DefaultRoute,
                table.address.to_string(),
                "プライベートサブネットのデフォルトルートは NAT ゲートウェイ宛てである必要があります",
            ));
        }
    }
}

/// 規則 3: ルートテーブル関連付け
fn check_route_table_associations(graph: &ResourceGraph, violations: &mut Vec<Violation>) {
    let associations = graph.by_kind(ResourceKind::RouteTableAssociation);
    for subnet in graph.by_kind(ResourceKind::Subnet) {
        let count = associations
            .iter()
            .filter(|a| ref_target(a, "subnet_id") == Some(&subnet.address))
            .count();
        if count != 1 {
            violations.push(Violation::new(
                Rule::RouteTableAssociation,
                subnet.address.to_string(),
                format!("ルートテーブルとの関連付けが {} 件あります（1 件である必要があります）", count),
            ));
        }
    }
}

/// 規則 4: ゲートウェイエンドポイント
fn check_endpoint_route_tables(graph: &ResourceGraph, violations: &mut Vec<Violation>) {
    for endpoint in graph.by_kind(ResourceKind::VpcEndpoint) {
        if endpoint.get("vpc_endpoint_type").and_then(Value::as_str) != Some("Gateway") {
            continue;
        }
        let Some(vpc) = ref_target(endpoint, "vpc_id") else {
            continue;
        };

        let attached: BTreeSet<&ResourceAddress> = endpoint
            .get("route_table_ids")
            .and_then(Value::as_list)
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_reference)
            .map(|r| &r.address)
            .collect();

        for table in graph.by_kind(ResourceKind::RouteTable) {
            if ref_target(table, "vpc_id") == Some(vpc) && !attached.contains(&table.address) {
                violations.push(Violation::new(
                    Rule::EndpointRouteTables,
                    endpoint.address.to_string(),
                    format!("ルートテーブル {} に関連付けられていません", table.address),
                ));
            }
        }
    }
}

/// 規則 5: DB サブネットグループ
fn check_subnet_groups(graph: &ResourceGraph, violations: &mut Vec<Violation>) {
    let mut zones: BTreeMap<&ResourceAddress, BTreeSet<&str>> = BTreeMap::new();

    for group in graph.by_kind(ResourceKind::DbSubnetGroup) {
        let subnets: Vec<&Resource> = group
            .get("subnet_ids")
            .and_then(Value::as_list)
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_reference)
            .filter_map(|r| graph.get(&r.address))
            .collect();

        let vpcs: BTreeSet<_> = subnets.iter().filter_map(|s| ref_target(s, "vpc_id")).collect();
        if vpcs.len() > 1 {
            violations.push(Violation::new(
                Rule::SubnetGroup,
                group.address.to_string(),
                format!("サブネットが {} 個の VPC にまたがっています", vpcs.len()),
            ));
        }

        zones.insert(
            &group.address,
            subnets
                .iter()
                .filter_map(|s| s.get("availability_zone").and_then(Value::as_str))
                .collect(),
        );
    }

    for instance in graph.by_kind(ResourceKind::DbInstance) {
        if instance.get("multi_az").and_then(Value::as_bool) != Some(true) {
            continue;
        }
        let Some(group) = ref_target(instance, "db_subnet_group_name") else {
            continue;
        };
        let count = zones.get(group).map_or(0, BTreeSet::len);
        if count < 2 {
            violations.push(Violation::new(
                Rule::SubnetGroup,
                instance.address.to_string(),
                format!("マルチ AZ インスタンスのサブネットグループが {} AZ にしかありません", count),
            ));
        }
    }
}

/// 規則 6: ライフサイクル
fn check_lifecycles(graph: &ResourceGraph, violations: &mut Vec<Violation>) {
    for lifecycle in graph.by_kind(ResourceKind::S3BucketLifecycleConfiguration) {
        let rules = lifecycle
            .get("rule")
            .and_then(Value::as_list)
            .unwrap_or_default();
        for rule in rules {
            let Some(expiration) = int_of(rule.get("expiration").and_then(|e| e.get("days")))
            else {
                continue;
            };
            let transitions = rule
                .get("transition")
                .and_then(Value::as_list)
                .unwrap_or_default();
            for transition in transitions {
                if let Some(days) = int_of(transition.get("days"))
                    && days >= expiration
                {
                    violations.push(Violation::new(
                        Rule::Lifecycle,
                        lifecycle.address.to_string(),
                        format!(
                            "移行日数 ({}) は失効日数 ({}) より小さくなければなりません",
                            days, expiration
                        ),
                    ));
                }
            }
        }
    }
}

/// 規則 7: オートスケーリング
fn check_autoscaling(graph: &ResourceGraph, violations: &mut Vec<Violation>) {
    for target in graph.by_kind(ResourceKind::AppautoscalingTarget) {
        let min = int_of(target.get("min_capacity")).unwrap_or(0);
        let max = int_of(target.get("max_capacity")).unwrap_or(0);
        if min <= 0 || min >= max {
            violations.push(Violation::new(
                Rule::Autoscaling,
                target.address.to_string(),
                format!("0 < min < max である必要があります（min={}, max={}）", min, max),
            ));
        }

        let Some(dimension) = target
            .get("scalable_dimension")
            .and_then(Value::as_str)
            .and_then(ScalingDimension::from_scalable_dimension)
        else {
            continue;
        };
        let mut refs = Vec::new();
        if let Some(resource_id) = target.get("resource_id") {
            resource_id.collect_references(&mut refs);
        }
        let tables = refs
            .iter()
            .filter(|r| r.address.kind == ResourceKind::DynamodbTable)
            .filter_map(|r| graph.get(&r.address));
        for table in tables {
            let attribute = dimension.capacity_attribute();
            if let Some(capacity) = int_of(table.get(attribute))
                && (capacity < min || capacity > max)
            {
                violations.push(Violation::new(
                    Rule::Autoscaling,
                    target.address.to_string(),
                    format!(
                        "{} の {} ({}) がスケーリング範囲 [{}, {}] の外です",
                        table.address, attribute, capacity, min, max
                    ),
                ));
            }
        }
    }

    for policy in graph.by_kind(ResourceKind::AppautoscalingPolicy) {
        let value = policy
            .get("target_tracking_scaling_policy_configuration")
            .and_then(|c| c.get("target_value"))
            .and_then(Value::as_f64);
        if let Some(value) = value
            && !(value > 0.0 && value <= 100.0)
        {
            violations.push(Violation::new(
                Rule::Autoscaling,
                policy.address.to_string(),
                format!("目標値 {} は (0, 100] の範囲外です", value),
            ));
        }

        for key in ["resource_id", "scalable_dimension"] {
            let wired = ref_target(policy, key)
                .is_some_and(|a| a.kind == ResourceKind::AppautoscalingTarget);
            if !wired {
                violations.push(Violation::new(
                    Rule::Autoscaling,
                    policy.address.to_string(),
                    format!("{} がスケーリングターゲットを参照していません", key),
                ));
            }
        }
    }
}

/// キューポリシーのステートメントに含まれる送信元 ARN の参照先
fn policy_source_buckets(policy: &Resource) -> Vec<&ResourceAddress> {
    policy
        .get("policy")
        .and_then(|p| p.get("Statement"))
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(|s| s.get("Condition"))
        .filter_map(|c| c.get("ArnEquals"))
        .filter_map(|c| c.get("aws:SourceArn"))
        .filter_map(Value::as_reference)
        .filter(|r| r.attribute == "arn")
        .map(|r| &r.address)
        .collect()
}

/// 規則 8: 通知とキューポリシー
fn check_notification_policies(graph: &ResourceGraph, violations: &mut Vec<Violation>) {
    let policies = graph.by_kind(ResourceKind::SqsQueuePolicy);

    for notification in graph.by_kind(ResourceKind::S3BucketNotification) {
        let Some(bucket) = ref_target(notification, "bucket") else {
            continue;
        };
        let targets = notification
            .get("queue")
            .and_then(Value::as_list)
            .unwrap_or_default();

        for target in targets {
            let Some(queue) = target
                .get("queue_arn")
                .and_then(Value::as_reference)
                .map(|r| &r.address)
            else {
                continue;
            };

            let scoped = policies.iter().any(|p| {
                ref_target(p, "queue_url") == Some(queue)
                    && policy_source_buckets(p).contains(&bucket)
            });
            if !scoped {
                violations.push(Violation::new(
                    Rule::NotificationPolicy,
                    notification.address.to_string(),
                    format!(
                        "{} に {} を送信元とするキューポリシーがありません",
                        queue, bucket
                    ),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Scope, database, key_value_table, network, storage};
    use crate::model::{DatabaseConfig, NetworkConfig, StorageConfig, TableConfig};

    fn network_graph(config: &NetworkConfig) -> ResourceGraph {
        let (decls, _) = network(&Scope::new("network"), "us-west-2", config).unwrap();
        ResourceGraph::build(decls.resources).unwrap()
    }

    fn rules(violations: &[Violation]) -> Vec<Rule> {
        violations.iter().map(|v| v.rule).collect()
    }

    #[test]
    fn test_default_network_is_valid() {
        let graph = network_graph(&NetworkConfig::default());
        assert_eq!(validate(&graph), vec![]);
    }

    #[test]
    fn test_subnet_outside_vpc() {
        let mut config = NetworkConfig::default();
        config.private_subnets[0].cidr = "10.0.0.0/24".parse().unwrap();
        let violations = validate(&network_graph(&config));
        assert_eq!(rules(&violations), vec![Rule::SubnetCidr]);
    }

    #[test]
    fn test_overlapping_subnets() {
        let mut config = NetworkConfig::default();
        config.private_subnets[1].cidr = config.private_subnets[0].cidr;
        let violations = validate(&network_graph(&config));
        assert_eq!(rules(&violations), vec![Rule::SubnetCidr]);
        assert!(violations[0].message.contains("重なって"));
    }

    #[test]
    fn test_private_table_routed_to_igw() {
        let (mut decls, handle) =
            network(&Scope::new("network"), "us-west-2", &NetworkConfig::default()).unwrap();
        for resource in &mut decls.resources {
            if resource.address.name == "network_private_route" {
                resource.attributes.remove("nat_gateway_id");
                resource
                    .attributes
                    .insert("gateway_id".to_string(), handle.internet_gateway.attr("id").into());
            }
        }
        let violations = validate(&ResourceGraph::build(decls.resources).unwrap());
        assert_eq!(rules(&violations), vec![Rule::DefaultRoute]);
        assert_eq!(violations[0].resource, handle.private_route_table.to_string());
    }

    #[test]
    fn test_missing_default_route() {
        let (mut decls, _) =
            network(&Scope::new("network"), "us-west-2", &NetworkConfig::default()).unwrap();
        decls
            .resources
            .retain(|r| r.address.name != "network_public_route");
        let violations = validate(&ResourceGraph::build(decls.resources).unwrap());
        assert_eq!(rules(&violations), vec![Rule::DefaultRoute]);
    }

    #[test]
    fn test_unassociated_subnet() {
        let (mut decls, _) =
            network(&Scope::new("network"), "us-west-2", &NetworkConfig::default()).unwrap();
        decls
            .resources
            .retain(|r| r.address.name != "network_rta_private_1");
        let violations = validate(&ResourceGraph::build(decls.resources).unwrap());
        assert_eq!(rules(&violations), vec![Rule::RouteTableAssociation]);
    }

    #[test]
    fn test_endpoint_missing_route_table() {
        let (mut decls, handle) =
            network(&Scope::new("network"), "us-west-2", &NetworkConfig::default()).unwrap();
        for resource in &mut decls.resources {
            if resource.address == handle.storage_endpoint {
                resource.attributes.insert(
                    "route_table_ids".to_string(),
                    Value::list([handle.public_route_table.attr("id")]),
                );
            }
        }
        let violations = validate(&ResourceGraph::build(decls.resources).unwrap());
        assert_eq!(rules(&violations), vec![Rule::EndpointRouteTables]);
    }

    #[test]
    fn test_storage_and_table_are_valid() {
        let (mut decls, _) = storage(&Scope::new("storage"), &StorageConfig::default()).unwrap();
        let (table, _) = key_value_table(&Scope::new("table"), &TableConfig::default()).unwrap();
        decls.extend(table);
        let graph = ResourceGraph::build(decls.resources).unwrap();
        assert_eq!(validate(&graph), vec![]);
    }

    #[test]
    fn test_unscoped_queue_policy() {
        let (mut decls, handle) =
            storage(&Scope::new("storage"), &StorageConfig::default()).unwrap();
        for resource in &mut decls.resources {
            if resource.address == handle.queue_policy {
                resource.attributes.insert(
                    "policy".to_string(),
                    Value::json(Value::map([("Version", "2012-10-17")])),
                );
            }
        }
        let violations = validate(&ResourceGraph::build(decls.resources).unwrap());
        assert_eq!(rules(&violations), vec![Rule::NotificationPolicy]);
    }

    #[test]
    fn test_policy_not_wired_to_target() {
        let (mut decls, handle) =
            key_value_table(&Scope::new("table"), &TableConfig::default()).unwrap();
        let policy = &handle.scaling[0].policy;
        for resource in &mut decls.resources {
            if &resource.address == policy {
                resource
                    .attributes
                    .insert("scalable_dimension".to_string(), "dynamodb:table:ReadCapacityUnits".into());
            }
        }
        let violations = validate(&ResourceGraph::build(decls.resources).unwrap());
        assert_eq!(rules(&violations), vec![Rule::Autoscaling]);
        assert_eq!(violations[0].resource, policy.to_string());
    }

    #[test]
    fn test_public_table_routed_to_nat() {
        let (mut decls, handle) =
            network(&Scope::new("network"), "us-west-2", &NetworkConfig::default()).unwrap();
        for resource in &mut decls.resources {
            if resource.address.name == "network_public_route" {
                resource.attributes.remove("gateway_id");
                resource
                    .attributes
                    .insert("nat_gateway_id".to_string(), handle.nat_gateway.attr("id").into());
            }
        }
        let violations = validate(&ResourceGraph::build(decls.resources).unwrap());
        assert_eq!(rules(&violations), vec![Rule::DefaultRoute]);
        assert_eq!(violations[0].resource, handle.public_route_table.to_string());
        assert!(violations[0].message.contains("インターネットゲートウェイ"));
    }

    /// Network と Database を合わせた宣言
    fn network_and_database() -> (crate::blocks::Declarations, crate::blocks::DatabaseHandle) {
        let (mut decls, network_handle) =
            network(&Scope::new("network"), "us-west-2", &NetworkConfig::default()).unwrap();
        let (db, handle) =
            database(&Scope::new("database"), &DatabaseConfig::default(), &network_handle)
                .unwrap();
        decls.extend(db);
        (decls, handle)
    }

    #[test]
    fn test_network_and_database_are_valid() {
        let (decls, _) = network_and_database();
        assert_eq!(validate(&ResourceGraph::build(decls.resources).unwrap()), vec![]);
    }

    #[test]
    fn test_subnet_group_spans_two_vpcs() {
        let (mut decls, handle) = network_and_database();
        // 同じ CIDR の別 VPC へパブリックサブネットを 1 つ移す
        let other = decls.add(
            Resource::new(ResourceKind::Vpc, "other_vpc").with("cidr_block", "15.32.0.0/16"),
        );
        for resource in &mut decls.resources {
            if resource.address.name == "network_public_subnet_2" {
                resource
                    .attributes
                    .insert("vpc_id".to_string(), other.attr("id").into());
            }
        }
        let violations = validate(&ResourceGraph::build(decls.resources).unwrap());
        assert_eq!(rules(&violations), vec![Rule::SubnetGroup]);
        assert_eq!(violations[0].resource, handle.subnet_group.to_string());
        assert!(violations[0].message.contains("2 個の VPC"));
    }

    #[test]
    fn test_multi_az_instance_in_single_zone_group() {
        let (mut decls, handle) = network_and_database();
        for resource in &mut decls.resources {
            if resource.address == handle.subnet_group {
                let first = resource
                    .get("subnet_ids")
                    .and_then(Value::as_list)
                    .unwrap()[0]
                    .clone();
                resource
                    .attributes
                    .insert("subnet_ids".to_string(), Value::list([first]));
            }
        }
        let violations = validate(&ResourceGraph::build(decls.resources).unwrap());
        assert_eq!(rules(&violations), vec![Rule::SubnetGroup]);
        assert_eq!(violations[0].resource, handle.instance.to_string());
        assert!(violations[0].message.contains("1 AZ"));
    }

    #[test]
    fn test_single_az_instance_may_use_single_zone_group() {
        let (mut decls, handle) = network_and_database();
        for resource in &mut decls.resources {
            if resource.address == handle.instance {
                resource.attributes.insert("multi_az".to_string(), false.into());
            }
            if resource.address == handle.subnet_group {
                let first = resource
                    .get("subnet_ids")
                    .and_then(Value::as_list)
                    .unwrap()[0]
                    .clone();
                resource
                    .attributes
                    .insert("subnet_ids".to_string(), Value::list([first]));
            }
        }
        assert_eq!(validate(&ResourceGraph::build(decls.resources).unwrap()), vec![]);
    }

    #[test]
    fn test_transition_not_before_expiration() {
        let (mut decls, handle) =
            storage(&Scope::new("storage"), &StorageConfig::default()).unwrap();
        for resource in &mut decls.resources {
            if resource.address == handle.lifecycle {
                resource.attributes.insert(
                    "rule".to_string(),
                    Value::list([Value::map([
                        (
                            "transition",
                            Value::list([Value::map([
                                ("days", Value::from(400_i64)),
                                ("storage_class", Value::from("DEEP_ARCHIVE")),
                            ])]),
                        ),
                        ("expiration", Value::map([("days", 365_i64)])),
                    ])]),
                );
            }
        }
        let violations = validate(&ResourceGraph::build(decls.resources).unwrap());
        assert_eq!(rules(&violations), vec![Rule::Lifecycle]);
        assert_eq!(violations[0].resource, handle.lifecycle.to_string());
        assert!(violations[0].message.contains("(400)"));
    }

    #[test]
    fn test_notification_without_queue_policy() {
        let (mut decls, handle) =
            storage(&Scope::new("storage"), &StorageConfig::default()).unwrap();
        decls.resources.retain(|r| r.address != handle.queue_policy);
        for resource in &mut decls.resources {
            if resource.address == handle.notification {
                resource.depends_on.clear();
            }
        }
        let violations = validate(&ResourceGraph::build(decls.resources).unwrap());
        assert_eq!(rules(&violations), vec![Rule::NotificationPolicy]);
        assert_eq!(violations[0].resource, handle.notification.to_string());
    }

    #[test]
    fn test_table_capacity_outside_scaling_range() {
        let (mut decls, handle) =
            key_value_table(&Scope::new("table"), &TableConfig::default()).unwrap();
        for resource in &mut decls.resources {
            if resource.address == handle.table {
                resource.attributes.insert("write_capacity".to_string(), 50_i64.into());
            }
        }
        let violations = validate(&ResourceGraph::build(decls.resources).unwrap());
        assert_eq!(rules(&violations), vec![Rule::Autoscaling]);
        assert_eq!(violations[0].resource, handle.scaling[1].target.to_string());
        assert!(violations[0].message.contains("write_capacity (50)"));
    }

    #[test]
    fn test_violation_display() {
        let v = Violation::new(Rule::Lifecycle, "aws_s3_bucket.b", "bad");
        assert_eq!(v.to_string(), "[lifecycle] aws_s3_bucket.b: bad");
    }
}
