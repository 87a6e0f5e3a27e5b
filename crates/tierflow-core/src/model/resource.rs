//! リソース宣言
//!
//! プロビジョニングエンジンに渡すリソース宣言（種類・属性・他リソースへの参照）の定義

use super::value::Value;
use crate::error::StackError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 宣言可能なリソースの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    #[serde(rename = "aws_vpc")]
    Vpc,
    #[serde(rename = "aws_internet_gateway")]
    InternetGateway,
    #[serde(rename = "aws_subnet")]
    Subnet,
    #[serde(rename = "aws_route_table")]
    RouteTable,
    #[serde(rename = "aws_route")]
    Route,
    #[serde(rename = "aws_route_table_association")]
    RouteTableAssociation,
    #[serde(rename = "aws_eip")]
    Eip,
    #[serde(rename = "aws_nat_gateway")]
    NatGateway,
    #[serde(rename = "aws_vpc_endpoint")]
    VpcEndpoint,
    #[serde(rename = "aws_db_subnet_group")]
    DbSubnetGroup,
    #[serde(rename = "aws_db_instance")]
    DbInstance,
    #[serde(rename = "aws_ssm_parameter")]
    SsmParameter,
    #[serde(rename = "random_password")]
    RandomPassword,
    #[serde(rename = "aws_s3_bucket")]
    S3Bucket,
    #[serde(rename = "aws_s3_bucket_lifecycle_configuration")]
    S3BucketLifecycleConfiguration,
    #[serde(rename = "aws_sqs_queue")]
    SqsQueue,
    #[serde(rename = "aws_s3_bucket_notification")]
    S3BucketNotification,
    #[serde(rename = "aws_sqs_queue_policy")]
    SqsQueuePolicy,
    #[serde(rename = "aws_dynamodb_table")]
    DynamodbTable,
    #[serde(rename = "aws_appautoscaling_target")]
    AppautoscalingTarget,
    #[serde(rename = "aws_appautoscaling_policy")]
    AppautoscalingPolicy,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 21] = [
        ResourceKind::Vpc,
        ResourceKind::InternetGateway,
        ResourceKind::Subnet,
        ResourceKind::RouteTable,
        ResourceKind::Route,
        ResourceKind::RouteTableAssociation,
        ResourceKind::Eip,
        ResourceKind::NatGateway,
        ResourceKind::VpcEndpoint,
        ResourceKind::DbSubnetGroup,
        ResourceKind::DbInstance,
        ResourceKind::SsmParameter,
        ResourceKind::RandomPassword,
        ResourceKind::S3Bucket,
        ResourceKind::S3BucketLifecycleConfiguration,
        ResourceKind::SqsQueue,
        ResourceKind::S3BucketNotification,
        ResourceKind::SqsQueuePolicy,
        ResourceKind::DynamodbTable,
        ResourceKind::AppautoscalingTarget,
        ResourceKind::AppautoscalingPolicy,
    ];

    /// エンジン側のリソースタイプ名
    pub fn type_name(&self) -> &'static str {
        match self {
            ResourceKind::Vpc => "aws_vpc",
            ResourceKind::InternetGateway => "aws_internet_gateway",
            ResourceKind::Subnet => "aws_subnet",
            ResourceKind::RouteTable => "aws_route_table",
            ResourceKind::Route => "aws_route",
            ResourceKind::RouteTableAssociation => "aws_route_table_association",
            ResourceKind::Eip => "aws_eip",
            ResourceKind::NatGateway => "aws_nat_gateway",
            ResourceKind::VpcEndpoint => "aws_vpc_endpoint",
            ResourceKind::DbSubnetGroup => "aws_db_subnet_group",
            ResourceKind::DbInstance => "aws_db_instance",
            ResourceKind::SsmParameter => "aws_ssm_parameter",
            ResourceKind::RandomPassword => "random_password",
            ResourceKind::S3Bucket => "aws_s3_bucket",
            ResourceKind::S3BucketLifecycleConfiguration => "aws_s3_bucket_lifecycle_configuration",
            ResourceKind::SqsQueue => "aws_sqs_queue",
            ResourceKind::S3BucketNotification => "aws_s3_bucket_notification",
            ResourceKind::SqsQueuePolicy => "aws_sqs_queue_policy",
            ResourceKind::DynamodbTable => "aws_dynamodb_table",
            ResourceKind::AppautoscalingTarget => "aws_appautoscaling_target",
            ResourceKind::AppautoscalingPolicy => "aws_appautoscaling_policy",
        }
    }

    /// リソースを扱うプロバイダー名
    pub fn provider(&self) -> &'static str {
        match self {
            ResourceKind::RandomPassword => "random",
            _ => "aws",
        }
    }

    /// エンジンが作成後に決定する属性
    pub fn computed_attributes(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Vpc => &["id", "arn", "default_route_table_id", "main_route_table_id"],
            ResourceKind::InternetGateway => &["id", "arn"],
            ResourceKind::Subnet => &["id", "arn"],
            ResourceKind::RouteTable => &["id", "arn"],
            ResourceKind::Route => &["id"],
            ResourceKind::RouteTableAssociation => &["id"],
            ResourceKind::Eip => &["id", "allocation_id", "public_ip"],
            ResourceKind::NatGateway => &["id", "public_ip"],
            ResourceKind::VpcEndpoint => &["id", "arn", "prefix_list_id"],
            ResourceKind::DbSubnetGroup => &["id", "arn"],
            ResourceKind::DbInstance => &["id", "arn", "identifier", "endpoint", "address", "port"],
            ResourceKind::SsmParameter => &["id", "arn", "version"],
            ResourceKind::RandomPassword => &["id", "result"],
            ResourceKind::S3Bucket => &["id", "arn", "bucket_domain_name"],
            ResourceKind::S3BucketLifecycleConfiguration => &["id"],
            ResourceKind::SqsQueue => &["id", "arn", "url"],
            ResourceKind::S3BucketNotification => &["id"],
            ResourceKind::SqsQueuePolicy => &["id"],
            ResourceKind::DynamodbTable => &["id", "arn", "stream_arn"],
            ResourceKind::AppautoscalingTarget => &["id", "arn"],
            ResourceKind::AppautoscalingPolicy => &["id", "arn"],
        }
    }

    /// 変更されるとリソースの再作成が必要になる属性
    pub fn replace_on_change(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Vpc => &["cidr_block"],
            ResourceKind::InternetGateway => &[],
            ResourceKind::Subnet => &["vpc_id", "cidr_block", "availability_zone"],
            ResourceKind::RouteTable => &["vpc_id"],
            ResourceKind::Route => &["route_table_id", "destination_cidr_block"],
            ResourceKind::RouteTableAssociation => &["subnet_id"],
            ResourceKind::Eip => &["domain"],
            ResourceKind::NatGateway => &["allocation_id", "subnet_id"],
            ResourceKind::VpcEndpoint => &["vpc_id", "service_name", "vpc_endpoint_type"],
            ResourceKind::DbSubnetGroup => &["name"],
            ResourceKind::DbInstance => &["engine", "db_name", "username", "identifier"],
            ResourceKind::SsmParameter => &["name"],
            ResourceKind::RandomPassword => &[
                "length",
                "special",
                "override_special",
                "upper",
                "lower",
                "numeric",
                "keepers",
            ],
            ResourceKind::S3Bucket => &["bucket"],
            ResourceKind::S3BucketLifecycleConfiguration => &["bucket"],
            ResourceKind::SqsQueue => &["name"],
            ResourceKind::S3BucketNotification => &["bucket"],
            ResourceKind::SqsQueuePolicy => &["queue_url"],
            ResourceKind::DynamodbTable => &["name", "hash_key", "range_key"],
            ResourceKind::AppautoscalingTarget => {
                &["resource_id", "scalable_dimension", "service_namespace"]
            }
            ResourceKind::AppautoscalingPolicy => &[
                "name",
                "resource_id",
                "scalable_dimension",
                "service_namespace",
            ],
        }
    }

    /// 出力などで値を伏せる属性
    pub fn sensitive_attributes(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::RandomPassword => &["result"],
            ResourceKind::DbInstance => &["password"],
            _ => &[],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

impl FromStr for ResourceKind {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .iter()
            .copied()
            .find(|k| k.type_name() == s)
            .ok_or_else(|| StackError::InvalidConfig(format!("未知のリソースタイプ: {}", s)))
    }
}

/// スタック内で一意なリソースのアドレス（例: aws_vpc.network_vpc）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceAddress {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceAddress {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// このリソースの属性への参照を作る
    pub fn attr(&self, attribute: impl Into<String>) -> Reference {
        Reference {
            address: self.clone(),
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind.type_name(), self.name)
    }
}

impl FromStr for ResourceAddress {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .split_once('.')
            .ok_or_else(|| StackError::InvalidConfig(format!("無効なアドレス: {}", s)))?;
        if name.is_empty() || name.contains('.') {
            return Err(StackError::InvalidConfig(format!("無効なアドレス: {}", s)));
        }
        Ok(Self::new(kind.parse()?, name))
    }
}

/// 他リソースの属性への参照
///
/// 宣言間の依存関係はこの参照からのみ導出される。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    pub address: ResourceAddress,
    pub attribute: String,
}

impl Reference {
    /// `${aws_vpc.network_vpc.id}` 形式の補間式
    pub fn interpolation(&self) -> String {
        format!("${{{}}}", self)
    }

    /// `${...}` 形式、または `type.name.attr` 形式をパース
    pub fn parse(s: &str) -> Result<Self, StackError> {
        let inner = s
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(s);
        let mut parts = inner.splitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(kind), Some(name), Some(attribute)) if !name.is_empty() && !attribute.is_empty() => {
                Ok(ResourceAddress::new(kind.parse()?, name).attr(attribute))
            }
            _ => Err(StackError::InvalidConfig(format!("無効な参照: {}", s))),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.address, self.attribute)
    }
}

/// リソース宣言
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub address: ResourceAddress,
    pub attributes: BTreeMap<String, Value>,
    /// 参照では表現されない順序制約
    pub depends_on: Vec<ResourceAddress>,
}

impl Resource {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            address: ResourceAddress::new(kind, name),
            attributes: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_tags<'a>(self, tags: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        self.with("tags", Value::map(tags))
    }

    pub fn depends_on(mut self, address: &ResourceAddress) -> Self {
        if !self.depends_on.contains(address) {
            self.depends_on.push(address.clone());
        }
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.address.kind
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// 属性への参照
    pub fn attr(&self, attribute: impl Into<String>) -> Reference {
        self.address.attr(attribute)
    }

    /// 属性に含まれるすべての参照
    pub fn references(&self) -> Vec<&Reference> {
        let mut refs = Vec::new();
        for value in self.attributes.values() {
            value.collect_references(&mut refs);
        }
        refs
    }

    /// 宣言された属性または計算属性として `attribute` を持つか
    pub fn exposes(&self, attribute: &str) -> bool {
        self.attributes.contains_key(attribute)
            || self.kind().computed_attributes().contains(&attribute)
    }

    /// エンジンに渡す属性の JSON 表現
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// 公開出力
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub name: String,
    pub value: Value,
    pub description: Option<String>,
    pub sensitive: bool,
}

impl Output {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            description: None,
            sensitive: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
