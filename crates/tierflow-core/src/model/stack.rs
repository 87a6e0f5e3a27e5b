//! スタック設定
//!
//! 各ブロック（Network / Database / Storage / KeyValueTable）への型付き入力。
//! デフォルト値はそのまま本番構成として使える値になっている。

use super::cidr::Ipv4Cidr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// スタック全体の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    /// スタック名（合成結果のディレクトリ名にもなる）
    pub name: String,
    /// クラウドリージョン
    pub region: String,
    pub network: NetworkConfig,
    /// None の場合は Database ブロックを宣言しない
    pub database: Option<DatabaseConfig>,
    pub storage: Option<StorageConfig>,
    pub table: Option<TableConfig>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            name: "serverless".to_string(),
            region: "us-west-2".to_string(),
            network: NetworkConfig::default(),
            database: Some(DatabaseConfig::default()),
            storage: Some(StorageConfig::default()),
            table: Some(TableConfig::default()),
        }
    }
}

impl StackConfig {
    /// Network ブロックのみのスタック
    pub fn network_only() -> Self {
        Self {
            database: None,
            storage: None,
            table: None,
            ..Default::default()
        }
    }
}

/// サブネットの階層
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetTier {
    /// インターネットゲートウェイ経由で到達可能
    #[default]
    Public,
    /// NAT ゲートウェイ経由の外向き通信のみ
    Private,
}

impl fmt::Display for SubnetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubnetTier::Public => write!(f, "public"),
            SubnetTier::Private => write!(f, "private"),
        }
    }
}

/// サブネット定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetConfig {
    /// Name タグ
    pub name: String,
    pub cidr: Ipv4Cidr,
    pub availability_zone: String,
}

impl SubnetConfig {
    pub fn new(name: impl Into<String>, cidr: Ipv4Cidr, availability_zone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cidr,
            availability_zone: availability_zone.into(),
        }
    }
}

fn subnet(name: &str, third_octet: u8, az: &str) -> SubnetConfig {
    // /25 境界に揃っているので失敗しない
    let cidr = Ipv4Cidr::new(Ipv4Addr::new(15, 32, third_octet, 0), 25)
        .unwrap_or_else(|_| Ipv4Cidr::any());
    SubnetConfig::new(name, cidr, az)
}

/// Network ブロックの設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub cidr: Ipv4Cidr,
    /// VPC の Name タグ
    pub name: String,
    /// インターネットゲートウェイの Name タグ
    pub gateway_name: String,
    pub enable_dns_support: bool,
    pub enable_dns_hostnames: bool,
    pub public_subnets: Vec<SubnetConfig>,
    pub private_subnets: Vec<SubnetConfig>,
    /// NAT ゲートウェイを置くパブリックサブネットの位置
    pub nat_subnet: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: Ipv4Cidr::new(Ipv4Addr::new(15, 32, 0, 0), 16).unwrap_or_else(|_| Ipv4Cidr::any()),
            name: "serverless-vpc".to_string(),
            gateway_name: "serverless-subnet".to_string(),
            enable_dns_support: true,
            enable_dns_hostnames: true,
            public_subnets: vec![
                subnet("Public-Subnet1", 1, "us-west-2a"),
                subnet("Public-Subnet2", 2, "us-west-2b"),
            ],
            private_subnets: vec![
                subnet("private-subnet-1a", 10, "us-west-2a"),
                subnet("private-subnet-2a", 11, "us-west-2a"),
                subnet("private-subnet-1b", 20, "us-west-2b"),
                subnet("private-subnet-2b", 21, "us-west-2b"),
            ],
            nat_subnet: 0,
        }
    }
}

/// 生成パスワードの条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub length: u32,
    pub special: bool,
    /// 使用する記号（エンジンのパスワード制約に合わせる）
    pub override_special: String,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            length: 16,
            special: true,
            override_special: "_!%@".to_string(),
        }
    }
}

/// Database ブロックの設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub engine: String,
    pub engine_version: String,
    pub instance_class: String,
    /// GiB
    pub allocated_storage: u32,
    pub db_name: String,
    pub username: String,
    /// 設定ストアのパス接頭辞（例: /lks/database）
    pub parameter_prefix: String,
    pub subnet_group: String,
    pub subnet_tier: SubnetTier,
    pub multi_az: bool,
    pub skip_final_snapshot: bool,
    /// インスタンスの Name タグ
    pub instance_name: String,
    pub password: PasswordPolicy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            engine: "postgres".to_string(),
            engine_version: "17.4".to_string(),
            instance_class: "db.t3.micro".to_string(),
            allocated_storage: 20,
            db_name: "lksdb".to_string(),
            username: "lksadmin".to_string(),
            parameter_prefix: "/lks/database".to_string(),
            subnet_group: "lks-db-subnet-group".to_string(),
            subnet_tier: SubnetTier::Public,
            multi_az: true,
            skip_final_snapshot: true,
            instance_name: "lks-db-instance".to_string(),
            password: PasswordPolicy::default(),
        }
    }
}

/// Storage ブロックの設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// グローバルに一意なバケット名
    pub bucket: String,
    pub queue: String,
    /// ライフサイクルと通知の対象プレフィックス
    pub prefix: String,
    pub rule_id: String,
    pub transition_days: u32,
    pub storage_class: String,
    pub expiration_days: u32,
    pub events: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "lks-abyandimas-tegal-jawatengah".to_string(),
            queue: "payment-queue".to_string(),
            prefix: "proofOfPayment/".to_string(),
            rule_id: "proofOfPayment-lifecycle".to_string(),
            transition_days: 180,
            storage_class: "DEEP_ARCHIVE".to_string(),
            expiration_days: 365,
            events: vec!["s3:ObjectCreated:*".to_string()],
        }
    }
}

/// オートスケーリングの対象次元
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingDimension {
    Read,
    Write,
}

impl ScalingDimension {
    pub const ALL: [ScalingDimension; 2] = [ScalingDimension::Read, ScalingDimension::Write];

    /// `scalable_dimension` の値から次元を逆引き
    pub fn from_scalable_dimension(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|d| d.scalable_dimension() == value)
    }

    /// テーブル側でこの次元のプロビジョニング容量を持つ属性
    pub fn capacity_attribute(&self) -> &'static str {
        match self {
            ScalingDimension::Read => "read_capacity",
            ScalingDimension::Write => "write_capacity",
        }
    }

    pub fn scalable_dimension(&self) -> &'static str {
        match self {
            ScalingDimension::Read => "dynamodb:table:ReadCapacityUnits",
            ScalingDimension::Write => "dynamodb:table:WriteCapacityUnits",
        }
    }

    pub fn predefined_metric(&self) -> &'static str {
        match self {
            ScalingDimension::Read => "DynamoDBReadCapacityUtilization",
            ScalingDimension::Write => "DynamoDBWriteCapacityUtilization",
        }
    }
}

impl fmt::Display for ScalingDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingDimension::Read => write!(f, "read"),
            ScalingDimension::Write => write!(f, "write"),
        }
    }
}

/// オートスケーリング設定（ターゲットとポリシーの組）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoscalingConfig {
    pub dimension: ScalingDimension,
    pub min_capacity: u32,
    pub max_capacity: u32,
    /// 目標使用率 (%)
    pub target_utilization: f64,
}

/// KeyValueTable ブロックの設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    pub partition_key: String,
    pub sort_key: String,
    pub read_capacity: u32,
    pub write_capacity: u32,
    pub autoscaling: Vec<AutoscalingConfig>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: "tokens".to_string(),
            partition_key: "token".to_string(),
            sort_key: "deviceid".to_string(),
            read_capacity: 10,
            write_capacity: 5,
            autoscaling: vec![
                AutoscalingConfig {
                    dimension: ScalingDimension::Read,
                    min_capacity: 10,
                    max_capacity: 100,
                    target_utilization: 70.0,
                },
                AutoscalingConfig {
                    dimension: ScalingDimension::Write,
                    min_capacity: 5,
                    max_capacity: 25,
                    target_utilization: 70.0,
                },
            ],
        }
    }
}
