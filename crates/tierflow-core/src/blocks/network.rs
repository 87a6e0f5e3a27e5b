//! Network ブロック
//!
//! VPC、インターネットゲートウェイ、パブリック/プライベートサブネット、
//! ルートテーブル、NAT ゲートウェイ、S3 ゲートウェイエンドポイントを宣言する。

use super::{Declarations, Scope};
use crate::error::{Result, StackError};
use crate::model::{
    Ipv4Cidr, NetworkConfig, Output, ResourceAddress, ResourceKind, SubnetConfig, SubnetTier,
    Value,
};
use std::collections::BTreeSet;

/// 後続ブロックに公開するサブネット情報
#[derive(Debug, Clone, PartialEq)]
pub struct SubnetHandle {
    pub address: ResourceAddress,
    pub name: String,
    pub cidr: Ipv4Cidr,
    pub availability_zone: String,
    pub tier: SubnetTier,
}

/// Network ブロックが公開する読み取り専用ハンドル
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkHandle {
    pub vpc: ResourceAddress,
    pub cidr: Ipv4Cidr,
    pub internet_gateway: ResourceAddress,
    pub public_subnets: Vec<SubnetHandle>,
    pub private_subnets: Vec<SubnetHandle>,
    pub public_route_table: ResourceAddress,
    pub private_route_table: ResourceAddress,
    pub nat_gateway: ResourceAddress,
    pub storage_endpoint: ResourceAddress,
}

impl NetworkHandle {
    pub fn subnets(&self, tier: SubnetTier) -> &[SubnetHandle] {
        match tier {
            SubnetTier::Public => &self.public_subnets,
            SubnetTier::Private => &self.private_subnets,
        }
    }

    /// 指定した階層のサブネットが属するアベイラビリティゾーン
    pub fn availability_zones(&self, tier: SubnetTier) -> BTreeSet<&str> {
        self.subnets(tier)
            .iter()
            .map(|s| s.availability_zone.as_str())
            .collect()
    }
}

/// Network ブロックを宣言
pub fn network(
    scope: &Scope,
    region: &str,
    config: &NetworkConfig,
) -> Result<(Declarations, NetworkHandle)> {
    if config.public_subnets.is_empty() {
        return Err(StackError::InvalidConfig(
            "network: NAT ゲートウェイを置くパブリックサブネットが必要です".to_string(),
        ));
    }
    if config.nat_subnet >= config.public_subnets.len() {
        return Err(StackError::InvalidConfig(format!(
            "network: nat-subnet {} はパブリックサブネット数 {} を超えています",
            config.nat_subnet,
            config.public_subnets.len()
        )));
    }

    let mut decls = Declarations::new();

    let vpc = decls.add(
        scope
            .resource(ResourceKind::Vpc, "vpc")
            .with("cidr_block", config.cidr.to_string())
            .with("enable_dns_support", config.enable_dns_support)
            .with("enable_dns_hostnames", config.enable_dns_hostnames)
            .with_tags([("Name", config.name.as_str())]),
    );

    let igw = decls.add(
        scope
            .resource(ResourceKind::InternetGateway, "igw")
            .with("vpc_id", vpc.attr("id"))
            .with_tags([("Name", config.gateway_name.as_str())]),
    );

    // パブリック階層: 0.0.0.0/0 はインターネットゲートウェイへ
    let public_route_table = decls.add(
        scope
            .resource(ResourceKind::RouteTable, "public_route_table")
            .with("vpc_id", vpc.attr("id"))
            .with_tags([("Name", "public-route-table")]),
    );
    decls.add(
        scope
            .resource(ResourceKind::Route, "public_route")
            .with("route_table_id", public_route_table.attr("id"))
            .with("destination_cidr_block", Ipv4Cidr::any().to_string())
            .with("gateway_id", igw.attr("id")),
    );

    let public_subnets = declare_subnets(
        &mut decls,
        scope,
        &vpc,
        &public_route_table,
        &config.public_subnets,
        SubnetTier::Public,
    );

    // NAT ゲートウェイは EIP を割り当ててパブリックサブネットに置く
    let eip = decls.add(
        scope
            .resource(ResourceKind::Eip, "nat_eip")
            .with("domain", "vpc")
            .with_tags([("Name", "nat-eip")]),
    );
    let nat_gateway = decls.add(
        scope
            .resource(ResourceKind::NatGateway, "nat_gateway")
            .with("allocation_id", eip.attr("id"))
            .with("subnet_id", public_subnets[config.nat_subnet].address.attr("id"))
            .with_tags([("Name", "nat-gateway")])
            .depends_on(&igw),
    );

    // プライベート階層: 0.0.0.0/0 は NAT ゲートウェイへ
    let private_route_table = decls.add(
        scope
            .resource(ResourceKind::RouteTable, "private_route_table")
            .with("vpc_id", vpc.attr("id"))
            .with_tags([("Name", "private-route-table")]),
    );
    decls.add(
        scope
            .resource(ResourceKind::Route, "private_route")
            .with("route_table_id", private_route_table.attr("id"))
            .with("destination_cidr_block", Ipv4Cidr::any().to_string())
            .with("nat_gateway_id", nat_gateway.attr("id")),
    );

    let private_subnets = declare_subnets(
        &mut decls,
        scope,
        &vpc,
        &private_route_table,
        &config.private_subnets,
        SubnetTier::Private,
    );

    let storage_endpoint = decls.add(
        scope
            .resource(ResourceKind::VpcEndpoint, "s3_endpoint")
            .with("vpc_id", vpc.attr("id"))
            .with("service_name", format!("com.amazonaws.{}.s3", region))
            .with(
                "route_table_ids",
                Value::list([
                    public_route_table.attr("id"),
                    private_route_table.attr("id"),
                ]),
            )
            .with("vpc_endpoint_type", "Gateway"),
    );

    decls.output(Output::new("vpc_id", vpc.attr("id")).with_description("VPC ID"));
    for (i, subnet) in public_subnets.iter().enumerate() {
        decls.output(
            Output::new(format!("public_subnet_{}_id", i + 1), subnet.address.attr("id"))
                .with_description(format!("{} の ID", subnet.name)),
        );
    }
    decls.output(Output::new("internet_gateway_id", igw.attr("id")));
    decls.output(Output::new(
        "public_route_table_id",
        public_route_table.attr("id"),
    ));

    tracing::debug!(
        public = public_subnets.len(),
        private = private_subnets.len(),
        "Declared network block"
    );

    let handle = NetworkHandle {
        vpc,
        cidr: config.cidr,
        internet_gateway: igw,
        public_subnets,
        private_subnets,
        public_route_table,
        private_route_table,
        nat_gateway,
        storage_endpoint,
    };

    Ok((decls, handle))
}

/// サブネットとルートテーブル関連付けを宣言
fn declare_subnets(
    decls: &mut Declarations,
    scope: &Scope,
    vpc: &ResourceAddress,
    route_table: &ResourceAddress,
    subnets: &[SubnetConfig],
    tier: SubnetTier,
) -> Vec<SubnetHandle> {
    subnets
        .iter()
        .enumerate()
        .map(|(i, subnet)| {
            let address = decls.add(
                scope
                    .resource(ResourceKind::Subnet, &format!("{}_subnet_{}", tier, i + 1))
                    .with("vpc_id", vpc.attr("id"))
                    .with("cidr_block", subnet.cidr.to_string())
                    .with("availability_zone", subnet.availability_zone.as_str())
                    .with("map_public_ip_on_launch", tier == SubnetTier::Public)
                    .with_tags([("Name", subnet.name.as_str())]),
            );
            decls.add(
                scope
                    .resource(
                        ResourceKind::RouteTableAssociation,
                        &format!("rta_{}_{}", tier, i + 1),
                    )
                    .with("subnet_id", address.attr("id"))
                    .with("route_table_id", route_table.attr("id")),
            );
            SubnetHandle {
                address,
                name: subnet.name.clone(),
                cidr: subnet.cidr,
                availability_zone: subnet.availability_zone.clone(),
                tier,
            }
        })
        .collect()
}
