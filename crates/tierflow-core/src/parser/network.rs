//! network ノードのパース

use super::{bool_arg, first_value, prop_string, required_string};
use crate::error::{Result, StackError};
use crate::model::{Ipv4Cidr, NetworkConfig, SubnetConfig};
use kdl::KdlNode;

/// network ノードをパース
///
/// サブネットを 1 つでも列挙した階層は、デフォルトのサブネット一覧を置き換える。
pub fn parse_network(node: &KdlNode, network: &mut NetworkConfig) -> Result<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    let mut public: Option<Vec<SubnetConfig>> = None;
    let mut private: Option<Vec<SubnetConfig>> = None;
    let mut nat: Option<NatSelector> = None;

    for child in children.nodes() {
        match child.name().value() {
            "cidr" => {
                network.cidr = parse_cidr(&required_string(child, "network.cidr")?)?;
            }
            "name" => network.name = required_string(child, "network.name")?,
            "gateway-name" | "gateway_name" => {
                network.gateway_name = required_string(child, "network.gateway-name")?;
            }
            "dns-support" | "dns_support" => {
                network.enable_dns_support = bool_arg(child, "network.dns-support")?;
            }
            "dns-hostnames" | "dns_hostnames" => {
                network.enable_dns_hostnames = bool_arg(child, "network.dns-hostnames")?;
            }
            "public-subnet" | "public_subnet" => {
                public
                    .get_or_insert_with(Vec::new)
                    .push(parse_subnet(child)?);
            }
            "private-subnet" | "private_subnet" => {
                private
                    .get_or_insert_with(Vec::new)
                    .push(parse_subnet(child)?);
            }
            "nat-subnet" | "nat_subnet" => {
                let value = first_value(child).ok_or_else(|| {
                    StackError::InvalidConfig("network.nat-subnet: 値がありません".to_string())
                })?;
                nat = Some(if let Some(name) = value.as_string() {
                    NatSelector::Name(name.to_string())
                } else {
                    let index = value
                        .as_integer()
                        .and_then(|i| usize::try_from(i).ok())
                        .ok_or_else(|| {
                            StackError::InvalidConfig(format!(
                                "network.nat-subnet: サブネット名か位置を指定してください ({})",
                                value
                            ))
                        })?;
                    NatSelector::Index(index)
                });
            }
            _ => {}
        }
    }

    if let Some(subnets) = public {
        network.public_subnets = subnets;
    }
    if let Some(subnets) = private {
        network.private_subnets = subnets;
    }

    match nat {
        Some(NatSelector::Index(i)) => network.nat_subnet = i,
        Some(NatSelector::Name(name)) => {
            network.nat_subnet = network
                .public_subnets
                .iter()
                .position(|s| s.name == name)
                .ok_or_else(|| {
                    StackError::InvalidConfig(format!(
                        "network.nat-subnet: パブリックサブネット '{}' がありません",
                        name
                    ))
                })?;
        }
        None => {}
    }

    Ok(())
}

/// NAT ゲートウェイを置くサブネットの指定方法
enum NatSelector {
    Name(String),
    Index(usize),
}

/// `public-subnet "name" cidr="..." az="..."`
fn parse_subnet(node: &KdlNode) -> Result<SubnetConfig> {
    let context = node.name().value().to_string();
    let name = required_string(node, &context)?;
    let cidr = prop_string(node, "cidr").ok_or_else(|| {
        StackError::InvalidConfig(format!("{} \"{}\": cidr が必要です", context, name))
    })?;
    let az = prop_string(node, "az")
        .or_else(|| prop_string(node, "availability-zone"))
        .ok_or_else(|| {
            StackError::InvalidConfig(format!("{} \"{}\": az が必要です", context, name))
        })?;

    Ok(SubnetConfig::new(name, parse_cidr(cidr)?, az))
}

fn parse_cidr(s: &str) -> Result<Ipv4Cidr> {
    s.parse()
}
