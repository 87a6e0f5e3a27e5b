//! table ノードのパース

use super::{first_string, prop_f64, prop_u32, required_string, u32_arg};
use crate::error::{Result, StackError};
use crate::model::{AutoscalingConfig, ScalingDimension, TableConfig};
use kdl::KdlNode;

/// table ノードをパース
///
/// `autoscaling` を 1 つでも書いた場合はデフォルトの読み取り/書き込み設定を置き換える。
pub fn parse_table(node: &KdlNode, mut table: TableConfig) -> Result<TableConfig> {
    if let Some(name) = first_string(node) {
        table.name = name.to_string();
    }

    let Some(children) = node.children() else {
        return Ok(table);
    };

    let mut autoscaling: Option<Vec<AutoscalingConfig>> = None;
    for child in children.nodes() {
        match child.name().value() {
            "partition-key" | "partition_key" => {
                table.partition_key = required_string(child, "table.partition-key")?;
            }
            "sort-key" | "sort_key" => table.sort_key = required_string(child, "table.sort-key")?,
            "read-capacity" | "read_capacity" => {
                table.read_capacity = u32_arg(child, "table.read-capacity")?;
            }
            "write-capacity" | "write_capacity" => {
                table.write_capacity = u32_arg(child, "table.write-capacity")?;
            }
            "autoscaling" => {
                autoscaling
                    .get_or_insert_with(Vec::new)
                    .push(parse_autoscaling(child, &table)?);
            }
            _ => {}
        }
    }

    if let Some(autoscaling) = autoscaling {
        table.autoscaling = autoscaling;
    }
    Ok(table)
}

/// `autoscaling "read" min=10 max=100 target=70`
///
/// 省略した値は同じ次元のデフォルトを引き継ぐ。
fn parse_autoscaling(node: &KdlNode, table: &TableConfig) -> Result<AutoscalingConfig> {
    let dimension = match required_string(node, "table.autoscaling")?.as_str() {
        "read" => ScalingDimension::Read,
        "write" => ScalingDimension::Write,
        other => {
            return Err(StackError::InvalidConfig(format!(
                "table.autoscaling: read か write を指定してください ({})",
                other
            )));
        }
    };
    let context = format!("table.autoscaling \"{}\"", dimension);

    let base = table
        .autoscaling
        .iter()
        .chain(TableConfig::default().autoscaling.iter())
        .find(|a| a.dimension == dimension)
        .cloned()
        .ok_or_else(|| StackError::InvalidConfig(format!("{}: デフォルト値がありません", context)))?;

    Ok(AutoscalingConfig {
        dimension,
        min_capacity: prop_u32(node, "min", &context)?.unwrap_or(base.min_capacity),
        max_capacity: prop_u32(node, "max", &context)?.unwrap_or(base.max_capacity),
        target_utilization: prop_f64(node, "target", &context)?.unwrap_or(base.target_utilization),
    })
}
