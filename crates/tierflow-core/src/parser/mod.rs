//! KDLパーサー
//!
//! tierflow のスタックファイル（KDL）をパースして `StackConfig` を生成します。
//! 各ブロックのパース処理はモジュールに分離されています。
//! 省略したセクションはデフォルト値のまま、`enabled=#false` を付けたセクションは宣言しません。

mod database;
mod network;
mod storage;
mod table;

use database::parse_database;
use network::parse_network;
use storage::parse_storage;
use table::parse_table;

use crate::error::{Result, StackError};
use crate::model::StackConfig;
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::fs;
use std::path::Path;

/// KDLファイルをパースしてStackConfigを生成
pub fn parse_stack_file<P: AsRef<Path>>(path: P) -> Result<StackConfig> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_stack_string(&content)
}

/// KDL文字列をパース
pub fn parse_stack_string(content: &str) -> Result<StackConfig> {
    let doc: KdlDocument = content.parse()?;
    let mut config = StackConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "stack" => {
                if let Some(name) = first_string(node) {
                    config.name = name.to_string();
                }
                if let Some(region) = prop_string(node, "region") {
                    config.region = region.to_string();
                }
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        if child.name().value() == "region" {
                            config.region = required_string(child, "stack.region")?;
                        }
                    }
                }
            }
            "network" => parse_network(node, &mut config.network)?,
            "database" => {
                config.database = if is_disabled(node) {
                    None
                } else {
                    let base = config.database.take().unwrap_or_default();
                    Some(parse_database(node, base)?)
                };
            }
            "storage" => {
                config.storage = if is_disabled(node) {
                    None
                } else {
                    let base = config.storage.take().unwrap_or_default();
                    Some(parse_storage(node, base)?)
                };
            }
            "table" => {
                config.table = if is_disabled(node) {
                    None
                } else {
                    let base = config.table.take().unwrap_or_default();
                    Some(parse_table(node, base)?)
                };
            }
            _ => {
                // 不明なノードはスキップ
            }
        }
    }

    tracing::debug!(
        stack = %config.name,
        database = config.database.is_some(),
        storage = config.storage.is_some(),
        table = config.table.is_some(),
        "Parsed stack file"
    );

    Ok(config)
}

/// 最初の引数（文字列）
fn first_string(node: &KdlNode) -> Option<&str> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
}

/// 文字列引数を必須として取得
fn required_string(node: &KdlNode, context: &str) -> Result<String> {
    first_string(node)
        .map(|s| s.to_string())
        .ok_or_else(|| StackError::InvalidConfig(format!("{}: 文字列を指定してください", context)))
}

/// すべての文字列引数
fn string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn first_value(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

fn to_u32(value: &KdlValue, context: &str) -> Result<u32> {
    value
        .as_integer()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| {
            StackError::InvalidConfig(format!("{}: 0 以上の整数を指定してください ({})", context, value))
        })
}

/// 整数引数（u32）
fn u32_arg(node: &KdlNode, context: &str) -> Result<u32> {
    let value = first_value(node)
        .ok_or_else(|| StackError::InvalidConfig(format!("{}: 値がありません", context)))?;
    to_u32(value, context)
}

/// 真偽値引数
fn bool_arg(node: &KdlNode, context: &str) -> Result<bool> {
    first_value(node)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| StackError::InvalidConfig(format!("{}: #true か #false を指定してください", context)))
}

/// 文字列プロパティ
fn prop_string<'a>(node: &'a KdlNode, key: &str) -> Option<&'a str> {
    node.get(key).and_then(|v| v.as_string())
}

/// 整数プロパティ（u32）
fn prop_u32(node: &KdlNode, key: &str, context: &str) -> Result<Option<u32>> {
    node.get(key)
        .map(|v| to_u32(v, &format!("{}.{}", context, key)))
        .transpose()
}

/// 数値プロパティ（整数も受け付ける）
fn prop_f64(node: &KdlNode, key: &str, context: &str) -> Result<Option<f64>> {
    node.get(key)
        .map(|v| {
            v.as_float()
                .or_else(|| v.as_integer().map(|i| i as f64))
                .ok_or_else(|| {
                    StackError::InvalidConfig(format!("{}.{}: 数値を指定してください ({})", context, key, v))
                })
        })
        .transpose()
}

/// `enabled=#false` が付いているか
fn is_disabled(node: &KdlNode) -> bool {
    node.get("enabled").and_then(|v| v.as_bool()) == Some(false)
}
