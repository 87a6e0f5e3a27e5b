//! storage ノードのパース

use super::{required_string, string_args, u32_arg};
use crate::error::{Result, StackError};
use crate::model::StorageConfig;
use kdl::KdlNode;

/// storage ノードをパース
pub fn parse_storage(node: &KdlNode, mut storage: StorageConfig) -> Result<StorageConfig> {
    let Some(children) = node.children() else {
        return Ok(storage);
    };

    for child in children.nodes() {
        match child.name().value() {
            "bucket" => storage.bucket = required_string(child, "storage.bucket")?,
            "queue" => storage.queue = required_string(child, "storage.queue")?,
            "prefix" => storage.prefix = required_string(child, "storage.prefix")?,
            "rule-id" | "rule_id" => storage.rule_id = required_string(child, "storage.rule-id")?,
            "transition-days" | "transition_days" => {
                storage.transition_days = u32_arg(child, "storage.transition-days")?;
            }
            "storage-class" | "storage_class" => {
                storage.storage_class = required_string(child, "storage.storage-class")?;
            }
            "expiration-days" | "expiration_days" => {
                storage.expiration_days = u32_arg(child, "storage.expiration-days")?;
            }
            "events" => {
                let events = string_args(child);
                if events.is_empty() {
                    return Err(StackError::InvalidConfig(
                        "storage.events: イベント名を 1 つ以上指定してください".to_string(),
                    ));
                }
                storage.events = events;
            }
            _ => {}
        }
    }

    Ok(storage)
}
