//! エンジン形式（Terraform JSON）への合成

use crate::error::{Result, StackError};
use crate::stack::SynthesizedStack;
use serde_json::{Map, Value as Json, json};
use std::path::{Path, PathBuf};

/// 合成結果のファイル名
pub const MAIN_FILE: &str = "main.tf.json";

/// スタックを Terraform JSON ドキュメントに変換
///
/// リソースは依存順に並べる（エンジンは順序に依存しないが差分が読みやすくなる）。
pub fn to_terraform_json(stack: &SynthesizedStack) -> Json {
    let mut required = Map::new();
    let mut providers = Map::new();
    for provider in stack.providers() {
        required.insert(
            provider.name.clone(),
            json!({ "source": provider.source, "version": provider.version }),
        );
        let config: Map<String, Json> = provider
            .config
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        providers.insert(provider.name.clone(), Json::Object(config));
    }

    let mut resources: Map<String, Json> = Map::new();
    for resource in stack.graph().topological_order() {
        let mut body = match resource.to_json() {
            Json::Object(map) => map,
            _ => Map::new(),
        };
        if !resource.depends_on.is_empty() {
            body.insert(
                "depends_on".to_string(),
                Json::Array(
                    resource
                        .depends_on
                        .iter()
                        .map(|d| Json::String(d.to_string()))
                        .collect(),
                ),
            );
        }

        let by_type = resources
            .entry(resource.kind().type_name())
            .or_insert_with(|| Json::Object(Map::new()));
        if let Json::Object(by_type) = by_type {
            by_type.insert(resource.address.name.clone(), Json::Object(body));
        }
    }

    let mut outputs = Map::new();
    for output in stack.outputs() {
        let mut body = Map::new();
        body.insert("value".to_string(), output.value.to_json());
        if let Some(description) = &output.description {
            body.insert("description".to_string(), Json::String(description.clone()));
        }
        if output.sensitive {
            body.insert("sensitive".to_string(), Json::Bool(true));
        }
        outputs.insert(output.name.clone(), Json::Object(body));
    }

    json!({
        "terraform": { "required_providers": required },
        "provider": providers,
        "resource": resources,
        "output": outputs,
    })
}

/// `<out_dir>/<stack>/main.tf.json` に書き出す
pub fn write(stack: &SynthesizedStack, out_dir: &Path) -> Result<PathBuf> {
    let dir = out_dir.join(stack.name());
    std::fs::create_dir_all(&dir).map_err(|e| StackError::IoError {
        path: dir.clone(),
        message: e.to_string(),
    })?;

    let path = dir.join(MAIN_FILE);
    let content = serde_json::to_string_pretty(&to_terraform_json(stack))?;
    std::fs::write(&path, content).map_err(|e| StackError::IoError {
        path: path.clone(),
        message: e.to_string(),
    })?;

    tracing::info!(path = %path.display(), "Wrote synthesized stack");
    Ok(path)
}
