//! スタック（ルートアグリゲーター）
//!
//! プロバイダーを 1 度だけ設定し、Network → Database → Storage → KeyValueTable
//! の順にブロックを宣言する。順序の保証は依存グラフが行う。

use crate::blocks::{
    DatabaseHandle, Declarations, NetworkHandle, Scope, StorageHandle, TableHandle, database,
    key_value_table, network, storage,
};
use crate::error::{Result, StackError};
use crate::graph::ResourceGraph;
use crate::model::{Output, StackConfig, Value};
use crate::validate::validate;
use std::collections::{BTreeMap, BTreeSet};

/// プロバイダー設定
#[derive(Debug, Clone, PartialEq)]
pub struct Provider {
    /// `aws` / `random`
    pub name: String,
    /// レジストリ上のソース（例: hashicorp/aws）
    pub source: String,
    pub version: String,
    pub config: BTreeMap<String, Value>,
}

impl Provider {
    pub fn aws(region: &str) -> Self {
        Self {
            name: "aws".to_string(),
            source: "hashicorp/aws".to_string(),
            version: "~> 5.0".to_string(),
            config: BTreeMap::from([("region".to_string(), Value::from(region))]),
        }
    }

    pub fn random() -> Self {
        Self {
            name: "random".to_string(),
            source: "hashicorp/random".to_string(),
            version: "~> 3.6".to_string(),
            config: BTreeMap::new(),
        }
    }
}

/// 各ブロックのハンドル
#[derive(Debug, Clone, PartialEq)]
pub struct StackHandles {
    pub network: NetworkHandle,
    pub database: Option<DatabaseHandle>,
    pub storage: Option<StorageHandle>,
    pub table: Option<TableHandle>,
}

/// 検証済みのスタック
///
/// [`Stack::synthesize`] を通してのみ得られるので、
/// エンジンに渡る値はすべて検証を通過している。
#[derive(Debug, Clone)]
pub struct SynthesizedStack {
    name: String,
    region: String,
    providers: Vec<Provider>,
    graph: ResourceGraph,
    outputs: Vec<Output>,
    handles: StackHandles,
}

impl SynthesizedStack {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn handles(&self) -> &StackHandles {
        &self.handles
    }
}

/// スタック
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    config: StackConfig,
}

impl Stack {
    pub fn new(config: StackConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// すべてのブロックを宣言し、グラフの構築と検証まで行う
    pub fn synthesize(&self) -> Result<SynthesizedStack> {
        let config = &self.config;
        let providers = vec![Provider::aws(&config.region), Provider::random()];

        let mut decls = Declarations::new();

        let (network_decls, network_handle) =
            network(&Scope::new("network"), &config.region, &config.network)?;
        decls.extend(network_decls);

        let database_handle = match &config.database {
            Some(db) => {
                let (db_decls, handle) = database(&Scope::new("database"), db, &network_handle)?;
                decls.extend(db_decls);
                Some(handle)
            }
            None => None,
        };

        let storage_handle = match &config.storage {
            Some(st) => {
                let (st_decls, handle) = storage(&Scope::new("storage"), st)?;
                decls.extend(st_decls);
                Some(handle)
            }
            None => None,
        };

        let table_handle = match &config.table {
            Some(table) => {
                let (table_decls, handle) = key_value_table(&Scope::new("table"), table)?;
                decls.extend(table_decls);
                Some(handle)
            }
            None => None,
        };

        let Declarations { resources, outputs } = decls;

        let configured: BTreeSet<&str> = providers.iter().map(|p| p.name.as_str()).collect();
        for resource in &resources {
            let provider = resource.kind().provider();
            if !configured.contains(provider) {
                return Err(StackError::ProviderNotConfigured {
                    provider: provider.to_string(),
                    resource: resource.address.to_string(),
                });
            }
        }

        let graph = ResourceGraph::build(resources)?;
        let outputs = check_outputs(&graph, outputs)?;

        let violations = validate(&graph);
        if !violations.is_empty() {
            return Err(StackError::Validation(violations));
        }

        tracing::info!(
            stack = %config.name,
            resources = graph.len(),
            outputs = outputs.len(),
            "Synthesized stack"
        );

        Ok(SynthesizedStack {
            name: config.name.clone(),
            region: config.region.clone(),
            providers,
            graph,
            outputs,
            handles: StackHandles {
                network: network_handle,
                database: database_handle,
                storage: storage_handle,
                table: table_handle,
            },
        })
    }
}

/// 出力名の重複と参照先を検査し、機密属性を参照する出力を sensitive にする
fn check_outputs(graph: &ResourceGraph, outputs: Vec<Output>) -> Result<Vec<Output>> {
    let mut names = BTreeSet::new();
    let mut checked = Vec::with_capacity(outputs.len());

    for mut output in outputs {
        if !names.insert(output.name.clone()) {
            return Err(StackError::DuplicateOutput(output.name));
        }

        let mut refs = Vec::new();
        output.value.collect_references(&mut refs);
        let mut sensitive = output.sensitive;
        for reference in refs {
            let Some(target) = graph.get(&reference.address) else {
                return Err(StackError::DanglingReference {
                    from: format!("output.{}", output.name),
                    reference: reference.to_string(),
                });
            };
            if !target.exposes(&reference.attribute) {
                return Err(StackError::UnknownAttribute {
                    from: format!("output.{}", output.name),
                    target: reference.address.to_string(),
                    attribute: reference.attribute.clone(),
                });
            }
            if target
                .kind()
                .sensitive_attributes()
                .contains(&reference.attribute.as_str())
            {
                sensitive = true;
            }
        }
        output.sensitive = sensitive;
        checked.push(output);
    }

    Ok(checked)
}
