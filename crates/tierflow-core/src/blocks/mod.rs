//! ブロックビルダー
//!
//! 各ブロックは (スコープ, 型付き設定, 読み取り専用の入力) から
//! リソース宣言と公開ハンドルを返す純粋関数として実装されています。
//! ブロック間で可変状態は共有しません。

mod database;
mod network;
mod storage;
mod table;

pub use database::{DatabaseHandle, database};
pub use network::{NetworkHandle, SubnetHandle, network};
pub use storage::{StorageHandle, storage};
pub use table::{ScalingHandle, TableHandle, key_value_table};

use crate::model::{Output, Resource, ResourceAddress, ResourceKind};

/// リソース名の接頭辞
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    prefix: String,
}

impl Scope {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: sanitize(&prefix.into()),
        }
    }

    /// スコープ内のローカル ID からスタック内で一意な名前を作る
    pub fn name(&self, id: &str) -> String {
        format!("{}_{}", self.prefix, sanitize(id))
    }

    /// スコープ内に新しいリソースを作る
    pub fn resource(&self, kind: ResourceKind, id: &str) -> Resource {
        Resource::new(kind, self.name(id))
    }
}

/// エンジンのリソース名として使えない文字を `_` に置き換える
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// ブロックが追加するリソースと出力
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    pub resources: Vec<Resource>,
    pub outputs: Vec<Output>,
}

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }

    /// リソースを追加してアドレスを返す
    pub fn add(&mut self, resource: Resource) -> ResourceAddress {
        let address = resource.address.clone();
        self.resources.push(resource);
        address
    }

    pub fn output(&mut self, output: Output) {
        self.outputs.push(output);
    }

    pub fn extend(&mut self, other: Declarations) {
        self.resources.extend(other.resources);
        self.outputs.extend(other.outputs);
    }

    pub fn count(&self, kind: ResourceKind) -> usize {
        self.resources.iter().filter(|r| r.kind() == kind).count()
    }

    pub fn find(&self, address: &ResourceAddress) -> Option<&Resource> {
        self.resources.iter().find(|r| &r.address == address)
    }
}
