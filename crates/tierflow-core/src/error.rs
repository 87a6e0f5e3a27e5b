use crate::validate::Violation;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("無効な CIDR: {0}")]
    InvalidCidr(String),

    #[error("検証エラー ({} 件):\n{}", .0.len(), format_violations(.0))]
    Validation(Vec<Violation>),

    #[error("未定義のリソースへの参照: {from} -> {reference}")]
    DanglingReference { from: String, reference: String },

    #[error("リソース {target} は属性 '{attribute}' を持ちません（参照元: {from}）")]
    UnknownAttribute {
        from: String,
        target: String,
        attribute: String,
    },

    #[error("リソースが重複しています: {0}")]
    DuplicateResource(String),

    #[error("出力名が重複しています: {0}")]
    DuplicateOutput(String),

    #[error("プロバイダー '{provider}' が設定されていません（リソース: {resource}）")]
    ProviderNotConfigured { provider: String, resource: String },

    #[error("循環依存が検出されました: {0}")]
    CircularDependency(String),

    #[error("JSON エラー: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {}", v))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, StackError>;
