pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// スタックファイルのパスを直接指定する環境変数
pub const STACK_PATH_ENV: &str = "TIERFLOW_STACK_PATH";

/// 検索するスタックファイル名（優先順）
const CANDIDATES: [&str; 4] = ["stack.local.kdl", ".stack.local.kdl", "stack.kdl", ".stack.kdl"];

/// tierflowの設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("tierflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// プロジェクトのスタックファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 TIERFLOW_STACK_PATH (直接パス指定)
/// 2. カレントディレクトリ: stack.local.kdl, .stack.local.kdl, stack.kdl, .stack.kdl
/// 3. ./.tierflow/ ディレクトリ内: 同様の順序
pub fn find_stack_file() -> Result<PathBuf> {
    if let Ok(stack_path) = std::env::var(STACK_PATH_ENV) {
        let path = PathBuf::from(stack_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;
    find_stack_file_in(&current_dir)
}

/// `dir` とその `.tierflow/` からスタックファイルを探す
pub fn find_stack_file_in(dir: &Path) -> Result<PathBuf> {
    let search = |base: &Path| {
        CANDIDATES
            .iter()
            .map(|name| base.join(name))
            .find(|path| path.exists())
    };

    if let Some(path) = search(dir) {
        return Ok(path);
    }

    let tier_dir = dir.join(".tierflow");
    if tier_dir.is_dir()
        && let Some(path) = search(&tier_dir)
    {
        return Ok(path);
    }

    Err(ConfigError::StackFileNotFound)
}

/// ユーザー設定 (~/.config/tierflow/settings.json)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// --engine 未指定時に使うエンジン
    pub engine: Option<String>,
    /// terraform 互換バイナリ（例: tofu）
    pub terraform_binary: Option<String>,
}

impl Settings {
    /// 設定ディレクトリから読み込む（ファイルがなければデフォルト）
    pub fn load() -> Result<Self> {
        Self::load_from(&get_config_dir()?.join("settings.json"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| ConfigError::InvalidSettings {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}
