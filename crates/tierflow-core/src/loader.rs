//! 統合ローダー
//!
//! スタックファイルの読み込み、パース、合成を統合

use crate::error::{Result, StackError};
use crate::model::StackConfig;
use crate::parser::parse_stack_string;
use crate::stack::{Stack, SynthesizedStack};
use std::path::Path;
use tracing::{debug, info, instrument};

/// スタックファイルを読み込んで設定を返す
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_stack_config(path: &Path) -> Result<StackConfig> {
    debug!("Reading stack file");
    let content = std::fs::read_to_string(path).map_err(|e| StackError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_stack_string(&content)
}

/// スタックファイルを読み込み、検証済みのスタックを合成
///
/// 以下の処理を実行:
/// 1. ファイル読み込み
/// 2. KDLパース
/// 3. ブロック宣言とグラフ構築
/// 4. グラフ全体の検証
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_stack(path: &Path) -> Result<SynthesizedStack> {
    let config = load_stack_config(path)?;

    debug!(stack = %config.name, "Synthesizing stack");
    let stack = Stack::new(config).synthesize()?;
    info!(
        stack = stack.name(),
        resources = stack.graph().len(),
        "Stack loaded successfully"
    );
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_stack() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack.kdl");
        fs::write(&path, "stack \"demo\"\n").unwrap();

        let stack = load_stack(&path).unwrap();
        assert_eq!(stack.name(), "demo");
        assert_eq!(stack.graph().len(), 38);
    }

    #[test]
    fn test_load_network_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack.kdl");
        fs::write(
            &path,
            "database enabled=#false\nstorage enabled=#false\ntable enabled=#false\n",
        )
        .unwrap();

        let stack = load_stack(&path).unwrap();
        assert_eq!(stack.graph().len(), 21);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = load_stack(&dir.path().join("missing.kdl"));
        assert!(matches!(result, Err(StackError::IoError { .. })));
    }

    #[test]
    fn test_contradictory_lifecycle_fails_before_engine() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack.kdl");
        fs::write(
            &path,
            "storage {\n  transition-days 400\n  expiration-days 365\n}\n",
        )
        .unwrap();

        assert!(matches!(load_stack(&path), Err(StackError::Validation(_))));
    }
}
