use crate::EngineKind;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tierflow_cloud::{ActionType, Engine, LocalEngine, Plan, ResourceSet};
use tierflow_cloud_terraform::TerraformEngine;
use tierflow_config::Settings;
use tierflow_core::{StackError, SynthesizedStack};

/// --file 指定がなければスタックファイルを検索
pub fn resolve_stack_path(file: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match file {
        Some(path) if path.exists() => Ok(path),
        Some(path) => Err(anyhow::anyhow!(
            "スタックファイルが見つかりません: {}",
            path.display()
        )),
        None => Ok(tierflow_config::find_stack_file()?),
    }
}

/// 状態ディレクトリを置くプロジェクトルート
///
/// スタックファイルのあるディレクトリ。`.tierflow/` 内にある場合はその親。
pub fn project_root(stack_path: &Path) -> PathBuf {
    let dir = stack_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if dir.file_name().is_some_and(|name| name == ".tierflow")
        && let Some(parent) = dir.parent()
    {
        return parent.to_path_buf();
    }
    dir.to_path_buf()
}

/// スタックを読み込む。検証エラーは一覧表示して終了
pub fn load_stack_or_exit(stack_path: &Path) -> SynthesizedStack {
    println!(
        "📄 スタックファイル: {}",
        stack_path.display().to_string().cyan()
    );
    match tierflow_core::load_stack(stack_path) {
        Ok(stack) => stack,
        Err(e) => {
            print_stack_error(&e);
            std::process::exit(1);
        }
    }
}

pub fn print_stack_error(error: &StackError) {
    eprintln!();
    eprintln!("{}", "✗ 設定エラー".red().bold());
    match error {
        StackError::Validation(violations) => {
            for violation in violations {
                eprintln!(
                    "  • [{}] {}: {}",
                    violation.rule.to_string().yellow(),
                    violation.resource.cyan(),
                    violation.message
                );
            }
        }
        other => eprintln!("  {}", other),
    }
}

/// エンジンを生成して利用可能か確認
pub async fn create_engine(
    kind: Option<EngineKind>,
    stack_path: &Path,
    resources: &ResourceSet,
) -> anyhow::Result<Box<dyn Engine>> {
    let settings = Settings::load().unwrap_or_else(|e| {
        tracing::warn!("ユーザー設定を読み込めません: {}", e);
        Settings::default()
    });

    let kind = match kind {
        Some(kind) => kind,
        None => match settings.engine.as_deref() {
            Some("terraform") => EngineKind::Terraform,
            Some("local") | None => EngineKind::Local,
            Some(other) => anyhow::bail!("未知のエンジン: {}", other),
        },
    };

    let root = project_root(stack_path);
    let engine: Box<dyn Engine> = match kind {
        EngineKind::Local => Box::new(LocalEngine::new(
            &root,
            &resources.stack,
            &resources.region,
        )),
        EngineKind::Terraform => {
            let mut engine = TerraformEngine::new(&root, &resources.stack);
            if let Some(binary) = settings.terraform_binary {
                engine = engine.with_binary(binary);
            }
            Box::new(engine)
        }
    };

    let auth = engine.check_auth().await?;
    if !auth.authenticated {
        anyhow::bail!(
            "{} を使用できません: {}",
            engine.display_name(),
            auth.error.unwrap_or_default()
        );
    }
    tracing::debug!(
        engine = engine.name(),
        account = auth.account_info.as_deref().unwrap_or("-"),
        "Engine ready"
    );

    Ok(engine)
}

/// プランを表示
pub fn print_plan(plan: &Plan) {
    println!();
    if !plan.has_changes() {
        println!("{}", "✓ 変更はありません".green());
        println!("{}", plan.summary().to_string().dimmed());
        return;
    }

    println!("{}", "変更内容:".bold());
    for action in plan.changes() {
        let symbol = match action.action_type {
            ActionType::Create => action.action_type.symbol().green(),
            ActionType::Update => action.action_type.symbol().yellow(),
            ActionType::Replace => action.action_type.symbol().magenta(),
            ActionType::Delete => action.action_type.symbol().red(),
            ActionType::NoOp => action.action_type.symbol().normal(),
        };
        println!("  {} {}", symbol, action.description);
    }
    println!();
    println!("{}", plan.summary().to_string().bold());
}
