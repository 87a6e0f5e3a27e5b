use crate::EngineKind;
use crate::utils;
use colored::Colorize;
use std::path::Path;
use tierflow_cloud::{ApplyResult, PlanOptions, ResourceSet};

pub async fn handle(
    stack_path: &Path,
    engine: Option<EngineKind>,
    yes: bool,
    replace: Vec<String>,
) -> anyhow::Result<()> {
    println!("{}", "変更を適用します...".blue().bold());
    let stack = utils::load_stack_or_exit(stack_path);
    let resources = ResourceSet::from_stack(&stack);

    let engine = utils::create_engine(engine, stack_path, &resources).await?;
    println!("エンジン: {}", engine.display_name().cyan());

    let options = PlanOptions {
        replace,
        destroy: false,
    };
    let plan = engine.plan(&resources, &options).await?;
    utils::print_plan(&plan);

    if !plan.has_changes() {
        return Ok(());
    }

    // 確認（--yesが指定されていない場合）
    if !yes {
        println!();
        println!("実行するには --yes オプションを指定してください");
        return Ok(());
    }

    println!();
    let result = engine.apply(&resources, &plan).await?;
    report(&result)?;

    println!();
    println!("{}", "✓ 適用が完了しました".green().bold());
    println!("出力を確認するには: {} output", "tier".cyan());
    Ok(())
}

/// 実行結果を表示し、失敗があればエラーにする
pub fn report(result: &ApplyResult) -> anyhow::Result<()> {
    for success in &result.succeeded {
        println!("  ✓ {}", success.message);
    }
    for failure in &result.failed {
        eprintln!("  {} {}: {}", "✗".red(), failure.action_id, failure.message);
    }
    println!(
        "{}",
        format!(
            "{}件成功, {}件失敗 ({}ms)",
            result.succeeded.len(),
            result.failed.len(),
            result.duration_ms
        )
        .dimmed()
    );

    if !result.is_success() {
        anyhow::bail!("適用に失敗しました。状態ファイルには成功した変更のみが記録されています");
    }
    Ok(())
}
