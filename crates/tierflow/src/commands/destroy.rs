use crate::EngineKind;
use crate::commands::apply::report;
use crate::utils;
use colored::Colorize;
use std::path::Path;
use tierflow_cloud::{PlanOptions, ResourceSet};

pub async fn handle(stack_path: &Path, engine: Option<EngineKind>, yes: bool) -> anyhow::Result<()> {
    println!("{}", "スタックを削除します...".blue().bold());
    let stack = utils::load_stack_or_exit(stack_path);
    let resources = ResourceSet::from_stack(&stack);

    let engine = utils::create_engine(engine, stack_path, &resources).await?;
    println!("エンジン: {}", engine.display_name().cyan());

    let plan = engine.plan(&resources, &PlanOptions::destroy()).await?;
    utils::print_plan(&plan);

    if !plan.has_changes() {
        return Ok(());
    }

    if !yes {
        println!();
        println!(
            "{}",
            "警告: スタックのすべてのリソースを削除します。".yellow()
        );
        println!("実行するには --yes オプションを指定してください");
        return Ok(());
    }

    println!();
    let result = engine.destroy_all(&resources).await?;
    report(&result)?;

    println!();
    println!("{}", "✓ 削除が完了しました".green().bold());
    Ok(())
}
