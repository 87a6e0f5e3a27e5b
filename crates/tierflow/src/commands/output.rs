use crate::EngineKind;
use crate::utils;
use colored::Colorize;
use std::path::Path;
use tierflow_cloud::ResourceSet;

pub async fn handle(stack_path: &Path, engine: Option<EngineKind>, json: bool) -> anyhow::Result<()> {
    let stack = tierflow_core::load_stack(stack_path)?;
    let resources = ResourceSet::from_stack(&stack);

    let engine = utils::create_engine(engine, stack_path, &resources).await?;
    let outputs = engine.outputs().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
        return Ok(());
    }

    if outputs.is_empty() {
        println!(
            "{}",
            "出力がありません。先に tier apply を実行してください".yellow()
        );
        return Ok(());
    }

    for declared in &resources.outputs {
        let Some(value) = outputs.get(&declared.name) else {
            continue;
        };
        let shown = if declared.sensitive {
            "(sensitive)".dimmed().to_string()
        } else {
            match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        };
        println!("{} = {}", declared.name.cyan(), shown);
    }

    Ok(())
}
