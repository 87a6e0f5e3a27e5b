use crate::EngineKind;
use crate::utils;
use colored::Colorize;
use std::path::Path;
use tierflow_cloud::{PlanOptions, ResourceSet};

pub async fn handle(
    stack_path: &Path,
    engine: Option<EngineKind>,
    replace: Vec<String>,
) -> anyhow::Result<()> {
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

    Ok(())
}
