use crate::utils;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::Path;

pub fn handle(stack_path: &Path) -> anyhow::Result<()> {
    println!("{}", "スタックを検証中...".blue());
    let stack = utils::load_stack_or_exit(stack_path);
    let graph = stack.graph();

    println!("{}", "✓ スタックは正常です！".green().bold());
    println!();
    println!("サマリー:");
    println!("  スタック: {} ({})", stack.name().cyan(), stack.region());

    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    for resource in graph.resources() {
        *by_type.entry(resource.kind().type_name()).or_default() += 1;
    }
    println!(
        "  リソース: {}個 (依存 {}本, {}段)",
        graph.len(),
        graph.edge_count(),
        graph.waves().len()
    );
    for (type_name, count) in &by_type {
        println!("    - {} × {}", type_name.cyan(), count);
    }

    println!("  出力: {}個", stack.outputs().len());
    for output in stack.outputs() {
        let marker = if output.sensitive { " (sensitive)" } else { "" };
        println!("    - {}{}", output.name.cyan(), marker.dimmed());
    }

    Ok(())
}
