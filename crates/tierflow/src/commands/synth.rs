use crate::utils;
use colored::Colorize;
use std::path::Path;

pub fn handle(stack_path: &Path, out: &Path) -> anyhow::Result<()> {
    let stack = utils::load_stack_or_exit(stack_path);
    let path = tierflow_core::synth::write(&stack, out)?;

    println!(
        "{} {} ({}個のリソース)",
        "✓ 合成しました:".green().bold(),
        path.display().to_string().cyan(),
        stack.graph().len()
    );
    Ok(())
}
