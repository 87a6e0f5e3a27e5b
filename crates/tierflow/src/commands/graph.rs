use crate::GraphFormat;
use crate::utils;
use colored::Colorize;
use std::path::Path;

pub fn handle(stack_path: &Path, format: GraphFormat) -> anyhow::Result<()> {
    let stack = utils::load_stack_or_exit(stack_path);
    let graph = stack.graph();

    match format {
        GraphFormat::Dot => print!("{}", graph.to_dot()),
        GraphFormat::Text => {
            println!();
            for (i, wave) in graph.waves().iter().enumerate() {
                println!("{}", format!("Wave {} ({}個):", i + 1, wave.len()).bold());
                for resource in wave {
                    let deps = graph.dependencies_of(&resource.address);
                    if deps.is_empty() {
                        println!("  • {}", resource.address.to_string().cyan());
                    } else {
                        let deps: Vec<String> = deps.iter().map(|d| d.to_string()).collect();
                        println!(
                            "  • {} {} {}",
                            resource.address.to_string().cyan(),
                            "←".dimmed(),
                            deps.join(", ").dimmed()
                        );
                    }
                }
            }
        }
    }

    Ok(())
}
