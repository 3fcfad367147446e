//! Project initialization and pipeline listing.

use anyhow::Result;
use std::path::Path;

use draftgate::config::{CONFIG_FILE, Config, DraftgateToml};

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    use draftgate::init::{init_project, is_initialized};

    let was_initialized = is_initialized(project_dir);
    let result = init_project(project_dir)?;

    if result.created {
        println!(
            "Initialized draftgate project at {}",
            result.draftgate_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .draftgate/");
        println!("  ├── draftgate.toml   # Pipeline, generator and logging settings");
        println!("  └── checkpoints/     # Saved sessions");
        println!();
        println!("Next steps:");
        println!("  1. Set [generator] command in .draftgate/draftgate.toml");
        println!("  2. Run `draftgate start --input requirements=\"...\"`");
        println!("  3. Review with `draftgate resume <session>`");
    } else if was_initialized {
        println!(
            "Draftgate project already initialized at {}",
            result.draftgate_dir.display()
        );
        println!("Directory structure verified.");
    }

    let toml = DraftgateToml::load(&result.draftgate_dir.join(CONFIG_FILE))?;
    for warning in toml.validate() {
        println!("{} {}", console::style("warning:").yellow(), warning);
    }

    Ok(())
}

pub fn cmd_stages(config: &Config) -> Result<()> {
    let machine = super::load_machine(config)?;

    println!();
    println!("Pipeline: {}", machine.name());
    println!();
    println!("{:<4} {:<14} {:<8} {:<16} Title", "#", "Stage", "Review", "Depends on");
    println!(
        "{:<4} {:<14} {:<8} {:<16} -----",
        "----", "--------------", "------", "----------------"
    );

    for (i, stage) in machine.stages().iter().enumerate() {
        let depends = if stage.depends_on.is_empty() {
            "-".to_string()
        } else {
            stage.depends_on.join(",")
        };
        println!(
            "{:<4} {:<14} {:<8} {:<16} {}",
            i + 1,
            stage.name,
            if stage.review { "yes" } else { "no" },
            depends,
            stage.display_title()
        );
        if let Some(fan_out) = &stage.fan_out {
            println!(
                "     {}",
                console::style(format!(
                    "fan-out over {} (max {} parallel)",
                    fan_out.from, fan_out.max_parallel
                ))
                .dim()
            );
        }
        if let Some(target) = &stage.on_reject {
            println!(
                "     {}",
                console::style(format!("on reject: back to {}", target)).dim()
            );
        }
    }
    println!();
    Ok(())
}
