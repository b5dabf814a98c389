use super::CliContext;
use crate::ConfigCommands;
use anyhow::{Context, Result};
use berth_config::save;

pub fn run(ctx: &CliContext, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => show(ctx),
        ConfigCommands::Set {
            default_shell,
            default_root,
            termination_grace_ms,
            source_profiles,
        } => {
            let mut settings = ctx.settings.clone();
            if let Some(shell) = default_shell {
                settings.default_shell = shell;
            }
            if let Some(root) = default_root {
                settings.default_project_root = Some(
                    std::path::absolute(&root)
                        .with_context(|| format!("Invalid root {}", root.display()))?,
                );
            }
            if let Some(grace) = termination_grace_ms {
                settings.termination_grace_ms = grace;
            }
            if let Some(source) = source_profiles {
                settings.source_profiles = source;
            }

            save(&settings, &ctx.config_path).with_context(|| {
                format!("Failed to save settings to {}", ctx.config_path.display())
            })?;
            println!("Settings saved to {}", ctx.config_path.display());
            Ok(())
        }
    }
}

fn show(ctx: &CliContext) -> Result<()> {
    println!("# settings: {}", ctx.config_path.display());
    if let Ok(path) = ctx.database_path() {
        println!("# database: {}", path.display());
    }
    print!("{}", serde_yaml::to_string(&ctx.settings)?);
    Ok(())
}
