use crate::CadsyncContext;
use crate::output;
use anyhow::Result;
use colored::Colorize;

/// Execute config command to get/set configuration values
///
/// # Errors
///
/// Returns an error if:
/// - Failed to set or unset configuration value
/// - Failed to save configuration
pub fn execute(
    ctx: &mut CadsyncContext,
    key: Option<&str>,
    value: Option<String>,
    unset: bool,
    list: bool,
) -> Result<()> {
    // If --list flag is set or no key is provided, show all configuration
    let Some(key) = key.filter(|_| !list) else {
        show_all_config(ctx);
        return Ok(());
    };

    if unset {
        ctx.config.unset(key)?;
        ctx.config.save(&ctx.config_path)?;
        output::success(&format!("Unset {key}"));
    } else if let Some(val) = value {
        ctx.config.set(key, val.clone())?;
        ctx.config.save(&ctx.config_path)?;
        output::success(&format!("Set {key} = {val}"));
    } else if let Some(val) = ctx.config.get(key) {
        println!("{val}");
    } else {
        output::warning(&format!("Configuration key '{key}' is not set"));
    }

    Ok(())
}

/// Show all configuration values grouped by section
fn show_all_config(ctx: &CadsyncContext) {
    let mut section = "";
    for (key, value) in ctx.config.list() {
        let (sect, field) = key.split_once('.').unwrap_or(("", key));
        if sect != section {
            if !section.is_empty() {
                println!();
            }
            println!("{}", format!("[{sect}]").bold());
            section = sect;
        }
        println!("  {field} = {value}");
    }
    output::verbose(&format!("user = {} (effective)", ctx.user));
}
