//! Show command - displays information.

use anyhow::Result;

use crate::config::Config;
use crate::selection;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Show the hook selection menu
    Menu,
}

/// Execute the show command.
pub fn cmd_show(target: ShowTarget, config: &Config) -> Result<()> {
    match target {
        ShowTarget::Config => config.print(),
        ShowTarget::Menu => print!("{}", selection::menu_text()),
    }
    Ok(())
}
