//! Preflight command - runs preflight checks.

use anyhow::Result;

use crate::config::Config;
use crate::host::SystemHost;
use crate::preflight;

/// Execute the preflight command.
pub fn cmd_preflight(config: &Config, strict: bool) -> Result<()> {
    let host = SystemHost;
    let kernel = config.kernel.as_deref();
    if strict {
        preflight::run_preflight_or_fail(&host, &config.source_root, &config.output_dir, kernel)?;
    } else {
        let report =
            preflight::run_preflight(&host, &config.source_root, &config.output_dir, kernel);
        report.print();
        if !report.all_passed() {
            println!("Some checks failed. Use --strict to fail the build.");
        }
    }
    Ok(())
}
