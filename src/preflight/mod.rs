//! Preflight checks.
//!
//! Validates host tools and the build environment before starting a build.
//! Run with `bliss-initramfs preflight` to check everything is ready.

mod environment;
mod host_tools;
mod types;

use std::path::Path;

use anyhow::{bail, Result};
use tracing::info;

use crate::host::Host;

pub use host_tools::{missing_required_tools, REQUIRED_TOOLS};
pub use types::{CheckResult, CheckStatus, PreflightReport};

/// Run all preflight checks.
pub fn run_preflight(
    host: &dyn Host,
    source_root: &Path,
    output_dir: &Path,
    kernel: Option<&str>,
) -> PreflightReport {
    let mut checks = Vec::new();

    info!("Checking host tools...");
    checks.extend(host_tools::check_host_tools(host));

    info!("Checking build environment...");
    checks.extend(environment::check_build_environment(
        host,
        source_root,
        output_dir,
        kernel,
    ));

    PreflightReport::new(checks)
}

/// Run preflight checks and fail if any check fails.
pub fn run_preflight_or_fail(
    host: &dyn Host,
    source_root: &Path,
    output_dir: &Path,
    kernel: Option<&str>,
) -> Result<()> {
    let report = run_preflight(host, source_root, output_dir, kernel);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed with {} error(s). Fix the issues above before building.",
            report.fail_count()
        );
    }
    Ok(())
}
