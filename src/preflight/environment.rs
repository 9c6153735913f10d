//! Build environment checks (architecture, kernel modules, output dir).

use std::fs;
use std::path::Path;

use crate::context::{host_path, modules_path, Architecture};
use crate::host::Host;

use super::types::{CheckResult, CheckStatus};

pub fn check_build_environment(
    host: &dyn Host,
    source_root: &Path,
    output_dir: &Path,
    kernel: Option<&str>,
) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let arch = host
        .machine()
        .and_then(|machine| Architecture::from_machine(&machine));
    results.push(match arch {
        Ok(arch) => CheckResult::new("architecture", CheckStatus::Pass).with_details(arch.to_string()),
        Err(e) => CheckResult::new("architecture", CheckStatus::Fail).with_details(e.to_string()),
    });

    let kernel = match kernel {
        Some(k) => Ok(k.to_string()),
        None => host.running_kernel(),
    };
    match kernel {
        Ok(kernel) => {
            let dir = host_path(source_root, &modules_path(&kernel));
            let (status, details) = if dir.is_dir() {
                (CheckStatus::Pass, dir.display().to_string())
            } else {
                (CheckStatus::Fail, format!("{} doesn't exist", dir.display()))
            };
            results.push(CheckResult::new("kernel modules", status).with_details(details));
        }
        Err(e) => results.push(
            CheckResult::new("kernel modules", CheckStatus::Warn).with_details(e.to_string()),
        ),
    }

    let marker = output_dir.join(".bliss-preflight");
    results.push(match fs::write(&marker, "test") {
        Ok(()) => {
            let _ = fs::remove_file(&marker);
            CheckResult::new("output dir writable", CheckStatus::Pass)
        }
        Err(e) => CheckResult::new("output dir writable", CheckStatus::Fail)
            .with_details(format!("Cannot write to {}: {}", output_dir.display(), e)),
    });

    results
}
