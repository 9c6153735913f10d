//! Host tool availability checks.

use crate::host::Host;

use super::types::{CheckResult, CheckStatus};

/// Tools a build cannot run without: (tool, package, purpose).
pub const REQUIRED_TOOLS: &[(&str, &str, &str)] = &[
    ("cpio", "cpio", "Required to create the initramfs archive"),
    ("gzip", "gzip", "Required to compress the archive and kernel modules"),
    ("depmod", "kmod", "Required to update module dependencies"),
];

/// Tools used for optional finishing steps.
const OPTIONAL_TOOLS: &[(&str, &str, &str)] = &[
    ("hostid", "coreutils", "Required to carry the host id into ZFS images"),
];

/// Required tools that are not on PATH.
pub fn missing_required_tools(host: &dyn Host) -> Vec<&'static str> {
    REQUIRED_TOOLS
        .iter()
        .map(|(tool, _, _)| *tool)
        .filter(|tool| host.find_tool(tool).is_none())
        .collect()
}

pub fn check_host_tools(host: &dyn Host) -> Vec<CheckResult> {
    let required = REQUIRED_TOOLS.iter().map(|t| (t, true));
    let optional = OPTIONAL_TOOLS.iter().map(|t| (t, false));

    required
        .chain(optional)
        .map(|(&(tool, package, purpose), required)| {
            match host.find_tool(tool) {
                Some(path) => {
                    CheckResult::new(tool, CheckStatus::Pass).with_details(path.display().to_string())
                }
                None => {
                    let status = if required {
                        CheckStatus::Fail
                    } else {
                        CheckStatus::Warn
                    };
                    CheckResult::new(tool, status).with_details(format!(
                        "Not found. Install '{}' package. {}",
                        package, purpose
                    ))
                }
            }
        })
        .collect()
}
