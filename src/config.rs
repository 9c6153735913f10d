//! Configuration management for bliss-initramfs.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over .env file.
//! Command line flags take precedence over both (applied by the commands).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

/// bliss-initramfs configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Kernel release to build for (default: ask, offering `uname -r`)
    pub kernel: Option<String>,
    /// Menu choice token (default: show the menu)
    pub choice: Option<String>,
    /// Extra kernel modules for the addon hook
    pub addon_modules: Vec<String>,
    /// Root of the system files are taken from (default: /)
    pub source_root: PathBuf,
    /// Where the staging dir and archive go (default: working directory)
    pub output_dir: PathBuf,
    /// Directory holding the `init` template (default: <base>/files)
    pub files_dir: PathBuf,
}

impl Config {
    /// Load configuration from `<base_dir>/.env` and the environment.
    pub fn load(base_dir: &Path) -> Self {
        let mut vars = HashMap::new();

        let env_path = base_dir.join(".env");
        if env_path.exists() {
            match dotenvy::from_path_iter(&env_path) {
                Ok(iter) => {
                    for item in iter {
                        match item {
                            Ok((key, value)) => {
                                vars.insert(key, value);
                            }
                            Err(e) => warn!("Skipping bad line in {}: {}", env_path.display(), e),
                        }
                    }
                }
                Err(e) => warn!("Cannot read {}: {}", env_path.display(), e),
            }
        }

        // Environment variables override .env file
        vars.extend(std::env::vars());

        Self::from_vars(base_dir, &vars)
    }

    /// Build a config from already collected variables.
    pub fn from_vars(base_dir: &Path, vars: &HashMap<String, String>) -> Self {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let path = |key: &str, default: PathBuf| {
            get(key)
                .map(|s| {
                    let path = PathBuf::from(s);
                    if path.is_absolute() {
                        path
                    } else {
                        base_dir.join(path)
                    }
                })
                .unwrap_or(default)
        };

        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        Self {
            kernel: get("BLISS_KERNEL"),
            choice: get("BLISS_CHOICE"),
            addon_modules: get("BLISS_ADDON_MODULES")
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            source_root: path("BLISS_SOURCE_ROOT", PathBuf::from("/")),
            output_dir: path("BLISS_OUTPUT_DIR", cwd),
            files_dir: path("BLISS_FILES_DIR", base_dir.join("files")),
        }
    }

    /// Path of the boot script template.
    pub fn init_template(&self) -> PathBuf {
        self.files_dir.join("init")
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        let unset = "(ask)".to_string();
        println!("Configuration:");
        println!("  BLISS_KERNEL: {}", self.kernel.as_ref().unwrap_or(&unset));
        println!("  BLISS_CHOICE: {}", self.choice.as_ref().unwrap_or(&unset));
        println!("  BLISS_ADDON_MODULES: {}", self.addon_modules.join(" "));
        println!("  BLISS_SOURCE_ROOT: {}", self.source_root.display());
        println!("  BLISS_OUTPUT_DIR: {}", self.output_dir.display());
        println!("  BLISS_FILES_DIR: {}", self.files_dir.display());
        if self.init_template().is_file() {
            println!("  Init template: FOUND");
        } else {
            println!("  Init template: NOT FOUND ({})", self.init_template().display());
        }
    }
}
