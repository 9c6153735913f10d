//! Probes of the build host: CPU architecture, running kernel, tools on PATH.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::process::{self, Cmd};

pub trait Host {
    /// Machine hardware name, as `uname -m` reports it.
    fn machine(&self) -> Result<String>;

    /// Release of the running kernel, as `uname -r` reports it.
    fn running_kernel(&self) -> Result<String>;

    fn find_tool(&self, name: &str) -> Option<PathBuf>;
}

/// The machine this process runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl SystemHost {
    fn uname(flag: &str) -> Result<String> {
        Cmd::new("uname")
            .arg(flag)
            .run()
            .map(|r| r.trimmed().to_string())
            .map_err(|e| Error::external("uname", e))
    }
}

impl Host for SystemHost {
    fn machine(&self) -> Result<String> {
        Self::uname("-m")
    }

    fn running_kernel(&self) -> Result<String> {
        Self::uname("-r")
    }

    fn find_tool(&self, name: &str) -> Option<PathBuf> {
        process::which(name)
    }
}
