//! Build context shared by every resolver and pipeline stage.
//!
//! Constructed once the kernel is final; nothing mutates it afterwards.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::hooks::HookKind;

/// Target CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    X86_64,
}

impl Architecture {
    /// Parse a `uname -m` style name. Only x86_64 is supported.
    pub fn from_machine(machine: &str) -> Result<Self> {
        match machine.trim() {
            "x86_64" => Ok(Architecture::X86_64),
            other => Err(Error::UnsupportedArchitecture(other.to_string())),
        }
    }

    /// File name prefix of the platform dynamic loader.
    pub fn loader_prefix(&self) -> &'static str {
        match self {
            Architecture::X86_64 => "ld-linux-x86-64.so",
        }
    }

    /// Directories searched for shared libraries, relative to the source root.
    pub fn library_dirs(&self) -> &'static [&'static str] {
        match self {
            Architecture::X86_64 => &[
                "lib64",
                "usr/lib64",
                "lib",
                "usr/lib",
                "lib/x86_64-linux-gnu",
                "usr/lib/x86_64-linux-gnu",
            ],
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86_64 => f.write_str("x86_64"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildContext {
    kernel: String,
    arch: Architecture,
    hooks: BTreeSet<HookKind>,
    /// Root of the filesystem binaries and modules are taken from.
    source_root: PathBuf,
}

impl BuildContext {
    /// Create a context, failing if the kernel's module directory is missing.
    pub fn new(
        kernel: impl Into<String>,
        arch: Architecture,
        hooks: BTreeSet<HookKind>,
        source_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let ctx = Self {
            kernel: kernel.into(),
            arch,
            hooks,
            source_root: source_root.into(),
        };
        if !ctx.modules_dir().is_dir() {
            return Err(Error::ModulesDirectoryMissing(ctx.modules_dir()));
        }
        Ok(ctx)
    }

    pub fn kernel(&self) -> &str {
        &self.kernel
    }

    pub fn arch(&self) -> Architecture {
        self.arch
    }

    pub fn hooks(&self) -> &BTreeSet<HookKind> {
        &self.hooks
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Absolute module root as seen by the running system.
    pub fn modules_path(&self) -> PathBuf {
        modules_path(&self.kernel)
    }

    /// Module root on the host, under the source root.
    pub fn modules_dir(&self) -> PathBuf {
        self.host_path(&self.modules_path())
    }

    /// Map an absolute path of the source system onto the host.
    pub fn host_path(&self, path: &Path) -> PathBuf {
        host_path(&self.source_root, path)
    }

    /// Inverse of [`host_path`](Self::host_path). `None` if outside the source root.
    pub fn logical_path(&self, host: &Path) -> Option<PathBuf> {
        let rel = host.strip_prefix(&self.source_root).ok()?;
        Some(Path::new("/").join(rel))
    }

    /// Archive file name for this kernel.
    pub fn archive_name(&self) -> String {
        format!("initrd-{}", self.kernel)
    }
}

/// `/lib/modules/<kernel>`.
pub fn modules_path(kernel: &str) -> PathBuf {
    Path::new("/lib/modules").join(kernel)
}

/// Join an absolute path of the source system onto `source_root`.
pub fn host_path(source_root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix("/") {
        Ok(rel) => source_root.join(rel),
        Err(_) => source_root.join(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_architecture() {
        assert_eq!(Architecture::from_machine("x86_64\n").unwrap(), Architecture::X86_64);
        assert!(matches!(
            Architecture::from_machine("aarch64"),
            Err(Error::UnsupportedArchitecture(a)) if a == "aarch64"
        ));
    }

    #[test]
    fn test_missing_modules_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = BuildContext::new("6.1.0", Architecture::X86_64, BTreeSet::new(), dir.path())
            .unwrap_err();
        assert!(matches!(err, Error::ModulesDirectoryMissing(p) if p.ends_with("lib/modules/6.1.0")));
    }

    #[test]
    fn test_path_mapping() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib/modules/6.1.0")).unwrap();
        let ctx =
            BuildContext::new("6.1.0", Architecture::X86_64, BTreeSet::new(), dir.path()).unwrap();

        let host = ctx.host_path(Path::new("/sbin/mdadm"));
        assert_eq!(host, dir.path().join("sbin/mdadm"));
        assert_eq!(ctx.logical_path(&host).unwrap(), PathBuf::from("/sbin/mdadm"));
        assert_eq!(ctx.modules_path(), PathBuf::from("/lib/modules/6.1.0"));
        assert_eq!(ctx.archive_name(), "initrd-6.1.0");
    }
}
