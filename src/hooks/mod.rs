//! Hooks: one composable unit per optional early-boot subsystem.
//!
//! Each hook contributes a list of files and an enable flag. The set of
//! variants is fixed; the registry owns exactly one instance of each and is
//! the only place that dispatches on [`HookKind`].
//!
//! ```text
//! HookRegistry
//!   Base   (always enabled)   /bin/busybox, /bin/bash, ...
//!   Zfs                       /sbin/zfs, /sbin/zpool, ...
//!   Lvm                       /sbin/lvm.static
//!   Raid                      /sbin/mdadm, /etc/mdadm.conf
//!   Luks                      /sbin/cryptsetup, /usr/bin/gpg, ...
//!   Addon                     module names -> module closure
//! ```

pub mod addon;
pub mod base;
pub mod luks;
pub mod lvm;
pub mod raid;
pub mod zfs;

pub use addon::Addon;
pub use base::{Base, KMOD_LINKS};
pub use luks::Luks;
pub use lvm::Lvm;
pub use raid::Raid;
pub use zfs::Zfs;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Identity of a hook. Declaration order is the order hooks are checked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum HookKind {
    Base,
    /// Filesystem volume manager.
    Zfs,
    /// Volume manager.
    Lvm,
    /// RAID manager.
    Raid,
    /// Disk encryption.
    Luks,
    /// User specified kernel modules.
    Addon,
}

impl HookKind {
    pub const ALL: [HookKind; 6] = [
        HookKind::Base,
        HookKind::Zfs,
        HookKind::Lvm,
        HookKind::Raid,
        HookKind::Luks,
        HookKind::Addon,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HookKind::Base => "Base",
            HookKind::Zfs => "ZFS",
            HookKind::Lvm => "LVM",
            HookKind::Raid => "RAID",
            HookKind::Luks => "LUKS",
            HookKind::Addon => "Addon",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the entries of [`Hook::files`] name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Absolute paths on the source system.
    Path,
    /// Kernel module names, fed to the module closure.
    ModuleName,
}

/// Capability set shared by every hook variant.
pub trait Hook: fmt::Debug {
    fn kind(&self) -> HookKind;
    fn enable(&mut self);
    fn is_enabled(&self) -> bool;
    fn files(&self) -> &[String];
    /// Append an entry. Entries already present are ignored.
    fn add_file(&mut self, file: &str);

    fn file_kind(&self) -> FileKind {
        FileKind::Path
    }
}

/// Enable flag and file list backing every hook variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookState {
    enabled: bool,
    files: Vec<String>,
}

impl HookState {
    pub fn with_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = Self::default();
        for file in files {
            state.add(file.into());
        }
        state
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn add(&mut self, file: String) {
        if !self.files.contains(&file) {
            self.files.push(file);
        }
    }
}

/// Return `preferred` if it exists under `source_root`, otherwise `fallback`.
pub(crate) fn first_present(source_root: &Path, preferred: &str, fallback: &str) -> String {
    let rel = preferred.trim_start_matches('/');
    if source_root.join(rel).exists() {
        preferred.to_string()
    } else {
        fallback.to_string()
    }
}

/// The fixed set of hooks for one build.
#[derive(Debug)]
pub struct HookRegistry {
    hooks: BTreeMap<HookKind, Box<dyn Hook>>,
}

impl HookRegistry {
    /// Create all six hooks. Only Base starts enabled.
    ///
    /// `source_root` is consulted for hooks whose file list depends on
    /// where the host installed a tool (e.g. `/sbin/kmod` vs `/bin/kmod`).
    pub fn new(source_root: &Path) -> Self {
        let mut hooks: BTreeMap<HookKind, Box<dyn Hook>> = BTreeMap::new();
        hooks.insert(HookKind::Base, Box::new(Base::new(source_root)));
        hooks.insert(HookKind::Zfs, Box::new(Zfs::new()));
        hooks.insert(HookKind::Lvm, Box::new(Lvm::new(source_root)));
        hooks.insert(HookKind::Raid, Box::new(Raid::new()));
        hooks.insert(HookKind::Luks, Box::new(Luks::new()));
        hooks.insert(HookKind::Addon, Box::new(Addon::new()));
        Self { hooks }
    }

    pub fn get(&self, kind: HookKind) -> &dyn Hook {
        self.hooks
            .get(&kind)
            .map(|hook| hook.as_ref())
            .unwrap_or_else(|| unreachable!("registry holds every hook kind"))
    }

    pub fn get_mut(&mut self, kind: HookKind) -> &mut dyn Hook {
        match self.hooks.get_mut(&kind) {
            Some(hook) => hook.as_mut(),
            None => unreachable!("registry holds every hook kind"),
        }
    }

    pub fn enable(&mut self, kind: HookKind) {
        self.get_mut(kind).enable();
    }

    pub fn is_enabled(&self, kind: HookKind) -> bool {
        self.get(kind).is_enabled()
    }

    /// Kinds of all enabled hooks.
    pub fn enabled(&self) -> BTreeSet<HookKind> {
        self.enabled_hooks().map(|hook| hook.kind()).collect()
    }

    /// Enabled hooks in check order.
    pub fn enabled_hooks(&self) -> impl Iterator<Item = &dyn Hook> {
        self.hooks
            .values()
            .map(|hook| hook.as_ref())
            .filter(|hook| hook.is_enabled())
    }

    /// Union of the file paths of every enabled path-contributing hook.
    pub fn required_files(&self) -> BTreeSet<PathBuf> {
        self.enabled_hooks()
            .filter(|hook| hook.file_kind() == FileKind::Path)
            .flat_map(|hook| hook.files().iter().map(PathBuf::from))
            .collect()
    }

    /// Module names requested by the addon hook, empty when it is disabled.
    pub fn addon_modules(&self) -> BTreeSet<String> {
        let addon = self.get(HookKind::Addon);
        if !addon.is_enabled() {
            return BTreeSet::new();
        }
        addon.files().iter().cloned().collect()
    }
}
