//! ZFS hook (filesystem volume manager).

use super::{Hook, HookKind, HookState};

#[derive(Debug)]
pub struct Zfs {
    state: HookState,
}

impl Zfs {
    pub fn new() -> Self {
        Self {
            state: HookState::with_files(["/sbin/zfs", "/sbin/zpool", "/sbin/mount.zfs", "/sbin/zdb"]),
        }
    }
}

impl Default for Zfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Hook for Zfs {
    fn kind(&self) -> HookKind {
        HookKind::Zfs
    }

    fn enable(&mut self) {
        self.state.enable();
    }

    fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    fn files(&self) -> &[String] {
        self.state.files()
    }

    fn add_file(&mut self, file: &str) {
        self.state.add(file.to_string());
    }
}
