//! Base hook: the shell, busybox, kmod and udev every initramfs needs.

use std::path::Path;

use super::{first_present, Hook, HookKind, HookState};

/// Names that get a symlink to `kmod` inside the image.
pub const KMOD_LINKS: &[&str] = &["depmod", "insmod", "lsmod", "modinfo", "modprobe", "rmmod"];

#[derive(Debug)]
pub struct Base {
    state: HookState,
}

impl Base {
    /// Base is enabled from the start.
    pub fn new(source_root: &Path) -> Self {
        let mut state = HookState::with_files([
            "/bin/busybox".to_string(),
            first_present(source_root, "/sbin/kmod", "/bin/kmod"),
            "/bin/bash".to_string(),
            "/etc/bash/bashrc".to_string(),
            "/etc/DIR_COLORS".to_string(),
            "/etc/profile".to_string(),
            "/sbin/udevd".to_string(),
            "/sbin/udevadm".to_string(),
        ]);
        state.enable();
        Self { state }
    }
}

impl Hook for Base {
    fn kind(&self) -> HookKind {
        HookKind::Base
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
