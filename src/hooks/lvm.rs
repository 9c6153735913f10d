//! LVM hook (volume manager).
//!
//! A statically linked `lvm.static` is preferred. When the host does not
//! ship one the dynamic `lvm` is used and its libraries end up in the
//! binary closure instead.

use std::path::Path;

use super::{first_present, Hook, HookKind, HookState};

#[derive(Debug)]
pub struct Lvm {
    state: HookState,
}

impl Lvm {
    pub fn new(source_root: &Path) -> Self {
        Self {
            state: HookState::with_files([first_present(
                source_root,
                "/sbin/lvm.static",
                "/sbin/lvm",
            )]),
        }
    }
}

impl Hook for Lvm {
    fn kind(&self) -> HookKind {
        HookKind::Lvm
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_prefers_static_lvm() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sbin")).unwrap();
        fs::write(dir.path().join("sbin/lvm.static"), "").unwrap();

        assert_eq!(Lvm::new(dir.path()).files(), ["/sbin/lvm.static".to_string()]);
    }

    #[test]
    fn test_dynamic_lvm_fallback() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Lvm::new(dir.path()).files(), ["/sbin/lvm".to_string()]);
    }
}
