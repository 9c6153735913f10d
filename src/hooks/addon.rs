//! Addon hook: extra kernel modules requested by name.
//!
//! Unlike the other hooks its entries are module names ("zfs"), not paths.
//! They are located under `/lib/modules/<kernel>` by the module resolver.

use super::{FileKind, Hook, HookKind, HookState};

#[derive(Debug, Default)]
pub struct Addon {
    state: HookState,
}

impl Addon {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Hook for Addon {
    fn kind(&self) -> HookKind {
        HookKind::Addon
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
        let name = file.trim();
        if !name.is_empty() {
            self.state.add(name.to_string());
        }
    }

    fn file_kind(&self) -> FileKind {
        FileKind::ModuleName
    }
}
