//! LUKS hook (disk encryption). gpg is carried for encrypted keyfiles.

use super::{Hook, HookKind, HookState};

#[derive(Debug)]
pub struct Luks {
    state: HookState,
}

impl Luks {
    pub fn new() -> Self {
        Self {
            state: HookState::with_files(["/sbin/cryptsetup", "/usr/bin/gpg", "/usr/bin/gpg-agent"]),
        }
    }
}

impl Default for Luks {
    fn default() -> Self {
        Self::new()
    }
}

impl Hook for Luks {
    fn kind(&self) -> HookKind {
        HookKind::Luks
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
