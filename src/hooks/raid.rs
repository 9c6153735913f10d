//! RAID hook (mdadm).

use super::{Hook, HookKind, HookState};

#[derive(Debug)]
pub struct Raid {
    state: HookState,
}

impl Raid {
    pub fn new() -> Self {
        Self {
            state: HookState::with_files(["/sbin/mdadm", "/etc/mdadm.conf"]),
        }
    }
}

impl Default for Raid {
    fn default() -> Self {
        Self::new()
    }
}

impl Hook for Raid {
    fn kind(&self) -> HookKind {
        HookKind::Raid
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
