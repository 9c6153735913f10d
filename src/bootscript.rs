//! Boot script rendering.
//!
//! The init script template carries named markers (`@USE_ZFS@`, ...)
//! instead of relying on fixed line numbers. The builder only supplies the
//! values; the template decides where they go.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::hooks::{HookKind, HookRegistry};

/// Values handed to the init script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootConfig {
    pub version: String,
    pub use_raid: bool,
    pub use_lvm: bool,
    pub use_luks: bool,
    pub use_zfs: bool,
    pub use_addon: bool,
    pub addon_modules: Vec<String>,
}

impl BootConfig {
    pub fn from_registry(registry: &HookRegistry) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            use_raid: registry.is_enabled(HookKind::Raid),
            use_lvm: registry.is_enabled(HookKind::Lvm),
            use_luks: registry.is_enabled(HookKind::Luks),
            use_zfs: registry.is_enabled(HookKind::Zfs),
            use_addon: registry.is_enabled(HookKind::Addon),
            addon_modules: registry.addon_modules().into_iter().collect(),
        }
    }

    /// Marker name to rendered value.
    pub fn values(&self) -> BTreeMap<&'static str, String> {
        let flag = |on: bool| if on { "1" } else { "0" }.to_string();
        BTreeMap::from([
            ("VERSION", self.version.clone()),
            ("USE_RAID", flag(self.use_raid)),
            ("USE_LVM", flag(self.use_lvm)),
            ("USE_LUKS", flag(self.use_luks)),
            ("USE_ZFS", flag(self.use_zfs)),
            ("USE_ADDON", flag(self.use_addon)),
            ("ADDON_MODULES", self.addon_modules.join(" ")),
        ])
    }

    /// Substitute every `@NAME@` marker in `template`.
    ///
    /// A marker-shaped token (`@` + uppercase/underscore + `@`) without a
    /// value is an error, so a renamed marker can't ship silently.
    pub fn render(&self, template: &str) -> Result<String> {
        let values = self.values();
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find('@') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            match marker_at(after) {
                Some(name) => {
                    let value = values
                        .get(name)
                        .ok_or_else(|| Error::UnresolvedPlaceholder(name.to_string()))?;
                    out.push_str(value);
                    rest = &after[name.len() + 1..];
                }
                None => {
                    out.push('@');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// If `s` starts with `NAME@`, return `NAME`.
fn marker_at(s: &str) -> Option<&str> {
    let end = s.find('@')?;
    let name = &s[..end];
    let valid = !name.is_empty()
        && name.starts_with(|c: char| c.is_ascii_uppercase())
        && name.chars().all(|c| c.is_ascii_uppercase() || c == '_');
    valid.then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BootConfig {
        BootConfig {
            version: "7.1.4".to_string(),
            use_raid: true,
            use_lvm: false,
            use_luks: true,
            use_zfs: false,
            use_addon: true,
            addon_modules: vec!["zfs".to_string(), "dm_crypt".to_string()],
        }
    }

    #[test]
    fn test_render_markers() {
        let template = "VERSION=\"@VERSION@\"\nUSE_RAID=@USE_RAID@\nUSE_LVM=@USE_LVM@\nMODULES=\"@ADDON_MODULES@\"\n";
        let out = config().render(template).unwrap();
        assert_eq!(
            out,
            "VERSION=\"7.1.4\"\nUSE_RAID=1\nUSE_LVM=0\nMODULES=\"zfs dm_crypt\"\n"
        );
    }

    #[test]
    fn test_plain_at_signs_untouched() {
        let template = "# mail jon@example.org\necho $@\n";
        assert_eq!(config().render(template).unwrap(), template);
    }

    #[test]
    fn test_unknown_marker() {
        let err = config().render("X=@USE_BTRFS@\n").unwrap_err();
        assert!(matches!(err, Error::UnresolvedPlaceholder(n) if n == "USE_BTRFS"));
    }

    #[test]
    fn test_shipped_template_renders() {
        let out = config().render(include_str!("../files/init")).unwrap();
        assert!(out.contains("USE_LUKS=1\n"));
        assert!(out.contains("ADDON_MODULES=\"zfs dm_crypt\""));
        assert!(out.contains("bliss-initramfs 7.1.4"));
        assert!(out.contains("\"${devices[@]}\""));
    }

    #[test]
    fn test_from_registry() {
        let mut registry = HookRegistry::new(std::path::Path::new("/nonexistent"));
        crate::selection::select_hooks(&mut registry, 1).unwrap();
        let boot = BootConfig::from_registry(&registry);
        assert!(boot.use_zfs && boot.use_addon);
        assert!(!boot.use_luks && !boot.use_raid && !boot.use_lvm);
        assert_eq!(boot.addon_modules, vec!["zfs".to_string()]);
    }
}
