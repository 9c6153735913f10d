//! Menu choice to hook set.

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::hooks::{HookKind, HookRegistry};

/// Choice used when the menu prompt is answered with an empty line.
pub const DEFAULT_CHOICE: u8 = 1;

/// Choice that ends the program without building anything.
pub const EXIT_CHOICE: u8 = 11;

/// Menu entries, in menu order. The position + 1 is the choice number.
const MENU: &[(&str, &[HookKind])] = &[
    ("ZFS", &[HookKind::Zfs]),
    ("LVM", &[HookKind::Lvm]),
    ("RAID", &[HookKind::Raid]),
    ("LVM on RAID", &[HookKind::Raid, HookKind::Lvm]),
    ("Normal Boot", &[]),
    ("Encrypted ZFS", &[HookKind::Luks, HookKind::Zfs]),
    ("Encrypted LVM", &[HookKind::Luks, HookKind::Lvm]),
    ("Encrypted RAID", &[HookKind::Luks, HookKind::Raid]),
    (
        "Encrypted LVM on RAID",
        &[HookKind::Luks, HookKind::Raid, HookKind::Lvm],
    ),
    ("Encrypted Normal", &[HookKind::Luks]),
];

/// Result of applying a choice to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Build with these hooks enabled.
    Build(BTreeSet<HookKind>),
    /// The user picked "Exit". Nothing was enabled.
    Exit,
}

/// Parse a menu answer. An empty answer is the default choice.
pub fn parse_choice(token: &str) -> Result<u8> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(DEFAULT_CHOICE);
    }
    match token.parse::<u8>() {
        Ok(choice) if (1..=EXIT_CHOICE).contains(&choice) => Ok(choice),
        _ => Err(Error::InvalidSelection(token.to_string())),
    }
}

/// Hooks a choice enables on top of Base, or `None` for exit/invalid.
pub fn hooks_for(choice: u8) -> Option<&'static [HookKind]> {
    let index = usize::from(choice).checked_sub(1)?;
    MENU.get(index).map(|(_, hooks)| *hooks)
}

/// Enable the hooks for `choice` in `registry`.
///
/// The addon hook is enabled whenever it already lists modules, whatever
/// the choice. ZFS choices also request the `zfs` module through it.
pub fn select_hooks(registry: &mut HookRegistry, choice: u8) -> Result<Selection> {
    if choice == EXIT_CHOICE {
        return Ok(Selection::Exit);
    }
    let hooks = hooks_for(choice).ok_or_else(|| Error::InvalidSelection(choice.to_string()))?;

    if !registry.get(HookKind::Addon).files().is_empty() {
        registry.enable(HookKind::Addon);
    }

    for &kind in hooks {
        registry.enable(kind);
        if kind == HookKind::Zfs {
            registry.enable(HookKind::Addon);
            registry.get_mut(HookKind::Addon).add_file("zfs");
        }
    }

    Ok(Selection::Build(registry.enabled()))
}

/// The interactive menu.
pub fn menu_text() -> String {
    let mut text = String::from("Which initramfs would you like to generate:\n");
    for (i, (label, _)) in MENU.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, label));
    }
    text.push_str(&format!("{}. Exit Program\n", EXIT_CHOICE));
    text
}
