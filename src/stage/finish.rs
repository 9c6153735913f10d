//! Finishing steps: mtab, shell tweaks, ZFS host state, the init script.

use std::fs::{self, File};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::bootscript::BootConfig;
use crate::context::BuildContext;
use crate::error::Result;
use crate::hooks::HookKind;
use crate::process::Cmd;

use super::files::{copy_into, staged_path};

/// Busybox `reboot`/`poweroff` wait for an init that never answers.
const SHELL_ALIASES: &str = "alias reboot='reboot -f'\nalias poweroff='poweroff -f'\n";

/// Programs the host profile points at that the image provides elsewhere.
const PROFILE_REWRITES: &[(&str, &str, &str)] = &[
    ("EDITOR", "/bin/nano", "/bin/vi"),
    ("PAGER", "/usr/bin/less", "/bin/less"),
];

pub fn finishing_steps(ctx: &BuildContext, staging: &Path) -> Result<()> {
    info!("Performing finishing steps ...");

    File::create(staging.join("etc/mtab"))?;

    rewrite_staged(ctx, staging, Path::new("/etc/bash/bashrc"), |mut text| {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(SHELL_ALIASES);
        text
    })?;
    rewrite_staged(ctx, staging, Path::new("/etc/profile"), |text| {
        rewrite_profile(&text)
    })?;

    if ctx.hooks().contains(&HookKind::Zfs) {
        zfs_extras(ctx, staging)?;
    }
    Ok(())
}

/// Carry the host's ZFS state into the image: module options, the host id
/// (it defaults to 0 inside the initramfs) and the pool cache.
fn zfs_extras(ctx: &BuildContext, staging: &Path) -> Result<()> {
    let zfs_conf = Path::new("/etc/modprobe.d/zfs.conf");
    if ctx.host_path(zfs_conf).is_file() {
        copy_into(ctx, staging, zfs_conf)?;
    }

    if ctx.source_root() != Path::new("/") {
        // `hostid` reports the build machine, not the source system.
        warn!(
            "Building from {}, /etc/hostid will not be created",
            ctx.source_root().display()
        );
    } else {
        match Cmd::new("hostid").run() {
            Ok(result) => match hostid_bytes(result.trimmed()) {
                Some(bytes) => fs::write(staging.join("etc/hostid"), bytes)?,
                None => warn!("Unexpected hostid output '{}'", result.trimmed()),
            },
            Err(e) => warn!("Cannot read the host id, /etc/hostid will not be created: {:#}", e),
        }
    }

    let cache = Path::new("/etc/zfs/zpool.cache");
    if ctx.host_path(cache).is_file() {
        warn!("Using your zpool.cache file ...");
        copy_into(ctx, staging, cache)?;
    } else {
        warn!("No zpool.cache was found. It will not be used ...");
    }
    Ok(())
}

/// Replace the staged copy of `path` with `edit` applied to its contents.
///
/// The staged entry may be a symlink copied from the source system; it is
/// replaced by a regular file so the edit never reaches the link target.
fn rewrite_staged(
    ctx: &BuildContext,
    staging: &Path,
    path: &Path,
    edit: impl FnOnce(String) -> String,
) -> Result<()> {
    let staged = staged_path(staging, path);
    if staged.symlink_metadata().is_err() {
        debug!("{} is not in the image, skipping", path.display());
        return Ok(());
    }
    let text = fs::read_to_string(ctx.host_path(path))?;
    fs::remove_file(&staged)?;
    fs::write(&staged, edit(text))?;
    Ok(())
}

/// Point EDITOR and PAGER at programs that exist in the image.
fn rewrite_profile(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let rewrite = PROFILE_REWRITES
            .iter()
            .find(|(var, from, _)| line.contains(var) && line.contains(from));
        match rewrite {
            Some((_, from, to)) => out.push_str(&line.replace(from, to)),
            None => out.push_str(line),
        }
    }
    out
}

/// `/etc/hostid` contents for the hex id printed by `hostid`.
///
/// The file holds the 32-bit id in little-endian byte order.
pub fn hostid_bytes(hex: &str) -> Option<[u8; 4]> {
    let hex = hex.trim();
    if hex.is_empty() || hex.len() > 8 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok().map(u32::to_le_bytes)
}

/// Render the template into `<staging>/init` and make it executable.
pub fn install_init(template: &Path, staging: &Path, boot: &BootConfig) -> Result<()> {
    info!("Writing init script ...");

    let source = fs::read_to_string(template)?;
    let init = staging.join("init");
    fs::write(&init, boot.render(&source)?)?;

    let mut perms = fs::metadata(&init)?.permissions();
    perms.set_mode(perms.mode() | 0o100);
    fs::set_permissions(&init, perms)?;
    Ok(())
}
