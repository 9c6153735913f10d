//! Directory layout and file copying.

use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::context::BuildContext;
use crate::error::{Error, Result};
use crate::pipeline::Manifest;

/// Directories every image starts with.
pub const BASE_LAYOUT: &[&str] = &[
    "etc",
    "etc/bash",
    "etc/zfs",
    "dev",
    "proc",
    "sys",
    "mnt",
    "mnt/root",
    "mnt/key",
    "lib",
    "lib/modules",
    "lib64",
    "bin",
    "sbin",
    "usr",
    "root",
    "run",
];

pub fn create_layout(staging: &Path) -> Result<()> {
    for dir in BASE_LAYOUT {
        fs::create_dir_all(staging.join(dir))?;
    }
    Ok(())
}

/// Where an absolute path of the source system lands in the staging tree.
pub fn staged_path(staging: &Path, path: &Path) -> PathBuf {
    staging.join(path.strip_prefix("/").unwrap_or(path))
}

pub fn copy_manifest(ctx: &BuildContext, staging: &Path, manifest: &Manifest) -> Result<()> {
    let files = manifest.files();
    info!("Copying {} files", files.len());
    for path in &files {
        copy_into(ctx, staging, path)?;
    }
    Ok(())
}

/// Copy one file into the staging tree at the same absolute path.
///
/// Symlinks are recreated as symlinks; their targets are manifest entries
/// of their own.
pub fn copy_into(ctx: &BuildContext, staging: &Path, path: &Path) -> Result<()> {
    let src = ctx.host_path(path);
    let dest = staged_path(staging, path);

    if dest.symlink_metadata().is_ok() {
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let meta = src.symlink_metadata().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::RequiredFileMissing {
            path: path.to_path_buf(),
            hook: None,
        },
        _ => Error::Io(e),
    })?;

    if meta.file_type().is_symlink() {
        let target = fs::read_link(&src)?;
        symlink(&target, &dest)?;
        debug!("Linked {} -> {}", path.display(), target.display());
    } else {
        fs::copy(&src, &dest)?;
        debug!("Copied {}", path.display());
    }
    Ok(())
}
