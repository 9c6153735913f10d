//! Kernel module post-processing inside the staging tree.

use std::io;
use std::path::Path;

use tracing::info;
use walkdir::WalkDir;

use crate::context::BuildContext;
use crate::error::{Error, Result};
use crate::modules::DependencyDatabase;
use crate::process::Cmd;

use super::files::{copy_into, staged_path};

/// `gzip -9` every uncompressed module that was copied.
pub fn compress_modules(ctx: &BuildContext, staging: &Path) -> Result<()> {
    info!("Compressing kernel modules ...");
    let root = staged_path(staging, &ctx.modules_path());

    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let is_ko = entry.file_type().is_file()
            && entry.file_name().to_string_lossy().ends_with(".ko");
        if !is_ko {
            continue;
        }
        Cmd::new("gzip")
            .arg("-9")
            .arg_path(entry.path())
            .context(format!("Unable to compress {}", entry.path().display()))
            .run()
            .map_err(|e| Error::external("module compression", e))?;
    }
    Ok(())
}

/// Regenerate the module dependency index for the image.
///
/// `modules.order` and `modules.builtin` are carried over so depmod has
/// the same view of the kernel as on the host. The index is then rebuilt
/// by `db` with the staging tree as its root.
pub fn generate_module_info(
    ctx: &BuildContext,
    staging: &Path,
    db: &dyn DependencyDatabase,
) -> Result<()> {
    info!("Generating modprobe information ...");

    for name in ["modules.order", "modules.builtin"] {
        let path = ctx.modules_path().join(name);
        if ctx.host_path(&path).is_file() {
            copy_into(ctx, staging, &path)?;
        }
    }

    let image = BuildContext::new(ctx.kernel(), ctx.arch(), ctx.hooks().clone(), staging)?;
    db.refresh(&image)
}
