//! Staging and packaging of the image.
//!
//! The pipeline talks to a [`Stager`]; [`HostStager`] is the one that
//! writes a staging tree under the output directory and packs it with
//! `cpio` and `gzip`:
//!
//! ```text
//! <output>/bi-<pid>-<nanos>/     staging tree, kept for inspection
//! <output>/bi-latest             link to the newest staging tree
//! <output>/initrd-<kernel>       the archive
//! ```

mod archive;
mod files;
mod finish;
mod links;
mod modules;

use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::bootscript::BootConfig;
use crate::context::BuildContext;
use crate::error::Result;
use crate::modules::DependencyDatabase;
use crate::pipeline::Manifest;

pub use archive::sha256_file;
pub use files::BASE_LAYOUT;
pub use finish::hostid_bytes;

/// Link in the output directory to the most recent staging tree.
pub const LATEST_LINK: &str = "bi-latest";

/// Writes the image.
pub trait Stager {
    /// Lay out the tree and copy every manifest file into it.
    fn stage_files(&mut self, ctx: &BuildContext, manifest: &Manifest) -> Result<()>;

    /// Render the boot script from `boot` and install it as `/init`.
    fn finalize_boot_script(&mut self, ctx: &BuildContext, boot: &BootConfig) -> Result<()>;

    /// Pack the tree. Returns the archive path.
    fn package(&mut self, ctx: &BuildContext) -> Result<PathBuf>;
}

pub struct HostStager<'a> {
    staging: PathBuf,
    output_dir: PathBuf,
    template: PathBuf,
    /// Rebuilds the module index inside the staging tree.
    db: &'a dyn DependencyDatabase,
}

impl<'a> HostStager<'a> {
    /// Pick a fresh staging directory name in `output_dir`. Nothing is
    /// created until files are staged.
    pub fn new(output_dir: &Path, template: &Path, db: &'a dyn DependencyDatabase) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or_default();
        let staging = output_dir.join(format!("bi-{}-{}", std::process::id(), nanos));

        Self {
            staging,
            output_dir: output_dir.to_path_buf(),
            template: template.to_path_buf(),
            db,
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    /// Repoint [`LATEST_LINK`] at this run's staging tree.
    fn link_latest(&self) -> Result<()> {
        let link = self.output_dir.join(LATEST_LINK);
        match link.symlink_metadata() {
            Ok(meta) if meta.file_type().is_symlink() => fs::remove_file(&link)?,
            Ok(_) => {
                warn!("{} is not a symlink, leaving it alone", link.display());
                return Ok(());
            }
            Err(_) => {}
        }
        let target = self.staging.file_name().unwrap_or(self.staging.as_os_str());
        symlink(target, &link)?;
        Ok(())
    }
}

impl Stager for HostStager<'_> {
    fn stage_files(&mut self, ctx: &BuildContext, manifest: &Manifest) -> Result<()> {
        fs::create_dir_all(&self.staging)?;
        info!("Staging in {}", self.staging.display());
        self.link_latest()?;
        files::create_layout(&self.staging)?;
        files::copy_manifest(ctx, &self.staging, manifest)?;

        if !manifest.modules.is_empty() {
            modules::compress_modules(ctx, &self.staging)?;
            modules::generate_module_info(ctx, &self.staging, self.db)?;
        }

        links::create_links(&self.staging)?;
        finish::finishing_steps(ctx, &self.staging)
    }

    fn finalize_boot_script(&mut self, _ctx: &BuildContext, boot: &BootConfig) -> Result<()> {
        finish::install_init(&self.template, &self.staging, boot)
    }

    fn package(&mut self, ctx: &BuildContext) -> Result<PathBuf> {
        let archive = self.output_dir.join(ctx.archive_name());
        archive::create_archive(&self.staging, &archive)?;
        Ok(archive)
    }
}
