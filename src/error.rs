//! Error kinds for an initramfs build.
//!
//! Every variant is fatal for the run that produced it. The only expected,
//! non-fatal failure (probing whether a file is a dynamically linked ELF
//! object) never becomes an `Error`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::hooks::HookKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid selection '{0}'")]
    InvalidSelection(String),

    #[error("unsupported architecture '{0}' (only x86_64 is supported)")]
    UnsupportedArchitecture(String),

    #[error("host tool '{0}' not found in PATH")]
    MissingHostTool(String),

    #[error("invalid kernel choice: {0}")]
    InvalidKernelChoice(String),

    #[error("the modules directory {} doesn't exist", .0.display())]
    ModulesDirectoryMissing(PathBuf),

    #[error("required file {} doesn't exist{}", path.display(), for_hook(hook))]
    RequiredFileMissing {
        path: PathBuf,
        hook: Option<HookKind>,
    },

    #[error("kernel module '{0}' not found")]
    ModuleNotFound(String),

    #[error("dynamic loader {} for {} not found", loader.display(), binary.display())]
    LoaderNotFound { binary: PathBuf, loader: PathBuf },

    #[error("library '{library}' needed by {} not found", needed_by.display())]
    LibraryNotFound { library: String, needed_by: PathBuf },

    #[error("failed to update the module dependency database for {kernel}: {reason}")]
    DependencyDatabaseUpdateFailed { kernel: String, reason: String },

    #[error("failed to read module dependency index {}: {source}", path.display())]
    DependencyIndexUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("module {} is missing from modules.dep", .0.display())]
    ModuleNotIndexed(PathBuf),

    #[error("boot script placeholder '{0}' has no value")]
    UnresolvedPlaceholder(String),

    #[error("{step} failed: {message}")]
    ExternalTool { step: &'static str, message: String },

    #[error("initramfs archive {} was not created", .0.display())]
    ArchiveMissing(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn for_hook(hook: &Option<HookKind>) -> String {
    hook.map(|kind| format!(" (needed by {})", kind))
        .unwrap_or_default()
}

impl Error {
    /// Wrap a host command failure from the staging or packaging steps.
    pub fn external(step: &'static str, err: anyhow::Error) -> Self {
        Error::ExternalTool {
            step,
            message: format!("{:#}", err),
        }
    }
}
