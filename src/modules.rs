//! Kernel module closure.
//!
//! Requested module names are located under `/lib/modules/<kernel>`, the
//! dependency database is refreshed, and `modules.dep` is walked to collect
//! everything each module needs before it can be loaded.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::context::BuildContext;
use crate::error::{Error, Result};
use crate::process::Cmd;

/// Deduplicated, ordered set of absolute module paths to copy.
pub type ModuleSet = BTreeSet<PathBuf>;

/// Module file suffixes, longest first.
pub const MODULE_SUFFIXES: &[&str] = &[".ko.zst", ".ko.gz", ".ko.xz", ".ko"];

/// Keeps the module dependency index (`modules.dep`) current.
pub trait DependencyDatabase {
    fn refresh(&self, ctx: &BuildContext) -> Result<()>;
}

/// Refreshes the index with the host's `depmod`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Depmod;

impl DependencyDatabase for Depmod {
    fn refresh(&self, ctx: &BuildContext) -> Result<()> {
        let mut cmd = Cmd::new("depmod");
        if ctx.source_root() != Path::new("/") {
            cmd = cmd.arg("-b").arg_path(ctx.source_root());
        }
        cmd.arg(ctx.kernel())
            .context("depmod failed")
            .run()
            .map(|_| ())
            .map_err(|e| Error::DependencyDatabaseUpdateFailed {
                kernel: ctx.kernel().to_string(),
                reason: format!("{:#}", e),
            })
    }
}

pub struct ModuleClosureResolver<'a> {
    db: &'a dyn DependencyDatabase,
}

impl<'a> ModuleClosureResolver<'a> {
    pub fn new(db: &'a dyn DependencyDatabase) -> Self {
        Self { db }
    }

    /// Resolve `names` and everything they depend on.
    ///
    /// All names are located before the database is refreshed, so a typo
    /// fails without touching the module tree.
    pub fn resolve(&self, ctx: &BuildContext, names: &BTreeSet<String>) -> Result<ModuleSet> {
        if names.is_empty() {
            return Ok(ModuleSet::new());
        }

        let modules_dir = ctx.modules_dir();
        let available = index_module_files(&modules_dir)?;

        let mut located = Vec::with_capacity(names.len());
        for name in names {
            let matches = available
                .get(&normalize_name(name))
                .ok_or_else(|| Error::ModuleNotFound(name.clone()))?;
            if matches.len() > 1 {
                warn!(module = %name, candidates = ?matches, "Several files match, using the first");
            }
            let path = &matches[0];
            debug!(module = %name, path = %path, "Located module");
            located.push(path.clone());
        }

        info!("Updating module dependency database for {}", ctx.kernel());
        self.db.refresh(ctx)?;

        let dep_path = modules_dir.join("modules.dep");
        let content = fs::read_to_string(&dep_path).map_err(|source| {
            Error::DependencyIndexUnreadable {
                path: dep_path.clone(),
                source,
            }
        })?;
        let deps = parse_modules_dep(&content, &ctx.modules_path());

        let mut closure = BTreeSet::new();
        let mut queue = located;
        while let Some(module) = queue.pop() {
            if !closure.insert(module.clone()) {
                continue;
            }
            let needs = deps
                .get(&module)
                .ok_or_else(|| Error::ModuleNotIndexed(ctx.modules_path().join(&module)))?;
            queue.extend(needs.iter().cloned());
        }

        let modules: ModuleSet = closure
            .into_iter()
            .map(|rel| ctx.modules_path().join(rel))
            .collect();
        debug!(count = modules.len(), "Module closure resolved");
        Ok(modules)
    }
}

/// Module name of a file name, e.g. `zfs.ko.xz` -> `zfs`.
pub fn module_name(file_name: &str) -> Option<&str> {
    MODULE_SUFFIXES
        .iter()
        .find_map(|suffix| file_name.strip_suffix(suffix))
        .filter(|stem| !stem.is_empty())
}

/// The kernel treats `-` and `_` in module names as equivalent.
fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().replace('-', "_")
}

/// Map of normalized module name to the module paths (relative to the
/// module root, sorted) carrying that name.
fn index_module_files(modules_dir: &Path) -> Result<BTreeMap<String, Vec<String>>> {
    let mut index: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in WalkDir::new(modules_dir).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        let Some(name) = module_name(&file_name) else {
            continue;
        };
        let Ok(rel) = entry.path().strip_prefix(modules_dir) else {
            continue;
        };
        index
            .entry(normalize_name(name))
            .or_default()
            .push(rel.to_string_lossy().into_owned());
    }
    for paths in index.values_mut() {
        paths.sort();
    }
    Ok(index)
}

/// Parse `modules.dep` into module -> direct dependencies.
///
/// ```text
/// kernel/fs/zfs/zfs.ko.xz: kernel/fs/zfs/spl.ko.xz
/// kernel/fs/zfs/spl.ko.xz:
/// ```
///
/// Paths are relative to the module root. Absolute entries written by
/// older depmod versions are made relative to `modules_path`.
pub fn parse_modules_dep(content: &str, modules_path: &Path) -> BTreeMap<String, Vec<String>> {
    let relative = |entry: &str| -> String {
        Path::new(entry)
            .strip_prefix(modules_path)
            .map(|rel| rel.to_string_lossy().into_owned())
            .unwrap_or_else(|_| entry.to_string())
    };

    content
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(module, needs)| {
            let needs: Vec<String> = needs.split_whitespace().map(relative).collect();
            (relative(module.trim()), needs)
        })
        .collect()
}
