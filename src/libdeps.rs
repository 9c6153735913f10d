//! Shared library closure for the binaries going into the image.
//!
//! Dependencies are read from the ELF dynamic section (see [`crate::elf`]),
//! never by running the binary. Every discovered library is parsed in turn,
//! so the result is transitively complete. Paths are absolute paths of the
//! source system; [`BuildContext::host_path`] maps them onto the host.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, trace};

use crate::context::BuildContext;
use crate::elf::{self, DynamicInfo};
use crate::error::{Error, Result};

/// Deduplicated, ordered set of absolute paths to copy.
pub type BinarySet = BTreeSet<PathBuf>;

/// Symlink chains longer than this are treated as broken.
const MAX_LINK_DEPTH: usize = 16;

/// Dynamic loader configuration of the source system.
const LD_SO_CONF: &str = "/etc/ld.so.conf";

/// Nested `include` lines deeper than this are ignored.
const MAX_INCLUDE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryClosureResolver;

impl BinaryClosureResolver {
    pub fn new() -> Self {
        Self
    }

    /// Compute loaders and shared libraries needed by `files`.
    ///
    /// Every input must exist. Inputs that are not dynamically linked ELF
    /// objects (scripts, static binaries, config files) contribute nothing.
    pub fn resolve(&self, ctx: &BuildContext, files: &BTreeSet<PathBuf>) -> Result<BinarySet> {
        for file in files {
            if !exists(&ctx.host_path(file)) {
                return Err(Error::RequiredFileMissing {
                    path: file.clone(),
                    hook: None,
                });
            }
        }

        let conf_dirs = ld_so_conf_dirs(ctx);
        if !conf_dirs.is_empty() {
            debug!(count = conf_dirs.len(), "Loader config directories");
        }

        let mut closure = BinarySet::new();
        let mut scanned = BTreeSet::new();
        let mut queue = Vec::new();

        for file in files {
            // The input itself is copied by the caller; only a symlink's
            // targets are new here.
            let real = follow_links(ctx, file, &mut closure)?;
            let Some(info) = dynamic_info(ctx, &real) else {
                continue;
            };
            let loader = self.loader_for(ctx, file, &info)?;
            debug!(binary = %file.display(), loader = %loader.display(), "Dynamically linked");
            let real_loader = follow_links(ctx, &loader, &mut closure)?;
            closure.insert(loader);
            scanned.insert(real_loader);

            scanned.insert(real.clone());
            queue.push((real, info));
        }

        while let Some((object, info)) = queue.pop() {
            for lib in &info.needed {
                let found = find_library(ctx, &object, &info, &conf_dirs, lib).ok_or_else(|| {
                    Error::LibraryNotFound {
                        library: lib.clone(),
                        needed_by: object.clone(),
                    }
                })?;
                let real = follow_links(ctx, &found, &mut closure)?;
                closure.insert(found);

                if scanned.insert(real.clone()) {
                    if let Some(lib_info) = dynamic_info(ctx, &real) {
                        queue.push((real, lib_info));
                    }
                }
            }
        }

        debug!(count = closure.len(), "Binary closure resolved");
        Ok(closure)
    }

    /// The loader for a dynamically linked input: its `PT_INTERP`, or the
    /// platform loader for shared objects that name none.
    fn loader_for(&self, ctx: &BuildContext, binary: &Path, info: &DynamicInfo) -> Result<PathBuf> {
        match &info.interpreter {
            Some(interp) => {
                let loader = PathBuf::from(interp);
                if exists(&ctx.host_path(&loader)) {
                    Ok(loader)
                } else {
                    Err(Error::LoaderNotFound {
                        binary: binary.to_path_buf(),
                        loader,
                    })
                }
            }
            None => platform_loader(ctx).ok_or_else(|| Error::LoaderNotFound {
                binary: binary.to_path_buf(),
                loader: Path::new("/lib64").join(format!("{}*", ctx.arch().loader_prefix())),
            }),
        }
    }
}

/// Read dynamic-linking info. `None` means "not a dynamically linked object",
/// which is the common, expected outcome for most inputs.
fn dynamic_info(ctx: &BuildContext, path: &Path) -> Option<DynamicInfo> {
    match elf::read_dynamic_info(&ctx.host_path(path)) {
        Ok(info) => Some(info),
        Err(e) => {
            trace!(file = %path.display(), reason = %e, "Not a dynamic object");
            None
        }
    }
}

/// Locate the platform dynamic loader in the library directories.
pub fn platform_loader(ctx: &BuildContext) -> Option<PathBuf> {
    let prefix = ctx.arch().loader_prefix();
    for dir in ctx.arch().library_dirs() {
        let host_dir = ctx.source_root().join(dir);
        let Ok(entries) = fs::read_dir(&host_dir) else {
            continue;
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort();
        if let Some(name) = names.into_iter().next() {
            return Some(Path::new("/").join(dir).join(name));
        }
    }
    None
}

/// Find `lib` for `object`: runpath/rpath first, then the directories from
/// `ld.so.conf`, then the default dirs.
fn find_library(
    ctx: &BuildContext,
    object: &Path,
    info: &DynamicInfo,
    conf_dirs: &[PathBuf],
    lib: &str,
) -> Option<PathBuf> {
    if lib.contains('/') {
        let path = normalize(&Path::new("/").join(lib));
        return exists(&ctx.host_path(&path)).then_some(path);
    }

    let origin = object.parent().unwrap_or(Path::new("/"));
    let custom = info.search_paths.iter().map(|dir| {
        let expanded = dir
            .replace("${ORIGIN}", &origin.to_string_lossy())
            .replace("$ORIGIN", &origin.to_string_lossy());
        PathBuf::from(expanded)
    });
    let defaults = ctx
        .arch()
        .library_dirs()
        .iter()
        .map(|dir| Path::new("/").join(dir));

    custom
        .chain(conf_dirs.iter().cloned())
        .chain(defaults)
        .filter(|dir| dir.is_absolute())
        .map(|dir| normalize(&dir.join(lib)))
        .find(|candidate| exists(&ctx.host_path(candidate)))
}

/// Library directories listed in the source system's `/etc/ld.so.conf`,
/// following `include` lines, in file order and without duplicates.
pub fn ld_so_conf_dirs(ctx: &BuildContext) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let mut visited = BTreeSet::new();
    read_ld_so_conf(ctx, Path::new(LD_SO_CONF), 0, &mut visited, &mut dirs);
    dirs
}

fn read_ld_so_conf(
    ctx: &BuildContext,
    conf: &Path,
    depth: usize,
    visited: &mut BTreeSet<PathBuf>,
    dirs: &mut Vec<PathBuf>,
) {
    if depth > MAX_INCLUDE_DEPTH || !visited.insert(conf.to_path_buf()) {
        return;
    }
    let Ok(text) = fs::read_to_string(ctx.host_path(conf)) else {
        return;
    };

    for line in text.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() || line.starts_with("hwcap") {
            continue;
        }
        if let Some(patterns) = line.strip_prefix("include") {
            if patterns.starts_with(char::is_whitespace) {
                for pattern in patterns.split_whitespace() {
                    for included in expand_include(ctx, conf, pattern) {
                        read_ld_so_conf(ctx, &included, depth + 1, visited, dirs);
                    }
                }
                continue;
            }
        }
        for entry in line.split(|c: char| c == ',' || c == ':' || c.is_whitespace()) {
            // `dir=libc5` style type suffixes are obsolete.
            let dir = entry.split('=').next().unwrap_or_default();
            if !dir.starts_with('/') {
                continue;
            }
            let dir = normalize(Path::new(dir));
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
    }
}

/// Config files named by an `include` pattern. Relative patterns are taken
/// from the including file's directory; `*` and `?` match in the last
/// component only.
fn expand_include(ctx: &BuildContext, conf: &Path, pattern: &str) -> Vec<PathBuf> {
    let base = conf.parent().unwrap_or(Path::new("/"));
    let pattern = normalize(&base.join(pattern));
    let Some(name) = pattern.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Vec::new();
    };
    if !name.contains(|c: char| c == '*' || c == '?') {
        return vec![pattern];
    }

    let parent = pattern.parent().unwrap_or(Path::new("/"));
    let Ok(entries) = fs::read_dir(ctx.host_path(parent)) else {
        return Vec::new();
    };
    let mut matched: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|candidate| wildcard_match(name.as_bytes(), candidate.as_bytes()))
        .map(|candidate| parent.join(candidate))
        .collect();
    matched.sort();
    matched
}

fn wildcard_match(pattern: &[u8], name: &[u8]) -> bool {
    match (pattern.split_first(), name.split_first()) {
        (None, None) => true,
        (Some((&b'*', rest)), _) => {
            wildcard_match(rest, name) || (!name.is_empty() && wildcard_match(pattern, &name[1..]))
        }
        (Some((&b'?', rest)), Some((_, tail))) => wildcard_match(rest, tail),
        (Some((p, rest)), Some((n, tail))) if p == n => wildcard_match(rest, tail),
        _ => false,
    }
}

/// Follow `path` through symlinks inside the source root, adding every
/// intermediate target to `closure`. Returns the final, non-link path.
fn follow_links(ctx: &BuildContext, path: &Path, closure: &mut BinarySet) -> Result<PathBuf> {
    let mut current = path.to_path_buf();
    for _ in 0..MAX_LINK_DEPTH {
        let host = ctx.host_path(&current);
        let is_link = host
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            return Ok(current);
        }
        let target = fs::read_link(&host)?;
        let next = if target.is_absolute() {
            normalize(&target)
        } else {
            normalize(&current.parent().unwrap_or(Path::new("/")).join(target))
        };
        if !exists(&ctx.host_path(&next)) {
            return Err(Error::RequiredFileMissing {
                path: next,
                hook: None,
            });
        }
        closure.insert(next.clone());
        current = next;
    }
    Err(Error::RequiredFileMissing {
        path: path.to_path_buf(),
        hook: None,
    })
}

/// Lexically resolve `.` and `..` in an absolute path.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::ParentDir => {
                out.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    out
}

/// Present on disk. A symlink counts even when its target is not.
fn exists(host: &Path) -> bool {
    host.exists() || host.is_symlink()
}
