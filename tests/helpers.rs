//! Shared test utilities for bliss-initramfs tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use bliss_initramfs::bootscript::BootConfig;
use bliss_initramfs::context::BuildContext;
use bliss_initramfs::elf::fixture;
use bliss_initramfs::hooks::{FileKind, HookKind, HookRegistry};
use bliss_initramfs::host::Host;
use bliss_initramfs::modules::DependencyDatabase;
use bliss_initramfs::pipeline::{BuildRequest, Manifest};
use bliss_initramfs::prompt::Prompt;
use bliss_initramfs::stage::Stager;
use bliss_initramfs::Result;

pub const KERNEL: &str = "6.1.0-test";
pub const LOADER: &str = "/lib64/ld-linux-x86-64.so.2";
pub const LIBC: &str = "/lib64/libc.so.6";

/// Test environment: a fake source root and an output directory.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Mock source system root
    pub root: PathBuf,
    /// Build output directory
    pub output: PathBuf,
}

impl TestEnv {
    /// Source root with a module dir, the loader and libc.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join("root");
        let output = temp_dir.path().join("output");
        fs::create_dir_all(root.join("lib/modules").join(KERNEL)).unwrap();
        fs::create_dir_all(&output).unwrap();

        let env = Self {
            _temp_dir: temp_dir,
            root,
            output,
        };
        env.write(LOADER, &fixture::image(None, &[], None));
        env.write(LIBC, &fixture::image(None, &[], None));
        env.write(&format!("/lib/modules/{}/modules.dep", KERNEL), b"");
        env
    }

    /// Host path of an absolute source path.
    pub fn path(&self, logical: &str) -> PathBuf {
        self.root.join(logical.trim_start_matches('/'))
    }

    pub fn write(&self, logical: &str, content: &[u8]) {
        let path = self.path(logical);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// A dynamically linked executable using the platform loader.
    pub fn add_binary(&self, logical: &str, needed: &[&str]) {
        self.write(logical, &fixture::image(Some(LOADER), needed, None));
    }

    /// A shared library in /lib64.
    pub fn add_library(&self, name: &str, needed: &[&str]) {
        self.write(&format!("/lib64/{}", name), &fixture::image(None, needed, None));
    }

    /// An executable shell script.
    pub fn add_script(&self, logical: &str, body: &str) {
        self.write(logical, body.as_bytes());
        let path = self.path(logical);
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
    }

    /// A module file plus its `modules.dep` line.
    pub fn add_module(&self, rel: &str, deps: &[&str]) {
        let modules = format!("/lib/modules/{}", KERNEL);
        self.write(&format!("{}/{}", modules, rel), b"module");
        let dep_path = self.path(&format!("{}/modules.dep", modules));
        let mut dep = fs::read_to_string(&dep_path).unwrap_or_default();
        dep.push_str(&format!("{}: {}\n", rel, deps.join(" ")));
        fs::write(dep_path, dep).unwrap();
    }

    /// Create every file the given hooks list. Paths under /etc become
    /// text files, everything else a binary linked against libc.
    pub fn install_hook_files(&self, kinds: &[HookKind]) {
        let registry = HookRegistry::new(&self.root);
        for &kind in kinds {
            let hook = registry.get(kind);
            if hook.file_kind() != FileKind::Path {
                continue;
            }
            for file in hook.files() {
                if file.starts_with("/etc/") {
                    self.write(file, b"# config\n");
                } else {
                    self.add_binary(file, &["libc.so.6"]);
                }
            }
        }
    }

    /// Base files, with bash pulling in a library chain.
    pub fn install_base(&self) {
        self.install_hook_files(&[HookKind::Base]);
        self.add_library("libreadline.so.8", &["libtinfo.so.6", "libc.so.6"]);
        self.add_library("libtinfo.so.6", &["libc.so.6"]);
        self.add_binary("/bin/bash", &["libreadline.so.8", "libc.so.6"]);
    }

    /// The ZFS module and its dependencies.
    pub fn install_zfs_modules(&self) {
        self.add_module("extra/spl.ko", &[]);
        self.add_module("extra/zavl.ko", &["extra/spl.ko"]);
        self.add_module("extra/zfs.ko", &["extra/zavl.ko", "extra/spl.ko"]);
    }

    /// Non-interactive request for `choice`.
    pub fn request(&self, choice: &str) -> BuildRequest {
        BuildRequest {
            choice: Some(choice.to_string()),
            kernel: Some(KERNEL.to_string()),
            addon_modules: Vec::new(),
            source_root: self.root.clone(),
            dry_run: true,
        }
    }

    pub fn archive(&self) -> PathBuf {
        self.output.join(format!("initrd-{}", KERNEL))
    }
}

/// Host with every required tool, on x86_64, running [`KERNEL`].
pub struct FakeHost {
    pub machine: String,
    pub kernel: String,
    pub missing: Vec<&'static str>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            machine: "x86_64".to_string(),
            kernel: KERNEL.to_string(),
            missing: Vec::new(),
        }
    }
}

impl Host for FakeHost {
    fn machine(&self) -> Result<String> {
        Ok(self.machine.clone())
    }

    fn running_kernel(&self) -> Result<String> {
        Ok(self.kernel.clone())
    }

    fn find_tool(&self, name: &str) -> Option<PathBuf> {
        if self.missing.iter().any(|t| *t == name) {
            None
        } else {
            Some(Path::new("/usr/bin").join(name))
        }
    }
}

/// Answers questions from a script and records what was asked.
#[derive(Default)]
pub struct ScriptedPrompt {
    pub answers: VecDeque<String>,
    pub questions: Vec<String>,
    pub shown: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&mut self, question: &str) -> Result<String> {
        self.questions.push(question.to_string());
        Ok(self.answers.pop_front().unwrap_or_default())
    }

    fn show(&mut self, text: &str) {
        self.shown.push(text.to_string());
    }
}

/// Dependency database whose index is already current.
#[derive(Default)]
pub struct CountingDb {
    pub refreshes: Cell<usize>,
    /// Source root of every refresh, in call order.
    pub roots: RefCell<Vec<PathBuf>>,
}

impl DependencyDatabase for CountingDb {
    fn refresh(&self, ctx: &BuildContext) -> Result<()> {
        self.refreshes.set(self.refreshes.get() + 1);
        self.roots.borrow_mut().push(ctx.source_root().to_path_buf());
        Ok(())
    }
}

/// Records stager calls; writes a dummy archive unless told not to.
#[derive(Default)]
pub struct RecordingStager {
    pub calls: Vec<&'static str>,
    pub manifest: Option<Manifest>,
    pub boot: Option<BootConfig>,
    pub output: PathBuf,
    pub skip_archive: bool,
}

impl RecordingStager {
    pub fn new(output: &Path) -> Self {
        Self {
            output: output.to_path_buf(),
            ..Default::default()
        }
    }
}

impl Stager for RecordingStager {
    fn stage_files(&mut self, _ctx: &BuildContext, manifest: &Manifest) -> Result<()> {
        self.calls.push("stage_files");
        self.manifest = Some(manifest.clone());
        Ok(())
    }

    fn finalize_boot_script(&mut self, _ctx: &BuildContext, boot: &BootConfig) -> Result<()> {
        self.calls.push("finalize_boot_script");
        self.boot = Some(boot.clone());
        Ok(())
    }

    fn package(&mut self, ctx: &BuildContext) -> Result<PathBuf> {
        self.calls.push("package");
        let archive = self.output.join(ctx.archive_name());
        if !self.skip_archive {
            fs::write(&archive, b"070701")?;
        }
        Ok(archive)
    }
}

/// Assert that a symlink exists and points to the expected target.
pub fn assert_symlink(path: &Path, expected_target: &str) {
    assert!(
        path.is_symlink(),
        "Expected symlink at {}, but it's not a symlink",
        path.display()
    );
    let target = fs::read_link(path).unwrap();
    assert_eq!(
        target.to_string_lossy(),
        expected_target,
        "Symlink {} points to {:?}, expected {}",
        path.display(),
        target,
        expected_target
    );
}
