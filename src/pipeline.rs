//! The build pipeline.
//!
//! ```text
//! CheckHostTools -> ValidateArchitecture -> SelectHooks -> ValidateKernel
//!   -> CollectRequiredFiles -> ValidateRequiredFilesExist
//!   -> ResolveBinaryClosure -> ResolveModuleClosure
//!   -> StageFiles -> FinalizeBootScript -> Package
//! ```
//!
//! Stages run strictly in order. The first error ends the run; nothing is
//! retried or rolled back.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info};

use crate::bootscript::BootConfig;
use crate::context::{Architecture, BuildContext};
use crate::error::{Error, Result};
use crate::hooks::{FileKind, HookKind, HookRegistry};
use crate::host::Host;
use crate::libdeps::{BinaryClosureResolver, BinarySet};
use crate::modules::{DependencyDatabase, ModuleClosureResolver, ModuleSet};
use crate::preflight::missing_required_tools;
use crate::prompt::{confirm_kernel, Prompt};
use crate::selection::{self, Selection};
use crate::stage::{sha256_file, Stager};
use crate::timing::Timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    CheckHostTools,
    ValidateArchitecture,
    SelectHooks,
    ValidateKernel,
    CollectRequiredFiles,
    ValidateRequiredFilesExist,
    ResolveBinaryClosure,
    ResolveModuleClosure,
    StageFiles,
    FinalizeBootScript,
    Package,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::CheckHostTools => "Checking host tools",
            Stage::ValidateArchitecture => "Validating architecture",
            Stage::SelectHooks => "Selecting hooks",
            Stage::ValidateKernel => "Validating kernel",
            Stage::CollectRequiredFiles => "Collecting required files",
            Stage::ValidateRequiredFilesExist => "Checking required files",
            Stage::ResolveBinaryClosure => "Resolving library dependencies",
            Stage::ResolveModuleClosure => "Resolving module dependencies",
            Stage::StageFiles => "Copying required files",
            Stage::FinalizeBootScript => "Writing init script",
            Stage::Package => "Creating the initramfs",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything that goes into the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub kernel: String,
    pub hooks: BTreeSet<HookKind>,
    /// Files listed by the enabled hooks.
    pub required: BTreeSet<PathBuf>,
    /// Loaders and shared libraries of the required files.
    pub binaries: BinarySet,
    /// Kernel modules and their dependencies.
    pub modules: ModuleSet,
    pub boot: BootConfig,
}

impl Manifest {
    /// Every path to copy into the image.
    pub fn files(&self) -> BTreeSet<PathBuf> {
        self.required
            .iter()
            .chain(&self.binaries)
            .chain(&self.modules)
            .cloned()
            .collect()
    }
}

#[derive(Debug)]
pub enum BuildOutcome {
    /// The exit menu entry was picked.
    Exited,
    /// Dry run: resolution finished, nothing was written.
    Resolved(Manifest),
    Built { manifest: Manifest, archive: PathBuf },
}

/// Inputs of one run. `None` means ask interactively.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub choice: Option<String>,
    pub kernel: Option<String>,
    pub addon_modules: Vec<String>,
    pub source_root: PathBuf,
    pub dry_run: bool,
}

impl Default for BuildRequest {
    fn default() -> Self {
        Self {
            choice: None,
            kernel: None,
            addon_modules: Vec::new(),
            source_root: PathBuf::from("/"),
            dry_run: false,
        }
    }
}

pub struct BuildPipeline<'a> {
    host: &'a dyn Host,
    prompt: &'a mut dyn Prompt,
    db: &'a dyn DependencyDatabase,
    stager: &'a mut dyn Stager,
    completed: Vec<Stage>,
}

impl<'a> BuildPipeline<'a> {
    pub fn new(
        host: &'a dyn Host,
        prompt: &'a mut dyn Prompt,
        db: &'a dyn DependencyDatabase,
        stager: &'a mut dyn Stager,
    ) -> Self {
        Self {
            host,
            prompt,
            db,
            stager,
            completed: Vec::new(),
        }
    }

    /// Stages that finished, in order.
    pub fn completed(&self) -> &[Stage] {
        &self.completed
    }

    pub fn run(&mut self, request: &BuildRequest) -> Result<BuildOutcome> {
        let build_timer = Timer::start("Total");

        let timer = self.begin(Stage::CheckHostTools);
        if let Some(tool) = missing_required_tools(self.host).first() {
            return Err(Error::MissingHostTool(tool.to_string()));
        }
        self.end(Stage::CheckHostTools, timer);

        let timer = self.begin(Stage::ValidateArchitecture);
        let arch = Architecture::from_machine(&self.host.machine()?)?;
        self.end(Stage::ValidateArchitecture, timer);

        let timer = self.begin(Stage::SelectHooks);
        let mut registry = HookRegistry::new(&request.source_root);
        for module in &request.addon_modules {
            registry.get_mut(HookKind::Addon).add_file(module);
        }
        let choice = match &request.choice {
            Some(token) => selection::parse_choice(token)?,
            None => {
                self.prompt.show(&selection::menu_text());
                let answer = self
                    .prompt
                    .ask(&format!("Current choice [{}]: ", selection::DEFAULT_CHOICE))?;
                selection::parse_choice(&answer)?
            }
        };
        if selection::select_hooks(&mut registry, choice)? == Selection::Exit {
            info!("Exiting.");
            return Ok(BuildOutcome::Exited);
        }
        self.end(Stage::SelectHooks, timer);

        let timer = self.begin(Stage::ValidateKernel);
        let kernel = match &request.kernel {
            Some(kernel) => kernel.clone(),
            None => {
                let running = self.host.running_kernel()?;
                confirm_kernel(&mut *self.prompt, &running)?
            }
        };
        let ctx = BuildContext::new(kernel, arch, registry.enabled(), &request.source_root)?;
        info!("Building for kernel {} ({})", ctx.kernel(), ctx.arch());
        self.end(Stage::ValidateKernel, timer);

        let timer = self.begin(Stage::CollectRequiredFiles);
        for kind in ctx.hooks() {
            if *kind != HookKind::Base {
                info!("Using {}", kind);
            }
        }
        let required = registry.required_files();
        debug!(count = required.len(), "Required files collected");
        self.end(Stage::CollectRequiredFiles, timer);

        let timer = self.begin(Stage::ValidateRequiredFilesExist);
        validate_required_files(&registry, &ctx)?;
        self.end(Stage::ValidateRequiredFilesExist, timer);

        let timer = self.begin(Stage::ResolveBinaryClosure);
        let binaries = BinaryClosureResolver::new().resolve(&ctx, &required)?;
        self.end(Stage::ResolveBinaryClosure, timer);

        let timer = self.begin(Stage::ResolveModuleClosure);
        let modules = ModuleClosureResolver::new(self.db).resolve(&ctx, &registry.addon_modules())?;
        self.end(Stage::ResolveModuleClosure, timer);

        let manifest = Manifest {
            kernel: ctx.kernel().to_string(),
            hooks: ctx.hooks().clone(),
            required,
            binaries,
            modules,
            boot: BootConfig::from_registry(&registry),
        };

        if request.dry_run {
            info!("Dry run, nothing written");
            return Ok(BuildOutcome::Resolved(manifest));
        }

        let timer = self.begin(Stage::StageFiles);
        self.stager.stage_files(&ctx, &manifest)?;
        self.end(Stage::StageFiles, timer);

        let timer = self.begin(Stage::FinalizeBootScript);
        self.stager.finalize_boot_script(&ctx, &manifest.boot)?;
        self.end(Stage::FinalizeBootScript, timer);

        let timer = self.begin(Stage::Package);
        let archive = self.stager.package(&ctx)?;
        if !archive.is_file() {
            return Err(Error::ArchiveMissing(archive));
        }
        let (sha, size) = sha256_file(&archive)?;
        info!(
            sha256 = %sha,
            size_kb = size / 1024,
            "Created {}",
            archive.display()
        );
        self.end(Stage::Package, timer);

        build_timer.finish();
        Ok(BuildOutcome::Built { manifest, archive })
    }

    fn begin(&self, stage: Stage) -> Timer {
        info!("{} ...", stage);
        Timer::start(stage.name())
    }

    fn end(&mut self, stage: Stage, timer: Timer) {
        timer.finish();
        self.completed.push(stage);
    }
}

/// Check the files of each enabled hook, in check order, stopping at the
/// first one missing from the source root.
pub fn validate_required_files(registry: &HookRegistry, ctx: &BuildContext) -> Result<()> {
    for hook in registry.enabled_hooks() {
        if hook.file_kind() != FileKind::Path {
            continue;
        }
        for file in hook.files() {
            let path = PathBuf::from(file);
            let host = ctx.host_path(&path);
            if host.symlink_metadata().is_err() {
                return Err(Error::RequiredFileMissing {
                    path,
                    hook: Some(hook.kind()),
                });
            }
        }
    }
    Ok(())
}
