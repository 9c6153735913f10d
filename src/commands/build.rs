//! Build command - resolves and packs an initramfs.

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::config::Config;
use crate::host::SystemHost;
use crate::modules::Depmod;
use crate::pipeline::{BuildOutcome, BuildPipeline, BuildRequest};
use crate::prompt::StdinPrompt;
use crate::stage::HostStager;

/// Command line overrides for one build.
#[derive(Debug, Default)]
pub struct BuildArgs {
    pub choice: Option<String>,
    pub kernel: Option<String>,
    pub modules: Vec<String>,
    pub source_root: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub dry_run: bool,
}

/// Merge flags over configuration. Flags win; modules add up.
pub fn build_request(config: &Config, args: &BuildArgs) -> BuildRequest {
    let mut addon_modules = config.addon_modules.clone();
    addon_modules.extend(args.modules.iter().cloned());

    BuildRequest {
        choice: args.choice.clone().or_else(|| config.choice.clone()),
        kernel: args.kernel.clone().or_else(|| config.kernel.clone()),
        addon_modules,
        source_root: args
            .source_root
            .clone()
            .unwrap_or_else(|| config.source_root.clone()),
        dry_run: args.dry_run,
    }
}

/// Execute the build command.
pub fn cmd_build(config: &Config, args: BuildArgs) -> Result<()> {
    let request = build_request(config, &args);
    let output_dir = args.output.unwrap_or_else(|| config.output_dir.clone());

    let template = config.init_template();
    if !request.dry_run && !template.is_file() {
        bail!(
            "Init template not found at {}. Set BLISS_FILES_DIR to the directory holding 'init'.",
            template.display()
        );
    }

    let host = SystemHost;
    let mut prompt = StdinPrompt;
    let db = Depmod;
    let mut stager = HostStager::new(&output_dir, &template, &db);

    let outcome = BuildPipeline::new(&host, &mut prompt, &db, &mut stager).run(&request)?;

    match outcome {
        BuildOutcome::Exited => {}
        BuildOutcome::Resolved(manifest) => {
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
        BuildOutcome::Built { manifest, archive } => {
            println!("\n=== Initramfs Complete ===");
            println!("  Kernel: {}", manifest.kernel);
            println!("  Files: {}", manifest.files().len());
            println!("  Staging: {}", stager.staging_dir().display());
            println!("  Output: {}", archive.display());
        }
    }
    Ok(())
}
