//! bliss-initramfs - builds a minimal initramfs for LUKS, RAID, LVM and ZFS
//! root filesystems.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use bliss_initramfs::commands::{self, build::BuildArgs, show::ShowTarget};
use bliss_initramfs::config::Config;

#[derive(Parser)]
#[command(name = "bliss-initramfs")]
#[command(version, about = "Minimal initramfs builder")]
#[command(
    after_help = "QUICK START:\n  bliss-initramfs preflight          Check host tools\n  bliss-initramfs build              Pick a layout from the menu\n  bliss-initramfs build --choice 1   ZFS, non-interactive"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an initramfs
    Build {
        /// Menu choice (1-11). Asks when omitted.
        #[arg(short, long)]
        choice: Option<String>,

        /// Kernel release. Offers the running kernel when omitted.
        #[arg(short, long)]
        kernel: Option<String>,

        /// Extra kernel module to include (repeatable)
        #[arg(short, long = "module", value_name = "MODULE")]
        modules: Vec<String>,

        /// Root of the system to take files from
        #[arg(long)]
        source_root: Option<PathBuf>,

        /// Directory for the staging tree and the archive
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Resolve everything and print the manifest as JSON
        #[arg(long)]
        dry_run: bool,
    },

    /// Run preflight checks (verify host tools before build)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowWhat,
    },
}

#[derive(Subcommand)]
enum ShowWhat {
    /// Show current configuration
    Config,
    /// Show the selection menu
    Menu,
}

fn main() -> Result<()> {
    if let Err(e) = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
    {
        eprintln!("[WARN] Failed to initialize tracing: {}", e);
    }

    let cli = Cli::parse();
    let base_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let config = Config::load(&base_dir);

    match cli.command {
        Commands::Build {
            choice,
            kernel,
            modules,
            source_root,
            output,
            dry_run,
        } => {
            let args = BuildArgs {
                choice,
                kernel,
                modules,
                source_root,
                output,
                dry_run,
            };
            commands::cmd_build(&config, args)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }

        Commands::Show { what } => {
            let target = match what {
                ShowWhat::Config => ShowTarget::Config,
                ShowWhat::Menu => ShowTarget::Menu,
            };
            commands::cmd_show(target, &config)?;
        }
    }

    Ok(())
}
