//! bliss-initramfs library.
//!
//! Resolves which binaries, shared libraries and kernel modules an
//! initramfs needs for the chosen early-boot subsystems, then stages and
//! packs them. The binary in `main.rs` is a thin CLI over [`pipeline`].

pub mod bootscript;
pub mod commands;
pub mod config;
pub mod context;
pub mod elf;
pub mod error;
pub mod hooks;
pub mod host;
pub mod libdeps;
pub mod modules;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod prompt;
pub mod selection;
pub mod stage;
pub mod timing;

pub use error::{Error, Result};
