//! cpio + gzip packaging.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{Error, Result};
use crate::process::shell_in;

/// Pack `staging` into a gzip compressed newc cpio archive at `archive`.
///
/// `find` runs from inside the tree so entries are relative to its root.
pub fn create_archive(staging: &Path, archive: &Path) -> Result<()> {
    info!("Creating the initramfs ...");
    let command = format!(
        "find . -print0 | cpio -o --null --format=newc | gzip -9 > {}",
        shell_quote(&archive.to_string_lossy())
    );
    shell_in(&command, staging)
        .map(|_| ())
        .map_err(|e| Error::external("cpio", e))
}

/// SHA-256 hex digest and size of a file.
pub fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 1024 * 1024];
    let mut size = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
