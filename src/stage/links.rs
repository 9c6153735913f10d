//! Applet and tool symlinks inside the staging tree.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::hooks::KMOD_LINKS;
use crate::process::Cmd;

pub fn create_links(staging: &Path) -> Result<()> {
    info!("Creating symlinks ...");

    let bin = staging.join("bin");
    let busybox = bin.join("busybox");
    if busybox.is_file() {
        let listed = Cmd::new(busybox.to_string_lossy().into_owned())
            .arg("--list")
            .context("Unable to list busybox applets")
            .run()
            .map_err(|e| Error::external("busybox links", e))?;
        let applets: Vec<&str> = listed.stdout.lines().map(str::trim).collect();
        let count = link_applets(&bin, &applets)?;
        debug!("Linked {} busybox applets", count);
    }

    // The interactive shell is bash, not the busybox applet.
    replace_link(&bin.join("sh"), "bash")?;

    let kmod_dir = ["sbin", "bin"]
        .iter()
        .map(|dir| staging.join(dir))
        .find(|dir| dir.join("kmod").is_file());
    if let Some(kmod_dir) = kmod_dir {
        for name in KMOD_LINKS {
            remove_if_present(&bin.join(name))?;
            replace_link(&kmod_dir.join(name), "kmod")?;
        }
    }

    let sbin = staging.join("sbin");
    if sbin.join("lvm.static").is_file() {
        replace_link(&sbin.join("lvm"), "lvm.static")?;
    }

    Ok(())
}

/// Link every applet name to `busybox` in `bin`, leaving existing files.
fn link_applets(bin: &Path, applets: &[&str]) -> Result<usize> {
    let mut count = 0;
    for applet in applets {
        if applet.is_empty() || applet.contains('/') || *applet == "busybox" {
            continue;
        }
        let link = bin.join(applet);
        if link.symlink_metadata().is_ok() {
            continue;
        }
        symlink("busybox", &link)?;
        count += 1;
    }
    Ok(count)
}

fn replace_link(link: &Path, target: &str) -> Result<()> {
    remove_if_present(link)?;
    symlink(target, link)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    if path.symlink_metadata().is_ok() {
        fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_kmod_and_lvm_links() {
        let stage = tempfile::tempdir().unwrap();
        let root = stage.path();
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::create_dir_all(root.join("sbin")).unwrap();
        fs::write(root.join("bin/bash"), b"").unwrap();
        fs::write(root.join("sbin/kmod"), b"").unwrap();
        fs::write(root.join("sbin/lvm.static"), b"").unwrap();
        symlink("busybox", root.join("bin/modprobe")).unwrap();

        create_links(root).unwrap();

        assert_eq!(fs::read_link(root.join("bin/sh")).unwrap(), PathBuf::from("bash"));
        assert_eq!(fs::read_link(root.join("sbin/modprobe")).unwrap(), PathBuf::from("kmod"));
        assert!(root.join("bin/modprobe").symlink_metadata().is_err());
        assert_eq!(fs::read_link(root.join("sbin/lvm")).unwrap(), PathBuf::from("lvm.static"));
    }

    #[test]
    fn test_applets_do_not_clobber_files() {
        let stage = tempfile::tempdir().unwrap();
        let bin = stage.path().join("bin");
        fs::create_dir_all(&bin).unwrap();
        fs::write(bin.join("bash"), b"real").unwrap();

        let count = link_applets(&bin, &["ls", "bash", "busybox", "", "mount"]).unwrap();

        assert_eq!(count, 2);
        assert_eq!(fs::read(bin.join("bash")).unwrap(), b"real");
        assert_eq!(fs::read_link(bin.join("ls")).unwrap(), PathBuf::from("busybox"));
    }
}
