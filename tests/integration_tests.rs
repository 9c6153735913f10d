//! End-to-end tests of the build pipeline against a mock source root.
//!
//! Host queries, prompts, the module database and the stager are replaced
//! by the fakes in `helpers.rs`; resolution runs for real.

mod helpers;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use helpers::{
    assert_symlink, CountingDb, FakeHost, RecordingStager, ScriptedPrompt, TestEnv, KERNEL, LIBC,
    LOADER,
};
use bliss_initramfs::context::{Architecture, BuildContext};
use bliss_initramfs::hooks::HookKind;
use bliss_initramfs::libdeps::BinaryClosureResolver;
use bliss_initramfs::pipeline::{BuildOutcome, BuildPipeline, BuildRequest, Manifest, Stage};
use bliss_initramfs::stage::{HostStager, Stager, LATEST_LINK};
use bliss_initramfs::Error;

struct Run {
    outcome: bliss_initramfs::Result<BuildOutcome>,
    completed: Vec<Stage>,
    stager: RecordingStager,
    prompt: ScriptedPrompt,
    refreshes: usize,
}

fn run_with(env: &TestEnv, request: &BuildRequest, host: &FakeHost, answers: &[&str]) -> Run {
    let mut prompt = ScriptedPrompt::new(answers);
    let db = CountingDb::default();
    let mut stager = RecordingStager::new(&env.output);
    let (outcome, completed) = {
        let mut pipeline = BuildPipeline::new(host, &mut prompt, &db, &mut stager);
        let outcome = pipeline.run(request);
        (outcome, pipeline.completed().to_vec())
    };
    Run {
        outcome,
        completed,
        stager,
        prompt,
        refreshes: db.refreshes.get(),
    }
}

fn run(env: &TestEnv, request: &BuildRequest) -> Run {
    run_with(env, request, &FakeHost::default(), &[])
}

fn resolved(run: Run) -> Manifest {
    match run.outcome {
        Ok(BuildOutcome::Resolved(manifest)) => manifest,
        other => panic!("expected a resolved manifest, got {:?}", other),
    }
}

fn paths(list: &[&str]) -> BTreeSet<PathBuf> {
    list.iter().map(PathBuf::from).collect()
}

fn module_paths(list: &[&str]) -> BTreeSet<PathBuf> {
    list.iter()
        .map(|m| Path::new("/lib/modules").join(KERNEL).join(m))
        .collect()
}

fn hooks(list: &[HookKind]) -> BTreeSet<HookKind> {
    list.iter().copied().collect()
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn scenario_a_base_only() {
    let env = TestEnv::new();
    env.install_base();

    let run = run(&env, &env.request("5"));
    let refreshes = run.refreshes;
    let manifest = resolved(run);

    assert_eq!(manifest.hooks, hooks(&[HookKind::Base]));
    assert_eq!(
        manifest.required,
        paths(&[
            "/bin/busybox",
            "/bin/kmod",
            "/bin/bash",
            "/etc/bash/bashrc",
            "/etc/DIR_COLORS",
            "/etc/profile",
            "/sbin/udevd",
            "/sbin/udevadm",
        ])
    );
    assert_eq!(
        manifest.binaries,
        paths(&[LOADER, LIBC, "/lib64/libreadline.so.8", "/lib64/libtinfo.so.6"])
    );
    assert!(manifest.modules.is_empty());
    assert_eq!(refreshes, 0);
    assert!(!manifest.boot.use_addon);
}

#[test]
fn scenario_b_zfs_with_module() {
    let env = TestEnv::new();
    env.install_base();
    env.install_hook_files(&[HookKind::Zfs]);
    env.install_zfs_modules();

    let run = run(&env, &env.request("1"));
    assert_eq!(run.refreshes, 1);
    let manifest = resolved(run);

    assert_eq!(
        manifest.hooks,
        hooks(&[HookKind::Base, HookKind::Zfs, HookKind::Addon])
    );
    assert_eq!(
        manifest.modules,
        module_paths(&["extra/spl.ko", "extra/zavl.ko", "extra/zfs.ko"])
    );
    assert!(manifest.boot.use_zfs && manifest.boot.use_addon);
    assert_eq!(manifest.boot.addon_modules, vec!["zfs".to_string()]);
    assert!(manifest.files().contains(Path::new("/sbin/zpool")));
}

#[test]
fn scenario_b_zfs_module_missing() {
    let env = TestEnv::new();
    env.install_base();
    env.install_hook_files(&[HookKind::Zfs]);

    let run = run(&env, &env.request("1"));

    assert!(matches!(run.outcome, Err(Error::ModuleNotFound(ref n)) if n == "zfs"));
    assert_eq!(run.refreshes, 0);
    assert!(run.stager.calls.is_empty());
}

#[test]
fn scenario_c_checks_every_selected_hook() {
    let selected = [HookKind::Lvm, HookKind::Raid, HookKind::Luks];

    for missing in selected {
        let env = TestEnv::new();
        env.install_base();
        let present: Vec<HookKind> = selected.iter().copied().filter(|k| *k != missing).collect();
        env.install_hook_files(&present);

        let mut request = env.request("9");
        request.dry_run = false;
        let run = run(&env, &request);

        match run.outcome {
            Err(Error::RequiredFileMissing { hook, .. }) => assert_eq!(hook, Some(missing)),
            other => panic!("expected RequiredFileMissing for {}, got {:?}", missing, other),
        }
        assert_eq!(run.completed.last(), Some(&Stage::CollectRequiredFiles));
        assert!(run.stager.calls.is_empty(), "staging started despite missing files");
    }
}

#[test]
fn scenario_c_all_present() {
    let env = TestEnv::new();
    env.install_base();
    env.install_hook_files(&[HookKind::Lvm, HookKind::Raid, HookKind::Luks]);

    let manifest = resolved(run(&env, &env.request("9")));

    assert_eq!(
        manifest.hooks,
        hooks(&[HookKind::Base, HookKind::Lvm, HookKind::Raid, HookKind::Luks])
    );
    for file in ["/sbin/lvm", "/sbin/mdadm", "/etc/mdadm.conf", "/sbin/cryptsetup", "/usr/bin/gpg"] {
        assert!(manifest.required.contains(Path::new(file)), "{} missing", file);
    }
}

// =============================================================================
// Selection
// =============================================================================

#[test]
fn selection_table() {
    use HookKind::*;
    let expected: [(&str, &[HookKind]); 10] = [
        ("1", &[Base, Zfs, Addon]),
        ("2", &[Base, Lvm]),
        ("3", &[Base, Raid]),
        ("4", &[Base, Raid, Lvm]),
        ("5", &[Base]),
        ("6", &[Base, Luks, Zfs, Addon]),
        ("7", &[Base, Luks, Lvm]),
        ("8", &[Base, Luks, Raid]),
        ("9", &[Base, Luks, Raid, Lvm]),
        ("10", &[Base, Luks]),
    ];

    let env = TestEnv::new();
    env.install_base();
    env.install_hook_files(&[Zfs, Lvm, Raid, Luks]);
    env.install_zfs_modules();

    for (choice, kinds) in expected {
        let manifest = resolved(run(&env, &env.request(choice)));
        assert_eq!(manifest.hooks, hooks(kinds), "choice {}", choice);
    }
}

#[test]
fn exit_choice_does_nothing() {
    let env = TestEnv::new();
    let mut request = env.request("11");
    request.dry_run = false;

    let run = run(&env, &request);

    assert!(matches!(run.outcome, Ok(BuildOutcome::Exited)));
    assert!(run.stager.calls.is_empty());
    assert_eq!(run.refreshes, 0);
}

#[test]
fn invalid_choice() {
    let env = TestEnv::new();
    for token in ["0", "12", "zfs", "-1"] {
        let run = run(&env, &env.request(token));
        assert!(
            matches!(run.outcome, Err(Error::InvalidSelection(ref t)) if t == token),
            "token {}",
            token
        );
    }
}

#[test]
fn addon_enabled_iff_modules_listed() {
    let env = TestEnv::new();
    env.install_base();
    env.add_module("kernel/drivers/md/dm_crypt.ko", &["kernel/drivers/md/dm_mod.ko"]);
    env.add_module("kernel/drivers/md/dm_mod.ko", &[]);

    let manifest = resolved(run(&env, &env.request("5")));
    assert!(!manifest.hooks.contains(&HookKind::Addon));
    assert!(manifest.modules.is_empty());

    let mut request = env.request("5");
    request.addon_modules = vec!["dm-crypt".to_string()];
    let manifest = resolved(run(&env, &request));
    assert!(manifest.hooks.contains(&HookKind::Addon));
    assert_eq!(
        manifest.modules,
        module_paths(&["kernel/drivers/md/dm_crypt.ko", "kernel/drivers/md/dm_mod.ko"])
    );
}

#[test]
fn zfs_module_listed_once() {
    let env = TestEnv::new();
    env.install_base();
    env.install_hook_files(&[HookKind::Zfs]);
    env.install_zfs_modules();

    let mut request = env.request("1");
    request.addon_modules = vec!["zfs".to_string()];
    let manifest = resolved(run(&env, &request));

    assert_eq!(manifest.boot.addon_modules, vec!["zfs".to_string()]);
}

#[test]
fn interactive_defaults() {
    let env = TestEnv::new();
    env.install_base();
    env.install_hook_files(&[HookKind::Zfs]);
    env.install_zfs_modules();

    let mut request = env.request("");
    request.choice = None;
    request.kernel = None;
    let run = run_with(&env, &request, &FakeHost::default(), &["", ""]);

    assert_eq!(run.prompt.shown.len(), 1);
    assert!(run.prompt.shown[0].contains("11. Exit Program"));
    assert_eq!(run.prompt.questions.len(), 2);
    assert!(run.prompt.questions[1].contains(KERNEL));
    let manifest = resolved(run);
    assert!(manifest.hooks.contains(&HookKind::Zfs));
    assert_eq!(manifest.kernel, KERNEL);
}

#[test]
fn interactive_other_kernel() {
    let env = TestEnv::new();
    env.install_base();

    let mut request = env.request("5");
    request.kernel = None;
    let host = FakeHost {
        kernel: "6.6.6-running".to_string(),
        ..Default::default()
    };
    let manifest = resolved(run_with(&env, &request, &host, &["n", KERNEL]));

    assert_eq!(manifest.kernel, KERNEL);
}

// =============================================================================
// Fail-fast stages
// =============================================================================

#[test]
fn missing_host_tool_stops_first() {
    let env = TestEnv::new();
    let host = FakeHost {
        missing: vec!["depmod"],
        ..Default::default()
    };

    let run = run_with(&env, &env.request("5"), &host, &[]);

    assert!(matches!(run.outcome, Err(Error::MissingHostTool(ref t)) if t == "depmod"));
    assert!(run.completed.is_empty());
}

#[test]
fn unsupported_architecture() {
    let env = TestEnv::new();
    let host = FakeHost {
        machine: "aarch64".to_string(),
        ..Default::default()
    };

    let run = run_with(&env, &env.request("5"), &host, &[]);

    assert!(matches!(run.outcome, Err(Error::UnsupportedArchitecture(ref a)) if a == "aarch64"));
    assert_eq!(run.completed, vec![Stage::CheckHostTools]);
}

#[test]
fn missing_modules_directory() {
    let env = TestEnv::new();
    env.install_base();
    let mut request = env.request("5");
    request.kernel = Some("9.9.9".to_string());

    let run = run(&env, &request);

    assert!(matches!(run.outcome, Err(Error::ModulesDirectoryMissing(_))));
    assert_eq!(run.completed.last(), Some(&Stage::SelectHooks));
}

#[test]
fn missing_base_file() {
    let env = TestEnv::new();
    env.install_base();
    fs::remove_file(env.path("/etc/profile")).unwrap();

    let run = run(&env, &env.request("5"));

    match run.outcome {
        Err(Error::RequiredFileMissing { path, hook }) => {
            assert_eq!(path, PathBuf::from("/etc/profile"));
            assert_eq!(hook, Some(HookKind::Base));
        }
        other => panic!("expected RequiredFileMissing, got {:?}", other),
    }
}

#[test]
fn missing_library() {
    let env = TestEnv::new();
    env.install_base();
    env.add_binary("/sbin/udevd", &["libudev.so.1", "libc.so.6"]);

    let run = run(&env, &env.request("5"));

    assert!(matches!(
        run.outcome,
        Err(Error::LibraryNotFound { ref library, .. }) if library == "libudev.so.1"
    ));
}

// =============================================================================
// Full runs
// =============================================================================

#[test]
fn build_runs_stager_in_order() {
    let env = TestEnv::new();
    env.install_base();
    let mut request = env.request("5");
    request.dry_run = false;

    let run = run(&env, &request);

    match run.outcome {
        Ok(BuildOutcome::Built { manifest, archive }) => {
            assert_eq!(archive, env.archive());
            assert_eq!(run.stager.manifest.as_ref(), Some(&manifest));
        }
        other => panic!("expected Built, got {:?}", other),
    }
    assert_eq!(
        run.stager.calls,
        vec!["stage_files", "finalize_boot_script", "package"]
    );
    assert_eq!(run.completed.last(), Some(&Stage::Package));
    assert_eq!(run.completed.len(), 11);
}

#[test]
fn archive_missing_after_package() {
    let env = TestEnv::new();
    env.install_base();
    let mut request = env.request("5");
    request.dry_run = false;

    let host = FakeHost::default();
    let mut prompt = ScriptedPrompt::default();
    let db = CountingDb::default();
    let mut stager = RecordingStager::new(&env.output);
    stager.skip_archive = true;
    let outcome = BuildPipeline::new(&host, &mut prompt, &db, &mut stager).run(&request);

    assert!(matches!(outcome, Err(Error::ArchiveMissing(ref p)) if *p == env.archive()));
}

#[test]
fn dry_run_writes_nothing() {
    let env = TestEnv::new();
    env.install_base();

    let run = run(&env, &env.request("5"));

    assert!(matches!(run.outcome, Ok(BuildOutcome::Resolved(_))));
    assert!(run.stager.calls.is_empty());
    assert_eq!(fs::read_dir(&env.output).unwrap().count(), 0);
}

#[test]
fn host_stager_builds_tree() {
    let env = TestEnv::new();
    env.install_base();
    env.add_script("/bin/busybox", "#!/bin/sh\necho ls\necho mount\necho modprobe\n");

    let manifest = resolved(run(&env, &env.request("5")));
    let ctx = BuildContext::new(KERNEL, Architecture::X86_64, manifest.hooks.clone(), &env.root)
        .unwrap();
    let template = Path::new(env!("CARGO_MANIFEST_DIR")).join("files/init");
    let db = CountingDb::default();
    let mut stager = HostStager::new(&env.output, &template, &db);

    stager.stage_files(&ctx, &manifest).unwrap();
    stager.finalize_boot_script(&ctx, &manifest.boot).unwrap();

    let tree = stager.staging_dir();
    assert!(tree.starts_with(&env.output));
    assert_symlink(
        &env.output.join(LATEST_LINK),
        &tree.file_name().unwrap().to_string_lossy(),
    );
    assert!(tree.join("mnt/root").is_dir());
    assert!(tree.join("lib64/libc.so.6").is_file());
    assert!(tree.join("lib64/ld-linux-x86-64.so.2").is_file());
    assert!(tree.join("etc/mtab").is_file());
    assert_symlink(&tree.join("bin/ls"), "busybox");
    assert_symlink(&tree.join("bin/sh"), "bash");
    assert_symlink(&tree.join("bin/modprobe"), "kmod");
    let bashrc = fs::read_to_string(tree.join("etc/bash/bashrc")).unwrap();
    assert!(bashrc.ends_with("alias reboot='reboot -f'\nalias poweroff='poweroff -f'\n"));
    let init = fs::read_to_string(tree.join("init")).unwrap();
    assert!(init.contains("USE_ZFS=0"));
    assert!(!init.contains("@USE_"));

    // No modules requested: nothing under lib/modules, no index rebuild.
    let modules = tree.join(format!("lib/modules/{}", KERNEL));
    for name in ["modules.order", "modules.builtin", "modules.dep"] {
        assert!(!modules.join(name).exists(), "{} staged", name);
    }
    assert_eq!(db.refreshes.get(), 0);
}

#[test]
fn host_stager_processes_modules() {
    let env = TestEnv::new();
    env.install_base();
    env.install_hook_files(&[HookKind::Zfs]);
    env.install_zfs_modules();
    let modules_root = format!("/lib/modules/{}", KERNEL);
    env.write(&format!("{}/modules.order", modules_root), b"extra/spl.ko\nextra/zavl.ko\nextra/zfs.ko\n");
    env.write(&format!("{}/modules.builtin", modules_root), b"kernel/fs/ext4/ext4.ko\n");

    let manifest = resolved(run(&env, &env.request("1")));
    let ctx = BuildContext::new(KERNEL, Architecture::X86_64, manifest.hooks.clone(), &env.root)
        .unwrap();
    let template = Path::new(env!("CARGO_MANIFEST_DIR")).join("files/init");
    let db = CountingDb::default();
    let mut stager = HostStager::new(&env.output, &template, &db);

    stager.stage_files(&ctx, &manifest).unwrap();

    let tree = stager.staging_dir();
    let modules = tree.join(&modules_root[1..]);
    for name in ["spl", "zavl", "zfs"] {
        assert!(modules.join(format!("extra/{}.ko.gz", name)).is_file(), "{} not compressed", name);
        assert!(!modules.join(format!("extra/{}.ko", name)).exists());
    }
    assert!(modules.join("modules.order").is_file());
    assert!(modules.join("modules.builtin").is_file());
    assert_eq!(*db.roots.borrow(), vec![tree.to_path_buf()]);
    // Building from a mock root never takes the build machine's host id.
    assert!(!tree.join("etc/hostid").exists());
}

// =============================================================================
// Binary closure properties
// =============================================================================

#[test]
fn binary_closure_idempotent_and_monotonic() {
    let env = TestEnv::new();
    env.install_base();
    env.add_library("libcrypto.so.3", &["libc.so.6"]);
    env.add_binary("/sbin/cryptsetup", &["libcrypto.so.3", "libc.so.6"]);
    let ctx = BuildContext::new(KERNEL, Architecture::X86_64, BTreeSet::new(), &env.root).unwrap();
    let resolver = BinaryClosureResolver::new();

    let small = paths(&["/bin/bash"]);
    let large = paths(&["/bin/bash", "/sbin/cryptsetup", "/etc/profile"]);

    let first = resolver.resolve(&ctx, &small).unwrap();
    let second = resolver.resolve(&ctx, &small).unwrap();
    assert_eq!(first, second);

    let bigger = resolver.resolve(&ctx, &large).unwrap();
    assert!(first.is_subset(&bigger));
    assert!(bigger.contains(Path::new("/lib64/libcrypto.so.3")));
}
