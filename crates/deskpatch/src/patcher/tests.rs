use std::fs;
use std::path::Path;

use tempfile::TempDir;

use super::*;
use crate::backup::{BackupOutcome, backup_path};
use crate::marker::MARKER_FILE_NAME;
use crate::payload::PAYLOAD_MARKER;
use crate::testing::{
    FailingTranscoder, FakeProbe, FixedLocator, fake_app, fake_app_with_main,
    fake_app_with_unpacked_main, fake_executable,
};

fn patcher(install: &Installation, scratch: &Path) -> Patcher {
    let config = PatcherConfig::builder().scratch_root(scratch).build();
    Patcher::new(FixedLocator(install.clone()), config).with_probe(FakeProbe(false))
}

struct Snapshot {
    archive: Vec<u8>,
    executable: Vec<u8>,
}

fn snapshot(install: &Installation) -> Snapshot {
    Snapshot {
        archive: fs::read(&install.archive_path).unwrap(),
        executable: fs::read(&install.executable_path).unwrap(),
    }
}

fn assert_untouched(install: &Installation, before: &Snapshot) {
    let now = snapshot(install);
    assert!(now.archive == before.archive, "archive changed");
    assert!(now.executable == before.executable, "executable changed");
}

fn assert_clean(install: &Installation) {
    assert!(!backup_path(&install.archive_path).exists());
    assert!(!backup_path(&install.executable_path).exists());
    assert!(!install.resources_dir.join(MARKER_FILE_NAME).exists());
}

#[test]
fn test_patch_then_unpatch_round_trip() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    let scratch = dir.path().join("scratch");
    let before = snapshot(&install);
    let patcher = patcher(&install, &scratch);

    let report = patcher.patch().unwrap();
    assert_eq!(report.backup, BackupOutcome::Created);
    assert_eq!(report.version, "1.2.3");
    assert_ne!(snapshot(&install).archive, before.archive);
    assert!(backup::exists(&install));

    let status = marker::read(&install);
    let written = status.marker().unwrap();
    assert_eq!(written.hashes.original, report.hash_before);
    assert_eq!(written.hashes.patched, report.hash_after);

    let unpatched = patcher.unpatch().unwrap();
    assert!(unpatched.restored.marker_removed);
    assert_untouched(&install, &before);
    assert_clean(&install);
}

#[test]
fn test_patch_keeps_hashes_coherent() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    let original = integrity::header_hash(&install.archive_path).unwrap();

    let report = patcher(&install, &dir.path().join("scratch")).patch().unwrap();

    let header = integrity::header_hash(&install.archive_path).unwrap();
    let embedded = integrity::find_embedded_hash(&install.executable_path).unwrap();
    assert_eq!(header, embedded);
    assert_eq!(header, report.hash_after);
    assert_ne!(header, original);
    assert_eq!(report.hash_before, original);
}

#[test]
fn test_patch_injects_before_source_map_comment() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    patcher(&install, &dir.path().join("scratch")).patch().unwrap();

    let out = dir.path().join("out");
    AsarTranscoder.extract_all(&install.archive_path, &out).unwrap();
    let main = fs::read_to_string(out.join(".vite/build/index.js")).unwrap();
    let marker_at = main.find(PAYLOAD_MARKER).unwrap();
    let comment_at = main.find("//# sourceMappingURL=").unwrap();
    assert!(marker_at < comment_at);
    assert!(main.starts_with("\"use strict\";\nconsole.log('main');\n"));
}

#[test]
fn test_patch_removes_scratch_directory() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    let scratch = dir.path().join("scratch");
    patcher(&install, &scratch).patch().unwrap();
    assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
}

#[test]
fn test_second_patch_is_refused_without_touching_files() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    let patcher = patcher(&install, &dir.path().join("scratch"));
    patcher.patch().unwrap();
    let patched = snapshot(&install);

    let err = patcher.patch().unwrap_err();
    assert!(matches!(err, Error::AlreadyPatched { .. }));
    assert_untouched(&install, &patched);
}

#[test]
fn test_corrupt_marker_still_blocks_patch() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    fs::write(install.resources_dir.join(MARKER_FILE_NAME), b"garbage").unwrap();

    let err = patcher(&install, &dir.path().join("scratch")).patch().unwrap_err();
    assert!(matches!(err, Error::AlreadyPatched { .. }));
}

#[test]
fn test_running_application_blocks_patch() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    let before = snapshot(&install);

    let err = patcher(&install, &dir.path().join("scratch"))
        .with_probe(FakeProbe(true))
        .patch()
        .unwrap_err();
    assert!(matches!(err, Error::Running(_)));
    assert_untouched(&install, &before);
    assert_clean(&install);
}

#[test]
fn test_integrity_mismatch_aborts_before_backup() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    fs::write(
        &install.executable_path,
        fake_executable(&HashValue::digest(b"someone else")),
    )
    .unwrap();
    let before = snapshot(&install);

    let err = patcher(&install, &dir.path().join("scratch")).patch().unwrap_err();
    assert!(matches!(err, Error::IntegrityMismatch { .. }));
    assert_untouched(&install, &before);
    assert_clean(&install);
}

#[test]
fn test_missing_target_file_is_structure_change() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    let before = snapshot(&install);
    let config = PatcherConfig::builder()
        .scratch_root(dir.path().join("scratch"))
        .target_file("dist/main.js")
        .build();

    let err = Patcher::new(FixedLocator(install.clone()), config)
        .with_probe(FakeProbe(false))
        .patch()
        .unwrap_err();
    assert!(matches!(err, Error::StructureChanged { .. }));
    assert_untouched(&install, &before);
    assert_clean(&install);
}

#[test]
fn test_unpacked_target_file_is_structure_change() {
    let dir = TempDir::new().unwrap();
    let install = fake_app_with_unpacked_main(dir.path());
    let unpacked_main = install
        .resources_dir
        .join("app.asar.unpacked/.vite/build/index.js");
    let main_before = fs::read(&unpacked_main).unwrap();
    let before = snapshot(&install);

    let err = patcher(&install, &dir.path().join("scratch")).patch().unwrap_err();
    assert!(matches!(err, Error::StructureChanged { .. }), "{err:?}");
    assert_untouched(&install, &before);
    assert_clean(&install);
    assert_eq!(fs::read(&unpacked_main).unwrap(), main_before);
}

#[test]
fn test_locked_executable_is_refused() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    // A directory cannot be opened for writing, whatever the privileges.
    fs::remove_file(&install.executable_path).unwrap();
    fs::create_dir_all(&install.executable_path).unwrap();
    let archive = fs::read(&install.archive_path).unwrap();

    let err = patcher(&install, &dir.path().join("scratch")).patch().unwrap_err();
    match &err {
        Error::Locked { path, .. } => assert_eq!(path, &install.executable_path),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(fs::read(&install.archive_path).unwrap(), archive);
    assert_clean(&install);
}

#[test]
fn test_early_failure_keeps_preexisting_backups() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    backup::create(&install).unwrap();

    let err = patcher(&install, &dir.path().join("scratch"))
        .with_transcoder(FailingTranscoder {
            fail_extract: true,
            ..Default::default()
        })
        .patch()
        .unwrap_err();
    assert!(matches!(err, Error::Archive { operation: "extract", .. }));
    assert!(backup::exists(&install));
}

#[test]
fn test_code_already_injected_is_detected() {
    let dir = TempDir::new().unwrap();
    let main = format!("console.log('main');\n{PAYLOAD_MARKER}\n");
    let install = fake_app_with_main(dir.path(), &main);
    let before = snapshot(&install);

    let err = patcher(&install, &dir.path().join("scratch")).patch().unwrap_err();
    assert!(matches!(err, Error::AlreadyPatchedCode { .. }));
    assert_untouched(&install, &before);
    assert_clean(&install);
}

#[test]
fn test_repack_failure_restores_originals() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    let before = snapshot(&install);

    let err = patcher(&install, &dir.path().join("scratch"))
        .with_transcoder(FailingTranscoder {
            fail_pack: true,
            ..Default::default()
        })
        .patch()
        .unwrap_err();

    assert!(matches!(err, Error::RolledBack { .. }));
    assert!(matches!(err.cause(), Error::Archive { operation: "pack", .. }));
    assert_untouched(&install, &before);
    assert_clean(&install);
}

#[test]
fn test_undersized_repack_rolls_back() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    let before = snapshot(&install);

    let err = patcher(&install, &dir.path().join("scratch"))
        .with_transcoder(FailingTranscoder {
            shrink_pack: true,
            ..Default::default()
        })
        .patch()
        .unwrap_err();

    assert!(matches!(err, Error::RolledBack { .. }), "{err:?}");
    assert!(matches!(err.cause(), Error::Format { .. }));
    assert_untouched(&install, &before);
    assert_clean(&install);
}

#[test]
fn test_marker_write_failure_restores_executable() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    let before = snapshot(&install);

    let err = patcher(&install, &dir.path().join("scratch"))
        .with_transcoder(FailingTranscoder {
            block_marker: true,
            ..Default::default()
        })
        .patch()
        .unwrap_err();

    // The marker path is still blocked, but the restore itself succeeded.
    assert!(matches!(err, Error::RolledBack { .. }), "{err:?}");
    assert!(matches!(err.cause(), Error::Io { .. }));
    assert_untouched(&install, &before);
    assert!(!backup::exists(&install));
    assert_eq!(
        integrity::find_embedded_hash(&install.executable_path).unwrap(),
        integrity::header_hash(&install.archive_path).unwrap()
    );
}

#[test]
fn test_ambiguous_executable_hash_rolls_back() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    let hash = integrity::find_embedded_hash(&install.executable_path).unwrap();
    let mut exe = fs::read(&install.executable_path).unwrap();
    exe.extend_from_slice(hash.as_bytes());
    fs::write(&install.executable_path, &exe).unwrap();
    let before = snapshot(&install);

    let err = patcher(&install, &dir.path().join("scratch")).patch().unwrap_err();
    assert!(matches!(err.cause(), Error::AmbiguousMatch { count: 2, .. }));
    assert_untouched(&install, &before);
    assert_clean(&install);
}

#[test]
fn test_unpatch_without_anything_is_not_patched() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    let err = patcher(&install, &dir.path().join("scratch")).unpatch().unwrap_err();
    assert!(matches!(err, Error::NotPatched { .. }));
}

#[test]
fn test_unpatch_with_marker_but_no_backups() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    let patcher = patcher(&install, &dir.path().join("scratch"));
    patcher.patch().unwrap();
    fs::remove_file(backup_path(&install.archive_path)).unwrap();

    let err = patcher.unpatch().unwrap_err();
    assert!(matches!(err, Error::MarkerWithoutBackup { .. }));
}

#[test]
fn test_unpatch_refused_while_running() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    patcher(&install, &dir.path().join("scratch")).patch().unwrap();

    let err = patcher(&install, &dir.path().join("scratch"))
        .with_probe(FakeProbe(true))
        .unpatch()
        .unwrap_err();
    assert!(matches!(err, Error::Running(_)));
    assert!(backup::exists(&install));
}

#[test]
fn test_status_before_and_after_patch() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    let patcher = patcher(&install, &dir.path().join("scratch"));

    let status = patcher.status().unwrap();
    assert!(!status.is_patched());
    assert!(!status.backups_present);
    assert!(!status.running);
    assert_eq!(status.code_patched, Some(false));
    assert_eq!(status.integrity_ok, Some(true));
    assert!(status.warnings.is_empty(), "{:?}", status.warnings);

    patcher.patch().unwrap();
    let status = patcher.status().unwrap();
    assert!(status.is_patched());
    assert!(status.backups_present);
    assert_eq!(status.code_patched, Some(true));
    assert_eq!(status.integrity_ok, Some(true));
    assert!(status.warnings.is_empty(), "{:?}", status.warnings);
}

#[test]
fn test_status_warns_when_code_and_marker_disagree() {
    let dir = TempDir::new().unwrap();
    let install = fake_app(dir.path());
    let patcher = patcher(&install, &dir.path().join("scratch"));
    patcher.patch().unwrap();
    marker::remove(&install).unwrap();

    let status = patcher.status().unwrap();
    assert!(!status.is_patched());
    assert_eq!(status.code_patched, Some(true));
    assert!(
        status
            .warnings
            .iter()
            .any(|w| w.contains("Injected code is present"))
    );
}

#[test]
fn test_inject_script_placement() {
    assert_eq!(
        inject_script("a();\n//# sourceMappingURL=x.map\n", "B", "//# sourceMappingURL="),
        "a();\nB\n//# sourceMappingURL=x.map\n"
    );
    assert_eq!(inject_script("a();\n", "B", "//# sourceMappingURL="), "a();\nB");
    assert_eq!(inject_script("a();", "B", ""), "a();B");
}
