//! Test fixtures: fake installations and injectable doubles.

use std::fs;
use std::path::{Path, PathBuf};

use crate::asar::{ArchiveTranscoder, AsarTranscoder};
use crate::error::{Error, Result};
use crate::hash::HashValue;
use crate::install::{ARCHIVE_NAME, EXECUTABLE_NAME, InstallLocator, Installation};
use crate::asar::unpacked_dir;
use crate::integrity::{EMBEDDED_HASH_MARKER, header_hash};
use crate::marker::MARKER_FILE_NAME;
use crate::process::ProcessProbe;

pub const APP_VERSION: &str = "1.2.3";
pub const APP_MAIN: &str = "\"use strict\";\nconsole.log('main');\n//# sourceMappingURL=index.js.map\n";

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

/// Executable bytes with an integrity resource holding `hash`.
pub fn fake_executable(hash: &HashValue) -> Vec<u8> {
    let mut data = b"MZ\x90\x00".to_vec();
    data.resize(256, 0);
    data.extend_from_slice(br#"[{"file":"resources\\app.asar","#);
    data.extend_from_slice(EMBEDDED_HASH_MARKER);
    data.extend_from_slice(hash.as_bytes());
    data.extend_from_slice(br#""}]"#);
    data.resize(data.len() + 256, 0xCC);
    data
}

/// Installation with raw file contents, for tests that never parse them.
pub fn install_in(root: &Path, archive: &[u8], executable: &[u8]) -> Installation {
    let install = Installation::from_app_dir(root.join(format!("app-{APP_VERSION}")), APP_VERSION);
    write_file(&install.resources_dir, ARCHIVE_NAME, archive);
    write_file(&install.app_dir, EXECUTABLE_NAME, executable);
    install
}

/// A complete fake app: real archive, executable embedding its header hash.
pub fn fake_app(root: &Path) -> Installation {
    fake_app_with_main(root, APP_MAIN)
}

pub fn fake_app_with_main(root: &Path, main: &str) -> Installation {
    build_fake_app(root, main, false)
}

/// Like [`fake_app`], but the main script ships in `app.asar.unpacked/`.
pub fn fake_app_with_unpacked_main(root: &Path) -> Installation {
    build_fake_app(root, APP_MAIN, true)
}

fn build_fake_app(root: &Path, main: &str, unpacked_main: bool) -> Installation {
    let src = root.join("app-src");
    write_file(&src.join(".vite/build"), "index.js", main.as_bytes());
    write_file(&src.join(".vite/build"), "preload.js", b"// preload\n");
    write_file(
        &src,
        "package.json",
        br#"{"name":"claude-desktop","main":".vite/build/index.js"}"#,
    );

    let install = Installation::from_app_dir(root.join(format!("app-{APP_VERSION}")), APP_VERSION);
    fs::create_dir_all(&install.resources_dir).unwrap();
    if unpacked_main {
        write_file(
            &unpacked_dir(&install.archive_path).join(".vite/build"),
            "index.js",
            main.as_bytes(),
        );
    }
    AsarTranscoder
        .create_package(&src, &install.archive_path)
        .unwrap();
    let hash = header_hash(&install.archive_path).unwrap();
    write_file(&install.app_dir, EXECUTABLE_NAME, &fake_executable(&hash));
    fs::remove_dir_all(&src).unwrap();
    install
}

pub struct FixedLocator(pub Installation);

impl InstallLocator for FixedLocator {
    fn locate(&self) -> Result<Installation> {
        Ok(self.0.clone())
    }
}

pub struct FakeProbe(pub bool);

impl ProcessProbe for FakeProbe {
    fn is_running(&self) -> bool {
        self.0
    }
}

/// Asar transcoder that can be told to fail.
#[derive(Default)]
pub struct FailingTranscoder {
    pub fail_extract: bool,
    /// Truncates the live archive, then fails.
    pub fail_pack: bool,
    /// Packs an empty tree instead of the given one.
    pub shrink_pack: bool,
    /// Packs normally, then puts a directory where the marker goes.
    pub block_marker: bool,
}

impl ArchiveTranscoder for FailingTranscoder {
    fn extract_all(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        if self.fail_extract {
            return Err(Error::Archive {
                operation: "extract",
                message: "simulated failure".to_string(),
            });
        }
        AsarTranscoder.extract_all(archive_path, dest_dir)
    }

    fn create_package(&self, src_dir: &Path, archive_path: &Path) -> Result<()> {
        if self.fail_pack {
            fs::write(archive_path, b"partial").unwrap();
            return Err(Error::Archive {
                operation: "pack",
                message: "simulated failure".to_string(),
            });
        }
        if self.shrink_pack {
            let empty = tempfile::TempDir::new().unwrap();
            return AsarTranscoder.create_package(empty.path(), archive_path);
        }
        AsarTranscoder.create_package(src_dir, archive_path)?;
        if self.block_marker {
            let resources = archive_path.parent().unwrap();
            fs::create_dir_all(resources.join(MARKER_FILE_NAME).join("blocked")).unwrap();
        }
        Ok(())
    }

    fn is_stored_unpacked(&self, archive_path: &Path, entry: &Path) -> Result<bool> {
        AsarTranscoder.is_stored_unpacked(archive_path, entry)
    }
}
