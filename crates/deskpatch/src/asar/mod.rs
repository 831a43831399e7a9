//! Archive transcoder for Electron's asar format.
//!
//! Layout:
//!
//! - `u32` 4, `u32` header pickle size (prefix pickle)
//! - `u32` payload size, `u32` JSON length, JSON, padding to 4 bytes
//! - file data, addressed by the `offset` of each file entry
//!
//! Files marked `unpacked` have no data in the archive; they live in the
//! sibling `<archive>.unpacked/` directory.

mod header;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{Error, IoResultExt, Result};

pub use header::{
    ArchiveHeader, Entry, FileEntry, FileIntegrity, Header, INTEGRITY_ALGORITHM,
    INTEGRITY_BLOCK_SIZE, read_header, validate_name, write_header,
};

/// Unpacks an archive to a directory and packs a directory into an archive.
pub trait ArchiveTranscoder {
    fn extract_all(&self, archive_path: &Path, dest_dir: &Path) -> Result<()>;
    fn create_package(&self, src_dir: &Path, archive_path: &Path) -> Result<()>;
    /// Whether `entry` lives outside the archive body, so that repacking
    /// cannot carry changes made to it.
    fn is_stored_unpacked(&self, archive_path: &Path, entry: &Path) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AsarTranscoder;

impl ArchiveTranscoder for AsarTranscoder {
    fn extract_all(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        let parsed = read_header(archive_path)?;
        let mut extractor = Extractor {
            archive: File::open(archive_path).at(archive_path)?,
            archive_path,
            data_start: parsed.data_start,
            unpacked_root: unpacked_dir(archive_path),
            dest_root: dest_dir,
            files: 0,
        };
        fs::create_dir_all(dest_dir).at(dest_dir)?;
        extractor.extract_dir(&parsed.header.files, Path::new(""))?;
        info!(
            "Extracted {} files from {} to {}",
            extractor.files,
            archive_path.display(),
            dest_dir.display()
        );
        Ok(())
    }

    fn create_package(&self, src_dir: &Path, archive_path: &Path) -> Result<()> {
        // Flags the filesystem may not represent come from the archive being replaced.
        let previous = match read_header(archive_path) {
            Ok(parsed) => Some(parsed.header),
            Err(e) => {
                debug!("No previous header to carry flags from: {}", e);
                None
            }
        };
        let mut packer = Packer {
            src_root: src_dir,
            unpacked_root: unpacked_dir(archive_path),
            previous,
            inline: Vec::new(),
            next_offset: 0,
        };
        let files = packer.pack_dir(src_dir, Path::new(""))?;
        let header = Header { files };

        let tmp = sibling_temp_path(archive_path);
        if let Err(e) = write_archive(&tmp, &header, &packer.inline) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, archive_path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::io(archive_path, e)
        })?;

        info!(
            "Packed {} inline files ({} bytes) into {}",
            packer.inline.len(),
            packer.next_offset,
            archive_path.display()
        );
        Ok(())
    }

    fn is_stored_unpacked(&self, archive_path: &Path, entry: &Path) -> Result<bool> {
        let parsed = read_header(archive_path)?;
        Ok(matches!(
            parsed.header.entry(entry),
            Some(Entry::File(file)) if file.unpacked
        ))
    }
}

/// `<archive>.unpacked`
pub fn unpacked_dir(archive_path: &Path) -> PathBuf {
    let mut name = archive_path.as_os_str().to_owned();
    name.push(".unpacked");
    PathBuf::from(name)
}

fn sibling_temp_path(archive_path: &Path) -> PathBuf {
    let mut name: OsString = archive_path.as_os_str().to_owned();
    name.push(format!(".tmp-{}", std::process::id()));
    PathBuf::from(name)
}

struct Extractor<'a> {
    archive: File,
    archive_path: &'a Path,
    data_start: u64,
    unpacked_root: PathBuf,
    dest_root: &'a Path,
    files: usize,
}

impl Extractor<'_> {
    fn extract_dir(&mut self, entries: &BTreeMap<String, Entry>, rel: &Path) -> Result<()> {
        for (name, entry) in entries {
            validate_name(name)?;
            let rel = rel.join(name);
            let dest = self.dest_root.join(&rel);
            match entry {
                Entry::Directory { files } => {
                    fs::create_dir_all(&dest).at(&dest)?;
                    self.extract_dir(files, &rel)?;
                }
                Entry::File(file) => {
                    self.extract_file(file, &rel, &dest)?;
                    self.files += 1;
                }
                Entry::Link { link } => extract_link(link, &rel, &dest)?,
            }
        }
        Ok(())
    }

    fn extract_file(&mut self, file: &FileEntry, rel: &Path, dest: &Path) -> Result<()> {
        if file.unpacked {
            let source = self.unpacked_root.join(rel);
            fs::copy(&source, dest).at(&source)?;
        } else {
            let offset = self.data_start + file.data_offset()?;
            self.archive
                .seek(SeekFrom::Start(offset))
                .at(self.archive_path)?;
            let mut out = File::create(dest).at(dest)?;
            let copied = io::copy(&mut (&mut self.archive).take(file.size), &mut out).at(dest)?;
            if copied != file.size {
                return Err(Error::Archive {
                    operation: "extract",
                    message: format!(
                        "{} is truncated: expected {} bytes, got {}",
                        rel.display(),
                        file.size,
                        copied
                    ),
                });
            }
        }

        if file.executable {
            set_executable(dest)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn extract_link(link: &str, rel: &Path, dest: &Path) -> Result<()> {
    // Links are stored relative to the archive root.
    let depth = rel.components().count().saturating_sub(1);
    let mut target = PathBuf::new();
    for _ in 0..depth {
        target.push("..");
    }
    target.push(link);
    std::os::unix::fs::symlink(&target, dest).at(dest)
}

#[cfg(not(unix))]
fn extract_link(link: &str, rel: &Path, _dest: &Path) -> Result<()> {
    Err(Error::Archive {
        operation: "extract",
        message: format!(
            "cannot recreate link {} -> {} on this platform",
            rel.display(),
            link
        ),
    })
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path).at(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms).at(path)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o100 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}

struct Packer<'a> {
    src_root: &'a Path,
    unpacked_root: PathBuf,
    previous: Option<Header>,
    /// Files whose bytes go into the data section, in offset order.
    inline: Vec<PathBuf>,
    next_offset: u64,
}

impl Packer<'_> {
    fn pack_dir(&mut self, dir: &Path, rel: &Path) -> Result<BTreeMap<String, Entry>> {
        let mut children: Vec<_> = fs::read_dir(dir)
            .at(dir)?
            .collect::<io::Result<Vec<_>>>()
            .at(dir)?;
        children.sort_by_key(|entry| entry.file_name());

        let mut files = BTreeMap::new();
        for child in children {
            let name = child.file_name().into_string().map_err(|raw| Error::Archive {
                operation: "pack",
                message: format!("non UTF-8 file name {raw:?} in {}", dir.display()),
            })?;
            let path = child.path();
            let rel = rel.join(&name);
            let file_type = child.file_type().at(&path)?;

            let entry = if file_type.is_symlink() {
                match self.link_target(&path)? {
                    Some(link) => Entry::Link { link },
                    None => self.pack_file(&path, &rel)?,
                }
            } else if file_type.is_dir() {
                Entry::Directory {
                    files: self.pack_dir(&path, &rel)?,
                }
            } else {
                self.pack_file(&path, &rel)?
            };
            files.insert(name, entry);
        }
        Ok(files)
    }

    fn pack_file(&mut self, path: &Path, rel: &Path) -> Result<Entry> {
        let metadata = fs::metadata(path).at(path)?;
        if metadata.is_dir() {
            return Ok(Entry::Directory {
                files: self.pack_dir(path, rel)?,
            });
        }

        let integrity = file_integrity(path)?;
        let unpacked = self.unpacked_root.join(rel).is_file();
        let offset = if unpacked {
            debug!("Keeping {} unpacked", rel.display());
            None
        } else {
            let offset = self.next_offset;
            self.next_offset += metadata.len();
            self.inline.push(path.to_path_buf());
            Some(offset.to_string())
        };

        Ok(Entry::File(FileEntry {
            size: metadata.len(),
            offset,
            unpacked,
            executable: is_executable(&metadata) || self.was_executable(rel),
            integrity: Some(integrity),
        }))
    }

    fn was_executable(&self, rel: &Path) -> bool {
        matches!(
            self.previous.as_ref().and_then(|header| header.entry(rel)),
            Some(Entry::File(file)) if file.executable
        )
    }

    /// Archive-relative target of a symlink that stays inside the tree.
    fn link_target(&self, path: &Path) -> Result<Option<String>> {
        let target = fs::read_link(path).at(path)?;
        let absolute = match path.parent() {
            Some(parent) if target.is_relative() => parent.join(&target),
            _ => target,
        };

        let mut normalized = PathBuf::new();
        for component in absolute.components() {
            match component {
                Component::ParentDir => {
                    normalized.pop();
                }
                Component::CurDir => {}
                other => normalized.push(other),
            }
        }

        Ok(normalized.strip_prefix(self.src_root).ok().map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        }))
    }
}

fn write_archive(path: &Path, header: &Header, inline: &[PathBuf]) -> Result<()> {
    let file = File::create(path).at(path)?;
    let mut out = BufWriter::new(file);
    write_header(&mut out, header)?;
    for source in inline {
        let mut input = File::open(source).at(source)?;
        io::copy(&mut input, &mut out).at(path)?;
    }
    out.flush().at(path)?;
    out.get_ref().sync_all().at(path)?;
    Ok(())
}

/// Whole-file and per-block SHA-256, as the host checks them on read.
pub fn file_integrity(path: &Path) -> Result<FileIntegrity> {
    let mut input = File::open(path).at(path)?;
    let mut whole = Sha256::new();
    let mut blocks = Vec::new();
    let mut block = vec![0u8; INTEGRITY_BLOCK_SIZE];

    loop {
        let filled = read_block(&mut input, &mut block).at(path)?;
        whole.update(&block[..filled]);
        blocks.push(hex::encode(Sha256::digest(&block[..filled])));
        if filled < INTEGRITY_BLOCK_SIZE {
            break;
        }
    }

    Ok(FileIntegrity {
        algorithm: INTEGRITY_ALGORITHM.to_string(),
        hash: hex::encode(whole.finalize()),
        block_size: INTEGRITY_BLOCK_SIZE as u64,
        blocks,
    })
}

fn read_block<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
