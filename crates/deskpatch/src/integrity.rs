//! Integrity codec.
//!
//! The host application refuses to start unless the SHA-256 of the archive's
//! JSON header matches the digest stored as text in the executable's integrity
//! resource. This module computes the former and finds/rewrites the latter.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use memchr::memmem;
use tracing::{debug, info};

use crate::error::{Error, IoResultExt, Result};
use crate::hash::{HASH_HEX_LEN, HashValue};

/// Size of the fixed prefix that carries the header string length.
pub const HEADER_PREFIX_LEN: usize = 16;
/// Offset of the little-endian `u32` header string length.
pub const HEADER_LENGTH_OFFSET: usize = 12;
/// Offset at which the header string starts.
pub const HEADER_DATA_OFFSET: u64 = 16;
/// Header strings larger than this are not a real archive.
pub const MAX_HEADER_LEN: u32 = 64 * 1024 * 1024;

/// Text that precedes the digest inside the executable's integrity JSON.
pub const EMBEDDED_HASH_MARKER: &[u8] = br#""alg":"SHA256","value":""#;

/// Hash the declared header region of an archive.
pub fn header_hash(archive_path: &Path) -> Result<HashValue> {
    let mut file = File::open(archive_path).at(archive_path)?;

    let mut prefix = [0u8; HEADER_PREFIX_LEN];
    file.read_exact(&mut prefix).at(archive_path)?;

    let len = u32::from_le_bytes([
        prefix[HEADER_LENGTH_OFFSET],
        prefix[HEADER_LENGTH_OFFSET + 1],
        prefix[HEADER_LENGTH_OFFSET + 2],
        prefix[HEADER_LENGTH_OFFSET + 3],
    ]);
    if len == 0 || len > MAX_HEADER_LEN {
        return Err(Error::format(
            archive_path,
            format!("declared header length {len} is not plausible"),
        ));
    }

    file.seek(SeekFrom::Start(HEADER_DATA_OFFSET))
        .at(archive_path)?;
    let mut header = vec![0u8; len as usize];
    file.read_exact(&mut header).at(archive_path)?;

    let hash = HashValue::digest(&header);
    debug!(
        "Header hash of {} ({} bytes): {}",
        archive_path.display(),
        len,
        hash
    );
    Ok(hash)
}

/// Find the digest literal stored after [`EMBEDDED_HASH_MARKER`].
pub fn find_embedded_hash(executable_path: &Path) -> Result<HashValue> {
    let data = fs::read(executable_path).at(executable_path)?;
    embedded_hash_in(&data, executable_path)
}

fn embedded_hash_in(data: &[u8], path: &Path) -> Result<HashValue> {
    let pos = memmem::find(data, EMBEDDED_HASH_MARKER).ok_or_else(|| Error::NotFound {
        path: path.to_path_buf(),
        what: "Integrity hash marker".to_string(),
    })?;

    let start = pos + EMBEDDED_HASH_MARKER.len();
    let literal = data
        .get(start..start + HASH_HEX_LEN)
        .ok_or_else(|| Error::format(path, "integrity hash literal is truncated"))?;

    let hash = HashValue::from_bytes(literal).ok_or_else(|| {
        Error::format(
            path,
            format!(
                "bytes after integrity marker at 0x{:X} are not a lowercase hex digest",
                pos
            ),
        )
    })?;
    debug!("Embedded hash at 0x{:X}: {}", start, hash);
    Ok(hash)
}

/// Replace the single occurrence of `old` in the executable with `new`.
///
/// The write happens in place and never changes the file size. More than one
/// occurrence is refused: the digest text is only assumed to be unique.
pub fn rewrite_embedded_hash(executable_path: &Path, old: &HashValue, new: &HashValue) -> Result<()> {
    if old == new {
        debug!("Embedded hash unchanged, nothing to rewrite");
        return Ok(());
    }

    let data = fs::read(executable_path).at(executable_path)?;
    let offset = unique_offset(&data, old, executable_path)?;

    let mut file = OpenOptions::new()
        .write(true)
        .open(executable_path)
        .at(executable_path)?;
    file.seek(SeekFrom::Start(offset as u64))
        .at(executable_path)?;
    file.write_all(new.as_bytes()).at(executable_path)?;
    file.flush().at(executable_path)?;

    info!(
        "Rewrote embedded hash at 0x{:X} in {}: {} -> {}",
        offset,
        executable_path.display(),
        old,
        new
    );
    Ok(())
}

fn unique_offset(data: &[u8], needle: &HashValue, path: &Path) -> Result<usize> {
    let mut matches = memmem::find_iter(data, needle.as_bytes());
    let first = matches.next().ok_or_else(|| Error::NotFound {
        path: path.to_path_buf(),
        what: format!("Hash {needle}"),
    })?;

    let extra = matches.count();
    if extra > 0 {
        return Err(Error::AmbiguousMatch {
            path: path.to_path_buf(),
            hash: needle.clone(),
            count: extra + 1,
        });
    }
    Ok(first)
}
