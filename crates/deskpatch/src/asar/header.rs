//! Archive header: a JSON directory tree behind a small pickle prefix.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::error::{Error, IoResultExt, Result};
use crate::integrity::{HEADER_DATA_OFFSET, HEADER_PREFIX_LEN, MAX_HEADER_LEN};

/// Algorithm name written into per-file integrity blocks.
pub const INTEGRITY_ALGORITHM: &str = "SHA256";
/// Block size for per-file integrity hashes.
pub const INTEGRITY_BLOCK_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub files: BTreeMap<String, Entry>,
}

impl Header {
    /// Entry at `rel`, a path relative to the archive root.
    pub fn entry(&self, rel: &Path) -> Option<&Entry> {
        let mut current: Option<&Entry> = None;
        for component in rel.components() {
            let Component::Normal(name) = component else {
                return None;
            };
            let files = match current {
                None => &self.files,
                Some(Entry::Directory { files }) => files,
                Some(_) => return None,
            };
            current = Some(files.get(name.to_str()?)?);
        }
        current
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    Directory { files: BTreeMap<String, Entry> },
    Link { link: String },
    File(FileEntry),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub size: u64,
    /// Decimal byte offset into the data section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unpacked: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub executable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<FileIntegrity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIntegrity {
    pub algorithm: String,
    pub hash: String,
    pub block_size: u64,
    pub blocks: Vec<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl FileEntry {
    pub fn data_offset(&self) -> Result<u64> {
        let raw = self.offset.as_deref().ok_or_else(|| Error::Archive {
            operation: "extract",
            message: "packed file entry has no offset".to_string(),
        })?;
        raw.parse().map_err(|e| Error::Archive {
            operation: "extract",
            message: format!("invalid file offset '{raw}': {e}"),
        })
    }
}

/// A parsed header and where the file data begins.
#[derive(Debug, Clone)]
pub struct ArchiveHeader {
    pub header: Header,
    pub data_start: u64,
}

pub fn read_header(archive_path: &Path) -> Result<ArchiveHeader> {
    let mut file = File::open(archive_path).at(archive_path)?;
    let mut prefix = [0u8; HEADER_PREFIX_LEN];
    file.read_exact(&mut prefix).at(archive_path)?;

    let word = |i: usize| u32::from_le_bytes([prefix[i], prefix[i + 1], prefix[i + 2], prefix[i + 3]]);
    let pickle_size = word(4);
    let json_len = word(12);
    if json_len == 0 || json_len > MAX_HEADER_LEN || u64::from(json_len) + 8 > u64::from(pickle_size) {
        return Err(Error::format(
            archive_path,
            format!("inconsistent header sizes (pickle {pickle_size}, json {json_len})"),
        ));
    }

    file.seek(SeekFrom::Start(HEADER_DATA_OFFSET))
        .at(archive_path)?;
    let mut json = vec![0u8; json_len as usize];
    file.read_exact(&mut json).at(archive_path)?;

    let header = serde_json::from_slice(&json).map_err(|e| Error::Archive {
        operation: "read header",
        message: e.to_string(),
    })?;

    Ok(ArchiveHeader {
        header,
        data_start: 8 + u64::from(pickle_size),
    })
}

/// Write the pickle prefix and JSON header. Returns the bytes written.
pub fn write_header<W: Write>(out: &mut W, header: &Header) -> Result<u64> {
    let json = serde_json::to_vec(header)?;
    let padded = json.len().div_ceil(4) * 4;
    let payload_size = 4 + padded;
    let pickle_size = 4 + payload_size;

    let mut buf = Vec::with_capacity(8 + pickle_size);
    buf.extend_from_slice(&4u32.to_le_bytes());
    buf.extend_from_slice(&(pickle_size as u32).to_le_bytes());
    buf.extend_from_slice(&(payload_size as u32).to_le_bytes());
    buf.extend_from_slice(&(json.len() as u32).to_le_bytes());
    buf.extend_from_slice(&json);
    buf.resize(8 + pickle_size, 0);

    out.write_all(&buf).map_err(|e| Error::Archive {
        operation: "pack",
        message: e.to_string(),
    })?;
    Ok(buf.len() as u64)
}

/// Reject entry names that could escape the extraction root.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::Archive {
            operation: "extract",
            message: format!("unsafe entry name '{name}'"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashValue;
    use crate::integrity::header_hash;
    use tempfile::TempDir;

    fn sample() -> Header {
        let mut inner = BTreeMap::new();
        inner.insert(
            "index.js".to_string(),
            Entry::File(FileEntry {
                size: 3,
                offset: Some("0".to_string()),
                unpacked: false,
                executable: false,
                integrity: None,
            }),
        );
        let mut files = BTreeMap::new();
        files.insert("build".to_string(), Entry::Directory { files: inner });
        files.insert(
            "latest".to_string(),
            Entry::Link {
                link: "build/index.js".to_string(),
            },
        );
        Header { files }
    }

    #[test]
    fn test_untagged_entries_parse() {
        let json = r#"{"files":{"a":{"files":{}},"b":{"link":"a"},"c":{"size":1,"offset":"10","executable":true}}}"#;
        let header: Header = serde_json::from_str(json).unwrap();
        assert!(matches!(header.files["a"], Entry::Directory { .. }));
        assert!(matches!(header.files["b"], Entry::Link { .. }));
        match &header.files["c"] {
            Entry::File(file) => {
                assert!(file.executable);
                assert_eq!(file.data_offset().unwrap(), 10);
            }
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn test_written_header_is_readable_and_hashable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.asar");
        let header = sample();

        let mut out = Vec::new();
        let written = write_header(&mut out, &header).unwrap();
        assert_eq!(written as usize, out.len());
        assert_eq!(out.len() % 4, 0);
        std::fs::write(&path, &out).unwrap();

        let parsed = read_header(&path).unwrap();
        assert_eq!(parsed.header, header);
        assert_eq!(parsed.data_start, written);

        let json = serde_json::to_vec(&header).unwrap();
        assert_eq!(header_hash(&path).unwrap(), HashValue::digest(&json));
    }

    #[test]
    fn test_entry_lookup_by_path() {
        let header = sample();
        assert!(matches!(
            header.entry(Path::new("build/index.js")),
            Some(Entry::File(file)) if file.size == 3
        ));
        assert!(matches!(
            header.entry(Path::new("build")),
            Some(Entry::Directory { .. })
        ));
        assert!(header.entry(Path::new("build/missing.js")).is_none());
        assert!(header.entry(Path::new("build/index.js/deeper")).is_none());
        assert!(header.entry(Path::new("../build")).is_none());
        assert!(header.entry(Path::new("")).is_none());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("index.js").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b"] {
            assert!(validate_name(bad).is_err(), "{bad} should be rejected");
        }
    }
}
