//! JSON persistence of a [`DirectoryIndex`].
//!
//! ```json
//! {
//!   "directory": "/music",
//!   "indexed_on": "2024-05-01T12:00:00.000000Z",
//!   "features": ["blake3"],
//!   "length": 1,
//!   "index": [
//!     {"name": "song.mp3", "folder": "albums", "path": "albums/song.mp3",
//!      "modified": 1714564800.25, "size": 4096, "blake3": "af13..."}
//!   ],
//!   "checksum": "<sha-256 of the compact index array>"
//! }
//! ```
//!
//! `size` and `checksum` are optional so snapshots written by older tools
//! still load. Saving goes through a temporary sibling file that is synced
//! and renamed over the destination.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{DirectoryIndex, IndexEntry, IndexError};
use crate::scanner::path_utils::KEY_SEPARATOR;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndex {
    directory: String,
    indexed_on: String,
    features: Vec<String>,
    length: usize,
    index: Vec<PersistedEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    name: String,
    folder: String,
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    modified: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(flatten)]
    fingerprints: BTreeMap<String, serde_json::Value>,
}

impl From<&IndexEntry> for PersistedEntry {
    fn from(entry: &IndexEntry) -> Self {
        Self {
            name: entry.name.clone(),
            folder: entry.folder.clone(),
            path: entry.relative_path.clone(),
            modified: entry.modified,
            size: entry.size,
            fingerprints: entry
                .fingerprints
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        }
    }
}

fn entries_checksum(entries: &[PersistedEntry]) -> Result<String, serde_json::Error> {
    let compact = serde_json::to_vec(entries)?;
    let digest = Sha256::digest(&compact);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

/// Parse RFC 3339, or a naive ISO-8601 timestamp taken as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

fn strip_root_marker(value: &str) -> &str {
    value.trim_start_matches(KEY_SEPARATOR)
}

impl PersistedEntry {
    fn into_entry(self, source: &Path) -> Result<IndexEntry, IndexError> {
        let relative_path = strip_root_marker(&self.path).to_string();
        let last_segment = relative_path
            .rsplit(KEY_SEPARATOR)
            .next()
            .unwrap_or_default();
        if relative_path.is_empty() || last_segment != self.name {
            return Err(IndexError::corrupt(
                source,
                format!(
                    "entry name '{}' does not end path '{}'",
                    self.name, self.path
                ),
            ));
        }

        let mut fingerprints = BTreeMap::new();
        for (plugin, value) in self.fingerprints {
            match value {
                serde_json::Value::String(fingerprint) => {
                    fingerprints.insert(plugin, fingerprint);
                }
                serde_json::Value::Null => {}
                other => {
                    return Err(IndexError::corrupt(
                        source,
                        format!(
                            "'{}' of '{}' is {}, expected a string or null",
                            plugin, relative_path, other
                        ),
                    ));
                }
            }
        }

        Ok(IndexEntry {
            name: self.name,
            folder: strip_root_marker(&self.folder).to_string(),
            relative_path,
            modified: self.modified,
            size: self.size,
            fingerprints,
        })
    }
}

impl DirectoryIndex {
    /// Write the index to `path`, replacing any existing file atomically.
    ///
    /// # Errors
    ///
    /// [`IndexError::Io`] when the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let index: Vec<PersistedEntry> = self.entries.iter().map(PersistedEntry::from).collect();
        let checksum = entries_checksum(&index).map_err(|e| IndexError::io(path, e.into()))?;
        let persisted = PersistedIndex {
            directory: self.root.to_string_lossy().into_owned(),
            indexed_on: self.indexed_on.to_rfc3339_opts(SecondsFormat::Micros, true),
            features: self.features.clone(),
            length: index.len(),
            index,
            checksum: Some(checksum),
        };

        let bytes = serde_json::to_vec(&persisted).map_err(|e| IndexError::io(path, e.into()))?;
        write_atomic(path, &bytes).map_err(|e| IndexError::io(path, e))?;
        log::debug!("Wrote {} entries to {}", self.len(), path.display());
        Ok(())
    }

    /// Read and validate an index written by [`DirectoryIndex::save`].
    ///
    /// Features no registered plugin provides are kept as they are.
    ///
    /// # Errors
    ///
    /// * [`IndexError::Io`] when the file cannot be read
    /// * [`IndexError::Corrupt`] when it is not a well-formed index
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let bytes = fs::read(path).map_err(|e| IndexError::io(path, e))?;
        let persisted: PersistedIndex =
            serde_json::from_slice(&bytes).map_err(|e| IndexError::corrupt(path, e.to_string()))?;

        if persisted.length != persisted.index.len() {
            return Err(IndexError::corrupt(
                path,
                format!(
                    "length is {} but {} entries are present",
                    persisted.length,
                    persisted.index.len()
                ),
            ));
        }

        if let Some(expected) = &persisted.checksum {
            let actual = entries_checksum(&persisted.index)
                .map_err(|e| IndexError::corrupt(path, e.to_string()))?;
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(IndexError::corrupt(path, "checksum mismatch"));
            }
        }

        let indexed_on = parse_timestamp(&persisted.indexed_on).ok_or_else(|| {
            IndexError::corrupt(
                path,
                format!("invalid indexed_on timestamp '{}'", persisted.indexed_on),
            )
        })?;

        let mut seen: HashSet<String> = HashSet::with_capacity(persisted.index.len());
        let mut entries = Vec::with_capacity(persisted.index.len());
        for raw in persisted.index {
            let entry = raw.into_entry(path)?;
            if !seen.insert(entry.relative_path.clone()) {
                return Err(IndexError::corrupt(
                    path,
                    format!("duplicate path '{}'", entry.relative_path),
                ));
            }
            entries.push(entry);
        }

        log::debug!(
            "Loaded index of {} ({} files, features: {:?})",
            persisted.directory,
            entries.len(),
            persisted.features
        );
        Ok(Self::from_parts(
            PathBuf::from(persisted.directory),
            indexed_on,
            persisted.features,
            entries,
        ))
    }
}

/// Replace `path` with `bytes` via a synced temporary sibling.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "index path has no file name")
    })?;
    let temp = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

    let result = (|| {
        let mut file = File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        #[cfg(windows)]
        if path.exists() {
            fs::remove_file(path)?;
        }
        fs::rename(&temp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}
