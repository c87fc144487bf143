//!
//! File catalog & diff engine
//! --------------------------
//! The catalog is the unit of exchange between server and client: a list of
//! file records, each carrying name, size, best-effort version, SHA-256
//! content hash and (on the server side) an `Add`/`Del` action tag driven by
//! which source directory produced the record. A client-local scan produces
//! untagged records describing existing state.
//!
//! Diffing is asymmetric on purpose: additions are keyed by content hash
//! (byte-identical content under any name satisfies the requirement),
//! deletions are keyed by file name (an obsolete artifact is removed
//! regardless of whether its bytes still match something).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Which catalog partition a server-declared record belongs to.
/// Assigned by source directory, never inferred from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileAction {
    Add,
    Del,
}

/// One artifact entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub file_name: String,
    pub file_size: u64,
    /// Best-effort version string, empty when unavailable. Informational
    /// only: never consulted by the diff engine.
    pub file_version: String,
    /// Lowercase hex SHA-256 digest of the file's bytes.
    pub file_hash: String,
    /// Absent on client-local scans (existing state, not intent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_action: Option<FileAction>,
}

/// Ordered collection of records. Order is irrelevant for diffing but
/// preserved so serialized output is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub files: Vec<FileRecord>,
}

impl Catalog {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

const HASH_CHUNK_SIZE: usize = 1024 * 1024;

/// Stream a file through SHA-256 without loading it whole into memory.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("opening {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("reading {} for hashing", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Pull a version-shaped suffix out of an artifact file name, e.g.
/// `lib-2.3.1.jar` -> `2.3.1`. Empty string when the name carries none.
pub fn version_from_name(file_name: &str) -> String {
    let stem = file_name.rsplit_once('.').map(|(s, _)| s).unwrap_or(file_name);
    let Some((_, candidate)) = stem.rsplit_once('-') else {
        return String::new();
    };
    let looks_versioned = !candidate.is_empty()
        && candidate.chars().all(|c| c.is_ascii_digit() || c == '.')
        && candidate.chars().any(|c| c.is_ascii_digit());
    if looks_versioned { candidate.to_string() } else { String::new() }
}

/// Scan a single directory level for files with the given extension and
/// build untagged records for them (local inventory).
pub fn scan_directory(path: &Path, extension: &str) -> Result<Catalog> {
    let mut catalog = Catalog::default();
    for entry in walkdir::WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let matches_ext = entry
            .path()
            .extension()
            .map(|e| e.eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        if !matches_ext {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        let file_size = entry
            .metadata()
            .with_context(|| format!("reading metadata of {}", entry.path().display()))?
            .len();
        let file_hash = hash_file(entry.path())?;
        catalog.files.push(FileRecord {
            file_version: version_from_name(&file_name),
            file_name,
            file_size,
            file_hash,
            file_action: None,
        });
    }
    Ok(catalog)
}

fn scan_tagged(path: &Path, extension: &str, action: FileAction) -> Result<Catalog> {
    let mut catalog = scan_directory(path, extension)?;
    for record in &mut catalog.files {
        record.file_action = Some(action);
    }
    Ok(catalog)
}

/// Build the server's advertised catalog: everything under `increment_dir`
/// tagged `Add`, everything under `decrement_dir` tagged `Del`. Both
/// directories are created if absent. Built once at startup and immutable
/// for the process lifetime.
pub fn build_server_catalog(
    increment_dir: &Path,
    decrement_dir: &Path,
    extension: &str,
) -> Result<Catalog> {
    std::fs::create_dir_all(increment_dir)
        .with_context(|| format!("creating {}", increment_dir.display()))?;
    std::fs::create_dir_all(decrement_dir)
        .with_context(|| format!("creating {}", decrement_dir.display()))?;

    let mut catalog = scan_tagged(increment_dir, extension, FileAction::Add)?;
    let decrement = scan_tagged(decrement_dir, extension, FileAction::Del)?;
    catalog.files.extend(decrement.files);
    Ok(catalog)
}

/// Remote `Add` records whose content is not present locally.
///
/// Local records are indexed by hash (last-write-wins on the rare collision).
/// A remote record whose hash exists locally under a different name is
/// considered satisfied: it is skipped with a diagnostic, never re-downloaded
/// and never renamed.
pub fn diff_for_add(local: &Catalog, remote: &Catalog) -> Catalog {
    let mut local_by_hash: HashMap<&str, &FileRecord> = HashMap::new();
    for record in &local.files {
        local_by_hash.insert(record.file_hash.as_str(), record);
    }

    let mut to_add = Catalog::default();
    for remote_record in &remote.files {
        if remote_record.file_action != Some(FileAction::Add) {
            continue;
        }
        match local_by_hash.get(remote_record.file_hash.as_str()) {
            None => to_add.files.push(remote_record.clone()),
            Some(local_record) => {
                if local_record.file_name != remote_record.file_name {
                    info!(
                        "skipping {} ({}): same content already present as {}",
                        remote_record.file_name, remote_record.file_hash, local_record.file_name
                    );
                }
            }
        }
    }
    to_add
}

/// Remote `Del` records that name a locally present file. Hash is ignored:
/// deletion removes an obsolete artifact by name whatever its bytes are.
pub fn diff_for_delete(local: &Catalog, remote: &Catalog) -> Catalog {
    let local_names: HashSet<&str> = local.files.iter().map(|r| r.file_name.as_str()).collect();

    let mut to_delete = Catalog::default();
    for remote_record in &remote.files {
        if remote_record.file_action != Some(FileAction::Del) {
            continue;
        }
        if local_names.contains(remote_record.file_name.as_str()) {
            to_delete.files.push(remote_record.clone());
        }
    }
    to_delete
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, hash: &str, action: Option<FileAction>) -> FileRecord {
        FileRecord {
            file_name: name.to_string(),
            file_size: 100,
            file_version: String::new(),
            file_hash: hash.to_string(),
            file_action: action,
        }
    }

    fn catalog(records: Vec<FileRecord>) -> Catalog {
        Catalog { files: records }
    }

    #[test]
    fn add_diff_downloads_only_missing_content() {
        let local = catalog(vec![record("f1.bin", "hash-a", None)]);
        let remote = catalog(vec![
            record("f1.bin", "hash-a", Some(FileAction::Add)),
            record("f2.bin", "hash-b", Some(FileAction::Add)),
        ]);
        let to_add = diff_for_add(&local, &remote);
        assert_eq!(to_add.files.len(), 1);
        assert_eq!(to_add.files[0].file_name, "f2.bin");
    }

    #[test]
    fn add_diff_skips_renamed_content() {
        let local = catalog(vec![record("old.bin", "hash-a", None)]);
        let remote = catalog(vec![record("new.bin", "hash-a", Some(FileAction::Add))]);
        let to_add = diff_for_add(&local, &remote);
        assert!(to_add.is_empty(), "same content under another name is satisfied");
    }

    #[test]
    fn add_diff_ignores_del_records() {
        let local = Catalog::default();
        let remote = catalog(vec![record("gone.bin", "hash-z", Some(FileAction::Del))]);
        assert!(diff_for_add(&local, &remote).is_empty());
    }

    #[test]
    fn add_diff_empty_local_downloads_everything() {
        let remote = catalog(vec![
            record("a.bin", "hash-a", Some(FileAction::Add)),
            record("b.bin", "hash-b", Some(FileAction::Add)),
        ]);
        assert_eq!(diff_for_add(&Catalog::default(), &remote).len(), 2);
    }

    #[test]
    fn add_diff_is_idempotent() {
        let local = catalog(vec![record("f1.bin", "hash-a", None)]);
        let remote = catalog(vec![
            record("f1.bin", "hash-a", Some(FileAction::Add)),
            record("f2.bin", "hash-b", Some(FileAction::Add)),
        ]);
        let first = diff_for_add(&local, &remote);
        let second = diff_for_add(&local, &remote);
        assert_eq!(first, second);
    }

    #[test]
    fn delete_diff_matches_by_name_only() {
        let local = catalog(vec![record("stale.bin", "local-hash", None)]);
        let remote = catalog(vec![record("stale.bin", "server-hash", Some(FileAction::Del))]);
        let to_delete = diff_for_delete(&local, &remote);
        assert_eq!(to_delete.files.len(), 1);
        assert_eq!(to_delete.files[0].file_name, "stale.bin");
    }

    #[test]
    fn delete_diff_skips_absent_names() {
        let local = catalog(vec![record("kept.bin", "hash-a", None)]);
        let remote = catalog(vec![record("other.bin", "hash-a", Some(FileAction::Del))]);
        assert!(diff_for_delete(&local, &remote).is_empty());
    }

    #[test]
    fn empty_remote_produces_no_work() {
        let local = catalog(vec![record("f1.bin", "hash-a", None)]);
        assert!(diff_for_add(&local, &Catalog::default()).is_empty());
        assert!(diff_for_delete(&local, &Catalog::default()).is_empty());
    }

    #[test]
    fn duplicate_local_names_with_same_hash_satisfy_once() {
        let local = catalog(vec![
            record("copy1.bin", "hash-a", None),
            record("copy2.bin", "hash-a", None),
        ]);
        let remote = catalog(vec![record("copy2.bin", "hash-a", Some(FileAction::Add))]);
        // Last-write-wins index maps hash-a to copy2.bin, an exact match.
        assert!(diff_for_add(&local, &remote).is_empty());
    }

    #[test]
    fn version_extraction_best_effort() {
        assert_eq!(version_from_name("lib-2.3.1.jar"), "2.3.1");
        assert_eq!(version_from_name("core-10.jar"), "10");
        assert_eq!(version_from_name("plain.jar"), "");
        assert_eq!(version_from_name("not-a-version.jar"), "");
        assert_eq!(version_from_name("trailing-.jar"), "");
        assert_eq!(version_from_name("noext"), "");
    }
}
