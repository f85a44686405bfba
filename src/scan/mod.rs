//! Filtered, ordered snapshots of a document directory.
//!
//! Every read of a session's structure goes through here; there is no cache.
//! Two scans in sequence may legitimately differ if the directory changed in
//! between; the snapshot only promises to match the filesystem at the
//! moment it was taken.

use std::cmp::Ordering;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Folder,
}

/// One entry in the filtered mirror of a directory's contents.
///
/// Serialized in the wire shape the editor front end expects: camelCase
/// keys, `type` as the kind discriminator, RFC-3339 `createdAt`, and
/// `children` present only on folders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub file_path: PathBuf,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Node>>,
}

/// Filter settings for a scan, taken from the server config.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// File extension (without dot) that marks a document.
    pub document_extension: String,
    /// Directory names that are never descended into (build output,
    /// dependency trees).
    pub excluded_dirs: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            document_extension: "md".to_string(),
            excluded_dirs: vec!["_book".to_string(), "node_modules".to_string()],
        }
    }
}

/// Deterministic node id: lowercase hex of the first 8 bytes of
/// `SHA-256(canonical path)`. The same filesystem entry always hashes to
/// the same id regardless of which directory a scan was rooted at, so a
/// single-node response and a later tree refresh agree.
pub fn node_id(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    hex::encode(&digest[..8])
}

/// Scan `root` on a blocking thread. Callers guarantee `root` exists, is
/// canonical and is a directory.
pub async fn scan_async(root: &Path, opts: &ScanOptions) -> io::Result<Vec<Node>> {
    let root = root.to_path_buf();
    let opts = opts.clone();
    tokio::task::spawn_blocking(move || Ok(scan(&root, &opts)))
        .await
        .map_err(io::Error::other)?
}

/// Walk `root` and produce its ordered, filtered snapshot.
///
/// Directories in the exclusion set and files without the document
/// extension are silently omitted. An unreadable subdirectory drops that
/// subtree with a warning and the rest of the scan proceeds; partial
/// results are preferred over total failure.
pub fn scan(root: &Path, opts: &ScanOptions) -> Vec<Node> {
    match scan_level(root, opts) {
        Ok(nodes) => nodes,
        Err(err) => {
            warn!(path = %root.display(), %err, "scan root unreadable");
            Vec::new()
        }
    }
}

fn scan_level(dir: &Path, opts: &ScanOptions) -> io::Result<Vec<Node>> {
    let mut entries: Vec<(SystemTime, Node)> = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!(dir = %dir.display(), %err, "skipping unreadable entry");
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(err) => {
                warn!(path = %path.display(), %err, "skipping entry without metadata");
                continue;
            }
        };
        // Birth time where the filesystem records it, mtime otherwise.
        let created = meta
            .created()
            .or_else(|_| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        if meta.is_dir() {
            if opts.excluded_dirs.iter().any(|d| d == &name) {
                continue;
            }
            let children = match scan_level(&path, opts) {
                Ok(children) => children,
                Err(err) => {
                    warn!(path = %path.display(), %err, "omitting unreadable subtree");
                    continue;
                }
            };
            entries.push((
                created,
                Node {
                    id: node_id(&path),
                    name,
                    kind: NodeKind::Folder,
                    file_path: path,
                    created_at: DateTime::<Utc>::from(created),
                    children: Some(children),
                },
            ));
        } else if meta.is_file() {
            let matches_ext = path
                .extension()
                .map(|e| {
                    e.to_string_lossy()
                        .eq_ignore_ascii_case(&opts.document_extension)
                })
                .unwrap_or(false);
            if !matches_ext {
                continue;
            }
            entries.push((
                created,
                Node {
                    id: node_id(&path),
                    name,
                    kind: NodeKind::File,
                    file_path: path,
                    created_at: DateTime::<Utc>::from(created),
                    children: None,
                },
            ));
        }
        // Symlinks and other entry types are silently omitted.
    }

    entries.sort_by(|a, b| snapshot_order(&(a.0, &a.1.name), &(b.0, &b.1.name)));
    Ok(entries.into_iter().map(|(_, node)| node).collect())
}

/// Ordering rule for one directory level: ascending creation time, ties
/// broken by ascending name so rescans are deterministic even when two
/// entries share a timestamp.
fn snapshot_order(a: &(SystemTime, &String), b: &(SystemTime, &String)) -> Ordering {
    a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1))
}
