//! Canonical-folder-path to session-id bookkeeping.
//!
//! Invariant: at most one live session per canonical folder path. The
//! check-then-create and check-then-rename sequences run inside a per-path
//! critical section so concurrent callers cannot race a duplicate session
//! or interleave a rename with a read. No lock is held across scans of
//! unrelated sessions.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::fsops::{self, validate_component};
use crate::locks::KeyedLocks;
use crate::scan::{self, Node, ScanOptions};
use crate::storage::Storage;

/// A session's current folder plus a fresh structure snapshot.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub folder_path: PathBuf,
    pub structure: Vec<Node>,
}

/// Listing entry: id, folder and creation time, without a rescan.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub folder_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

pub struct SessionRegistry {
    storage: Arc<Storage>,
    path_locks: KeyedLocks,
    scan_opts: ScanOptions,
}

/// Opaque 8-character session token (prefix of a v4 UUID).
fn new_session_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

impl SessionRegistry {
    pub fn new(storage: Arc<Storage>, scan_opts: ScanOptions) -> Self {
        Self {
            storage,
            path_locks: KeyedLocks::new(),
            scan_opts,
        }
    }

    /// Bind a directory to a session. Idempotent: a second call for the
    /// same canonical path returns the existing id without creating a new
    /// record or forcing a rescan.
    pub async fn create_or_get(&self, raw_path: &Path) -> ApiResult<String> {
        let canonical = fsops::resolve_dir(raw_path).await?;
        let key = canonical.to_string_lossy().into_owned();

        let _guard = self.path_locks.lock(&key).await;
        if let Some(existing) = self.storage.find_by_folder(&key).await? {
            return Ok(existing.session_id);
        }

        let structure = scan::scan_async(&canonical, &self.scan_opts)
            .await
            .map_err(|e| ApiError::from_io(e, &canonical))?;
        let session_id = new_session_id();
        self.storage
            .insert_session(
                &session_id,
                &key,
                &serde_json::to_string(&structure)?,
                Utc::now().timestamp(),
            )
            .await?;
        info!(session_id, folder = %canonical.display(), "session created");
        Ok(session_id)
    }

    /// Resolve a session's folder, verifying it still exists on disk.
    pub async fn folder_path(&self, session_id: &str) -> ApiResult<PathBuf> {
        let row = self
            .storage
            .get_session(session_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("session {session_id} not found")))?;
        let folder = PathBuf::from(&row.folder_path);
        let meta = tokio::fs::metadata(&folder).await.map_err(|_| {
            ApiError::NotFound(format!(
                "the folder bound to session {session_id} no longer exists"
            ))
        })?;
        if !meta.is_dir() {
            return Err(ApiError::NotADirectory(folder.display().to_string()));
        }
        Ok(folder)
    }

    /// Fetch a session with a fresh structure snapshot. The persisted
    /// snapshot is historical and never returned directly.
    pub async fn get(&self, session_id: &str) -> ApiResult<SessionSnapshot> {
        let folder = self.folder_path(session_id).await?;
        let structure = scan::scan_async(&folder, &self.scan_opts)
            .await
            .map_err(|e| ApiError::from_io(e, &folder))?;
        Ok(SessionSnapshot {
            folder_path: folder,
            structure,
        })
    }

    /// All sessions whose directory still exists. Rows pointing at vanished
    /// directories are skipped, not deleted, since the folder may reappear.
    pub async fn list(&self) -> ApiResult<Vec<SessionSummary>> {
        let rows = self.storage.list_sessions().await?;
        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            let folder = PathBuf::from(&row.folder_path);
            if tokio::fs::metadata(&folder).await.is_ok() {
                sessions.push(SessionSummary {
                    session_id: row.session_id,
                    folder_path: folder,
                    created_at: DateTime::from_timestamp(row.created_at, 0).unwrap_or_default(),
                });
            }
        }
        Ok(sessions)
    }

    /// Rename the session's real directory to a sibling name and persist
    /// the new path plus a fresh snapshot. The session id (the storage key)
    /// never changes on rename.
    pub async fn rename(&self, session_id: &str, new_name: &str) -> ApiResult<PathBuf> {
        validate_component(new_name)?;
        let old_folder = self.folder_path(session_id).await?;
        let parent = old_folder
            .parent()
            .ok_or_else(|| ApiError::Validation("cannot rename a filesystem root".to_string()))?
            .to_path_buf();

        let new_folder = parent.join(new_name);

        // Lock both the source and destination paths, in a fixed order so
        // two renames crossing each other cannot deadlock. Holding the
        // destination lock serializes concurrent renames onto the same
        // sibling name; the loser hits the existence check below.
        let old_key = old_folder.to_string_lossy().into_owned();
        let new_key = new_folder.to_string_lossy().into_owned();
        let (first, second) = if old_key <= new_key {
            (&old_key, &new_key)
        } else {
            (&new_key, &old_key)
        };
        let _guard_a = self.path_locks.lock(first).await;
        let _guard_b = if first == second {
            None
        } else {
            Some(self.path_locks.lock(second).await)
        };

        if tokio::fs::metadata(&new_folder).await.is_ok() {
            return Err(ApiError::AlreadyExists(format!(
                "a folder named {new_name} already exists"
            )));
        }

        tokio::fs::rename(&old_folder, &new_folder)
            .await
            .map_err(|e| match e.kind() {
                // The destination appeared between the check and the rename.
                io::ErrorKind::AlreadyExists | io::ErrorKind::DirectoryNotEmpty => {
                    ApiError::AlreadyExists(format!("a folder named {new_name} already exists"))
                }
                _ => ApiError::from_io(e, &old_folder),
            })?;

        let structure = scan::scan_async(&new_folder, &self.scan_opts)
            .await
            .map_err(|e| ApiError::from_io(e, &new_folder))?;
        self.storage
            .update_folder(
                session_id,
                &new_folder.to_string_lossy(),
                &serde_json::to_string(&structure)?,
            )
            .await?;
        info!(session_id, from = %old_folder.display(), to = %new_folder.display(), "session renamed");
        Ok(new_folder)
    }

    /// Drop the bookkeeping record only. The real directory and its
    /// contents are never touched by deregistration.
    pub async fn deregister(&self, session_id: &str) -> ApiResult<()> {
        if !self.storage.delete_session(session_id).await? {
            return Err(ApiError::NotFound(format!("session {session_id} not found")));
        }
        info!(session_id, "session deregistered");
        Ok(())
    }

    /// One-off structure read of an arbitrary directory; no session is
    /// created or consulted.
    pub async fn scan_folder(&self, raw_path: &Path) -> ApiResult<Vec<Node>> {
        let canonical = fsops::resolve_dir(raw_path).await?;
        scan::scan_async(&canonical, &self.scan_opts)
            .await
            .map_err(|e| ApiError::from_io(e, &canonical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_eight_chars() {
        let id = new_session_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
    }
}
