//! Recursive filesystem helpers shared by the scaffolder and the export
//! pipeline: copy, stats, verified copy, and name validation.
//!
//! Both callers follow the same discipline (stage a copy, verify it, and
//! only then delete the original), so the routines live in one place
//! instead of being re-rolled per caller. Recursive walks run under
//! `spawn_blocking` so long copies never stall the runtime.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::{ApiError, ApiResult};

/// Recursive file count and byte total for a directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirStats {
    pub files: u64,
    pub bytes: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The copied tree does not match the source tree. The destination has
    /// already been removed; the source is untouched.
    #[error(
        "copy verification failed: source has {src_files} files / {src_bytes} bytes, \
         copy has {dst_files} files / {dst_bytes} bytes"
    )]
    VerifyMismatch {
        src_files: u64,
        src_bytes: u64,
        dst_files: u64,
        dst_bytes: u64,
    },
}

/// Reject names that could escape their parent directory. Used for session
/// renames, created files/folders and image filenames.
pub fn validate_component(name: &str) -> ApiResult<()> {
    if name.is_empty() {
        return Err(ApiError::Validation("name must not be empty".to_string()));
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(ApiError::Validation(format!(
            "invalid name: {name}"
        )));
    }
    Ok(())
}

fn stats_blocking(path: &Path) -> io::Result<DirStats> {
    let mut stats = DirStats { files: 0, bytes: 0 };
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            let sub = stats_blocking(&entry.path())?;
            stats.files += sub.files;
            stats.bytes += sub.bytes;
        } else if meta.is_file() {
            stats.files += 1;
            stats.bytes += meta.len();
        }
    }
    Ok(stats)
}

fn copy_blocking(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if entry.metadata()?.is_dir() {
            copy_blocking(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Recursive file count / byte total.
pub async fn dir_stats(path: &Path) -> io::Result<DirStats> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || stats_blocking(&path))
        .await
        .map_err(io::Error::other)?
}

/// Recursive copy of `src` into `dst` (created if missing).
pub async fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
    tokio::task::spawn_blocking(move || copy_blocking(&src, &dst))
        .await
        .map_err(io::Error::other)?
}

/// Copy `src` into `dst` and verify the copy by comparing recursive file
/// counts and byte totals. On mismatch the destination is removed and the
/// source left untouched so nothing unconfirmed is ever trusted.
pub async fn copy_verified(src: &Path, dst: &Path) -> Result<DirStats, CopyError> {
    let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
    tokio::task::spawn_blocking(move || -> Result<DirStats, CopyError> {
        copy_blocking(&src, &dst)?;
        let expected = stats_blocking(&src)?;
        let actual = stats_blocking(&dst)?;
        if expected != actual {
            // Best-effort cleanup of the unverified copy.
            let _ = std::fs::remove_dir_all(&dst);
            return Err(CopyError::VerifyMismatch {
                src_files: expected.files,
                src_bytes: expected.bytes,
                dst_files: actual.files,
                dst_bytes: actual.bytes,
            });
        }
        Ok(actual)
    })
    .await
    .map_err(|e| CopyError::Io(io::Error::other(e)))?
}

/// Remove a directory tree if it exists.
pub async fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Resolve a directory the caller intends to mutate: it must exist and be a
/// directory. Returns the canonical path.
pub async fn resolve_dir(raw: &Path) -> ApiResult<PathBuf> {
    let canonical = tokio::fs::canonicalize(raw)
        .await
        .map_err(|_| ApiError::NotFound(format!("{} does not exist", raw.display())))?;
    let meta = tokio::fs::metadata(&canonical)
        .await
        .map_err(|e| ApiError::from_io(e, &canonical))?;
    if !meta.is_dir() {
        return Err(ApiError::NotADirectory(canonical.display().to_string()));
    }
    Ok(canonical)
}
