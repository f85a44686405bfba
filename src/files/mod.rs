//! Document and image file operations behind the editor endpoints.
//!
//! Documents are only ever touched inside directories the caller names;
//! every created name passes component validation so nothing escapes its
//! parent. Images live in the daemon's own `{data_dir}/images` pool under
//! generated names, never inside session folders.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tracing::info;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::fsops::{self, validate_component};
use crate::scan::{node_id, Node, NodeKind};

pub struct FileManager {
    config: Arc<ServerConfig>,
    http: reqwest::Client,
}

/// Short random filename stem, same shape as session ids.
fn short_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

impl FileManager {
    pub fn new(config: Arc<ServerConfig>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build http client")?;
        Ok(Self { config, http })
    }

    /// Read a document's full contents.
    pub async fn read_file(&self, path: &Path) -> ApiResult<String> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| ApiError::from_io(e, path))?;
        if !meta.is_file() {
            return Err(ApiError::Validation(format!(
                "{} is not a file",
                path.display()
            )));
        }
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ApiError::from_io(e, path))
    }

    /// Overwrite an existing document. Saving never creates files; a
    /// missing path is a stale editor tab, not a create request.
    pub async fn write_file(&self, path: &Path, content: &str) -> ApiResult<()> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(ApiError::Validation(format!(
                    "{} is not a file",
                    path.display()
                )))
            }
            Err(_) => {
                return Err(ApiError::NotFound(format!(
                    "{} does not exist",
                    path.display()
                )))
            }
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|e| ApiError::from_io(e, path))?;
        info!(path = %path.display(), bytes = content.len(), "document saved");
        Ok(())
    }

    /// Create an empty document under `parent`. A missing document
    /// extension is appended rather than rejected.
    pub async fn create_file(&self, parent: &Path, name: &str) -> ApiResult<Node> {
        validate_component(name)?;
        let parent = fsops::resolve_dir(parent).await?;

        let suffix = format!(".{}", self.config.document_extension);
        let file_name = if name.to_lowercase().ends_with(&suffix) {
            name.to_string()
        } else {
            format!("{name}{suffix}")
        };

        let path = parent.join(&file_name);
        if tokio::fs::metadata(&path).await.is_ok() {
            return Err(ApiError::AlreadyExists(format!(
                "{file_name} already exists"
            )));
        }
        tokio::fs::write(&path, "")
            .await
            .map_err(|e| ApiError::from_io(e, &path))?;
        info!(path = %path.display(), "document created");
        Ok(self.node_for(path, file_name, NodeKind::File).await)
    }

    /// Create an empty subfolder under `parent`.
    pub async fn create_folder(&self, parent: &Path, name: &str) -> ApiResult<Node> {
        validate_component(name)?;
        let parent = fsops::resolve_dir(parent).await?;

        let path = parent.join(name);
        if tokio::fs::metadata(&path).await.is_ok() {
            return Err(ApiError::AlreadyExists(format!("{name} already exists")));
        }
        tokio::fs::create_dir(&path)
            .await
            .map_err(|e| ApiError::from_io(e, &path))?;
        info!(path = %path.display(), "folder created");
        Ok(self.node_for(path, name.to_string(), NodeKind::Folder).await)
    }

    /// Remove a document or a folder tree.
    pub async fn delete_item(&self, path: &Path, is_folder: bool) -> ApiResult<()> {
        if is_folder {
            tokio::fs::remove_dir_all(path)
                .await
                .map_err(|e| ApiError::from_io(e, path))?;
        } else {
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| ApiError::from_io(e, path))?;
        }
        info!(path = %path.display(), is_folder, "item deleted");
        Ok(())
    }

    /// Store an uploaded document under `dir` with its client-side name.
    /// Only the configured document extension is accepted.
    pub async fn upload_document(
        &self,
        dir: &Path,
        file_name: &str,
        bytes: &[u8],
    ) -> ApiResult<Node> {
        validate_component(file_name)?;
        let dir = fsops::resolve_dir(dir).await?;

        let suffix = format!(".{}", self.config.document_extension);
        if !file_name.to_lowercase().ends_with(&suffix) {
            return Err(ApiError::Validation(format!(
                "only {suffix} files can be uploaded here"
            )));
        }

        let path = dir.join(file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ApiError::from_io(e, &path))?;
        info!(path = %path.display(), bytes = bytes.len(), "document uploaded");
        Ok(self
            .node_for(path, file_name.to_string(), NodeKind::File)
            .await)
    }

    /// Store image bytes in the shared image pool under a generated name.
    /// Returns the stored filename; the route layer turns it into a URL.
    pub async fn save_image(&self, original_name: &str, bytes: &[u8]) -> ApiResult<String> {
        let ext = Path::new(original_name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !self.config.image_extensions.contains(&ext) {
            return Err(ApiError::Validation(format!(
                "unsupported image type: {original_name}"
            )));
        }

        let images = self.config.images_dir();
        tokio::fs::create_dir_all(&images)
            .await
            .map_err(|e| ApiError::from_io(e, &images))?;

        let stored = format!("{}.{ext}", short_id());
        let path = images.join(&stored);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ApiError::from_io(e, &path))?;
        info!(stored, bytes = bytes.len(), "image saved");
        Ok(stored)
    }

    /// Download an image from a URL into the pool. The extension is taken
    /// from the URL path when it is on the allow-list, png otherwise.
    pub async fn fetch_image(&self, url: &str) -> ApiResult<String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ApiError::ExternalTool {
                reason: format!("failed to fetch {url}"),
                output: e.to_string(),
            })?;
        let bytes = response.bytes().await.map_err(|e| ApiError::ExternalTool {
            reason: format!("failed to read image body from {url}"),
            output: e.to_string(),
        })?;

        let bare = url.split('?').next().unwrap_or(url);
        let ext = bare
            .rsplit('.')
            .next()
            .map(str::to_lowercase)
            .filter(|e| self.config.image_extensions.contains(e))
            .unwrap_or_else(|| "png".to_string());

        self.save_image(&format!("remote.{ext}"), &bytes).await
    }

    /// Absolute path of a stored image, confined to the pool directory.
    pub fn image_path(&self, file_name: &str) -> ApiResult<PathBuf> {
        validate_component(file_name)?;
        Ok(self.config.images_dir().join(file_name))
    }

    async fn node_for(&self, path: PathBuf, name: String, kind: NodeKind) -> Node {
        let created_at = tokio::fs::metadata(&path)
            .await
            .and_then(|m| m.created().or_else(|_| m.modified()))
            .map(chrono::DateTime::<chrono::Utc>::from)
            .unwrap_or_else(|_| chrono::Utc::now());
        Node {
            id: node_id(&path),
            name,
            kind,
            file_path: path,
            created_at,
            children: match kind {
                NodeKind::Folder => Some(Vec::new()),
                NodeKind::File => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_in(dir: &Path) -> FileManager {
        FileManager::new(Arc::new(ServerConfig {
            data_dir: dir.to_path_buf(),
            ..ServerConfig::default()
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn create_file_appends_extension_and_rejects_duplicates() {
        let tmp = tempfile::tempdir().unwrap();
        let fm = manager_in(tmp.path());

        let node = fm.create_file(tmp.path(), "intro").await.unwrap();
        assert_eq!(node.name, "intro.md");
        assert_eq!(node.kind, NodeKind::File);
        assert!(tmp.path().join("intro.md").is_file());

        let err = fm.create_file(tmp.path(), "intro.md").await.unwrap_err();
        assert!(matches!(err, ApiError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn created_node_id_matches_a_later_tree_refresh() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let chapter = root.join("chapter");
        std::fs::create_dir(&chapter).unwrap();

        let fm = manager_in(&root);
        let node = fm.create_file(&chapter, "intro").await.unwrap();

        // A refresh rooted at the session folder must report the same id
        // for the nested entry the create response described.
        let tree = crate::scan::scan(&root, &crate::scan::ScanOptions::default());
        let rescanned = tree[0].children.as_ref().unwrap();
        assert_eq!(rescanned.len(), 1);
        assert_eq!(rescanned[0].id, node.id);
    }

    #[tokio::test]
    async fn save_requires_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let fm = manager_in(tmp.path());
        let path = tmp.path().join("ghost.md");

        let err = fm.write_file(&path, "# hi").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        std::fs::write(&path, "old").unwrap();
        fm.write_file(&path, "# hi").await.unwrap();
        assert_eq!(fm.read_file(&path).await.unwrap(), "# hi");
    }

    #[tokio::test]
    async fn upload_document_enforces_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let fm = manager_in(tmp.path());

        let err = fm
            .upload_document(tmp.path(), "notes.txt", b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let node = fm
            .upload_document(tmp.path(), "Notes.MD", b"# n")
            .await
            .unwrap();
        assert_eq!(node.name, "Notes.MD");
        assert!(tmp.path().join("Notes.MD").is_file());
    }

    #[tokio::test]
    async fn save_image_generates_pooled_name() {
        let tmp = tempfile::tempdir().unwrap();
        let fm = manager_in(tmp.path());

        let stored = fm.save_image("shot.PNG", b"\x89PNG").await.unwrap();
        assert!(stored.ends_with(".png"), "stored as {stored}");
        assert_eq!(stored.len(), "12345678.png".len());
        assert!(tmp.path().join("images").join(&stored).is_file());

        let err = fm.save_image("script.svg", b"<svg>").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_item_handles_files_and_folders() {
        let tmp = tempfile::tempdir().unwrap();
        let fm = manager_in(tmp.path());

        let file = tmp.path().join("a.md");
        std::fs::write(&file, "x").unwrap();
        fm.delete_item(&file, false).await.unwrap();
        assert!(!file.exists());

        let folder = tmp.path().join("part");
        std::fs::create_dir(&folder).unwrap();
        std::fs::write(folder.join("b.md"), "y").unwrap();
        fm.delete_item(&folder, true).await.unwrap();
        assert!(!folder.exists());

        let err = fm.delete_item(&file, false).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn image_path_rejects_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let fm = manager_in(tmp.path());
        assert!(fm.image_path("ab12cd34.png").is_ok());
        assert!(fm.image_path("../secret.png").is_err());
    }
}
