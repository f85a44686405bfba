//! Bootstraps new site folders under `{data_dir}/sites/{name}` and runs
//! the external init tool against them.
//!
//! Failure policy: if any step after directory creation fails, the
//! half-built target is removed so a retry starts clean. Template seeding
//! is best-effort and never fails the bootstrap.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::export::run_tool;
use crate::fsops::{self, validate_component};

pub struct Scaffolder {
    config: Arc<ServerConfig>,
}

impl Scaffolder {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    /// Create and initialize `{data_dir}/sites/{name}`.
    ///
    /// Idempotent: if the target already exists it is returned untouched,
    /// with no template copy and no init run.
    pub async fn bootstrap(&self, name: &str) -> ApiResult<PathBuf> {
        validate_component(name)?;
        let target = self.config.sites_dir().join(name);

        if tokio::fs::metadata(&target).await.is_ok() {
            info!(site = name, "site folder already exists, reusing");
            return Ok(target);
        }

        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|e| ApiError::from_io(e, &target))?;

        match self.initialize(&target).await {
            Ok(()) => {
                info!(site = name, path = %target.display(), "site bootstrapped");
                Ok(target)
            }
            Err(err) => {
                // Roll back so a retry does not hit the reuse path above.
                if let Err(cleanup) = fsops::remove_dir_if_exists(&target).await {
                    warn!(
                        site = name,
                        path = %target.display(),
                        %cleanup,
                        "failed to remove half-built site folder"
                    );
                }
                Err(err)
            }
        }
    }

    async fn initialize(&self, target: &Path) -> ApiResult<()> {
        self.seed_template(target).await;
        run_tool(
            &self.config.init_command,
            target,
            self.config.subprocess_timeout(),
        )
        .await?;
        Ok(())
    }

    /// Copy template pieces into the new folder when a template exists.
    /// Missing or partially copied templates only log a warning; the init
    /// tool decides whether the folder is usable.
    async fn seed_template(&self, target: &Path) {
        let template = self.config.template_dir();

        let modules = template.join("node_modules");
        if tokio::fs::metadata(&modules).await.is_ok() {
            if let Err(err) = fsops::copy_dir(&modules, &target.join("node_modules")).await {
                warn!(path = %modules.display(), %err, "template node_modules copy failed");
            }
        }

        let manifest = template.join("book.json");
        if tokio::fs::metadata(&manifest).await.is_ok() {
            if let Err(err) = tokio::fs::copy(&manifest, target.join("book.json")).await {
                warn!(path = %manifest.display(), %err, "template book.json copy failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path, init_command: &str) -> Arc<ServerConfig> {
        Arc::new(ServerConfig {
            data_dir: dir.to_path_buf(),
            init_command: init_command.to_string(),
            ..ServerConfig::default()
        })
    }

    #[tokio::test]
    async fn bootstrap_creates_and_initializes() {
        let tmp = tempfile::tempdir().unwrap();
        let scaffolder = Scaffolder::new(config_in(tmp.path(), "touch"));
        let path = scaffolder.bootstrap("guide").await.unwrap();
        assert_eq!(path, tmp.path().join("sites").join("guide"));
        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn bootstrap_rolls_back_on_failed_init() {
        let tmp = tempfile::tempdir().unwrap();
        let scaffolder = Scaffolder::new(config_in(tmp.path(), "exit 1; :"));
        let err = scaffolder.bootstrap("guide").await.unwrap_err();
        assert!(matches!(err, ApiError::ExternalTool { .. }));
        assert!(!tmp.path().join("sites").join("guide").exists());
    }

    #[tokio::test]
    async fn bootstrap_reuses_existing_folder_without_init() {
        let tmp = tempfile::tempdir().unwrap();
        let existing = tmp.path().join("sites").join("guide");
        std::fs::create_dir_all(&existing).unwrap();
        std::fs::write(existing.join("README.md"), "# kept").unwrap();

        // Init command would fail, but must not run for an existing folder.
        let scaffolder = Scaffolder::new(config_in(tmp.path(), "exit 1; :"));
        let path = scaffolder.bootstrap("guide").await.unwrap();
        assert_eq!(path, existing);
        assert!(existing.join("README.md").exists());
    }

    #[tokio::test]
    async fn bootstrap_rejects_path_traversal_names() {
        let tmp = tempfile::tempdir().unwrap();
        let scaffolder = Scaffolder::new(config_in(tmp.path(), "touch"));
        assert!(matches!(
            scaffolder.bootstrap("../escape").await.unwrap_err(),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            scaffolder.bootstrap("").await.unwrap_err(),
            ApiError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn bootstrap_seeds_template_book_json() {
        let tmp = tempfile::tempdir().unwrap();
        let template = tmp.path().join("template");
        std::fs::create_dir_all(&template).unwrap();
        std::fs::write(template.join("book.json"), r#"{"title":"t"}"#).unwrap();

        let scaffolder = Scaffolder::new(config_in(tmp.path(), "touch"));
        let path = scaffolder.bootstrap("guide").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(path.join("book.json")).unwrap(),
            r#"{"title":"t"}"#
        );
    }
}
