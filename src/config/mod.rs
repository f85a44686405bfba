//! Server configuration.
//!
//! `{data_dir}/config.toml` supplies optional overrides.
//! Priority: CLI / env var  >  TOML  >  built-in default.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::Deserialize;
use tracing::warn;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_BUILD_COMMAND: &str = "gitbook build";
const DEFAULT_INIT_COMMAND: &str = "gitbook init";
const DEFAULT_BUILD_OUTPUT_DIR: &str = "_book";
const DEFAULT_SUBPROCESS_TIMEOUT_SECS: u64 = 300;
const DEFAULT_DOCUMENT_EXTENSION: &str = "md";

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_excluded_dirs() -> Vec<String> {
    vec!["_book".to_string(), "node_modules".to_string()]
}

fn default_image_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "bmp", "webp"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address for the REST server (use 0.0.0.0 for LAN access).
    pub bind_address: String,
    pub port: u16,
    /// Root for everything the daemon owns: the session database, bootstrapped
    /// sites, exported artifacts, uploaded images and the site template.
    pub data_dir: PathBuf,
    /// Base URL advertised in upload responses. Defaults to
    /// `http://{bind_address}:{port}`.
    pub public_base_url: Option<String>,
    /// External build tool invocation; the session folder is appended as a
    /// quoted argument.
    pub build_command: String,
    /// External init command run against freshly scaffolded site folders.
    pub init_command: String,
    /// Directory name the build tool is expected to produce inside the
    /// source folder.
    pub build_output_dir: String,
    /// Upper bound for build/init subprocess runtime; expired children are
    /// killed and reported as failures.
    pub subprocess_timeout_secs: u64,
    /// Directory names excluded from structure scans.
    pub excluded_dirs: Vec<String>,
    /// File extension (without dot) that marks a document.
    pub document_extension: String,
    /// Allowed image upload extensions (without dot, lowercase).
    pub image_extensions: Vec<String>,
    /// Log filter string, e.g. "info" or "debug,bindery=trace".
    pub log: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from("data"),
            public_base_url: None,
            build_command: DEFAULT_BUILD_COMMAND.to_string(),
            init_command: DEFAULT_INIT_COMMAND.to_string(),
            build_output_dir: DEFAULT_BUILD_OUTPUT_DIR.to_string(),
            subprocess_timeout_secs: DEFAULT_SUBPROCESS_TIMEOUT_SECS,
            excluded_dirs: default_excluded_dirs(),
            document_extension: DEFAULT_DOCUMENT_EXTENSION.to_string(),
            image_extensions: default_image_extensions(),
            log: "info".to_string(),
        }
    }
}

/// Shape of `{data_dir}/config.toml`; every field optional.
#[derive(Deserialize, Default)]
struct TomlConfig {
    bind_address: Option<String>,
    port: Option<u16>,
    public_base_url: Option<String>,
    build_command: Option<String>,
    init_command: Option<String>,
    build_output_dir: Option<String>,
    subprocess_timeout_secs: Option<u64>,
    excluded_dirs: Option<Vec<String>>,
    document_extension: Option<String>,
    image_extensions: Option<Vec<String>>,
    log: Option<String>,
}

impl ServerConfig {
    /// Load defaults overlaid with `{data_dir}/config.toml` (when present).
    /// CLI/env overrides are applied by the caller afterwards.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let mut config = Self {
            data_dir: data_dir.to_path_buf(),
            ..Self::default()
        };
        let toml_path = data_dir.join("config.toml");
        if toml_path.exists() {
            let raw = std::fs::read_to_string(&toml_path)
                .with_context(|| format!("failed to read {}", toml_path.display()))?;
            match toml::from_str::<TomlConfig>(&raw) {
                Ok(overlay) => config.apply(overlay),
                Err(err) => {
                    warn!(path = %toml_path.display(), %err, "ignoring malformed config.toml");
                }
            }
        }
        Ok(config)
    }

    fn apply(&mut self, overlay: TomlConfig) {
        if let Some(v) = overlay.bind_address {
            self.bind_address = v;
        }
        if let Some(v) = overlay.port {
            self.port = v;
        }
        if let Some(v) = overlay.public_base_url {
            self.public_base_url = Some(v);
        }
        if let Some(v) = overlay.build_command {
            self.build_command = v;
        }
        if let Some(v) = overlay.init_command {
            self.init_command = v;
        }
        if let Some(v) = overlay.build_output_dir {
            self.build_output_dir = v;
        }
        if let Some(v) = overlay.subprocess_timeout_secs {
            self.subprocess_timeout_secs = v;
        }
        if let Some(v) = overlay.excluded_dirs {
            self.excluded_dirs = v;
        }
        if let Some(v) = overlay.document_extension {
            self.document_extension = v;
        }
        if let Some(v) = overlay.image_extensions {
            self.image_extensions = v;
        }
        if let Some(v) = overlay.log {
            self.log = v;
        }
    }

    pub fn base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.bind_address, self.port))
    }

    /// Bootstrapped site folders live here, one per site name.
    pub fn sites_dir(&self) -> PathBuf {
        self.data_dir.join("sites")
    }

    /// Durable per-session export artifacts.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join("artifacts")
    }

    /// Uploaded editor images.
    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }

    /// Optional site template seeded into new scaffolds.
    pub fn template_dir(&self) -> PathBuf {
        self.data_dir.join("template")
    }

    pub fn scan_options(&self) -> crate::scan::ScanOptions {
        crate::scan::ScanOptions {
            document_extension: self.document_extension.clone(),
            excluded_dirs: self.excluded_dirs.clone(),
        }
    }

    pub fn subprocess_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.subprocess_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(tmp.path()).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.build_command, "gitbook build");
        assert_eq!(config.excluded_dirs, vec!["_book", "node_modules"]);
        assert_eq!(config.data_dir, tmp.path());
    }

    #[test]
    fn toml_overlay_wins_over_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            r#"
port = 8088
build_command = "mdbook build"
build_output_dir = "book"
subprocess_timeout_secs = 30
excluded_dirs = ["book", "target"]
"#,
        )
        .unwrap();
        let config = ServerConfig::load(tmp.path()).unwrap();
        assert_eq!(config.port, 8088);
        assert_eq!(config.build_command, "mdbook build");
        assert_eq!(config.build_output_dir, "book");
        assert_eq!(config.subprocess_timeout_secs, 30);
        assert_eq!(config.excluded_dirs, vec!["book", "target"]);
        // Untouched keys keep defaults.
        assert_eq!(config.document_extension, "md");
    }

    #[test]
    fn base_url_prefers_public_override() {
        let mut config = ServerConfig::default();
        assert_eq!(config.base_url(), "http://127.0.0.1:3000");
        config.public_base_url = Some("https://books.example.com".to_string());
        assert_eq!(config.base_url(), "https://books.example.com");
    }
}
