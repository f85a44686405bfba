//! Export pipeline: drives the external build tool and relocates its
//! output into durable per-session storage.
//!
//! Explicit state machine:
//! `Idle -> Building -> {BuildFailed, BuildSucceeded} -> Relocating ->
//! {RelocateFailed, Done}`. A failed build leaves the source folder exactly
//! as it was; a failed relocation leaves the build output in the source
//! folder rather than deleting anything unconfirmed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::fsops::{self, CopyError};
use crate::locks::KeyedLocks;
use crate::registry::SessionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPhase {
    Idle,
    Building,
    BuildFailed,
    BuildSucceeded,
    Relocating,
    RelocateFailed,
    Done,
}

/// Result of a successful export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    /// Durable artifact location: `{data_dir}/artifacts/{session_id}/site`.
    pub artifact_path: PathBuf,
    /// The build tool's stdout, passed through for the client.
    pub build_output: String,
}

pub struct ExportPipeline {
    config: Arc<ServerConfig>,
    registry: Arc<SessionRegistry>,
    /// Per-session exclusion: two exports for one session never interleave.
    session_locks: KeyedLocks,
    /// Last observed phase per session id.
    phases: RwLock<HashMap<String, ExportPhase>>,
}

impl ExportPipeline {
    pub fn new(config: Arc<ServerConfig>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            config,
            registry,
            session_locks: KeyedLocks::new(),
            phases: RwLock::new(HashMap::new()),
        }
    }

    pub async fn phase(&self, session_id: &str) -> ExportPhase {
        self.phases
            .read()
            .await
            .get(session_id)
            .copied()
            .unwrap_or(ExportPhase::Idle)
    }

    async fn set_phase(&self, session_id: &str, phase: ExportPhase) {
        self.phases
            .write()
            .await
            .insert(session_id.to_string(), phase);
    }

    /// Run the full build-and-relocate pipeline for one session.
    ///
    /// A second concurrent call for the same session is rejected with
    /// `BuildInProgress`; exports for unrelated sessions proceed in
    /// parallel.
    pub async fn export(&self, session_id: &str) -> ApiResult<ExportOutcome> {
        let _guard = self
            .session_locks
            .try_lock(session_id)
            .await
            .ok_or_else(|| ApiError::BuildInProgress(session_id.to_string()))?;

        let folder = self.registry.folder_path(session_id).await?;

        self.set_phase(session_id, ExportPhase::Building).await;
        let build_output = match run_tool(
            &self.config.build_command,
            &folder,
            self.config.subprocess_timeout(),
        )
        .await
        {
            Ok(out) => out,
            Err(err) => {
                self.set_phase(session_id, ExportPhase::BuildFailed).await;
                return Err(err);
            }
        };

        // Exit code 0 alone is not trusted: the expected output directory
        // must actually exist inside the source folder.
        let source_output = folder.join(&self.config.build_output_dir);
        match tokio::fs::metadata(&source_output).await {
            Ok(meta) if meta.is_dir() => {}
            _ => {
                self.set_phase(session_id, ExportPhase::BuildFailed).await;
                return Err(ApiError::ExternalTool {
                    reason: format!(
                        "`{}` reported success but `{}` was not produced",
                        self.config.build_command, self.config.build_output_dir
                    ),
                    output: build_output,
                });
            }
        }
        self.set_phase(session_id, ExportPhase::BuildSucceeded).await;

        self.set_phase(session_id, ExportPhase::Relocating).await;
        let artifact_path = match self.relocate(session_id, &source_output).await {
            Ok(path) => path,
            Err(err) => {
                self.set_phase(session_id, ExportPhase::RelocateFailed).await;
                return Err(err);
            }
        };

        self.set_phase(session_id, ExportPhase::Done).await;
        info!(session_id, artifact = %artifact_path.display(), "export complete");
        Ok(ExportOutcome {
            artifact_path,
            build_output,
        })
    }

    /// Stage-copy the build output next to its final destination, verify
    /// the copy, swap it into place (replacing any prior artifact), and
    /// only then remove the redundant output from the source folder.
    async fn relocate(&self, session_id: &str, source_output: &Path) -> ApiResult<PathBuf> {
        let dest_root = self.config.artifacts_dir().join(session_id);
        tokio::fs::create_dir_all(&dest_root)
            .await
            .map_err(|e| ApiError::from_io(e, &dest_root))?;

        let staging = dest_root.join(format!(".staging-{}", Uuid::new_v4()));
        match fsops::copy_verified(source_output, &staging).await {
            Ok(stats) => {
                info!(
                    session_id,
                    files = stats.files,
                    bytes = stats.bytes,
                    "build output staged and verified"
                );
            }
            Err(CopyError::VerifyMismatch { .. }) => {
                // The source output stays where it is; nothing unverified
                // was deleted.
                return Err(ApiError::RelocateFailed(format!(
                    "copy of {} could not be verified; build output left in place",
                    source_output.display()
                )));
            }
            Err(CopyError::Io(err)) => {
                let _ = fsops::remove_dir_if_exists(&staging).await;
                return Err(ApiError::from_io(err, source_output));
            }
        }

        // Replace semantics: the prior artifact is purged, never versioned.
        let final_dest = dest_root.join("site");
        fsops::remove_dir_if_exists(&final_dest)
            .await
            .map_err(|e| ApiError::from_io(e, &final_dest))?;
        tokio::fs::rename(&staging, &final_dest)
            .await
            .map_err(|e| ApiError::from_io(e, &staging))?;

        // The copy is confirmed; the source-side output is now redundant.
        if let Err(err) = fsops::remove_dir_if_exists(source_output).await {
            warn!(
                session_id,
                path = %source_output.display(),
                %err,
                "artifact relocated but source output could not be removed"
            );
        }
        Ok(final_dest)
    }
}

/// Run `{command} "{dir}"` through the shell, bounded by `timeout`.
///
/// Returns the tool's stdout on exit 0. Non-zero exit propagates the
/// tool's stderr verbatim; on timeout the child is killed (`kill_on_drop`)
/// and reported as a failure rather than left hanging.
pub(crate) async fn run_tool(
    command: &str,
    dir: &Path,
    timeout: Duration,
) -> ApiResult<String> {
    let invocation = format!("{} \"{}\"", command, dir.display());
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&invocation)
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, output).await {
        Err(_) => Err(ApiError::ExternalTool {
            reason: format!("`{}` timed out after {}s", command, timeout.as_secs()),
            output: String::new(),
        }),
        Ok(Err(err)) => Err(ApiError::Internal(
            anyhow::Error::new(err).context(format!("failed to spawn `{command}`")),
        )),
        Ok(Ok(out)) if out.status.success() => {
            Ok(String::from_utf8_lossy(&out.stdout).into_owned())
        }
        Ok(Ok(out)) => Err(ApiError::ExternalTool {
            reason: format!(
                "`{}` failed (exit {})",
                command,
                out.status.code().unwrap_or(-1)
            ),
            output: String::from_utf8_lossy(&out.stderr).into_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_tool_captures_stdout() {
        let tmp = tempfile::tempdir().unwrap();
        let out = run_tool("echo built", tmp.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.starts_with("built"));
    }

    #[tokio::test]
    async fn run_tool_propagates_stderr_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let err = run_tool(
            "echo 'boom: bad SUMMARY' >&2 && exit 3; :",
            tmp.path(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        match err {
            ApiError::ExternalTool { reason, output } => {
                assert!(reason.contains("exit 3"), "reason was {reason}");
                assert!(output.contains("boom: bad SUMMARY"));
            }
            other => panic!("expected ExternalTool, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn run_tool_times_out() {
        let tmp = tempfile::tempdir().unwrap();
        let err = run_tool("sleep 5; echo", tmp.path(), Duration::from_millis(100))
            .await
            .unwrap_err();
        match err {
            ApiError::ExternalTool { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("expected timeout ExternalTool, got {other:?}"),
        }
    }
}
