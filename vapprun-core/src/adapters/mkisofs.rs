//! `mkisofs` environment image builder.

use crate::adapters::IsoBuilder;
use crate::error::{Result, VappError};
use crate::paths;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Volume label of the environment image.
pub const OVF_ENV_VOLUME_LABEL: &str = "OVF ENV";

pub struct MkisofsBuilder {
    binary_path: PathBuf,
}

impl MkisofsBuilder {
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        Self { binary_path: binary_path.into() }
    }

    /// Arguments imaging `source_dir` into `target`. `-r` keeps host owner
    /// and permission bits out of the image.
    fn args(target: &Path, source_dir: &Path) -> Vec<String> {
        let mut args: Vec<String> = [
            "-r",
            "-V",
            OVF_ENV_VOLUME_LABEL,
            "-quiet",
            "-rock",
            "-joliet",
            "-full-iso9660-filenames",
            "-o",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(target.to_string_lossy().into_owned());
        args.push(source_dir.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl IsoBuilder for MkisofsBuilder {
    #[instrument(skip(self, document))]
    async fn build(&self, document: &str, target: &Path) -> Result<()> {
        let staging = tempfile::tempdir().map_err(|e| VappError::io(std::env::temp_dir(), e))?;
        let doc_path = staging.path().join(paths::OVF_ENV_XML_NAME);
        tokio::fs::write(&doc_path, document).await.map_err(|e| VappError::io(&doc_path, e))?;

        match tokio::fs::remove_file(target).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(VappError::io(target, e)),
        }

        let command = self.binary_path.display().to_string();
        let output = Command::new(&self.binary_path)
            .args(Self::args(target, staging.path()))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => VappError::CommandNotFound { command: command.clone() },
                _ => VappError::CommandFailed { command: command.clone(), reason: e.to_string() },
            })?;

        if !output.status.success() {
            return Err(VappError::CommandFailed {
                command,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!("Wrote environment image {:?}", target);
        Ok(())
    }
}
