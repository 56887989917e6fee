// Per-run filesystem context: the scratch workspace and the published output.

use crate::error::{PipelineError, PipelineResult};
use crate::run_artifacts::PipelineMetadata;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FRAMES_DIR: &str = "frames";
const CROPPED_DIR: &str = "cropped";
const OUTPUT_STEM: &str = "output";

/// Scratch directory owned by exactly one pipeline run.
///
/// Holds `frames/`, `cropped/` and the encoded `output.<ext>`. Deleted when
/// dropped, on every exit path.
pub struct Workspace {
    dir: Option<TempDir>,
    root: PathBuf,
}

impl Workspace {
    pub fn create(scratch_root: &Path) -> PipelineResult<Self> {
        let setup = || -> Result<Self> {
            fs::create_dir_all(scratch_root)?;
            let dir = tempfile::Builder::new()
                .prefix("clip-cropper-")
                .tempdir_in(scratch_root)?;
            let root = dir.path().to_path_buf();
            fs::create_dir(root.join(FRAMES_DIR))?;
            fs::create_dir(root.join(CROPPED_DIR))?;
            Ok(Self {
                dir: Some(dir),
                root,
            })
        };

        let workspace = setup()
            .with_context(|| format!("Failed to create workspace under {}", scratch_root.display()))
            .map_err(|e| PipelineError::workspace(format!("{:#}", e)))?;
        tracing::debug!("Created workspace {}", workspace.root.display());
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join(FRAMES_DIR)
    }

    pub fn crop_dir(&self) -> PathBuf {
        self.root.join(CROPPED_DIR)
    }

    pub fn output_path(&self, extension: &str) -> PathBuf {
        self.root.join(format!("{}.{}", OUTPUT_STEM, extension))
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => tracing::debug!("Removed workspace {}", self.root.display()),
                Err(e) => tracing::warn!("Failed to remove workspace {}: {}", self.root.display(), e),
            }
        }
    }
}

/// Copy `encoded` out of the workspace to
/// `<output_dir>/<stem>_cropped_<uuid>.<ext>` and return the new path.
pub fn publish_output(encoded: &Path, output_dir: &Path, stem: &str, extension: &str) -> PipelineResult<PathBuf> {
    let name = format!("{}_cropped_{}.{}", stem, uuid::Uuid::new_v4().simple(), extension);
    let target = output_dir.join(name);

    fs::create_dir_all(output_dir)
        .and_then(|_| fs::copy(encoded, &target))
        .map_err(|e| {
            PipelineError::workspace(format!(
                "Failed to publish {} to {}: {}",
                encoded.display(),
                target.display(),
                e
            ))
        })?;

    tracing::info!("Published {}", target.display());
    Ok(target)
}

/// Write run metadata as pretty JSON.
pub fn write_metadata_sidecar(path: &Path, metadata: &PipelineMetadata) -> Result<()> {
    let content = serde_json::to_string_pretty(metadata)?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
