//! Per-request working directories.
//!
//! Every request owns `<work_dir>/<request_id>/` and writes exactly two
//! files inside it: the staged upload and the rendered diagram. Two requests
//! never share a path, so concurrent uploads cannot clobber each other. A
//! caller that reuses an explicit request id gets the same two paths back and
//! overwrites them. [`RequestWorkspace::discard`] removes the whole directory
//! once a request is finished with it.

use crate::error::Pdf2SchemaError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// File name of the staged upload inside a workspace.
pub const STAGING_FILE: &str = "input.pdf";

/// File name of the rendered diagram inside a workspace.
pub const IMAGE_FILE: &str = "diagram.svg";

/// A directory scoped to a single request.
#[derive(Debug, Clone)]
pub struct RequestWorkspace {
    request_id: String,
    dir: PathBuf,
}

impl RequestWorkspace {
    /// Create (or reopen) the workspace for `request_id` under `root`.
    ///
    /// With `None` a fresh UUID v4 is generated. Ids are restricted to
    /// ASCII alphanumerics, `-` and `_` so they cannot escape `root`.
    pub async fn create(root: &Path, request_id: Option<&str>) -> Result<Self, Pdf2SchemaError> {
        let request_id = match request_id {
            Some(id) => {
                validate_id(id)?;
                id.to_string()
            }
            None => Uuid::new_v4().to_string(),
        };

        let dir = root.join(&request_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Pdf2SchemaError::WorkspaceWriteFailed {
                path: dir.clone(),
                source: e,
            })?;
        debug!("Workspace ready: {}", dir.display());

        Ok(Self { request_id, dir })
    }

    /// Handle to the workspace for `request_id` without touching the filesystem.
    pub fn open(root: &Path, request_id: &str) -> Result<Self, Pdf2SchemaError> {
        validate_id(request_id)?;
        Ok(Self {
            request_id: request_id.to_string(),
            dir: root.join(request_id),
        })
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the uploaded PDF is written.
    pub fn staging_path(&self) -> PathBuf {
        self.dir.join(STAGING_FILE)
    }

    /// Where the rendered diagram is written.
    pub fn image_path(&self) -> PathBuf {
        self.dir.join(IMAGE_FILE)
    }

    /// Remove the staged upload, keeping the image. Missing files are fine.
    pub async fn discard_staging(&self) {
        let path = self.staging_path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Removed staging file {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", path.display(), e),
        }
    }

    /// Remove the workspace directory and everything in it.
    pub async fn discard(&self) {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!("Removed workspace {}", self.dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", self.dir.display(), e),
        }
    }
}

fn validate_id(id: &str) -> Result<(), Pdf2SchemaError> {
    let ok = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Pdf2SchemaError::InvalidConfig(format!(
            "request id '{id}' must be 1–128 characters of [A-Za-z0-9_-]"
        )))
    }
}
