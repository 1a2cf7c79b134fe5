//! Intake: get the PDF bytes into the request workspace.
//!
//! Everything ends at [`stage_upload`], which writes the workspace's staging
//! file. Form uploads go there directly and are not format-checked: a
//! non-PDF upload fails later in extraction as [`Pdf2SchemaError::CorruptPdf`].
//! The CLI's path-or-URL argument goes through [`stage_input`], which reads
//! or downloads the bytes and checks the `%PDF` magic before staging them.

use crate::error::Pdf2SchemaError;
use crate::workspace::RequestWorkspace;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Write document bytes to the workspace staging file.
pub async fn stage_upload(ws: &RequestWorkspace, bytes: &[u8]) -> Result<PathBuf, Pdf2SchemaError> {
    let path = ws.staging_path();
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| Pdf2SchemaError::WorkspaceWriteFailed {
            path: path.clone(),
            source: e,
        })?;
    debug!("Staged {} bytes at {}", bytes.len(), path.display());
    Ok(path)
}

/// Where a CLI document argument points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    File(PathBuf),
    Remote(Url),
}

impl InputSource {
    /// `http(s)://` arguments are remote; anything else is a file path.
    pub fn parse(input: &str) -> Self {
        match Url::parse(input) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => InputSource::Remote(url),
            _ => InputSource::File(PathBuf::from(input)),
        }
    }
}

/// Read or download `input`, check it is a PDF and stage it in `ws`.
pub async fn stage_input(
    ws: &RequestWorkspace,
    input: &str,
    timeout_secs: u64,
) -> Result<PathBuf, Pdf2SchemaError> {
    let bytes = match InputSource::parse(input) {
        InputSource::File(path) => {
            let bytes = read_file(&path).await?;
            check_magic(&bytes, &path)?;
            bytes
        }
        InputSource::Remote(url) => {
            let bytes = fetch(&url, timeout_secs).await?;
            check_magic(&bytes, Path::new(url.as_str()))?;
            bytes
        }
    };
    stage_upload(ws, &bytes).await
}

async fn read_file(path: &Path) -> Result<Vec<u8>, Pdf2SchemaError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => Pdf2SchemaError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Pdf2SchemaError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

/// Documents shorter than the magic are left for extraction to reject.
fn check_magic(bytes: &[u8], origin: &Path) -> Result<(), Pdf2SchemaError> {
    match bytes.first_chunk::<4>() {
        Some(magic) if magic != PDF_MAGIC => Err(Pdf2SchemaError::NotAPdf {
            path: origin.to_path_buf(),
            magic: *magic,
        }),
        _ => Ok(()),
    }
}

async fn fetch(url: &Url, timeout_secs: u64) -> Result<Vec<u8>, Pdf2SchemaError> {
    info!("Downloading PDF from {}", url);
    let failed = |reason: String| Pdf2SchemaError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            Pdf2SchemaError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url.clone()).send().await.map_err(classify)?;
    let status = response.status();
    if !status.is_success() {
        return Err(failed(format!("HTTP {status}")));
    }

    let bytes = response.bytes().await.map_err(classify)?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}
