//! Input staging: turn an upload or a local path into an [`Attachment`].
//!
//! ## Why stage uploads in a temp directory?
//!
//! pdfium requires a file-system path. Writing an upload into a `TempDir`
//! gives us a path pdfium can open, and cleanup happens automatically when
//! the `Attachment` is dropped, on success, on error, and on panic alike.
//!
//! Attachment kind is decided by file extension only (case-insensitive);
//! the bytes are never sniffed for type. PDFs additionally have their
//! `%PDF` magic checked so a mislabelled file is rejected up front instead
//! of surfacing as a pdfium error.

use crate::error::{ClientError, PageLensError};
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// The kind of an attachment, from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Pdf,
}

impl AttachmentKind {
    /// Classify an extension (with or without the dot). `None` means
    /// unsupported.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Some(AttachmentKind::Pdf),
            "png" | "jpg" | "jpeg" | "webp" => Some(AttachmentKind::Image),
            _ => None,
        }
    }
}

/// Lower-cased extension of a file name, without the dot. Empty if none.
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// A file attached to a request.
///
/// An uploaded attachment owns its temporary directory; dropping the
/// attachment removes the directory and everything in it.
#[derive(Debug)]
pub struct Attachment {
    /// File name as supplied by the client (sanitised to its last component).
    filename: String,
    path: PathBuf,
    temp_dir: Option<TempDir>,
}

impl Attachment {
    /// Stage uploaded bytes in a fresh temporary directory.
    pub fn from_bytes(filename: &str, bytes: &[u8]) -> Result<Self, PageLensError> {
        let name = sanitize_filename(filename);
        let temp_dir = TempDir::new()
            .map_err(|e| PageLensError::Internal(format!("Failed to create temp dir: {}", e)))?;
        let path = temp_dir.path().join(&name);
        std::fs::write(&path, bytes)
            .map_err(|e| PageLensError::Internal(format!("Failed to write temp file: {}", e)))?;
        debug!("Staged upload '{}' at {}", filename, path.display());

        Ok(Self {
            filename: name,
            path,
            temp_dir: Some(temp_dir),
        })
    }

    /// Reference an existing local file. Nothing is deleted on drop.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, PageLensError> {
        let path = path.into();
        if !path.is_file() {
            return Err(ClientError::bad_request(format!(
                "file not found: {}",
                path.display()
            ))
            .into());
        }
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            filename,
            path,
            temp_dir: None,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extension(&self) -> String {
        extension_of(&self.filename)
    }

    /// Directory that will be removed when this attachment drops, if any.
    pub fn staging_dir(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(|d| d.path())
    }

    /// Classify by extension; unsupported extensions are a client error.
    pub fn kind(&self) -> Result<AttachmentKind, ClientError> {
        let ext = self.extension();
        AttachmentKind::from_extension(&ext).ok_or_else(|| ClientError::unsupported_file_type(&ext))
    }
}

/// Keep only the final path component so a client-supplied name cannot
/// escape the staging directory.
fn sanitize_filename(name: &str) -> String {
    let last = name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    match last {
        "" | "." | ".." => "upload".to_string(),
        other => other.to_string(),
    }
}

/// Check the `%PDF` magic bytes.
pub fn ensure_pdf_magic(path: &Path) -> Result<(), ClientError> {
    let mut magic = [0u8; 4];
    let ok = std::fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .is_ok();
    if ok && &magic == b"%PDF" {
        Ok(())
    } else {
        Err(ClientError::bad_request(format!(
            "file is not a valid PDF (first bytes: {:?})",
            magic
        )))
    }
}
