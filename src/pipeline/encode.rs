//! Image encoding: raw bytes or rendered pages → base64 [`ImageData`].
//!
//! Uploaded images are passed through byte-for-byte; only rasterised pages
//! are (re-)encoded, always as PNG because it is lossless and text crispness
//! matters more than payload size for a vision model.
//!
//! MIME type comes from the file extension, never from sniffing the bytes:
//!
//! | Extension | MIME |
//! |-----------|------|
//! | `.jpg`, `.jpeg` | `image/jpeg` |
//! | `.png` | `image/png` |
//! | `.webp` | `image/webp` |
//! | anything else | `image/jpeg` |

use crate::content::ImageData;
use crate::error::PageError;
use image::DynamicImage;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// MIME type used for rasterised PDF pages.
pub const PAGE_MIME: &str = "image/png";

/// Resolve a MIME type from a file extension (case-insensitive, with or
/// without the leading dot).
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

/// Encode raw image bytes; `hint` is the source file extension.
pub fn encode_bytes(bytes: &[u8], hint: &str) -> ImageData {
    ImageData::from_bytes(bytes, mime_for_extension(hint))
}

/// Read an image file and encode it.
///
/// A missing file is reported as [`PageError::NotFound`] so the caller can
/// decide to skip it rather than abort the whole request.
pub fn encode_file(path: &Path) -> Result<ImageData, PageError> {
    let bytes = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PageError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            PageError::Unreadable {
                path: path.to_path_buf(),
                detail: e.to_string(),
            }
        }
    })?;
    let hint = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let data = encode_bytes(&bytes, hint);
    debug!(
        "Encoded {} ({} bytes) → {} bytes base64",
        path.display(),
        bytes.len(),
        data.data.len()
    );
    Ok(data)
}

/// Encode several image files in order, skipping any that cannot be read.
pub fn encode_paths<P: AsRef<Path>>(paths: &[P]) -> Vec<ImageData> {
    paths
        .iter()
        .filter_map(|p| match encode_file(p.as_ref()) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Skipping image: {}", e);
                None
            }
        })
        .collect()
}

/// PNG-encode a rendered page.
pub fn encode_page_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Path of the cached PNG for a 1-indexed page: `<dir>/<basename>_page<N>.png`.
pub fn page_file_name(dir: &Path, basename: &str, page_num: usize) -> PathBuf {
    dir.join(format!("{basename}_page{page_num}.png"))
}
