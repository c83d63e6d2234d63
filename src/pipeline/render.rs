//! PDF rasterisation: render every page to a `DynamicImage` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread designed for blocking operations, preventing the Tokio worker
//! threads from stalling during CPU-heavy rendering.
//!
//! ## Page order and failures
//!
//! Pages are rendered and encoded one at a time, in document order, so peak
//! memory stays at one raster page and the resulting image list is
//! deterministic. A page that fails to render is logged and skipped; the
//! pages after it still render and keep their relative order. Failing to
//! open the document at all is fatal and produces no pages.

use crate::config::{RasterConfig, RenderScale};
use crate::content::ImageData;
use crate::error::{PageError, PageLensError};
use crate::pipeline::encode;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One rendered page. Transient: encoded immediately and dropped.
#[derive(Debug, Clone)]
pub struct RasterPage {
    /// 0-based position in the document.
    pub page_index: usize,
    pub width_px: u32,
    pub height_px: u32,
    pub image: DynamicImage,
}

impl RasterPage {
    /// 1-based page number, as used in file names and logs.
    pub fn page_num(&self) -> usize {
        self.page_index + 1
    }
}

/// Anything that can render numbered pages.
///
/// Implemented for pdfium documents by [`PdfiumSource`]; tests supply
/// in-memory sources to exercise the skip-on-failure behaviour without a
/// pdfium library.
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Render the 0-based page `index` under the given sizing policy.
    fn render_page(&self, index: usize, scale: RenderScale) -> Result<DynamicImage, PageError>;
}

/// Lazy, finite iterator over the successfully rendered pages of a source.
///
/// Re-creating the iterator over the same source yields the same sequence.
pub struct RasterPages<'s, S: PageSource + ?Sized> {
    source: &'s S,
    scale: RenderScale,
    next: usize,
    total: usize,
    failures: Vec<PageError>,
}

impl<'s, S: PageSource + ?Sized> RasterPages<'s, S> {
    pub fn new(source: &'s S, scale: RenderScale) -> Self {
        Self {
            source,
            scale,
            next: 0,
            total: source.page_count(),
            failures: Vec::new(),
        }
    }

    /// Pages that failed so far, in page order.
    pub fn failures(&self) -> &[PageError] {
        &self.failures
    }
}

impl<S: PageSource + ?Sized> Iterator for RasterPages<'_, S> {
    type Item = RasterPage;

    fn next(&mut self) -> Option<RasterPage> {
        while self.next < self.total {
            let index = self.next;
            self.next += 1;

            match self.source.render_page(index, self.scale) {
                Ok(image) => {
                    debug!(
                        "Rendered page {} → {}x{} px",
                        index + 1,
                        image.width(),
                        image.height()
                    );
                    return Some(RasterPage {
                        page_index: index,
                        width_px: image.width(),
                        height_px: image.height(),
                        image,
                    });
                }
                Err(e) => {
                    warn!("Skipping page {}: {}", index + 1, e);
                    self.failures.push(e);
                }
            }
        }
        None
    }
}

/// Result of rasterising a whole document.
#[derive(Debug, Clone, Default)]
pub struct RenderedDocument {
    /// Pages in the document, including ones that failed.
    pub page_count: usize,
    /// One PNG per successfully rendered page, in page order.
    pub images: Vec<ImageData>,
    /// Files written to [`RasterConfig::output_dir`], if any.
    pub written: Vec<PathBuf>,
}

/// Render, optionally cache, and encode every page of `source`.
///
/// Page failures are logged and skipped. When none survive the result has
/// no images and the caller sends the prompt alone.
pub fn encode_pages<S: PageSource + ?Sized>(
    source: &S,
    config: &RasterConfig,
    basename: &str,
) -> Result<RenderedDocument, PageLensError> {
    let page_count = source.page_count();
    let output_dir = config.output_dir.as_deref().and_then(|dir| {
        std::fs::create_dir_all(dir)
            .map_err(|e| warn!("Not caching pages: cannot create {}: {}", dir.display(), e))
            .ok()
            .map(|_| dir)
    });

    let mut doc = RenderedDocument {
        page_count,
        images: Vec::with_capacity(page_count),
        written: Vec::new(),
    };
    let mut encode_failures = Vec::new();

    let mut pages = RasterPages::new(source, config.scale);
    for page in pages.by_ref() {
        let png = match encode::encode_page_png(&page.image) {
            Ok(png) => png,
            Err(e) => {
                let err = PageError::EncodeFailed {
                    page: page.page_num(),
                    detail: e.to_string(),
                };
                warn!("Skipping page: {}", err);
                encode_failures.push(err);
                continue;
            }
        };

        if let Some(dir) = output_dir {
            let path = encode::page_file_name(dir, basename, page.page_num());
            match std::fs::write(&path, &png) {
                Ok(()) => {
                    info!("Saved page {}: {}", page.page_num(), path.display());
                    doc.written.push(path);
                }
                Err(e) => warn!(
                    "Could not save page {} to {}: {}",
                    page.page_num(),
                    path.display(),
                    e
                ),
            }
        }

        doc.images.push(ImageData::from_bytes(&png, encode::PAGE_MIME));
    }

    if page_count > 0 && doc.images.is_empty() {
        let first_error = pages
            .failures()
            .iter()
            .chain(encode_failures.iter())
            .next()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(
            "No page of {} rendered; sending the prompt alone (first error: {})",
            page_count, first_error
        );
    }

    info!("Rasterised {}/{} pages", doc.images.len(), page_count);
    Ok(doc)
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// Bind pdfium for the current thread of work.
///
/// `PDFIUM_LIB_PATH` may name the library file or the directory holding it.
/// Otherwise the working directory is tried first, then the system library
/// search path.
pub fn bind_pdfium() -> Result<Pdfium, PageLensError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(p) if !p.is_empty() => {
            let path = PathBuf::from(&p);
            if path.is_dir() {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&path))
            } else {
                Pdfium::bind_to_library(&path)
            }
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    };
    bindings
        .map(Pdfium::new)
        .map_err(|e| PageLensError::PdfiumBindingFailed(format!("{:?}", e)))
}

/// A pdfium document as a [`PageSource`].
pub struct PdfiumSource<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PdfiumSource<'a> {
    /// Open a PDF file. Any failure here is fatal for the whole document.
    pub fn open(pdfium: &'a Pdfium, path: &Path) -> Result<Self, PageLensError> {
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| PageLensError::CorruptPdf {
                path: path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;
        info!("PDF loaded: {} pages", document.pages().len());
        Ok(Self { document })
    }

    fn page(&self, index: usize) -> Result<PdfPage<'a>, PageError> {
        self.document
            .pages()
            .get(index as u16)
            .map_err(|e| PageError::RenderFailed {
                page: index + 1,
                detail: format!("{:?}", e),
            })
    }

    /// Text layer of the 0-based page `index`.
    pub fn page_text(&self, index: usize) -> Result<String, PageError> {
        let page = self.page(index)?;
        let text = page.text().map_err(|e| PageError::RenderFailed {
            page: index + 1,
            detail: format!("text extraction: {:?}", e),
        })?;
        Ok(text.all())
    }
}

impl PageSource for PdfiumSource<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn render_page(&self, index: usize, scale: RenderScale) -> Result<DynamicImage, PageError> {
        let page = self.page(index)?;
        let factor = scale.factor_for(page.width().value, page.height().value);
        let render_config = PdfRenderConfig::new().scale_page_by_factor(factor);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| PageError::RenderFailed {
                page: index + 1,
                detail: format!("{:?}", e),
            })?;

        Ok(bitmap.as_image())
    }
}

/// Base name used for cached page files: the file stem, or `document`.
pub fn document_basename(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document")
        .to_string()
}

/// Rasterise and encode every page of the PDF at `pdf_path`.
///
/// This runs inside `spawn_blocking` since pdfium operations are CPU-bound.
pub async fn rasterize_pdf(
    pdf_path: &Path,
    config: &RasterConfig,
) -> Result<RenderedDocument, PageLensError> {
    let path = pdf_path.to_path_buf();
    let config = config.clone();

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let source = PdfiumSource::open(&pdfium, &path)?;
        encode_pages(&source, &config, &document_basename(&path))
    })
    .await
    .map_err(|e| PageLensError::Internal(format!("Render task panicked: {}", e)))?
}

/// Extract the text layer of every page, joined with newlines.
///
/// Returns the text and the document's page count. Pages whose text cannot
/// be read are logged and skipped.
pub async fn extract_text(pdf_path: &Path) -> Result<(String, usize), PageLensError> {
    let path = pdf_path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let source = PdfiumSource::open(&pdfium, &path)?;
        let total = source.page_count();

        let mut text = String::new();
        for index in 0..total {
            match source.page_text(index) {
                Ok(t) => {
                    text.push_str(&t);
                    text.push('\n');
                }
                Err(e) => warn!("Skipping text of page {}: {}", index + 1, e),
            }
        }
        debug!("Extracted {} chars of text from {} pages", text.len(), total);
        Ok((text, total))
    })
    .await
    .map_err(|e| PageLensError::Internal(format!("Text extraction task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    /// In-memory document whose pages are solid squares; listed pages fail.
    struct FakeDoc {
        pages: usize,
        failing: Vec<usize>,
    }

    impl FakeDoc {
        fn new(pages: usize, failing: &[usize]) -> Self {
            Self {
                pages,
                failing: failing.to_vec(),
            }
        }
    }

    impl PageSource for FakeDoc {
        fn page_count(&self) -> usize {
            self.pages
        }

        fn render_page(&self, index: usize, scale: RenderScale) -> Result<DynamicImage, PageError> {
            if self.failing.contains(&index) {
                return Err(PageError::RenderFailed {
                    page: index + 1,
                    detail: "broken content stream".into(),
                });
            }
            // 100 × 50 pt page; the red channel records the page index.
            let f = scale.factor_for(100.0, 50.0);
            let (w, h) = ((100.0 * f) as u32, (50.0 * f) as u32);
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                w,
                h,
                Rgba([index as u8, 0, 0, 255]),
            )))
        }
    }

    fn page_marker(img: &ImageData) -> u8 {
        let png = img.decode().unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        decoded.get_pixel(0, 0)[0]
    }

    #[test]
    fn iterator_yields_all_pages_in_order() {
        let doc = FakeDoc::new(3, &[]);
        let idx: Vec<usize> = RasterPages::new(&doc, RenderScale::Fixed(0.1))
            .map(|p| p.page_index)
            .collect();
        assert_eq!(idx, vec![0, 1, 2]);
    }

    #[test]
    fn iterator_is_restartable() {
        let doc = FakeDoc::new(4, &[2]);
        let first: Vec<usize> = RasterPages::new(&doc, RenderScale::Fixed(0.1))
            .map(|p| p.page_index)
            .collect();
        let second: Vec<usize> = RasterPages::new(&doc, RenderScale::Fixed(0.1))
            .map(|p| p.page_index)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn failed_page_is_skipped_without_gap() {
        let doc = FakeDoc::new(4, &[1]);
        let mut pages = RasterPages::new(&doc, RenderScale::Fixed(0.1));
        let idx: Vec<usize> = pages.by_ref().map(|p| p.page_index).collect();
        assert_eq!(idx, vec![0, 2, 3]);
        assert_eq!(pages.failures().len(), 1);
    }

    #[test]
    fn longest_edge_scaling_applied_per_page() {
        let doc = FakeDoc::new(1, &[]);
        let page = RasterPages::new(&doc, RenderScale::LongestEdge(200))
            .next()
            .unwrap();
        assert_eq!((page.width_px, page.height_px), (200, 100));
    }

    #[test]
    fn encode_pages_keeps_page_order() {
        let doc = FakeDoc::new(3, &[]);
        let config = RasterConfig {
            scale: RenderScale::Fixed(0.1),
            output_dir: None,
        };
        let out = encode_pages(&doc, &config, "doc").unwrap();
        assert_eq!(out.page_count, 3);
        let markers: Vec<u8> = out.images.iter().map(page_marker).collect();
        assert_eq!(markers, vec![0, 1, 2]);
        assert!(out.images.iter().all(|i| i.mime_type == "image/png"));
        assert!(out.written.is_empty());
    }

    #[test]
    fn encode_pages_skips_failed_page() {
        let doc = FakeDoc::new(5, &[2]);
        let config = RasterConfig {
            scale: RenderScale::Fixed(0.1),
            output_dir: None,
        };
        let out = encode_pages(&doc, &config, "doc").unwrap();
        let markers: Vec<u8> = out.images.iter().map(page_marker).collect();
        assert_eq!(markers, vec![0, 1, 3, 4]);
    }

    #[test]
    fn encode_pages_all_failed_yields_no_images() {
        let doc = FakeDoc::new(2, &[0, 1]);
        let out = encode_pages(&doc, &RasterConfig::default(), "doc").unwrap();
        assert_eq!(out.page_count, 2);
        assert!(out.images.is_empty());
        assert!(out.written.is_empty());
    }

    #[test]
    fn encode_pages_single_failed_page_is_not_fatal() {
        let doc = FakeDoc::new(1, &[0]);
        let out = encode_pages(&doc, &RasterConfig::default(), "doc").unwrap();
        assert_eq!(out.page_count, 1);
        assert!(out.images.is_empty());
    }

    #[test]
    fn encode_pages_empty_document_is_ok() {
        let doc = FakeDoc::new(0, &[]);
        let out = encode_pages(&doc, &RasterConfig::default(), "doc").unwrap();
        assert!(out.images.is_empty());
    }

    #[test]
    fn encode_pages_writes_named_files() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("png_images");
        let doc = FakeDoc::new(3, &[1]);
        let config = RasterConfig {
            scale: RenderScale::Fixed(0.1),
            output_dir: Some(out_dir.clone()),
        };
        let out = encode_pages(&doc, &config, "report").unwrap();
        assert_eq!(
            out.written,
            vec![
                out_dir.join("report_page1.png"),
                out_dir.join("report_page3.png")
            ]
        );
        for (path, img) in out.written.iter().zip(&out.images) {
            assert_eq!(std::fs::read(path).unwrap(), img.decode().unwrap());
        }
    }

    #[test]
    fn basename_from_path() {
        assert_eq!(document_basename(Path::new("/tmp/up/report.pdf")), "report");
        assert_eq!(document_basename(Path::new("/")), "document");
    }
}
