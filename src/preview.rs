//! Page-by-page preview of a selected document.

use crate::core::{PDFDocument, PDFError};
use crate::digest::DigestHex;
use crate::render::{RenderError, RenderedPage, rasterize};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

/// Zoom factor pages are drawn at.
pub const DEFAULT_SCALE: f64 = 1.5;

/// Rendered pages kept around for quick back-and-forth navigation.
pub const DEFAULT_CACHE_PAGES: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    /// The underlying parser error is kept for logs; users see the generic text.
    #[error("Error loading PDF file.")]
    Decode(#[source] PDFError),

    #[error("Page {page} is out of range (document has {count} pages)")]
    PageOutOfRange { page: u32, count: u32 },

    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewOptions {
    pub scale: f64,
    pub cache_pages: usize,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        PreviewOptions {
            scale: DEFAULT_SCALE,
            cache_pages: DEFAULT_CACHE_PAGES,
        }
    }
}

/// A decoded document plus the page currently on screen.
///
/// The current page is 1-based and never leaves `[1, page_count]`.
pub struct Preview {
    document: PDFDocument,
    page_count: u32,
    current_page: u32,
    scale: f64,
    cache: LruCache<u32, RenderedPage>,
}

impl std::fmt::Debug for Preview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preview")
            .field("page_count", &self.page_count)
            .field("current_page", &self.current_page)
            .field("scale", &self.scale)
            .finish_non_exhaustive()
    }
}

impl Preview {
    /// Decodes `bytes`. A document without pages counts as undecodable.
    pub fn load(bytes: Arc<[u8]>, options: PreviewOptions) -> Result<Self, PreviewError> {
        let started = Instant::now();
        let mut document = PDFDocument::open(bytes).map_err(|e| {
            tracing::warn!(error = %e, "PDF decode failed");
            PreviewError::Decode(e)
        })?;
        let page_count = document.page_count().map_err(|e| {
            tracing::warn!(error = %e, "page tree unreadable");
            PreviewError::Decode(e)
        })?;
        if page_count == 0 {
            tracing::warn!("document has no pages");
            return Err(PreviewError::Decode(PDFError::Structure(
                "document has no pages".to_string(),
            )));
        }

        let capacity = NonZeroUsize::new(options.cache_pages).unwrap_or(NonZeroUsize::MIN);
        tracing::info!(
            pages = page_count,
            version = document.pdf_version().as_deref().unwrap_or("?"),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "document opened"
        );

        Ok(Preview {
            document,
            page_count,
            current_page: 1,
            scale: options.scale,
            cache: LruCache::new(capacity),
        })
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// 1-based number of the page last shown.
    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn document(&self) -> &PDFDocument {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut PDFDocument {
        &mut self.document
    }

    /// Digest of the bytes the document was decoded from.
    pub fn document_digest(&self) -> DigestHex {
        DigestHex::of_document(&self.document)
    }

    /// Draws page `page` (1-based) and makes it the current page.
    ///
    /// Content the painter cannot read leaves the page blank instead of
    /// failing the preview.
    pub fn render_page(&mut self, page: u32) -> Result<RenderedPage, PreviewError> {
        if page < 1 || page > self.page_count {
            return Err(PreviewError::PageOutOfRange {
                page,
                count: self.page_count,
            });
        }

        if let Some(cached) = self.cache.get(&page) {
            tracing::debug!(page, "page served from cache");
            self.current_page = page;
            return Ok(cached.clone());
        }

        let started = Instant::now();
        let pdf_page = self
            .document
            .get_page(page as usize - 1)
            .map_err(PreviewError::Decode)?;
        let content = self.document.page_content(&pdf_page).unwrap_or_else(|e| {
            tracing::warn!(page, error = %e, "page content unreadable, drawing blank page");
            Vec::new()
        });

        let viewport = pdf_page.viewport(self.scale);
        let pixmap = rasterize(&content, &viewport)?;
        let rendered = RenderedPage::new(page, self.page_count, pixmap);
        tracing::debug!(
            page,
            width = rendered.width(),
            height = rendered.height(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "page rendered"
        );

        self.cache.put(page, rendered.clone());
        self.current_page = page;
        Ok(rendered)
    }

    /// Shows the next page; `None` when already on the last page.
    pub fn next(&mut self) -> Option<Result<RenderedPage, PreviewError>> {
        (self.current_page < self.page_count).then(|| self.render_page(self.current_page + 1))
    }

    /// Shows the previous page; `None` when already on the first page.
    pub fn previous(&mut self) -> Option<Result<RenderedPage, PreviewError>> {
        (self.current_page > 1).then(|| self.render_page(self.current_page - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf_with_pages(count: usize) -> Vec<u8> {
        let kids: Vec<String> = (0..count).map(|i| format!("{} 0 R", i + 3)).collect();
        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), count),
        ];
        for _ in 0..count {
            objects.push("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 100 50] >>".to_string());
        }

        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref_pos = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for offset in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref_pos
            )
            .as_bytes(),
        );
        out
    }

    fn load(count: usize) -> Preview {
        Preview::load(Arc::from(pdf_with_pages(count)), PreviewOptions::default()).unwrap()
    }

    #[test]
    fn test_render_uses_scaled_viewport() {
        let mut preview = load(1);
        let page = preview.render_page(1).unwrap();
        assert_eq!((page.width(), page.height()), (150, 75));
        assert_eq!(page.indicator(), "Page 1 of 1");
        assert!(!page.can_go_previous() && !page.can_go_next());
    }

    #[test]
    fn test_out_of_range_pages() {
        let mut preview = load(2);
        assert!(matches!(
            preview.render_page(0),
            Err(PreviewError::PageOutOfRange { page: 0, count: 2 })
        ));
        assert!(matches!(
            preview.render_page(3),
            Err(PreviewError::PageOutOfRange { page: 3, count: 2 })
        ));
        assert_eq!(preview.current_page(), 1);
    }

    #[test]
    fn test_navigation_is_bounded() {
        let mut preview = load(2);
        assert!(preview.previous().is_none());
        let second = preview.next().unwrap().unwrap();
        assert_eq!(second.indicator(), "Page 2 of 2");
        assert!(!second.can_go_next());
        assert!(preview.next().is_none());
        assert_eq!(preview.current_page(), 2);
        assert_eq!(preview.previous().unwrap().unwrap().page_number, 1);
    }

    #[test]
    fn test_zero_pages_is_decode_error() {
        let err = Preview::load(Arc::from(pdf_with_pages(0)), PreviewOptions::default()).unwrap_err();
        assert!(matches!(err, PreviewError::Decode(_)));
        assert_eq!(err.to_string(), "Error loading PDF file.");
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = Preview::load(Arc::from(&b"%PDF-1.4 garbage"[..]), PreviewOptions::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "Error loading PDF file.");
    }
}
