//! Page rasterization.
//!
//! Maps PDF user space onto device pixels the way PDF.js's `PageViewport`
//! does, then paints vector content with tiny-skia.

mod painter;

pub use painter::{GraphicsState, Painter};

use base64::{Engine as _, engine::general_purpose};
use tiny_skia::{Pixmap, Transform};

/// Largest bitmap, in pixels, a page is rasterized to (PDF.js `maxCanvasPixels`).
pub const MAX_CANVAS_PIXELS: u64 = 16_777_216;

/// Errors produced while rasterizing or exporting a page.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Cannot allocate a {width}x{height} page bitmap")]
    InvalidSize { width: u32, height: u32 },

    #[error("PNG encoding failed: {0}")]
    Encode(#[from] png::EncodingError),
}

/// Geometry of a page drawn at some scale and rotation.
///
/// `transform` maps PDF user space (origin bottom-left, y up) into device
/// space (origin top-left, y down).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub view_box: [f64; 4],
    pub scale: f64,
    pub rotation: i32,
    pub width: f64,
    pub height: f64,
    pub transform: [f64; 6],
}

impl Viewport {
    pub fn new(view_box: [f64; 4], scale: f64, rotation: i32) -> Self {
        let center_x = (view_box[2] + view_box[0]) / 2.0;
        let center_y = (view_box[3] + view_box[1]) / 2.0;

        let rotation = rotation.rem_euclid(360);
        let (a, b, c, d) = match rotation {
            90 => (0.0, 1.0, 1.0, 0.0),
            180 => (-1.0, 0.0, 0.0, 1.0),
            270 => (0.0, -1.0, -1.0, 0.0),
            _ => (1.0, 0.0, 0.0, -1.0),
        };

        let (offset_x, offset_y, width, height) = if a == 0.0 {
            (
                (center_y - view_box[1]).abs() * scale,
                (center_x - view_box[0]).abs() * scale,
                (view_box[3] - view_box[1]) * scale,
                (view_box[2] - view_box[0]) * scale,
            )
        } else {
            (
                (center_x - view_box[0]).abs() * scale,
                (center_y - view_box[1]).abs() * scale,
                (view_box[2] - view_box[0]) * scale,
                (view_box[3] - view_box[1]) * scale,
            )
        };

        let transform = [
            a * scale,
            b * scale,
            c * scale,
            d * scale,
            offset_x - a * scale * center_x - c * scale * center_y,
            offset_y - b * scale * center_x - d * scale * center_y,
        ];

        Viewport {
            view_box,
            scale,
            rotation,
            width,
            height,
            transform,
        }
    }

    /// Bitmap size: the viewport extents truncated to whole pixels, at least 1.
    pub fn pixel_size(&self) -> (u32, u32) {
        let px = |v: f64| (v.max(1.0) as u32).max(1);
        (px(self.width), px(self.height))
    }

    /// Maps a user-space point to device space.
    pub fn convert_to_viewport_point(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.transform;
        (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
    }

    pub(crate) fn skia_transform(&self) -> Transform {
        let m = &self.transform;
        Transform::from_row(
            m[0] as f32,
            m[1] as f32,
            m[2] as f32,
            m[3] as f32,
            m[4] as f32,
            m[5] as f32,
        )
    }
}

/// Draws a page content stream onto a fresh white bitmap sized to `viewport`.
pub fn rasterize(content: &[u8], viewport: &Viewport) -> Result<Pixmap, RenderError> {
    let (width, height) = viewport.pixel_size();
    if u64::from(width) * u64::from(height) > MAX_CANVAS_PIXELS {
        return Err(RenderError::InvalidSize { width, height });
    }
    let mut pixmap = Pixmap::new(width, height).ok_or(RenderError::InvalidSize { width, height })?;
    pixmap.fill(tiny_skia::Color::WHITE);

    let mut painter = Painter::new(&mut pixmap, viewport.skia_transform());
    let painted = painter.run(content);
    tracing::trace!(painted, width, height, "page rasterized");

    Ok(pixmap)
}

/// A rasterized page plus the navigation state shown next to it.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 1-based page number
    pub page_number: u32,
    pub page_count: u32,
    pixmap: Pixmap,
}

impl RenderedPage {
    pub fn new(page_number: u32, page_count: u32, pixmap: Pixmap) -> Self {
        RenderedPage {
            page_number,
            page_count,
            pixmap,
        }
    }

    /// Indicator text, "Page n of N".
    pub fn indicator(&self) -> String {
        format!("Page {} of {}", self.page_number, self.page_count)
    }

    pub fn can_go_previous(&self) -> bool {
        self.page_number > 1
    }

    pub fn can_go_next(&self) -> bool {
        self.page_number < self.page_count
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Straight (non-premultiplied) RGBA pixels, row-major.
    pub fn rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixmap.data().len());
        for pixel in self.pixmap.pixels() {
            let c = pixel.demultiply();
            out.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        out
    }

    /// Encodes the page as an 8-bit RGBA PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, RenderError> {
        let pixels = self.rgba();
        let mut png_data = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut png_data, self.width(), self.height());
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);

            let mut writer = encoder.write_header()?;
            writer.write_image_data(&pixels)?;
        }
        Ok(png_data)
    }

    /// PNG bytes encoded as standard base64, for embedding in JSON.
    pub fn to_base64_png(&self) -> Result<String, RenderError> {
        Ok(general_purpose::STANDARD.encode(self.to_png()?))
    }
}
