use super::parser::{Dict, PDFObject};
use crate::render::Viewport;

/// US Letter, used when neither the page nor any ancestor carries a MediaBox.
pub const LETTER_SIZE_MEDIABOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// A single page in a PDF document.
///
/// Holds the page dictionary together with the attributes it inherits from
/// the page tree:
/// - MediaBox: The visible area of the page
/// - CropBox: Optional clip of the MediaBox
/// - Rotate: Clockwise rotation in multiples of 90 degrees
/// - Resources: Fonts, images, and other resources used by the page
#[derive(Debug, Clone)]
pub struct Page {
    /// The page index (0-based)
    page_index: usize,

    /// The page dictionary
    page_dict: Dict,

    /// The indirect object reference for this page (if it has one)
    page_ref: Option<(u32, u32)>, // (obj_num, generation)

    media_box: [f64; 4],
    crop_box: Option<[f64; 4]>,
    rotate: i32,
    resources: Option<PDFObject>,
}

/// Attributes a page inherits from its ancestors in the page tree.
#[derive(Debug, Clone, Default)]
pub(crate) struct InheritedAttributes {
    pub media_box: Option<PDFObject>,
    pub crop_box: Option<PDFObject>,
    pub rotate: Option<PDFObject>,
    pub resources: Option<PDFObject>,
}

impl InheritedAttributes {
    /// Lets the values set on `node` override the inherited ones.
    pub(crate) fn absorb(&mut self, node: &Dict) {
        if let Some(v) = node.get("MediaBox") {
            self.media_box = Some(v.clone());
        }
        if let Some(v) = node.get("CropBox") {
            self.crop_box = Some(v.clone());
        }
        if let Some(v) = node.get("Rotate") {
            self.rotate = Some(v.clone());
        }
        if let Some(v) = node.get("Resources") {
            self.resources = Some(v.clone());
        }
    }
}

/// Reads a rectangle as `[x_min, y_min, x_max, y_max]`, normalizing the
/// corner order. Degenerate or malformed rectangles yield `None`.
pub(crate) fn normalize_rect(obj: &PDFObject) -> Option<[f64; 4]> {
    let items = obj.as_array()?;
    if items.len() != 4 {
        return None;
    }
    let mut v = [0.0; 4];
    for (slot, item) in v.iter_mut().zip(items) {
        *slot = item.as_number()?;
    }
    let rect = [
        v[0].min(v[2]),
        v[1].min(v[3]),
        v[0].max(v[2]),
        v[1].max(v[3]),
    ];
    (rect[2] > rect[0] && rect[3] > rect[1]).then_some(rect)
}

/// Normalizes `/Rotate` to 0, 90, 180 or 270. Values that are not a
/// multiple of 90 are ignored.
pub(crate) fn normalize_rotation(value: Option<&PDFObject>) -> i32 {
    let raw = value.and_then(|v| v.as_number()).unwrap_or(0.0) as i32;
    if raw % 90 != 0 {
        return 0;
    }
    raw.rem_euclid(360)
}

impl Page {
    pub(crate) fn new(
        page_index: usize,
        page_dict: Dict,
        page_ref: Option<(u32, u32)>,
        inherited: InheritedAttributes,
    ) -> Self {
        let media_box = inherited
            .media_box
            .as_ref()
            .and_then(normalize_rect)
            .unwrap_or(LETTER_SIZE_MEDIABOX);
        let crop_box = inherited.crop_box.as_ref().and_then(normalize_rect);
        let rotate = normalize_rotation(inherited.rotate.as_ref());

        Page {
            page_index,
            page_dict,
            page_ref,
            media_box,
            crop_box,
            rotate,
            resources: inherited.resources,
        }
    }

    /// Returns the page index (0-based).
    pub fn index(&self) -> usize {
        self.page_index
    }

    /// Returns the page dictionary.
    pub fn dict(&self) -> &Dict {
        &self.page_dict
    }

    /// Returns the page's indirect object reference if it has one.
    pub fn reference(&self) -> Option<(u32, u32)> {
        self.page_ref
    }

    pub fn get(&self, key: &str) -> Option<&PDFObject> {
        self.page_dict.get(key)
    }

    /// Effective MediaBox `[x_min, y_min, x_max, y_max]`, inherited through
    /// the page tree.
    pub fn media_box(&self) -> [f64; 4] {
        self.media_box
    }

    pub fn crop_box(&self) -> Option<[f64; 4]> {
        self.crop_box
    }

    /// Page size in points, before rotation.
    pub fn size(&self) -> (f64, f64) {
        let [x0, y0, x1, y1] = self.media_box;
        (x1 - x0, y1 - y0)
    }

    /// Effective rotation in degrees: 0, 90, 180 or 270.
    pub fn rotate(&self) -> i32 {
        self.rotate
    }

    pub fn resources(&self) -> Option<&PDFObject> {
        self.resources.as_ref()
    }

    /// Gets the Contents for this page.
    ///
    /// Contents can be either a single stream or an array of streams.
    pub fn contents(&self) -> Option<&PDFObject> {
        self.get("Contents")
    }

    /// Viewport for drawing this page at `scale`.
    pub fn viewport(&self, scale: f64) -> Viewport {
        Viewport::new(self.media_box, scale, self.rotate)
    }
}
