use super::decode::decode_stream;
use super::error::{PDFError, PDFResult};
use super::page::{InheritedAttributes, Page};
use super::parser::{Dict, PDFObject};
use super::xref::XRef;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// Deepest page tree accepted before the tree is treated as corrupt.
const MAX_PAGE_TREE_DEPTH: usize = 64;

/// Entries of the document information dictionary (`/Info`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
}

/// PDF Document reader.
///
/// This is the main entry point for reading and parsing PDF documents.
/// It keeps the exact byte buffer it was opened with, resolves objects
/// through the cross-reference table and walks the page tree on demand.
///
/// Based on PDF.js's PDFDocument class.
pub struct PDFDocument {
    /// The bytes the document was opened from, unchanged
    data: Arc<[u8]>,

    /// The cross-reference table
    xref: XRef,

    /// The document catalog (root dictionary)
    catalog: Dict,

    /// Pages already located in the page tree, by index
    page_cache: FxHashMap<usize, Page>,

    page_count: Option<u32>,
}

impl PDFDocument {
    /// Opens a PDF document from its bytes.
    ///
    /// This parses the cross-reference data and trailer (rebuilding them when
    /// damaged) and loads the document catalog.
    ///
    /// # Example
    /// ```no_run
    /// use pdf_notary::core::PDFDocument;
    ///
    /// let pdf_data = std::fs::read("document.pdf").unwrap();
    /// let mut doc = PDFDocument::open(pdf_data).unwrap();
    /// println!("{} pages", doc.page_count().unwrap());
    /// ```
    pub fn open(data: impl Into<Arc<[u8]>>) -> PDFResult<Self> {
        let data: Arc<[u8]> = data.into();
        if !data.windows(5).take(1024).any(|w| w == b"%PDF-") {
            tracing::debug!("no %PDF- header, parsing anyway");
        }

        let mut xref = XRef::load(Arc::clone(&data))?;
        let catalog = match xref.catalog()? {
            PDFObject::Dictionary(dict) => dict,
            PDFObject::Stream { dict, .. } => dict,
            _ => return Err(PDFError::structure("catalog is not a dictionary")),
        };

        Ok(PDFDocument {
            data,
            xref,
            catalog,
            page_cache: FxHashMap::default(),
            page_count: None,
        })
    }

    /// The exact bytes this document was opened from.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the document bytes.
    pub fn shared_data(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    /// Returns the document catalog (root dictionary).
    pub fn catalog(&self) -> &Dict {
        &self.catalog
    }

    /// Returns a mutable reference to the xref table for fetching objects.
    pub fn xref_mut(&mut self) -> &mut XRef {
        &mut self.xref
    }

    /// Returns an immutable reference to the xref table.
    pub fn xref(&self) -> &XRef {
        &self.xref
    }

    /// PDF version, from the catalog `/Version` entry when present, otherwise
    /// from the `%PDF-x.y` header.
    pub fn pdf_version(&self) -> Option<String> {
        if let Some(PDFObject::Name(version)) = self.catalog.get("Version") {
            return Some(version.clone());
        }
        let head = &self.data[..self.data.len().min(1024)];
        let start = head.windows(5).position(|w| w == b"%PDF-")? + 5;
        let version: String = head[start..]
            .iter()
            .take_while(|c| c.is_ascii_digit() || **c == b'.')
            .map(|c| *c as char)
            .collect();
        (!version.is_empty()).then_some(version)
    }

    /// Reads the trailer's `/Info` dictionary. Missing entries stay `None`.
    pub fn document_info(&mut self) -> PDFResult<DocumentInfo> {
        let Some(info_ref) = self.xref.trailer().get("Info").cloned() else {
            return Ok(DocumentInfo::default());
        };
        let info = self.xref.fetch_if_ref(&info_ref)?;
        let Some(dict) = info.as_dict() else {
            return Ok(DocumentInfo::default());
        };

        let mut text = |key: &str| -> PDFResult<Option<String>> {
            match dict.get(key) {
                Some(value) => {
                    let value = self.xref.fetch_if_ref(value)?;
                    Ok(value.as_string_bytes().map(decode_text_string))
                }
                None => Ok(None),
            }
        };

        Ok(DocumentInfo {
            title: text("Title")?,
            author: text("Author")?,
            subject: text("Subject")?,
            creator: text("Creator")?,
            producer: text("Producer")?,
            creation_date: text("CreationDate")?,
        })
    }

    /// Gets the /Pages dictionary from the catalog.
    pub fn pages_dict(&mut self) -> PDFResult<Dict> {
        let pages_ref = self
            .catalog
            .get("Pages")
            .cloned()
            .ok_or_else(|| PDFError::structure("no /Pages in catalog"))?;

        match self.xref.fetch_if_ref(&pages_ref)? {
            PDFObject::Dictionary(dict) => Ok(dict),
            _ => Err(PDFError::structure("/Pages is not a dictionary")),
        }
    }

    /// Number of pages, from the root `/Count`, or by counting the leaves
    /// when `/Count` is missing.
    pub fn page_count(&mut self) -> PDFResult<u32> {
        if let Some(count) = self.page_count {
            return Ok(count);
        }

        let pages = self.pages_dict()?;
        let count = match pages.get("Count").and_then(|c| c.as_number()) {
            Some(n) if n >= 0.0 => n as u32,
            _ => {
                let mut visited = FxHashSet::default();
                self.count_leaves(&pages, &mut visited, 0)?
            }
        };

        self.page_count = Some(count);
        Ok(count)
    }

    fn count_leaves(
        &mut self,
        node: &Dict,
        visited: &mut FxHashSet<(u32, u32)>,
        depth: usize,
    ) -> PDFResult<u32> {
        if depth > MAX_PAGE_TREE_DEPTH {
            return Err(PDFError::structure("page tree too deep"));
        }
        let Some(kids) = node.get("Kids").and_then(|k| k.as_array()) else {
            return Ok(1);
        };

        let mut total = 0u32;
        for kid in kids.to_vec() {
            if let Some(reference) = kid.as_reference() {
                if !visited.insert(reference) {
                    return Err(PDFError::structure("page tree contains a cycle"));
                }
            }
            if let Some(kid_dict) = self.xref.fetch_if_ref(&kid)?.as_dict() {
                total = total.saturating_add(self.count_leaves(kid_dict, visited, depth + 1)?);
            }
        }
        Ok(total)
    }

    /// Number of pages below `node`, trusting `/Count` when it is present.
    fn subtree_count(&mut self, node: &Dict) -> PDFResult<u32> {
        if !node.contains_key("Kids") {
            return Ok(1);
        }
        match node.get("Count").and_then(|c| c.as_number()) {
            Some(n) if n >= 0.0 => Ok(n as u32),
            _ => {
                let mut visited = FxHashSet::default();
                self.count_leaves(node, &mut visited, 0)
            }
        }
    }

    /// Gets a page by 0-based index.
    ///
    /// Walks the page tree, skipping whole branches by their `/Count`, and
    /// collects the attributes the page inherits on the way down.
    pub fn get_page(&mut self, index: usize) -> PDFResult<Page> {
        if let Some(page) = self.page_cache.get(&index) {
            return Ok(page.clone());
        }

        let count = self.page_count()?;
        if index >= count as usize {
            return Err(PDFError::PageIndexOutOfRange { index, count });
        }

        let mut node = self.pages_dict()?;
        let mut node_ref = self.catalog.get("Pages").and_then(|p| p.as_reference());
        let mut inherited = InheritedAttributes::default();
        let mut remaining = index;
        let mut visited = FxHashSet::default();

        for _ in 0..MAX_PAGE_TREE_DEPTH {
            inherited.absorb(&node);

            let Some(kids) = node.get("Kids").and_then(|k| k.as_array()).map(|k| k.to_vec())
            else {
                if remaining == 0 {
                    let page = Page::new(index, node, node_ref, inherited);
                    self.page_cache.insert(index, page.clone());
                    return Ok(page);
                }
                break;
            };

            let mut next = None;
            for kid in kids {
                let reference = kid.as_reference();
                let kid_dict = match self.xref.fetch_if_ref(&kid)? {
                    PDFObject::Dictionary(dict) => dict,
                    other => {
                        tracing::debug!(?other, "skipping non-dictionary page tree kid");
                        continue;
                    }
                };
                let kid_count = self.subtree_count(&kid_dict)? as usize;
                if remaining < kid_count {
                    next = Some((kid_dict, reference));
                    break;
                }
                remaining -= kid_count;
            }

            let Some((kid_dict, reference)) = next else {
                break;
            };
            if let Some(reference) = reference {
                if !visited.insert(reference) {
                    return Err(PDFError::structure("page tree contains a cycle"));
                }
            }
            node = kid_dict;
            node_ref = reference;
        }

        Err(PDFError::PageIndexOutOfRange { index, count })
    }

    /// Decoded content stream bytes of a page.
    ///
    /// An array of streams is concatenated with a newline between parts, as
    /// the parts are one logical stream. A page without contents is empty.
    pub fn page_content(&mut self, page: &Page) -> PDFResult<Vec<u8>> {
        let Some(contents) = page.contents().cloned() else {
            return Ok(Vec::new());
        };

        let parts = match self.xref.fetch_if_ref(&contents)? {
            PDFObject::Array(items) => items,
            single => vec![single],
        };

        let mut out = Vec::new();
        for part in parts {
            match self.xref.fetch_if_ref(&part)? {
                PDFObject::Stream { dict, data } => {
                    if !out.is_empty() {
                        out.push(b'\n');
                    }
                    let limit = self.xref.inflate_limit();
                    out.extend_from_slice(&decode_stream(&dict, &data, limit)?);
                }
                PDFObject::Null => {}
                other => {
                    return Err(PDFError::structure(format!(
                        "page content is not a stream: {:?}",
                        other
                    )));
                }
            }
        }
        Ok(out)
    }
}

/// Decodes a PDF text string: UTF-16BE with a byte order mark, otherwise
/// bytes taken as Latin-1 (close enough to PDFDocEncoding for metadata).
fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|b| *b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lays out numbered objects and appends a matching xref table.
    fn build_pdf(objects: &[&str], trailer_extra: &str) -> Vec<u8> {
        let mut out = b"%PDF-1.7\n".to_vec();
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
                "trailer\n<< /Size {} /Root 1 0 R {} >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                trailer_extra,
                xref_pos
            )
            .as_bytes(),
        );
        out
    }

    fn nested_tree_pdf() -> Vec<u8> {
        build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 3 /MediaBox [0 0 300 400] /Rotate 90 >>",
                "<< /Type /Page /Parent 2 0 R /Contents 6 0 R >>",
                "<< /Type /Pages /Parent 2 0 R /Kids [5 0 R 7 0 R] /Count 2 /MediaBox [0 0 200 100] >>",
                "<< /Type /Page /Parent 4 0 R /Rotate 0 >>",
                "<< /Length 9 >>\nstream\n0 0 m 1 l\nendstream",
                "<< /Type /Page /Parent 4 0 R >>",
                "<< /Title (Paper) /Author <FEFF00410062> >>",
            ],
            "/Info 8 0 R",
        )
    }

    #[test]
    fn test_page_count_and_version() {
        let mut doc = PDFDocument::open(nested_tree_pdf()).unwrap();
        assert_eq!(doc.page_count().unwrap(), 3);
        assert_eq!(doc.pdf_version().as_deref(), Some("1.7"));
    }

    #[test]
    fn test_page_tree_inheritance() {
        let mut doc = PDFDocument::open(nested_tree_pdf()).unwrap();

        let first = doc.get_page(0).unwrap();
        assert_eq!(first.size(), (300.0, 400.0));
        assert_eq!(first.rotate(), 90);
        assert_eq!(first.reference(), Some((3, 0)));

        let second = doc.get_page(1).unwrap();
        assert_eq!(second.size(), (200.0, 100.0));
        assert_eq!(second.rotate(), 0);

        let third = doc.get_page(2).unwrap();
        assert_eq!(third.size(), (200.0, 100.0));
        assert_eq!(third.rotate(), 90);
        assert_eq!(third.reference(), Some((7, 0)));
    }

    #[test]
    fn test_page_out_of_range() {
        let mut doc = PDFDocument::open(nested_tree_pdf()).unwrap();
        assert_eq!(
            doc.get_page(3).unwrap_err(),
            PDFError::PageIndexOutOfRange { index: 3, count: 3 }
        );
    }

    #[test]
    fn test_page_content() {
        let mut doc = PDFDocument::open(nested_tree_pdf()).unwrap();
        let page = doc.get_page(0).unwrap();
        assert_eq!(doc.page_content(&page).unwrap(), b"0 0 m 1 l");
        let empty = doc.get_page(1).unwrap();
        assert!(doc.page_content(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_document_info() {
        let mut doc = PDFDocument::open(nested_tree_pdf()).unwrap();
        let info = doc.document_info().unwrap();
        assert_eq!(info.title.as_deref(), Some("Paper"));
        assert_eq!(info.author.as_deref(), Some("Ab"));
        assert_eq!(info.producer, None);
    }

    #[test]
    fn test_data_is_the_input_buffer() {
        let bytes = nested_tree_pdf();
        let doc = PDFDocument::open(bytes.clone()).unwrap();
        assert_eq!(doc.data(), &bytes[..]);
    }

    #[test]
    fn test_missing_count_counts_leaves() {
        let pdf = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [3 0 R 4 0 R] >>",
                "<< /Type /Page /Parent 2 0 R >>",
                "<< /Type /Page /Parent 2 0 R >>",
            ],
            "",
        );
        let mut doc = PDFDocument::open(pdf).unwrap();
        assert_eq!(doc.page_count().unwrap(), 2);
        assert_eq!(doc.get_page(1).unwrap().reference(), Some((4, 0)));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(PDFDocument::open(b"definitely not a pdf".to_vec()).is_err());
    }
}
