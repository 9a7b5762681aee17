use super::decode::{decode_stream, inflate_limit};
use super::error::{PDFError, PDFResult};
use super::lexer::{Lexer, Token, is_whitespace};
use super::parser::{Dict, PDFObject, Parser};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::sync::Arc;

/// Cross-reference table entry.
#[derive(Debug, Clone, PartialEq)]
pub enum XRefEntry {
    /// Free entry - object number is available for reuse
    Free,

    /// Object stored uncompressed at a byte offset
    Uncompressed { offset: usize, generation: u32 },

    /// Object stored inside an object stream
    Compressed { obj_stream_num: u32, index: u32 },
}

/// Cross-reference table for a PDF document.
///
/// Maps object numbers to their location in the file and caches objects
/// once parsed. Sections are read newest first (following `/Prev`), so the
/// first entry recorded for an object number is the live one.
pub struct XRef {
    data: Arc<[u8]>,
    entries: FxHashMap<u32, XRefEntry>,
    cache: FxHashMap<u32, PDFObject>,
    trailer: Dict,
    /// Object streams currently being unpacked
    open_streams: FxHashSet<u32>,
}

fn number_at(parser: &mut Parser<'_>) -> Option<f64> {
    parser.get_object().ok().and_then(|o| o.as_number())
}

fn non_negative(value: f64) -> Option<u32> {
    (value >= 0.0 && value <= u32::MAX as f64).then_some(value as u32)
}

impl XRef {
    /// Builds the cross-reference table for `data`.
    ///
    /// Starts at `startxref` and follows the `/Prev` chain; if that fails the
    /// table is rebuilt by scanning the whole file for `N G obj` headers.
    pub fn load(data: Arc<[u8]>) -> PDFResult<Self> {
        let mut xref = XRef {
            data,
            entries: FxHashMap::default(),
            cache: FxHashMap::default(),
            trailer: Dict::new(),
            open_streams: FxHashSet::default(),
        };

        let parsed = Self::find_startxref(&xref.data).and_then(|start| xref.read_chain(start));
        match parsed {
            Ok(()) if xref.trailer.contains_key("Root") => Ok(xref),
            Ok(()) => {
                tracing::debug!("trailer has no /Root, reconstructing xref");
                xref.reconstruct()?;
                Ok(xref)
            }
            Err(e) => {
                tracing::debug!(error = %e, "xref unreadable, reconstructing");
                xref.reconstruct()?;
                Ok(xref)
            }
        }
    }

    /// Finds the byte offset named by the last `startxref` keyword.
    ///
    /// Format:
    /// ```text
    /// startxref
    /// 12345
    /// %%EOF
    /// ```
    pub fn find_startxref(data: &[u8]) -> PDFResult<usize> {
        let search_start = data.len().saturating_sub(1024);
        let keyword = b"startxref";
        let pos = data[search_start..]
            .windows(keyword.len())
            .rposition(|window| window == keyword)
            .ok_or_else(|| PDFError::structure("startxref not found"))?;

        let mut lexer = Lexer::new(data, search_start + pos + keyword.len());
        match lexer.next_token()? {
            Token::Number(n) if n >= 0.0 && (n as usize) < data.len() => Ok(n as usize),
            _ => Err(PDFError::structure("invalid startxref offset")),
        }
    }

    fn read_chain(&mut self, start: usize) -> PDFResult<()> {
        let mut visited = FxHashSet::default();
        let mut next = Some(start);
        let mut newest_trailer: Option<Dict> = None;

        while let Some(offset) = next.take() {
            if !visited.insert(offset) {
                tracing::warn!(offset, "xref /Prev loop");
                break;
            }

            let trailer = self.read_section(offset)?;
            if let Some(stm) = trailer.get("XRefStm").and_then(|v| v.as_number()) {
                if visited.insert(stm as usize) {
                    self.read_section(stm as usize)?;
                }
            }
            next = trailer
                .get("Prev")
                .and_then(|v| v.as_number())
                .map(|p| p as usize);
            if newest_trailer.is_none() {
                newest_trailer = Some(trailer);
            }
        }

        self.trailer = newest_trailer.unwrap_or_default();
        Ok(())
    }

    /// Reads one section (table or stream) and returns its trailer dictionary.
    fn read_section(&mut self, offset: usize) -> PDFResult<Dict> {
        if offset >= self.data.len() {
            return Err(PDFError::InvalidOffset {
                offset,
                length: self.data.len(),
            });
        }
        let mut lexer = Lexer::new(&self.data, offset);
        lexer.skip_whitespace_and_comments();
        let pos = lexer.pos();
        if self.data[pos..].starts_with(b"xref") {
            self.read_table(pos + 4)
        } else {
            self.read_stream_section(offset)
        }
    }

    /// Classic table: subsections of `first count` followed by
    /// `offset generation n|f` rows, then `trailer << ... >>`.
    fn read_table(&mut self, pos: usize) -> PDFResult<Dict> {
        let data = Arc::clone(&self.data);
        let mut lexer = Lexer::new(&data, pos);

        loop {
            let section_pos = lexer.pos();
            let first = match lexer.next_token()? {
                Token::Command(cmd) if cmd == "trailer" => break,
                Token::Number(n) => non_negative(n)
                    .ok_or_else(|| PDFError::syntax(section_pos, "negative xref subsection"))?,
                other => {
                    return Err(PDFError::syntax(
                        section_pos,
                        format!("expected xref subsection, got {:?}", other),
                    ));
                }
            };
            let count = match lexer.next_token()? {
                Token::Number(n) => non_negative(n)
                    .ok_or_else(|| PDFError::syntax(section_pos, "negative xref count"))?,
                other => {
                    return Err(PDFError::syntax(
                        section_pos,
                        format!("expected xref count, got {:?}", other),
                    ));
                }
            };

            for i in 0..count {
                let row_pos = lexer.pos();
                let (offset, generation, kind) =
                    match (lexer.next_token()?, lexer.next_token()?, lexer.next_token()?) {
                        (Token::Number(o), Token::Number(g), Token::Command(k)) => (o, g, k),
                        _ => return Err(PDFError::syntax(row_pos, "malformed xref row")),
                    };
                let entry = match kind.as_str() {
                    "n" => XRefEntry::Uncompressed {
                        offset: offset as usize,
                        generation: generation as u32,
                    },
                    "f" => XRefEntry::Free,
                    other => {
                        return Err(PDFError::syntax(
                            row_pos,
                            format!("xref row type '{}'", other),
                        ));
                    }
                };
                self.entries.entry(first.saturating_add(i)).or_insert(entry);
            }
        }

        let mut parser = Parser::new(&data, lexer.pos());
        match parser.get_object()? {
            PDFObject::Dictionary(dict) => Ok(dict),
            other => Err(PDFError::structure(format!(
                "expected trailer dictionary, got {:?}",
                other
            ))),
        }
    }

    /// Cross-reference stream (PDF 1.5): `/W` field widths over decoded rows,
    /// `/Index` subsections, the stream dictionary doubling as trailer.
    fn read_stream_section(&mut self, offset: usize) -> PDFResult<Dict> {
        let (_, _, object) = self.parse_indirect_at(offset, None)?;
        let PDFObject::Stream { dict, data } = object else {
            return Err(PDFError::structure("xref offset does not point at a stream"));
        };
        if dict.get("Type").and_then(|t| t.as_name()) != Some("XRef") {
            return Err(PDFError::structure("xref stream without /Type /XRef"));
        }

        let widths: SmallVec<[usize; 3]> = dict
            .get("W")
            .and_then(|w| w.as_array())
            .map(|items| {
                items
                    .iter()
                    .map(|v| v.as_number().unwrap_or(0.0) as usize)
                    .collect()
            })
            .unwrap_or_default();
        if widths.len() != 3 || widths.iter().any(|w| *w > 8) {
            return Err(PDFError::structure("xref stream /W must have three fields"));
        }

        let size = dict.get("Size").and_then(|v| v.as_number()).unwrap_or(0.0);
        let index: Vec<(u32, u32)> = match dict.get("Index").and_then(|v| v.as_array()) {
            Some(items) => items
                .chunks(2)
                .filter_map(|pair| match pair {
                    [a, b] => Some((
                        non_negative(a.as_number()?)?,
                        non_negative(b.as_number()?)?,
                    )),
                    _ => None,
                })
                .collect(),
            None => vec![(0, non_negative(size).unwrap_or(0))],
        };

        let rows = decode_stream(&dict, &data, self.inflate_limit())?;
        let row_len: usize = widths.iter().sum();
        if row_len == 0 {
            return Err(PDFError::structure("xref stream rows have zero width"));
        }

        let read_field = |row: &[u8], start: usize, width: usize| -> u64 {
            row[start..start + width]
                .iter()
                .fold(0u64, |acc, b| (acc << 8) | *b as u64)
        };

        let mut rows_iter = rows.chunks_exact(row_len);
        for (first, count) in index {
            for i in 0..count {
                let Some(row) = rows_iter.next() else {
                    break;
                };
                let kind = if widths[0] == 0 {
                    1
                } else {
                    read_field(row, 0, widths[0])
                };
                let f2 = read_field(row, widths[0], widths[1]);
                let f3 = read_field(row, widths[0] + widths[1], widths[2]);

                let entry = match kind {
                    0 => XRefEntry::Free,
                    1 => XRefEntry::Uncompressed {
                        offset: f2 as usize,
                        generation: f3 as u32,
                    },
                    2 => XRefEntry::Compressed {
                        obj_stream_num: f2 as u32,
                        index: f3 as u32,
                    },
                    // Unknown types are to be treated as null references
                    _ => continue,
                };
                self.entries.entry(first.saturating_add(i)).or_insert(entry);
            }
        }

        Ok(dict)
    }

    /// Rebuilds the table by scanning for `N G obj` headers.
    ///
    /// Later definitions win, matching incremental updates appended to the
    /// end of the file. The trailer comes from the last `trailer` dictionary,
    /// the last xref stream, or failing both a synthesized `/Root` pointing at
    /// the catalog object.
    fn reconstruct(&mut self) -> PDFResult<()> {
        let data = Arc::clone(&self.data);
        self.entries.clear();
        self.cache.clear();

        let mut trailer: Option<Dict> = None;
        let mut object_streams = Vec::new();
        let mut catalog: Option<(u32, u32)> = None;

        for header in scan_object_headers(&data) {
            self.entries.insert(
                header.num,
                XRefEntry::Uncompressed {
                    offset: header.offset,
                    generation: header.generation,
                },
            );
        }

        let mut trailer_pos = 0;
        while let Some(found) = find_from(&data, trailer_pos, b"trailer") {
            let mut parser = Parser::new(&data, found + b"trailer".len());
            if let Ok(PDFObject::Dictionary(dict)) = parser.get_object() {
                if dict.contains_key("Root") {
                    trailer = Some(dict);
                }
            }
            trailer_pos = found + 1;
        }

        let mut numbers: Vec<u32> = self.entries.keys().copied().collect();
        numbers.sort_unstable();
        for num in numbers {
            let Some(XRefEntry::Uncompressed { offset, .. }) = self.entries.get(&num).cloned() else {
                continue;
            };
            let Ok((_, generation, object)) = self.parse_indirect_at(offset, None) else {
                continue;
            };
            match object.get("Type").and_then(|t| t.as_name()) {
                Some("XRef") if trailer.is_none() && object.get("Root").is_some() => {
                    trailer = object.as_dict().cloned();
                }
                Some("ObjStm") => object_streams.push(num),
                Some("Catalog") => catalog = Some((num, generation)),
                _ => {}
            }
        }

        for stream_num in object_streams {
            let Ok(numbers) = self.object_stream_members(stream_num) else {
                continue;
            };
            for (index, member) in numbers.into_iter().enumerate() {
                self.entries
                    .entry(member)
                    .or_insert(XRefEntry::Compressed {
                        obj_stream_num: stream_num,
                        index: index as u32,
                    });
            }
        }

        self.trailer = match (trailer, catalog) {
            (Some(dict), _) => dict,
            (None, Some((num, generation))) => {
                let mut dict = Dict::new();
                dict.insert("Root".to_string(), PDFObject::Ref { num, generation });
                dict
            }
            (None, None) => return Err(PDFError::structure("no document catalog found")),
        };

        tracing::debug!(objects = self.entries.len(), "xref reconstructed");
        Ok(())
    }

    /// Parses `N G obj <object>` at `offset`, checking the header against
    /// `expected` when given.
    fn parse_indirect_at(
        &self,
        offset: usize,
        expected: Option<(u32, u32)>,
    ) -> PDFResult<(u32, u32, PDFObject)> {
        if offset >= self.data.len() {
            return Err(PDFError::InvalidOffset {
                offset,
                length: self.data.len(),
            });
        }

        let resolver = |num: u32, generation: u32| self.resolve_length(num, generation);
        let mut parser = Parser::new(&self.data, offset).with_length_resolver(&resolver);

        let num = number_at(&mut parser).and_then(non_negative);
        let generation = number_at(&mut parser).and_then(non_negative);
        let (Some(num), Some(generation)) = (num, generation) else {
            return Err(PDFError::syntax(offset, "expected object header"));
        };
        if !parser.get_object()?.is_command("obj") {
            return Err(PDFError::syntax(offset, "expected 'obj' keyword"));
        }
        if let Some((want_num, want_gen)) = expected {
            if want_num != num {
                return Err(PDFError::MissingObject {
                    num: want_num,
                    generation: want_gen,
                });
            }
            if want_gen != generation {
                tracing::debug!(num, want_gen, generation, "generation mismatch tolerated");
            }
        }

        let object = parser.get_object()?;
        Ok((num, generation, object))
    }

    /// Resolves an indirect stream length without touching the cache.
    fn resolve_length(&self, num: u32, _generation: u32) -> Option<usize> {
        if let Some(cached) = self.cache.get(&num) {
            return cached.as_number().map(|n| n as usize);
        }
        let XRefEntry::Uncompressed { offset, .. } = self.entries.get(&num)? else {
            return None;
        };
        let mut parser = Parser::new(&self.data, *offset);
        for _ in 0..3 {
            parser.get_object().ok()?;
        }
        number_at(&mut parser).filter(|n| *n >= 0.0).map(|n| n as usize)
    }

    /// Object numbers stored in an object stream, in index order.
    fn object_stream_members(&mut self, stream_num: u32) -> PDFResult<Vec<u32>> {
        let (_, header, _) = self.decode_object_stream(stream_num)?;
        Ok(header.into_iter().map(|(num, _)| num).collect())
    }

    /// Decodes an object stream into (decoded bytes, header pairs, /First).
    ///
    /// Fails if `stream_num` is already being unpacked further up the call
    /// chain, as happens when object streams claim to live inside each other.
    fn decode_object_stream(&mut self, stream_num: u32) -> PDFResult<(Vec<u8>, Vec<(u32, usize)>, usize)> {
        if !self.open_streams.insert(stream_num) {
            return Err(PDFError::structure(format!(
                "object stream {} is nested inside itself",
                stream_num
            )));
        }
        let result = self.unpack_object_stream(stream_num);
        self.open_streams.remove(&stream_num);
        result
    }

    fn unpack_object_stream(&mut self, stream_num: u32) -> PDFResult<(Vec<u8>, Vec<(u32, usize)>, usize)> {
        let PDFObject::Stream { dict, data } = self.fetch(stream_num, 0)? else {
            return Err(PDFError::structure(format!(
                "object {} is not an object stream",
                stream_num
            )));
        };

        let count = dict.get("N").and_then(|v| v.as_number()).unwrap_or(0.0) as usize;
        let first = dict.get("First").and_then(|v| v.as_number()).unwrap_or(0.0) as usize;
        let decoded = decode_stream(&dict, &data, self.inflate_limit())?;
        if first > decoded.len() {
            return Err(PDFError::structure("object stream /First past end of data"));
        }

        let mut lexer = Lexer::new(&decoded[..first], 0);
        // Each pair takes at least four bytes ("1 0 ")
        let mut header = Vec::with_capacity(count.min(first / 4 + 1));
        for _ in 0..count {
            match (lexer.next_token()?, lexer.next_token()?) {
                (Token::Number(num), Token::Number(offset)) => {
                    header.push((num as u32, offset as usize));
                }
                _ => break,
            }
        }

        Ok((decoded, header, first))
    }

    fn fetch_compressed(&mut self, num: u32, stream_num: u32, index: u32) -> PDFResult<PDFObject> {
        if stream_num == num {
            return Err(PDFError::structure("object stream contains itself"));
        }
        let (decoded, header, first) = self.decode_object_stream(stream_num)?;
        let (member, offset) = header
            .get(index as usize)
            .copied()
            .ok_or(PDFError::MissingObject { num, generation: 0 })?;
        if member != num {
            return Err(PDFError::MissingObject { num, generation: 0 });
        }

        let mut parser = Parser::new(&decoded, first.saturating_add(offset));
        parser.get_object()
    }

    /// Largest decoded size accepted for a single stream of this file.
    pub fn inflate_limit(&self) -> usize {
        inflate_limit(self.data.len())
    }

    /// Gets an entry from the xref table.
    pub fn get_entry(&self, obj_num: u32) -> Option<&XRefEntry> {
        self.entries.get(&obj_num)
    }

    /// Fetches an indirect object by reference.
    ///
    /// Free or unknown objects resolve to null, as PDF readers are required
    /// to do. Parsed objects are cached by object number.
    pub fn fetch(&mut self, num: u32, generation: u32) -> PDFResult<PDFObject> {
        if let Some(cached) = self.cache.get(&num) {
            return Ok(cached.clone());
        }

        let object = match self.entries.get(&num).cloned() {
            None | Some(XRefEntry::Free) => {
                tracing::debug!(num, generation, "reference to missing object");
                return Ok(PDFObject::Null);
            }
            Some(XRefEntry::Uncompressed { offset, .. }) => {
                self.parse_indirect_at(offset, Some((num, generation)))?.2
            }
            Some(XRefEntry::Compressed {
                obj_stream_num,
                index,
            }) => self.fetch_compressed(num, obj_stream_num, index)?,
        };

        self.cache.insert(num, object.clone());
        Ok(object)
    }

    /// Fetches an object if it's a reference, otherwise returns the object as-is.
    pub fn fetch_if_ref(&mut self, obj: &PDFObject) -> PDFResult<PDFObject> {
        match obj {
            PDFObject::Ref { num, generation } => self.fetch(*num, *generation),
            _ => Ok(obj.clone()),
        }
    }

    /// Returns the trailer dictionary.
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Returns the catalog (root) dictionary.
    pub fn catalog(&mut self) -> PDFResult<PDFObject> {
        let root = self
            .trailer
            .get("Root")
            .cloned()
            .ok_or_else(|| PDFError::structure("no /Root in trailer"))?;
        let catalog = self.fetch_if_ref(&root)?;
        if catalog.as_dict().is_none() {
            return Err(PDFError::structure("catalog is not a dictionary"));
        }
        Ok(catalog)
    }

    /// Number of object numbers known to the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct ObjectHeader {
    num: u32,
    generation: u32,
    offset: usize,
}

fn find_from(data: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

fn read_digits_backwards(data: &[u8], end: usize) -> Option<(usize, u32)> {
    let mut start = end;
    while start > 0 && data[start - 1].is_ascii_digit() {
        start -= 1;
    }
    if start == end || end - start > 10 {
        return None;
    }
    let value = std::str::from_utf8(&data[start..end]).ok()?.parse().ok()?;
    Some((start, value))
}

/// Finds every `N G obj` header in file order.
fn scan_object_headers(data: &[u8]) -> Vec<ObjectHeader> {
    let mut headers = Vec::new();
    let mut pos = 0;

    while let Some(found) = find_from(data, pos, b"obj") {
        pos = found + 3;

        let followed_ok = data.get(found + 3).is_none_or(|c| !c.is_ascii_alphanumeric());
        if !followed_ok || found == 0 || !is_whitespace(data[found - 1]) {
            continue;
        }

        let mut cursor = found;
        while cursor > 0 && is_whitespace(data[cursor - 1]) {
            cursor -= 1;
        }
        let Some((gen_start, generation)) = read_digits_backwards(data, cursor) else {
            continue;
        };
        let mut cursor = gen_start;
        if cursor == 0 || !is_whitespace(data[cursor - 1]) {
            continue;
        }
        while cursor > 0 && is_whitespace(data[cursor - 1]) {
            cursor -= 1;
        }
        let Some((num_start, num)) = read_digits_backwards(data, cursor) else {
            continue;
        };
        if num_start > 0 && !is_whitespace(data[num_start - 1]) {
            continue;
        }

        headers.push(ObjectHeader {
            num,
            generation,
            offset: num_start,
        });
    }

    headers
}
