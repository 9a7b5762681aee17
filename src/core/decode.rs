/// Stream decoding and decompression utilities.
///
/// PDF streams can be compressed using filters like FlateDecode and may
/// carry a predictor (cross-reference streams almost always do).
use super::error::{PDFError, PDFResult};
use super::parser::{Dict, PDFObject};
use flate2::read::ZlibDecoder;
use std::io::Read;

/// Smallest per-stream output allowance, whatever the document size.
pub const MIN_INFLATE_LIMIT: usize = 16 * 1024 * 1024;

/// Output allowed per stream, as a multiple of the whole document's size.
pub const INFLATE_RATIO: usize = 32;

/// Largest decoded size accepted for any one stream of a `document_len` byte file.
pub fn inflate_limit(document_len: usize) -> usize {
    document_len.saturating_mul(INFLATE_RATIO).max(MIN_INFLATE_LIMIT)
}

/// Decodes a FlateDecode (zlib/deflate) compressed stream.
///
/// Truncated or slightly damaged data yields whatever decompressed cleanly
/// before the error, as long as that is not nothing. Output beyond `limit`
/// bytes is an error rather than a partial result.
pub fn decode_flate(compressed_data: &[u8], limit: usize) -> PDFResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(compressed_data).take((limit as u64).saturating_add(1));
    let mut decompressed = Vec::new();

    let result = decoder.read_to_end(&mut decompressed);
    if decompressed.len() > limit {
        return Err(PDFError::Filter {
            filter: "FlateDecode".to_string(),
            message: format!("decoded data exceeds {} bytes", limit),
        });
    }
    match result {
        Ok(_) => Ok(decompressed),
        Err(e) if !decompressed.is_empty() => {
            tracing::debug!(error = %e, recovered = decompressed.len(), "partial FlateDecode");
            Ok(decompressed)
        }
        Err(e) => Err(PDFError::Filter {
            filter: "FlateDecode".to_string(),
            message: e.to_string(),
        }),
    }
}

/// Decodes ASCIIHexDecode data; whitespace is ignored and `>` ends the data.
pub fn decode_ascii_hex(data: &[u8]) -> PDFResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut high: Option<u8> = None;

    for &ch in data {
        if ch == b'>' {
            break;
        }
        if super::lexer::is_whitespace(ch) {
            continue;
        }
        let value = match ch {
            b'0'..=b'9' => ch - b'0',
            b'a'..=b'f' => ch - b'a' + 10,
            b'A'..=b'F' => ch - b'A' + 10,
            _ => {
                return Err(PDFError::Filter {
                    filter: "ASCIIHexDecode".to_string(),
                    message: format!("invalid hex digit '{}'", ch as char),
                });
            }
        };
        match high.take() {
            Some(h) => out.push((h << 4) | value),
            None => high = Some(value),
        }
    }
    if let Some(h) = high {
        out.push(h << 4);
    }
    Ok(out)
}

/// Reverses a PNG (10-15) or TIFF (2) predictor.
///
/// `colors`, `bits_per_component` and `columns` come from /DecodeParms.
pub fn apply_predictor(
    data: &[u8],
    predictor: u32,
    colors: usize,
    bits_per_component: usize,
    columns: usize,
) -> PDFResult<Vec<u8>> {
    if predictor <= 1 || data.is_empty() {
        return Ok(data.to_vec());
    }

    let bits_per_pixel = colors
        .checked_mul(bits_per_component)
        .ok_or_else(|| PDFError::structure("predictor pixel size overflows"))?;
    let bytes_per_pixel = bits_per_pixel.div_ceil(8);
    let row_len = columns
        .checked_mul(bits_per_pixel)
        .map(|bits| bits.div_ceil(8))
        .ok_or_else(|| PDFError::structure("predictor row size overflows"))?;
    if row_len == 0 {
        return Err(PDFError::structure("predictor with zero-width rows"));
    }
    if row_len > data.len() {
        return Err(PDFError::structure(format!(
            "predictor row of {} bytes is longer than the {} byte stream",
            row_len,
            data.len()
        )));
    }

    if predictor == 2 {
        if bits_per_component != 8 {
            return Err(PDFError::UnsupportedFilter(format!(
                "TIFF predictor with {} bits per component",
                bits_per_component
            )));
        }
        let mut out = data.to_vec();
        for row in out.chunks_mut(row_len) {
            for i in bytes_per_pixel..row.len() {
                row[i] = row[i].wrapping_add(row[i - bytes_per_pixel]);
            }
        }
        return Ok(out);
    }

    // PNG predictors: every row starts with its own filter-type byte
    let mut out = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_len];

    for chunk in data.chunks(row_len + 1) {
        if chunk.len() < 2 {
            break;
        }
        let filter = chunk[0];
        let mut row = chunk[1..].to_vec();
        row.resize(row_len, 0);

        for i in 0..row_len {
            let left = if i >= bytes_per_pixel { row[i - bytes_per_pixel] } else { 0 };
            let up = prev_row[i];
            let up_left = if i >= bytes_per_pixel { prev_row[i - bytes_per_pixel] } else { 0 };

            row[i] = match filter {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(PDFError::Filter {
                        filter: "PNG predictor".to_string(),
                        message: format!("unknown row filter {}", other),
                    });
                }
            };
        }

        out.extend_from_slice(&row);
        prev_row = row;
    }

    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Decodes a stream's raw bytes according to its /Filter and /DecodeParms.
///
/// Filters may be a single name or an array applied in order. Each
/// FlateDecode stage may produce at most `limit` bytes.
pub fn decode_stream(dict: &Dict, data: &[u8], limit: usize) -> PDFResult<Vec<u8>> {
    let filters: Vec<&str> = match dict.get("Filter") {
        None | Some(PDFObject::Null) => Vec::new(),
        Some(PDFObject::Name(name)) => vec![name.as_str()],
        Some(PDFObject::Array(items)) => items.iter().filter_map(|f| f.as_name()).collect(),
        Some(other) => {
            return Err(PDFError::structure(format!("invalid /Filter entry {:?}", other)));
        }
    };

    let params: Vec<Option<&PDFObject>> = match dict.get("DecodeParms") {
        Some(PDFObject::Array(items)) => items.iter().map(Some).collect(),
        Some(single) => vec![Some(single)],
        None => Vec::new(),
    };

    let mut current = data.to_vec();
    for (i, filter) in filters.iter().enumerate() {
        current = match *filter {
            "FlateDecode" | "Fl" => {
                let inflated = decode_flate(&current, limit)?;
                match params.get(i).copied().flatten() {
                    Some(p) => apply_decode_parms(&inflated, p)?,
                    None => inflated,
                }
            }
            "ASCIIHexDecode" | "AHx" => decode_ascii_hex(&current)?,
            other => return Err(PDFError::UnsupportedFilter(other.to_string())),
        };
    }

    Ok(current)
}

fn apply_decode_parms(data: &[u8], parms: &PDFObject) -> PDFResult<Vec<u8>> {
    let number = |key: &str, default: f64| {
        parms
            .get(key)
            .and_then(|v| v.as_number())
            .unwrap_or(default)
    };

    apply_predictor(
        data,
        number("Predictor", 1.0) as u32,
        number("Colors", 1.0) as usize,
        number("BitsPerComponent", 8.0) as usize,
        number("Columns", 1.0) as usize,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_decode_flate_simple() {
        let original = b"Hello, PDF world! This is test data.";
        let decompressed = decode_flate(&compress(original), MIN_INFLATE_LIMIT).unwrap();
        assert_eq!(&decompressed[..], original);
    }

    #[test]
    fn test_decode_flate_garbage_is_error() {
        assert!(decode_flate(b"not zlib at all", MIN_INFLATE_LIMIT).is_err());
    }

    #[test]
    fn test_decode_flate_stops_at_limit() {
        let zeros = compress(&vec![0u8; 64 * 1024]);
        assert_eq!(decode_flate(&zeros, 64 * 1024).unwrap().len(), 64 * 1024);
        assert!(matches!(
            decode_flate(&zeros, 4096),
            Err(PDFError::Filter { ref filter, .. }) if filter == "FlateDecode"
        ));
    }

    #[test]
    fn test_inflate_limit_scales_with_document() {
        assert_eq!(inflate_limit(0), MIN_INFLATE_LIMIT);
        assert_eq!(inflate_limit(10 * 1024 * 1024), 320 * 1024 * 1024);
        assert_eq!(inflate_limit(usize::MAX), usize::MAX);
    }

    #[test]
    fn test_ascii_hex() {
        assert_eq!(decode_ascii_hex(b"48 65 6C 6c 6F>").unwrap(), b"Hello");
        assert_eq!(decode_ascii_hex(b"7>").unwrap(), vec![0x70]);
        assert!(decode_ascii_hex(b"zz").is_err());
    }

    #[test]
    fn test_png_up_predictor() {
        // Two rows of three columns, both using the Up filter (2)
        let encoded = [2u8, 1, 2, 3, 2, 1, 1, 1];
        let decoded = apply_predictor(&encoded, 12, 1, 8, 3).unwrap();
        assert_eq!(decoded, vec![1, 2, 3, 2, 3, 4]);
    }

    #[test]
    fn test_predictor_rejects_oversized_rows() {
        let encoded = [2u8, 1, 2, 3];
        assert!(matches!(
            apply_predictor(&encoded, 12, 1, 8, usize::MAX),
            Err(PDFError::Structure(_))
        ));
        assert!(matches!(
            apply_predictor(&encoded, 12, usize::MAX, usize::MAX, 1),
            Err(PDFError::Structure(_))
        ));
        assert!(apply_predictor(&encoded, 12, 1, 8, 1_000_000).is_err());
        assert!(apply_predictor(&encoded, 2, 1, 8, 1_000_000).is_err());
    }

    #[test]
    fn test_decode_stream_filter_chain_with_parms() {
        let rows = [2u8, 0, 5, 2, 0, 1];
        let mut dict = Dict::new();
        dict.insert("Filter".to_string(), PDFObject::Name("FlateDecode".to_string()));
        let mut parms = Dict::new();
        parms.insert("Predictor".to_string(), PDFObject::Number(12.0));
        parms.insert("Columns".to_string(), PDFObject::Number(2.0));
        dict.insert("DecodeParms".to_string(), PDFObject::Dictionary(parms));

        let decoded = decode_stream(&dict, &compress(&rows), MIN_INFLATE_LIMIT).unwrap();
        assert_eq!(decoded, vec![0, 5, 0, 6]);
    }

    #[test]
    fn test_decode_stream_no_filter() {
        let original = b"Uncompressed data";
        assert_eq!(decode_stream(&Dict::new(), original, MIN_INFLATE_LIMIT).unwrap(), original);
    }

    #[test]
    fn test_decode_stream_unsupported_filter() {
        let mut dict = Dict::new();
        dict.insert("Filter".to_string(), PDFObject::Name("DCTDecode".to_string()));
        assert_eq!(
            decode_stream(&dict, b"x", MIN_INFLATE_LIMIT),
            Err(PDFError::UnsupportedFilter("DCTDecode".to_string()))
        );
    }
}
