use std::fmt;

/// Error type for PDF decoding.
///
/// Covers everything that can go wrong between receiving the raw bytes of a
/// document and handing a page dictionary to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum PDFError {
    /// End of data reached while a token or object was still open
    UnexpectedEndOfData,

    /// Offset outside the document buffer
    InvalidOffset { offset: usize, length: usize },

    /// Syntax error at a byte offset
    Syntax { offset: usize, message: String },

    /// Indirect object could not be located or did not match its reference
    MissingObject { num: u32, generation: u32 },

    /// Stream filter the decoder does not implement
    UnsupportedFilter(String),

    /// Filter implementation failed on the stream data
    Filter { filter: String, message: String },

    /// Structural problem in the document (catalog, page tree, ...)
    Structure(String),

    /// Page index past the end of the page tree
    PageIndexOutOfRange { index: usize, count: u32 },
}

impl PDFError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        PDFError::Syntax {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn structure(message: impl Into<String>) -> Self {
        PDFError::Structure(message.into())
    }
}

impl fmt::Display for PDFError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PDFError::UnexpectedEndOfData => write!(f, "Unexpected end of data"),
            PDFError::InvalidOffset { offset, length } => {
                write!(f, "Offset {} outside document of length {}", offset, length)
            }
            PDFError::Syntax { offset, message } => {
                write!(f, "Syntax error at byte {}: {}", offset, message)
            }
            PDFError::MissingObject { num, generation } => {
                write!(f, "Object {} {} R not found", num, generation)
            }
            PDFError::UnsupportedFilter(name) => write!(f, "Unsupported filter: {}", name),
            PDFError::Filter { filter, message } => write!(f, "{} error: {}", filter, message),
            PDFError::Structure(msg) => write!(f, "{}", msg),
            PDFError::PageIndexOutOfRange { index, count } => {
                write!(f, "Page index {} out of range (document has {} pages)", index, count)
            }
        }
    }
}

impl std::error::Error for PDFError {}

/// Result type alias for PDF operations
pub type PDFResult<T> = Result<T, PDFError>;
