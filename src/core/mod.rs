//! PDF decoding: tokens, objects, cross-reference resolution and the page tree.

pub mod decode;
pub mod document;
pub mod error;
pub mod lexer;
pub mod page;
pub mod parser;
pub mod xref;

pub use document::{DocumentInfo, PDFDocument};
pub use error::{PDFError, PDFResult};
pub use lexer::{Lexer, Token};
pub use page::Page;
pub use parser::{Dict, PDFObject, Parser};
pub use xref::{XRef, XRefEntry};
