use super::error::{PDFError, PDFResult};
use super::lexer::{Lexer, Token, is_whitespace};
use std::collections::HashMap;

/// Dictionary payload shared by dictionaries and stream objects.
pub type Dict = HashMap<String, PDFObject>;

/// PDF object model.
#[derive(Debug, Clone, PartialEq)]
pub enum PDFObject {
    /// Null value
    Null,

    /// Boolean value
    Boolean(bool),

    /// Numeric value (integers and reals)
    Number(f64),

    /// Literal string
    String(Vec<u8>),

    /// Hex string
    HexString(Vec<u8>),

    /// Name value (without the leading slash)
    Name(String),

    /// Array of objects
    Array(Vec<PDFObject>),

    /// Dictionary (key-value pairs)
    Dictionary(Dict),

    /// Stream object: dictionary plus the raw, still-encoded bytes
    Stream { dict: Dict, data: Vec<u8> },

    /// Indirect object reference (`5 0 R`)
    Ref { num: u32, generation: u32 },

    /// End of data marker
    EOF,

    /// Keyword or content-stream operator
    Command(String),
}

impl PDFObject {
    /// Returns true if this object is the EOF marker.
    pub fn is_eof(&self) -> bool {
        matches!(self, PDFObject::EOF)
    }

    /// Returns true if this object is the given keyword/operator.
    pub fn is_command(&self, cmd: &str) -> bool {
        matches!(self, PDFObject::Command(c) if c == cmd)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PDFObject::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            PDFObject::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PDFObject]> {
        match self {
            PDFObject::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Dictionary view of a dictionary or a stream object.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            PDFObject::Dictionary(dict) => Some(dict),
            PDFObject::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<(u32, u32)> {
        match self {
            PDFObject::Ref { num, generation } => Some((*num, *generation)),
            _ => None,
        }
    }

    /// Raw bytes of a literal or hex string.
    pub fn as_string_bytes(&self) -> Option<&[u8]> {
        match self {
            PDFObject::String(s) | PDFObject::HexString(s) => Some(s),
            _ => None,
        }
    }

    /// Looks up a key when this object is a dictionary or stream.
    pub fn get(&self, key: &str) -> Option<&PDFObject> {
        self.as_dict().and_then(|dict| dict.get(key))
    }
}

/// Deepest array/dictionary nesting accepted in one object.
const MAX_NESTING_DEPTH: usize = 256;

/// Resolves an indirect `/Length` while a stream is being parsed.
pub type LengthResolver<'r> = &'r dyn Fn(u32, u32) -> Option<usize>;

/// Builds PDF objects from lexer tokens.
///
/// Keeps two tokens of lookahead so it can recognise indirect references
/// (`N G R`) and the `stream` keyword following a dictionary.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    buf1: Token,
    buf2: Token,
    length_resolver: Option<LengthResolver<'a>>,
    depth: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser reading `data` from offset `pos`.
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        let mut lexer = Lexer::new(data, pos);
        let buf1 = Self::read_token(&mut lexer);
        let buf2 = Self::read_token(&mut lexer);
        Parser {
            lexer,
            buf1,
            buf2,
            length_resolver: None,
            depth: 0,
        }
    }

    /// Installs a resolver for indirect stream lengths.
    pub fn with_length_resolver(mut self, resolver: LengthResolver<'a>) -> Self {
        self.length_resolver = Some(resolver);
        self
    }

    /// Reads the next token, stepping over bytes the lexer rejects.
    ///
    /// Lookahead can run into binary data behind the object being parsed, so a
    /// bad token must not abort the object that is already complete.
    fn read_token(lexer: &mut Lexer<'_>) -> Token {
        loop {
            match lexer.next_token() {
                Ok(token) => return token,
                Err(e) => tracing::trace!(error = %e, "skipping unreadable token"),
            }
        }
    }

    fn shift(&mut self) {
        let next = Self::read_token(&mut self.lexer);
        self.buf1 = std::mem::replace(&mut self.buf2, next);
    }

    /// Byte offset just past the second lookahead token.
    pub fn lexer_pos(&self) -> usize {
        self.lexer.pos()
    }

    /// Parses the next object.
    pub fn get_object(&mut self) -> PDFResult<PDFObject> {
        let token = std::mem::replace(&mut self.buf1, Token::EOF);
        self.shift();

        match token {
            Token::ArrayStart | Token::DictStart => {
                if self.depth >= MAX_NESTING_DEPTH {
                    return Err(PDFError::syntax(self.lexer.pos(), "objects nested too deeply"));
                }
                self.depth += 1;
                let result = if matches!(token, Token::ArrayStart) {
                    self.parse_array()
                } else {
                    self.parse_dictionary()
                };
                self.depth -= 1;
                result
            }
            Token::ArrayEnd => Err(PDFError::syntax(self.lexer.pos(), "unexpected ']'")),
            Token::DictEnd => Err(PDFError::syntax(self.lexer.pos(), "unexpected '>>'")),
            Token::Number(n) => {
                let generation = match (&self.buf1, &self.buf2) {
                    (Token::Number(g), Token::Command(cmd)) if cmd == "R" => Some(*g),
                    _ => None,
                };
                match generation {
                    Some(generation) if n >= 0.0 && generation >= 0.0 => {
                        self.shift();
                        self.shift();
                        Ok(PDFObject::Ref {
                            num: n as u32,
                            generation: generation as u32,
                        })
                    }
                    _ => Ok(PDFObject::Number(n)),
                }
            }
            Token::EOF => Ok(PDFObject::EOF),
            Token::Boolean(b) => Ok(PDFObject::Boolean(b)),
            Token::Null => Ok(PDFObject::Null),
            Token::String(s) => Ok(PDFObject::String(s)),
            Token::HexString(s) => Ok(PDFObject::HexString(s)),
            Token::Name(n) => Ok(PDFObject::Name(n)),
            Token::Command(c) => Ok(PDFObject::Command(c)),
        }
    }

    fn parse_array(&mut self) -> PDFResult<PDFObject> {
        let mut items = Vec::new();
        loop {
            match self.buf1 {
                Token::ArrayEnd => {
                    self.shift();
                    return Ok(PDFObject::Array(items));
                }
                Token::EOF => {
                    return Err(PDFError::syntax(self.lexer.pos(), "unterminated array"));
                }
                _ => items.push(self.get_object()?),
            }
        }
    }

    fn parse_dictionary(&mut self) -> PDFResult<PDFObject> {
        let mut dict = Dict::new();

        loop {
            match &self.buf1 {
                Token::DictEnd => break,
                Token::EOF => {
                    return Err(PDFError::syntax(self.lexer.pos(), "unterminated dictionary"));
                }
                Token::Name(name) => {
                    let key = name.clone();
                    self.shift();
                    if matches!(self.buf1, Token::DictEnd) {
                        dict.insert(key, PDFObject::Null);
                        break;
                    }
                    let value = self.get_object()?;
                    dict.insert(key, value);
                }
                _ => {
                    // Malformed key: drop the token and keep going
                    self.shift();
                }
            }
        }

        // buf1 is '>>'; the lexer sits right after buf2
        if matches!(&self.buf2, Token::Command(cmd) if cmd == "stream") {
            let data = self.read_stream_data(&dict)?;
            return Ok(PDFObject::Stream { dict, data });
        }

        self.shift();
        Ok(PDFObject::Dictionary(dict))
    }

    /// Reads stream bytes after the `stream` keyword and repositions the
    /// lookahead after `endstream`.
    fn read_stream_data(&mut self, dict: &Dict) -> PDFResult<Vec<u8>> {
        self.lexer.skip_stream_eol();
        let start = self.lexer.pos();
        let data = self.lexer.data();

        let declared = match dict.get("Length") {
            Some(PDFObject::Number(n)) if *n >= 0.0 => Some(*n as usize),
            Some(PDFObject::Ref { num, generation }) => self
                .length_resolver
                .and_then(|resolve| resolve(*num, *generation)),
            _ => None,
        };

        let end = match declared
            .and_then(|len| start.checked_add(len))
            .filter(|end| Self::endstream_follows(data, *end))
        {
            Some(end) => end,
            None => Self::scan_for_endstream(data, start)?,
        };

        let bytes = data[start..end].to_vec();

        let mut after = end;
        while after < data.len() && is_whitespace(data[after]) {
            after += 1;
        }
        if data[after..].starts_with(b"endstream") {
            after += b"endstream".len();
        }
        self.lexer.set_pos(after)?;
        self.buf1 = Self::read_token(&mut self.lexer);
        self.buf2 = Self::read_token(&mut self.lexer);

        Ok(bytes)
    }

    fn endstream_follows(data: &[u8], end: usize) -> bool {
        if end > data.len() {
            return false;
        }
        let mut pos = end;
        while pos < data.len() && is_whitespace(data[pos]) {
            pos += 1;
        }
        data[pos..].starts_with(b"endstream")
    }

    /// Locates `endstream` when `/Length` is missing or wrong, dropping the
    /// EOL that precedes the keyword.
    fn scan_for_endstream(data: &[u8], start: usize) -> PDFResult<usize> {
        let keyword = b"endstream";
        let found = data[start..]
            .windows(keyword.len())
            .position(|w| w == keyword)
            .ok_or_else(|| PDFError::syntax(start, "stream without endstream"))?;

        let mut end = start + found;
        if end > start && data[end - 1] == b'\n' {
            end -= 1;
        }
        if end > start && data[end - 1] == b'\r' {
            end -= 1;
        }
        Ok(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indirect_reference() {
        let mut parser = Parser::new(b"[1 0 R 2 5]", 0);
        let obj = parser.get_object().unwrap();
        assert_eq!(
            obj,
            PDFObject::Array(vec![
                PDFObject::Ref {
                    num: 1,
                    generation: 0
                },
                PDFObject::Number(2.0),
                PDFObject::Number(5.0),
            ])
        );
    }

    #[test]
    fn test_nested_dictionary() {
        let mut parser = Parser::new(b"<< /Type /Page /MediaBox [0 0 612 792] /Res << /A 1 >> >>", 0);
        let obj = parser.get_object().unwrap();
        assert_eq!(obj.get("Type").and_then(|t| t.as_name()), Some("Page"));
        assert_eq!(obj.get("MediaBox").and_then(|m| m.as_array()).map(|a| a.len()), Some(4));
        assert_eq!(
            obj.get("Res").and_then(|r| r.get("A")).and_then(|a| a.as_number()),
            Some(1.0)
        );
    }

    #[test]
    fn test_stream_with_direct_length() {
        let input = b"<< /Length 5 >>\nstream\nhello\nendstream endobj";
        let mut parser = Parser::new(input, 0);
        match parser.get_object().unwrap() {
            PDFObject::Stream { data, .. } => assert_eq!(data, b"hello"),
            other => panic!("expected stream, got {:?}", other),
        }
        assert!(parser.get_object().unwrap().is_command("endobj"));
    }

    #[test]
    fn test_stream_with_wrong_length_falls_back_to_scan() {
        let input = b"<< /Length 99 >>\r\nstream\r\nabc\r\nendstream";
        let mut parser = Parser::new(input, 0);
        match parser.get_object().unwrap() {
            PDFObject::Stream { data, .. } => assert_eq!(data, b"abc"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_with_indirect_length() {
        let resolver = |num: u32, _generation: u32| if num == 7 { Some(3) } else { None };
        let input = b"<< /Length 7 0 R >>\nstream\nxyzendstream";
        let mut parser = Parser::new(input, 0).with_length_resolver(&resolver);
        match parser.get_object().unwrap() {
            PDFObject::Stream { data, .. } => assert_eq!(data, b"xyz"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_with_absurd_length_falls_back_to_scan() {
        let input = b"<< /Length 99999999999999999999 >>\nstream\nabc\nendstream";
        let mut parser = Parser::new(input, 0);
        match parser.get_object().unwrap() {
            PDFObject::Stream { data, .. } => assert_eq!(data, b"abc"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_deep_nesting_is_error() {
        let input = "[".repeat(100_000);
        let mut parser = Parser::new(input.as_bytes(), 0);
        assert!(matches!(parser.get_object(), Err(PDFError::Syntax { .. })));

        let shallow = format!("{}{}", "[".repeat(200), "]".repeat(200));
        assert!(Parser::new(shallow.as_bytes(), 0).get_object().is_ok());
    }

    #[test]
    fn test_unterminated_array_is_error() {
        let mut parser = Parser::new(b"[1 2", 0);
        assert!(parser.get_object().is_err());
    }
}
