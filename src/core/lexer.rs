use super::error::{PDFError, PDFResult};

/// PDF token types returned by the Lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// End of data
    EOF,

    /// Boolean value
    Boolean(bool),

    /// Null value
    Null,

    /// Numeric value (integers and reals)
    Number(f64),

    /// Literal string `(hello)`
    String(Vec<u8>),

    /// Hex string `<48656c6c6f>`
    HexString(Vec<u8>),

    /// Name `/Name`, with `#xx` escapes decoded
    Name(String),

    /// Keyword or content operator (`obj`, `R`, `re`, `cm`, ...)
    Command(String),

    /// `[`
    ArrayStart,

    /// `]`
    ArrayEnd,

    /// `<<`
    DictStart,

    /// `>>`
    DictEnd,
}

/// Tokenizer over a borrowed byte slice.
///
/// The lexer never copies the input; callers position it at an object
/// offset and pull tokens until they have what they need.
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

/// PDF whitespace: NUL, TAB, LF, FF, CR, SPACE
pub(crate) fn is_whitespace(ch: u8) -> bool {
    matches!(ch, 0x00 | 0x09 | 0x0A | 0x0C | 0x0D | 0x20)
}

/// PDF delimiters: ( ) < > [ ] { } / %
pub(crate) fn is_delimiter(ch: u8) -> bool {
    matches!(
        ch,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_special(ch: u8) -> bool {
    is_whitespace(ch) || is_delimiter(ch)
}

fn hex_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

impl<'a> Lexer<'a> {
    /// Creates a lexer positioned at `pos`.
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Lexer {
            data,
            pos: pos.min(data.len()),
        }
    }

    /// Current byte offset.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Moves the lexer to an absolute offset.
    pub fn set_pos(&mut self, pos: usize) -> PDFResult<()> {
        if pos > self.data.len() {
            return Err(PDFError::InvalidOffset {
                offset: pos,
                length: self.data.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// The whole buffer this lexer reads from.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    /// Skips whitespace and `%` comments.
    pub fn skip_whitespace_and_comments(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == b'%' {
                while let Some(c) = self.peek() {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else if is_whitespace(ch) {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    /// Skips the end-of-line marker that follows the `stream` keyword.
    ///
    /// The marker is CRLF or LF; a lone CR is tolerated.
    pub fn skip_stream_eol(&mut self) {
        // Some writers put spaces between `stream` and the EOL
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'\r') => {
                self.pos += 1;
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            Some(b'\n') => self.pos += 1,
            _ => {}
        }
    }

    /// Returns the next token.
    pub fn next_token(&mut self) -> PDFResult<Token> {
        self.skip_whitespace_and_comments();

        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Ok(Token::EOF);
        };

        match ch {
            b'0'..=b'9' | b'+' | b'-' | b'.' => self.read_number(),
            b'(' => self.read_literal_string(),
            b'/' => Ok(self.read_name()),
            b'[' => {
                self.pos += 1;
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.pos += 1;
                Ok(Token::ArrayEnd)
            }
            b'<' => {
                if self.peek_at(1) == Some(b'<') {
                    self.pos += 2;
                    Ok(Token::DictStart)
                } else {
                    self.pos += 1;
                    Ok(self.read_hex_string())
                }
            }
            b'>' => {
                if self.peek_at(1) == Some(b'>') {
                    self.pos += 2;
                    Ok(Token::DictEnd)
                } else {
                    self.pos += 1;
                    Err(PDFError::syntax(start, "unexpected '>'"))
                }
            }
            b')' | b'{' | b'}' => {
                self.pos += 1;
                Err(PDFError::syntax(
                    start,
                    format!("illegal character '{}'", ch as char),
                ))
            }
            _ => self.read_command(),
        }
    }

    /// Integers, reals, leading-dot reals. A stray sign with no digits reads
    /// as zero, matching what viewers do with sloppy writers.
    fn read_number(&mut self) -> PDFResult<Token> {
        let start = self.pos;
        let mut negative = false;

        match self.peek() {
            Some(b'-') => {
                negative = true;
                self.pos += 1;
                // Double negative is tolerated
                if self.peek() == Some(b'-') {
                    self.pos += 1;
                }
            }
            Some(b'+') => self.pos += 1,
            _ => {}
        }

        let digits_start = self.pos;
        let mut seen_dot = false;
        while let Some(c) = self.peek() {
            match c {
                b'0'..=b'9' => self.pos += 1,
                b'.' if !seen_dot => {
                    seen_dot = true;
                    self.pos += 1;
                }
                _ => break,
            }
        }

        let text = &self.data[digits_start..self.pos];
        if text.is_empty() || text == b"." {
            return match self.peek() {
                None => Ok(Token::Number(0.0)),
                Some(c) if is_whitespace(c) || c == b'(' || c == b'<' => Ok(Token::Number(0.0)),
                Some(c) => Err(PDFError::syntax(
                    start,
                    format!("invalid number near '{}'", c as char),
                )),
            };
        }

        // Safe: only ASCII digits and at most one dot were consumed
        let text = std::str::from_utf8(text).unwrap_or("0");
        let value: f64 = if text.starts_with('.') {
            format!("0{}", text).parse().unwrap_or(0.0)
        } else {
            text.trim_end_matches('.').parse().unwrap_or(0.0)
        };

        Ok(Token::Number(if negative { -value } else { value }))
    }

    fn read_literal_string(&mut self) -> PDFResult<Token> {
        // Consume '('
        self.pos += 1;
        let mut depth = 1usize;
        let mut out = Vec::new();

        while let Some(ch) = self.bump() {
            match ch {
                b'(' => {
                    depth += 1;
                    out.push(ch);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Token::String(out));
                    }
                    out.push(ch);
                }
                b'\\' => {
                    let Some(esc) = self.bump() else { break };
                    match esc {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'0'..=b'7' => {
                            let mut value = (esc - b'0') as u32;
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        value = value * 8 + (d - b'0') as u32;
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push((value & 0xFF) as u8);
                        }
                        b'\r' => {
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        other => out.push(other),
                    }
                }
                _ => out.push(ch),
            }
        }

        // Unterminated string: keep what we have
        Ok(Token::String(out))
    }

    fn read_hex_string(&mut self) -> Token {
        let mut out = Vec::new();
        let mut high: Option<u8> = None;

        while let Some(ch) = self.bump() {
            if ch == b'>' {
                break;
            }
            let Some(v) = hex_value(ch) else {
                continue;
            };
            match high.take() {
                Some(h) => out.push((h << 4) | v),
                None => high = Some(v),
            }
        }

        // Odd number of digits: final digit is followed by an implied 0
        if let Some(h) = high {
            out.push(h << 4);
        }
        Token::HexString(out)
    }

    fn read_name(&mut self) -> Token {
        // Skip '/'
        self.pos += 1;
        let mut out = Vec::new();

        while let Some(ch) = self.peek() {
            if is_special(ch) {
                break;
            }
            self.pos += 1;
            if ch == b'#' {
                let hi = self.peek().and_then(hex_value);
                let lo = self.peek_at(1).and_then(hex_value);
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    self.pos += 2;
                    out.push((hi << 4) | lo);
                    continue;
                }
            }
            out.push(ch);
        }

        Token::Name(String::from_utf8_lossy(&out).into_owned())
    }

    fn read_command(&mut self) -> PDFResult<Token> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if is_special(ch) {
                break;
            }
            self.pos += 1;
            if self.pos - start > 128 {
                return Err(PDFError::syntax(start, "command token too long"));
            }
        }

        let word = String::from_utf8_lossy(&self.data[start..self.pos]).into_owned();
        Ok(match word.as_str() {
            "true" => Token::Boolean(true),
            "false" => Token::Boolean(false),
            "null" => Token::Null,
            _ => Token::Command(word),
        })
    }
}
