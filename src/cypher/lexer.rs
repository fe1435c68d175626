//! Hand-driven lexer with `nom` combinators for literal recognition.
//!
//! Tracks byte offset, line and column for every token so parse failures can
//! be reported with source-accurate coordinates (§4.1).

use nom::character::complete::{char, digit0, digit1};
use nom::combinator::{opt, recognize};
use nom::sequence::pair;
use nom::IResult;

use super::error::ParseError;
use super::token::{Token, TokenKind, KEYWORDS};

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            if self.pos >= self.bytes.len() {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    position: self.pos,
                    line: self.line,
                    column: self.column,
                });
                break;
            }
            tokens.push(self.next_token()?);
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.advance();
                }
                Some(b'#') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.pos, self.line, self.column)
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        let position = self.pos;
        let line = self.line;
        let column = self.column;
        let c = self.peek().expect("checked by caller");

        let kind = match c {
            b'(' => {
                self.advance();
                TokenKind::LParen
            }
            b')' => {
                self.advance();
                TokenKind::RParen
            }
            b'[' => {
                self.advance();
                TokenKind::LBracket
            }
            b']' => {
                self.advance();
                TokenKind::RBracket
            }
            b'{' => {
                self.advance();
                TokenKind::LBrace
            }
            b'}' => {
                self.advance();
                TokenKind::RBrace
            }
            b':' => {
                self.advance();
                TokenKind::Colon
            }
            b',' => {
                self.advance();
                TokenKind::Comma
            }
            b'.' => {
                self.advance();
                TokenKind::Dot
            }
            b'+' => {
                self.advance();
                TokenKind::Plus
            }
            b'*' => {
                self.advance();
                TokenKind::Star
            }
            b'/' => {
                self.advance();
                TokenKind::Slash
            }
            b'%' => {
                self.advance();
                TokenKind::Percent
            }
            b'|' => {
                self.advance();
                TokenKind::Pipe
            }
            b'$' => {
                self.advance();
                let name = self.read_identifier_chars();
                if name.is_empty() {
                    return Err(self.error("expected parameter name after '$'"));
                }
                TokenKind::Parameter(name)
            }
            b'-' => {
                self.advance();
                if self.peek() == Some(b'>') {
                    self.advance();
                    TokenKind::ArrowRight
                } else {
                    TokenKind::Dash
                }
            }
            b'<' => {
                self.advance();
                if self.peek() == Some(b'-') {
                    self.advance();
                    TokenKind::ArrowLeft
                } else if self.peek() == Some(b'=') {
                    self.advance();
                    TokenKind::LessEqual
                } else if self.peek() == Some(b'>') {
                    self.advance();
                    TokenKind::NotEqual
                } else {
                    TokenKind::Less
                }
            }
            b'>' => {
                self.advance();
                if self.peek() == Some(b'=') {
                    self.advance();
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            b'=' => {
                self.advance();
                TokenKind::Equal
            }
            b'\'' | b'"' => self.read_string(c)?,
            b'0'..=b'9' => self.read_number()?,
            c if c.is_ascii_alphabetic() || c == b'_' => self.read_identifier_or_keyword(),
            other => {
                return Err(self.error(format!("unexpected character '{}'", other as char)));
            }
        };

        Ok(Token {
            kind,
            position,
            line,
            column,
        })
    }

    fn read_identifier_chars(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        self.src[start..self.pos].to_string()
    }

    fn read_identifier_or_keyword(&mut self) -> TokenKind {
        let ident = self.read_identifier_chars();
        let upper = ident.to_uppercase();
        if KEYWORDS.contains(&upper.as_str()) {
            TokenKind::Keyword(upper)
        } else {
            TokenKind::Identifier(ident)
        }
    }

    fn read_string(&mut self, quote: u8) -> Result<TokenKind, ParseError> {
        self.advance(); // opening quote
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string literal")),
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    match self.advance() {
                        Some(b'n') => out.push('\n'),
                        Some(b't') => out.push('\t'),
                        Some(b'r') => out.push('\r'),
                        Some(b'b') => out.push('\u{8}'),
                        Some(b'f') => out.push('\u{c}'),
                        Some(b'\\') => out.push('\\'),
                        Some(b'\'') => out.push('\''),
                        Some(b'"') => out.push('"'),
                        Some(other) => out.push(other as char),
                        None => return Err(self.error("unterminated escape sequence")),
                    }
                }
                Some(_) => {
                    // Preserve multi-byte UTF-8 sequences verbatim.
                    let start = self.pos;
                    let width = utf8_width(self.bytes[start]);
                    for _ in 0..width {
                        self.advance();
                    }
                    out.push_str(&self.src[start..self.pos]);
                }
            }
        }
        Ok(TokenKind::String(out))
    }

    fn read_number(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            is_float = true;
            self.advance();
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.advance();
            }
        }
        let text = &self.src[start..self.pos];
        if is_float {
            parse_float(text)
                .map(|(_, f)| TokenKind::Float(f))
                .map_err(|_| self.error(format!("invalid float literal '{text}'")))
        } else {
            parse_int(text)
                .map(|(_, i)| TokenKind::Integer(i))
                .map_err(|_| self.error(format!("invalid integer literal '{text}'")))
        }
    }
}

fn utf8_width(first_byte: u8) -> usize {
    if first_byte & 0x80 == 0 {
        1
    } else if first_byte & 0xE0 == 0xC0 {
        2
    } else if first_byte & 0xF0 == 0xE0 {
        3
    } else {
        4
    }
}

fn parse_int(input: &str) -> IResult<&str, i64> {
    let (rest, digits) = recognize(pair(opt(char('-')), digit1))(input)?;
    let value = digits.parse::<i64>().unwrap_or(0);
    Ok((rest, value))
}

fn parse_float(input: &str) -> IResult<&str, f64> {
    let (rest, digits) = recognize(pair(
        opt(char('-')),
        pair(digit1, opt(pair(char('.'), digit0))),
    ))(input)?;
    let value = digits.parse::<f64>().unwrap_or(0.0);
    Ok((rest, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_pattern() {
        let k = kinds("MATCH (a:User)-[:KNOWS]->(b) RETURN a");
        assert_eq!(k[0], TokenKind::Keyword("MATCH".into()));
        assert_eq!(k[1], TokenKind::LParen);
        assert_eq!(k[2], TokenKind::Identifier("a".into()));
    }

    #[test]
    fn lexes_string_escapes() {
        let k = kinds(r#"RETURN "a\nb""#);
        assert_eq!(k[1], TokenKind::String("a\nb".into()));
    }

    #[test]
    fn lexes_parameter() {
        let k = kinds("$name");
        assert_eq!(k[0], TokenKind::Parameter("name".into()));
    }

    #[test]
    fn reports_position_on_unterminated_string() {
        let err = Lexer::new("RETURN 'abc").tokenize().unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn skips_hash_comments() {
        let k = kinds("RETURN 1 # comment\n, 2");
        assert!(k.iter().any(|t| matches!(t, TokenKind::Integer(2))));
    }
}
