// ABOUTME: Lexer producing a token stream, handling nested string interpolation
// and indented strings as a small hand-rolled state machine (spec §4.L).

use crate::error::{LexError, Pos};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Int(i64),
    Float(f64),
    Path(Rc<str>),
    Uri(Rc<str>),
    Ident(Rc<str>),

    // String interpolation tokens (spec §3, §4.L)
    StringPart(Rc<str>),
    StringEnd,
    DollarBrace,

    // Keywords
    If,
    Then,
    Else,
    Assert,
    With,
    Let,
    In,
    Rec,
    Inherit,
    Or,

    // Operators
    Eq,      // ==
    Neq,     // !=
    Lt,      // <
    Le,      // <=
    Gt,      // >
    Ge,      // >=
    And,     // &&
    OrOr,    // ||
    Implies, // ->
    Not,     // !
    Update,  // //
    Concat,  // ++
    Plus,
    Minus,
    Star,
    Slash,
    Question, // ?
    At,       // @
    Colon,
    Semi,
    Comma,
    Dot,
    Ellipsis, // ...
    Assign,   // =
    Dollar,   // bare $ (rare, error-tolerant)

    // Delimiters
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("if", TokenKind::If),
    ("then", TokenKind::Then),
    ("else", TokenKind::Else),
    ("assert", TokenKind::Assert),
    ("with", TokenKind::With),
    ("let", TokenKind::Let),
    ("in", TokenKind::In),
    ("rec", TokenKind::Rec),
    ("inherit", TokenKind::Inherit),
    ("or", TokenKind::Or),
];

/// One entry per string currently being scanned; tracks whether it is an
/// indented (`''…''`) string and how many unmatched `{` we've seen since
/// the most recent `${` (spec §4.L: `brace_depth`).
struct StringFrame {
    indented: bool,
    brace_depth: u32,
}

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    /// Stack of currently-open interpolated strings (spec's `string_depth`
    /// is `string_stack.len()`).
    string_stack: Vec<StringFrame>,
    pending_doc: RefCell<Option<String>>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            string_stack: Vec::new(),
            pending_doc: RefCell::new(None),
        }
    }

    pub fn take_pending_doc(&self) -> Option<String> {
        self.pending_doc.borrow_mut().take()
    }

    fn cur_pos(&self) -> Pos {
        Pos { line: self.line, column: self.column, offset: self.pos as u32 }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<u8> {
        self.bytes.get(self.pos + off).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let rest = &self.src[self.pos..];
        let c = rest.chars().next()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s)
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek_byte() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.advance();
                }
                Some(b'#') => {
                    while let Some(c) = self.peek_byte() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.cur_pos();
                    self.advance();
                    self.advance();
                    // A doc comment is `/** ... */` not immediately closed.
                    let is_doc = self.starts_with("*") && !self.starts_with("*/");
                    let doc_start = self.pos;
                    loop {
                        if self.starts_with("*/") {
                            if is_doc {
                                let text = self.src[doc_start..self.pos].trim().to_string();
                                *self.pending_doc.borrow_mut() = Some(text);
                            }
                            self.advance();
                            self.advance();
                            break;
                        }
                        if self.advance().is_none() {
                            return Err(LexError::UnterminatedComment(start));
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn is_ident_start(c: u8) -> bool {
        c.is_ascii_alphabetic() || c == b'_'
    }

    fn is_ident_continue(c: u8) -> bool {
        c.is_ascii_alphanumeric() || c == b'_' || c == b'\'' || c == b'-'
    }

    fn is_path_continue(c: u8) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, b'/' | b'.' | b'_' | b'-' | b'+')
    }

    fn looks_like_path_start(&self) -> bool {
        match self.peek_byte() {
            Some(b'/') => matches!(self.peek_at(1), Some(c) if Self::is_path_continue(c)),
            Some(b'.') => {
                // '.' alone is select, './x' or '../x' is a path, '...' is ellipsis.
                matches!(self.peek_at(1), Some(b'/'))
                    || (self.peek_at(1) == Some(b'.') && self.peek_at(2) == Some(b'/'))
            }
            _ => false,
        }
    }

    fn looks_like_uri(&self) -> bool {
        // scheme://  — bounded scheme length per spec.
        let rest = &self.src[self.pos..];
        if let Some(colon) = rest.find(':') {
            if colon == 0 || colon > 32 {
                return false;
            }
            let scheme = &rest[..colon];
            if !scheme.bytes().next().map(|b| b.is_ascii_alphabetic()).unwrap_or(false) {
                return false;
            }
            if !scheme.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.')) {
                return false;
            }
            return rest[colon..].starts_with("://");
        }
        false
    }

    /// Scan the next token. When inside a string, this dispatches to the
    /// interpolation-aware scanners instead of the normal token scanner.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        if let Some(frame) = self.string_stack.last() {
            if frame.brace_depth == 0 {
                return self.next_string_token();
            }
        }
        self.skip_trivia()?;
        let pos = self.cur_pos();
        let Some(c) = self.peek_byte() else {
            return Ok(Token { kind: TokenKind::Eof, pos });
        };

        // Track brace depth while inside an interpolation (spec rule 2).
        if let Some(frame) = self.string_stack.last_mut() {
            if c == b'{' {
                frame.brace_depth += 1;
            } else if c == b'}' {
                frame.brace_depth -= 1;
                if frame.brace_depth == 0 {
                    self.advance();
                    return self.next_string_token();
                }
            }
        }

        if c == b'"' {
            self.advance();
            self.string_stack.push(StringFrame { indented: false, brace_depth: 0 });
            return self.next_string_token();
        }
        if c == b'\'' && self.peek_at(1) == Some(b'\'') {
            self.advance();
            self.advance();
            self.string_stack.push(StringFrame { indented: true, brace_depth: 0 });
            return self.next_string_token();
        }

        if self.looks_like_path_start() {
            return self.scan_path(pos);
        }
        if self.looks_like_uri() {
            return self.scan_uri(pos);
        }
        if c.is_ascii_digit() {
            return self.scan_number(pos);
        }
        if Self::is_ident_start(c) {
            return self.scan_ident(pos);
        }

        self.scan_operator(pos)
    }

    fn scan_path(&mut self, pos: Pos) -> Result<Token, LexError> {
        let start = self.pos;
        while let Some(c) = self.peek_byte() {
            if Self::is_path_continue(c) {
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        Ok(Token { kind: TokenKind::Path(Rc::from(text)), pos })
    }

    fn scan_uri(&mut self, pos: Pos) -> Result<Token, LexError> {
        let start = self.pos;
        while let Some(c) = self.peek_byte() {
            if c.is_ascii_alphanumeric() || matches!(c, b':' | b'/' | b'?' | b'#' | b'&' | b'=' | b'.' | b'-' | b'_' | b'+' | b'%' | b'~') {
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        Ok(Token { kind: TokenKind::Uri(Rc::from(text)), pos })
    }

    fn scan_number(&mut self, pos: Pos) -> Result<Token, LexError> {
        let start = self.pos;
        while matches!(self.peek_byte(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let mut is_float = false;
        if self.peek_byte() == Some(b'.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while matches!(self.peek_byte(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek_byte(), Some(b'e') | Some(b'E')) {
            let save = self.pos;
            let save_line = self.line;
            let save_col = self.column;
            self.advance();
            if matches!(self.peek_byte(), Some(b'+') | Some(b'-')) {
                self.advance();
            }
            if matches!(self.peek_byte(), Some(c) if c.is_ascii_digit()) {
                is_float = true;
                while matches!(self.peek_byte(), Some(c) if c.is_ascii_digit()) {
                    self.advance();
                }
            } else {
                self.pos = save;
                self.line = save_line;
                self.column = save_col;
            }
        }
        let text = &self.src[start..self.pos];
        if is_float {
            Ok(Token { kind: TokenKind::Float(text.parse().unwrap_or(0.0)), pos })
        } else {
            Ok(Token { kind: TokenKind::Int(text.parse().unwrap_or(0)), pos })
        }
    }

    fn scan_ident(&mut self, pos: Pos) -> Result<Token, LexError> {
        let start = self.pos;
        while matches!(self.peek_byte(), Some(c) if Self::is_ident_continue(c)) {
            self.advance();
        }
        let text = &self.src[start..self.pos];
        for (kw, kind) in KEYWORDS {
            if *kw == text {
                return Ok(Token { kind: kind.clone(), pos });
            }
        }
        Ok(Token { kind: TokenKind::Ident(Rc::from(text)), pos })
    }

    fn scan_operator(&mut self, pos: Pos) -> Result<Token, LexError> {
        macro_rules! two {
            ($a:expr, $b:expr, $kind:expr, $fallback:expr) => {{
                self.advance();
                if self.peek_byte() == Some($b) {
                    self.advance();
                    return Ok(Token { kind: $kind, pos });
                }
                return Ok(Token { kind: $fallback, pos });
            }};
        }
        let c = self.peek_byte().unwrap();
        match c {
            b'(' => { self.advance(); Ok(Token { kind: TokenKind::LParen, pos }) }
            b')' => { self.advance(); Ok(Token { kind: TokenKind::RParen, pos }) }
            b'{' => { self.advance(); Ok(Token { kind: TokenKind::LBrace, pos }) }
            b'}' => { self.advance(); Ok(Token { kind: TokenKind::RBrace, pos }) }
            b'[' => { self.advance(); Ok(Token { kind: TokenKind::LBracket, pos }) }
            b']' => { self.advance(); Ok(Token { kind: TokenKind::RBracket, pos }) }
            b';' => { self.advance(); Ok(Token { kind: TokenKind::Semi, pos }) }
            b',' => { self.advance(); Ok(Token { kind: TokenKind::Comma, pos }) }
            b'@' => { self.advance(); Ok(Token { kind: TokenKind::At, pos }) }
            b'?' => { self.advance(); Ok(Token { kind: TokenKind::Question, pos }) }
            b':' => { self.advance(); Ok(Token { kind: TokenKind::Colon, pos }) }
            b'$' => {
                self.advance();
                if self.peek_byte() == Some(b'{') {
                    self.advance();
                    return Ok(Token { kind: TokenKind::DollarBrace, pos });
                }
                Ok(Token { kind: TokenKind::Dollar, pos })
            }
            b'.' => {
                if self.peek_at(1) == Some(b'.') && self.peek_at(2) == Some(b'.') {
                    self.advance();
                    self.advance();
                    self.advance();
                    return Ok(Token { kind: TokenKind::Ellipsis, pos });
                }
                self.advance();
                Ok(Token { kind: TokenKind::Dot, pos })
            }
            b'=' => two!(b'=', b'=', TokenKind::Eq, TokenKind::Assign),
            b'!' => two!(b'!', b'=', TokenKind::Neq, TokenKind::Not),
            b'<' => two!(b'<', b'=', TokenKind::Le, TokenKind::Lt),
            b'>' => two!(b'>', b'=', TokenKind::Ge, TokenKind::Gt),
            b'&' => {
                self.advance();
                if self.peek_byte() == Some(b'&') {
                    self.advance();
                    return Ok(Token { kind: TokenKind::And, pos });
                }
                Err(LexError::UnexpectedChar('&', pos))
            }
            b'|' => {
                self.advance();
                if self.peek_byte() == Some(b'|') {
                    self.advance();
                    return Ok(Token { kind: TokenKind::OrOr, pos });
                }
                Err(LexError::UnexpectedChar('|', pos))
            }
            b'-' => {
                self.advance();
                if self.peek_byte() == Some(b'>') {
                    self.advance();
                    return Ok(Token { kind: TokenKind::Implies, pos });
                }
                Ok(Token { kind: TokenKind::Minus, pos })
            }
            b'/' => {
                self.advance();
                if self.peek_byte() == Some(b'/') {
                    self.advance();
                    return Ok(Token { kind: TokenKind::Update, pos });
                }
                Ok(Token { kind: TokenKind::Slash, pos })
            }
            b'+' => {
                self.advance();
                if self.peek_byte() == Some(b'+') {
                    self.advance();
                    return Ok(Token { kind: TokenKind::Concat, pos });
                }
                Ok(Token { kind: TokenKind::Plus, pos })
            }
            b'*' => { self.advance(); Ok(Token { kind: TokenKind::Star, pos }) }
            other => {
                let ch = self.advance().unwrap_or(other as char);
                Err(LexError::UnexpectedChar(ch, pos))
            }
        }
    }

    /// Scan inside a string (normal or indented) until `${` or the
    /// terminator, per spec rules 1–3.
    fn next_string_token(&mut self) -> Result<Token, LexError> {
        let frame_indented = self.string_stack.last().unwrap().indented;
        let start_pos = self.cur_pos();
        let mut out = String::new();

        loop {
            if frame_indented {
                if self.starts_with("''") {
                    // Indented-string escapes: ''$ -> $, ''' -> '', ''\ -> \
                    if self.peek_at(2) == Some(b'$') {
                        self.advance();
                        self.advance();
                        self.advance();
                        out.push('$');
                        continue;
                    }
                    if self.peek_at(2) == Some(b'\'') {
                        self.advance();
                        self.advance();
                        self.advance();
                        out.push_str("''");
                        continue;
                    }
                    if self.peek_at(2) == Some(b'\\') {
                        self.advance();
                        self.advance();
                        self.advance();
                        if let Some(c) = self.advance() {
                            out.push(c);
                        }
                        continue;
                    }
                    self.advance();
                    self.advance();
                    self.string_stack.pop();
                    return Ok(Token { kind: TokenKind::StringEnd, pos: start_pos });
                }
            } else if self.peek_byte() == Some(b'"') {
                self.advance();
                self.string_stack.pop();
                return Ok(Token { kind: TokenKind::StringEnd, pos: start_pos });
            }

            if self.peek_byte() == Some(b'$') && self.peek_at(1) == Some(b'{') {
                self.advance();
                self.advance();
                if let Some(frame) = self.string_stack.last_mut() {
                    frame.brace_depth = 1;
                }
                return Ok(Token { kind: TokenKind::StringPart(Rc::from(out.as_str())), pos: start_pos });
            }

            if !frame_indented && self.peek_byte() == Some(b'\\') {
                self.advance();
                match self.advance() {
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some('$') => out.push('$'),
                    Some(other) => out.push(other),
                    None => return Err(LexError::UnterminatedString(start_pos)),
                }
                continue;
            }

            match self.advance() {
                Some(c) => out.push(c),
                None => return Err(LexError::UnterminatedString(start_pos)),
            }
        }
    }
}

/// Strip the common leading whitespace from an indented (`''…''`) string's
/// literal lines, per Nix's indented-string dedent rule. `parts` are the
/// literal chunks produced between interpolations; interpolations themselves
/// are opaque and never contribute to a line's indentation. Returns the
/// chunks with the common indentation removed, in the same order.
pub fn dedent_indented_string(parts: &[String]) -> Vec<String> {
    // Join chunks with a NUL so an interpolation mid-line still marks that
    // line as non-blank, then split back on it at the end.
    const SEP: char = '\u{0}';
    let full = parts.join(&SEP.to_string());

    let mut min_indent = usize::MAX;
    for (i, line) in full.split('\n').enumerate() {
        if i == 0 || line.trim().is_empty() {
            continue;
        }
        let indent = line.len() - line.trim_start_matches(' ').len();
        min_indent = min_indent.min(indent);
    }
    if min_indent == usize::MAX {
        min_indent = 0;
    }

    let dedented = full
        .split('\n')
        .enumerate()
        .map(|(i, line)| {
            if i == 0 || line.len() < min_indent {
                line
            } else {
                &line[min_indent..]
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    dedented.split(SEP).map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lex = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let t = lex.next_token().unwrap();
            if t.kind == TokenKind::Eof {
                break;
            }
            out.push(t.kind);
        }
        out
    }

    #[test]
    fn integers_and_floats() {
        assert_eq!(kinds("42"), vec![TokenKind::Int(42)]);
        assert_eq!(kinds("3.14"), vec![TokenKind::Float(3.14)]);
        assert_eq!(kinds("1e3"), vec![TokenKind::Float(1000.0)]);
    }

    #[test]
    fn keywords_and_idents() {
        assert_eq!(kinds("if then else"), vec![TokenKind::If, TokenKind::Then, TokenKind::Else]);
        assert_eq!(kinds("foo-bar"), vec![TokenKind::Ident(Rc::from("foo-bar"))]);
    }

    #[test]
    fn operators() {
        assert_eq!(kinds("-> || && == != <= >= // ++"), vec![
            TokenKind::Implies, TokenKind::OrOr, TokenKind::And, TokenKind::Eq,
            TokenKind::Neq, TokenKind::Le, TokenKind::Ge, TokenKind::Update, TokenKind::Concat,
        ]);
    }

    #[test]
    fn simple_string_no_interpolation() {
        let toks = kinds("\"hello\"");
        assert_eq!(toks, vec![TokenKind::StringPart(Rc::from("hello")), TokenKind::StringEnd]);
    }

    #[test]
    fn string_with_interpolation() {
        let toks = kinds("\"a${1}b\"");
        assert_eq!(toks, vec![
            TokenKind::StringPart(Rc::from("a")),
            TokenKind::DollarBrace,
            TokenKind::Int(1),
            TokenKind::StringPart(Rc::from("b")),
            TokenKind::StringEnd,
        ]);
    }

    #[test]
    fn nested_interpolation_depth() {
        // "x${"y${1}z"}w"
        let toks = kinds("\"x${\"y${1}z\"}w\"");
        assert_eq!(toks, vec![
            TokenKind::StringPart(Rc::from("x")),
            TokenKind::DollarBrace,
            TokenKind::StringPart(Rc::from("y")),
            TokenKind::DollarBrace,
            TokenKind::Int(1),
            TokenKind::StringPart(Rc::from("z")),
            TokenKind::StringEnd,
            TokenKind::StringPart(Rc::from("w")),
            TokenKind::StringEnd,
        ]);
    }

    #[test]
    fn braces_inside_interpolation_do_not_close_string() {
        // "${ { a = 1; } }"
        let toks = kinds("\"${ { a = 1; }.a }\"");
        assert!(matches!(toks.last().unwrap(), TokenKind::StringEnd));
    }

    #[test]
    fn unterminated_string_errors() {
        let mut lex = Lexer::new("\"abc");
        loop {
            match lex.next_token() {
                Ok(t) if t.kind == TokenKind::Eof => panic!("expected error"),
                Ok(_) => continue,
                Err(LexError::UnterminatedString(_)) => break,
                Err(e) => panic!("wrong error: {e:?}"),
            }
        }
    }

    #[test]
    fn path_literal() {
        assert_eq!(kinds("./foo/bar"), vec![TokenKind::Path(Rc::from("./foo/bar"))]);
        assert_eq!(kinds("/abs/path"), vec![TokenKind::Path(Rc::from("/abs/path"))]);
    }

    #[test]
    fn ellipsis_vs_path() {
        assert_eq!(kinds("..."), vec![TokenKind::Ellipsis]);
    }

    #[test]
    fn uri_literal() {
        assert_eq!(kinds("http://example.com"), vec![TokenKind::Uri(Rc::from("http://example.com"))]);
    }

    #[test]
    fn doc_comment_captured() {
        let mut lex = Lexer::new("/** a doc */ 1");
        let _ = lex.next_token().unwrap();
        assert_eq!(lex.take_pending_doc(), Some("a doc".to_string()));
    }
}
