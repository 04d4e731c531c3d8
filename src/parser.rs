// ABOUTME: Pratt parser turning a token stream into an AST (spec §4.P)

use crate::ast::{AttrBinding, AttrPath, AttrPathPart, Bindings, BinOp, Expr, ExprKind, Formal, InheritBinding, Param, UnOp};
use crate::error::{ParseError, Pos};
use crate::lexer::{Lexer, Token, TokenKind};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    buf: VecDeque<Token>,
    file: String,
    base_dir: PathBuf,
}

type PResult<T> = Result<T, ParseError>;

impl<'a> Parser<'a> {
    pub fn new(src: &'a str, file: impl Into<String>, base_dir: impl Into<PathBuf>) -> PResult<Self> {
        let file = file.into();
        let lexer = Lexer::new(src);
        let mut p = Parser { lexer, buf: VecDeque::new(), file, base_dir: base_dir.into() };
        p.fill(1)?;
        Ok(p)
    }

    fn fill(&mut self, n: usize) -> PResult<()> {
        while self.buf.len() < n {
            let tok = self.lex_one()?;
            let is_eof = tok.kind == TokenKind::Eof;
            self.buf.push_back(tok);
            if is_eof {
                break;
            }
        }
        Ok(())
    }

    fn lex_one(&mut self) -> PResult<Token> {
        self.lexer.next_token().map_err(|e| {
            let pos = Self::lex_err_pos(&e);
            ParseError::Lex { file: self.file.clone(), pos, source: e }
        })
    }

    fn lex_err_pos(e: &crate::error::LexError) -> Pos {
        match e {
            crate::error::LexError::UnterminatedString(p)
            | crate::error::LexError::UnterminatedComment(p)
            | crate::error::LexError::UnexpectedChar(_, p) => *p,
        }
    }

    fn cur(&self) -> &Token {
        self.buf.front().expect("buffer primed")
    }

    fn nth(&mut self, n: usize) -> PResult<&Token> {
        self.fill(n + 1)?;
        Ok(self.buf.get(n).unwrap_or_else(|| self.buf.back().unwrap()))
    }

    fn bump(&mut self) -> PResult<Token> {
        self.fill(2)?;
        let tok = self.buf.pop_front().expect("buffer primed");
        if self.buf.is_empty() {
            self.buf.push_back(Token { kind: TokenKind::Eof, pos: tok.pos });
        }
        Ok(tok)
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> PResult<Token> {
        if std::mem::discriminant(&self.cur().kind) == std::mem::discriminant(kind) {
            self.bump()
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedToken {
            file: self.file.clone(),
            pos: self.cur().pos,
            found: format!("{:?}", self.cur().kind),
            expected: expected.to_string(),
        }
    }

    pub fn parse_program(&mut self) -> PResult<Expr> {
        let e = self.parse_expr(0)?;
        if self.cur().kind != TokenKind::Eof {
            return Err(self.unexpected("end of input"));
        }
        Ok(e)
    }

    // ---- precedence climbing ----

    fn infix_bp(kind: &TokenKind) -> Option<(u8, u8, BinOp)> {
        use TokenKind::*;
        Some(match kind {
            Implies => (0, 1, BinOp::Implies),
            OrOr => (1, 2, BinOp::Or),
            And => (3, 4, BinOp::And),
            Eq => (5, 6, BinOp::Eq),
            Neq => (5, 6, BinOp::Neq),
            Lt => (5, 6, BinOp::Lt),
            Le => (5, 6, BinOp::Le),
            Gt => (5, 6, BinOp::Gt),
            Ge => (5, 6, BinOp::Ge),
            Question => (6, 7, BinOp::HasAttr),
            Update => (7, 8, BinOp::Update),
            Plus => (9, 10, BinOp::Add),
            Minus => (9, 10, BinOp::Sub),
            Concat => (11, 12, BinOp::Concat),
            Star => (13, 14, BinOp::Mul),
            Slash => (13, 14, BinOp::Div),
            _ => return None,
        })
    }

    /// Application binds tighter than any binary operator but looser than
    /// unary/select; it has no token of its own, so we detect it by "the
    /// next token can start a simple expression".
    const APP_BP: u8 = 15;
    const UNARY_BP: u8 = 20;

    fn starts_simple_expr(&self) -> bool {
        use TokenKind::*;
        matches!(
            self.cur().kind,
            Int(_) | Float(_) | Path(_) | Uri(_) | Ident(_) | If | Assert | With | Let | Rec
                | LParen | LBrace | LBracket | Minus | Not | StringPart(_)
        )
    }

    fn parse_expr(&mut self, min_bp: u8) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;

        loop {
            if Self::APP_BP >= min_bp && self.starts_simple_expr() {
                let arg = self.parse_app_operand()?;
                let pos = lhs.pos;
                lhs = Expr::new(ExprKind::App { func: Box::new(lhs), arg: Box::new(arg) }, pos);
                continue;
            }
            let Some((lbp, rbp, op)) = Self::infix_bp(&self.cur().kind) else { break };
            if lbp < min_bp {
                break;
            }
            let pos = self.cur().pos;
            self.bump()?;
            if op == BinOp::HasAttr {
                let path = self.parse_attr_path()?;
                lhs = Expr::new(
                    ExprKind::BinOp {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(Expr::new(attr_path_as_marker(path), pos)),
                    },
                    pos,
                );
                continue;
            }
            let rhs = self.parse_expr(rbp)?;
            lhs = Expr::new(ExprKind::BinOp { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }, pos);
        }

        Ok(lhs)
    }

    fn parse_app_operand(&mut self) -> PResult<Expr> {
        self.parse_select()
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        match self.cur().kind {
            TokenKind::Minus => {
                let pos = self.cur().pos;
                self.bump()?;
                let operand = self.parse_expr(Self::UNARY_BP)?;
                Ok(Expr::new(ExprKind::UnOp { op: UnOp::Neg, operand: Box::new(operand) }, pos))
            }
            TokenKind::Not => {
                let pos = self.cur().pos;
                self.bump()?;
                let operand = self.parse_expr(Self::UNARY_BP)?;
                Ok(Expr::new(ExprKind::UnOp { op: UnOp::Not, operand: Box::new(operand) }, pos))
            }
            _ => self.parse_select(),
        }
    }

    fn parse_select(&mut self) -> PResult<Expr> {
        let mut base = self.parse_atom()?;
        loop {
            if self.cur().kind == TokenKind::Dot {
                self.bump()?;
                let path = self.parse_attr_path()?;
                let default = if self.cur().kind == TokenKind::Or {
                    self.bump()?;
                    Some(Box::new(self.parse_app_operand()?))
                } else {
                    None
                };
                let pos = base.pos;
                base = Expr::new(ExprKind::Select { base: Box::new(base), path, default }, pos);
            } else {
                break;
            }
        }
        Ok(base)
    }

    fn parse_attr_path(&mut self) -> PResult<AttrPath> {
        let mut parts = vec![self.parse_attr_path_part()?];
        while self.cur().kind == TokenKind::Dot {
            self.bump()?;
            parts.push(self.parse_attr_path_part()?);
        }
        Ok(parts)
    }

    fn parse_attr_path_part(&mut self) -> PResult<AttrPathPart> {
        match self.cur().kind.clone() {
            TokenKind::Ident(name) => {
                self.bump()?;
                Ok(AttrPathPart::Static(name))
            }
            TokenKind::Or => {
                self.bump()?;
                Ok(AttrPathPart::Static(Rc::from("or")))
            }
            TokenKind::DollarBrace => {
                self.bump()?;
                let e = self.parse_expr(0)?;
                self.expect(&TokenKind::RBrace, "}")?;
                Ok(AttrPathPart::Dynamic(Box::new(e)))
            }
            TokenKind::StringPart(_) => {
                let e = self.parse_string()?;
                Ok(AttrPathPart::Dynamic(Box::new(e)))
            }
            _ => Err(self.unexpected("attribute name")),
        }
    }

    fn parse_atom(&mut self) -> PResult<Expr> {
        let pos = self.cur().pos;
        match self.cur().kind.clone() {
            TokenKind::Int(n) => { self.bump()?; Ok(Expr::new(ExprKind::Int(n), pos)) }
            TokenKind::Float(n) => { self.bump()?; Ok(Expr::new(ExprKind::Float(n), pos)) }
            TokenKind::Path(p) => {
                self.bump()?;
                Ok(Expr::new(ExprKind::Path(self.resolve_path(&p)), pos))
            }
            TokenKind::Uri(u) => { self.bump()?; Ok(Expr::new(ExprKind::Uri(u), pos)) }
            TokenKind::Ident(name) => {
                // `ident:` is a plain-parameter lambda (spec §4.P); anything
                // else falls through to a plain variable reference.
                if matches!(self.nth(1)?.kind, TokenKind::Colon) {
                    self.bump()?; // ident
                    self.bump()?; // :
                    let body = self.parse_expr(0)?;
                    return Ok(Expr::new(ExprKind::Lambda { param: Param::Ident(name), body: Box::new(body) }, pos));
                }
                self.bump()?;
                match &*name {
                    "true" => Ok(Expr::new(ExprKind::Bool(true), pos)),
                    "false" => Ok(Expr::new(ExprKind::Bool(false), pos)),
                    "null" => Ok(Expr::new(ExprKind::Null, pos)),
                    _ => Ok(Expr::new(ExprKind::Var(name), pos)),
                }
            }
            TokenKind::StringPart(_) => self.parse_string(),
            TokenKind::LParen => {
                self.bump()?;
                let e = self.parse_expr(0)?;
                self.expect(&TokenKind::RParen, ")")?;
                Ok(e)
            }
            TokenKind::LBracket => self.parse_list(pos),
            TokenKind::LBrace => self.parse_brace(pos),
            TokenKind::Rec => {
                self.bump()?;
                self.expect(&TokenKind::LBrace, "{")?;
                let bindings = self.parse_bindings()?;
                self.expect(&TokenKind::RBrace, "}")?;
                Ok(Expr::new(ExprKind::AttrSet { recursive: true, bindings }, pos))
            }
            TokenKind::Let => self.parse_let(pos),
            TokenKind::If => self.parse_if(pos),
            TokenKind::With => self.parse_with(pos),
            TokenKind::Assert => self.parse_assert(pos),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn resolve_path(&self, raw: &str) -> Rc<str> {
        if raw.starts_with('/') {
            return Rc::from(raw);
        }
        let resolved = self.base_dir.join(raw);
        let normalized = normalize_path(&resolved);
        Rc::from(normalized.to_string_lossy().as_ref())
    }

    fn parse_string(&mut self) -> PResult<Expr> {
        let pos = self.cur().pos;
        let mut parts: Vec<Rc<str>> = Vec::new();
        let mut exprs: Vec<Expr> = Vec::new();

        loop {
            match self.cur().kind.clone() {
                TokenKind::StringPart(s) => {
                    self.bump()?;
                    parts.push(s);
                }
                TokenKind::StringEnd => {
                    self.bump()?;
                    break;
                }
                _ => return Err(self.unexpected("string part or end")),
            }
            if self.cur().kind == TokenKind::DollarBrace {
                self.bump()?;
                let e = self.parse_expr(0)?;
                self.expect(&TokenKind::RBrace, "}")?;
                exprs.push(e);
            } else {
                break;
            }
        }

        if exprs.is_empty() {
            let joined: String = parts.iter().map(|s| s.as_ref()).collect();
            Ok(Expr::new(ExprKind::Str(Rc::from(joined.as_str())), pos))
        } else {
            Ok(Expr::new(ExprKind::InterpStr { parts, exprs }, pos))
        }
    }

    fn parse_list(&mut self, pos: Pos) -> PResult<Expr> {
        self.bump()?; // [
        let mut elems = Vec::new();
        while self.cur().kind != TokenKind::RBracket {
            // List elements are "simple expressions": select + unary, no
            // application/binop juxtaposition consuming further elements.
            elems.push(self.parse_unary()?);
        }
        self.bump()?; // ]
        Ok(Expr::new(ExprKind::List(elems), pos))
    }

    /// Disambiguate `{` between an attribute set and a lambda pattern per
    /// spec §4.P: `{ x = …` is a set; `{ x , …`, `{ x ? …`, `{ x }`
    /// (followed by `:` or `@`), `{ …` (ellipsis), `{ }` followed by `:`
    /// or `@` is a pattern. This needs up to two tokens past `{`, which the
    /// buffered lookahead (`nth`) provides.
    fn parse_brace(&mut self, pos: Pos) -> PResult<Expr> {
        if self.looks_like_pattern()? {
            let param = self.parse_pattern()?;
            self.expect(&TokenKind::Colon, ":")?;
            let body = self.parse_expr(0)?;
            return Ok(Expr::new(ExprKind::Lambda { param, body: Box::new(body) }, pos));
        }
        self.bump()?; // {
        let bindings = self.parse_bindings()?;
        self.expect(&TokenKind::RBrace, "}")?;
        Ok(Expr::new(ExprKind::AttrSet { recursive: false, bindings }, pos))
    }

    fn looks_like_pattern(&mut self) -> PResult<bool> {
        // self.cur() == LBrace; nth(1) is the token right after it.
        match self.nth(1)?.kind.clone() {
            TokenKind::Ellipsis => Ok(true),
            TokenKind::RBrace => {
                // `{ }:` or `{ } @ name`
                Ok(matches!(self.nth(2)?.kind, TokenKind::Colon | TokenKind::At))
            }
            TokenKind::Ident(_) | TokenKind::Or => {
                // `{ x ,` `{ x ?` `{ x }` are patterns; `{ x = ` / `{ x .` is a set.
                Ok(matches!(self.nth(2)?.kind, TokenKind::Comma | TokenKind::Question | TokenKind::RBrace))
            }
            _ => Ok(false),
        }
    }

    fn parse_pattern(&mut self) -> PResult<Param> {
        self.bump()?; // {
        let mut formals = Vec::new();
        let mut ellipsis = false;
        while self.cur().kind != TokenKind::RBrace {
            if self.cur().kind == TokenKind::Ellipsis {
                self.bump()?;
                ellipsis = true;
                break;
            }
            let name = self.expect_ident()?;
            let default = if self.cur().kind == TokenKind::Question {
                self.bump()?;
                Some(Box::new(self.parse_expr(3)?))
            } else {
                None
            };
            formals.push(Formal { name, default });
            if self.cur().kind == TokenKind::Comma {
                self.bump()?;
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "}")?;
        let alias = if self.cur().kind == TokenKind::At {
            self.bump()?;
            Some(self.expect_ident()?)
        } else {
            None
        };
        Ok(Param::Pattern { formals, ellipsis, alias })
    }

    fn expect_ident(&mut self) -> PResult<Rc<str>> {
        match self.cur().kind.clone() {
            TokenKind::Ident(n) => { self.bump()?; Ok(n) }
            TokenKind::Or => { self.bump()?; Ok(Rc::from("or")) }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn parse_bindings(&mut self) -> PResult<Bindings> {
        let mut bindings = Bindings::new();
        loop {
            match self.cur().kind.clone() {
                TokenKind::Inherit => {
                    let pos = self.cur().pos;
                    self.bump()?;
                    let from = if self.cur().kind == TokenKind::LParen {
                        self.bump()?;
                        let e = self.parse_expr(0)?;
                        self.expect(&TokenKind::RParen, ")")?;
                        Some(Box::new(e))
                    } else {
                        None
                    };
                    let mut names = Vec::new();
                    while let TokenKind::Ident(_) | TokenKind::Or = self.cur().kind {
                        names.push(self.expect_ident()?);
                    }
                    self.expect(&TokenKind::Semi, ";")?;
                    bindings.inherits.push(InheritBinding { from, names, pos });
                }
                TokenKind::Ident(_) | TokenKind::Or | TokenKind::DollarBrace | TokenKind::StringPart(_) => {
                    let pos = self.cur().pos;
                    let path = self.parse_attr_path()?;
                    self.expect(&TokenKind::Assign, "=")?;
                    let value = self.parse_expr(0)?;
                    self.expect(&TokenKind::Semi, ";")?;
                    bindings.attrs.push(AttrBinding { path, value: Box::new(value), pos });
                }
                _ => break,
            }
        }
        Ok(bindings)
    }

    fn parse_let(&mut self, pos: Pos) -> PResult<Expr> {
        self.bump()?; // let
        let bindings = self.parse_bindings()?;
        self.expect(&TokenKind::In, "in")?;
        let body = self.parse_expr(0)?;
        Ok(Expr::new(ExprKind::Let { bindings, body: Box::new(body) }, pos))
    }

    fn parse_if(&mut self, pos: Pos) -> PResult<Expr> {
        self.bump()?; // if
        let cond = self.parse_expr(0)?;
        self.expect(&TokenKind::Then, "then")?;
        let then_branch = self.parse_expr(0)?;
        self.expect(&TokenKind::Else, "else")?;
        let else_branch = self.parse_expr(0)?;
        Ok(Expr::new(
            ExprKind::If { cond: Box::new(cond), then_branch: Box::new(then_branch), else_branch: Box::new(else_branch) },
            pos,
        ))
    }

    fn parse_with(&mut self, pos: Pos) -> PResult<Expr> {
        self.bump()?; // with
        let env = self.parse_expr(0)?;
        self.expect(&TokenKind::Semi, ";")?;
        let body = self.parse_expr(0)?;
        Ok(Expr::new(ExprKind::With { env: Box::new(env), body: Box::new(body) }, pos))
    }

    fn parse_assert(&mut self, pos: Pos) -> PResult<Expr> {
        self.bump()?; // assert
        let cond = self.parse_expr(0)?;
        self.expect(&TokenKind::Semi, ";")?;
        let body = self.parse_expr(0)?;
        Ok(Expr::new(ExprKind::Assert { cond: Box::new(cond), body: Box::new(body) }, pos))
    }
}

/// `?` right-hand side is an attribute path, not a value-producing
/// expression; we encode it as a synthetic list-of-strings expression so
/// the evaluator can special-case `BinOp::HasAttr` without a new AST node.
fn attr_path_as_marker(path: AttrPath) -> ExprKind {
    ExprKind::List(
        path.into_iter()
            .map(|part| match part {
                AttrPathPart::Static(s) => Expr::new(ExprKind::Str(s), Pos::default()),
                AttrPathPart::Dynamic(e) => *e,
            })
            .collect(),
    )
}

fn normalize_path(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in p.components() {
        use std::path::Component::*;
        match comp {
            CurDir => {}
            ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Parse a top-level Nix expression from source text, resolving relative
/// paths against `base_dir` (the directory containing the source file).
pub fn parse(src: &str, file: impl Into<String>, base_dir: impl Into<PathBuf>) -> PResult<Expr> {
    let mut parser = Parser::new(src, file, base_dir)?;
    parser.parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Expr {
        parse(src, "<test>", "/tmp").expect("parse failed")
    }

    #[test]
    fn integers() {
        let e = parse_ok("42");
        assert_eq!(e.kind, ExprKind::Int(42));
    }

    #[test]
    fn arithmetic_precedence() {
        // 1 + 2 * 3 => Add(1, Mul(2, 3))
        let e = parse_ok("1 + 2 * 3");
        match e.kind {
            ExprKind::BinOp { op: BinOp::Add, rhs, .. } => {
                assert!(matches!(rhs.kind, ExprKind::BinOp { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn function_application_left_assoc() {
        let e = parse_ok("f x y");
        match e.kind {
            ExprKind::App { func, arg } => {
                assert!(matches!(arg.kind, ExprKind::Var(_)));
                assert!(matches!(func.kind, ExprKind::App { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn application_binds_tighter_than_plus() {
        // f x + 1 => (f x) + 1
        let e = parse_ok("f x + 1");
        match e.kind {
            ExprKind::BinOp { op: BinOp::Add, lhs, .. } => {
                assert!(matches!(lhs.kind, ExprKind::App { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn attr_set_literal() {
        let e = parse_ok("{ a = 1; b = 2; }");
        match e.kind {
            ExprKind::AttrSet { recursive, bindings } => {
                assert!(!recursive);
                assert_eq!(bindings.attrs.len(), 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn select_with_default() {
        let e = parse_ok("a.b or 5");
        assert!(matches!(e.kind, ExprKind::Select { default: Some(_), .. }));
    }

    #[test]
    fn let_in() {
        let e = parse_ok("let x = 1; in x");
        assert!(matches!(e.kind, ExprKind::Let { .. }));
    }

    #[test]
    fn if_then_else() {
        let e = parse_ok("if true then 1 else 2");
        assert!(matches!(e.kind, ExprKind::If { .. }));
    }

    #[test]
    fn lambda_ident_param() {
        let e = parse_ok("x: x");
        assert!(matches!(e.kind, ExprKind::Lambda { param: Param::Ident(_), .. }));
    }

    #[test]
    fn lambda_pattern_param() {
        let e = parse_ok("{ a, b ? 1, ... }@args: a");
        match e.kind {
            ExprKind::Lambda { param: Param::Pattern { formals, ellipsis, alias }, .. } => {
                assert_eq!(formals.len(), 2);
                assert!(ellipsis);
                assert_eq!(alias.as_deref(), Some("args"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn pattern_not_confused_with_attrset() {
        let e = parse_ok("{ a = 1; }");
        assert!(matches!(e.kind, ExprKind::AttrSet { .. }));
    }

    #[test]
    fn list_elements_are_simple() {
        // [ f 1 2 ] is three elements: f, 1, 2
        let e = parse_ok("[ f 1 2 ]");
        match e.kind {
            ExprKind::List(elems) => assert_eq!(elems.len(), 3),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn string_interpolation() {
        let e = parse_ok("\"a${1}b\"");
        match e.kind {
            ExprKind::InterpStr { parts, exprs } => {
                assert_eq!(parts.len(), 2);
                assert_eq!(exprs.len(), 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn inherit_desugars_to_names() {
        let e = parse_ok("{ inherit a b; }");
        match e.kind {
            ExprKind::AttrSet { bindings, .. } => {
                assert_eq!(bindings.inherits.len(), 1);
                assert_eq!(bindings.inherits[0].names.len(), 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn concat_right_assoc() {
        // a ++ b ++ c => Concat(a, Concat(b, c))
        let e = parse_ok("a ++ b ++ c");
        match e.kind {
            ExprKind::BinOp { op: BinOp::Concat, rhs, .. } => {
                assert!(matches!(rhs.kind, ExprKind::BinOp { op: BinOp::Concat, .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn relative_path_resolved() {
        let e = parse_ok("./foo.nix");
        match e.kind {
            ExprKind::Path(p) => assert_eq!(&*p, "/tmp/foo.nix"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
