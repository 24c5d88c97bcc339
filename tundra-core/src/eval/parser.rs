//! Recursive-descent parser for cell source.
//!
//! # Source shapes
//!
//! A cell is either a single expression or a `{ ... }` statement block. A
//! source starting with `{` is first parsed as a block; if that fails it is
//! parsed again as an expression, so a record literal such as
//! `{ name: "A" }` still works as a cell. When both attempts fail the error
//! that got further into the source is reported.
//!
//! # Precedence (low to high)
//!
//! arrow, `?:`, `||`, `&&`, equality, comparison, `+ -`, `* / %`,
//! unary `- + ! await`, postfix `.x [i] (args)` and tagged templates.
//!
//! # Nesting
//!
//! Parsing and evaluation both recurse on the tree, so nesting is capped at
//! [`MAX_NESTING`]. Every parenthesised or bracketed level, every prefix
//! operator and every link of an operator or postfix chain counts.

use std::sync::Arc;

use super::ast::{
    ArrowBody, BinaryOp, Expr, Lambda, LogicalOp, Program, Stmt, TemplateSegment, UnaryOp,
};
use super::lexer::{tokenize, TemplatePiece, Tok, Token};
use crate::error::CellError;

/// Words that cannot be used as binding or parameter names.
pub(crate) const KEYWORDS: &[&str] = &[
    "let", "const", "return", "throw", "true", "false", "null", "undefined", "await",
];

/// Deepest expression nesting a cell may use.
pub const MAX_NESTING: usize = 128;

pub(crate) fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// Parse a cell's full source.
pub fn parse_program(source: &str) -> Result<Program, CellError> {
    let tokens = tokenize(source, 0)?;

    match tokens.first().map(|t| &t.kind) {
        Some(Tok::Eof) | None => return Ok(Program::Expression(Expr::Undefined)),
        Some(Tok::LBrace) => {
            let block_err = match Parser::new(&tokens).block_program() {
                Ok(stmts) => return Ok(Program::Block(stmts)),
                Err(err) => err,
            };
            return match Parser::new(&tokens).expression_program() {
                Ok(expr) => Ok(Program::Expression(expr)),
                Err(expr_err) => Err(furthest(block_err, expr_err)),
            };
        }
        Some(_) => {}
    }

    Parser::new(&tokens).expression_program().map(Program::Expression)
}

fn furthest(a: CellError, b: CellError) -> CellError {
    match (&a, &b) {
        (CellError::Syntax { offset: oa, .. }, CellError::Syntax { offset: ob, .. }) if ob > oa => b,
        _ => a,
    }
}

/// Parse the source of a `${...}` substitution found at `offset`, already
/// `depth` levels deep.
fn parse_embedded(source: &str, offset: usize, depth: usize) -> Result<Expr, CellError> {
    let tokens = tokenize(source, offset)?;
    let mut parser = Parser::new(&tokens);
    parser.depth = depth;
    parser.expression_program()
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    // ------------------------------------------------------------------------
    // Token cursor
    // ------------------------------------------------------------------------

    fn peek_at(&self, ahead: usize) -> &'t Tok {
        let index = (self.pos + ahead).min(self.tokens.len().saturating_sub(1));
        &self.tokens[index].kind
    }

    fn peek(&self) -> &'t Tok {
        self.peek_at(0)
    }

    fn offset(&self) -> usize {
        let index = self.pos.min(self.tokens.len().saturating_sub(1));
        self.tokens[index].offset
    }

    fn advance(&mut self) -> &'t Tok {
        let tok = self.peek();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Tok) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Tok, what: &str) -> Result<(), CellError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn error(&self, message: impl Into<String>) -> CellError {
        CellError::Syntax {
            message: message.into(),
            offset: self.offset(),
        }
    }

    fn unexpected(&self, what: &str) -> CellError {
        match self.peek() {
            Tok::Eof => self.error(format!("unexpected end of input, expected {what}")),
            tok => self.error(format!("unexpected {}, expected {what}", describe(tok))),
        }
    }

    /// Go one level deeper. The caller restores `depth` when it is done.
    fn enter(&mut self) -> Result<(), CellError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!(
                "expression nested deeper than {MAX_NESTING} levels"
            )));
        }
        self.depth += 1;
        Ok(())
    }

    fn nested(&mut self, parse: fn(&mut Self) -> Result<Expr, CellError>) -> Result<Expr, CellError> {
        self.enter()?;
        let expr = parse(self)?;
        self.depth -= 1;
        Ok(expr)
    }

    fn ident(&mut self, what: &str) -> Result<String, CellError> {
        match self.peek() {
            Tok::Ident(name) if !is_keyword(name) => {
                self.pos += 1;
                Ok(name.clone())
            }
            _ => Err(self.unexpected(what)),
        }
    }

    // ------------------------------------------------------------------------
    // Programs and statements
    // ------------------------------------------------------------------------

    fn expression_program(&mut self) -> Result<Expr, CellError> {
        let expr = self.expression()?;
        self.eat(&Tok::Semicolon);
        self.expect(&Tok::Eof, "end of input")?;
        Ok(expr)
    }

    fn block_program(&mut self) -> Result<Vec<Stmt>, CellError> {
        let stmts = self.block()?;
        self.expect(&Tok::Eof, "end of input")?;
        Ok(stmts)
    }

    fn block(&mut self) -> Result<Vec<Stmt>, CellError> {
        self.expect(&Tok::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        loop {
            while self.eat(&Tok::Semicolon) {}
            if self.eat(&Tok::RBrace) {
                return Ok(stmts);
            }
            stmts.push(self.statement()?);
        }
    }

    fn statement(&mut self) -> Result<Stmt, CellError> {
        let stmt = match self.peek() {
            Tok::Ident(word) if word == "let" || word == "const" => {
                self.pos += 1;
                let name = self.ident("a variable name")?;
                self.expect(&Tok::Assign, "`=`")?;
                Stmt::Let {
                    name,
                    value: self.expression()?,
                }
            }
            Tok::Ident(word) if word == "return" => {
                self.pos += 1;
                if matches!(self.peek(), Tok::Semicolon | Tok::RBrace) {
                    Stmt::Return(Expr::Undefined)
                } else {
                    Stmt::Return(self.expression()?)
                }
            }
            Tok::Ident(word) if word == "throw" => {
                self.pos += 1;
                Stmt::Throw(self.expression()?)
            }
            _ => Stmt::Expr(self.expression()?),
        };
        self.eat(&Tok::Semicolon);
        Ok(stmt)
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expr, CellError> {
        self.nested(Self::arrow_or_conditional)
    }

    fn arrow_or_conditional(&mut self) -> Result<Expr, CellError> {
        if let Some(params) = self.arrow_params() {
            return self.arrow(params);
        }
        self.conditional()
    }

    /// Recognise `x =>` or `(a, b) =>` without consuming anything otherwise.
    fn arrow_params(&mut self) -> Option<Vec<String>> {
        match self.peek() {
            Tok::Ident(name) if !is_keyword(name) && *self.peek_at(1) == Tok::Arrow => {
                self.pos += 2;
                Some(vec![name.clone()])
            }
            Tok::LParen => {
                let mut params = Vec::new();
                let mut ahead = 1;
                if *self.peek_at(ahead) != Tok::RParen {
                    loop {
                        match self.peek_at(ahead) {
                            Tok::Ident(name) if !is_keyword(name) => params.push(name.clone()),
                            _ => return None,
                        }
                        ahead += 1;
                        match self.peek_at(ahead) {
                            Tok::Comma => ahead += 1,
                            Tok::RParen => break,
                            _ => return None,
                        }
                    }
                }
                if *self.peek_at(ahead + 1) != Tok::Arrow {
                    return None;
                }
                self.pos += ahead + 2;
                Some(params)
            }
            _ => None,
        }
    }

    fn arrow(&mut self, params: Vec<String>) -> Result<Expr, CellError> {
        let body = if *self.peek() == Tok::LBrace {
            let (start, depth) = (self.pos, self.depth);
            match self.block() {
                Ok(stmts) => ArrowBody::Block(stmts),
                Err(err) if self.depth >= MAX_NESTING => return Err(err),
                Err(_) => {
                    self.pos = start;
                    self.depth = depth;
                    ArrowBody::Expr(self.expression()?)
                }
            }
        } else {
            ArrowBody::Expr(self.expression()?)
        };
        Ok(Expr::Arrow(Arc::new(Lambda { params, body })))
    }

    fn conditional(&mut self) -> Result<Expr, CellError> {
        let test = self.logical_or()?;
        if !self.eat(&Tok::Question) {
            return Ok(test);
        }
        let then = self.expression()?;
        self.expect(&Tok::Colon, "`:`")?;
        let otherwise = self.expression()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn logical_or(&mut self) -> Result<Expr, CellError> {
        let mut left = self.logical_and()?;
        let base = self.depth;
        while self.eat(&Tok::OrOr) {
            self.enter()?;
            let right = self.logical_and()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = base;
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, CellError> {
        let mut left = self.equality()?;
        let base = self.depth;
        while self.eat(&Tok::AndAnd) {
            self.enter()?;
            let right = self.equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = base;
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, CellError> {
        self.binary_level(Self::comparison, |tok| match tok {
            Tok::EqEq => Some(BinaryOp::Eq),
            Tok::NotEq => Some(BinaryOp::NotEq),
            _ => None,
        })
    }

    fn comparison(&mut self) -> Result<Expr, CellError> {
        self.binary_level(Self::additive, |tok| match tok {
            Tok::Lt => Some(BinaryOp::Lt),
            Tok::LtEq => Some(BinaryOp::LtEq),
            Tok::Gt => Some(BinaryOp::Gt),
            Tok::GtEq => Some(BinaryOp::GtEq),
            _ => None,
        })
    }

    fn additive(&mut self) -> Result<Expr, CellError> {
        self.binary_level(Self::multiplicative, |tok| match tok {
            Tok::Plus => Some(BinaryOp::Add),
            Tok::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn multiplicative(&mut self) -> Result<Expr, CellError> {
        self.binary_level(Self::unary, |tok| match tok {
            Tok::Star => Some(BinaryOp::Mul),
            Tok::Slash => Some(BinaryOp::Div),
            Tok::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    /// One left-associative binary precedence level.
    fn binary_level(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr, CellError>,
        operator: fn(&Tok) -> Option<BinaryOp>,
    ) -> Result<Expr, CellError> {
        let mut left = operand(self)?;
        let base = self.depth;
        while let Some(op) = operator(self.peek()) {
            self.enter()?;
            self.pos += 1;
            let right = operand(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = base;
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, CellError> {
        let op = match self.peek() {
            Tok::Minus => UnaryOp::Neg,
            Tok::Plus => UnaryOp::Plus,
            Tok::Bang => UnaryOp::Not,
            Tok::Ident(word) if word == "await" => {
                self.pos += 1;
                return Ok(Expr::Await(Box::new(self.nested(Self::unary)?)));
            }
            _ => return self.postfix(),
        };
        self.pos += 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(self.nested(Self::unary)?),
        })
    }

    fn postfix(&mut self) -> Result<Expr, CellError> {
        let mut expr = self.primary()?;
        let base = self.depth;
        loop {
            if matches!(
                self.peek(),
                Tok::Dot | Tok::LBracket | Tok::LParen | Tok::Template(_)
            ) {
                self.enter()?;
            }
            match self.peek() {
                Tok::Dot => {
                    self.pos += 1;
                    let property = match self.advance() {
                        Tok::Ident(name) => name.clone(),
                        _ => {
                            self.pos -= 1;
                            return Err(self.unexpected("a property name"));
                        }
                    };
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                    };
                }
                Tok::LBracket => {
                    self.pos += 1;
                    let index = self.expression()?;
                    self.expect(&Tok::RBracket, "`]`")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Tok::LParen => {
                    self.pos += 1;
                    let args = self.sequence(&Tok::RParen, "`)`")?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                Tok::Template(pieces) => {
                    self.pos += 1;
                    expr = Expr::TaggedTemplate {
                        tag: Box::new(expr),
                        segments: self.template_segments(pieces)?,
                    };
                }
                _ => {
                    self.depth = base;
                    return Ok(expr);
                }
            }
        }
    }

    /// Comma separated expressions up to `close`; a trailing comma is allowed.
    fn sequence(&mut self, close: &Tok, what: &str) -> Result<Vec<Expr>, CellError> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Ok(items);
            }
            items.push(self.expression()?);
            if !self.eat(&Tok::Comma) {
                self.expect(close, what)?;
                return Ok(items);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, CellError> {
        let expr = match self.peek() {
            Tok::Number(n) => Expr::Number(*n),
            Tok::Str(s) => Expr::Str(s.clone()),
            Tok::Template(pieces) => Expr::Template(self.template_segments(pieces)?),
            Tok::Ident(word) => match word.as_str() {
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                "null" => Expr::Null,
                "undefined" => Expr::Undefined,
                w if is_keyword(w) => return Err(self.error(format!("unexpected keyword `{w}`"))),
                name => Expr::Ident(name.to_string()),
            },
            Tok::LParen => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect(&Tok::RParen, "`)`")?;
                return Ok(inner);
            }
            Tok::LBracket => {
                self.pos += 1;
                return Ok(Expr::List(self.sequence(&Tok::RBracket, "`]`")?));
            }
            Tok::LBrace => {
                self.pos += 1;
                return self.record();
            }
            _ => return Err(self.unexpected("an expression")),
        };
        self.pos += 1;
        Ok(expr)
    }

    fn record(&mut self) -> Result<Expr, CellError> {
        let mut fields = Vec::new();
        loop {
            if self.eat(&Tok::RBrace) {
                return Ok(Expr::Record(fields));
            }
            let (key, shorthand) = match self.peek() {
                Tok::Ident(name) if !is_keyword(name) => (name.clone(), true),
                Tok::Ident(name) | Tok::Str(name) => (name.clone(), false),
                Tok::Number(n) => (crate::value::format_number(*n), false),
                _ => return Err(self.unexpected("a field name")),
            };
            self.pos += 1;

            let value = if self.eat(&Tok::Colon) {
                self.expression()?
            } else if shorthand {
                Expr::Ident(key.clone())
            } else {
                return Err(self.unexpected("`:`"));
            };
            fields.push((key, value));

            if !self.eat(&Tok::Comma) {
                self.expect(&Tok::RBrace, "`}`")?;
                return Ok(Expr::Record(fields));
            }
        }
    }

    fn template_segments(
        &self,
        pieces: &[TemplatePiece],
    ) -> Result<Vec<TemplateSegment>, CellError> {
        pieces
            .iter()
            .map(|piece| match piece {
                TemplatePiece::Text(text) => Ok(TemplateSegment::Text(text.clone())),
                TemplatePiece::Code { source, offset } => {
                    parse_embedded(source, *offset, self.depth).map(TemplateSegment::Expr)
                }
            })
            .collect()
    }
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Number(n) => format!("number {}", crate::value::format_number(*n)),
        Tok::Str(_) => "string".to_string(),
        Tok::Template(_) => "template".to_string(),
        Tok::Ident(name) => format!("`{name}`"),
        Tok::LParen => "`(`".to_string(),
        Tok::RParen => "`)`".to_string(),
        Tok::LBracket => "`[`".to_string(),
        Tok::RBracket => "`]`".to_string(),
        Tok::LBrace => "`{`".to_string(),
        Tok::RBrace => "`}`".to_string(),
        Tok::Comma => "`,`".to_string(),
        Tok::Dot => "`.`".to_string(),
        Tok::Colon => "`:`".to_string(),
        Tok::Semicolon => "`;`".to_string(),
        Tok::Question => "`?`".to_string(),
        Tok::Arrow => "`=>`".to_string(),
        Tok::Assign => "`=`".to_string(),
        Tok::Plus => "`+`".to_string(),
        Tok::Minus => "`-`".to_string(),
        Tok::Star => "`*`".to_string(),
        Tok::Slash => "`/`".to_string(),
        Tok::Percent => "`%`".to_string(),
        Tok::Bang => "`!`".to_string(),
        Tok::EqEq => "`==`".to_string(),
        Tok::NotEq => "`!=`".to_string(),
        Tok::Lt => "`<`".to_string(),
        Tok::LtEq => "`<=`".to_string(),
        Tok::Gt => "`>`".to_string(),
        Tok::GtEq => "`>=`".to_string(),
        Tok::AndAnd => "`&&`".to_string(),
        Tok::OrOr => "`||`".to_string(),
        Tok::Eof => "end of input".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(source: &str) -> Expr {
        match parse_program(source).unwrap() {
            Program::Expression(expr) => expr,
            other => panic!("expected expression, got {other:?}"),
        }
    }

    #[test]
    fn precedence_of_arithmetic() {
        let parsed = expr("1 + 2 * 3");
        let Expr::Binary { op, right, .. } = parsed else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn block_with_return() {
        let program = parse_program("{\n  const data = c1;\n  return data * 2;\n}").unwrap();
        let Program::Block(stmts) = program else {
            panic!("expected block");
        };
        assert_eq!(stmts.len(), 2);
        assert!(matches!(&stmts[0], Stmt::Let { name, .. } if name == "data"));
        assert!(matches!(&stmts[1], Stmt::Return(_)));
    }

    #[test]
    fn record_literal_falls_back_from_block() {
        let parsed = expr(r#"{ name: "A", value: 10 }"#);
        let Expr::Record(fields) = parsed else {
            panic!("expected record");
        };
        assert_eq!(fields[0].0, "name");
        assert_eq!(fields[1].0, "value");
    }

    #[test]
    fn empty_source_is_undefined() {
        assert_eq!(expr("  // nothing here\n"), Expr::Undefined);
    }

    #[test]
    fn arrow_functions() {
        assert!(matches!(expr("x => x * 2"), Expr::Arrow(l) if l.params == ["x"]));
        assert!(matches!(expr("(a, b) => a + b"), Expr::Arrow(l) if l.params == ["a", "b"]));
        assert!(matches!(expr("() => 1"), Expr::Arrow(l) if l.params.is_empty()));
        // A parenthesised expression is not mistaken for parameters.
        assert!(matches!(expr("(a) + 1"), Expr::Binary { .. }));
    }

    #[test]
    fn arrow_with_block_body() {
        let Expr::Arrow(lambda) = expr("(acc, d) => { return acc + d.value }") else {
            panic!("expected arrow");
        };
        assert!(matches!(lambda.body, ArrowBody::Block(_)));
    }

    #[test]
    fn method_call_chain() {
        let parsed = expr("xs.map(x => x + 1).filter(x => x > 2)");
        let Expr::Call { callee, .. } = parsed else {
            panic!("expected call");
        };
        assert!(matches!(*callee, Expr::Member { ref property, .. } if property == "filter"));
    }

    #[test]
    fn tagged_template() {
        let parsed = expr("html`<b>${c0}</b>`");
        let Expr::TaggedTemplate { tag, segments } = parsed else {
            panic!("expected tagged template");
        };
        assert_eq!(*tag, Expr::Ident("html".into()));
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1], TemplateSegment::Expr(Expr::Ident("c0".into())));
    }

    #[test]
    fn syntax_error_points_at_offending_token() {
        let err = parse_program("1 + * 2").unwrap_err();
        assert_eq!(
            err,
            CellError::Syntax {
                message: "unexpected `*`, expected an expression".into(),
                offset: 4
            }
        );
    }

    #[test]
    fn block_error_reported_when_it_got_further() {
        let err = parse_program("{ let x = 1; return x + ; }").unwrap_err();
        let CellError::Syntax { offset, .. } = err else {
            panic!("expected syntax error");
        };
        assert_eq!(offset, 24);
    }

    #[test]
    fn keywords_are_not_identifiers() {
        assert!(parse_program("let").is_err());
        assert!(parse_program("{ let return = 1 }").is_err());
    }

    #[test]
    fn conditional_and_logical() {
        assert!(matches!(expr("a && b ? 1 : 2"), Expr::Conditional { .. }));
        assert!(matches!(expr("a || b && c"), Expr::Logical { op: LogicalOp::Or, .. }));
    }

    fn too_deep(source: &str) -> bool {
        matches!(
            parse_program(source),
            Err(CellError::Syntax { message, .. }) if message.contains("nested deeper")
        )
    }

    #[test]
    fn moderate_nesting_parses() {
        let source = format!("{}1{}", "(".repeat(60), ")".repeat(60));
        assert_eq!(expr(&source), Expr::Number(1.0));
        assert!(parse_program(&format!("[{}1]", "-".repeat(60))).is_ok());
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let depth = 50_000;
        assert!(too_deep(&format!("{}1{}", "(".repeat(depth), ")".repeat(depth))));
        assert!(too_deep(&format!("{}1{}", "[".repeat(depth), "]".repeat(depth))));
        assert!(too_deep(&format!("{}1", "-".repeat(depth))));
        assert!(too_deep(&format!("{}1", "!".repeat(depth))));
        assert!(too_deep(&format!("1{}", " + 1".repeat(depth))));
        assert!(too_deep(&format!("x{}", ".y".repeat(depth))));
        assert!(too_deep(&format!("{}1", "x => ".repeat(depth))));
        assert!(too_deep(&"x => {".repeat(depth)));
    }

    #[test]
    fn nested_template_substitutions_count_towards_depth() {
        let mut source = "1".to_string();
        for _ in 0..MAX_NESTING + 10 {
            source = format!("`${{{source}}}`");
        }
        assert!(too_deep(&source));
    }
}
