use super::ast::*;
use super::error::Diagnostic;
use super::lexer::{SpannedToken, Token};

/// Deepest nesting of expressions and blocks the parser accepts. Later passes
/// walk the tree recursively, so this bounds their native stack use too.
pub const MAX_NESTING: usize = 64;

pub fn parse(tokens: Vec<SpannedToken>) -> Result<SourceFileAst, Vec<Diagnostic>> {
    let mut parser = Parser::new(tokens);
    parser.parse_file()
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    depth: usize,
    errors: Vec<Diagnostic>,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            errors: Vec::new(),
        }
    }

    fn parse_file(&mut self) -> Result<SourceFileAst, Vec<Diagnostic>> {
        let mut items = Vec::new();
        self.skip_terminators();
        while !self.at_eof() {
            if matches!(self.peek(), Token::RBrace) {
                self.errors.push(Diagnostic::parser(
                    "Unexpected '}' with no matching '{'",
                    self.span(),
                ));
                self.advance();
            } else if let Some(item) = self.parse_item() {
                items.push(item);
            }
            self.skip_terminators();
        }

        if self.errors.is_empty() {
            Ok(SourceFileAst { items })
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    /// Parse one item, recording the error and resynchronizing on failure.
    fn parse_item(&mut self) -> Option<Item> {
        let start = self.pos;
        let depth = self.depth;
        let result = match self.peek() {
            Token::Namespace => self.parse_namespace().map(Item::Namespace),
            Token::Class => self.parse_class().map(Item::Class),
            Token::Fn => self.parse_fn_def().map(Item::Function),
            _ => self.parse_stmt().map(Item::Stmt),
        };
        match result {
            Ok(item) => Some(item),
            Err(e) => {
                self.depth = depth;
                self.errors.push(e);
                self.synchronize(start);
                None
            }
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).map_or(&Token::Eof, |t| &t.token)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(Span::default(), |t| t.span)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<Span, Diagnostic> {
        if self.peek() == expected {
            let sp = self.span();
            self.advance();
            Ok(sp)
        } else {
            Err(Diagnostic::parser(
                format!("Expected {what}, got {}", describe(self.peek())),
                self.span(),
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span), Diagnostic> {
        if let Token::Ident(name) = self.peek().clone() {
            let sp = self.span();
            self.advance();
            Ok((name, sp))
        } else {
            Err(Diagnostic::parser(
                format!("Expected identifier, got {}", describe(self.peek())),
                self.span(),
            ))
        }
    }

    fn descend(&mut self) -> Result<(), Diagnostic> {
        if self.depth >= MAX_NESTING {
            return Err(Diagnostic::parser(
                format!("Expression or block nested too deeply (limit {MAX_NESTING})"),
                self.span(),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, Diagnostic>) -> Result<T, Diagnostic> {
        self.descend()?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn skip_terminators(&mut self) {
        while matches!(self.peek(), Token::Semicolon) {
            self.advance();
        }
    }

    fn expect_terminator(&mut self) -> Result<(), Diagnostic> {
        match self.peek() {
            Token::Semicolon => {
                self.advance();
                Ok(())
            }
            Token::Eof | Token::RBrace => Ok(()),
            other => Err(Diagnostic::parser(
                format!("Expected ';', got {}", describe(other)),
                self.span(),
            )),
        }
    }

    /// Skip to a likely item boundary. Always consumes at least one token.
    fn synchronize(&mut self, start: usize) {
        loop {
            match self.peek() {
                Token::Eof => break,
                Token::Semicolon | Token::RBrace => {
                    self.advance();
                    break;
                }
                Token::Namespace | Token::Class | Token::Fn if self.pos > start => break,
                _ => self.advance(),
            }
        }
    }

    // ── Items ─────────────────────────────────────────────────────

    fn parse_namespace(&mut self) -> Result<NamespaceDef, Diagnostic> {
        let start = self.span();
        self.expect(&Token::Namespace, "'namespace'")?;
        let (first, _) = self.expect_ident()?;
        let mut path = vec![first];
        while matches!(self.peek(), Token::Dot) {
            self.advance();
            let (segment, _) = self.expect_ident()?;
            path.push(segment);
        }
        self.expect(&Token::LBrace, "'{' after namespace name")?;
        self.skip_terminators();

        let items = self.nested(|p| {
            let mut items = Vec::new();
            while !matches!(p.peek(), Token::RBrace | Token::Eof) {
                if let Some(item) = p.parse_item() {
                    items.push(item);
                }
                p.skip_terminators();
            }
            Ok(items)
        })?;
        let end_span = self.span();
        self.expect(&Token::RBrace, "'}' to close namespace")?;

        Ok(NamespaceDef {
            path,
            items,
            span: start.merge(end_span),
        })
    }

    fn parse_class(&mut self) -> Result<ClassDef, Diagnostic> {
        let start = self.span();
        self.expect(&Token::Class, "'class'")?;
        let (name, _) = self.expect_ident()?;
        self.expect(&Token::LBrace, "'{' after class name")?;
        self.skip_terminators();

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !matches!(self.peek(), Token::RBrace | Token::Eof) {
            match self.peek() {
                Token::Let => {
                    let field_start = self.span();
                    self.advance();
                    let (field_name, _) = self.expect_ident()?;
                    let init = if matches!(self.peek(), Token::Eq) {
                        self.advance();
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    let end_span = self.span();
                    self.expect(&Token::Semicolon, "';' after field declaration")?;
                    fields.push(FieldDef {
                        name: field_name,
                        init,
                        span: field_start.merge(end_span),
                    });
                }
                Token::Fn => methods.push(self.parse_fn_def()?),
                other => {
                    return Err(Diagnostic::parser(
                        format!("Expected 'let' or 'fn' in class body, got {}", describe(other)),
                        self.span(),
                    ));
                }
            }
            self.skip_terminators();
        }
        let end_span = self.span();
        self.expect(&Token::RBrace, "'}' to close class")?;

        Ok(ClassDef {
            name,
            fields,
            methods,
            span: start.merge(end_span),
        })
    }

    fn parse_fn_def(&mut self) -> Result<FnDef, Diagnostic> {
        let start = self.span();
        self.expect(&Token::Fn, "'fn'")?;
        let (name, _) = self.expect_ident()?;
        self.expect(&Token::LParen, "'(' after function name")?;

        let mut params = Vec::new();
        while !matches!(self.peek(), Token::RParen | Token::Eof) {
            let (pname, _) = self.expect_ident()?;
            params.push(pname);
            if matches!(self.peek(), Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::RParen, "')' after parameters")?;

        self.expect(&Token::LBrace, "'{' to open function body")?;
        let body = self.nested(Self::parse_block)?;
        let end_span = self.span();
        self.expect(&Token::RBrace, "'}' to close function body")?;

        Ok(FnDef {
            name,
            params,
            body,
            span: start.merge(end_span),
        })
    }

    // ── Statements ────────────────────────────────────────────────

    /// Parse statements up to (not including) the closing `}`.
    fn parse_block(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        let mut stmts = Vec::new();
        self.skip_terminators();
        while !matches!(self.peek(), Token::RBrace | Token::Eof) {
            stmts.push(self.parse_stmt()?);
            self.skip_terminators();
        }
        Ok(stmts)
    }

    fn parse_braced_block(&mut self) -> Result<(Vec<Stmt>, Span), Diagnostic> {
        self.expect(&Token::LBrace, "'{'")?;
        let body = self.nested(Self::parse_block)?;
        let end_span = self.span();
        self.expect(&Token::RBrace, "'}'")?;
        Ok((body, end_span))
    }

    fn parse_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.span();
        match self.peek() {
            Token::Let => {
                self.advance();
                let (name, _) = self.expect_ident()?;
                self.expect(&Token::Eq, "'=' in let binding")?;
                let value = self.parse_expr()?;
                let end_span = value.span;
                self.expect_terminator()?;
                Ok(Stmt::Let {
                    name,
                    value,
                    span: start.merge(end_span),
                })
            }
            Token::If => self.parse_if(),
            Token::While => {
                self.advance();
                let condition = self.parse_expr()?;
                let (body, end_span) = self.parse_braced_block()?;
                Ok(Stmt::While {
                    condition,
                    body,
                    span: start.merge(end_span),
                })
            }
            Token::Return => {
                self.advance();
                let value = if matches!(self.peek(), Token::Semicolon | Token::RBrace | Token::Eof) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                let end_span = value.as_ref().map_or(start, |v| v.span);
                self.expect_terminator()?;
                Ok(Stmt::Return {
                    value,
                    span: start.merge(end_span),
                })
            }
            Token::LBrace => {
                let (body, end_span) = self.parse_braced_block()?;
                Ok(Stmt::Block(body, start.merge(end_span)))
            }
            _ => {
                let expr = self.parse_expr()?;
                if matches!(self.peek(), Token::Eq) {
                    self.advance();
                    if !matches!(expr.kind, ExprKind::Ident(_) | ExprKind::Field { .. }) {
                        return Err(Diagnostic::parser(
                            "The left-hand side of an assignment must be a variable or field",
                            expr.span,
                        ));
                    }
                    let value = self.parse_expr()?;
                    let span = expr.span.merge(value.span);
                    self.expect_terminator()?;
                    return Ok(Stmt::Assign {
                        target: expr,
                        value,
                        span,
                    });
                }
                // Don't require terminator at RBrace or Eof (trailing expression)
                self.expect_terminator()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, Diagnostic> {
        let start = self.span();
        self.expect(&Token::If, "'if'")?;
        let condition = self.parse_expr()?;
        let (then_body, mut end_span) = self.parse_braced_block()?;

        let else_body = if matches!(self.peek(), Token::Else) {
            self.advance();
            if matches!(self.peek(), Token::If) {
                // else if: parse as a single-element block
                let nested = self.nested(Self::parse_if)?;
                end_span = nested.span();
                Some(vec![nested])
            } else {
                let (body, else_end) = self.parse_braced_block()?;
                end_span = else_end;
                Some(body)
            }
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_body,
            else_body,
            span: start.merge(end_span),
        })
    }

    // ── Expression parsing (precedence climbing) ──────────────────

    fn parse_expr(&mut self) -> Result<Expr, Diagnostic> {
        self.nested(Self::parse_or)
    }

    fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        let span = left.span.merge(right.span);
        Expr {
            kind: ExprKind::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        }
    }

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.parse_and()?;
        let base = self.depth;
        while matches!(self.peek(), Token::Or) {
            self.descend()?;
            self.advance();
            let right = self.parse_and()?;
            left = Self::binary(BinOp::Or, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.parse_equality()?;
        let base = self.depth;
        while matches!(self.peek(), Token::And) {
            self.descend()?;
            self.advance();
            let right = self.parse_equality()?;
            left = Self::binary(BinOp::And, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.parse_comparison()?;
        let base = self.depth;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                _ => break,
            };
            self.descend()?;
            self.advance();
            let right = self.parse_comparison()?;
            left = Self::binary(op, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.parse_add()?;
        let base = self.depth;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Gt => BinOp::Gt,
                Token::Le => BinOp::Le,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.descend()?;
            self.advance();
            let right = self.parse_add()?;
            left = Self::binary(op, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_add(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.parse_mul()?;
        let base = self.depth;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.descend()?;
            self.advance();
            let right = self.parse_mul()?;
            left = Self::binary(op, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_mul(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.parse_unary()?;
        let base = self.depth;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.descend()?;
            self.advance();
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right);
        }
        self.depth = base;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Bang => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        let start = self.span();
        self.advance();
        let operand = self.nested(Self::parse_unary)?;
        let span = start.merge(operand.span);
        Ok(Expr {
            kind: ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            span,
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_primary()?;
        let base = self.depth;

        loop {
            match self.peek() {
                Token::Dot => {
                    self.descend()?;
                    self.advance();
                    let (field, field_span) = self.expect_ident()?;
                    // Check if it's a method call: obj.method(args)
                    if matches!(self.peek(), Token::LParen) {
                        self.advance();
                        let args = self.parse_args()?;
                        let span = expr.span.merge(self.previous_span()).merge(field_span);
                        expr = Expr {
                            kind: ExprKind::MethodCall {
                                object: Box::new(expr),
                                method: field,
                                args,
                            },
                            span,
                        };
                    } else {
                        let span = expr.span.merge(field_span);
                        expr = Expr {
                            kind: ExprKind::Field {
                                object: Box::new(expr),
                                field,
                            },
                            span,
                        };
                    }
                }
                Token::LParen if matches!(expr.kind, ExprKind::Ident(_)) => {
                    if let ExprKind::Ident(name) = &expr.kind {
                        let name = name.clone();
                        self.descend()?;
                        self.advance();
                        let args = self.parse_args()?;
                        let span = expr.span.merge(self.previous_span());
                        expr = Expr {
                            kind: ExprKind::Call { name, args },
                            span,
                        };
                    }
                }
                _ => break,
            }
        }
        self.depth = base;

        Ok(expr)
    }

    fn previous_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or_else(|| self.span(), |t| t.span)
    }

    /// Parse call arguments after the opening `(`, consuming the closing `)`.
    fn parse_args(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        let mut args = Vec::new();
        if !matches!(self.peek(), Token::RParen) {
            args.push(self.parse_expr()?);
            while matches!(self.peek(), Token::Comma) {
                self.advance();
                args.push(self.parse_expr()?);
            }
        }
        self.expect(&Token::RParen, "')' after arguments")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let span = self.span();
        let kind = match self.peek().clone() {
            Token::Int(v) => ExprKind::IntLit(v),
            Token::Float(v) => ExprKind::FloatLit(v),
            Token::Str(s) => ExprKind::StrLit(s),
            Token::True => ExprKind::BoolLit(true),
            Token::False => ExprKind::BoolLit(false),
            Token::Null => ExprKind::Null,
            Token::This => ExprKind::This,
            Token::Ident(name) => ExprKind::Ident(name),
            Token::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                return Ok(expr);
            }
            Token::New => return self.parse_new(),
            other => {
                return Err(Diagnostic::parser(
                    format!("Unexpected token: {}", describe(&other)),
                    span,
                ));
            }
        };
        self.advance();
        Ok(Expr { kind, span })
    }

    fn parse_new(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.span();
        self.expect(&Token::New, "'new'")?;
        let (first, _) = self.expect_ident()?;
        let mut path = vec![first];
        while matches!(self.peek(), Token::Dot) {
            self.advance();
            let (segment, _) = self.expect_ident()?;
            path.push(segment);
        }
        self.expect(&Token::LParen, "'(' after type name")?;
        let args = self.parse_args()?;
        Ok(Expr {
            kind: ExprKind::New { path, args },
            span: start.merge(self.previous_span()),
        })
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Eof => "end of file".to_string(),
        Token::Ident(name) => format!("identifier '{name}'"),
        Token::Str(_) => "string literal".to_string(),
        Token::Int(v) => format!("'{v}'"),
        Token::Float(v) => format!("'{v}'"),
        Token::LBrace => "'{'".to_string(),
        Token::RBrace => "'}'".to_string(),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::Semicolon => "';'".to_string(),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::dsl::lexer::lex;

    fn parse_str(s: &str) -> SourceFileAst {
        let tokens = lex(s, 0).unwrap();
        parse(tokens).unwrap()
    }

    fn parse_err(s: &str) -> Vec<Diagnostic> {
        let tokens = lex(s, 0).unwrap();
        parse(tokens).unwrap_err()
    }

    #[test]
    fn parse_expression_statement() {
        let file = parse_str("1 + 1;");
        assert_eq!(file.items.len(), 1);
        assert!(matches!(
            &file.items[0],
            Item::Stmt(Stmt::Expr(Expr { kind: ExprKind::BinOp { op: BinOp::Add, .. }, .. }))
        ));
    }

    #[test]
    fn trailing_expression_needs_no_semicolon() {
        let file = parse_str("let x = 2;\nx * 3");
        assert_eq!(file.items.len(), 2);
    }

    #[test]
    fn parse_namespace_with_class() {
        let file = parse_str(
            "namespace script {\n  class Main {\n    let count = 0;\n    fn init() { this.count = 1; }\n  }\n}",
        );
        let Item::Namespace(ns) = &file.items[0] else { panic!("expected namespace") };
        assert_eq!(ns.path, vec!["script"]);
        let Item::Class(class) = &ns.items[0] else { panic!("expected class") };
        assert_eq!(class.name, "Main");
        assert_eq!(class.fields.len(), 1);
        assert_eq!(class.methods[0].name, "init");
        assert!(matches!(class.methods[0].body[0], Stmt::Assign { .. }));
    }

    #[test]
    fn parse_dotted_namespace() {
        let file = parse_str("namespace a.b { fn f() { return 1; } }");
        let Item::Namespace(ns) = &file.items[0] else { panic!("expected namespace") };
        assert_eq!(ns.path, vec!["a", "b"]);
    }

    #[test]
    fn parse_new_with_qualified_path() {
        let file = parse_str("let g = new lib.Greeter(\"x\");");
        let Item::Stmt(Stmt::Let { value, .. }) = &file.items[0] else { panic!("expected let") };
        let ExprKind::New { path, args } = &value.kind else { panic!("expected new") };
        assert_eq!(path, &vec!["lib".to_string(), "Greeter".to_string()]);
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn parse_method_call_chain() {
        let file = parse_str("Console.print(Math.sqrt(4));");
        let Item::Stmt(Stmt::Expr(expr)) = &file.items[0] else { panic!("expected expr") };
        let ExprKind::MethodCall { object, method, args } = &expr.kind else { panic!("expected call") };
        assert_eq!(method, "print");
        assert_eq!(object.as_path(), Some(vec!["Console".to_string()]));
        assert!(matches!(args[0].kind, ExprKind::MethodCall { .. }));
    }

    #[test]
    fn parse_if_else_if() {
        let file = parse_str("if a { 1; } else if b { 2; } else { 3; }");
        let Item::Stmt(Stmt::If { else_body: Some(else_body), .. }) = &file.items[0] else {
            panic!("expected if")
        };
        assert!(matches!(else_body[0], Stmt::If { else_body: Some(_), .. }));
    }

    #[test]
    fn parse_while_and_return() {
        let file = parse_str("fn count(n) { let i = 0; while i < n { i = i + 1; } return i; }");
        let Item::Function(f) = &file.items[0] else { panic!("expected fn") };
        assert_eq!(f.params, vec!["n"]);
        assert_eq!(f.body.len(), 3);
        assert!(matches!(f.body[2], Stmt::Return { value: Some(_), .. }));
    }

    #[test]
    fn precedence_mul_over_add() {
        let file = parse_str("1 + 2 * 3;");
        let Item::Stmt(Stmt::Expr(expr)) = &file.items[0] else { panic!("expected expr") };
        let ExprKind::BinOp { op, right, .. } = &expr.kind else { panic!("expected binop") };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(right.kind, ExprKind::BinOp { op: BinOp::Mul, .. }));
    }

    #[test]
    fn unmatched_brace_is_error() {
        let errors = parse_err("namespace script { class Main { fn init() { 1; } }");
        assert!(!errors.is_empty());
        assert!(errors[0].message.contains("end of file"));
    }

    #[test]
    fn stray_closing_brace_is_error() {
        let errors = parse_err("1; }");
        assert!(errors[0].message.contains("no matching"));
    }

    #[test]
    fn invalid_assignment_target() {
        let errors = parse_err("1 + 2 = 3;");
        assert!(errors[0].message.contains("left-hand side"));
    }

    #[test]
    fn recovers_and_reports_multiple_errors() {
        let errors = parse_err("let = 1;\nlet y = ;\nlet z = 3;");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = format!("{}1{};", "(".repeat(5_000), ")".repeat(5_000));
        let errors = parse_err(&deep);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("nested too deeply"));

        let blocks = format!("fn f() {{ {}{} }}", "{".repeat(5_000), "}".repeat(5_000));
        assert!(parse_err(&blocks)[0].message.contains("nested too deeply"));

        let unary = format!("{}1;", "-".repeat(5_000));
        assert!(parse_err(&unary)[0].message.contains("nested too deeply"));

        let chain = format!("x{};", ".f".repeat(5_000));
        assert!(parse_err(&chain)[0].message.contains("nested too deeply"));
    }

    #[test]
    fn nesting_below_the_limit_parses() {
        let ok = format!("{}1{};", "(".repeat(20), ")".repeat(20));
        assert_eq!(parse_str(&ok).items.len(), 1);
        let sum = format!("0{};", " + 1".repeat(40));
        assert_eq!(parse_str(&sum).items.len(), 1);
        // Depth is released after each item.
        let many = "((((1))));".repeat(200);
        assert_eq!(parse_str(&many).items.len(), 200);
    }

    #[test]
    fn missing_semicolon_between_statements() {
        let errors = parse_err("let a = 1 let b = 2;");
        assert!(errors[0].message.contains("Expected ';'"));
    }
}
