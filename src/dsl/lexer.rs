use super::ast::Span;
use super::error::Diagnostic;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,

    // Identifiers & keywords
    Ident(String),
    Namespace,
    Class,
    Fn,
    Let,
    If,
    Else,
    While,
    Return,
    New,
    This,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Semicolon,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Gt,
    Le,        // <=
    Ge,        // >=
    EqEq,      // ==
    Ne,        // !=
    And,       // &&
    Or,        // ||
    Bang,      // !
    Eq,        // =

    Eof,
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Tokenize one source file. `file` is stamped into every span.
pub fn lex(source: &str, file: u16) -> Result<Vec<SpannedToken>, Vec<Diagnostic>> {
    let mut lexer = Lexer::new(source, file);
    lexer.tokenize()
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    file: u16,
    pos: usize,
    tokens: Vec<SpannedToken>,
    errors: Vec<Diagnostic>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, file: u16) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            file,
            pos: 0,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn span(&self, start: usize, end: usize) -> Span {
        Span::new(self.file, start, end)
    }

    fn tokenize(&mut self) -> Result<Vec<SpannedToken>, Vec<Diagnostic>> {
        while self.pos < self.bytes.len() {
            self.skip_whitespace_and_comments();
            if self.pos >= self.bytes.len() {
                break;
            }

            let start = self.pos;
            let ch = self.bytes[self.pos];

            match ch {
                b'(' => { self.pos += 1; self.push(Token::LParen, start); }
                b')' => { self.pos += 1; self.push(Token::RParen, start); }
                b'{' => { self.pos += 1; self.push(Token::LBrace, start); }
                b'}' => { self.pos += 1; self.push(Token::RBrace, start); }
                b',' => { self.pos += 1; self.push(Token::Comma, start); }
                b'.' => { self.pos += 1; self.push(Token::Dot, start); }
                b';' => { self.pos += 1; self.push(Token::Semicolon, start); }
                b'+' => { self.pos += 1; self.push(Token::Plus, start); }
                b'-' => { self.pos += 1; self.push(Token::Minus, start); }
                b'*' => { self.pos += 1; self.push(Token::Star, start); }
                b'/' => { self.pos += 1; self.push(Token::Slash, start); }
                b'%' => { self.pos += 1; self.push(Token::Percent, start); }
                b'|' => {
                    self.pos += 1;
                    if self.peek() == Some(b'|') {
                        self.pos += 1;
                        self.push(Token::Or, start);
                    } else {
                        self.errors.push(Diagnostic::lexer(
                            "Expected '||' for logical OR",
                            self.span(start, self.pos),
                        ));
                    }
                }
                b'&' => {
                    self.pos += 1;
                    if self.peek() == Some(b'&') {
                        self.pos += 1;
                        self.push(Token::And, start);
                    } else {
                        self.errors.push(Diagnostic::lexer(
                            "Expected '&&' for logical AND",
                            self.span(start, self.pos),
                        ));
                    }
                }
                b'<' => self.one_or_two(start, Token::Lt, Token::Le),
                b'>' => self.one_or_two(start, Token::Gt, Token::Ge),
                b'=' => self.one_or_two(start, Token::Eq, Token::EqEq),
                b'!' => self.one_or_two(start, Token::Bang, Token::Ne),
                b'"' => {
                    self.pos += 1;
                    self.lex_string(start);
                }
                b'0'..=b'9' => {
                    self.lex_number(start);
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                    self.lex_ident(start);
                }
                _ => {
                    let ch = self.source[start..].chars().next().unwrap_or('?');
                    self.errors.push(Diagnostic::lexer(
                        format!("Unexpected character: '{ch}'"),
                        self.span(start, start + ch.len_utf8()),
                    ));
                    self.pos += ch.len_utf8();
                }
            }
        }

        self.tokens.push(SpannedToken {
            token: Token::Eof,
            span: self.span(self.pos, self.pos),
        });

        if self.errors.is_empty() {
            Ok(std::mem::take(&mut self.tokens))
        } else {
            Err(std::mem::take(&mut self.errors))
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn push(&mut self, token: Token, start: usize) {
        let span = self.span(start, self.pos);
        self.tokens.push(SpannedToken { token, span });
    }

    /// `<` vs `<=`, `=` vs `==`, `!` vs `!=`: the second form always ends in '='.
    fn one_or_two(&mut self, start: usize, single: Token, with_eq: Token) {
        self.pos += 1;
        if self.peek() == Some(b'=') {
            self.pos += 1;
            self.push(with_eq, start);
        } else {
            self.push(single, start);
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b' ' | b'\t' | b'\n' | b'\r' => self.pos += 1,
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        if self.pos + 1 >= self.bytes.len() {
                            self.pos = self.bytes.len();
                            self.errors.push(Diagnostic::lexer(
                                "Unterminated block comment",
                                self.span(start, self.pos),
                            ));
                            break;
                        }
                        if self.bytes[self.pos] == b'*' && self.bytes[self.pos + 1] == b'/' {
                            self.pos += 2;
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_string(&mut self, start: usize) {
        let mut value = String::new();
        let mut terminated = false;
        let mut end = self.bytes.len();
        let mut chars = self.source[self.pos..].char_indices();
        while let Some((offset, ch)) = chars.next() {
            match ch {
                '"' => {
                    end = self.pos + offset + 1;
                    terminated = true;
                    break;
                }
                '\n' => {
                    end = self.pos + offset;
                    break;
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\\')) => value.push('\\'),
                    Some((esc_offset, other)) => {
                        let at = self.pos + esc_offset;
                        self.errors.push(Diagnostic::lexer(
                            format!("Unknown escape sequence: '\\{other}'"),
                            self.span(at - 1, at + other.len_utf8()),
                        ));
                    }
                    None => break,
                },
                other => value.push(other),
            }
        }
        self.pos = end;
        if !terminated {
            self.errors.push(Diagnostic::lexer(
                "Unterminated string literal",
                self.span(start, self.pos),
            ));
        }
        self.push(Token::Str(value), start);
    }

    fn lex_number(&mut self, start: usize) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        // Check for decimal point
        if self.pos < self.bytes.len() && self.bytes[self.pos] == b'.'
            && self.bytes.get(self.pos + 1).is_some_and(u8::is_ascii_digit)
        {
            self.pos += 1; // skip '.'
            while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
            let text = &self.source[start..self.pos];
            match text.parse::<f64>() {
                Ok(v) => self.push(Token::Float(v), start),
                Err(_) => self.errors.push(Diagnostic::lexer(
                    format!("Invalid float: {text}"),
                    self.span(start, self.pos),
                )),
            }
        } else {
            let text = &self.source[start..self.pos];
            match text.parse::<i64>() {
                Ok(v) => self.push(Token::Int(v), start),
                Err(_) => self.errors.push(Diagnostic::lexer(
                    format!("Integral constant is too large: {text}"),
                    self.span(start, self.pos),
                )),
            }
        }
    }

    fn lex_ident(&mut self, start: usize) {
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_alphanumeric() || self.bytes[self.pos] == b'_')
        {
            self.pos += 1;
        }
        let word = &self.source[start..self.pos];
        let token = match word {
            "namespace" => Token::Namespace,
            "class" => Token::Class,
            "fn" => Token::Fn,
            "let" => Token::Let,
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "return" => Token::Return,
            "new" => Token::New,
            "this" => Token::This,
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            _ => Token::Ident(word.to_string()),
        };
        self.push(token, start);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn tok(s: &str) -> Vec<Token> {
        lex(s, 0).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn simple_tokens() {
        let tokens = tok("1 + 2.0;");
        assert_eq!(tokens, vec![
            Token::Int(1), Token::Plus, Token::Float(2.0), Token::Semicolon, Token::Eof,
        ]);
    }

    #[test]
    fn keywords() {
        let tokens = tok("namespace class fn let if else while return new this");
        assert_eq!(tokens, vec![
            Token::Namespace, Token::Class, Token::Fn, Token::Let, Token::If, Token::Else,
            Token::While, Token::Return, Token::New, Token::This, Token::Eof,
        ]);
    }

    #[test]
    fn operators() {
        let tokens = tok("+ - * / % < > <= >= == != && || ! =");
        assert_eq!(tokens, vec![
            Token::Plus, Token::Minus, Token::Star, Token::Slash, Token::Percent,
            Token::Lt, Token::Gt, Token::Le, Token::Ge, Token::EqEq, Token::Ne,
            Token::And, Token::Or, Token::Bang, Token::Eq, Token::Eof,
        ]);
    }

    #[test]
    fn string_escapes() {
        let tokens = tok(r#""a\tb\n\"c\"""#);
        assert_eq!(tokens, vec![Token::Str("a\tb\n\"c\"".into()), Token::Eof]);
    }

    #[test]
    fn unterminated_string_is_error() {
        let errors = lex("let s = \"abc;\nlet t = 1;", 0).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("Unterminated string"));
    }

    #[test]
    fn comments_stripped() {
        let tokens = tok("x // line\n/* block\n comment */ y");
        assert_eq!(tokens, vec![
            Token::Ident("x".into()), Token::Ident("y".into()), Token::Eof,
        ]);
    }

    #[test]
    fn unterminated_block_comment_is_error() {
        assert!(lex("x /* never closed", 0).is_err());
    }

    #[test]
    fn literals() {
        let tokens = tok("true false null 42 3.25");
        assert_eq!(tokens, vec![
            Token::True, Token::False, Token::Null, Token::Int(42), Token::Float(3.25), Token::Eof,
        ]);
    }

    #[test]
    fn member_access_after_int_is_not_float() {
        let tokens = tok("1.x");
        assert_eq!(tokens, vec![
            Token::Int(1), Token::Dot, Token::Ident("x".into()), Token::Eof,
        ]);
    }

    #[test]
    fn unexpected_character_reported_with_span() {
        let errors = lex("let a = 1 # 2;", 3).unwrap_err();
        assert_eq!(errors[0].span, Span::new(3, 10, 11));
    }

    #[test]
    fn spans_carry_file_index() {
        let tokens = lex("abc", 7).unwrap();
        assert_eq!(tokens[0].span, Span::new(7, 0, 3));
    }
}
