//! AST node types for ModScript.

/// Source span for error reporting. `file` indexes the unit's source list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub file: u16,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(file: u16, start: usize, end: usize) -> Self {
        Self { file, start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            file: self.file,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// One parsed source file.
#[derive(Debug, Clone, Default)]
pub struct SourceFileAst {
    pub items: Vec<Item>,
}

/// Top-level or namespace-level item.
#[derive(Debug, Clone)]
pub enum Item {
    Namespace(NamespaceDef),
    Class(ClassDef),
    Function(FnDef),
    /// Only legal at file top level; the resolver rejects it inside a namespace.
    Stmt(Stmt),
}

/// `namespace a.b { ... }`
#[derive(Debug, Clone)]
pub struct NamespaceDef {
    pub path: Vec<String>,
    pub items: Vec<Item>,
    pub span: Span,
}

/// `class Name { let field = expr; fn method() { ... } }`
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<FnDef>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub init: Option<Expr>,
    pub span: Span,
}

/// `fn name(a, b) { ... }`
#[derive(Debug, Clone)]
pub struct FnDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// Statements.
#[derive(Debug, Clone)]
pub enum Stmt {
    Let {
        name: String,
        value: Expr,
        span: Span,
    },
    Assign {
        target: Expr,
        value: Expr,
        span: Span,
    },
    If {
        condition: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
        span: Span,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Block(Vec<Stmt>, Span),
    Expr(Expr),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Let { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Block(_, span) => *span,
            Stmt::Expr(e) => e.span,
        }
    }
}

/// Expressions.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Integer literal: `42`
    IntLit(i64),
    /// Float literal: `1.5`
    FloatLit(f64),
    /// String literal: `"hi"`
    StrLit(String),
    /// Boolean literal: `true`, `false`
    BoolLit(bool),
    Null,
    This,
    /// Name reference: local, global, or the head of a qualified path.
    Ident(String),
    /// Binary operation: `a + b`
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation: `-x`, `!b`
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Call of a bare name: `helper(1, 2)`
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// `object.method(args)`; also `Module.fn(args)` and `ns.fn(args)`
    /// until the resolver decides which.
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    /// `object.field`
    Field {
        object: Box<Expr>,
        field: String,
    },
    /// `new a.b.Type(args)`
    New {
        path: Vec<String>,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Flatten `a.b.c` into `["a", "b", "c"]` when the chain is pure names.
    pub fn as_path(&self) -> Option<Vec<String>> {
        match &self.kind {
            ExprKind::Ident(name) => Some(vec![name.clone()]),
            ExprKind::Field { object, field } => {
                let mut path = object.as_path()?;
                path.push(field.clone());
                Some(path)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}
