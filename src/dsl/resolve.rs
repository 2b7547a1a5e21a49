//! Name resolution: turns parsed files into a [`ResolvedUnit`] whose every
//! reference is an index into the program tables.
//!
//! Declarations from all files of a unit are collected before any body is
//! resolved, so a file may use types and functions declared in a later one.

use std::collections::HashMap;

use indexmap::IndexMap;

use super::ast::*;
use super::error::Diagnostic;
use super::program::{Class, Program};
use super::value::Value;
use crate::engine::modules::Arity;

/// Name given to the class constructor method.
pub const CONSTRUCTOR: &str = "init";

/// Answer to "what is `module.function`?" from the host module registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostLookup {
    Found(Arity),
    /// The module is allowed but has no such function.
    MissingFunction,
    /// The module is loaded in the host but not allowed for this engine.
    NotAllowed,
    /// The module is allowed but the host has dropped it.
    Unloaded,
    NotAModule,
}

pub trait ModuleScope {
    fn lookup(&self, module: &str, function: &str) -> HostLookup;
}

/// Everything resolution reads besides the source.
pub struct ResolveEnv<'a> {
    pub program: &'a Program,
    pub modules: &'a dyn ModuleScope,
    /// 0 = no warnings, 1 = unreachable code, 2 = also unused locals.
    pub warning_level: u8,
}

#[derive(Debug, Clone)]
pub struct RExpr {
    pub kind: RExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum RExprKind {
    Const(Value),
    LoadLocal(u16),
    LoadGlobal(u32),
    LoadThis,
    GetField {
        object: Box<RExpr>,
        field: String,
    },
    BinOp {
        op: BinOp,
        left: Box<RExpr>,
        right: Box<RExpr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<RExpr>,
    },
    Call {
        func: usize,
        args: Vec<RExpr>,
    },
    CallMethod {
        object: Box<RExpr>,
        method: String,
        args: Vec<RExpr>,
    },
    CallHost {
        module: String,
        function: String,
        args: Vec<RExpr>,
    },
    New {
        class: usize,
        args: Vec<RExpr>,
    },
}

#[derive(Debug, Clone)]
pub enum RStmt {
    StoreLocal {
        slot: u16,
        value: RExpr,
    },
    StoreGlobal {
        id: u32,
        value: RExpr,
    },
    SetField {
        object: RExpr,
        field: String,
        value: RExpr,
    },
    If {
        condition: RExpr,
        then_body: Vec<RStmt>,
        else_body: Vec<RStmt>,
    },
    While {
        condition: RExpr,
        body: Vec<RStmt>,
    },
    Return(Option<RExpr>),
    Expr(RExpr),
}

#[derive(Debug, Clone)]
pub struct RFunction {
    pub name: String,
    pub arity: usize,
    pub body: Vec<RStmt>,
    pub local_count: u16,
}

impl RFunction {
    fn new(name: String, arity: usize) -> Self {
        Self {
            name,
            arity,
            body: Vec::new(),
            local_count: 0,
        }
    }
}

/// A resolved compilation unit, ready for bytecode generation.
///
/// Function and class indices are absolute: entry `i` of `functions` has id
/// `function_base + i`.
#[derive(Debug, Clone, Default)]
pub struct ResolvedUnit {
    pub function_base: usize,
    pub functions: Vec<RFunction>,
    pub class_base: usize,
    pub classes: Vec<Class>,
    /// Free functions declared by this unit: qualified name → id.
    pub function_names: Vec<(String, usize)>,
    /// Globals this unit introduces (redeclared ones keep their slot).
    pub globals: Vec<(String, u32)>,
    pub top_level: Vec<RStmt>,
    pub top_level_locals: u16,
    /// The last top-level statement is an expression whose value is the result.
    pub returns_value: bool,
}

/// Resolve all files of one unit against the linked program.
pub fn resolve(files: &[SourceFileAst], env: &ResolveEnv<'_>) -> (ResolvedUnit, Vec<Diagnostic>) {
    let mut resolver = Resolver::new(env);
    for file in files {
        resolver.declare_items(&file.items, &[]);
    }
    resolver.function_cursor = 0;
    resolver.class_cursor = 0;
    for file in files {
        resolver.resolve_items(&file.items, &[]);
    }
    resolver.finish()
}

#[derive(Debug)]
struct Local {
    name: String,
    slot: u16,
    used: bool,
    span: Span,
}

/// Per-body state, swapped out while a nested function body is resolved.
#[derive(Debug, Default)]
struct BodyState {
    scopes: Vec<Vec<Local>>,
    next_slot: u16,
    max_slot: u16,
    in_function: bool,
    /// Absolute id of the class whose member is being resolved.
    class: Option<usize>,
}

struct Resolver<'a> {
    env: &'a ResolveEnv<'a>,
    unit: ResolvedUnit,
    unit_functions: HashMap<String, usize>,
    unit_classes: HashMap<String, usize>,
    unit_globals: HashMap<String, u32>,
    next_global: u32,
    function_cursor: usize,
    class_cursor: usize,
    namespace: Vec<String>,
    body: BodyState,
    top_locals_max: u16,
    diagnostics: Vec<Diagnostic>,
}

fn qualify(namespace: &[String], name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{name}", namespace.join("."))
    }
}

fn expr(kind: RExprKind, span: Span) -> RExpr {
    RExpr { kind, span }
}

impl<'a> Resolver<'a> {
    fn new(env: &'a ResolveEnv<'a>) -> Self {
        let next_global = u32::try_from(env.program.global_count()).unwrap_or(u32::MAX);
        Self {
            env,
            unit: ResolvedUnit {
                function_base: env.program.functions.len(),
                class_base: env.program.classes.len(),
                ..ResolvedUnit::default()
            },
            unit_functions: HashMap::new(),
            unit_classes: HashMap::new(),
            unit_globals: HashMap::new(),
            next_global,
            function_cursor: 0,
            class_cursor: 0,
            namespace: Vec::new(),
            body: BodyState::default(),
            top_locals_max: 0,
            diagnostics: Vec::new(),
        }
    }

    fn finish(mut self) -> (ResolvedUnit, Vec<Diagnostic>) {
        self.unit.top_level_locals = self.top_locals_max.max(self.body.max_slot);
        (self.unit, self.diagnostics)
    }

    fn warn(&mut self, level: u8, message: impl Into<String>, span: Span) {
        if self.env.warning_level >= level {
            self.diagnostics.push(Diagnostic::warning(message, span));
        }
    }

    // ── Pass 1: declarations ──────────────────────────────────────

    fn push_function(&mut self, name: String, arity: usize) -> usize {
        let id = self.unit.function_base + self.unit.functions.len();
        self.unit.functions.push(RFunction::new(name, arity));
        id
    }

    fn declare_items(&mut self, items: &[Item], namespace: &[String]) {
        for item in items {
            match item {
                Item::Namespace(ns) => {
                    let mut inner = namespace.to_vec();
                    inner.extend(ns.path.iter().cloned());
                    self.declare_items(&ns.items, &inner);
                }
                Item::Class(class) => self.declare_class(class, namespace),
                Item::Function(f) => {
                    let qualified = qualify(namespace, &f.name);
                    let id = self.push_function(qualified.clone(), f.params.len());
                    if self.unit_functions.contains_key(&qualified) {
                        self.diagnostics.push(Diagnostic::resolve(
                            format!("A function named '{qualified}' is already declared"),
                            f.span,
                        ));
                    } else {
                        self.unit_functions.insert(qualified.clone(), id);
                        self.unit.function_names.push((qualified, id));
                    }
                }
                Item::Stmt(Stmt::Let { name, span, .. }) if namespace.is_empty() => {
                    self.declare_global(name, *span);
                }
                Item::Stmt(_) => {}
            }
        }
    }

    fn declare_class(&mut self, class: &ClassDef, namespace: &[String]) {
        let qualified = qualify(namespace, &class.name);
        let id = self.unit.class_base + self.unit.classes.len();
        let field_init = self.push_function(format!("{qualified}.<fields>"), 0);

        let mut fields: Vec<String> = Vec::new();
        for field in &class.fields {
            if fields.contains(&field.name) {
                self.diagnostics.push(Diagnostic::resolve(
                    format!("'{qualified}' already contains a field named '{}'", field.name),
                    field.span,
                ));
            } else {
                fields.push(field.name.clone());
            }
        }

        let mut methods = IndexMap::new();
        for method in &class.methods {
            let fid = self.push_function(format!("{qualified}.{}", method.name), method.params.len());
            if methods.contains_key(&method.name) || fields.contains(&method.name) {
                self.diagnostics.push(Diagnostic::resolve(
                    format!("'{qualified}' already contains a member named '{}'", method.name),
                    method.span,
                ));
            } else {
                methods.insert(method.name.clone(), fid);
            }
        }

        let ctor = methods.get(CONSTRUCTOR).copied();
        self.unit.classes.push(Class {
            name: qualified.clone(),
            fields,
            methods,
            field_init,
            ctor,
        });

        if self.unit_classes.contains_key(&qualified) {
            self.diagnostics.push(Diagnostic::resolve(
                format!("A type named '{qualified}' is already declared"),
                class.span,
            ));
        } else {
            self.unit_classes.insert(qualified, id);
        }
    }

    fn declare_global(&mut self, name: &str, span: Span) {
        if self.unit_globals.contains_key(name) {
            self.diagnostics.push(Diagnostic::resolve(
                format!("A global variable named '{name}' is already declared"),
                span,
            ));
            return;
        }
        let id = if let Some(id) = self.env.program.global_id(name) {
            id
        } else {
            let id = self.next_global;
            self.next_global = self.next_global.saturating_add(1);
            self.unit.globals.push((name.to_string(), id));
            id
        };
        self.unit_globals.insert(name.to_string(), id);
    }

    // ── Pass 2: bodies ────────────────────────────────────────────

    fn resolve_items(&mut self, items: &[Item], namespace: &[String]) {
        for item in items {
            match item {
                Item::Namespace(ns) => {
                    let mut inner = namespace.to_vec();
                    inner.extend(ns.path.iter().cloned());
                    self.resolve_items(&ns.items, &inner);
                }
                Item::Class(class) => {
                    self.namespace = namespace.to_vec();
                    self.resolve_class(class);
                }
                Item::Function(f) => {
                    self.namespace = namespace.to_vec();
                    let index = self.function_cursor;
                    self.function_cursor += 1;
                    self.resolve_function(index, &f.params, &f.body, None);
                }
                Item::Stmt(stmt) => {
                    if namespace.is_empty() {
                        self.namespace.clear();
                        self.unit.returns_value = matches!(stmt, Stmt::Expr(_));
                        match self.resolve_stmt(stmt) {
                            Ok(r) => self.unit.top_level.push(r),
                            Err(e) => self.diagnostics.push(e),
                        }
                    } else {
                        self.diagnostics.push(Diagnostic::resolve(
                            "Statements are not allowed directly inside a namespace",
                            stmt.span(),
                        ));
                    }
                }
            }
        }
    }

    fn resolve_class(&mut self, class: &ClassDef) {
        let class_index = self.class_cursor;
        self.class_cursor += 1;
        let class_id = self.unit.class_base + class_index;

        // Field initializers run as a zero-argument method.
        let init_index = self.function_cursor;
        self.function_cursor += 1;
        let saved = self.enter_body(Some(class_id), &[]);
        let mut assignments = Vec::new();
        for field in &class.fields {
            if let Some(init) = &field.init {
                match self.resolve_expr(init) {
                    Ok(value) => assignments.push(RStmt::SetField {
                        object: expr(RExprKind::LoadThis, field.span),
                        field: field.name.clone(),
                        value,
                    }),
                    Err(e) => self.diagnostics.push(e),
                }
            }
        }
        self.leave_body(init_index, assignments, saved);

        for method in &class.methods {
            let index = self.function_cursor;
            self.function_cursor += 1;
            self.resolve_function(index, &method.params, &method.body, Some(class_id));
        }
    }

    fn resolve_function(&mut self, index: usize, params: &[String], body: &[Stmt], class: Option<usize>) {
        let saved = self.enter_body(class, params);
        let resolved = self.resolve_block(body);
        self.pop_scope();
        self.leave_body(index, resolved, saved);
    }

    /// Start a function body. Parameters occupy the first local slots.
    fn enter_body(&mut self, class: Option<usize>, params: &[String]) -> BodyState {
        let saved = std::mem::take(&mut self.body);
        self.body.in_function = true;
        self.body.class = class;
        self.body.scopes.push(Vec::new());
        for (i, param) in params.iter().enumerate() {
            let slot = u16::try_from(i).unwrap_or(u16::MAX);
            if let Some(scope) = self.body.scopes.last_mut() {
                scope.push(Local {
                    name: param.clone(),
                    slot,
                    used: true,
                    span: Span::default(),
                });
            }
        }
        let count = u16::try_from(params.len()).unwrap_or(u16::MAX);
        self.body.next_slot = count;
        self.body.max_slot = count;
        saved
    }

    fn leave_body(&mut self, index: usize, body: Vec<RStmt>, saved: BodyState) {
        let local_count = self.body.max_slot;
        if let Some(f) = self.unit.functions.get_mut(index) {
            f.body = body;
            f.local_count = local_count;
        }
        self.body = saved;
    }

    fn push_scope(&mut self) {
        self.body.scopes.push(Vec::new());
    }

    fn pop_scope(&mut self) {
        let Some(scope) = self.body.scopes.pop() else { return };
        for local in &scope {
            if !local.used {
                self.warn(
                    2,
                    format!("The variable '{}' is assigned but its value is never used", local.name),
                    local.span,
                );
            }
        }
        let released = u16::try_from(scope.len()).unwrap_or(u16::MAX);
        self.body.next_slot = self.body.next_slot.saturating_sub(released);
        if !self.body.in_function {
            self.top_locals_max = self.top_locals_max.max(self.body.max_slot);
        }
    }

    fn declare_local(&mut self, name: &str, span: Span) -> Result<u16, Diagnostic> {
        let slot = self.body.next_slot;
        let Some(scope) = self.body.scopes.last_mut() else {
            return Err(Diagnostic::resolve("Local declared outside any scope", span));
        };
        if scope.iter().any(|l| l.name == name) {
            return Err(Diagnostic::resolve(
                format!("A local variable named '{name}' is already defined in this scope"),
                span,
            ));
        }
        scope.push(Local {
            name: name.to_string(),
            slot,
            used: false,
            span,
        });
        self.body.next_slot = slot
            .checked_add(1)
            .ok_or_else(|| Diagnostic::resolve("Too many local variables (max 65535)", span))?;
        self.body.max_slot = self.body.max_slot.max(self.body.next_slot);
        Ok(slot)
    }

    fn find_local(&mut self, name: &str) -> Option<&mut Local> {
        self.body
            .scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.iter_mut().rev().find(|l| l.name == name))
    }

    fn find_global(&self, name: &str) -> Option<u32> {
        self.unit_globals
            .get(name)
            .copied()
            .or_else(|| self.env.program.global_id(name))
    }

    /// A local or global with this name exists.
    fn is_variable(&mut self, name: &str) -> bool {
        self.find_local(name).is_some() || self.find_global(name).is_some()
    }

    /// Look up a function path relative to the current namespace, innermost first.
    fn lookup_function(&self, path: &[String]) -> Option<usize> {
        let name = path.join(".");
        (0..=self.namespace.len()).rev().find_map(|k| {
            let qualified = qualify(self.namespace.get(..k).unwrap_or_default(), &name);
            self.unit_functions
                .get(&qualified)
                .copied()
                .or_else(|| self.env.program.function_id(&qualified))
        })
    }

    fn lookup_class(&self, path: &[String]) -> Option<usize> {
        let name = path.join(".");
        (0..=self.namespace.len()).rev().find_map(|k| {
            let qualified = qualify(self.namespace.get(..k).unwrap_or_default(), &name);
            self.unit_classes
                .get(&qualified)
                .copied()
                .or_else(|| self.env.program.class_id(&qualified))
        })
    }

    fn function_arity(&self, id: usize) -> Option<usize> {
        match id.checked_sub(self.unit.function_base) {
            Some(i) => self.unit.functions.get(i).map(|f| f.arity),
            None => self.env.program.function_arity(id),
        }
    }

    fn function_name(&self, id: usize) -> String {
        match id.checked_sub(self.unit.function_base) {
            Some(i) => self.unit.functions.get(i).map(|f| f.name.clone()),
            None => self.env.program.functions.get(id).map(|f| f.name.clone()),
        }
        .unwrap_or_default()
    }

    fn class(&self, id: usize) -> Option<&Class> {
        match id.checked_sub(self.unit.class_base) {
            Some(i) => self.unit.classes.get(i),
            None => self.env.program.classes.get(id),
        }
    }

    fn current_class(&self, span: Span) -> Result<&Class, Diagnostic> {
        self.body
            .class
            .and_then(|id| self.class(id))
            .ok_or_else(|| Diagnostic::resolve("Keyword 'this' is not valid outside a method", span))
    }

    fn check_arity(name: &str, expected: usize, given: usize, span: Span) -> Result<(), Diagnostic> {
        if expected == given {
            Ok(())
        } else {
            Err(Diagnostic::resolve(
                format!("'{name}' takes {expected} argument(s) but {given} were given"),
                span,
            ))
        }
    }

    // ── Statements ────────────────────────────────────────────────

    fn resolve_block(&mut self, stmts: &[Stmt]) -> Vec<RStmt> {
        let mut out = Vec::new();
        let mut returned = false;
        let mut warned = false;
        for stmt in stmts {
            if returned && !warned {
                self.warn(1, "Unreachable code detected", stmt.span());
                warned = true;
            }
            match self.resolve_stmt(stmt) {
                Ok(r) => out.push(r),
                Err(e) => self.diagnostics.push(e),
            }
            if matches!(stmt, Stmt::Return { .. }) {
                returned = true;
            }
        }
        out
    }

    fn resolve_scoped_block(&mut self, stmts: &[Stmt]) -> Vec<RStmt> {
        self.push_scope();
        let out = self.resolve_block(stmts);
        self.pop_scope();
        out
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) -> Result<RStmt, Diagnostic> {
        match stmt {
            Stmt::Let { name, value, span } => {
                let value = self.resolve_expr(value)?;
                if self.body.scopes.is_empty() {
                    let id = self.find_global(name).ok_or_else(|| {
                        Diagnostic::resolve(format!("Global '{name}' was not declared"), *span)
                    })?;
                    Ok(RStmt::StoreGlobal { id, value })
                } else {
                    let slot = self.declare_local(name, *span)?;
                    Ok(RStmt::StoreLocal { slot, value })
                }
            }
            Stmt::Assign { target, value, span } => self.resolve_assign(target, value, *span),
            Stmt::If {
                condition,
                then_body,
                else_body,
                ..
            } => {
                let condition = self.resolve_expr(condition)?;
                let then_body = self.resolve_scoped_block(then_body);
                let else_body = match else_body {
                    Some(body) => self.resolve_scoped_block(body),
                    None => Vec::new(),
                };
                Ok(RStmt::If {
                    condition,
                    then_body,
                    else_body,
                })
            }
            Stmt::While { condition, body, .. } => {
                let condition = self.resolve_expr(condition)?;
                let body = self.resolve_scoped_block(body);
                Ok(RStmt::While { condition, body })
            }
            Stmt::Return { value, span } => {
                if !self.body.in_function {
                    return Err(Diagnostic::resolve(
                        "A return statement is only valid inside a function",
                        *span,
                    ));
                }
                let value = value.as_ref().map(|v| self.resolve_expr(v)).transpose()?;
                Ok(RStmt::Return(value))
            }
            Stmt::Block(stmts, _) => {
                let body = self.resolve_scoped_block(stmts);
                // Lowered as an always-taken branch.
                Ok(RStmt::If {
                    condition: expr(RExprKind::Const(Value::Bool(true)), stmt.span()),
                    then_body: body,
                    else_body: Vec::new(),
                })
            }
            Stmt::Expr(e) => Ok(RStmt::Expr(self.resolve_expr(e)?)),
        }
    }

    fn resolve_assign(&mut self, target: &Expr, value: &Expr, span: Span) -> Result<RStmt, Diagnostic> {
        let value = self.resolve_expr(value)?;
        match &target.kind {
            ExprKind::Ident(name) => {
                if let Some(local) = self.find_local(name) {
                    return Ok(RStmt::StoreLocal {
                        slot: local.slot,
                        value,
                    });
                }
                if let Some(id) = self.find_global(name) {
                    return Ok(RStmt::StoreGlobal { id, value });
                }
                Err(Self::unknown_name(name, target.span))
            }
            ExprKind::Field { object, field } => {
                if matches!(object.kind, ExprKind::This) {
                    self.check_this_field(field, target.span)?;
                }
                let object = self.resolve_expr(object)?;
                Ok(RStmt::SetField {
                    object,
                    field: field.clone(),
                    value,
                })
            }
            _ => Err(Diagnostic::resolve(
                "The left-hand side of an assignment must be a variable or field",
                span,
            )),
        }
    }

    // ── Expressions ───────────────────────────────────────────────

    fn unknown_name(name: &str, span: Span) -> Diagnostic {
        Diagnostic::resolve(
            format!("The name '{name}' does not exist in the current context"),
            span,
        )
    }

    fn not_referenced(module: &str, span: Span) -> Diagnostic {
        Diagnostic::resolve(
            format!("module '{module}' is loaded but not referenced by this engine"),
            span,
        )
    }

    fn check_this_field(&self, field: &str, span: Span) -> Result<(), Diagnostic> {
        let class = self.current_class(span)?;
        if class.fields.iter().any(|f| f == field) {
            Ok(())
        } else {
            Err(Diagnostic::resolve(
                format!("'{}' does not contain a field named '{field}'", class.name),
                span,
            ))
        }
    }

    fn resolve_args(&mut self, args: &[Expr]) -> Result<Vec<RExpr>, Diagnostic> {
        args.iter().map(|a| self.resolve_expr(a)).collect()
    }

    fn resolve_expr(&mut self, e: &Expr) -> Result<RExpr, Diagnostic> {
        let span = e.span;
        let kind = match &e.kind {
            ExprKind::IntLit(v) => RExprKind::Const(Value::Int(*v)),
            ExprKind::FloatLit(v) => RExprKind::Const(Value::Float(*v)),
            ExprKind::StrLit(s) => RExprKind::Const(Value::str(s)),
            ExprKind::BoolLit(b) => RExprKind::Const(Value::Bool(*b)),
            ExprKind::Null => RExprKind::Const(Value::Null),
            ExprKind::This => {
                self.current_class(span)?;
                RExprKind::LoadThis
            }
            ExprKind::Ident(name) => self.resolve_ident(name, span)?,
            ExprKind::BinOp { op, left, right } => RExprKind::BinOp {
                op: *op,
                left: Box::new(self.resolve_expr(left)?),
                right: Box::new(self.resolve_expr(right)?),
            },
            ExprKind::UnaryOp { op, operand } => RExprKind::UnaryOp {
                op: *op,
                operand: Box::new(self.resolve_expr(operand)?),
            },
            ExprKind::Call { name, args } => {
                let Some(func) = self.lookup_function(std::slice::from_ref(name)) else {
                    if self.is_variable(name) {
                        return Err(Diagnostic::resolve(
                            format!("'{name}' is a variable but is used like a function"),
                            span,
                        ));
                    }
                    return Err(Self::unknown_name(name, span));
                };
                self.resolve_call(func, args, span)?
            }
            ExprKind::MethodCall { object, method, args } => {
                self.resolve_method_call(object, method, args, span)?
            }
            ExprKind::Field { object, field } => {
                if matches!(object.kind, ExprKind::This) {
                    self.check_this_field(field, span)?;
                }
                RExprKind::GetField {
                    object: Box::new(self.resolve_expr(object)?),
                    field: field.clone(),
                }
            }
            ExprKind::New { path, args } => {
                let name = path.join(".");
                let class = self.lookup_class(path).ok_or_else(|| {
                    Diagnostic::resolve(
                        format!("The type or namespace name '{name}' could not be found"),
                        span,
                    )
                })?;
                let expected = match self.class(class).and_then(|c| c.ctor) {
                    Some(ctor) => self.function_arity(ctor).unwrap_or(0),
                    None => 0,
                };
                if expected != args.len() {
                    return Err(Diagnostic::resolve(
                        format!(
                            "'{name}' does not have a constructor that takes {} argument(s)",
                            args.len()
                        ),
                        span,
                    ));
                }
                RExprKind::New {
                    class,
                    args: self.resolve_args(args)?,
                }
            }
        };
        Ok(expr(kind, span))
    }

    fn resolve_ident(&mut self, name: &str, span: Span) -> Result<RExprKind, Diagnostic> {
        if let Some(local) = self.find_local(name) {
            local.used = true;
            return Ok(RExprKind::LoadLocal(local.slot));
        }
        if let Some(id) = self.find_global(name) {
            return Ok(RExprKind::LoadGlobal(id));
        }
        match self.env.modules.lookup(name, "") {
            HostLookup::NotAllowed => Err(Self::not_referenced(name, span)),
            HostLookup::NotAModule => Err(Self::unknown_name(name, span)),
            _ => Err(Diagnostic::resolve(
                format!("'{name}' is a module and cannot be used as a value"),
                span,
            )),
        }
    }

    fn resolve_call(&mut self, func: usize, args: &[Expr], span: Span) -> Result<RExprKind, Diagnostic> {
        let expected = self.function_arity(func).unwrap_or(0);
        Self::check_arity(&self.function_name(func), expected, args.len(), span)?;
        Ok(RExprKind::Call {
            func,
            args: self.resolve_args(args)?,
        })
    }

    fn resolve_method_call(
        &mut self,
        object: &Expr,
        method: &str,
        args: &[Expr],
        span: Span,
    ) -> Result<RExprKind, Diagnostic> {
        // `Module.fn(..)` and `ns.fn(..)` when the head is not a variable
        if let Some(path) = object.as_path() {
            let head = path.first().cloned().unwrap_or_default();
            if !self.is_variable(&head) {
                if path.len() == 1 {
                    match self.env.modules.lookup(&head, method) {
                        HostLookup::Found(arity) => {
                            if !arity.accepts(args.len()) {
                                return Err(Diagnostic::resolve(
                                    format!(
                                        "'{head}.{method}' takes {arity} argument(s) but {} were given",
                                        args.len()
                                    ),
                                    span,
                                ));
                            }
                            return Ok(RExprKind::CallHost {
                                module: head,
                                function: method.to_string(),
                                args: self.resolve_args(args)?,
                            });
                        }
                        HostLookup::MissingFunction => {
                            return Err(Diagnostic::resolve(
                                format!("Module '{head}' does not contain a function named '{method}'"),
                                span,
                            ));
                        }
                        HostLookup::NotAllowed => return Err(Self::not_referenced(&head, object.span)),
                        HostLookup::Unloaded => {
                            return Err(Diagnostic::resolve(
                                format!("module '{head}' is no longer loaded"),
                                object.span,
                            ));
                        }
                        HostLookup::NotAModule => {}
                    }
                }
                let mut full = path.clone();
                full.push(method.to_string());
                return match self.lookup_function(&full) {
                    Some(func) => self.resolve_call(func, args, span),
                    None if path.len() == 1 => Err(Self::unknown_name(&head, object.span)),
                    None => Err(Self::unknown_name(&full.join("."), span)),
                };
            }
        }

        if matches!(object.kind, ExprKind::This) {
            let class = self.current_class(object.span)?;
            let Some(&id) = class.methods.get(method) else {
                return Err(Diagnostic::resolve(
                    format!("'{}' does not contain a method named '{method}'", class.name),
                    span,
                ));
            };
            let name = self.function_name(id);
            let expected = self.function_arity(id).unwrap_or(0);
            Self::check_arity(&name, expected, args.len(), span)?;
        }

        Ok(RExprKind::CallMethod {
            object: Box::new(self.resolve_expr(object)?),
            method: method.to_string(),
            args: self.resolve_args(args)?,
        })
    }
}
