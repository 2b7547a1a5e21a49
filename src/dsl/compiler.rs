use indexmap::IndexSet;

use super::ast::{BinOp, Span, UnaryOp};
use super::error::Diagnostic;
use super::program::{Chunk, Class, Function, Op};
use super::resolve::{RExpr, RExprKind, RFunction, RStmt, ResolvedUnit};
use super::value::Value;

/// A compiled unit ready to be linked into a [`Program`](super::program::Program).
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub function_base: usize,
    pub functions: Vec<Function>,
    pub class_base: usize,
    pub classes: Vec<Class>,
    pub function_names: Vec<(String, usize)>,
    pub globals: Vec<(String, u32)>,
    /// `(module, function)` pairs; binding id = `binding_base + index`.
    pub host_calls: Vec<(String, String)>,
    pub binding_base: usize,
    pub top_level: Chunk,
    pub returns_value: bool,
}

/// Lower a resolved unit to bytecode. Host bindings created by this unit are
/// numbered from `binding_base`.
pub fn compile(unit: ResolvedUnit, binding_base: usize) -> Result<CompiledUnit, Diagnostic> {
    let mut host_calls = IndexSet::new();

    let mut functions = Vec::with_capacity(unit.functions.len());
    for f in &unit.functions {
        functions.push(compile_function(f, binding_base, &mut host_calls)?);
    }

    let mut top = Compiler::new(binding_base, &mut host_calls);
    let last = unit.top_level.len().checked_sub(1);
    for (i, stmt) in unit.top_level.iter().enumerate() {
        // The final expression statement's value is the unit's result.
        if unit.returns_value && Some(i) == last {
            if let RStmt::Expr(e) = stmt {
                top.compile_expr(e)?;
                top.emit(Op::Return);
                continue;
            }
        }
        top.compile_stmt(stmt)?;
    }
    top.emit(Op::PushNull);
    top.emit(Op::Return);
    let top_level = top.finish(unit.top_level_locals);

    Ok(CompiledUnit {
        function_base: unit.function_base,
        functions,
        class_base: unit.class_base,
        classes: unit.classes,
        function_names: unit.function_names,
        globals: unit.globals,
        host_calls: host_calls.into_iter().collect(),
        binding_base,
        top_level,
        returns_value: unit.returns_value,
    })
}

fn compile_function(
    f: &RFunction,
    binding_base: usize,
    host_calls: &mut IndexSet<(String, String)>,
) -> Result<Function, Diagnostic> {
    let mut compiler = Compiler::new(binding_base, host_calls);
    compiler.compile_block(&f.body)?;
    compiler.emit(Op::PushNull);
    compiler.emit(Op::Return);
    Ok(Function {
        name: f.name.clone(),
        arity: f.arity,
        chunk: compiler.finish(f.local_count),
    })
}

struct Compiler<'a> {
    ops: Vec<Op>,
    constants: Vec<Value>,
    binding_base: usize,
    host_calls: &'a mut IndexSet<(String, String)>,
}

fn limit_error(what: &str) -> Diagnostic {
    Diagnostic::compiler(what, Span::default())
}

impl<'a> Compiler<'a> {
    fn new(binding_base: usize, host_calls: &'a mut IndexSet<(String, String)>) -> Self {
        Self {
            ops: Vec::new(),
            constants: Vec::new(),
            binding_base,
            host_calls,
        }
    }

    fn finish(self, local_count: u16) -> Chunk {
        Chunk {
            ops: self.ops,
            constants: self.constants,
            local_count,
        }
    }

    fn emit(&mut self, op: Op) {
        self.ops.push(op);
    }

    fn add_constant(&mut self, value: Value) -> Result<u16, Diagnostic> {
        let existing = self.constants.iter().position(|c| match (c, &value) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        });
        if let Some(i) = existing {
            return u16::try_from(i).map_err(|_| limit_error("Too many constants (max 65535)"));
        }
        let idx = u16::try_from(self.constants.len())
            .map_err(|_| limit_error("Too many constants (max 65535)"))?;
        self.constants.push(value);
        Ok(idx)
    }

    fn name_constant(&mut self, name: &str) -> Result<u16, Diagnostic> {
        self.add_constant(Value::str(name))
    }

    fn current_offset(&self) -> usize {
        self.ops.len()
    }

    fn jump_target(offset: usize) -> Result<u32, Diagnostic> {
        u32::try_from(offset).map_err(|_| limit_error("Function body too large"))
    }

    fn patch_jump(&mut self, idx: usize) -> Result<(), Diagnostic> {
        let target = Self::jump_target(self.ops.len())?;
        match self.ops.get_mut(idx) {
            Some(Op::JumpIfFalse(dest) | Op::Jump(dest)) => *dest = target,
            _ => {}
        }
        Ok(())
    }

    fn argc(args: &[RExpr]) -> Result<u8, Diagnostic> {
        u8::try_from(args.len()).map_err(|_| limit_error("Too many arguments (max 255)"))
    }

    fn compile_block(&mut self, stmts: &[RStmt]) -> Result<(), Diagnostic> {
        for stmt in stmts {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &RStmt) -> Result<(), Diagnostic> {
        match stmt {
            RStmt::StoreLocal { slot, value } => {
                self.compile_expr(value)?;
                self.emit(Op::StoreLocal(*slot));
            }
            RStmt::StoreGlobal { id, value } => {
                self.compile_expr(value)?;
                self.emit(Op::StoreGlobal(*id));
            }
            RStmt::SetField { object, field, value } => {
                self.compile_expr(object)?;
                self.compile_expr(value)?;
                let name = self.name_constant(field)?;
                self.emit(Op::SetField(name));
            }
            RStmt::If {
                condition,
                then_body,
                else_body,
            } => {
                self.compile_expr(condition)?;
                let jump_else = self.current_offset();
                self.emit(Op::JumpIfFalse(0));
                self.compile_block(then_body)?;
                if else_body.is_empty() {
                    self.patch_jump(jump_else)?;
                } else {
                    let jump_end = self.current_offset();
                    self.emit(Op::Jump(0));
                    self.patch_jump(jump_else)?;
                    self.compile_block(else_body)?;
                    self.patch_jump(jump_end)?;
                }
            }
            RStmt::While { condition, body } => {
                let start = Self::jump_target(self.current_offset())?;
                self.compile_expr(condition)?;
                let jump_exit = self.current_offset();
                self.emit(Op::JumpIfFalse(0));
                self.compile_block(body)?;
                self.emit(Op::Jump(start));
                self.patch_jump(jump_exit)?;
            }
            RStmt::Return(value) => {
                match value {
                    Some(v) => self.compile_expr(v)?,
                    None => self.emit(Op::PushNull),
                }
                self.emit(Op::Return);
            }
            RStmt::Expr(e) => {
                self.compile_expr(e)?;
                self.emit(Op::Pop);
            }
        }
        Ok(())
    }

    fn compile_expr(&mut self, expr: &RExpr) -> Result<(), Diagnostic> {
        match &expr.kind {
            RExprKind::Const(value) => match value {
                Value::Null => self.emit(Op::PushNull),
                Value::Bool(true) => self.emit(Op::PushTrue),
                Value::Bool(false) => self.emit(Op::PushFalse),
                other => {
                    let idx = self.add_constant(other.clone())?;
                    self.emit(Op::PushConst(idx));
                }
            },
            RExprKind::LoadLocal(slot) => self.emit(Op::LoadLocal(*slot)),
            RExprKind::LoadGlobal(id) => self.emit(Op::LoadGlobal(*id)),
            RExprKind::LoadThis => self.emit(Op::LoadThis),
            RExprKind::GetField { object, field } => {
                self.compile_expr(object)?;
                let name = self.name_constant(field)?;
                self.emit(Op::GetField(name));
            }
            RExprKind::BinOp {
                op: BinOp::And,
                left,
                right,
            } => {
                // left && right → if left { right } else { false }
                self.compile_expr(left)?;
                let jump_false = self.current_offset();
                self.emit(Op::JumpIfFalse(0));
                self.compile_expr(right)?;
                let jump_end = self.current_offset();
                self.emit(Op::Jump(0));
                self.patch_jump(jump_false)?;
                self.emit(Op::PushFalse);
                self.patch_jump(jump_end)?;
            }
            RExprKind::BinOp {
                op: BinOp::Or,
                left,
                right,
            } => {
                // left || right → if left { true } else { right }
                self.compile_expr(left)?;
                let jump_rhs = self.current_offset();
                self.emit(Op::JumpIfFalse(0));
                self.emit(Op::PushTrue);
                let jump_end = self.current_offset();
                self.emit(Op::Jump(0));
                self.patch_jump(jump_rhs)?;
                self.compile_expr(right)?;
                self.patch_jump(jump_end)?;
            }
            RExprKind::BinOp { op, left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(match op {
                    BinOp::Add => Op::Add,
                    BinOp::Sub => Op::Sub,
                    BinOp::Mul => Op::Mul,
                    BinOp::Div => Op::Div,
                    BinOp::Mod => Op::Mod,
                    BinOp::Lt => Op::Lt,
                    BinOp::Gt => Op::Gt,
                    BinOp::Le => Op::Le,
                    BinOp::Ge => Op::Ge,
                    BinOp::Eq => Op::Eq,
                    BinOp::Ne => Op::Ne,
                    BinOp::And | BinOp::Or => {
                        return Err(Diagnostic::compiler(
                            "Logical operator reached arithmetic lowering",
                            expr.span,
                        ));
                    }
                });
            }
            RExprKind::UnaryOp { op, operand } => {
                self.compile_expr(operand)?;
                self.emit(match op {
                    UnaryOp::Neg => Op::Neg,
                    UnaryOp::Not => Op::Not,
                });
            }
            RExprKind::Call { func, args } => {
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let func = u32::try_from(*func).map_err(|_| limit_error("Too many functions"))?;
                self.emit(Op::Call {
                    func,
                    argc: Self::argc(args)?,
                });
            }
            RExprKind::CallMethod { object, method, args } => {
                self.compile_expr(object)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let name = self.name_constant(method)?;
                self.emit(Op::CallMethod {
                    name,
                    argc: Self::argc(args)?,
                });
            }
            RExprKind::CallHost { module, function, args } => {
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let (index, _) = self.host_calls.insert_full((module.clone(), function.clone()));
                let binding = u32::try_from(self.binding_base + index)
                    .map_err(|_| limit_error("Too many host bindings"))?;
                self.emit(Op::CallHost {
                    binding,
                    argc: Self::argc(args)?,
                });
            }
            RExprKind::New { class, args } => {
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let class = u32::try_from(*class).map_err(|_| limit_error("Too many classes"))?;
                self.emit(Op::New {
                    class,
                    argc: Self::argc(args)?,
                });
            }
        }
        Ok(())
    }
}
