//! Linked program state: bytecode chunks, classes, globals and host bindings.
//!
//! Every table is append-only. A compiled unit refers to functions, classes,
//! globals and host bindings by index, so linking a later unit never
//! invalidates code that is already linked. Redeclaring a name only moves the
//! name to the new index.

use std::collections::HashMap;
use std::sync::Weak;

use indexmap::IndexMap;

use super::ast::Span;
use super::compiler::CompiledUnit;
use super::error::Diagnostic;
use super::value::Value;
use crate::engine::modules::{AllowedModuleSet, HostModule};

/// Bytecode operations for the stack-based VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Push a constant from the chunk's constant pool.
    PushConst(u16),
    PushNull,
    PushTrue,
    PushFalse,
    /// Load a local variable onto the stack.
    LoadLocal(u16),
    /// Pop top of stack into a local variable slot.
    StoreLocal(u16),
    LoadGlobal(u32),
    StoreGlobal(u32),
    /// Push the receiver of the current method.
    LoadThis,
    /// Pop object, push `object.<name const>`.
    GetField(u16),
    /// Pop value, pop object, assign `object.<name const> = value`.
    SetField(u16),
    /// Pop top of stack.
    Pop,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,

    // Comparison
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,

    // Logic
    Not,

    // Control flow
    /// Jump if top of stack is false (pops the condition).
    JumpIfFalse(u32),
    /// Unconditional jump.
    Jump(u32),

    // Calls
    /// Call a script function with `argc` arguments from the stack.
    Call { func: u32, argc: u8 },
    /// Pop args and a receiver, dispatch `<name const>` on the receiver's class.
    CallMethod { name: u16, argc: u8 },
    /// Call through a host binding.
    CallHost { binding: u32, argc: u8 },
    /// Instantiate a class, running field initializers then `init`.
    New { class: u32, argc: u8 },

    /// Return top of stack to the caller.
    Return,
}

/// Bytecode for one function body.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub ops: Vec<Op>,
    pub constants: Vec<Value>,
    pub local_count: u16,
}

#[derive(Debug, Clone)]
pub struct Function {
    /// Qualified name used in stack traces, e.g. `script.Main.init`.
    pub name: String,
    pub arity: usize,
    pub chunk: Chunk,
}

#[derive(Debug, Clone)]
pub struct Class {
    /// Qualified name, e.g. `script.Main`.
    pub name: String,
    pub fields: Vec<String>,
    pub methods: IndexMap<String, usize>,
    /// Function that assigns field initializers on a fresh instance.
    pub field_init: usize,
    pub ctor: Option<usize>,
}

/// A resolved `Module.function` reference. The module is held weakly: when
/// the host drops it, calls fault instead of keeping it alive.
#[derive(Debug, Clone)]
pub struct HostBinding {
    pub module: Weak<HostModule>,
    pub module_name: String,
    pub function: String,
}

/// Everything a VM needs to execute linked code, minus global values.
#[derive(Debug, Default)]
pub struct Program {
    pub functions: Vec<Function>,
    pub classes: Vec<Class>,
    pub host_bindings: Vec<HostBinding>,
    pub function_names: HashMap<String, usize>,
    pub class_names: HashMap<String, usize>,
    pub global_names: HashMap<String, u32>,
}

impl Program {
    pub fn function_id(&self, qualified: &str) -> Option<usize> {
        self.function_names.get(qualified).copied()
    }

    pub fn function_arity(&self, id: usize) -> Option<usize> {
        self.functions.get(id).map(|f| f.arity)
    }

    pub fn class_id(&self, qualified: &str) -> Option<usize> {
        self.class_names.get(qualified).copied()
    }

    /// Parameter count of the class's `init`, or `None` when it has none.
    pub fn constructor_arity(&self, class: usize) -> Option<usize> {
        let ctor = self.classes.get(class)?.ctor?;
        self.function_arity(ctor)
    }

    pub fn global_id(&self, name: &str) -> Option<u32> {
        self.global_names.get(name).copied()
    }

    pub fn global_count(&self) -> usize {
        self.global_names.len()
    }

    /// Append a compiled unit and point its declared names at the new entries.
    /// Host bindings take their module handles from `modules`.
    ///
    /// Returns the unit's top-level chunk. The unit must have been compiled
    /// against the current table sizes.
    pub fn link(&mut self, unit: CompiledUnit, modules: &AllowedModuleSet) -> Result<Chunk, Diagnostic> {
        if unit.function_base != self.functions.len()
            || unit.class_base != self.classes.len()
            || unit.binding_base != self.host_bindings.len()
        {
            return Err(Diagnostic::compiler(
                "Compiled unit is out of date with the program",
                Span::default(),
            ));
        }

        self.functions.extend(unit.functions);
        for (offset, class) in unit.classes.into_iter().enumerate() {
            self.class_names.insert(class.name.clone(), unit.class_base + offset);
            self.classes.push(class);
        }
        self.function_names.extend(unit.function_names);
        self.global_names.extend(unit.globals);
        for (module, function) in unit.host_calls {
            self.host_bindings.push(HostBinding {
                module: modules.weak(&module),
                module_name: module,
                function,
            });
        }
        Ok(unit.top_level)
    }
}
