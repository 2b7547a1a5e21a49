use std::cell::RefCell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use indexmap::IndexMap;

use super::program::{Chunk, Op, Program};
use super::value::{Object, ObjectRef, Value};

/// Maximum operand stack depth per frame.
const MAX_STACK: usize = 256;

/// Maximum nested script calls before a fault. Frames live on the heap, so
/// this bounds memory, not the host's native stack.
pub const MAX_CALL_DEPTH: usize = 1024;

const TOP_LEVEL: &str = "<top-level>";

/// A runtime fault with the script call stack, innermost frame first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub message: String,
    pub trace: Vec<String>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: Vec::new(),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for frame in &self.trace {
            write!(f, "\n   at {frame}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

type VmResult<T> = Result<T, RuntimeError>;

/// What happens to a frame's return value once the frame is popped.
enum Resume {
    /// Hand the value to the caller.
    Value,
    /// Field initializers finished: run the constructor, if any.
    Construct {
        object: ObjectRef,
        ctor: Option<(usize, Vec<Value>)>,
    },
    /// The constructor finished: the caller gets the object.
    Object(ObjectRef),
}

/// One activation of a chunk.
struct Frame<'c> {
    name: &'c str,
    chunk: &'c Chunk,
    ip: usize,
    locals: Vec<Value>,
    stack: Vec<Value>,
    this: Option<ObjectRef>,
    resume: Resume,
}

impl<'c> Frame<'c> {
    fn new(name: &'c str, chunk: &'c Chunk, this: Option<ObjectRef>, mut locals: Vec<Value>, resume: Resume) -> Self {
        locals.resize(usize::from(chunk.local_count).max(locals.len()), Value::Null);
        Self {
            name,
            chunk,
            ip: 0,
            locals,
            stack: Vec::with_capacity(16),
            this,
            resume,
        }
    }
}

/// Why the current frame stopped executing.
enum Flow<'c> {
    Enter(Frame<'c>),
    Return(Value),
}

/// Executes linked bytecode. One VM lives for one top-level run or entry-point
/// invocation; the instruction budget counts across all calls it makes.
///
/// Script calls push heap frames onto an explicit call stack, so script
/// recursion never grows the native stack.
pub struct Vm<'a> {
    program: &'a Program,
    globals: &'a mut Vec<Value>,
    instruction_limit: Option<u64>,
    executed: u64,
}

impl<'a> Vm<'a> {
    pub fn new(program: &'a Program, globals: &'a mut Vec<Value>, instruction_limit: Option<u64>) -> Self {
        Self {
            program,
            globals,
            instruction_limit,
            executed: 0,
        }
    }

    /// Run a unit's top-level chunk.
    pub fn run_top_level(&mut self, chunk: &Chunk) -> VmResult<Value> {
        self.run(Frame::new(TOP_LEVEL, chunk, None, Vec::new(), Resume::Value))
    }

    /// Call a function by id. `this` is the receiver for methods.
    pub fn call(&mut self, func: usize, this: Option<ObjectRef>, args: Vec<Value>) -> VmResult<Value> {
        let frame = self.enter(func, this, args, Resume::Value)?;
        self.run(frame)
    }

    /// Create an instance: fields start null, initializers run, then `init`.
    pub fn instantiate(&mut self, class: usize, args: Vec<Value>) -> VmResult<Value> {
        let frame = self.construct(class, args)?;
        self.run(frame)
    }

    fn run<'c>(&mut self, base: Frame<'c>) -> VmResult<Value>
    where
        'a: 'c,
    {
        let mut frames = vec![base];
        self.drive(&mut frames).map_err(|mut e| {
            e.trace = frames.iter().rev().map(|f| f.name.to_string()).collect();
            e
        })
    }

    /// Run until the base frame returns. On a fault `frames` is left as it
    /// was at the faulting instruction.
    fn drive<'c>(&mut self, frames: &mut Vec<Frame<'c>>) -> VmResult<Value>
    where
        'a: 'c,
    {
        loop {
            let Some(frame) = frames.last_mut() else {
                return Ok(Value::Null);
            };
            match self.execute(frame)? {
                Flow::Enter(callee) => push_frame(frames, callee)?,
                Flow::Return(mut value) => {
                    let Some(done) = frames.pop() else {
                        return Ok(value);
                    };
                    match done.resume {
                        Resume::Value => {}
                        Resume::Construct {
                            object,
                            ctor: Some((ctor, args)),
                        } => {
                            let callee = self.enter(ctor, Some(Rc::clone(&object)), args, Resume::Object(object))?;
                            push_frame(frames, callee)?;
                            continue;
                        }
                        Resume::Construct { object, ctor: None } | Resume::Object(object) => {
                            value = Value::Object(object);
                        }
                    }
                    match frames.last_mut() {
                        Some(caller) => caller.stack.push(value),
                        None => return Ok(value),
                    }
                }
            }
        }
    }

    /// Build the frame for a script function call.
    fn enter(&self, func: usize, this: Option<ObjectRef>, args: Vec<Value>, resume: Resume) -> VmResult<Frame<'a>> {
        let program = self.program;
        let function = program
            .functions
            .get(func)
            .ok_or_else(|| RuntimeError::new(format!("Invalid function id {func}")))?;
        if args.len() != function.arity {
            return Err(RuntimeError::new(format!(
                "'{}' takes {} argument(s) but {} were given",
                function.name,
                function.arity,
                args.len()
            )));
        }
        Ok(Frame::new(&function.name, &function.chunk, this, args, resume))
    }

    /// Allocate an instance and build the frame running its field initializers.
    fn construct(&self, class: usize, args: Vec<Value>) -> VmResult<Frame<'a>> {
        let program = self.program;
        let def = program
            .classes
            .get(class)
            .ok_or_else(|| RuntimeError::new(format!("Invalid class id {class}")))?;
        if def.ctor.is_none() && !args.is_empty() {
            return Err(RuntimeError::new(format!(
                "'{}' does not have a constructor that takes {} argument(s)",
                def.name,
                args.len()
            )));
        }

        let object = Rc::new(RefCell::new(Object {
            class,
            class_name: Rc::from(def.name.as_str()),
            fields: def
                .fields
                .iter()
                .map(|name| (name.clone(), Value::Null))
                .collect::<IndexMap<_, _>>(),
        }));
        let resume = Resume::Construct {
            object: Rc::clone(&object),
            ctor: def.ctor.map(|ctor| (ctor, args)),
        };
        self.enter(def.field_init, Some(object), Vec::new(), resume)
    }

    fn tick(&mut self) -> VmResult<()> {
        self.executed += 1;
        match self.instruction_limit {
            Some(limit) if self.executed > limit => Err(RuntimeError::new(format!(
                "Instruction limit of {limit} exceeded"
            ))),
            _ => Ok(()),
        }
    }

    /// Find the method `name` on the receiver's class.
    fn method(&self, receiver: Value, name: &str) -> VmResult<(usize, ObjectRef)> {
        let object = match receiver {
            Value::Object(obj) => obj,
            Value::Null => {
                return Err(RuntimeError::new(format!(
                    "Object reference not set to an instance of an object (calling '{name}')"
                )));
            }
            other => {
                return Err(RuntimeError::new(format!(
                    "Cannot call method '{name}' on a value of type {}",
                    other.type_name()
                )));
            }
        };
        let class = borrow(&object)?.class;
        let def = self
            .program
            .classes
            .get(class)
            .ok_or_else(|| RuntimeError::new(format!("Invalid class id {class}")))?;
        let func = *def.methods.get(name).ok_or_else(|| {
            RuntimeError::new(format!("'{}' does not contain a method named '{name}'", def.name))
        })?;
        Ok((func, object))
    }

    fn call_host(&self, binding: usize, args: &[Value]) -> VmResult<Value> {
        let binding = self
            .program
            .host_bindings
            .get(binding)
            .ok_or_else(|| RuntimeError::new(format!("Invalid host binding {binding}")))?;
        let qualified = format!("{}.{}", binding.module_name, binding.function);
        let module = binding.module.upgrade().ok_or_else(|| {
            RuntimeError::new(format!(
                "module '{}' has been unloaded (calling '{qualified}')",
                binding.module_name
            ))
        })?;
        let function = module.function(&binding.function).ok_or_else(|| {
            RuntimeError::new(format!(
                "Module '{}' does not contain a function named '{}'",
                binding.module_name, binding.function
            ))
        })?;
        if !function.arity.accepts(args.len()) {
            return Err(RuntimeError::new(format!(
                "'{qualified}' takes {} argument(s) but {} were given",
                function.arity,
                args.len()
            )));
        }

        match catch_unwind(AssertUnwindSafe(|| function.call(args))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RuntimeError::new(format!("{qualified}: {e}"))),
            Err(payload) => {
                let detail = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(RuntimeError::new(format!("host function '{qualified}' panicked: {detail}")))
            }
        }
    }

    /// Run the frame's chunk until it returns or calls into another frame.
    fn execute<'c>(&mut self, frame: &mut Frame<'c>) -> VmResult<Flow<'c>>
    where
        'a: 'c,
    {
        let chunk = frame.chunk;
        while let Some(&op) = chunk.ops.get(frame.ip) {
            frame.ip += 1;
            self.tick()?;
            let stack = &mut frame.stack;
            if stack.len() >= MAX_STACK {
                return Err(RuntimeError::new("Operand stack overflow"));
            }

            match op {
                Op::PushConst(idx) => {
                    stack.push(chunk.constants.get(usize::from(idx)).cloned().unwrap_or_default());
                }
                Op::PushNull => stack.push(Value::Null),
                Op::PushTrue => stack.push(Value::Bool(true)),
                Op::PushFalse => stack.push(Value::Bool(false)),
                Op::LoadLocal(idx) => {
                    stack.push(frame.locals.get(usize::from(idx)).cloned().unwrap_or_default());
                }
                Op::StoreLocal(idx) => {
                    let value = pop(stack)?;
                    if let Some(slot) = frame.locals.get_mut(usize::from(idx)) {
                        *slot = value;
                    }
                }
                Op::LoadGlobal(id) => {
                    stack.push(self.globals.get(id as usize).cloned().unwrap_or_default());
                }
                Op::StoreGlobal(id) => {
                    let value = pop(stack)?;
                    let id = id as usize;
                    if id >= self.globals.len() {
                        self.globals.resize(id + 1, Value::Null);
                    }
                    if let Some(slot) = self.globals.get_mut(id) {
                        *slot = value;
                    }
                }
                Op::LoadThis => {
                    stack.push(frame.this.as_ref().map_or(Value::Null, |obj| Value::Object(Rc::clone(obj))));
                }
                Op::GetField(name) => {
                    let object = pop(stack)?;
                    let name = const_name(chunk, name)?;
                    stack.push(get_field(&object, name)?);
                }
                Op::SetField(name) => {
                    let value = pop(stack)?;
                    let object = pop(stack)?;
                    let name = const_name(chunk, name)?;
                    set_field(&object, name, value)?;
                }
                Op::Pop => {
                    pop(stack)?;
                }

                Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod => {
                    let b = pop(stack)?;
                    let a = pop(stack)?;
                    stack.push(arithmetic(op, a, b)?);
                }
                Op::Neg => {
                    let value = pop(stack)?;
                    stack.push(match value {
                        Value::Int(v) => Value::Int(
                            v.checked_neg().ok_or_else(|| RuntimeError::new("Integer overflow"))?,
                        ),
                        Value::Float(v) => Value::Float(-v),
                        other => return Err(unary_type_error("-", &other)),
                    });
                }
                Op::Lt | Op::Gt | Op::Le | Op::Ge => {
                    let b = pop(stack)?;
                    let a = pop(stack)?;
                    stack.push(Value::Bool(compare(op, &a, &b)?));
                }
                Op::Eq => {
                    let b = pop(stack)?;
                    let a = pop(stack)?;
                    stack.push(Value::Bool(a == b));
                }
                Op::Ne => {
                    let b = pop(stack)?;
                    let a = pop(stack)?;
                    stack.push(Value::Bool(a != b));
                }
                Op::Not => {
                    let value = pop(stack)?;
                    match value {
                        Value::Bool(b) => stack.push(Value::Bool(!b)),
                        other => return Err(unary_type_error("!", &other)),
                    }
                }

                Op::JumpIfFalse(target) => {
                    if !condition(pop(stack)?)? {
                        frame.ip = target as usize;
                    }
                }
                Op::Jump(target) => {
                    frame.ip = target as usize;
                }

                Op::Call { func, argc } => {
                    let args = pop_args(stack, argc)?;
                    return Ok(Flow::Enter(self.enter(func as usize, None, args, Resume::Value)?));
                }
                Op::CallMethod { name, argc } => {
                    let args = pop_args(stack, argc)?;
                    let receiver = pop(stack)?;
                    let name = const_name(chunk, name)?;
                    let (func, object) = self.method(receiver, name)?;
                    return Ok(Flow::Enter(self.enter(func, Some(object), args, Resume::Value)?));
                }
                Op::CallHost { binding, argc } => {
                    let args = pop_args(stack, argc)?;
                    let result = self.call_host(binding as usize, &args)?;
                    stack.push(result);
                }
                Op::New { class, argc } => {
                    let args = pop_args(stack, argc)?;
                    return Ok(Flow::Enter(self.construct(class as usize, args)?));
                }

                Op::Return => return Ok(Flow::Return(stack.pop().unwrap_or_default())),
            }
        }

        Ok(Flow::Return(Value::Null))
    }
}

fn push_frame<'c>(frames: &mut Vec<Frame<'c>>, callee: Frame<'c>) -> VmResult<()> {
    if frames.len() >= MAX_CALL_DEPTH {
        return Err(RuntimeError::new(format!(
            "Call depth exceeded {MAX_CALL_DEPTH} (runaway recursion?) in '{}'",
            callee.name
        )));
    }
    frames.push(callee);
    Ok(())
}

fn pop(stack: &mut Vec<Value>) -> VmResult<Value> {
    stack.pop().ok_or_else(|| RuntimeError::new("Operand stack underflow"))
}

fn pop_args(stack: &mut Vec<Value>, argc: u8) -> VmResult<Vec<Value>> {
    let argc = usize::from(argc);
    let start = stack
        .len()
        .checked_sub(argc)
        .ok_or_else(|| RuntimeError::new("Operand stack underflow"))?;
    Ok(stack.split_off(start))
}

fn const_name(chunk: &Chunk, idx: u16) -> VmResult<&str> {
    chunk
        .constants
        .get(usize::from(idx))
        .and_then(Value::as_str)
        .ok_or_else(|| RuntimeError::new(format!("Invalid name constant {idx}")))
}

fn borrow(object: &ObjectRef) -> VmResult<std::cell::Ref<'_, Object>> {
    object
        .try_borrow()
        .map_err(|_| RuntimeError::new("Object is already being modified"))
}

fn receiver<'v>(value: &'v Value, field: &str) -> VmResult<&'v ObjectRef> {
    match value {
        Value::Object(obj) => Ok(obj),
        Value::Null => Err(RuntimeError::new(format!(
            "Object reference not set to an instance of an object (accessing '{field}')"
        ))),
        other => Err(RuntimeError::new(format!(
            "Cannot access field '{field}' on a value of type {}",
            other.type_name()
        ))),
    }
}

fn get_field(value: &Value, field: &str) -> VmResult<Value> {
    let object = borrow(receiver(value, field)?)?;
    object.fields.get(field).cloned().ok_or_else(|| {
        RuntimeError::new(format!(
            "'{}' does not contain a field named '{field}'",
            object.class_name
        ))
    })
}

fn set_field(value: &Value, field: &str, new_value: Value) -> VmResult<()> {
    let mut object = receiver(value, field)?
        .try_borrow_mut()
        .map_err(|_| RuntimeError::new("Object is already being modified"))?;
    match object.fields.get_mut(field) {
        Some(slot) => {
            *slot = new_value;
            Ok(())
        }
        None => Err(RuntimeError::new(format!(
            "'{}' does not contain a field named '{field}'",
            object.class_name
        ))),
    }
}

fn condition(value: Value) -> VmResult<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(RuntimeError::new(format!(
            "Condition must be a bool, got {}",
            other.type_name()
        ))),
    }
}

fn op_symbol(op: Op) -> &'static str {
    match op {
        Op::Add => "+",
        Op::Sub => "-",
        Op::Mul => "*",
        Op::Div => "/",
        Op::Mod => "%",
        Op::Lt => "<",
        Op::Gt => ">",
        Op::Le => "<=",
        Op::Ge => ">=",
        _ => "?",
    }
}

fn binary_type_error(op: Op, a: &Value, b: &Value) -> RuntimeError {
    RuntimeError::new(format!(
        "Operator '{}' cannot be applied to operands of type {} and {}",
        op_symbol(op),
        a.type_name(),
        b.type_name()
    ))
}

fn unary_type_error(symbol: &str, value: &Value) -> RuntimeError {
    RuntimeError::new(format!(
        "Operator '{symbol}' cannot be applied to an operand of type {}",
        value.type_name()
    ))
}

/// Integer arithmetic with overflow and division-by-zero faults.
fn int_binop(op: Op, a: i64, b: i64) -> VmResult<Value> {
    if matches!(op, Op::Div | Op::Mod) && b == 0 {
        return Err(RuntimeError::new("Attempted to divide by zero"));
    }
    let result = match op {
        Op::Add => a.checked_add(b),
        Op::Sub => a.checked_sub(b),
        Op::Mul => a.checked_mul(b),
        Op::Div => a.checked_div(b),
        Op::Mod => a.checked_rem(b),
        _ => None,
    };
    result
        .map(Value::Int)
        .ok_or_else(|| RuntimeError::new("Integer overflow"))
}

fn float_binop(op: Op, a: f64, b: f64) -> Value {
    Value::Float(match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div => a / b,
        _ => a % b,
    })
}

fn arithmetic(op: Op, a: Value, b: Value) -> VmResult<Value> {
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => int_binop(op, *x, *y),
        (Value::Str(_), _) | (_, Value::Str(_)) if op == Op::Add => Ok(Value::from(format!("{a}{b}"))),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(float_binop(op, x, y)),
            _ => Err(binary_type_error(op, &a, &b)),
        },
    }
}

fn compare(op: Op, a: &Value, b: &Value) -> VmResult<bool> {
    let ordering = match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => return Err(binary_type_error(op, a, b)),
        },
    };
    // NaN compares false with everything
    let Some(ordering) = ordering else { return Ok(false) };
    Ok(match op {
        Op::Lt => ordering.is_lt(),
        Op::Gt => ordering.is_gt(),
        Op::Le => ordering.is_le(),
        _ => ordering.is_ge(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::dsl::resolve::ResolveEnv;
    use crate::engine::modules::{select, Arity, HostCatalog, HostError, HostModule, ModuleView};

    fn catalog() -> HostCatalog {
        let mut catalog = HostCatalog::new();
        catalog.load(
            HostModule::new("Test")
                .with_function("double", Arity::Exact(1), |args| match args.first() {
                    Some(Value::Int(v)) => Ok(Value::Int(v * 2)),
                    _ => Err(HostError::new("expected int")),
                })
                .with_function("boom", Arity::Exact(0), |_| panic!("kaboom")),
        );
        catalog
    }

    struct Harness {
        catalog: HostCatalog,
        program: Program,
        globals: Vec<Value>,
        limit: Option<u64>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                catalog: catalog(),
                program: Program::default(),
                globals: Vec::new(),
                limit: None,
            }
        }

        fn run(&mut self, src: &str) -> VmResult<Value> {
            let allowed = select(&self.catalog, &["Test"]);
            let view = ModuleView::new(&self.catalog, allowed.clone());
            let env = ResolveEnv {
                program: &self.program,
                modules: &view,
                warning_level: 0,
            };
            let (unit, diags) = crate::dsl::compile_sources(&[src], &env);
            let unit = unit.unwrap_or_else(|| panic!("compile failed: {diags:?}"));
            let chunk = self.program.link(unit, &allowed).unwrap();
            let mut vm = Vm::new(&self.program, &mut self.globals, self.limit);
            vm.run_top_level(&chunk)
        }
    }

    fn run(src: &str) -> VmResult<Value> {
        Harness::new().run(src)
    }

    fn fault(src: &str) -> RuntimeError {
        run(src).unwrap_err()
    }

    #[test]
    fn integer_arithmetic() {
        assert_eq!(run("1 + 2 * 3;").unwrap(), Value::Int(7));
        assert_eq!(run("7 / 2;").unwrap(), Value::Int(3));
        assert_eq!(run("7 % 4;").unwrap(), Value::Int(3));
        assert_eq!(run("-(2 - 5);").unwrap(), Value::Int(3));
    }

    #[test]
    fn mixed_arithmetic_widens() {
        assert_eq!(run("1 + 0.5;").unwrap(), Value::Float(1.5));
        assert_eq!(run("3 / 2.0;").unwrap(), Value::Float(1.5));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(run("\"n=\" + 4;").unwrap(), Value::str("n=4"));
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(run("1 < 2 && 2 <= 2;").unwrap(), Value::Bool(true));
        assert_eq!(run("false || 3 > 4;").unwrap(), Value::Bool(false));
        assert_eq!(run("!(1 == 1.0);").unwrap(), Value::Bool(false));
        assert_eq!(run("\"a\" < \"b\";").unwrap(), Value::Bool(true));
    }

    #[test]
    fn functions_and_recursion() {
        let src = "fn fib(n) { if n < 2 { return n; } return fib(n - 1) + fib(n - 2); } fib(10);";
        assert_eq!(run(src).unwrap(), Value::Int(55));
    }

    #[test]
    fn while_loop() {
        let src = "let total = 0; let i = 0; while i < 5 { total = total + i; i = i + 1; } total;";
        assert_eq!(run(src).unwrap(), Value::Int(10));
    }

    #[test]
    fn classes_fields_and_methods() {
        let src = "class Counter {
                let count = 10;
                fn init(start) { this.count = this.count + start; }
                fn bump() { this.count = this.count + 1; return this; }
            }
            let c = new Counter(5);
            c.bump().bump();
            c.count;";
        assert_eq!(run(src).unwrap(), Value::Int(17));
    }

    #[test]
    fn host_calls() {
        assert_eq!(run("Test.double(21);").unwrap(), Value::Int(42));
        let err = fault("Test.double(\"x\");");
        assert!(err.message.contains("Test.double: expected int"));
    }

    #[test]
    fn host_panic_becomes_fault() {
        let err = fault("Test.boom();");
        assert!(err.message.contains("panicked: kaboom"), "{}", err.message);
    }

    #[test]
    fn division_by_zero_faults() {
        assert_eq!(fault("1 / 0;").message, "Attempted to divide by zero");
    }

    #[test]
    fn null_dereference_faults() {
        let err = fault("class A { let x; fn get() { return this.x; } } let a = null; a.get();");
        assert!(err.message.contains("Object reference not set"));
    }

    #[test]
    fn non_bool_condition_faults() {
        assert!(fault("if 1 { 2; }").message.contains("Condition must be a bool"));
    }

    #[test]
    fn runaway_recursion_is_bounded() {
        let err = fault("fn down(n) { return down(n + 1); } down(0);");
        assert!(err.message.contains("Call depth exceeded"));
        assert_eq!(err.trace.len(), MAX_CALL_DEPTH);
        assert_eq!(err.trace.last().unwrap(), "<top-level>");
    }

    #[test]
    fn deep_recursion_does_not_use_native_stack() {
        // Far smaller than a default thread stack; script frames must not
        // consume it.
        let handle = std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(|| {
                let sum = run("fn sum(n) { if n == 0 { return 0; } return n + sum(n - 1); } sum(900);")
                    .map(|v| v.to_string())
                    .map_err(|e| e.message);
                let runaway = fault("fn down(n) { return down(n + 1); } down(0);").message;
                (sum, runaway)
            })
            .unwrap();
        let (sum, runaway) = handle.join().unwrap();
        assert_eq!(sum.as_deref(), Ok("405450"));
        assert!(runaway.contains("Call depth exceeded"));
    }

    #[test]
    fn constructor_runs_after_field_initializers_in_nested_new() {
        let src = "class Inner { let v = 1; fn init(n) { this.v = this.v + n; } }
            class Outer { let inner = new Inner(2); fn init() { this.inner.v = this.inner.v * 10; } }
            new Outer().inner.v;";
        assert_eq!(run(src).unwrap(), Value::Int(30));
    }

    #[test]
    fn stack_trace_names_frames() {
        let err = fault("fn inner() { return 1 / 0; } fn outer() { return inner(); } outer();");
        assert_eq!(err.trace, vec!["inner", "outer", "<top-level>"]);
        assert!(err.to_string().contains("\n   at inner"));
    }

    #[test]
    fn instruction_limit_faults() {
        let mut h = Harness::new();
        h.limit = Some(1_000);
        let err = h.run("let i = 0; while true { i = i + 1; }").unwrap_err();
        assert!(err.message.contains("Instruction limit of 1000 exceeded"));
    }

    #[test]
    fn globals_persist_across_units() {
        let mut h = Harness::new();
        h.run("let x = 40;").unwrap();
        h.run("fn addx(n) { return x + n; }").unwrap();
        assert_eq!(h.run("addx(2);").unwrap(), Value::Int(42));
    }

    #[test]
    fn redeclared_function_replaces_symbol() {
        let mut h = Harness::new();
        h.run("fn v() { return 1; }").unwrap();
        h.run("fn v() { return 2; }").unwrap();
        assert_eq!(h.run("v();").unwrap(), Value::Int(2));
    }

    #[test]
    fn unloaded_module_faults() {
        let mut h = Harness::new();
        h.run("fn d() { return Test.double(1); }").unwrap();
        h.catalog.unload("Test");
        // Compiled code keeps the dead binding; the call faults instead of panicking.
        let program = &h.program;
        let id = program.function_id("d").unwrap();
        let mut vm = Vm::new(program, &mut h.globals, None);
        let err = vm.call(id, None, Vec::new()).unwrap_err();
        assert!(err.message.contains("has been unloaded"));
    }
}
