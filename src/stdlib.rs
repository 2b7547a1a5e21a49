//! Standard host modules every loader offers to scripts.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::console::Console;
use crate::dsl::value::Value;
use crate::engine::modules::{Arity, HostCatalog, HostError, HostModule};

/// Modules an inline engine may reference unless settings say otherwise.
pub const DEFAULT_ALLOWED_MODULES: &[&str] = &["Console", "Math", "Text", "Debug", "Host"];

/// A catalog holding `Console`, `Debug`, `Math`, `Text` and `Host`.
pub fn standard_catalog(console: Arc<dyn Console>) -> HostCatalog {
    let mut catalog = HostCatalog::new();
    catalog.load(console_module(Arc::clone(&console)));
    catalog.load(debug_module(console));
    catalog.load(math_module());
    catalog.load(text_module());
    catalog.load(host_module());
    catalog
}

fn joined(args: &[Value]) -> String {
    args.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
}

fn console_module(console: Arc<dyn Console>) -> HostModule {
    let log_console = Arc::clone(&console);
    HostModule::new("Console")
        .with_function("print", Arity::AtLeast(0), move |args| {
            console.write_line(&joined(args));
            Ok(Value::Null)
        })
        .with_function("log", Arity::AtLeast(0), move |args| {
            let line = joined(args);
            log::info!(target: "script", "{line}");
            log_console.write_line(&line);
            Ok(Value::Null)
        })
}

fn debug_module(console: Arc<dyn Console>) -> HostModule {
    HostModule::new("Debug").with_function("log", Arity::AtLeast(1), move |args| {
        let Some((message, rest)) = args.split_first() else {
            return Err(HostError::new("Debug.log expects a message"));
        };
        let line = match message {
            Value::Null => "NULL".to_string(),
            other => format_placeholders(&other.to_string(), rest),
        };
        console.write_line(&line);
        Ok(Value::Null)
    })
}

/// Replace `{0}`, `{1}`, ... with the matching argument. Placeholders with no
/// argument are left as written.
pub fn format_placeholders(template: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some((before, after)) = rest.split_once('{') {
        out.push_str(before);
        let substituted = after.split_once('}').and_then(|(inner, tail)| {
            let index: usize = inner.parse().ok()?;
            Some((args.get(index)?.to_string(), tail))
        });
        match substituted {
            Some((text, tail)) => {
                out.push_str(&text);
                rest = tail;
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn number(args: &[Value], index: usize, function: &str) -> Result<f64, HostError> {
    args.get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| HostError::new(format!("{function} expects a number as argument {}", index + 1)))
}

fn text(args: &[Value], index: usize, function: &str) -> Result<String, HostError> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s.to_string()),
        Some(other) => Err(HostError::new(format!(
            "{function} expects a string as argument {}, got {}",
            index + 1,
            other.type_name()
        ))),
        None => Err(HostError::new(format!("{function} is missing argument {}", index + 1))),
    }
}

fn unary(module: HostModule, name: &'static str, f: fn(f64) -> f64) -> HostModule {
    module.with_function(name, Arity::Exact(1), move |args| Ok(Value::Float(f(number(args, 0, name)?))))
}

/// `min`/`max`: ints stay ints, anything else widens to float. The right
/// operand wins only when the comparison comes out as `replace_when`.
fn pick(args: &[Value], name: &str, replace_when: Ordering) -> Result<Value, HostError> {
    if let (Some(Value::Int(a)), Some(Value::Int(b))) = (args.first(), args.get(1)) {
        return Ok(Value::Int(if a.cmp(b) == replace_when { *b } else { *a }));
    }
    let (a, b) = (number(args, 0, name)?, number(args, 1, name)?);
    Ok(Value::Float(if a.partial_cmp(&b) == Some(replace_when) { b } else { a }))
}

fn math_module() -> HostModule {
    let module = HostModule::new("Math");
    let module = unary(module, "sqrt", f64::sqrt);
    let module = unary(module, "sin", f64::sin);
    let module = unary(module, "cos", f64::cos);
    let module = unary(module, "tan", f64::tan);
    let module = unary(module, "floor", f64::floor);
    let module = unary(module, "ceil", f64::ceil);
    let module = unary(module, "round", f64::round);
    module
        .with_function("abs", Arity::Exact(1), |args| match args.first() {
            Some(Value::Int(v)) => v
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(|| HostError::new("Integer overflow")),
            _ => Ok(Value::Float(number(args, 0, "abs")?.abs())),
        })
        .with_function("pow", Arity::Exact(2), |args| {
            Ok(Value::Float(number(args, 0, "pow")?.powf(number(args, 1, "pow")?)))
        })
        .with_function("min", Arity::Exact(2), |args| pick(args, "min", Ordering::Greater))
        .with_function("max", Arity::Exact(2), |args| pick(args, "max", Ordering::Less))
        .with_function("clamp", Arity::Exact(3), |args| {
            if let (Some(Value::Int(v)), Some(Value::Int(lo)), Some(Value::Int(hi))) =
                (args.first(), args.get(1), args.get(2))
            {
                if lo > hi {
                    return Err(HostError::new("clamp: min is greater than max"));
                }
                return Ok(Value::Int(*v.max(lo).min(hi)));
            }
            let (v, lo, hi) = (number(args, 0, "clamp")?, number(args, 1, "clamp")?, number(args, 2, "clamp")?);
            if lo > hi {
                return Err(HostError::new("clamp: min is greater than max"));
            }
            Ok(Value::Float(v.clamp(lo, hi)))
        })
        .with_function("pi", Arity::Exact(0), |_| Ok(Value::Float(std::f64::consts::PI)))
}

fn text_module() -> HostModule {
    HostModule::new("Text")
        .with_function("len", Arity::Exact(1), |args| {
            let s = text(args, 0, "len")?;
            Ok(Value::Int(i64::try_from(s.chars().count()).unwrap_or(i64::MAX)))
        })
        .with_function("upper", Arity::Exact(1), |args| Ok(Value::str(text(args, 0, "upper")?.to_uppercase())))
        .with_function("lower", Arity::Exact(1), |args| Ok(Value::str(text(args, 0, "lower")?.to_lowercase())))
        .with_function("concat", Arity::AtLeast(0), |args| {
            Ok(Value::str(args.iter().map(ToString::to_string).collect::<String>()))
        })
        .with_function("contains", Arity::Exact(2), |args| {
            Ok(Value::Bool(text(args, 0, "contains")?.contains(&text(args, 1, "contains")?)))
        })
}

fn host_module() -> HostModule {
    HostModule::new("Host")
        .with_function("name", Arity::Exact(0), |_| Ok(Value::str(env!("CARGO_PKG_NAME"))))
        .with_function("version", Arity::Exact(0), |_| Ok(Value::str(env!("CARGO_PKG_VERSION"))))
}
