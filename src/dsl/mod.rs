#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod ast;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod error;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod lexer;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod parser;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod resolve;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod compiler;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod program;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod value;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod vm;

use compiler::CompiledUnit;
use error::Diagnostic;
use resolve::ResolveEnv;

/// Compile the files of one unit against the linked program.
///
/// source files → lex → parse → resolve → compile → `CompiledUnit`
///
/// Diagnostics come back in emission order, warnings included. The unit is
/// `None` when any of them is an error. Spans carry the index of their file
/// in `sources`.
pub fn compile_sources(sources: &[&str], env: &ResolveEnv<'_>) -> (Option<CompiledUnit>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut files = Vec::with_capacity(sources.len());

    for (index, source) in sources.iter().enumerate() {
        let Ok(file) = u16::try_from(index) else {
            diagnostics.push(Diagnostic::compiler("Too many source files", ast::Span::default()));
            return (None, diagnostics);
        };
        match lexer::lex(source, file).and_then(parser::parse) {
            Ok(ast) => files.push(ast),
            Err(errors) => diagnostics.extend(errors),
        }
    }
    if !diagnostics.is_empty() {
        return (None, diagnostics);
    }

    let (unit, resolve_diagnostics) = resolve::resolve(&files, env);
    let failed = resolve_diagnostics.iter().any(Diagnostic::is_error);
    diagnostics.extend(resolve_diagnostics);
    if failed {
        return (None, diagnostics);
    }

    match compiler::compile(unit, env.program.host_bindings.len()) {
        Ok(compiled) => (Some(compiled), diagnostics),
        Err(e) => {
            diagnostics.push(e);
            (None, diagnostics)
        }
    }
}
