#[macro_use]
mod macros;

pub mod codegen;
pub mod error;
pub mod interp;
pub mod lex;
pub mod parse;
pub mod semantic;
pub mod source;

pub use error::CompileError;

/// Ejecuta las fases de análisis sobre un módulo fuente. El programa
/// resultante es la entrada común de [`codegen::emit`] y de
/// [`interp::run`].
pub fn compile(source: &str) -> Result<semantic::Program, CompileError> {
    let tokens = lex::tokenize(source)?;
    let module = parse::parse(&tokens)?;
    let program = module.analyze()?;

    Ok(program)
}
