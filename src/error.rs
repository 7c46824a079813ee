use thiserror::Error;

use crate::lex::LexerError;
use crate::parse::ParserError;
use crate::semantic::SemanticError;
use crate::source::Located;

/// Error de compilación con su fase de origen. El primer error de
/// cualquier fase aborta la tubería; el formato de salida es
/// `<fase>: <mensaje> at <línea>:<columna>`.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("lexer: {0}")]
    Lex(#[from] Located<LexerError>),

    #[error("parser: {0}")]
    Parse(#[from] Located<ParserError>),

    #[error("semantic: {0}")]
    Semantic(#[from] Located<SemanticError>),

    /// Invariante interna rota durante la emisión.
    #[error("emitter: internal compiler error: {0}")]
    Internal(&'static str),
}

impl CompileError {
    /// Código de salida del proceso: 1 para errores del usuario,
    /// 2 para errores internos del compilador.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::Internal(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::tokenize;

    #[test]
    fn stage_and_position_appear_in_messages() {
        let error: CompileError = tokenize("MODULE M? END M.").unwrap_err().into();

        let message = error.to_string();
        assert!(message.starts_with("lexer: "));
        assert!(message.ends_with("at 1:9"));
        assert_eq!(error.exit_code(), 1);
    }
}
