//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone el código
//! fuente (un flujo de caracteres) en unidades léxicas denominadas
//! tokens. Los espacios en blanco y los comentarios `(* ... *)` se
//! descartan durante esta operación. Cada token emitido esta asociado
//! a una posición en el código fuente original, lo cual permite
//! rastrear errores en tanto los mismos como constructos más elevados
//! de fases posteriores.
//!
//! # Contenido de un token
//! Este lexer no produce lexemas para casos donde no son necesarios.
//! Operadores, puntuación y palabras clave se identifican por el hecho
//! de lo que son y no incluyen lexemas. Por su parte, los identificadores
//! sí incluyen su lexema original. Las constantes literales se resuelven
//! a sus valores en vez de preservar sus lexemas.
//!
//! # Reglas importantes del lenguaje
//! - Las palabras clave se escriben en mayúsculas y el lenguaje es
//!   case-sensitive, por lo cual `BEGIN` es una palabra clave mientras
//!   que `begin` y `Begin` son identificadores.
//! - Los identificadores comienzan con una letra o `'_'`.
//! - Los comentarios no anidan.
//! - Las cadenas no admiten secuencias de escape y no pueden contener
//!   una comilla doble literal.

use crate::source::{Located, Position};
use std::{
    fmt::{self, Display},
    iter::Peekable,
    mem,
    rc::Rc,
    str::FromStr,
};

use thiserror::Error;

/// Literal entero máximo.
const INT_MAX: i32 = i32::MAX;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("bad character {0:?} in input stream")]
    BadChar(char),

    /// El archivo terminó en medio de un literal de cadena.
    #[error("unterminated string literal")]
    UnterminatedString,

    /// El archivo terminó en medio de un comentario.
    #[error("unterminated comment")]
    UnterminatedComment,

    /// Un literal real debe llevar dígitos tras el punto decimal.
    #[error("expected digit after decimal point")]
    ExpectedDigit,

    /// Una constante entera se encuentra fuera de rango.
    #[error("integer literal overflow, valid range is [0, {INT_MAX}]")]
    IntOverflow,
}

/// Un identificador.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Rc<str>);

impl Identifier {
    fn new(name: String) -> Self {
        Identifier(Rc::from(name))
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier(Rc::from(name))
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(fmt)
    }
}

/// Objeto resultante del análisis léxico.
///
/// Un token contiene suficiente información para describir completamente
/// a una entidad léxica en el programa fuente.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identificador.
    Id(Identifier),

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal de entero.
    IntLiteral(i32),

    /// Literal de punto flotante.
    RealLiteral(f64),

    /// Literal de cadena.
    StrLiteral(Rc<str>),

    /// `:=`
    Assign,

    /// `=`
    Equal,

    /// `#`
    NotEqual,

    /// `<`
    Less,

    /// `<=`
    LessEqual,

    /// `>`
    Greater,

    /// `>=`
    GreaterEqual,

    /// `+`
    Plus,

    /// `-`
    Minus,

    /// `*`
    Times,

    /// `/`
    Slash,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `[`
    OpenBracket,

    /// `]`
    CloseBracket,

    /// `,`
    Comma,

    /// `;`
    Semicolon,

    /// `:`
    Colon,

    /// `.`
    Period,

    /// Fin del archivo.
    Eof,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            IntLiteral(integer) => write!(fmt, "literal `{}`", integer),
            RealLiteral(real) => write!(fmt, "literal `{}`", real),
            StrLiteral(string) => write!(fmt, "string literal {:?}", string),
            Assign => fmt.write_str("`:=`"),
            Equal => fmt.write_str("`=`"),
            NotEqual => fmt.write_str("`#`"),
            Less => fmt.write_str("`<`"),
            LessEqual => fmt.write_str("`<=`"),
            Greater => fmt.write_str("`>`"),
            GreaterEqual => fmt.write_str("`>=`"),
            Plus => fmt.write_str("`+`"),
            Minus => fmt.write_str("`-`"),
            Times => fmt.write_str("`*`"),
            Slash => fmt.write_str("`/`"),
            OpenParen => fmt.write_str("`(`"),
            CloseParen => fmt.write_str("`)`"),
            OpenBracket => fmt.write_str("`[`"),
            CloseBracket => fmt.write_str("`]`"),
            Comma => fmt.write_str("`,`"),
            Semicolon => fmt.write_str("`;`"),
            Colon => fmt.write_str("`:`"),
            Period => fmt.write_str("`.`"),
            Eof => fmt.write_str("end of file"),
        }
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Module,
    Begin,
    End,
    Var,
    Const,
    Procedure,
    If,
    Then,
    Else,
    While,
    Do,
    For,
    To,
    Return,
    Array,
    Of,
    Integer,
    Real,
    String,
    Div,
    Mod,
    And,
    Or,
}

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let string = KEYWORDS
            .iter()
            .find(|&&(_, keyword)| keyword == *self)
            .map(|&(name, _)| name)
            .unwrap();

        fmt.write_str(string)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// El lenguaje distingue mayúsculas de minúsculas, por lo cual esta
/// tabla se consulta con el lexema exacto.
const KEYWORDS: &[(&str, Keyword)] = &[
    ("MODULE", Keyword::Module),
    ("BEGIN", Keyword::Begin),
    ("END", Keyword::End),
    ("VAR", Keyword::Var),
    ("CONST", Keyword::Const),
    ("PROCEDURE", Keyword::Procedure),
    ("IF", Keyword::If),
    ("THEN", Keyword::Then),
    ("ELSE", Keyword::Else),
    ("WHILE", Keyword::While),
    ("DO", Keyword::Do),
    ("FOR", Keyword::For),
    ("TO", Keyword::To),
    ("RETURN", Keyword::Return),
    ("ARRAY", Keyword::Array),
    ("OF", Keyword::Of),
    ("INTEGER", Keyword::Integer),
    ("REAL", Keyword::Real),
    ("STRING", Keyword::String),
    ("DIV", Keyword::Div),
    ("MOD", Keyword::Mod),
    ("AND", Keyword::And),
    ("OR", Keyword::Or),
];

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<S: Iterator> {
    source: Peekable<S>,
    state: State,
    start: Position,
    here: Position,
    failed: bool,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Estado de completitud; siempre emite el token incluido
    /// sin consumir la entrada actual y pasa a [`State::Start`].
    Complete(Token),

    /// Se encontró `(`, que puede abrir un comentario o ser un token.
    AfterParen,

    /// Se encontró `:`, que puede extenderse a `:=`.
    AfterColon,

    /// Se encontró `<`, que puede extenderse a `<=`.
    AfterLess,

    /// Se encontró `>`, que puede extenderse a `>=`.
    AfterGreater,

    /// Comentario `(* ... *)`.
    Comment,

    /// Se encontró `*` dentro de un comentario.
    CommentStar,

    /// Parte entera de una constante numérica.
    Digits(String),

    /// Se encontró el punto decimal de una constante real.
    DigitsDot(String),

    /// Parte fraccionaria de una constante real.
    Fraction(String),

    /// Literal de cadena.
    Quoted(String),

    /// Término que puede ser un identificador o una palabra clave.
    Word(String),
}

impl<S: Iterator<Item = (char, Position)>> Lexer<S> {
    /// Crea un lexer en estado inicial a partir de un flujo.
    pub fn new(source: S) -> Self {
        Lexer {
            source: source.peekable(),
            state: State::Start,
            start: Position::default(),
            here: Position::default(),
            failed: false,
        }
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<Token>, LexerError> {
        use {State::*, Token::*};

        let token = loop {
            let next_char = self.source.peek().map(|&(c, _)| c);
            if let Some(&(_, position)) = self.source.peek() {
                self.here = position;
            }

            // La posición de origen se mueve junto a la posición
            // siguiente siempre que no se haya encontrado una
            // frontera de token
            if let Start = self.state {
                self.start = self.here;
            }

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            match (&mut self.state, next_char) {
                (Start, None) => return Ok(None),

                // Tokens triviales
                (Start, Some(';')) => self.state = Complete(Semicolon),
                (Start, Some(',')) => self.state = Complete(Comma),
                (Start, Some('.')) => self.state = Complete(Period),
                (Start, Some('+')) => self.state = Complete(Plus),
                (Start, Some('-')) => self.state = Complete(Minus),
                (Start, Some('*')) => self.state = Complete(Times),
                (Start, Some('/')) => self.state = Complete(Slash),
                (Start, Some('=')) => self.state = Complete(Equal),
                (Start, Some('#')) => self.state = Complete(NotEqual),
                (Start, Some(')')) => self.state = Complete(CloseParen),
                (Start, Some('[')) => self.state = Complete(OpenBracket),
                (Start, Some(']')) => self.state = Complete(CloseBracket),

                // Tokens que requieren lookahead
                (Start, Some('(')) => self.state = AfterParen,
                (Start, Some(':')) => self.state = AfterColon,
                (Start, Some('<')) => self.state = AfterLess,
                (Start, Some('>')) => self.state = AfterGreater,

                // Literales de cadena
                (Start, Some('"')) => self.state = Quoted(String::new()),

                // Identificadores y palabras clave
                (Start, Some(c)) if c.is_ascii_alphabetic() || c == '_' => {
                    self.state = Word(c.to_string())
                }

                // Inicio de una constante numérica. No se consume
                // el dígito, ya que esta lógica ya está implementada
                // en el caso de acumulación del estado respectivo.
                (Start, Some(c)) if c.is_ascii_digit() => {
                    self.state = Digits(String::new());
                    continue;
                }

                // Espacios en blanco y caracteres inesperados
                (Start, Some(c)) if c.is_ascii_whitespace() => (),
                (Start, Some(c)) => break Err(LexerError::BadChar(c)),

                // Emisión retardada de tokens cualesquiera
                (Complete(token), _) => break Ok(mem::replace(token, Period)),

                // `(` abre un comentario si y solo si le sigue `*`
                (AfterParen, Some('*')) => self.state = Comment,
                (AfterParen, _) => break Ok(OpenParen),

                // `:`, `<` y `>` se extienden con un `=` inmediato
                (AfterColon, Some('=')) => self.state = Complete(Assign),
                (AfterColon, _) => break Ok(Colon),
                (AfterLess, Some('=')) => self.state = Complete(LessEqual),
                (AfterLess, _) => break Ok(Less),
                (AfterGreater, Some('=')) => self.state = Complete(GreaterEqual),
                (AfterGreater, _) => break Ok(Greater),

                // Los comentarios se descartan y no anidan
                (Comment, None) | (CommentStar, None) => {
                    break Err(LexerError::UnterminatedComment)
                }
                (Comment, Some('*')) => self.state = CommentStar,
                (Comment, Some(_)) => (),
                (CommentStar, Some(')')) => self.state = Start,
                (CommentStar, Some('*')) => (),
                (CommentStar, Some(_)) => self.state = Comment,

                // Acumulación dígito por dígito de constantes numéricas
                (Digits(text), Some(c)) if c.is_ascii_digit() => text.push(c),
                (Digits(text), Some('.')) => {
                    let mut text = mem::take(text);
                    text.push('.');
                    self.state = DigitsDot(text);
                }
                (Digits(text), _) => {
                    break text
                        .parse::<i32>()
                        .map(IntLiteral)
                        .map_err(|_| LexerError::IntOverflow)
                }

                // Un punto decimal exige al menos un dígito fraccionario
                (DigitsDot(text), Some(c)) if c.is_ascii_digit() => {
                    self.state = Fraction(mem::take(text));
                    continue;
                }
                (DigitsDot(_), _) => break Err(LexerError::ExpectedDigit),

                (Fraction(text), Some(c)) if c.is_ascii_digit() => text.push(c),
                (Fraction(text), _) => {
                    // Solo dígitos y un punto llegan hasta aquí
                    break Ok(RealLiteral(text.parse::<f64>().unwrap()));
                }

                // Las cadenas se toman verbatim, sin escapes
                (Quoted(_), None) => break Err(LexerError::UnterminatedString),
                (Quoted(text), Some('"')) => {
                    let text = mem::take(text);
                    self.state = Complete(StrLiteral(Rc::from(text)));
                }
                (Quoted(text), Some(c)) => text.push(c),

                // Extensión de términos
                (Word(word), Some(c)) if c.is_ascii_alphanumeric() || c == '_' => {
                    word.push(c);
                }

                // Si sigue algo que no puede formar parte del término, ha terminado
                (Word(word), _) => {
                    if let Ok(keyword) = self::Keyword::from_str(word) {
                        break Ok(Keyword(keyword));
                    } else {
                        break Ok(Id(Identifier::new(mem::take(word))));
                    }
                }
            }

            // Si no hubo `continue`, aquí se consume el carácter que
            // se observó con lookahead anteriormente
            self.source.next();
        };

        token.map(Some)
    }
}

impl<S: Iterator<Item = (char, Position)>> Iterator for Lexer<S> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match self.lex() {
            Ok(None) => None,
            Ok(Some(token)) => {
                self.state = State::Start;
                Some(Ok(Located::at(token, self.start)))
            }

            Err(error) => {
                self.failed = true;
                Some(Err(Located::at(error, self.here)))
            }
        }
    }
}

/// Reduce código fuente a una secuencia de tokens que termina en
/// [`Token::Eof`], o bien al primer error léxico encontrado.
pub fn tokenize(source: &str) -> Result<Vec<Located<Token>>, Located<LexerError>> {
    let mut lexer = Lexer::new(crate::source::chars(source));

    let mut tokens = Vec::new();
    for result in &mut lexer {
        tokens.push(result?);
    }

    tokens.push(Located::at(Token::Eof, lexer.here.advance()));
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(Located::into_inner)
            .collect()
    }

    #[test]
    fn lexes_a_minimal_module() {
        use Token::*;
        use self::Keyword::*;

        assert_eq!(
            kinds("MODULE T; BEGIN END T."),
            vec![
                Keyword(Module),
                Id("T".into()),
                Semicolon,
                Keyword(Begin),
                Keyword(End),
                Id("T".into()),
                Period,
                Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert_eq!(
            kinds("module"),
            vec![Token::Id("module".into()), Token::Eof]
        );
    }

    #[test]
    fn distinguishes_compound_operators() {
        use Token::*;

        assert_eq!(
            kinds(":= : <= < >= > = #"),
            vec![
                Assign, Colon, LessEqual, Less, GreaterEqual, Greater, Equal, NotEqual, Eof
            ]
        );
    }

    #[test]
    fn numeric_literals_resolve_to_values() {
        assert_eq!(
            kinds("42 3.25 0"),
            vec![
                Token::IntLiteral(42),
                Token::RealLiteral(3.25),
                Token::IntLiteral(0),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn comments_and_whitespace_are_skipped() {
        assert_eq!(
            kinds("a (* x := 1; ** not nested *) b"),
            vec![Token::Id("a".into()), Token::Id("b".into()), Token::Eof]
        );
    }

    #[test]
    fn tracks_line_and_column() {
        let tokens = tokenize("x :=\n  1;").unwrap();

        let positions: Vec<_> = tokens
            .iter()
            .map(|token| (token.position().line(), token.position().column()))
            .collect();

        assert_eq!(positions, vec![(1, 1), (1, 3), (2, 3), (2, 4), (2, 5)]);
    }

    #[test]
    fn rejects_integer_overflow() {
        let error = tokenize("2147483648").unwrap_err();
        assert!(matches!(error.val(), LexerError::IntOverflow));

        assert_eq!(kinds("2147483647"), vec![Token::IntLiteral(i32::MAX), Token::Eof]);
    }

    #[test]
    fn rejects_unterminated_string() {
        let error = tokenize("\"abc").unwrap_err();
        assert!(matches!(error.val(), LexerError::UnterminatedString));
    }

    #[test]
    fn rejects_unterminated_comment() {
        let error = tokenize("(* abc *").unwrap_err();
        assert!(matches!(error.val(), LexerError::UnterminatedComment));
    }

    #[test]
    fn rejects_bare_decimal_point() {
        let error = tokenize("2.x").unwrap_err();
        assert!(matches!(error.val(), LexerError::ExpectedDigit));
    }

    #[test]
    fn rejects_bad_characters() {
        let error = tokenize("a ! b").unwrap_err();
        assert!(matches!(error.val(), LexerError::BadChar('!')));
        assert_eq!(error.position().column(), 3);
    }

    #[test]
    fn strings_are_verbatim() {
        assert_eq!(
            kinds("\"hello, world\""),
            vec![Token::StrLiteral("hello, world".into()), Token::Eof]
        );
    }
}
