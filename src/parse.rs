//! Análisis sintáctico por descenso recursivo.

use std::fmt::{self, Display, Write};
use std::rc::Rc;

use crate::lex::{Identifier, Keyword, Token};
use crate::source::{Located, Position};
use thiserror::Error;

pub type Parse<T> = Result<T, Located<ParserError>>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("expected {0}, got {1}")]
    Expected(Token, Token),

    #[error("expected identifier, got {0}")]
    ExpectedId(Token),

    #[error("expected a type, got {0}")]
    ExpectedType(Token),

    #[error("expected a statement, got {0}")]
    ExpectedStatement(Token),

    #[error("expected an expression, got {0}")]
    ExpectedExpression(Token),

    #[error("array length must be a positive integer literal, got {0}")]
    BadArrayLength(Token),

    #[error("{0} `{1}` ends with mismatched name `{2}`")]
    NameMismatch(&'static str, Identifier, Identifier),
}

/// Un módulo fuente completo.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: Located<Identifier>,
    pub decls: Vec<Decl>,
    pub body: Vec<Located<Stmt>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Const {
        name: Located<Identifier>,
        value: Located<Expr>,
    },

    Var {
        names: Vec<Located<Identifier>>,
        ty: Located<TypeExpr>,
    },

    Proc(ProcDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcDecl {
    pub name: Located<Identifier>,
    pub params: Vec<ParamGroup>,
    pub ret: Option<Located<TypeExpr>>,
    pub decls: Vec<Decl>,
    pub body: Vec<Located<Stmt>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamGroup {
    pub names: Vec<Located<Identifier>>,
    pub ty: Located<TypeExpr>,
}

/// Sintaxis de un tipo. Los arrays conservan aquí su forma superficial;
/// la fase semántica los canoniza a la forma anidada por la derecha.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Integer,
    Real,
    String,
    Array {
        lengths: Vec<Located<i32>>,
        element: Box<Located<TypeExpr>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        target: Designator,
        value: Located<Expr>,
    },

    Call {
        name: Located<Identifier>,
        args: Vec<Located<Expr>>,
    },

    If {
        condition: Located<Expr>,
        then_branch: Vec<Located<Stmt>>,
        else_branch: Vec<Located<Stmt>>,
    },

    While {
        condition: Located<Expr>,
        body: Vec<Located<Stmt>>,
    },

    For {
        var: Located<Identifier>,
        from: Located<Expr>,
        to: Located<Expr>,
        body: Vec<Located<Stmt>>,
    },

    Return(Option<Located<Expr>>),
}

/// Referencia a una variable, opcionalmente indexada. `a[i, j]` y
/// `a[i][j]` producen el mismo designador de dos índices.
#[derive(Debug, Clone, PartialEq)]
pub struct Designator {
    pub name: Located<Identifier>,
    pub indices: Vec<Located<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i32),
    Real(f64),
    Str(Rc<str>),
    Designator(Designator),

    Call {
        name: Located<Identifier>,
        args: Vec<Located<Expr>>,
    },

    Binary {
        op: BinOp,
        lhs: Box<Located<Expr>>,
        rhs: Box<Located<Expr>>,
    },

    Unary {
        op: UnOp,
        operand: Box<Located<Expr>>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Quot,
    Div,
    Mod,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Display for BinOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BinOp::*;

        fmt.write_str(match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Quot => "/",
            Div => "DIV",
            Mod => "MOD",
            And => "AND",
            Or => "OR",
            Eq => "=",
            Ne => "#",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnOp {
    Plus,
    Minus,
}

impl Display for UnOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            UnOp::Plus => "+",
            UnOp::Minus => "-",
        })
    }
}

/// Construye el árbol sintáctico de un módulo a partir de su
/// secuencia de tokens. El primer token inesperado aborta el
/// análisis; no hay recuperación de errores.
pub fn parse(tokens: &[Located<Token>]) -> Parse<Module> {
    let mut parser = Parser { tokens, index: 0 };
    parser.parse_module()
}

struct Parser<'a> {
    tokens: &'a [Located<Token>],
    index: usize,
}

impl Parser<'_> {
    fn current(&self) -> &Located<Token> {
        // tokenize() garantiza un Token::Eof final
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.index < self.tokens.len() {
            self.index += 1;
        }
    }

    fn check(&self, token: &Token) -> bool {
        self.current().val() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Parse<Position> {
        let current = self.current();
        if *current.val() == expected {
            let position = current.position();
            self.advance();
            Ok(position)
        } else {
            Err(self.unexpected(ParserError::Expected(expected, current.val().clone())))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Parse<Position> {
        self.expect(Token::Keyword(keyword))
    }

    fn expect_id(&mut self) -> Parse<Located<Identifier>> {
        match self.current().val() {
            Token::Id(id) => {
                let id = Located::at(id.clone(), self.current().position());
                self.advance();
                Ok(id)
            }

            other => Err(self.unexpected(ParserError::ExpectedId(other.clone()))),
        }
    }

    fn unexpected(&self, error: ParserError) -> Located<ParserError> {
        Located::at(error, self.current().position())
    }

    fn parse_module(&mut self) -> Parse<Module> {
        self.expect_keyword(Keyword::Module)?;
        let name = self.expect_id()?;
        self.expect(Token::Semicolon)?;

        let decls = self.parse_decls()?;

        self.expect_keyword(Keyword::Begin)?;
        let body = self.parse_stmts()?;
        self.expect_keyword(Keyword::End)?;

        let end_name = self.expect_id()?;
        if end_name.val() != name.val() {
            let (position, found) = end_name.split();
            let error = ParserError::NameMismatch("module", name.into_inner(), found);
            return Err(Located::at(error, position));
        }

        self.expect(Token::Period)?;
        self.expect(Token::Eof)?;

        Ok(Module { name, decls, body })
    }

    fn parse_decls(&mut self) -> Parse<Vec<Decl>> {
        let mut decls = Vec::new();

        loop {
            match self.current().val() {
                Token::Keyword(Keyword::Const) => decls.push(self.parse_const_decl()?),
                Token::Keyword(Keyword::Var) => self.parse_var_decls(&mut decls)?,
                Token::Keyword(Keyword::Procedure) => {
                    decls.push(Decl::Proc(self.parse_proc_decl()?))
                }

                _ => break Ok(decls),
            }
        }
    }

    fn parse_const_decl(&mut self) -> Parse<Decl> {
        self.expect_keyword(Keyword::Const)?;
        let name = self.expect_id()?;
        self.expect(Token::Equal)?;
        let value = self.parse_expr()?;
        self.expect(Token::Semicolon)?;

        Ok(Decl::Const { name, value })
    }

    /// Un solo `VAR` puede introducir varios grupos `a, b: T;`.
    fn parse_var_decls(&mut self, decls: &mut Vec<Decl>) -> Parse<()> {
        self.expect_keyword(Keyword::Var)?;

        loop {
            let names = self.parse_id_list()?;
            self.expect(Token::Colon)?;
            let ty = self.parse_type()?;
            self.expect(Token::Semicolon)?;

            decls.push(Decl::Var { names, ty });

            if !matches!(self.current().val(), Token::Id(_)) {
                break Ok(());
            }
        }
    }

    fn parse_id_list(&mut self) -> Parse<Vec<Located<Identifier>>> {
        let mut names = vec![self.expect_id()?];
        while self.eat(&Token::Comma) {
            names.push(self.expect_id()?);
        }

        Ok(names)
    }

    fn parse_proc_decl(&mut self) -> Parse<ProcDecl> {
        self.expect_keyword(Keyword::Procedure)?;
        let name = self.expect_id()?;

        self.expect(Token::OpenParen)?;
        let mut params = Vec::new();
        if !self.check(&Token::CloseParen) {
            loop {
                let names = self.parse_id_list()?;
                self.expect(Token::Colon)?;
                let ty = self.parse_type()?;
                params.push(ParamGroup { names, ty });

                if !self.eat(&Token::Semicolon) {
                    break;
                }
            }
        }
        self.expect(Token::CloseParen)?;

        let ret = if self.eat(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(Token::Semicolon)?;

        let decls = self.parse_decls()?;

        self.expect_keyword(Keyword::Begin)?;
        let body = self.parse_stmts()?;
        self.expect_keyword(Keyword::End)?;

        let end_name = self.expect_id()?;
        if end_name.val() != name.val() {
            let (position, found) = end_name.split();
            let error = ParserError::NameMismatch("procedure", name.into_inner(), found);
            return Err(Located::at(error, position));
        }
        self.expect(Token::Semicolon)?;

        Ok(ProcDecl {
            name,
            params,
            ret,
            decls,
            body,
        })
    }

    fn parse_type(&mut self) -> Parse<Located<TypeExpr>> {
        let position = self.current().position();
        let ty = match self.current().val() {
            Token::Keyword(Keyword::Integer) => {
                self.advance();
                TypeExpr::Integer
            }

            Token::Keyword(Keyword::Real) => {
                self.advance();
                TypeExpr::Real
            }

            Token::Keyword(Keyword::String) => {
                self.advance();
                TypeExpr::String
            }

            Token::Keyword(Keyword::Array) => {
                self.advance();

                let mut lengths = vec![self.parse_array_length()?];
                while self.eat(&Token::Comma) {
                    lengths.push(self.parse_array_length()?);
                }

                self.expect_keyword(Keyword::Of)?;
                let element = Box::new(self.parse_type()?);

                TypeExpr::Array { lengths, element }
            }

            other => return Err(self.unexpected(ParserError::ExpectedType(other.clone()))),
        };

        Ok(Located::at(ty, position))
    }

    /// Las longitudes de array se conocen en tiempo de análisis
    /// sintáctico y deben ser positivas.
    fn parse_array_length(&mut self) -> Parse<Located<i32>> {
        match *self.current().val() {
            Token::IntLiteral(length) if length > 0 => {
                let length = Located::at(length, self.current().position());
                self.advance();
                Ok(length)
            }

            ref other => Err(self.unexpected(ParserError::BadArrayLength(other.clone()))),
        }
    }

    /// Secuencia de sentencias separadas por `;`, hasta `END` o `ELSE`.
    fn parse_stmts(&mut self) -> Parse<Vec<Located<Stmt>>> {
        let mut stmts = Vec::new();

        loop {
            if let Token::Keyword(Keyword::End) | Token::Keyword(Keyword::Else) =
                self.current().val()
            {
                break Ok(stmts);
            }

            stmts.push(self.parse_stmt()?);

            if !self.eat(&Token::Semicolon) {
                break Ok(stmts);
            }
        }
    }

    fn parse_stmt(&mut self) -> Parse<Located<Stmt>> {
        let position = self.current().position();

        let stmt = match self.current().val() {
            Token::Id(_) => {
                let target = self.parse_designator()?;

                if target.indices.is_empty() && self.check(&Token::OpenParen) {
                    let args = self.parse_args()?;
                    Stmt::Call {
                        name: target.name,
                        args,
                    }
                } else {
                    self.expect(Token::Assign)?;
                    let value = self.parse_expr()?;
                    Stmt::Assign { target, value }
                }
            }

            Token::Keyword(Keyword::If) => {
                self.advance();
                let condition = self.parse_expr()?;
                self.expect_keyword(Keyword::Then)?;
                let then_branch = self.parse_stmts()?;

                let else_branch = if self.eat(&Token::Keyword(Keyword::Else)) {
                    self.parse_stmts()?
                } else {
                    Vec::new()
                };

                self.expect_keyword(Keyword::End)?;
                Stmt::If {
                    condition,
                    then_branch,
                    else_branch,
                }
            }

            Token::Keyword(Keyword::While) => {
                self.advance();
                let condition = self.parse_expr()?;
                self.expect_keyword(Keyword::Do)?;
                let body = self.parse_stmts()?;
                self.expect_keyword(Keyword::End)?;

                Stmt::While { condition, body }
            }

            Token::Keyword(Keyword::For) => {
                self.advance();
                let var = self.expect_id()?;
                self.expect(Token::Assign)?;
                let from = self.parse_expr()?;
                self.expect_keyword(Keyword::To)?;
                let to = self.parse_expr()?;
                self.expect_keyword(Keyword::Do)?;
                let body = self.parse_stmts()?;
                self.expect_keyword(Keyword::End)?;

                Stmt::For {
                    var,
                    from,
                    to,
                    body,
                }
            }

            Token::Keyword(Keyword::Return) => {
                self.advance();

                let value = match self.current().val() {
                    Token::Semicolon
                    | Token::Keyword(Keyword::End)
                    | Token::Keyword(Keyword::Else) => None,
                    _ => Some(self.parse_expr()?),
                };

                Stmt::Return(value)
            }

            other => return Err(self.unexpected(ParserError::ExpectedStatement(other.clone()))),
        };

        Ok(Located::at(stmt, position))
    }

    fn parse_designator(&mut self) -> Parse<Designator> {
        let name = self.expect_id()?;

        let mut indices = Vec::new();
        while self.eat(&Token::OpenBracket) {
            indices.push(self.parse_expr()?);
            while self.eat(&Token::Comma) {
                indices.push(self.parse_expr()?);
            }
            self.expect(Token::CloseBracket)?;
        }

        Ok(Designator { name, indices })
    }

    fn parse_args(&mut self) -> Parse<Vec<Located<Expr>>> {
        self.expect(Token::OpenParen)?;

        let mut args = Vec::new();
        if !self.check(&Token::CloseParen) {
            args.push(self.parse_expr()?);
            while self.eat(&Token::Comma) {
                args.push(self.parse_expr()?);
            }
        }

        self.expect(Token::CloseParen)?;
        Ok(args)
    }

    /// `expr := simpleExpr (relOp simpleExpr)?`, con a lo sumo una
    /// relación por expresión.
    fn parse_expr(&mut self) -> Parse<Located<Expr>> {
        let lhs = self.parse_simple_expr()?;

        let op = match self.current().val() {
            Token::Equal => BinOp::Eq,
            Token::NotEqual => BinOp::Ne,
            Token::Less => BinOp::Lt,
            Token::LessEqual => BinOp::Le,
            Token::Greater => BinOp::Gt,
            Token::GreaterEqual => BinOp::Ge,
            _ => return Ok(lhs),
        };

        let position = self.current().position();
        self.advance();
        let rhs = self.parse_simple_expr()?;

        Ok(Located::at(
            Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            position,
        ))
    }

    /// El signo inicial aplica al primer término completo: `-a * b`
    /// se lee como `-(a * b)`.
    fn parse_simple_expr(&mut self) -> Parse<Located<Expr>> {
        let sign = match self.current().val() {
            Token::Plus => Some(UnOp::Plus),
            Token::Minus => Some(UnOp::Minus),
            _ => None,
        };

        let sign_position = self.current().position();
        if sign.is_some() {
            self.advance();
        }

        let mut lhs = self.parse_term()?;
        if let Some(op) = sign {
            lhs = Located::at(
                Expr::Unary {
                    op,
                    operand: Box::new(lhs),
                },
                sign_position,
            );
        }

        loop {
            let op = match self.current().val() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                Token::Keyword(Keyword::Or) => BinOp::Or,
                _ => break Ok(lhs),
            };

            let position = self.current().position();
            self.advance();
            let rhs = self.parse_term()?;

            lhs = Located::at(
                Expr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                position,
            );
        }
    }

    fn parse_term(&mut self) -> Parse<Located<Expr>> {
        let mut lhs = self.parse_factor()?;

        loop {
            let op = match self.current().val() {
                Token::Times => BinOp::Mul,
                Token::Slash => BinOp::Quot,
                Token::Keyword(Keyword::Div) => BinOp::Div,
                Token::Keyword(Keyword::Mod) => BinOp::Mod,
                Token::Keyword(Keyword::And) => BinOp::And,
                _ => break Ok(lhs),
            };

            let position = self.current().position();
            self.advance();
            let rhs = self.parse_factor()?;

            lhs = Located::at(
                Expr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                position,
            );
        }
    }

    fn parse_factor(&mut self) -> Parse<Located<Expr>> {
        let position = self.current().position();

        let expr = match self.current().val() {
            Token::IntLiteral(value) => {
                let value = *value;
                self.advance();
                Expr::Int(value)
            }

            Token::RealLiteral(value) => {
                let value = *value;
                self.advance();
                Expr::Real(value)
            }

            Token::StrLiteral(value) => {
                let value = Rc::clone(value);
                self.advance();
                Expr::Str(value)
            }

            Token::OpenParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(Token::CloseParen)?;

                return Ok(inner);
            }

            Token::Id(_) => {
                let designator = self.parse_designator()?;

                if designator.indices.is_empty() && self.check(&Token::OpenParen) {
                    let args = self.parse_args()?;
                    Expr::Call {
                        name: designator.name,
                        args,
                    }
                } else {
                    Expr::Designator(designator)
                }
            }

            other => return Err(self.unexpected(ParserError::ExpectedExpression(other.clone()))),
        };

        Ok(Located::at(expr, position))
    }
}

// El pretty-printer produce una forma canónica que se vuelve a
// analizar como un árbol estructuralmente idéntico.

impl Display for Module {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(fmt, "MODULE {};", self.name.val())?;
        print_decls(fmt, &self.decls)?;
        writeln!(fmt, "BEGIN")?;
        print_stmts(fmt, &self.body, 1)?;
        write!(fmt, "END {}.", self.name.val())
    }
}

fn print_decls(out: &mut fmt::Formatter<'_>, decls: &[Decl]) -> fmt::Result {
    for decl in decls {
        match decl {
            Decl::Const { name, value } => {
                writeln!(out, "CONST {} = {};", name.val(), print_expr(value.val()))?
            }

            Decl::Var { names, ty } => {
                writeln!(out, "VAR {}: {};", print_names(names), print_type(ty.val()))?
            }

            Decl::Proc(proc) => print_proc(out, proc)?,
        }
    }

    Ok(())
}

fn print_proc(out: &mut fmt::Formatter<'_>, proc: &ProcDecl) -> fmt::Result {
    write!(out, "PROCEDURE {}(", proc.name.val())?;
    for (i, group) in proc.params.iter().enumerate() {
        if i > 0 {
            write!(out, "; ")?;
        }
        write!(out, "{}: {}", print_names(&group.names), print_type(group.ty.val()))?;
    }
    write!(out, ")")?;

    if let Some(ret) = &proc.ret {
        write!(out, ": {}", print_type(ret.val()))?;
    }
    writeln!(out, ";")?;

    print_decls(out, &proc.decls)?;
    writeln!(out, "BEGIN")?;
    print_stmts(out, &proc.body, 1)?;
    writeln!(out, "END {};", proc.name.val())
}

fn print_names(names: &[Located<Identifier>]) -> String {
    let mut text = String::new();
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            text.push_str(", ");
        }
        text.push_str(name.val().as_ref());
    }

    text
}

fn print_type(ty: &TypeExpr) -> String {
    match ty {
        TypeExpr::Integer => String::from("INTEGER"),
        TypeExpr::Real => String::from("REAL"),
        TypeExpr::String => String::from("STRING"),
        TypeExpr::Array { lengths, element } => {
            let mut text = String::from("ARRAY ");
            for (i, length) in lengths.iter().enumerate() {
                if i > 0 {
                    text.push_str(", ");
                }
                let _ = write!(text, "{}", length.val());
            }

            text.push_str(" OF ");
            text.push_str(&print_type(element.val()));
            text
        }
    }
}

fn print_stmts(out: &mut fmt::Formatter<'_>, stmts: &[Located<Stmt>], depth: usize) -> fmt::Result {
    for stmt in stmts {
        print_stmt(out, stmt.val(), depth)?;
    }

    Ok(())
}

fn print_stmt(out: &mut fmt::Formatter<'_>, stmt: &Stmt, depth: usize) -> fmt::Result {
    let pad = "    ".repeat(depth);

    match stmt {
        Stmt::Assign { target, value } => writeln!(
            out,
            "{pad}{} := {};",
            print_designator(target),
            print_expr(value.val())
        ),

        Stmt::Call { name, args } => {
            writeln!(out, "{pad}{}({});", name.val(), print_args(args))
        }

        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => {
            writeln!(out, "{pad}IF {} THEN", print_expr(condition.val()))?;
            print_stmts(out, then_branch, depth + 1)?;
            if !else_branch.is_empty() {
                writeln!(out, "{pad}ELSE")?;
                print_stmts(out, else_branch, depth + 1)?;
            }
            writeln!(out, "{pad}END;")
        }

        Stmt::While { condition, body } => {
            writeln!(out, "{pad}WHILE {} DO", print_expr(condition.val()))?;
            print_stmts(out, body, depth + 1)?;
            writeln!(out, "{pad}END;")
        }

        Stmt::For {
            var,
            from,
            to,
            body,
        } => {
            writeln!(
                out,
                "{pad}FOR {} := {} TO {} DO",
                var.val(),
                print_expr(from.val()),
                print_expr(to.val())
            )?;
            print_stmts(out, body, depth + 1)?;
            writeln!(out, "{pad}END;")
        }

        Stmt::Return(None) => writeln!(out, "{pad}RETURN;"),
        Stmt::Return(Some(value)) => writeln!(out, "{pad}RETURN {};", print_expr(value.val())),
    }
}

fn print_designator(designator: &Designator) -> String {
    let mut text = designator.name.val().to_string();
    if !designator.indices.is_empty() {
        text.push('[');
        for (i, index) in designator.indices.iter().enumerate() {
            if i > 0 {
                text.push_str(", ");
            }
            text.push_str(&print_expr(index.val()));
        }
        text.push(']');
    }

    text
}

fn print_args(args: &[Located<Expr>]) -> String {
    let mut text = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            text.push_str(", ");
        }
        text.push_str(&print_expr(arg.val()));
    }

    text
}

fn print_expr(expr: &Expr) -> String {
    match expr {
        Expr::Int(value) => value.to_string(),
        Expr::Real(value) => print_real(*value),
        Expr::Str(value) => format!("\"{}\"", value),
        Expr::Designator(designator) => print_designator(designator),
        Expr::Call { name, args } => format!("{}({})", name.val(), print_args(args)),

        // Paréntesis explícitos preservan la estructura al re-analizar
        Expr::Binary { op, lhs, rhs } => {
            format!("({} {} {})", print_expr(lhs.val()), op, print_expr(rhs.val()))
        }

        Expr::Unary { op, operand } => format!("({}{})", op, print_expr(operand.val())),
    }
}

fn print_real(value: f64) -> String {
    let text = format!("{:?}", value);
    if text.contains('e') || text.contains('E') {
        // La gramática no tiene notación científica
        format!("{:.10}", value)
    } else {
        text
    }
}
