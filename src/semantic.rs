use thiserror::Error;

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::rc::Rc;

use crate::lex::Identifier;
use crate::parse::{self, BinOp, UnOp};
use crate::source::{Located, Position};

pub type Semantic<T> = Result<T, Located<SemanticError>>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("undeclared identifier `{0}`")]
    Undeclared(Identifier),

    #[error("redeclaration of `{0}` in the same scope")]
    Redeclaration(Identifier),

    #[error("type mismatch: expected `{0}`, found `{1}`")]
    TypeMismatch(Type, Type),

    #[error("operator `{0}` cannot combine `{1}` and `{2}`")]
    BadOperands(BinOp, Type, Type),

    #[error("unary `{0}` requires a numeric operand, found `{1}`")]
    BadUnaryOperand(UnOp, Type),

    #[error("array index must be `INTEGER`, found `{0}`")]
    NonIntegerIndex(Type),

    #[error("`{0}` has {1} dimensions, but {2} indices were given")]
    RankExceeded(Identifier, usize, usize),

    #[error("`{0}` expects {1} arguments, got {2}")]
    ArityMismatch(Identifier, usize, usize),

    #[error("`{0}` is not a procedure")]
    NotAProcedure(Identifier),

    #[error("procedure `{0}` does not return a value")]
    NotAFunction(Identifier),

    #[error("`{0}` is a procedure, not a variable")]
    ExpectedVariable(Identifier),

    #[error("cannot assign to `{0}`")]
    NotAssignable(Identifier),

    #[error("expected a scalar value, found `{0}`")]
    ExpectedScalar(Type),

    #[error("`Write` cannot print `{0}`")]
    NotWritable(Type),

    #[error("`Write` takes at least one argument")]
    WriteArity,

    #[error("`WriteLn` takes no arguments")]
    WriteLnArity,

    #[error("constant initializer must be a literal or a previously declared constant")]
    NotConstant,

    #[error("cannot reference local `{0}` of an enclosing procedure")]
    NonLocal(Identifier),

    #[error("missing RETURN in function `{0}`")]
    MissingReturn(Identifier),

    #[error("RETURN with a value is only allowed inside a function")]
    UnexpectedReturnValue,

    #[error("RETURN requires a value here")]
    MissingReturnValue,

    #[error("condition must be a boolean expression, found `{0}`")]
    NotBoolean(Type),

    #[error("FOR loop variable must be `INTEGER`, found `{0}`")]
    NonIntegerLoopVar(Type),
}

/// Descriptor interno de tipo. Los arrays siempre se encuentran en
/// forma anidada por la derecha; `BOOLEAN` no tiene sintaxis propia
/// y surge únicamente de relaciones y operadores lógicos.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Integer,
    Real,
    String,
    Boolean,
    Array { length: i32, element: Box<Type> },
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Integer | Type::Real)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }

    /// Cantidad de dimensiones indexables.
    pub fn rank(&self) -> usize {
        match self {
            Type::Array { element, .. } => 1 + element.rank(),
            _ => 0,
        }
    }

    /// Tipo resultante tras indexar `dims` dimensiones.
    pub fn strip(&self, dims: usize) -> Type {
        match (dims, self) {
            (0, _) => self.clone(),
            (_, Type::Array { element, .. }) => element.strip(dims - 1),
            _ => unreachable!("dimensionality checked before stripping"),
        }
    }
}

impl Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Integer => fmt.write_str("INTEGER"),
            Type::Real => fmt.write_str("REAL"),
            Type::String => fmt.write_str("STRING"),
            Type::Boolean => fmt.write_str("BOOLEAN"),
            Type::Array { length, element } => write!(fmt, "ARRAY {} OF {}", length, element),
        }
    }
}

/// Programa analizado y tipado. Es la entrada común del emisor de IR
/// y del intérprete; ninguno de los dos vuelve a consultar nombres.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub module: Identifier,
    pub globals: Vec<Variable>,
    pub procedures: Vec<Procedure>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: Identifier,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    /// Símbolo con el que la función se emite. Los procedimientos
    /// anidados se califican con el símbolo del contenedor.
    pub symbol: Rc<str>,
    pub params: Vec<Variable>,
    pub ret: Option<Type>,
    pub locals: Vec<Variable>,
    pub body: Vec<Stmt>,
}

/// Ubicación de almacenamiento resuelta para una variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Global(Identifier),
    Local(Identifier),
}

/// Referencia a una variable con sus índices ya tipados.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub slot: Slot,
    /// Tipo completo de la variable referenciada.
    pub var_ty: Type,
    /// Tipo del resultado tras aplicar los índices.
    pub ty: Type,
    pub indices: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcRef {
    pub symbol: Rc<str>,
    pub ret: Option<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign { target: Target, value: Expr },
    Call { proc: ProcRef, args: Vec<Expr> },
    Write { args: Vec<Expr> },
    WriteLn,

    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },

    While {
        condition: Expr,
        body: Vec<Stmt>,
    },

    For {
        var: Slot,
        from: Expr,
        to: Expr,
        body: Vec<Stmt>,
    },

    Return(Option<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub ty: Type,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i32),
    Real(f64),
    Str(Rc<str>),

    /// Lectura de una variable escalar o de un elemento de array.
    Load(Target),

    /// Array completo o parcialmente indexado, pasado como argumento.
    ArrayRef(Target),

    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },

    /// Promoción implícita INTEGER → REAL.
    Promote(Box<Expr>),

    Call {
        proc: ProcRef,
        args: Vec<Expr>,
    },
}

/// Valor de una constante, conocido en tiempo de compilación.
#[derive(Debug, Clone)]
enum ConstValue {
    Int(i32),
    Real(f64),
    Str(Rc<str>),
}

impl ConstValue {
    fn to_expr(&self) -> Expr {
        match self {
            ConstValue::Int(value) => Expr {
                ty: Type::Integer,
                kind: ExprKind::Int(*value),
            },
            ConstValue::Real(value) => Expr {
                ty: Type::Real,
                kind: ExprKind::Real(*value),
            },
            ConstValue::Str(value) => Expr {
                ty: Type::String,
                kind: ExprKind::Str(Rc::clone(value)),
            },
        }
    }
}

#[derive(Debug, Clone)]
enum Named {
    Const(ConstValue),
    Var { ty: Type, slot: Slot },
    Proc(Signature),
}

#[derive(Debug, Clone)]
struct Signature {
    symbol: Rc<str>,
    params: Vec<Type>,
    ret: Option<Type>,
}

struct Frame {
    symbols: HashMap<Identifier, Named>,
    /// `true` si este frame abre un procedimiento; cruzarlo durante
    /// una búsqueda indica acceso no local.
    boundary: bool,
}

impl Frame {
    fn new(boundary: bool) -> Self {
        Frame {
            symbols: HashMap::new(),
            boundary,
        }
    }
}

/// Contexto de RETURN de la secuencia bajo análisis.
#[derive(Copy, Clone)]
enum ReturnCtx<'a> {
    Module,
    Proc(Option<&'a Type>),
}

impl parse::Module {
    /// Resuelve nombres, verifica tipos y reduce el árbol sintáctico
    /// a un [`Program`] tipado.
    pub fn analyze(&self) -> Semantic<Program> {
        let mut analyzer = Analyzer {
            scopes: vec![Frame::new(false)],
            procedures: Vec::new(),
        };

        let mut globals = Vec::new();
        analyzer.declare(&self.decls, &mut globals, true, "")?;

        let body = analyzer.block(&self.body, ReturnCtx::Module)?;

        Ok(Program {
            module: self.name.val().clone(),
            globals,
            procedures: analyzer.procedures,
            body,
        })
    }
}

struct Analyzer {
    scopes: Vec<Frame>,
    procedures: Vec<Procedure>,
}

impl Analyzer {
    fn insert(&mut self, name: &Located<Identifier>, named: Named) -> Semantic<()> {
        let frame = self.scopes.last_mut().unwrap();
        if frame.symbols.contains_key(name.val()) {
            return Err(Located::at(
                SemanticError::Redeclaration(name.val().clone()),
                name.position(),
            ));
        }

        frame.symbols.insert(name.val().clone(), named);
        Ok(())
    }

    /// Busca un nombre por la cadena estática de scopes. El booleano
    /// indica si la búsqueda cruzó una frontera de procedimiento.
    fn lookup(&self, name: &Located<Identifier>) -> Semantic<(Named, bool)> {
        let mut crossed = false;
        for frame in self.scopes.iter().rev() {
            if let Some(named) = frame.symbols.get(name.val()) {
                return Ok((named.clone(), crossed));
            }

            if frame.boundary {
                crossed = true;
            }
        }

        Err(Located::at(
            SemanticError::Undeclared(name.val().clone()),
            name.position(),
        ))
    }

    fn declare(
        &mut self,
        decls: &[parse::Decl],
        vars: &mut Vec<Variable>,
        global: bool,
        prefix: &str,
    ) -> Semantic<()> {
        for decl in decls {
            match decl {
                parse::Decl::Const { name, value } => {
                    let value = self.const_value(value)?;
                    self.insert(name, Named::Const(value))?;
                }

                parse::Decl::Var { names, ty } => {
                    let ty = resolve_type(ty.val());
                    for name in names {
                        let slot = if global {
                            Slot::Global(name.val().clone())
                        } else {
                            Slot::Local(name.val().clone())
                        };

                        self.insert(
                            name,
                            Named::Var {
                                ty: ty.clone(),
                                slot,
                            },
                        )?;

                        vars.push(Variable {
                            name: name.val().clone(),
                            ty: ty.clone(),
                        });
                    }
                }

                parse::Decl::Proc(proc) => self.declare_proc(proc, prefix)?,
            }
        }

        Ok(())
    }

    fn declare_proc(&mut self, proc: &parse::ProcDecl, prefix: &str) -> Semantic<()> {
        let name = proc.name.val();
        let symbol: Rc<str> = if prefix.is_empty() {
            Rc::from(name.as_ref())
        } else {
            Rc::from(format!("{}.{}", prefix, name))
        };

        let param_types: Vec<Type> = proc
            .params
            .iter()
            .flat_map(|group| {
                let ty = resolve_type(group.ty.val());
                group.names.iter().map(move |_| ty.clone())
            })
            .collect();

        let ret = proc.ret.as_ref().map(|ty| resolve_type(ty.val()));

        // El símbolo se inserta antes de analizar el cuerpo para
        // permitir recursión directa
        self.insert(
            &proc.name,
            Named::Proc(Signature {
                symbol: Rc::clone(&symbol),
                params: param_types,
                ret: ret.clone(),
            }),
        )?;

        self.scopes.push(Frame::new(true));

        let mut params = Vec::new();
        for group in &proc.params {
            let ty = resolve_type(group.ty.val());
            for param in &group.names {
                self.insert(
                    param,
                    Named::Var {
                        ty: ty.clone(),
                        slot: Slot::Local(param.val().clone()),
                    },
                )?;

                params.push(Variable {
                    name: param.val().clone(),
                    ty: ty.clone(),
                });
            }
        }

        let mut locals = Vec::new();
        self.declare(&proc.decls, &mut locals, false, &symbol)?;

        let body = self.block(&proc.body, ReturnCtx::Proc(ret.as_ref()))?;
        self.scopes.pop();

        if ret.is_some() && !always_returns(&body) {
            return Err(Located::at(
                SemanticError::MissingReturn(name.clone()),
                proc.name.position(),
            ));
        }

        self.procedures.push(Procedure {
            symbol,
            params,
            ret,
            locals,
            body,
        });

        Ok(())
    }

    fn const_value(&mut self, expr: &Located<parse::Expr>) -> Semantic<ConstValue> {
        let not_constant = || Located::at(SemanticError::NotConstant, expr.position());

        match expr.val() {
            parse::Expr::Int(value) => Ok(ConstValue::Int(*value)),
            parse::Expr::Real(value) => Ok(ConstValue::Real(*value)),
            parse::Expr::Str(value) => Ok(ConstValue::Str(Rc::clone(value))),

            parse::Expr::Designator(designator) if designator.indices.is_empty() => {
                match self.lookup(&designator.name)? {
                    (Named::Const(value), _) => Ok(value),
                    _ => Err(not_constant()),
                }
            }

            parse::Expr::Unary { op, operand } => {
                let value = self.const_value(operand)?;
                match (op, value) {
                    (UnOp::Plus, value) => Ok(value),
                    (UnOp::Minus, ConstValue::Int(value)) => Ok(ConstValue::Int(value.wrapping_neg())),
                    (UnOp::Minus, ConstValue::Real(value)) => Ok(ConstValue::Real(-value)),
                    _ => Err(not_constant()),
                }
            }

            _ => Err(not_constant()),
        }
    }

    fn block(&mut self, stmts: &[Located<parse::Stmt>], ret: ReturnCtx<'_>) -> Semantic<Vec<Stmt>> {
        stmts.iter().map(|stmt| self.stmt(stmt, ret)).collect()
    }

    fn stmt(&mut self, stmt: &Located<parse::Stmt>, ret: ReturnCtx<'_>) -> Semantic<Stmt> {
        match stmt.val() {
            parse::Stmt::Assign { target, value } => {
                let target = self.variable_target(target)?;
                if target.ty.is_array() {
                    return Err(Located::at(
                        SemanticError::ExpectedScalar(target.ty),
                        stmt.position(),
                    ));
                }

                let value = self.assignable(value, &target.ty)?;
                Ok(Stmt::Assign { target, value })
            }

            parse::Stmt::Call { name, args } => match self.lookup_callee(name)? {
                Callee::Write => {
                    if args.is_empty() {
                        return Err(Located::at(SemanticError::WriteArity, stmt.position()));
                    }

                    let args = args
                        .iter()
                        .map(|arg| self.writable(arg))
                        .collect::<Semantic<_>>()?;

                    Ok(Stmt::Write { args })
                }

                Callee::WriteLn => {
                    if !args.is_empty() {
                        return Err(Located::at(SemanticError::WriteLnArity, stmt.position()));
                    }

                    Ok(Stmt::WriteLn)
                }

                Callee::User(signature) => {
                    let args = self.call_args(name, &signature, args)?;
                    Ok(Stmt::Call {
                        proc: ProcRef {
                            symbol: signature.symbol,
                            ret: signature.ret,
                        },
                        args,
                    })
                }
            },

            parse::Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.boolean(condition)?;
                let then_branch = self.block(then_branch, ret)?;
                let else_branch = self.block(else_branch, ret)?;

                Ok(Stmt::If {
                    condition,
                    then_branch,
                    else_branch,
                })
            }

            parse::Stmt::While { condition, body } => {
                let condition = self.boolean(condition)?;
                let body = self.block(body, ret)?;

                Ok(Stmt::While { condition, body })
            }

            parse::Stmt::For {
                var,
                from,
                to,
                body,
            } => {
                let target = self.variable_target(&parse::Designator {
                    name: var.clone(),
                    indices: Vec::new(),
                })?;

                if target.ty != Type::Integer {
                    return Err(Located::at(
                        SemanticError::NonIntegerLoopVar(target.ty),
                        var.position(),
                    ));
                }

                let from = self.integer(from)?;
                let to = self.integer(to)?;
                let body = self.block(body, ret)?;

                Ok(Stmt::For {
                    var: target.slot,
                    from,
                    to,
                    body,
                })
            }

            parse::Stmt::Return(value) => match (ret, value) {
                (ReturnCtx::Module, None) | (ReturnCtx::Proc(None), None) => {
                    Ok(Stmt::Return(None))
                }

                (ReturnCtx::Module, Some(value)) | (ReturnCtx::Proc(None), Some(value)) => Err(
                    Located::at(SemanticError::UnexpectedReturnValue, value.position()),
                ),

                (ReturnCtx::Proc(Some(_)), None) => Err(Located::at(
                    SemanticError::MissingReturnValue,
                    stmt.position(),
                )),

                (ReturnCtx::Proc(Some(expected)), Some(value)) => {
                    let value = self.assignable(value, expected)?;
                    Ok(Stmt::Return(Some(value)))
                }
            },
        }
    }

    /// Evalúa una expresión que se almacenará en (o retornará como)
    /// un valor del tipo dado, insertando la promoción INTEGER → REAL
    /// cuando corresponde.
    fn assignable(&mut self, expr: &Located<parse::Expr>, expected: &Type) -> Semantic<Expr> {
        let value = self.expr(expr)?;

        if value.ty == *expected {
            Ok(value)
        } else if *expected == Type::Real && value.ty == Type::Integer {
            Ok(promote(value))
        } else {
            Err(Located::at(
                SemanticError::TypeMismatch(expected.clone(), value.ty),
                expr.position(),
            ))
        }
    }

    fn boolean(&mut self, expr: &Located<parse::Expr>) -> Semantic<Expr> {
        let condition = self.expr(expr)?;
        if condition.ty != Type::Boolean {
            return Err(Located::at(
                SemanticError::NotBoolean(condition.ty),
                expr.position(),
            ));
        }

        Ok(condition)
    }

    fn integer(&mut self, expr: &Located<parse::Expr>) -> Semantic<Expr> {
        let value = self.expr(expr)?;
        if value.ty != Type::Integer {
            return Err(Located::at(
                SemanticError::TypeMismatch(Type::Integer, value.ty),
                expr.position(),
            ));
        }

        Ok(value)
    }

    fn writable(&mut self, expr: &Located<parse::Expr>) -> Semantic<Expr> {
        let value = self.expr(expr)?;
        match value.ty {
            Type::Integer | Type::Real | Type::String => Ok(value),
            ty => Err(Located::at(SemanticError::NotWritable(ty), expr.position())),
        }
    }

    fn lookup_callee(&mut self, name: &Located<Identifier>) -> Semantic<Callee> {
        match self.lookup(name) {
            Ok((Named::Proc(signature), _)) => Ok(Callee::User(signature)),

            Ok(_) => Err(Located::at(
                SemanticError::NotAProcedure(name.val().clone()),
                name.position(),
            )),

            Err(undeclared) => match name.val().as_ref() {
                "Write" => Ok(Callee::Write),
                "WriteLn" => Ok(Callee::WriteLn),
                _ => Err(undeclared),
            },
        }
    }

    fn call_args(
        &mut self,
        name: &Located<Identifier>,
        signature: &Signature,
        args: &[Located<parse::Expr>],
    ) -> Semantic<Vec<Expr>> {
        if args.len() != signature.params.len() {
            return Err(Located::at(
                SemanticError::ArityMismatch(
                    name.val().clone(),
                    signature.params.len(),
                    args.len(),
                ),
                name.position(),
            ));
        }

        args.iter()
            .zip(&signature.params)
            .map(|(arg, param)| {
                if param.is_array() {
                    // Los arrays se pasan como punteros; el argumento debe
                    // ser un designador cuyo tipo coincide exactamente
                    self.array_argument(arg, param)
                } else {
                    self.assignable(arg, param)
                }
            })
            .collect()
    }

    fn array_argument(&mut self, arg: &Located<parse::Expr>, param: &Type) -> Semantic<Expr> {
        let target = match arg.val() {
            parse::Expr::Designator(designator) => self.variable_target(designator)?,
            _ => {
                let value = self.expr(arg)?;
                return Err(Located::at(
                    SemanticError::TypeMismatch(param.clone(), value.ty),
                    arg.position(),
                ));
            }
        };

        if target.ty != *param {
            return Err(Located::at(
                SemanticError::TypeMismatch(param.clone(), target.ty),
                arg.position(),
            ));
        }

        Ok(Expr {
            ty: target.ty.clone(),
            kind: ExprKind::ArrayRef(target),
        })
    }

    /// Resuelve un designador hacia una variable, verificando índices
    /// y dimensionalidad.
    fn variable_target(&mut self, designator: &parse::Designator) -> Semantic<Target> {
        let name = &designator.name;

        let (ty, slot) = match self.lookup(name)? {
            (Named::Var { ty, slot }, crossed) => {
                if crossed && matches!(slot, Slot::Local(_)) {
                    return Err(Located::at(
                        SemanticError::NonLocal(name.val().clone()),
                        name.position(),
                    ));
                }

                (ty, slot)
            }

            (Named::Const(_), _) => {
                return Err(Located::at(
                    SemanticError::NotAssignable(name.val().clone()),
                    name.position(),
                ))
            }

            (Named::Proc(_), _) => {
                return Err(Located::at(
                    SemanticError::ExpectedVariable(name.val().clone()),
                    name.position(),
                ))
            }
        };

        let rank = ty.rank();
        if designator.indices.len() > rank {
            return Err(Located::at(
                SemanticError::RankExceeded(name.val().clone(), rank, designator.indices.len()),
                name.position(),
            ));
        }

        let indices = designator
            .indices
            .iter()
            .map(|index| {
                let value = self.expr(index)?;
                if value.ty != Type::Integer {
                    return Err(Located::at(
                        SemanticError::NonIntegerIndex(value.ty),
                        index.position(),
                    ));
                }

                Ok(value)
            })
            .collect::<Semantic<Vec<_>>>()?;

        let result = ty.strip(indices.len());
        Ok(Target {
            slot,
            var_ty: ty,
            ty: result,
            indices,
        })
    }

    fn expr(&mut self, expr: &Located<parse::Expr>) -> Semantic<Expr> {
        let position = expr.position();

        match expr.val() {
            parse::Expr::Int(value) => Ok(Expr {
                ty: Type::Integer,
                kind: ExprKind::Int(*value),
            }),

            parse::Expr::Real(value) => Ok(Expr {
                ty: Type::Real,
                kind: ExprKind::Real(*value),
            }),

            parse::Expr::Str(value) => Ok(Expr {
                ty: Type::String,
                kind: ExprKind::Str(Rc::clone(value)),
            }),

            parse::Expr::Designator(designator) => {
                // Las constantes se sustituyen por sus valores
                if designator.indices.is_empty() {
                    if let (Named::Const(value), _) = self.lookup(&designator.name)? {
                        return Ok(value.to_expr());
                    }
                }

                let target = self.variable_target(designator)?;
                if target.ty.is_array() {
                    return Err(Located::at(
                        SemanticError::ExpectedScalar(target.ty),
                        position,
                    ));
                }

                Ok(Expr {
                    ty: target.ty.clone(),
                    kind: ExprKind::Load(target),
                })
            }

            parse::Expr::Call { name, args } => match self.lookup_callee(name)? {
                Callee::Write | Callee::WriteLn => Err(Located::at(
                    SemanticError::NotAFunction(name.val().clone()),
                    name.position(),
                )),

                Callee::User(signature) => {
                    let ret = match &signature.ret {
                        Some(ret) => ret.clone(),
                        None => {
                            return Err(Located::at(
                                SemanticError::NotAFunction(name.val().clone()),
                                name.position(),
                            ))
                        }
                    };

                    let args = self.call_args(name, &signature, args)?;
                    Ok(Expr {
                        ty: ret.clone(),
                        kind: ExprKind::Call {
                            proc: ProcRef {
                                symbol: signature.symbol,
                                ret: Some(ret),
                            },
                            args,
                        },
                    })
                }
            },

            parse::Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, position),

            parse::Expr::Unary { op, operand } => {
                let value = self.expr(operand)?;
                if !value.ty.is_numeric() {
                    return Err(Located::at(
                        SemanticError::BadUnaryOperand(*op, value.ty),
                        position,
                    ));
                }

                match op {
                    UnOp::Plus => Ok(value),
                    UnOp::Minus => Ok(Expr {
                        ty: value.ty.clone(),
                        kind: ExprKind::Unary {
                            op: UnOp::Minus,
                            operand: Box::new(value),
                        },
                    }),
                }
            }
        }
    }

    fn binary(
        &mut self,
        op: BinOp,
        lhs: &Located<parse::Expr>,
        rhs: &Located<parse::Expr>,
        position: Position,
    ) -> Semantic<Expr> {
        let lhs = self.expr(lhs)?;
        let rhs = self.expr(rhs)?;

        let bad = |lhs: &Expr, rhs: &Expr| {
            Located::at(
                SemanticError::BadOperands(op, lhs.ty.clone(), rhs.ty.clone()),
                position,
            )
        };

        let (lhs, rhs, ty) = match op {
            // Aritmética con promoción INTEGER → REAL
            BinOp::Add | BinOp::Sub | BinOp::Mul => match (&lhs.ty, &rhs.ty) {
                (Type::Integer, Type::Integer) => (lhs, rhs, Type::Integer),
                _ if lhs.ty.is_numeric() && rhs.ty.is_numeric() => {
                    (promote(lhs), promote(rhs), Type::Real)
                }
                _ => return Err(bad(&lhs, &rhs)),
            },

            // `/` siempre produce REAL
            BinOp::Quot => {
                if lhs.ty.is_numeric() && rhs.ty.is_numeric() {
                    (promote(lhs), promote(rhs), Type::Real)
                } else {
                    return Err(bad(&lhs, &rhs));
                }
            }

            BinOp::Div | BinOp::Mod => {
                if lhs.ty == Type::Integer && rhs.ty == Type::Integer {
                    (lhs, rhs, Type::Integer)
                } else {
                    return Err(bad(&lhs, &rhs));
                }
            }

            BinOp::And | BinOp::Or => {
                if lhs.ty == Type::Boolean && rhs.ty == Type::Boolean {
                    (lhs, rhs, Type::Boolean)
                } else {
                    return Err(bad(&lhs, &rhs));
                }
            }

            // La igualdad admite cadenas; el orden solo números
            BinOp::Eq | BinOp::Ne => match (&lhs.ty, &rhs.ty) {
                (Type::String, Type::String) => (lhs, rhs, Type::Boolean),
                _ if lhs.ty.is_numeric() && rhs.ty.is_numeric() => {
                    let (lhs, rhs) = promote_pair(lhs, rhs);
                    (lhs, rhs, Type::Boolean)
                }
                _ => return Err(bad(&lhs, &rhs)),
            },

            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                if lhs.ty.is_numeric() && rhs.ty.is_numeric() {
                    let (lhs, rhs) = promote_pair(lhs, rhs);
                    (lhs, rhs, Type::Boolean)
                } else {
                    return Err(bad(&lhs, &rhs));
                }
            }
        };

        Ok(Expr {
            ty,
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        })
    }
}

enum Callee {
    Write,
    WriteLn,
    User(Signature),
}

fn promote(expr: Expr) -> Expr {
    if expr.ty == Type::Integer {
        Expr {
            ty: Type::Real,
            kind: ExprKind::Promote(Box::new(expr)),
        }
    } else {
        expr
    }
}

/// Unifica los operandos de una comparación: ambos INTEGER quedan
/// como están, de lo contrario ambos se promueven a REAL.
fn promote_pair(lhs: Expr, rhs: Expr) -> (Expr, Expr) {
    if lhs.ty == Type::Integer && rhs.ty == Type::Integer {
        (lhs, rhs)
    } else {
        (promote(lhs), promote(rhs))
    }
}

/// Determina si una secuencia retorna por todos los caminos.
fn always_returns(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|stmt| match stmt {
        Stmt::Return(_) => true,
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            !else_branch.is_empty() && always_returns(then_branch) && always_returns(else_branch)
        }
        _ => false,
    })
}

fn resolve_type(ty: &parse::TypeExpr) -> Type {
    match ty {
        parse::TypeExpr::Integer => Type::Integer,
        parse::TypeExpr::Real => Type::Real,
        parse::TypeExpr::String => Type::String,

        // `ARRAY n, m OF T` equivale a `ARRAY n OF ARRAY m OF T`
        parse::TypeExpr::Array { lengths, element } => {
            let mut resolved = resolve_type(element.val());
            for length in lengths.iter().rev() {
                resolved = Type::Array {
                    length: *length.val(),
                    element: Box::new(resolved),
                };
            }

            resolved
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::tokenize;
    use crate::parse::parse;

    fn analyze(source: &str) -> Semantic<Program> {
        parse(&tokenize(source).unwrap()).unwrap().analyze()
    }

    #[test]
    fn reports_undeclared_identifiers() {
        let error = analyze("MODULE E; BEGIN x := 1; END E.").unwrap_err();

        assert!(matches!(error.val(), SemanticError::Undeclared(_)));
        let message = error.to_string();
        assert!(message.contains("undeclared") && message.contains("x"));
    }

    #[test]
    fn rejects_redeclaration_in_the_same_scope() {
        let error = analyze("MODULE M; VAR a: INTEGER; a: REAL; BEGIN END M.").unwrap_err();
        assert!(matches!(error.val(), SemanticError::Redeclaration(_)));
    }

    #[test]
    fn parameters_may_shadow_globals() {
        analyze(
            "MODULE M; VAR x: INTEGER;
             PROCEDURE p(x: REAL); BEGIN x := 1.5; END p;
             BEGIN x := 2; END M.",
        )
        .unwrap();
    }

    #[test]
    fn assignment_promotes_integer_to_real() {
        let program = analyze("MODULE M; VAR r: REAL; BEGIN r := 1; END M.").unwrap();

        match &program.body[0] {
            Stmt::Assign { value, .. } => {
                assert_eq!(value.ty, Type::Real);
                assert!(matches!(value.kind, ExprKind::Promote(_)));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn rejects_real_to_integer_assignment() {
        let error = analyze("MODULE M; VAR i: INTEGER; BEGIN i := 1.5; END M.").unwrap_err();
        assert!(matches!(
            error.val(),
            SemanticError::TypeMismatch(Type::Integer, Type::Real)
        ));
    }

    #[test]
    fn division_always_yields_real() {
        let program = analyze("MODULE M; VAR r: REAL; BEGIN r := 1 / 2; END M.").unwrap();

        match &program.body[0] {
            Stmt::Assign { value, .. } => assert_eq!(value.ty, Type::Real),
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn div_and_mod_require_integers() {
        let error = analyze("MODULE M; VAR i: INTEGER; BEGIN i := 1.0 DIV 2; END M.").unwrap_err();
        assert!(matches!(error.val(), SemanticError::BadOperands(BinOp::Div, ..)));
    }

    #[test]
    fn conditions_must_be_boolean() {
        let error =
            analyze("MODULE M; VAR x: INTEGER; BEGIN IF x THEN x := 1; END; END M.").unwrap_err();
        assert!(matches!(error.val(), SemanticError::NotBoolean(Type::Integer)));
    }

    #[test]
    fn string_equality_is_boolean_but_order_is_not() {
        analyze("MODULE M; VAR x: INTEGER; BEGIN IF \"a\" = \"b\" THEN x := 1; END; END M.")
            .unwrap();

        let error =
            analyze("MODULE M; VAR x: INTEGER; BEGIN IF \"a\" < \"b\" THEN x := 1; END; END M.")
                .unwrap_err();
        assert!(matches!(error.val(), SemanticError::BadOperands(BinOp::Lt, ..)));
    }

    #[test]
    fn for_variable_must_be_integer() {
        let error =
            analyze("MODULE M; VAR r: REAL; BEGIN FOR r := 1 TO 3 DO END; END M.").unwrap_err();
        assert!(matches!(error.val(), SemanticError::NonIntegerLoopVar(Type::Real)));
    }

    #[test]
    fn checks_argument_counts_and_types() {
        let error = analyze(
            "MODULE M; PROCEDURE p(n: INTEGER); BEGIN n := 0; END p;
             BEGIN p(); END M.",
        )
        .unwrap_err();
        assert!(matches!(error.val(), SemanticError::ArityMismatch(_, 1, 0)));

        let error = analyze(
            "MODULE M; PROCEDURE p(n: INTEGER); BEGIN n := 0; END p;
             BEGIN p(\"no\"); END M.",
        )
        .unwrap_err();
        assert!(matches!(
            error.val(),
            SemanticError::TypeMismatch(Type::Integer, Type::String)
        ));
    }

    #[test]
    fn functions_must_return_on_every_path() {
        let error = analyze(
            "MODULE M; VAR x: INTEGER;
             PROCEDURE f(n: INTEGER): INTEGER;
             BEGIN IF n > 0 THEN RETURN 1; END; END f;
             BEGIN x := f(1); END M.",
        )
        .unwrap_err();

        assert!(matches!(error.val(), SemanticError::MissingReturn(_)));
    }

    #[test]
    fn both_branches_returning_satisfies_the_check() {
        analyze(
            "MODULE F; VAR x: INTEGER;
             PROCEDURE f(n: INTEGER): INTEGER;
             BEGIN IF n <= 1 THEN RETURN 1; ELSE RETURN n * f(n - 1); END; END f;
             BEGIN x := f(5); END F.",
        )
        .unwrap();
    }

    #[test]
    fn return_value_in_proper_procedure_is_an_error() {
        let error = analyze(
            "MODULE M; PROCEDURE p(); BEGIN RETURN 1; END p; BEGIN p(); END M.",
        )
        .unwrap_err();

        assert!(matches!(error.val(), SemanticError::UnexpectedReturnValue));
    }

    #[test]
    fn bare_return_in_function_is_an_error() {
        let error = analyze(
            "MODULE M; VAR x: INTEGER;
             PROCEDURE f(): INTEGER; BEGIN RETURN; END f;
             BEGIN x := f(); END M.",
        )
        .unwrap_err();

        assert!(matches!(error.val(), SemanticError::MissingReturnValue));
    }

    #[test]
    fn indices_are_counted_and_typed() {
        let error = analyze(
            "MODULE M; VAR m: ARRAY 2, 2 OF INTEGER; BEGIN m[0, 0, 0] := 1; END M.",
        )
        .unwrap_err();
        assert!(matches!(error.val(), SemanticError::RankExceeded(_, 2, 3)));

        let error = analyze(
            "MODULE M; VAR m: ARRAY 2 OF INTEGER; BEGIN m[0.5] := 1; END M.",
        )
        .unwrap_err();
        assert!(matches!(error.val(), SemanticError::NonIntegerIndex(Type::Real)));
    }

    #[test]
    fn array_shorthand_and_nested_syntax_unify() {
        let shorthand =
            analyze("MODULE M; VAR m: ARRAY 2, 3 OF INTEGER; BEGIN m[0, 0] := 1; END M.").unwrap();
        let nested =
            analyze("MODULE M; VAR m: ARRAY 2 OF ARRAY 3 OF INTEGER; BEGIN m[0][0] := 1; END M.")
                .unwrap();

        assert_eq!(shorthand.globals, nested.globals);
        assert_eq!(shorthand.body, nested.body);
    }

    #[test]
    fn whole_arrays_are_not_scalar_values() {
        let error = analyze(
            "MODULE M; VAR a: ARRAY 2 OF INTEGER; BEGIN Write(a); END M.",
        )
        .unwrap_err();
        assert!(matches!(error.val(), SemanticError::ExpectedScalar(_)));
    }

    #[test]
    fn arrays_pass_to_matching_array_parameters() {
        analyze(
            "MODULE M; VAR a: ARRAY 2 OF INTEGER;
             PROCEDURE p(v: ARRAY 2 OF INTEGER); BEGIN v[0] := 1; END p;
             BEGIN p(a); END M.",
        )
        .unwrap();

        let error = analyze(
            "MODULE M; VAR a: ARRAY 3 OF INTEGER;
             PROCEDURE p(v: ARRAY 2 OF INTEGER); BEGIN v[0] := 1; END p;
             BEGIN p(a); END M.",
        )
        .unwrap_err();
        assert!(matches!(error.val(), SemanticError::TypeMismatch(..)));
    }

    #[test]
    fn constants_fold_through_references_and_signs() {
        let program = analyze(
            "MODULE M; CONST k = 5; CONST j = -k; VAR x: INTEGER; BEGIN x := j; END M.",
        )
        .unwrap();

        match &program.body[0] {
            Stmt::Assign { value, .. } => assert_eq!(value.kind, ExprKind::Int(-5)),
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn constant_initializers_are_restricted() {
        let error = analyze(
            "MODULE M; VAR x: INTEGER; CONST k = x; BEGIN END M.",
        )
        .unwrap_err();
        assert!(matches!(error.val(), SemanticError::NotConstant));
    }

    #[test]
    fn procedures_reach_module_globals() {
        analyze(
            "MODULE M; VAR total: INTEGER;
             PROCEDURE bump(); BEGIN total := total + 1; END bump;
             BEGIN bump(); END M.",
        )
        .unwrap();
    }

    #[test]
    fn enclosing_procedure_locals_are_not_reachable() {
        let error = analyze(
            "MODULE M;
             PROCEDURE outer();
             VAR x: INTEGER;
             PROCEDURE inner(); BEGIN x := 1; END inner;
             BEGIN inner(); END outer;
             BEGIN outer(); END M.",
        )
        .unwrap_err();

        assert!(matches!(error.val(), SemanticError::NonLocal(_)));
    }

    #[test]
    fn nested_procedures_get_qualified_symbols() {
        let program = analyze(
            "MODULE M;
             PROCEDURE outer();
             PROCEDURE inner(); BEGIN END inner;
             BEGIN inner(); END outer;
             BEGIN outer(); END M.",
        )
        .unwrap();

        let symbols: Vec<_> = program
            .procedures
            .iter()
            .map(|proc| proc.symbol.as_ref())
            .collect();
        assert_eq!(symbols, vec!["outer.inner", "outer"]);
    }

    #[test]
    fn calling_a_procedure_as_a_function_is_an_error() {
        let error = analyze(
            "MODULE M; VAR x: INTEGER;
             PROCEDURE p(); BEGIN END p;
             BEGIN x := p(); END M.",
        )
        .unwrap_err();

        assert!(matches!(error.val(), SemanticError::NotAFunction(_)));
    }
}
