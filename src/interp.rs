//! Intérprete de árbol sobre el programa analizado.
//!
//! El intérprete y el emisor de IR comparten la salida de la fase
//! semántica y deben coincidir byte a byte en todo lo observable:
//! `Write` de un INTEGER imprime como `%d`, un REAL como `%f` (seis
//! decimales), una cadena verbatim; `DIV` y `MOD` truncan hacia cero
//! como `sdiv`/`srem`; las cotas de FOR se evalúan una sola vez; y
//! `AND`/`OR` evalúan ambos operandos, igual que el `and`/`or` sobre
//! `i1` del código emitido. Los arrays se pasan por referencia, que
//! es lo que el IR hace con sus punteros.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use thiserror::Error;

use crate::lex::Identifier;
use crate::parse::{BinOp, UnOp};
use crate::semantic::{Expr, ExprKind, Procedure, Program, Slot, Stmt, Target, Type};

/// Error en tiempo de ejecución del programa interpretado.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("array index {index} out of bounds for length {length}")]
    OutOfBounds { index: i32, length: i32 },

    #[error("function completed without returning a value")]
    NoReturnValue,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Ejecuta el cuerpo del módulo, escribiendo la salida del programa
/// en `output`.
pub fn run<W: Write>(program: &Program, output: &mut W) -> Result<(), RuntimeError> {
    let mut globals = HashMap::new();
    for global in &program.globals {
        globals.insert(global.name.clone(), default_value(&global.ty));
    }

    let mut interpreter = Interpreter {
        program,
        globals,
        output,
    };

    let mut frame = HashMap::new();
    interpreter.block(&program.body, &mut frame)?;
    interpreter.output.flush()?;

    Ok(())
}

#[derive(Debug, Clone)]
enum Value {
    Int(i32),
    Real(f64),
    Str(Rc<str>),
    Bool(bool),
    Array(Rc<RefCell<Vec<Value>>>),
}

impl Value {
    fn as_int(&self) -> i32 {
        match self {
            Value::Int(value) => *value,
            other => unreachable!("expected integer value, found {:?}", other),
        }
    }

    fn as_bool(&self) -> bool {
        match self {
            Value::Bool(value) => *value,
            other => unreachable!("expected boolean value, found {:?}", other),
        }
    }
}

fn default_value(ty: &Type) -> Value {
    match ty {
        Type::Integer => Value::Int(0),
        Type::Real => Value::Real(0.0),
        Type::String => Value::Str(Rc::from("")),
        Type::Boolean => Value::Bool(false),
        Type::Array { length, element } => {
            let cells = (0..*length).map(|_| default_value(element)).collect();
            Value::Array(Rc::new(RefCell::new(cells)))
        }
    }
}

/// Efecto de control de una sentencia.
enum Flow {
    Normal,
    Return(Option<Value>),
}

type Frame = HashMap<Identifier, Value>;

struct Interpreter<'a, W: Write> {
    program: &'a Program,
    globals: Frame,
    output: &'a mut W,
}

impl<'a, W: Write> Interpreter<'a, W> {
    fn block(&mut self, stmts: &[Stmt], frame: &mut Frame) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            match self.stmt(stmt, frame)? {
                Flow::Normal => (),
                flow => return Ok(flow),
            }
        }

        Ok(Flow::Normal)
    }

    fn stmt(&mut self, stmt: &Stmt, frame: &mut Frame) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Assign { target, value } => {
                let value = self.eval(value, frame)?;
                self.store(target, value, frame)?;
            }

            Stmt::Call { proc, args } => {
                self.call(&proc.symbol, args, frame)?;
            }

            Stmt::Write { args } => {
                for arg in args {
                    let value = self.eval(arg, frame)?;
                    match value {
                        Value::Int(value) => write!(self.output, "{}", value)?,
                        // Mismo formato que `%f`
                        Value::Real(value) => write!(self.output, "{:.6}", value)?,
                        Value::Str(text) => write!(self.output, "{}", text)?,
                        other => unreachable!("Write of non-scalar {:?}", other),
                    }
                }
            }

            Stmt::WriteLn => write!(self.output, "\n")?,

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let flow = if self.eval(condition, frame)?.as_bool() {
                    self.block(then_branch, frame)?
                } else {
                    self.block(else_branch, frame)?
                };

                return Ok(flow);
            }

            Stmt::While { condition, body } => {
                while self.eval(condition, frame)?.as_bool() {
                    match self.block(body, frame)? {
                        Flow::Normal => (),
                        flow => return Ok(flow),
                    }
                }
            }

            Stmt::For {
                var,
                from,
                to,
                body,
            } => {
                // Ambas cotas se evalúan una única vez
                let from = self.eval(from, frame)?.as_int();
                let to = self.eval(to, frame)?.as_int();

                self.write_slot(var, Value::Int(from), frame);

                loop {
                    let current = self.read_slot(var, frame).as_int();
                    if current > to {
                        break;
                    }

                    match self.block(body, frame)? {
                        Flow::Normal => (),
                        flow => return Ok(flow),
                    }

                    // El cuerpo pudo escribir la variable; se relee
                    let current = self.read_slot(var, frame).as_int();
                    self.write_slot(var, Value::Int(current.wrapping_add(1)), frame);
                }
            }

            Stmt::Return(value) => {
                let value = match value {
                    Some(value) => Some(self.eval(value, frame)?),
                    None => None,
                };

                return Ok(Flow::Return(value));
            }
        }

        Ok(Flow::Normal)
    }

    fn eval(&mut self, expr: &Expr, frame: &mut Frame) -> Result<Value, RuntimeError> {
        match &expr.kind {
            ExprKind::Int(value) => Ok(Value::Int(*value)),
            ExprKind::Real(value) => Ok(Value::Real(*value)),
            ExprKind::Str(text) => Ok(Value::Str(Rc::clone(text))),

            ExprKind::Load(target) => self.load(target, frame),

            // Clonar el `Rc` comparte el almacenamiento, igual que el
            // puntero que el IR pasa a la función
            ExprKind::ArrayRef(target) => self.load(target, frame),

            ExprKind::Promote(operand) => {
                let value = self.eval(operand, frame)?.as_int();
                Ok(Value::Real(value as f64))
            }

            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand, frame)?;
                match (op, value) {
                    (UnOp::Plus, value) => Ok(value),
                    (UnOp::Minus, Value::Int(value)) => Ok(Value::Int(value.wrapping_neg())),
                    (UnOp::Minus, Value::Real(value)) => Ok(Value::Real(-value)),
                    (UnOp::Minus, other) => unreachable!("negation of {:?}", other),
                }
            }

            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, frame)?;
                let rhs = self.eval(rhs, frame)?;
                binary(*op, lhs, rhs)
            }

            ExprKind::Call { proc, args } => match self.call(&proc.symbol, args, frame)? {
                Some(value) => Ok(value),
                None => Err(RuntimeError::NoReturnValue),
            },
        }
    }

    fn call(
        &mut self,
        symbol: &str,
        args: &[Expr],
        frame: &mut Frame,
    ) -> Result<Option<Value>, RuntimeError> {
        let values = args
            .iter()
            .map(|arg| self.eval(arg, frame))
            .collect::<Result<Vec<_>, _>>()?;

        let program: &'a Program = self.program;
        let procedure: &'a Procedure = program
            .procedures
            .iter()
            .find(|procedure| procedure.symbol.as_ref() == symbol)
            .unwrap_or_else(|| unreachable!("call to unknown symbol `{}`", symbol));

        let mut callee = Frame::new();
        for (param, value) in procedure.params.iter().zip(values) {
            callee.insert(param.name.clone(), value);
        }

        for local in &procedure.locals {
            callee.insert(local.name.clone(), default_value(&local.ty));
        }

        match self.block(&procedure.body, &mut callee)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(None),
        }
    }

    fn read_slot(&self, slot: &Slot, frame: &Frame) -> Value {
        let (name, frame) = match slot {
            Slot::Global(name) => (name, &self.globals),
            Slot::Local(name) => (name, frame),
        };

        frame
            .get(name)
            .cloned()
            .unwrap_or_else(|| unreachable!("slot `{}` without storage", name))
    }

    fn write_slot(&mut self, slot: &Slot, value: Value, frame: &mut Frame) {
        match slot {
            Slot::Global(name) => self.globals.insert(name.clone(), value),
            Slot::Local(name) => frame.insert(name.clone(), value),
        };
    }

    fn indices(&mut self, target: &Target, frame: &mut Frame) -> Result<Vec<i32>, RuntimeError> {
        target
            .indices
            .iter()
            .map(|index| Ok(self.eval(index, frame)?.as_int()))
            .collect()
    }

    fn load(&mut self, target: &Target, frame: &mut Frame) -> Result<Value, RuntimeError> {
        let indices = self.indices(target, frame)?;
        let mut value = self.read_slot(&target.slot, frame);

        for index in indices {
            let cells = match value {
                Value::Array(cells) => cells,
                other => unreachable!("indexing into {:?}", other),
            };

            let cells = cells.borrow();
            value = cells[checked_index(index, cells.len())?].clone();
        }

        Ok(value)
    }

    fn store(
        &mut self,
        target: &Target,
        value: Value,
        frame: &mut Frame,
    ) -> Result<(), RuntimeError> {
        let indices = self.indices(target, frame)?;

        let (last, path) = match indices.split_last() {
            Some(split) => split,
            None => {
                self.write_slot(&target.slot, value, frame);
                return Ok(());
            }
        };

        let mut cells = match self.read_slot(&target.slot, frame) {
            Value::Array(cells) => cells,
            other => unreachable!("indexing into {:?}", other),
        };

        for &index in path {
            let next = {
                let borrowed = cells.borrow();
                match &borrowed[checked_index(index, borrowed.len())?] {
                    Value::Array(inner) => Rc::clone(inner),
                    other => unreachable!("indexing into {:?}", other),
                }
            };

            cells = next;
        }

        let mut borrowed = cells.borrow_mut();
        let position = checked_index(*last, borrowed.len())?;
        borrowed[position] = value;

        Ok(())
    }
}

fn checked_index(index: i32, length: usize) -> Result<usize, RuntimeError> {
    if index < 0 || index as usize >= length {
        Err(RuntimeError::OutOfBounds {
            index,
            length: length as i32,
        })
    } else {
        Ok(index as usize)
    }
}

fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    use Value::*;

    Ok(match (op, lhs, rhs) {
        (BinOp::Add, Int(lhs), Int(rhs)) => Int(lhs.wrapping_add(rhs)),
        (BinOp::Sub, Int(lhs), Int(rhs)) => Int(lhs.wrapping_sub(rhs)),
        (BinOp::Mul, Int(lhs), Int(rhs)) => Int(lhs.wrapping_mul(rhs)),

        // Truncamiento hacia cero, como `sdiv`/`srem`
        (BinOp::Div, Int(lhs), Int(rhs)) | (BinOp::Mod, Int(lhs), Int(rhs)) => {
            if rhs == 0 {
                return Err(RuntimeError::DivisionByZero);
            }

            if let BinOp::Div = op {
                Int(lhs.wrapping_div(rhs))
            } else {
                Int(lhs.wrapping_rem(rhs))
            }
        }

        (BinOp::Add, Real(lhs), Real(rhs)) => Real(lhs + rhs),
        (BinOp::Sub, Real(lhs), Real(rhs)) => Real(lhs - rhs),
        (BinOp::Mul, Real(lhs), Real(rhs)) => Real(lhs * rhs),
        (BinOp::Quot, Real(lhs), Real(rhs)) => Real(lhs / rhs),

        (BinOp::And, Bool(lhs), Bool(rhs)) => Bool(lhs && rhs),
        (BinOp::Or, Bool(lhs), Bool(rhs)) => Bool(lhs || rhs),

        (BinOp::Eq, Int(lhs), Int(rhs)) => Bool(lhs == rhs),
        (BinOp::Ne, Int(lhs), Int(rhs)) => Bool(lhs != rhs),
        (BinOp::Lt, Int(lhs), Int(rhs)) => Bool(lhs < rhs),
        (BinOp::Le, Int(lhs), Int(rhs)) => Bool(lhs <= rhs),
        (BinOp::Gt, Int(lhs), Int(rhs)) => Bool(lhs > rhs),
        (BinOp::Ge, Int(lhs), Int(rhs)) => Bool(lhs >= rhs),

        (BinOp::Eq, Real(lhs), Real(rhs)) => Bool(lhs == rhs),
        (BinOp::Ne, Real(lhs), Real(rhs)) => Bool(lhs != rhs),
        (BinOp::Lt, Real(lhs), Real(rhs)) => Bool(lhs < rhs),
        (BinOp::Le, Real(lhs), Real(rhs)) => Bool(lhs <= rhs),
        (BinOp::Gt, Real(lhs), Real(rhs)) => Bool(lhs > rhs),
        (BinOp::Ge, Real(lhs), Real(rhs)) => Bool(lhs >= rhs),

        // Los literales están internados: igualdad de contenido e
        // igualdad de puntero coinciden
        (BinOp::Eq, Str(lhs), Str(rhs)) => Bool(lhs == rhs),
        (BinOp::Ne, Str(lhs), Str(rhs)) => Bool(lhs != rhs),

        (op, lhs, rhs) => unreachable!("operator {} over {:?} and {:?}", op, lhs, rhs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile;

    fn output_of(source: &str) -> String {
        let program = compile(source).unwrap();

        let mut output = Vec::new();
        run(&program, &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    fn failure_of(source: &str) -> RuntimeError {
        let program = compile(source).unwrap();
        run(&program, &mut Vec::new()).unwrap_err()
    }

    #[test]
    fn writes_strings_and_newlines() {
        let output = output_of("MODULE H; BEGIN Write(\"Hi\"); WriteLn(); END H.");
        assert_eq!(output, "Hi\n");
    }

    #[test]
    fn integer_arithmetic_and_assignment() {
        let output = output_of(
            "MODULE S; VAR a, b, s: INTEGER;
             BEGIN a := 10; b := 20; s := a + b; Write(s); WriteLn(); END S.",
        );
        assert_eq!(output, "30\n");
    }

    #[test]
    fn for_loops_are_inclusive() {
        let output = output_of(
            "MODULE L; VAR i: INTEGER;
             BEGIN FOR i := 1 TO 3 DO Write(i); Write(\" \"); END; WriteLn(); END L.",
        );
        assert_eq!(output, "1 2 3 \n");
    }

    #[test]
    fn for_loops_may_run_zero_times() {
        let output = output_of(
            "MODULE Z; VAR i: INTEGER;
             BEGIN FOR i := 3 TO 1 DO Write(i); END; Write(\"done\"); WriteLn(); END Z.",
        );
        assert_eq!(output, "done\n");
    }

    #[test]
    fn for_bounds_are_evaluated_once() {
        let output = output_of(
            "MODULE B; VAR i, n: INTEGER;
             BEGIN n := 3; FOR i := 1 TO n DO n := 10; Write(i); END; WriteLn(); END B.",
        );
        assert_eq!(output, "123\n");
    }

    #[test]
    fn recursive_functions_return_values() {
        let output = output_of(
            "MODULE F;
             PROCEDURE f(n: INTEGER): INTEGER;
             BEGIN IF n <= 1 THEN RETURN 1; ELSE RETURN n * f(n - 1); END; END f;
             BEGIN Write(f(5)); WriteLn(); END F.",
        );
        assert_eq!(output, "120\n");
    }

    #[test]
    fn multidimensional_arrays_store_by_element() {
        let output = output_of(
            "MODULE M; VAR m: ARRAY 2, 2 OF INTEGER; i, j: INTEGER;
             BEGIN
                 FOR i := 0 TO 1 DO FOR j := 0 TO 1 DO m[i, j] := i * 10 + j; END; END;
                 Write(m[1, 0]); WriteLn();
             END M.",
        );
        assert_eq!(output, "10\n");
    }

    #[test]
    fn while_loops_terminate_on_condition() {
        let output = output_of(
            "MODULE W; VAR i: INTEGER;
             BEGIN i := 3; WHILE i > 0 DO Write(i); i := i - 1; END; WriteLn(); END W.",
        );
        assert_eq!(output, "321\n");
    }

    #[test]
    fn div_and_mod_truncate_toward_zero() {
        let output = output_of(
            "MODULE D; BEGIN Write(-7 DIV 2); Write(\" \"); Write(-7 MOD 2); WriteLn(); END D.",
        );
        assert_eq!(output, "-3 -1\n");
    }

    #[test]
    fn reals_print_with_six_decimals() {
        let output = output_of(
            "MODULE R; VAR r: REAL; BEGIN r := 1 / 2; Write(r); WriteLn(); Write(1.5); END R.",
        );
        assert_eq!(output, "0.500000\n1.500000");
    }

    #[test]
    fn procedures_mutate_module_globals() {
        let output = output_of(
            "MODULE G; VAR total: INTEGER;
             PROCEDURE bump(); BEGIN total := total + 1; END bump;
             BEGIN bump(); bump(); Write(total); END G.",
        );
        assert_eq!(output, "2");
    }

    #[test]
    fn array_arguments_share_storage() {
        let output = output_of(
            "MODULE A; VAR data: ARRAY 2 OF INTEGER;
             PROCEDURE fill(v: ARRAY 2 OF INTEGER); BEGIN v[0] := 7; END fill;
             BEGIN fill(data); Write(data[0]); END A.",
        );
        assert_eq!(output, "7");
    }

    #[test]
    fn string_comparison_follows_content() {
        let output = output_of(
            "MODULE S; VAR s: STRING;
             BEGIN s := \"a\"; IF s = \"a\" THEN Write(\"eq\"); ELSE Write(\"ne\"); END; END S.",
        );
        assert_eq!(output, "eq");
    }

    #[test]
    fn logical_operators_evaluate_both_operands() {
        let output = output_of(
            "MODULE L; VAR x: INTEGER;
             PROCEDURE side(): INTEGER; BEGIN Write(\"!\"); RETURN 1; END side;
             BEGIN IF (x = 0) OR (side() = 1) THEN Write(\"yes\"); END; END L.",
        );

        // Sin cortocircuito: el efecto del operando derecho siempre ocurre
        assert_eq!(output, "!yes");
    }

    #[test]
    fn write_accepts_several_arguments() {
        let output = output_of(
            "MODULE W; VAR a, b: INTEGER;
             BEGIN a := 1; b := 2; Write(a, \" y \", b); END W.",
        );
        assert_eq!(output, "1 y 2");
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let error = failure_of(
            "MODULE E; VAR z: INTEGER; BEGIN z := 0; Write(1 DIV z); END E.",
        );
        assert!(matches!(error, RuntimeError::DivisionByZero));
    }

    #[test]
    fn out_of_bounds_indexing_is_a_runtime_error() {
        let error = failure_of(
            "MODULE E; VAR a: ARRAY 2 OF INTEGER; i: INTEGER;
             BEGIN i := 5; a[i] := 1; END E.",
        );

        assert!(matches!(
            error,
            RuntimeError::OutOfBounds {
                index: 5,
                length: 2
            }
        ));
    }
}
