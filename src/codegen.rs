//! Emisión de IR textual estilo LLVM.
//!
//! # Representación
//! Esta fase reduce un [`Program`] analizado a un módulo de IR en
//! formato textual. El modelo de memoria es el clásico de frontends
//! sin optimización: cada variable vive en una celda (`alloca` para
//! locales, global para variables de módulo) y cada lectura o
//! escritura pasa por `load`/`store`. Los agregados se direccionan
//! con `getelementptr` sin cargarlos.
//!
//! # Nombres SSA y etiquetas
//! Cada función lleva dos contadores monotónicos independientes: uno
//! para temporales `%t1, %t2, …` y otro para numerar etiquetas de
//! bloques. Separarlos evita colisiones entre valores y etiquetas con
//! prefijos comunes. Ambos se reinician en cada función. Las celdas
//! con nombre conservan el nombre de la fuente.
//!
//! # Bloques básicos
//! Todo bloque termina en exactamente un terminador (`br`, `ret`,
//! `unreachable`). Si una sentencia sigue a un terminador dentro de la
//! misma secuencia fuente, se abre un bloque `deadN` para contenerla.
//!
//! # Cadenas
//! Los literales de cadena se agrupan en un pool por contenido. Cada
//! literal único recibe un global `@.strK` numerado por orden de
//! primera aparición, terminado en NUL y emitido al final del módulo.

use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use thiserror::Error;

use crate::parse::{BinOp, UnOp};
use crate::semantic::{Expr, ExprKind, Procedure, Program, Slot, Stmt, Target, Type};

/// Error de emisión.
#[derive(Error, Debug)]
pub enum EmitError {
    /// Error de E/S del destino de emisión.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Invariante interna rota; el programa analizado no tiene una
    /// forma que esta fase sepa emitir.
    #[error("{0}")]
    Internal(&'static str),
}

/// Emite el módulo IR completo de un programa analizado.
pub fn emit<W: Write>(program: &Program, output: &mut W) -> Result<(), EmitError> {
    let mut emitter = Emitter {
        output,
        strings: StringPool::default(),
    };

    emitter.emit_module(program)
}

/// Pool de literales de cadena, indexado por contenido.
#[derive(Default)]
struct StringPool {
    indices: HashMap<Rc<str>, u32>,
    entries: Vec<Rc<str>>,
}

impl StringPool {
    /// Índices 1-based por orden de primera aparición.
    fn intern(&mut self, text: &str) -> u32 {
        if let Some(&index) = self.indices.get(text) {
            return index;
        }

        let entry: Rc<str> = Rc::from(text);
        let index = self.entries.len() as u32 + 1;
        self.entries.push(Rc::clone(&entry));
        self.indices.insert(entry, index);
        index
    }
}

/// Contexto de una función en emisión.
struct Frame {
    kind: FrameKind,
    temps: u32,
    labels: u32,
    terminated: bool,
    vars: HashMap<String, VarInfo>,
}

enum FrameKind {
    /// `@main`, el cuerpo del módulo; retorna `i32 0`.
    Main,
    Proc(Option<Type>),
}

struct VarInfo {
    ptr: String,
    /// Los parámetros de tipo array reciben un puntero; su celda
    /// local almacena ese puntero y exige una carga adicional.
    indirect: bool,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Frame {
            kind,
            temps: 0,
            labels: 0,
            terminated: false,
            vars: HashMap::new(),
        }
    }

    fn temp(&mut self) -> String {
        self.temps += 1;
        format!("%t{}", self.temps)
    }

    fn label(&mut self) -> u32 {
        self.labels += 1;
        self.labels
    }
}

struct Emitter<'a, W: Write> {
    output: &'a mut W,
    strings: StringPool,
}

impl<W: Write> Emitter<'_, W> {
    fn emit_module(&mut self, program: &Program) -> Result<(), EmitError> {
        writeln!(self.output, "; ModuleID = \"oberon_module\"")?;
        writeln!(self.output, "declare i32 @printf(i8*, ...)")?;
        writeln!(self.output)?;

        // Las variables de módulo son globales con inicialización a cero,
        // visibles desde cualquier procedimiento
        for global in &program.globals {
            writeln!(
                self.output,
                "@{} = global {} {}",
                global.name,
                llvm_type(&global.ty)?,
                zero_value(&global.ty)
            )?;
        }

        if !program.globals.is_empty() {
            writeln!(self.output)?;
        }

        for procedure in &program.procedures {
            self.emit_procedure(procedure)?;
            writeln!(self.output)?;
        }

        self.emit_main(program)?;

        writeln!(self.output)?;
        let entries = std::mem::take(&mut self.strings.entries);
        for (position, text) in entries.iter().enumerate() {
            let bytes = text.as_bytes();
            writeln!(
                self.output,
                "@.str{} = private constant [{} x i8] c\"{}\"",
                position + 1,
                bytes.len() + 1,
                escape_bytes(bytes)
            )?;
        }

        Ok(())
    }

    fn emit_procedure(&mut self, procedure: &Procedure) -> Result<(), EmitError> {
        let mut frame = Frame::new(FrameKind::Proc(procedure.ret.clone()));

        let ret = match &procedure.ret {
            Some(ty) => llvm_type(ty)?,
            None => String::from("void"),
        };

        let mut signature = String::new();
        for (position, param) in procedure.params.iter().enumerate() {
            if position > 0 {
                signature.push_str(", ");
            }

            let ty = param_type(&param.ty)?;
            signature.push_str(&format!("{} %{}", ty, param.name));
        }

        writeln!(
            self.output,
            "define {} @{}({}) {{",
            ret, procedure.symbol, signature
        )?;
        writeln!(self.output, "entry:")?;

        // Los parámetros entrantes se copian a celdas propias
        for param in &procedure.params {
            let ty = param_type(&param.ty)?;
            let ptr = format!("%{}.addr", param.name);

            emit!(self, "{} = alloca {}", ptr, ty)?;
            emit!(self, "store {} %{}, {}* {}", ty, param.name, ty, ptr)?;

            frame.vars.insert(
                param.name.to_string(),
                VarInfo {
                    ptr,
                    indirect: param.ty.is_array(),
                },
            );
        }

        for local in &procedure.locals {
            let ptr = format!("%{}", local.name);
            emit!(self, "{} = alloca {}", ptr, llvm_type(&local.ty)?)?;

            frame.vars.insert(
                local.name.to_string(),
                VarInfo {
                    ptr,
                    indirect: false,
                },
            );
        }

        self.emit_stmts(&mut frame, &procedure.body)?;

        if !frame.terminated {
            match &procedure.ret {
                None => emit!(self, "ret void")?,
                // El análisis garantiza retorno por todos los caminos;
                // el bloque de cierre restante es inalcanzable
                Some(_) => emit!(self, "unreachable")?,
            }
        }

        writeln!(self.output, "}}")?;
        Ok(())
    }

    fn emit_main(&mut self, program: &Program) -> Result<(), EmitError> {
        let mut frame = Frame::new(FrameKind::Main);

        writeln!(self.output, "define i32 @main() {{")?;
        writeln!(self.output, "entry:")?;

        self.emit_stmts(&mut frame, &program.body)?;

        if !frame.terminated {
            emit!(self, "ret i32 0")?;
        }

        writeln!(self.output, "}}")?;
        Ok(())
    }

    fn emit_stmts(&mut self, frame: &mut Frame, stmts: &[Stmt]) -> Result<(), EmitError> {
        for stmt in stmts {
            self.emit_stmt(frame, stmt)?;
        }

        Ok(())
    }

    fn emit_stmt(&mut self, frame: &mut Frame, stmt: &Stmt) -> Result<(), EmitError> {
        // Una sentencia tras un terminador abre un bloque muerto para
        // conservar la forma de bloques básicos
        if frame.terminated {
            let label = frame.label();
            self.place_label(frame, &format!("dead{}", label))?;
        }

        match stmt {
            Stmt::Assign { target, value } => {
                let operand = self.emit_expr(frame, value)?;
                let (ptr, ty) = self.address(frame, target)?;
                emit!(self, "store {} {}, {}* {}", ty, operand, ty, ptr)?;
            }

            Stmt::Call { proc, args } => {
                let arguments = self.call_arguments(frame, args)?;

                match &proc.ret {
                    None => emit!(self, "call void @{}({})", proc.symbol, arguments)?,
                    Some(ty) => {
                        // El resultado se descarta, pero el tipo de la
                        // llamada debe ser el verdadero
                        let result = frame.temp();
                        emit!(
                            self,
                            "{} = call {} @{}({})",
                            result,
                            llvm_type(ty)?,
                            proc.symbol,
                            arguments
                        )?;
                    }
                }
            }

            Stmt::Write { args } => {
                for arg in args {
                    let operand = self.emit_expr(frame, arg)?;
                    let format = match arg.ty {
                        Type::Integer => "%d",
                        Type::Real => "%f",
                        Type::String => "%s",
                        _ => return Err(EmitError::Internal("Write argument is not scalar")),
                    };

                    let format_ptr = self.string_ptr(frame, format)?;
                    let result = frame.temp();
                    emit!(
                        self,
                        "{} = call i32 (i8*, ...) @printf(i8* {}, {} {})",
                        result,
                        format_ptr,
                        llvm_type(&arg.ty)?,
                        operand
                    )?;
                }
            }

            Stmt::WriteLn => {
                let newline = self.string_ptr(frame, "\n")?;
                let result = frame.temp();
                emit!(
                    self,
                    "{} = call i32 (i8*, ...) @printf(i8* {})",
                    result,
                    newline
                )?;
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.emit_expr(frame, condition)?;

                let label = frame.label();
                let then_label = format!("then{}", label);
                let else_label = format!("else{}", label);
                let end_label = format!("endif{}", label);

                let alternative = if else_branch.is_empty() {
                    &end_label
                } else {
                    &else_label
                };
                self.branch(frame, &condition, &then_label, alternative)?;

                self.place_label(frame, &then_label)?;
                self.emit_stmts(frame, then_branch)?;
                if !frame.terminated {
                    self.jump(frame, &end_label)?;
                }

                if !else_branch.is_empty() {
                    self.place_label(frame, &else_label)?;
                    self.emit_stmts(frame, else_branch)?;
                    if !frame.terminated {
                        self.jump(frame, &end_label)?;
                    }
                }

                self.place_label(frame, &end_label)?;
            }

            Stmt::While { condition, body } => {
                let label = frame.label();
                let cond_label = format!("cond{}", label);
                let body_label = format!("body{}", label);
                let end_label = format!("endw{}", label);

                self.jump(frame, &cond_label)?;

                // La condición se reevalúa en cada iteración
                self.place_label(frame, &cond_label)?;
                let condition = self.emit_expr(frame, condition)?;
                self.branch(frame, &condition, &body_label, &end_label)?;

                self.place_label(frame, &body_label)?;
                self.emit_stmts(frame, body)?;
                if !frame.terminated {
                    self.jump(frame, &cond_label)?;
                }

                self.place_label(frame, &end_label)?;
            }

            Stmt::For {
                var,
                from,
                to,
                body,
            } => {
                // La cota superior se evalúa una única vez
                let from = self.emit_expr(frame, from)?;
                let to = self.emit_expr(frame, to)?;

                let target = loop_var(var);
                let (ptr, _) = self.address(frame, &target)?;
                emit!(self, "store i32 {}, i32* {}", from, ptr)?;

                let label = frame.label();
                let start_label = format!("for_start{}", label);
                let body_label = format!("for_body{}", label);
                let end_label = format!("for_end{}", label);

                self.jump(frame, &start_label)?;

                self.place_label(frame, &start_label)?;
                let current = frame.temp();
                emit!(self, "{} = load i32, i32* {}", current, ptr)?;
                let check = frame.temp();
                emit!(self, "{} = icmp sle i32 {}, {}", check, current, to)?;
                self.branch(frame, &check, &body_label, &end_label)?;

                self.place_label(frame, &body_label)?;
                self.emit_stmts(frame, body)?;
                if !frame.terminated {
                    // El cuerpo pudo escribir la variable; se recarga
                    let current = frame.temp();
                    emit!(self, "{} = load i32, i32* {}", current, ptr)?;
                    let next = frame.temp();
                    emit!(self, "{} = add i32 {}, 1", next, current)?;
                    emit!(self, "store i32 {}, i32* {}", next, ptr)?;
                    self.jump(frame, &start_label)?;
                }

                self.place_label(frame, &end_label)?;
            }

            Stmt::Return(value) => {
                match (&frame.kind, value) {
                    (FrameKind::Main, None) => emit!(self, "ret i32 0")?,
                    (FrameKind::Proc(None), None) => emit!(self, "ret void")?,

                    (FrameKind::Proc(Some(ty)), Some(value)) => {
                        let ty = llvm_type(ty)?;
                        let operand = self.emit_expr(frame, value)?;
                        emit!(self, "ret {} {}", ty, operand)?;
                    }

                    _ => return Err(EmitError::Internal("return does not match function kind")),
                }

                frame.terminated = true;
            }
        }

        Ok(())
    }

    fn emit_expr(&mut self, frame: &mut Frame, expr: &Expr) -> Result<String, EmitError> {
        match &expr.kind {
            ExprKind::Int(value) => Ok(value.to_string()),
            ExprKind::Real(value) => Ok(real_constant(*value)),
            ExprKind::Str(text) => self.string_ptr(frame, text),

            ExprKind::Load(target) => {
                let (ptr, ty) = self.address(frame, target)?;
                let result = frame.temp();
                emit!(self, "{} = load {}, {}* {}", result, ty, ty, ptr)?;
                Ok(result)
            }

            // Un array pasa como el puntero a su almacenamiento
            ExprKind::ArrayRef(target) => {
                let (ptr, _) = self.address(frame, target)?;
                Ok(ptr)
            }

            ExprKind::Promote(operand) => {
                let value = self.emit_expr(frame, operand)?;
                let result = frame.temp();
                emit!(self, "{} = sitofp i32 {} to double", result, value)?;
                Ok(result)
            }

            ExprKind::Unary { op, operand } => {
                let value = self.emit_expr(frame, operand)?;
                match op {
                    UnOp::Plus => Ok(value),
                    UnOp::Minus => {
                        let result = frame.temp();
                        match operand.ty {
                            Type::Integer => {
                                emit!(self, "{} = sub i32 0, {}", result, value)?
                            }
                            Type::Real => {
                                emit!(self, "{} = fsub double 0.0, {}", result, value)?
                            }
                            _ => return Err(EmitError::Internal("negation of non-numeric value")),
                        }

                        Ok(result)
                    }
                }
            }

            ExprKind::Binary { op, lhs, rhs } => {
                let left = self.emit_expr(frame, lhs)?;
                let right = self.emit_expr(frame, rhs)?;

                let (instruction, ty) = binary_instruction(*op, &lhs.ty)?;
                let result = frame.temp();
                emit!(self, "{} = {} {} {}, {}", result, instruction, ty, left, right)?;
                Ok(result)
            }

            ExprKind::Call { proc, args } => {
                let arguments = self.call_arguments(frame, args)?;
                let ret = match &proc.ret {
                    Some(ty) => llvm_type(ty)?,
                    None => return Err(EmitError::Internal("value call to a void procedure")),
                };

                let result = frame.temp();
                emit!(
                    self,
                    "{} = call {} @{}({})",
                    result,
                    ret,
                    proc.symbol,
                    arguments
                )?;
                Ok(result)
            }
        }
    }

    fn call_arguments(&mut self, frame: &mut Frame, args: &[Expr]) -> Result<String, EmitError> {
        let mut text = String::new();
        for (position, arg) in args.iter().enumerate() {
            if position > 0 {
                text.push_str(", ");
            }

            let operand = self.emit_expr(frame, arg)?;
            text.push_str(&format!("{} {}", param_type(&arg.ty)?, operand));
        }

        Ok(text)
    }

    /// Calcula el puntero al almacenamiento de un designador y el tipo
    /// del elemento direccionado.
    fn address(&mut self, frame: &mut Frame, target: &Target) -> Result<(String, String), EmitError> {
        let mut ptr = match &target.slot {
            Slot::Global(name) => format!("@{}", name),

            Slot::Local(name) => {
                let info = frame
                    .vars
                    .get(name.as_ref())
                    .ok_or(EmitError::Internal("local slot without storage"))?;

                if info.indirect {
                    let aggregate = llvm_type(&target.var_ty)?;
                    let ptr = info.ptr.clone();
                    let loaded = frame.temp();
                    emit!(
                        self,
                        "{} = load {}*, {}** {}",
                        loaded,
                        aggregate,
                        aggregate,
                        ptr
                    )?;
                    loaded
                } else {
                    info.ptr.clone()
                }
            }
        };

        if !target.indices.is_empty() {
            let mut operands = Vec::with_capacity(target.indices.len());
            for index in &target.indices {
                operands.push(self.emit_expr(frame, index)?);
            }

            // Índice inicial 0 para atravesar el puntero al agregado,
            // luego uno por dimensión indexada
            let aggregate = llvm_type(&target.var_ty)?;
            let element = frame.temp();
            let mut gep = format!(
                "{} = getelementptr inbounds {}, {}* {}, i32 0",
                element, aggregate, aggregate, ptr
            );
            for operand in &operands {
                gep.push_str(&format!(", i32 {}", operand));
            }

            emit!(self, "{}", gep)?;
            ptr = element;
        }

        Ok((ptr, llvm_type(&target.ty)?))
    }

    /// Puntero `i8*` al primer byte del global de una cadena.
    fn string_ptr(&mut self, frame: &mut Frame, text: &str) -> Result<String, EmitError> {
        let index = self.strings.intern(text);
        let length = text.as_bytes().len() + 1;

        let result = frame.temp();
        emit!(
            self,
            "{} = getelementptr inbounds [{} x i8], [{} x i8]* @.str{}, i32 0, i32 0",
            result,
            length,
            length,
            index
        )?;

        Ok(result)
    }

    fn branch(
        &mut self,
        frame: &mut Frame,
        condition: &str,
        then_label: &str,
        else_label: &str,
    ) -> Result<(), EmitError> {
        emit!(
            self,
            "br i1 {}, label %{}, label %{}",
            condition,
            then_label,
            else_label
        )?;
        frame.terminated = true;
        Ok(())
    }

    fn jump(&mut self, frame: &mut Frame, label: &str) -> Result<(), EmitError> {
        emit!(self, "br label %{}", label)?;
        frame.terminated = true;
        Ok(())
    }

    fn place_label(&mut self, frame: &mut Frame, label: &str) -> Result<(), EmitError> {
        writeln!(self.output, "{}:", label)?;
        frame.terminated = false;
        Ok(())
    }
}

/// Designador sintético para la variable de un FOR.
fn loop_var(slot: &Slot) -> Target {
    Target {
        slot: slot.clone(),
        var_ty: Type::Integer,
        ty: Type::Integer,
        indices: Vec::new(),
    }
}

fn llvm_type(ty: &Type) -> Result<String, EmitError> {
    Ok(match ty {
        Type::Integer => String::from("i32"),
        Type::Real => String::from("double"),
        Type::String => String::from("i8*"),
        Type::Boolean => String::from("i1"),
        Type::Array { length, element } => {
            format!("[{} x {}]", length, llvm_type(element)?)
        }
    })
}

/// Tipo de un parámetro o argumento: los arrays viajan como punteros.
fn param_type(ty: &Type) -> Result<String, EmitError> {
    let text = llvm_type(ty)?;
    Ok(if ty.is_array() {
        format!("{}*", text)
    } else {
        text
    })
}

fn zero_value(ty: &Type) -> &'static str {
    match ty {
        Type::Integer => "0",
        Type::Real => "0.0",
        Type::String => "null",
        Type::Boolean => "false",
        Type::Array { .. } => "zeroinitializer",
    }
}

fn binary_instruction(op: BinOp, operand: &Type) -> Result<(&'static str, String), EmitError> {
    let instruction = match (op, operand) {
        (BinOp::Add, Type::Integer) => "add",
        (BinOp::Sub, Type::Integer) => "sub",
        (BinOp::Mul, Type::Integer) => "mul",
        (BinOp::Div, Type::Integer) => "sdiv",
        (BinOp::Mod, Type::Integer) => "srem",

        (BinOp::Add, Type::Real) => "fadd",
        (BinOp::Sub, Type::Real) => "fsub",
        (BinOp::Mul, Type::Real) => "fmul",
        (BinOp::Quot, Type::Real) => "fdiv",

        (BinOp::And, Type::Boolean) => "and",
        (BinOp::Or, Type::Boolean) => "or",

        (BinOp::Eq, Type::Integer) => "icmp eq",
        (BinOp::Ne, Type::Integer) => "icmp ne",
        (BinOp::Lt, Type::Integer) => "icmp slt",
        (BinOp::Le, Type::Integer) => "icmp sle",
        (BinOp::Gt, Type::Integer) => "icmp sgt",
        (BinOp::Ge, Type::Integer) => "icmp sge",

        (BinOp::Eq, Type::Real) => "fcmp oeq",
        (BinOp::Ne, Type::Real) => "fcmp one",
        (BinOp::Lt, Type::Real) => "fcmp olt",
        (BinOp::Le, Type::Real) => "fcmp ole",
        (BinOp::Gt, Type::Real) => "fcmp ogt",
        (BinOp::Ge, Type::Real) => "fcmp oge",

        // Las cadenas internadas se comparan por puntero
        (BinOp::Eq, Type::String) => "icmp eq",
        (BinOp::Ne, Type::String) => "icmp ne",

        _ => return Err(EmitError::Internal("operator does not match operand type")),
    };

    Ok((instruction, llvm_type(operand)?))
}

/// Formatea un inmediato `double`. Los valores enteros se imprimen en
/// decimal exacto; el resto en notación científica con punto decimal
/// obligatorio. En ambos casos el texto re-parsea al mismo `double`.
fn real_constant(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        let text = format!("{:e}", value);
        match text.find('e') {
            Some(position) if !text[..position].contains('.') => {
                format!("{}.0{}", &text[..position], &text[position..])
            }
            _ => text,
        }
    }
}

/// Escapa bytes para un literal `c"..."`. Solo ASCII imprimible pasa
/// verbatim; el resto (incluido el NUL final) usa `\XX` hexadecimal.
fn escape_bytes(bytes: &[u8]) -> String {
    let mut text = String::new();
    for &byte in bytes.iter().chain(std::iter::once(&0u8)) {
        if (32..=126).contains(&byte) && byte != b'"' && byte != b'\\' {
            text.push(byte as char);
        } else {
            text.push_str(&format!("\\{:02X}", byte));
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::tokenize;
    use crate::parse::parse;

    fn ir(source: &str) -> String {
        let program = parse(&tokenize(source).unwrap()).unwrap().analyze().unwrap();

        let mut output = Vec::new();
        emit(&program, &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    /// Verifica que cada bloque de cada función termina en exactamente
    /// un terminador, y que este es su última instrucción.
    fn assert_blocks_are_terminated(ir: &str) {
        let mut in_function = false;
        let mut block: Vec<&str> = Vec::new();

        let mut check_block = |block: &mut Vec<&str>| {
            if block.is_empty() {
                return;
            }

            let terminators: Vec<usize> = block
                .iter()
                .enumerate()
                .filter(|(_, line)| {
                    let line = line.trim_start();
                    line.starts_with("br ")
                        || line.starts_with("ret ")
                        || line == "ret"
                        || line == "unreachable"
                })
                .map(|(position, _)| position)
                .collect();

            assert_eq!(terminators, vec![block.len() - 1], "block: {:?}", block);
            block.clear();
        };

        for line in ir.lines() {
            if line.starts_with("define ") {
                in_function = true;
            } else if line == "}" {
                check_block(&mut block);
                in_function = false;
            } else if in_function && line.ends_with(':') {
                check_block(&mut block);
            } else if in_function && !line.is_empty() {
                block.push(line);
            }
        }
    }

    #[test]
    fn module_header_and_string_pool() {
        let text = ir("MODULE H; BEGIN Write(\"Hi\"); WriteLn(); END H.");

        assert!(text.starts_with("; ModuleID = \"oberon_module\"\ndeclare i32 @printf(i8*, ...)\n"));
        assert!(text.contains("@.str1 = private constant [3 x i8] c\"Hi\\00\""));
        assert!(text.contains("@.str2 = private constant [3 x i8] c\"%s\\00\""));
        assert!(text.contains("@.str3 = private constant [2 x i8] c\"\\0A\\00\""));
        assert!(text.contains("ret i32 0"));
    }

    #[test]
    fn string_pool_interns_by_content() {
        let text = ir("MODULE S; BEGIN Write(\"x\"); Write(\"x\"); END S.");

        assert_eq!(text.matches("= private constant").count(), 2);
        assert!(text.contains("@.str1 = private constant [2 x i8] c\"x\\00\""));
    }

    #[test]
    fn module_variables_become_globals() {
        let text = ir(
            "MODULE S; VAR a, b: INTEGER; r: REAL; m: ARRAY 2, 2 OF INTEGER;
             BEGIN a := 1; END S.",
        );

        assert!(text.contains("@a = global i32 0"));
        assert!(text.contains("@b = global i32 0"));
        assert!(text.contains("@r = global double 0.0"));
        assert!(text.contains("@m = global [2 x [2 x i32]] zeroinitializer"));
        assert!(text.contains("store i32 1, i32* @a"));
    }

    #[test]
    fn integer_arithmetic_lowering() {
        let text = ir(
            "MODULE S; VAR a, b, s: INTEGER;
             BEGIN a := 10; b := 20; s := a + b * 2; s := a DIV b; s := a MOD b; END S.",
        );

        assert!(text.contains("mul i32"));
        assert!(text.contains("add i32"));
        assert!(text.contains("sdiv i32"));
        assert!(text.contains("srem i32"));
    }

    #[test]
    fn promotion_inserts_sitofp_and_division_is_fdiv() {
        let text = ir("MODULE R; VAR r: REAL; BEGIN r := 1 / 2; r := r + 1; END R.");

        assert!(text.contains("sitofp i32 1 to double"));
        assert!(text.contains("fdiv double"));
        assert!(text.contains("fadd double"));
    }

    #[test]
    fn unary_minus_subtracts_from_zero() {
        let text = ir(
            "MODULE N; VAR i: INTEGER; r: REAL; BEGIN i := -i; r := -r; END N.",
        );

        assert!(text.contains("sub i32 0, %t"));
        assert!(text.contains("fsub double 0.0, %t"));
    }

    #[test]
    fn for_loops_compare_inclusively() {
        let text = ir(
            "MODULE L; VAR i: INTEGER; BEGIN FOR i := 1 TO 3 DO Write(i); END; END L.",
        );

        assert!(text.contains("br label %for_start1"));
        assert!(text.contains("icmp sle i32"));
        assert!(text.contains("br i1 %t2, label %for_body1, label %for_end1"));
        assert!(text.contains("add i32 %t"));
        assert_blocks_are_terminated(&text);
    }

    #[test]
    fn while_loops_reevaluate_their_condition() {
        let text = ir(
            "MODULE W; VAR i: INTEGER; BEGIN WHILE i < 3 DO i := i + 1; END; END W.",
        );

        let cond_position = text.find("cond1:").unwrap();
        let compare_position = text.find("icmp slt i32").unwrap();
        assert!(compare_position > cond_position);
        assert!(text.contains("br label %cond1"));
        assert!(text.contains("label %body1, label %endw1"));
        assert_blocks_are_terminated(&text);
    }

    #[test]
    fn if_without_else_branches_to_endif() {
        let text = ir(
            "MODULE C; VAR x: INTEGER; BEGIN IF x > 0 THEN x := 1; END; END C.",
        );

        assert!(text.contains("br i1 %t2, label %then1, label %endif1"));
        assert!(!text.contains("else1:"));
        assert_blocks_are_terminated(&text);
    }

    #[test]
    fn functions_with_early_returns_stay_well_formed() {
        let text = ir(
            "MODULE F; VAR x: INTEGER;
             PROCEDURE f(n: INTEGER): INTEGER;
             BEGIN IF n <= 1 THEN RETURN 1; ELSE RETURN n * f(n - 1); END; END f;
             BEGIN x := f(5); Write(x); END F.",
        );

        assert!(text.contains("define i32 @f(i32 %n) {"));
        assert!(text.contains("%n.addr = alloca i32"));
        assert!(text.contains("store i32 %n, i32* %n.addr"));
        assert!(text.contains("ret i32 1"));
        // El cierre tras ambos RETURN es inalcanzable pero está terminado
        assert!(text.contains("unreachable"));
        assert_blocks_are_terminated(&text);
    }

    #[test]
    fn multidimensional_geps_have_one_index_per_dimension() {
        let text = ir(
            "MODULE M; VAR m: ARRAY 2, 2 OF INTEGER; i, j: INTEGER;
             BEGIN m[i, j] := 7; i := m[1, 0]; END M.",
        );

        assert!(text.contains(
            "getelementptr inbounds [2 x [2 x i32]], [2 x [2 x i32]]* @m, i32 0, i32 %t1, i32 %t2"
        ));
        assert!(text.contains(", i32 0, i32 1, i32 0"));
        assert_blocks_are_terminated(&text);
    }

    #[test]
    fn array_parameters_pass_and_load_through_a_pointer() {
        let text = ir(
            "MODULE A; VAR data: ARRAY 3 OF INTEGER;
             PROCEDURE first(v: ARRAY 3 OF INTEGER): INTEGER;
             BEGIN RETURN v[0]; END first;
             BEGIN data[0] := 9; Write(first(data)); END A.",
        );

        assert!(text.contains("define i32 @first([3 x i32]* %v) {"));
        assert!(text.contains("%v.addr = alloca [3 x i32]*"));
        assert!(text.contains("load [3 x i32]*, [3 x i32]** %v.addr"));
        assert!(text.contains("call i32 @first([3 x i32]* @data)"));
        assert_blocks_are_terminated(&text);
    }

    #[test]
    fn void_calls_and_value_calls_use_their_true_types() {
        let text = ir(
            "MODULE P; VAR x: INTEGER;
             PROCEDURE p(); BEGIN x := x + 1; END p;
             PROCEDURE f(): INTEGER; BEGIN RETURN 3; END f;
             BEGIN p(); f(); END P.",
        );

        assert!(text.contains("call void @p()"));
        // En posición de sentencia el resultado se descarta en un temporal
        assert!(text.contains("= call i32 @f()"));
        assert_blocks_are_terminated(&text);
    }

    #[test]
    fn nested_procedures_emit_with_qualified_symbols() {
        let text = ir(
            "MODULE N; VAR x: INTEGER;
             PROCEDURE outer();
             PROCEDURE inner(); BEGIN x := 1; END inner;
             BEGIN inner(); END outer;
             BEGIN outer(); END N.",
        );

        assert!(text.contains("define void @outer.inner() {"));
        assert!(text.contains("call void @outer.inner()"));
    }

    #[test]
    fn string_comparison_is_by_interned_pointer() {
        let text = ir(
            "MODULE S; VAR x: INTEGER; s: STRING;
             BEGIN s := \"a\"; IF s = \"a\" THEN x := 1; END; END S.",
        );

        assert!(text.contains("icmp eq i8*"));
    }

    #[test]
    fn counters_reset_between_functions() {
        let text = ir(
            "MODULE T;
             PROCEDURE a(): INTEGER; BEGIN RETURN 1 + 2; END a;
             PROCEDURE b(): INTEGER; BEGIN RETURN 3 + 4; END b;
             BEGIN Write(a()); Write(b()); END T.",
        );

        // %t1 aparece en cada función por reinicio del contador
        assert!(text.matches("%t1 = ").count() >= 3);
    }

    #[test]
    fn real_constants_round_trip() {
        assert_eq!(real_constant(0.0), "0.0");
        assert_eq!(real_constant(2.0), "2.0");
        assert_eq!(real_constant(-3.0), "-3.0");

        for value in [3.25, 0.5, -0.1, 1234.5678] {
            let text = real_constant(value);
            assert_eq!(text.parse::<f64>().unwrap(), value, "{}", text);
            assert!(text.contains('.'));
        }
    }

    #[test]
    fn escapes_only_hex_sequences() {
        assert_eq!(escape_bytes(b"Hi"), "Hi\\00");
        assert_eq!(escape_bytes(b"\n"), "\\0A\\00");
        assert_eq!(escape_bytes(b"a\"b\\c"), "a\\22b\\5Cc\\00");
    }
}
