use anyhow::Context;
use clap::{crate_version, Arg, ArgAction, Command};

use oberon::codegen::{self, EmitError};
use oberon::semantic::Program;
use oberon::{interp, CompileError};

use std::fmt::{self, Display};
use std::io;
use std::path::{Path, PathBuf};
use std::{fs, process};

fn main() {
    process::exit(match run() {
        Ok(()) => 0,
        Err(failure) => {
            eprintln!("{}", failure);
            failure.code()
        }
    })
}

fn run() -> Result<(), Failure> {
    let args = Command::new("oberon")
        .version(crate_version!())
        .about("Oberon subset compiler")
        .arg(
            Arg::new("source")
                .value_name("FILE")
                .required(true)
                .help("Oberon source file"),
        )
        .arg(
            Arg::new("compile")
                .short('c')
                .long("compile")
                .action(ArgAction::SetTrue)
                .help("Emit LLVM IR next to the source instead of running"),
        )
        .get_matches();

    let source_path = PathBuf::from(args.get_one::<String>("source").unwrap());
    let source = fs::read_to_string(&source_path)
        .with_context(|| format!("failed to read {}", source_path.display()))
        .map_err(Failure::Io)?;

    let program = oberon::compile(&source).map_err(Failure::Compile)?;

    if args.get_flag("compile") {
        write_ir(&program, &source_path.with_extension("ll"))
    } else {
        let stdout = io::stdout();
        let mut stdout = stdout.lock();
        interp::run(&program, &mut stdout).map_err(Failure::Runtime)
    }
}

/// Escribe el módulo IR de forma atómica: primero a un archivo
/// temporal, que se renombra al destino solo si la emisión completa.
fn write_ir(program: &Program, path: &Path) -> Result<(), Failure> {
    let temp_path = path.with_extension("ll.tmp");

    let result = (|| {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("failed to create {}", temp_path.display()))
            .map_err(Failure::Io)?;

        codegen::emit(program, &mut file).map_err(|error| match error {
            EmitError::Internal(message) => Failure::Compile(CompileError::Internal(message)),
            EmitError::Io(error) => Failure::Io(anyhow::Error::new(error).context(format!(
                "failed to write {}",
                temp_path.display()
            ))),
        })?;

        fs::rename(&temp_path, path)
            .with_context(|| format!("failed to move IR into place at {}", path.display()))
            .map_err(Failure::Io)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

/// Fallo del driver con su código de salida: 1 para errores del
/// usuario (E/S, compilación, ejecución), 2 para errores internos.
enum Failure {
    Compile(CompileError),
    Runtime(interp::RuntimeError),
    Io(anyhow::Error),
}

impl Failure {
    fn code(&self) -> i32 {
        match self {
            Failure::Compile(error) => error.exit_code(),
            Failure::Runtime(_) => 1,
            Failure::Io(_) => 1,
        }
    }
}

impl Display for Failure {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Compile(error) => write!(fmt, "{}", error),
            Failure::Runtime(error) => write!(fmt, "runtime: {}", error),
            Failure::Io(error) => write!(fmt, "error: {:#}", error),
        }
    }
}
