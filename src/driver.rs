//! Wires CLI flags to the loader and the VM.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::natives::Registry;
use crate::parser::Program;
use crate::vm::{Error as VmError, Vm};
use crate::{image, lexer, logging, parser};

#[derive(Parser, Debug)]
#[command(name = "stackvm", about = "Assemble and run stack-VM programs")]
pub struct Cli {
    /// Source (`.asm`) or binary image to load.
    #[arg(short, long)]
    pub path: PathBuf,

    /// Write the parsed program as a binary image here and exit without running it.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Root directory searched for `#"path"` includes not found relative to the source.
    #[arg(short = 'I', long)]
    pub include: Option<PathBuf>,
}

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Lex(lexer::Error),
    Parse(parser::Error),
    Image(image::Error),
    Vm(VmError),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "{e}"),
            Error::Lex(e) => write!(f, "{e}"),
            Error::Parse(e) => write!(f, "{e}"),
            Error::Image(e) => write!(f, "{e}"),
            Error::Vm(e) => write!(f, "{e}"),
        }
    }
}

impl From<lexer::Error> for Error {
    fn from(e: lexer::Error) -> Error {
        Error::Lex(e)
    }
}

impl From<parser::Error> for Error {
    fn from(e: parser::Error) -> Error {
        Error::Parse(e)
    }
}

impl From<image::Error> for Error {
    fn from(e: image::Error) -> Error {
        Error::Image(e)
    }
}

impl From<VmError> for Error {
    fn from(e: VmError) -> Error {
        Error::Vm(e)
    }
}

/// `true` iff `path`'s content looks like a binary image rather than
/// assembly source: images always carry the `;` header terminator within
/// their first byte run of string-record lengths, and in practice never
/// decode as valid UTF-8 assembly text.
fn looks_like_image(path: &Path, bytes: &[u8]) -> bool {
    path.extension().is_some_and(|ext| ext == "img") || std::str::from_utf8(bytes).is_err()
}

fn load_program(cli: &Cli) -> Result<Program, Error> {
    let bytes = fs::read(&cli.path).map_err(Error::Io)?;

    if looks_like_image(&cli.path, &bytes) {
        logging::note("loading binary image");
        return Ok(image::decode(&bytes)?);
    }

    logging::note("lexing and expanding macros");
    let lines = lexer::lex_file(&cli.path, cli.include.as_deref())?;

    logging::note("parsing instruction stream");
    Ok(parser::parse(&lines)?)
}

/// Run the full pipeline described by `cli`. Returns the process exit code.
pub fn run(cli: Cli) -> i32 {
    match run_inner(cli) {
        Ok(()) => 0,
        Err(e) => {
            logging::error(e.to_string());
            1
        }
    }
}

fn run_inner(cli: Cli) -> Result<(), Error> {
    let program = load_program(&cli)?;

    if let Some(output) = &cli.output {
        logging::note("writing binary image");
        let bytes = image::encode(&program);
        fs::write(output, bytes).map_err(Error::Io)?;
        return Ok(());
    }

    logging::note("running");
    let mut vm = Vm::new(program, Registry::with_stdlib());
    vm.run()?;
    Ok(())
}
