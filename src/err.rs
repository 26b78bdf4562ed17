use std::{
    io,
    fmt::Write,
    path::PathBuf,
};
use colored::Colorize;
use crate::ext;

/// General enum, representing possible errors.
#[derive(Debug)]
pub enum Error {
    Io(io::Error, Vec<PathBuf>),
    /// Error, produced by an argument parser.
    Lexopt(lexopt::Error),
    /// Invalid or missing parameter.
    Config(String),
    /// Assembler identifier is not one of the supported assemblers.
    UnsupportedAssembler(String),
    /// Required executable is not available: `(tool_name, searched_path)`.
    MissingDependency(&'static str, PathBuf),
    /// No read files were found under the reads directory.
    NoSamplesFound(PathBuf),
    /// Pipeline or stage name is not recognized.
    UnknownStage(String),
    /// Stage cannot start: `(stage_name, reason)`.
    PreconditionNotMet(&'static str, String),
    /// External collaborator finished unsuccessfully: `(stage_name, exit_code, description)`.
    /// Exit code is `None` if the process was terminated by a signal.
    StageFailed(&'static str, Option<i32>, String),
    /// Locus alignment has no columns.
    EmptyLocusAlignment(PathBuf),
    InvalidData(String),
}

impl From<lexopt::Error> for Error {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

impl Error {
    /// Format error message.
    pub fn display(&self) -> String {
        let mut s = String::new();
        match self {
            Self::Io(e, files) => {
                write!(s, "{} in relation to ", "Input/Output error".red()).unwrap();
                if files.is_empty() {
                    write!(s, "unnamed streams").unwrap();
                } else {
                    write!(s, "{}", files.iter().map(|f| ext::fmt::path(f).cyan().to_string())
                        .collect::<Vec<_>>().join(", ")).unwrap();
                }
                write!(s, ": {}", e.kind()).unwrap();
                if let Some(e2) = e.get_ref() {
                    write!(s, ", {}", e2).unwrap();
                }
            }
            Self::Lexopt(e) => write!(s, "{} to parse command-line arguments: {}", "Failed".red(), e).unwrap(),
            Self::Config(e) => write!(s, "{}: {}", "Invalid configuration".red(), e).unwrap(),
            Self::UnsupportedAssembler(name) => write!(s, "{} {}, please select one of velvet, minia or abyss",
                "Unsupported assembler".red(), name.cyan()).unwrap(),
            Self::MissingDependency(tool, path) => write!(s, "{} {} (searched for {})",
                "Could not find executable".red(), tool.bold(), ext::fmt::path(path).cyan()).unwrap(),
            Self::NoSamplesFound(dir) => write!(s, "{} under {}", "No read files found".red(),
                ext::fmt::path(dir).cyan()).unwrap(),
            Self::UnknownStage(name) => write!(s, "{} {}", "Unknown command or stage".red(), name.cyan()).unwrap(),
            Self::PreconditionNotMet(stage, reason) => write!(s, "{} {}: {}",
                "Cannot start stage".red(), stage.bold(), reason).unwrap(),
            Self::StageFailed(stage, code, descr) => {
                write!(s, "{} {} ", "Stage".red(), stage.bold()).unwrap();
                match code {
                    Some(code) => write!(s, "{} (exit code {})", "failed".red(), code).unwrap(),
                    None => write!(s, "{} (terminated by signal)", "failed".red()).unwrap(),
                }
                if !descr.is_empty() {
                    write!(s, ":\n{}", descr).unwrap();
                }
            }
            Self::EmptyLocusAlignment(path) => write!(s, "{}: {}", "Empty locus alignment".red(),
                ext::fmt::path(path).cyan()).unwrap(),
            Self::InvalidData(e) => write!(s, "{}: {}", "Invalid data".red(), e).unwrap(),
        };
        s
    }
}

macro_rules! validate_param {
    ($cond:expr, $($arg:expr),+) => {{
        if !($cond) {
            (
                Err($crate::Error::Config(format!($($arg),+)))
            ?)
        }
    }};
}
pub(crate) use validate_param;

macro_rules! add_path {
    (!) => {
        |e| $crate::Error::Io(e, Vec::new())
    };
    ($path:expr) => {
        |e| $crate::Error::Io(e, vec![std::convert::AsRef::<std::path::Path>::as_ref(&$path).to_owned()])
    };
    ($($path:expr),+) => {
        |e| {
            let mut v = Vec::new();
            $(
                v.push(std::convert::AsRef::<std::path::Path>::as_ref(&$path).to_owned());
            )*
            $crate::Error::Io(e, v)
        }
    };
}
pub(crate) use add_path;

macro_rules! error {
    ($var:ident, $($arg:expr),+ $(,)?) => {
        $crate::Error::$var(format!($($arg),+))
    }
}
pub(crate) use error;

/// Wrapper around the standard result.
pub type Result<T> = std::result::Result<T, Error>;
