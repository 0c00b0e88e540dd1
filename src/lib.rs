//! A small teaching shell.
//!
//! This crate reads command lines, splits them into tokens, expands `~/` and `*`
//! patterns, checks the placement of `|`, `<` and `>`, resolves program names against
//! a fixed list of system directories and runs one program, or two joined by a single
//! pipe, with optional file redirection. `cd`, `pwd` and `exit` run in-process.
//!
//! The main entry point is [`Interpreter`]. The stages are public so they can be
//! exercised on their own: [`lexer`], [`expand`], [`parser`], [`external`] and
//! [`process`].

mod builtin;
pub mod command;
pub mod env;
pub mod error;
pub mod expand;
pub mod external;
mod interpreter;
pub mod lexer;
pub mod logging;
pub mod parser;
pub mod process;

pub use builtin::{BUILTINS, is_builtin};
pub use command::{ExitCode, Mode};
pub use env::Session;
pub use error::{ShellError, SyntaxError};
/// Just a convenient re-export of the command-line interpreter.
///
/// See [`Interpreter`] for the high-level API.
pub use interpreter::Interpreter;
