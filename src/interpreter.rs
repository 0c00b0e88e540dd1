use crate::command::{ExitCode, FAILURE, Mode};
use crate::env::Session;
use crate::error::ShellError;
use crate::expand::{expand_home, expand_wildcards};
use crate::external::resolve_pipeline;
use crate::lexer::split_into_tokens;
use crate::parser::{Pipeline, construct_pipeline};
use crate::process::run_pipeline;
use log::{debug, trace};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{ErrorKind, Read, Write};

/// A minimal shell that turns command lines into running programs.
///
/// The interpreter owns the [`Session`] and the sink that receives diagnostics
/// (standard error by default). Each line goes through tokenizing, home and wildcard
/// expansion, syntax checking, path resolution and execution; every outcome ends up
/// in [`Session::last_status`].
///
/// Example
/// ```no_run
/// use mysh::{Interpreter, Mode};
/// let mut sh = Interpreter::new(Mode::Batch);
/// sh.execute_line("echo hello | wc -c");
/// assert_eq!(sh.last_status(), 0);
/// ```
pub struct Interpreter {
    session: Session,
    stderr: Box<dyn Write>,
}

impl Interpreter {
    /// An interpreter reading `HOME` from the environment and reporting to stderr.
    pub fn new(mode: Mode) -> Self {
        Self::with_session(Session::new(mode), Box::new(std::io::stderr()))
    }

    pub fn with_session(session: Session, stderr: Box<dyn Write>) -> Self {
        Self { session, stderr }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn last_status(&self) -> ExitCode {
        self.session.last_status
    }

    pub fn should_exit(&self) -> bool {
        self.session.should_exit
    }

    /// Run one command line to completion.
    ///
    /// A blank line resets the status to 0. Any failure before execution is reported
    /// with one diagnostic line per problem and sets the status to 1.
    pub fn execute_line(&mut self, line: &str) {
        let tokens = split_into_tokens(line);
        if tokens.is_empty() {
            self.session.last_status = 0;
            return;
        }
        trace!("tokens {tokens:?}");

        match self.prepare(tokens) {
            Ok(pipeline) => run_pipeline(&pipeline, &mut self.session, self.stderr.as_mut()),
            Err(e) => {
                let _ = writeln!(self.stderr, "{e}");
                self.session.last_status = FAILURE;
            }
        }
        debug!("status {}", self.session.last_status);
    }

    fn prepare(&self, tokens: Vec<String>) -> Result<Pipeline, ShellError> {
        let tokens = expand_home(tokens, &self.session)?;
        let tokens = expand_wildcards(tokens);
        trace!("expanded {tokens:?}");
        let mut pipeline = construct_pipeline(&tokens)?;
        resolve_pipeline(&mut pipeline)?;
        Ok(pipeline)
    }

    /// Interactive Read-Eval-Print Loop.
    ///
    /// Ends on end-of-input or after `exit`. `Ctrl-C` abandons the current line.
    pub fn repl(&mut self) -> rustyline::Result<()> {
        let mut rl = DefaultEditor::new()?;

        loop {
            match rl.readline(self.session.prompt()) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    self.execute_line(&line);
                    if self.session.should_exit {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    self.session.last_status = FAILURE;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    /// Run every line of `reader`, without prompts, until end-of-input or `exit`.
    ///
    /// Lines are read a byte at a time so programs sharing the same input start right
    /// after the line that launched them. A last line without a trailing newline still
    /// runs.
    pub fn run_script<R: Read>(&mut self, mut reader: R) -> std::io::Result<()> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if read_line(&mut reader, &mut buf)? == 0 {
                return Ok(());
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            self.execute_line(line);
            if self.session.should_exit {
                return Ok(());
            }
        }
    }
}

/// Append bytes up to and including the next `\n`; returns how many were read.
fn read_line<R: Read>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<usize> {
    let start = buf.len();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                buf.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(buf.len() - start)
}

impl Default for Interpreter {
    /// An interactive interpreter.
    fn default() -> Self {
        Self::new(Mode::Interactive)
    }
}
