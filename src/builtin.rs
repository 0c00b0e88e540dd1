use crate::command::{ExitCode, FAILURE};
use crate::env::Session;
use crate::parser::SubCommand;
use crate::process::open_output;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use log::debug;
use std::env;
use std::io::Write;
use std::path::PathBuf;

/// Names handled in-process, compared case-insensitively.
pub const BUILTINS: [&str; 3] = ["cd", "pwd", "exit"];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.iter().any(|b| b.eq_ignore_ascii_case(name))
}

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "pwd" or "cd".
    fn name() -> &'static str;

    /// Most arguments accepted after the name; more is a usage error.
    fn max_args() -> usize;

    /// Whether a `>` redirection replaces the standard output passed to `execute`.
    fn honors_stdout_redirection() -> bool {
        false
    }

    /// Return value follows shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode>;
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn max_args() -> usize {
        0
    }

    fn honors_stdout_redirection() -> bool {
        true
    }

    fn execute(self, stdout: &mut dyn Write, _session: &mut Session) -> Result<ExitCode> {
        let cwd = env::current_dir().context("pwd")?;
        writeln!(stdout, "{}", cwd.display()).context("pwd")?;
        stdout.flush().context("pwd")?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the home directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn max_args() -> usize {
        1
    }

    fn execute(self, _stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        let target = match self.target {
            Some(t) => PathBuf::from(t),
            None => PathBuf::from(session.home_dir().context("cd")?),
        };
        env::set_current_dir(&target).with_context(|| format!("cd: {}", target.display()))?;
        debug!("cwd is now {}", target.display());
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Exit {}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn max_args() -> usize {
        0
    }

    fn execute(self, _stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode> {
        session.should_exit = true;
        Ok(0)
    }
}

/// Run `cmd` in-process if it names a builtin, recording its status in the session.
///
/// Returns `None` for anything else so the caller can fall through to path resolution
/// and forking. `<` redirections are never applied to builtins.
pub fn try_run_builtin(
    cmd: &SubCommand,
    session: &mut Session,
    stderr: &mut dyn Write,
) -> Option<ExitCode> {
    let code = match cmd.program.to_ascii_lowercase().as_str() {
        "pwd" => run::<Pwd>(cmd, session, stderr),
        "cd" => run::<Cd>(cmd, session, stderr),
        "exit" => run::<Exit>(cmd, session, stderr),
        _ => return None,
    };
    session.last_status = code;
    Some(code)
}

fn run<T: BuiltinCommand>(cmd: &SubCommand, session: &mut Session, stderr: &mut dyn Write) -> ExitCode {
    let name = T::name();
    if cmd.extra_args().len() > T::max_args() {
        let _ = writeln!(stderr, "{name}: too many arguments");
        return FAILURE;
    }

    // Everything after the name is positional, even `help` or a leading dash.
    let args: Vec<&str> = std::iter::once("--")
        .chain(cmd.extra_args().iter().map(String::as_str))
        .collect();
    let builtin = match T::from_args(&[name], &args) {
        Ok(builtin) => builtin,
        Err(EarlyExit { output, status }) => {
            return match status {
                Ok(()) => {
                    print!("{output}");
                    0
                }
                Err(()) => {
                    let _ = write!(stderr, "{name}: {output}");
                    FAILURE
                }
            };
        }
    };

    let result = match cmd.stdout_file.as_deref() {
        Some(path) if T::honors_stdout_redirection() => match open_output(path) {
            Ok(mut file) => builtin.execute(&mut file, session),
            Err(e) => {
                let _ = writeln!(stderr, "{e}");
                return FAILURE;
            }
        },
        _ => builtin.execute(&mut std::io::stdout(), session),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            let _ = writeln!(stderr, "{e:#}");
            FAILURE
        }
    }
}
