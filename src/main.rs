use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use mysh::process::{RawStdin, replace_stdin};
use mysh::{Interpreter, Mode, Session, ShellError, logging};
use std::path::Path;
use std::process::ExitCode;

const USAGE: &str = "Usage: mysh [script]";
const GREETING: &str = "Welcome to mysh!";
const FAREWELL: &str = "mysh: exiting";

#[derive(FromArgs)]
/// A small shell: interactive without arguments, batch with a script file.
struct Args {
    #[argh(positional)]
    /// file whose lines are run as commands instead of reading the terminal.
    script: Option<String>,
}

fn parse_args() -> Result<Args, ExitCode> {
    let argv: Vec<String> = std::env::args().collect();
    let rest: Vec<&str> = argv.iter().skip(1).map(String::as_str).collect();
    match Args::from_args(&["mysh"], &rest) {
        Ok(args) => Ok(args),
        Err(EarlyExit { output, status: Ok(()) }) => {
            print!("{output}");
            Err(ExitCode::SUCCESS)
        }
        Err(EarlyExit { status: Err(()), .. }) => {
            eprintln!("{USAGE}");
            Err(ExitCode::FAILURE)
        }
    }
}

fn run(script: Option<String>, session: Session) -> Result<()> {
    let interactive = session.mode.is_interactive();
    let mut sh = Interpreter::with_session(session, Box::new(std::io::stderr()));
    if interactive {
        println!("{GREETING}");
    }
    match script {
        Some(path) => {
            if let Err(e) = replace_stdin(Path::new(&path)) {
                bail!("{e}");
            }
            sh.run_script(RawStdin).with_context(|| format!("read {path}"))?;
        }
        None => sh.repl().context("read")?,
    }
    if interactive {
        println!("{FAREWELL}");
    }
    Ok(())
}

fn main() -> ExitCode {
    logging::init_logging();

    let args = match parse_args() {
        Ok(args) => args,
        Err(code) => return code,
    };
    let mode = if args.script.is_some() {
        Mode::Batch
    } else {
        Mode::Interactive
    };

    let session = Session::new(mode);
    if session.home.is_none() {
        eprintln!("{}", ShellError::HomeDirUnavailable);
        return ExitCode::FAILURE;
    }

    match run(args.script, session) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
