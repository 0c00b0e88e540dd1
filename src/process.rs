//! Forking, wiring and reaping the programs of one pipeline.
//!
//! Every descriptor the parent opens is held by an owning value (`File` for
//! redirections, `OwnedFd` for pipe ends) and is close-on-exec, so a child only keeps
//! what it `dup2`s onto its standard streams and the parent releases everything on
//! every return path.

use crate::builtin::{is_builtin, try_run_builtin};
use crate::command::{ExitCode, FAILURE};
use crate::env::Session;
use crate::error::ShellError;
use crate::external::find_command_path;
use crate::parser::{Pipeline, SubCommand};
use log::{debug, warn};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::libc::{STDIN_FILENO, STDOUT_FILENO};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, dup2, execv, fork, pipe2};
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Permission bits for files created by `>`: `rw-r-----`.
pub const OUTPUT_MODE: u32 = 0o640;

/// Open a `<` target read-only.
pub(crate) fn open_input(path: &str) -> Result<File, ShellError> {
    File::open(path).map_err(|e| ShellError::io(format!("open {path}"), e))
}

/// Open a `>` target, creating it if missing and truncating it otherwise.
pub(crate) fn open_output(path: &str) -> Result<File, ShellError> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(OUTPUT_MODE)
        .open(path)
        .map_err(|e| ShellError::io(format!("open {path}"), e))
}

/// Redirection files of one sub-command, owned by the parent. Dropping closes them.
#[derive(Debug, Default)]
struct Redirections {
    stdin: Option<File>,
    stdout: Option<File>,
}

impl Redirections {
    fn open(cmd: &SubCommand) -> Result<Self, ShellError> {
        let stdin = cmd.stdin_file.as_deref().map(open_input).transpose()?;
        let stdout = cmd.stdout_file.as_deref().map(open_output).transpose()?;
        Ok(Self { stdin, stdout })
    }

    fn stdin_fd(&self) -> Option<BorrowedFd<'_>> {
        self.stdin.as_ref().map(AsFd::as_fd)
    }

    fn stdout_fd(&self) -> Option<BorrowedFd<'_>> {
        self.stdout.as_ref().map(AsFd::as_fd)
    }
}

/// Executable path and argument vector in the form `execv` expects.
#[derive(Debug)]
struct Program {
    path: CString,
    argv: Vec<CString>,
}

impl Program {
    fn new(cmd: &SubCommand) -> Result<Self, ShellError> {
        let path = cmd
            .path
            .clone()
            .or_else(|| find_command_path(&cmd.program))
            .ok_or_else(|| ShellError::CommandNotFound(vec![cmd.program.clone()]))?;
        let path = CString::new(path.into_os_string().into_encoded_bytes())
            .map_err(|e| ShellError::io("execv", e.into()))?;
        // argv[0] is the resolved path, the rest as typed.
        let mut argv = vec![path.clone()];
        for arg in cmd.extra_args() {
            argv.push(CString::new(arg.as_str()).map_err(|e| ShellError::io("execv", e.into()))?);
        }
        Ok(Self { path, argv })
    }
}

/// Both ends of a pipe, close-on-exec from the moment they exist.
fn open_pipe() -> Result<(OwnedFd, OwnedFd), ShellError> {
    pipe2(OFlag::O_CLOEXEC).map_err(|e| ShellError::os("pipe", e))
}

/// Make the file at `path` the shell's standard input, replacing whatever was there.
///
/// Children forked afterwards share the same open file, so a program that reads
/// stdin consumes the lines the shell has not read yet.
pub fn replace_stdin(path: &Path) -> Result<(), ShellError> {
    let file = File::open(path).map_err(|e| ShellError::io(format!("open {}", path.display()), e))?;
    dup2(file.as_raw_fd(), STDIN_FILENO).map_err(|e| ShellError::os("dup2", e))?;
    Ok(())
}

/// Standard input read straight from descriptor 0, one `read(2)` per call.
///
/// Unlike [`std::io::Stdin`] it never buffers ahead, so whatever the shell has not
/// consumed is still there for the next child.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawStdin;

impl Read for RawStdin {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        nix::unistd::read(STDIN_FILENO, buf).map_err(std::io::Error::from)
    }
}

/// Fork a child that runs `program` with the given descriptors as stdin and stdout.
///
/// `None` leaves the inherited stream in place.
fn spawn(
    program: &Program,
    stdin: Option<BorrowedFd<'_>>,
    stdout: Option<BorrowedFd<'_>>,
) -> Result<Pid, ShellError> {
    // Buffered output would otherwise be duplicated into the child.
    let _ = std::io::stdout().flush();

    // SAFETY: the child only calls dup2, execv and _exit on data prepared before the fork.
    match unsafe { fork() }.map_err(|e| ShellError::os("fork", e))? {
        ForkResult::Parent { child } => {
            debug!("forked {} for {:?}", child, program.path);
            Ok(child)
        }
        ForkResult::Child => exec_child(program, stdin, stdout),
    }
}

fn exec_child(program: &Program, stdin: Option<BorrowedFd<'_>>, stdout: Option<BorrowedFd<'_>>) -> ! {
    if let Some(fd) = stdin {
        if let Err(e) = dup2(fd.as_raw_fd(), STDIN_FILENO) {
            child_fail("dup2", e);
        }
    }
    if let Some(fd) = stdout {
        if let Err(e) = dup2(fd.as_raw_fd(), STDOUT_FILENO) {
            child_fail("dup2", e);
        }
    }
    match execv(&program.path, &program.argv) {
        Ok(never) => match never {},
        Err(e) => child_fail("execv", e),
    }
}

/// Report a failure inside a forked child and terminate it without unwinding.
fn child_fail(context: &str, err: Errno) -> ! {
    let _ = writeln!(std::io::stderr(), "{context}: {}", err.desc());
    // SAFETY: _exit skips atexit handlers and destructors that belong to the parent.
    unsafe { nix::libc::_exit(FAILURE) }
}

/// Reap every child of the pipeline in whatever order they finish.
///
/// The result is the exit code of `last`; any child killed by a signal makes the
/// whole pipeline fail once all children are collected.
fn wait_all(children: &[Pid], last: Pid) -> Result<ExitCode, ShellError> {
    let mut pending = children.to_vec();
    let mut status = 0;
    let mut abnormal = false;
    while !pending.is_empty() {
        let reaped = match waitpid(None::<Pid>, None) {
            Ok(reaped) => reaped,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(ShellError::os("wait", e)),
        };
        let Some(pid) = reaped.pid().filter(|pid| pending.contains(pid)) else {
            warn!("reaped a child outside the pipeline: {reaped:?}");
            continue;
        };
        match reaped {
            WaitStatus::Exited(_, code) => {
                debug!("{pid} exited with {code}");
                if pid == last {
                    status = code;
                }
            }
            WaitStatus::Signaled(_, signal, core_dumped) => {
                debug!("{pid} killed by {signal:?} (core dumped: {core_dumped})");
                abnormal = true;
            }
            other => {
                debug!("{pid} reported {other:?}, still waiting");
                continue;
            }
        }
        pending.retain(|&p| p != pid);
    }
    if abnormal {
        Err(ShellError::AbnormalExit)
    } else {
        Ok(status)
    }
}

/// Run one program with its redirections and wait for it.
fn execute_single(cmd: &SubCommand) -> Result<ExitCode, ShellError> {
    let program = Program::new(cmd)?;
    let redirections = Redirections::open(cmd)?;
    let pid = spawn(&program, redirections.stdin_fd(), redirections.stdout_fd())?;
    wait_all(&[pid], pid)
}

/// Run two programs connected by a pipe and wait for both.
///
/// A side's own redirection wins over its pipe end; the unused end is still closed in
/// both children (close-on-exec) and in the parent once both are forked.
fn execute_piped(first: &SubCommand, second: &SubCommand) -> Result<ExitCode, ShellError> {
    let first_program = Program::new(first)?;
    let second_program = Program::new(second)?;
    let first_redirections = Redirections::open(first)?;
    let second_redirections = Redirections::open(second)?;
    let (read_end, write_end) = open_pipe()?;

    let first_out = first_redirections.stdout_fd().unwrap_or(write_end.as_fd());
    let first_pid = spawn(&first_program, first_redirections.stdin_fd(), Some(first_out))?;

    let second_in = second_redirections.stdin_fd().unwrap_or(read_end.as_fd());
    let spawned = spawn(&second_program, Some(second_in), second_redirections.stdout_fd());
    drop(read_end);
    drop(write_end);

    match spawned {
        Ok(second_pid) => wait_all(&[first_pid, second_pid], second_pid),
        Err(e) => {
            if let Err(reap) = wait_all(&[first_pid], first_pid) {
                warn!("reaping {first_pid} after failed fork: {reap}");
            }
            Err(e)
        }
    }
}

fn record(result: Result<ExitCode, ShellError>, session: &mut Session, stderr: &mut dyn Write) {
    session.last_status = match result {
        Ok(code) => code,
        Err(e) => {
            let _ = writeln!(stderr, "{e}");
            FAILURE
        }
    };
}

/// Builtin dispatch, then fork/exec of a lone sub-command.
pub fn run_single(cmd: &SubCommand, session: &mut Session, stderr: &mut dyn Write) {
    if try_run_builtin(cmd, session, stderr).is_some() {
        return;
    }
    record(execute_single(cmd), session, stderr);
}

/// Run a two-sided pipeline.
///
/// Builtins never take part in the pipe: when either side is a builtin it runs
/// in-process, disconnected, and the other side runs alone through [`run_single`].
pub fn run_piped(first: &SubCommand, second: &SubCommand, session: &mut Session, stderr: &mut dyn Write) {
    let first_builtin = is_builtin(&first.program);
    let second_builtin = is_builtin(&second.program);

    if !first_builtin && !second_builtin {
        record(execute_piped(first, second), session, stderr);
        return;
    }

    for cmd in [first, second] {
        if is_builtin(&cmd.program) {
            try_run_builtin(cmd, session, stderr);
            if session.should_exit {
                return;
            }
        }
    }
    if !first_builtin {
        run_single(first, session, stderr);
    } else if !second_builtin {
        run_single(second, session, stderr);
    }
}

/// Execute a checked and resolved pipeline, updating `session.last_status`.
pub fn run_pipeline(pipeline: &Pipeline, session: &mut Session, stderr: &mut dyn Write) {
    match pipeline {
        Pipeline::Single(cmd) => run_single(cmd, session, stderr),
        Pipeline::Piped(first, second) => run_piped(first, second, session, stderr),
    }
}

/// Serializes tests that fork, since [`wait_all`] reaps any child of the process.
#[cfg(test)]
pub(crate) fn lock_children() -> std::sync::MutexGuard<'static, ()> {
    static CHILDREN: std::sync::Mutex<()> = std::sync::Mutex::new(());
    CHILDREN.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Mode;
    use crate::external::resolve_pipeline;
    use crate::lexer::split_into_tokens;
    use crate::parser::construct_pipeline;
    use nix::fcntl::{FcntlArg, FdFlag, fcntl};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn session() -> Session {
        Session::with_home(Mode::Batch, Some("/".into()))
    }

    fn pipeline(line: &str) -> Pipeline {
        let mut pipeline = construct_pipeline(&split_into_tokens(line)).unwrap();
        resolve_pipeline(&mut pipeline).unwrap();
        pipeline
    }

    fn run(line: &str) -> (Session, String) {
        let _children = lock_children();
        let mut s = session();
        let mut err = Vec::new();
        run_pipeline(&pipeline(line), &mut s, &mut err);
        (s, String::from_utf8(err).unwrap())
    }

    fn path_str(p: &Path) -> String {
        p.display().to_string()
    }

    /// A shell script in `dir`, since command lines cannot quote spaces.
    fn script(dir: &Path, body: &str) -> String {
        let path = dir.join("script.sh");
        fs::write(&path, body).unwrap();
        path_str(&path)
    }

    #[test]
    fn argv_starts_with_the_resolved_path() {
        let pipeline = pipeline("ls -l /tmp");
        let cmd = pipeline.commands()[0];
        let program = Program::new(cmd).unwrap();
        let resolved = cmd.path.clone().unwrap();
        assert_eq!(program.argv[0].to_str().unwrap(), resolved.to_str().unwrap());
        assert_eq!(program.argv[1].to_str().unwrap(), "-l");
        assert_eq!(program.argv[2].to_str().unwrap(), "/tmp");
        assert_eq!(program.argv.len(), 3);
    }

    #[test]
    fn pipe_ends_are_close_on_exec() {
        let (read_end, write_end) = open_pipe().unwrap();
        for fd in [&read_end, &write_end] {
            let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFD).unwrap();
            assert!(FdFlag::from_bits_truncate(flags).contains(FdFlag::FD_CLOEXEC));
        }
    }

    #[test]
    fn both_children_are_reaped_whichever_finishes_first() {
        let dir = tempfile::tempdir().unwrap();
        let slow = script(dir.path(), "sleep 1\nexit 3\n");
        let (s, err) = run(&format!("true | sh {slow}"));
        assert_eq!(s.last_status, 3, "{err}");

        let out = dir.path().join("out.txt");
        let (s, err) = run(&format!("sh {slow} | cat > {}", path_str(&out)));
        assert_eq!(s.last_status, 0, "{err}");
        assert_eq!(fs::read_to_string(&out).unwrap(), "");
    }

    #[test]
    fn exit_code_of_single_program_is_recorded() {
        assert_eq!(run("true").0.last_status, 0);
        assert_eq!(run("false").0.last_status, 1);
        let dir = tempfile::tempdir().unwrap();
        let (s, err) = run(&format!("sh {}", script(dir.path(), "exit 7\n")));
        assert_eq!(s.last_status, 7);
        assert!(err.is_empty());
    }

    #[test]
    fn output_redirection_creates_truncates_with_mode_0640() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        fs::write(&out, "previous content that is much longer than the new one\n").unwrap();
        fs::remove_file(&out).unwrap();

        let line = format!("echo hello > {}", path_str(&out));
        assert_eq!(run(&line).0.last_status, 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "hello\n");
        assert_eq!(fs::metadata(&out).unwrap().permissions().mode() & 0o777, OUTPUT_MODE);

        let line = format!("echo second > {}", path_str(&out));
        assert_eq!(run(&line).0.last_status, 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "second\n");
    }

    #[test]
    fn input_redirection_feeds_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let out = dir.path().join("out.txt");
        fs::write(&input, "one\ntwo\nthree\n").unwrap();

        let line = format!("wc -l < {} > {}", path_str(&input), path_str(&out));
        assert_eq!(run(&line).0.last_status, 0);
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "3");
    }

    #[test]
    fn missing_input_file_is_reported_without_forking() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("never.txt");
        let line = format!("cat < {}/missing > {}", path_str(dir.path()), path_str(&out));
        let (s, err) = run(&line);
        assert_eq!(s.last_status, 1);
        assert!(err.starts_with("open "), "{err}");
        assert_eq!(err.lines().count(), 1);
        assert!(!out.exists());
    }

    #[test]
    fn pipe_connects_stdout_to_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("count.txt");
        let line = format!("echo hi | wc -l > {}", path_str(&out));
        let (s, err) = run(&line);
        assert_eq!(s.last_status, 0, "{err}");
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "1");
    }

    #[test]
    fn pipeline_status_comes_from_the_right_hand_side() {
        assert_eq!(run("false | true").0.last_status, 0);
        assert_eq!(run("true | false").0.last_status, 1);
    }

    #[test]
    fn own_redirections_override_pipe_ends_without_hanging() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let left = dir.path().join("left.txt");
        let right = dir.path().join("right.txt");
        fs::write(&input, "a\nb\n").unwrap();

        let line = format!(
            "echo piped > {} | cat < {} > {}",
            path_str(&left),
            path_str(&input),
            path_str(&right)
        );
        assert_eq!(run(&line).0.last_status, 0);
        assert_eq!(fs::read_to_string(&left).unwrap(), "piped\n");
        assert_eq!(fs::read_to_string(&right).unwrap(), "a\nb\n");
    }

    #[test]
    fn reader_sees_eof_once_writer_exits() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let line = format!("true | cat > {}", path_str(&out));
        assert_eq!(run(&line).0.last_status, 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "");
    }

    #[test]
    fn exec_failure_only_ends_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus");
        fs::write(&bogus, [0u8, 1, 2, 3]).unwrap();
        fs::set_permissions(&bogus, fs::Permissions::from_mode(0o755)).unwrap();

        let (s, err) = run(&path_str(&bogus));
        assert_eq!(s.last_status, FAILURE);
        assert!(err.is_empty(), "{err}");
        assert_eq!(run("true").0.last_status, 0);
    }

    #[test]
    fn signaled_child_forces_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (s, err) = run(&format!("sh {} | true", script(dir.path(), "kill -9 $$\n")));
        assert_eq!(s.last_status, 1);
        assert_eq!(err, "child process did not exit normally\n");
    }

    #[test]
    fn builtin_side_runs_disconnected_from_the_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let pwd_out = dir.path().join("pwd.txt");
        let cat_out = dir.path().join("cat.txt");
        let line = format!("pwd > {} | cat /dev/null > {}", path_str(&pwd_out), path_str(&cat_out));
        let (s, err) = run(&line);
        assert_eq!(s.last_status, 0, "{err}");
        assert!(fs::read_to_string(&pwd_out).unwrap().ends_with('\n'));
        assert_eq!(fs::read_to_string(&cat_out).unwrap(), "");
    }

    #[test]
    fn exit_in_pipe_stops_before_the_other_side() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("never.txt");
        let line = format!("exit | echo nope > {}", path_str(&out));
        let (s, _) = run(&line);
        assert!(s.should_exit);
        assert!(!out.exists());
    }

    #[test]
    fn failed_output_open_releases_input_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        fs::write(&input, "x").unwrap();
        let line = format!("cat < {} > {}/no/such/dir/out", path_str(&input), path_str(dir.path()));
        let (s, err) = run(&line);
        assert_eq!(s.last_status, 1);
        assert!(err.contains("no/such/dir/out"), "{err}");
    }
}
