use crate::command::{ExitCode, Mode};
use crate::error::ShellError;
use std::env as stdenv;

/// Process-wide shell state threaded through every stage after tokenizing.
///
/// The session contains:
/// - `mode`: interactive or batch, fixed at startup.
/// - `last_status`: outcome of the most recent pipeline or builtin; selects the prompt.
/// - `home`: home directory captured once at startup, without a trailing slash.
/// - `should_exit`: set by the `exit` builtin so the input loop can terminate.
#[derive(Debug, Clone)]
pub struct Session {
    pub mode: Mode,
    pub last_status: ExitCode,
    pub home: Option<String>,
    pub should_exit: bool,
}

impl Session {
    /// Capture `HOME` from the process environment.
    ///
    /// An unset or empty `HOME` leaves `home` empty; [`Session::home_dir`] reports it.
    pub fn new(mode: Mode) -> Self {
        let home = stdenv::var("HOME").ok().and_then(|h| normalize_home(&h));
        Self::with_home(mode, home)
    }

    pub fn with_home(mode: Mode, home: Option<String>) -> Self {
        Self {
            mode,
            last_status: 0,
            home,
            should_exit: false,
        }
    }

    /// The home directory, or [`ShellError::HomeDirUnavailable`].
    pub fn home_dir(&self) -> Result<&str, ShellError> {
        self.home.as_deref().ok_or(ShellError::HomeDirUnavailable)
    }

    /// Prompt printed before each interactive read.
    pub fn prompt(&self) -> &'static str {
        if self.last_status == 0 {
            "mysh> "
        } else {
            "!mysh> "
        }
    }
}

/// Strip one trailing `/`; an empty value means "unavailable".
fn normalize_home(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    match raw.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => Some(stripped.to_string()),
        _ => Some(raw.to_string()),
    }
}
