/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Status recorded after a syntax, resolution, resource or usage error.
pub const FAILURE: ExitCode = 1;

/// How the shell receives its input. Fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Reading from a terminal, with banners and prompts.
    Interactive,
    /// Reading commands from a script file, silently.
    Batch,
}

impl Mode {
    pub fn is_interactive(self) -> bool {
        self == Mode::Interactive
    }
}
