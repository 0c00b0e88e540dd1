use thiserror::Error;

/// Malformed placement of `|`, `<` or `>`.
///
/// The `Display` output of each variant is the one-line diagnostic written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyntaxError {
    /// Operator first, operator followed by an operator or by nothing, or more than one pipe.
    #[error("command has invalid syntax")]
    InvalidSyntax,
    #[error("command can not have multiple stdin redirections")]
    MultipleStdin,
    #[error("command can not have multiple stdout redirections")]
    MultipleStdout,
    #[error("command is missing stdin redirection file path")]
    MissingStdinPath,
    #[error("command is missing stdout redirection file path")]
    MissingStdoutPath,
}

/// Everything that can go wrong while turning a line into running processes.
#[derive(Debug, Error)]
pub enum ShellError {
    /// Tokenizer delimiter and special sets overlap.
    #[error("invalid tokenizer configuration: {0}")]
    InvalidConfig(String),

    #[error("HOME is not set")]
    HomeDirUnavailable,

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// One entry per program name that could not be resolved.
    #[error("{}", .0.iter().map(|name| format!("command not found: {name}")).collect::<Vec<_>>().join("\n"))]
    CommandNotFound(Vec<String>),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Os {
        context: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("child process did not exit normally")]
    AbnormalExit,
}

impl ShellError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ShellError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn os(context: &'static str, source: nix::Error) -> Self {
        ShellError::Os { context, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_not_found_lists_every_name() {
        let err = ShellError::CommandNotFound(vec!["foo".into(), "bar".into()]);
        assert_eq!(err.to_string(), "command not found: foo\ncommand not found: bar");
    }

    #[test]
    fn syntax_errors_are_transparent() {
        let err: ShellError = SyntaxError::MultipleStdout.into();
        assert_eq!(err.to_string(), "command can not have multiple stdout redirections");
    }
}
