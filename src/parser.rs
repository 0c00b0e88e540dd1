use crate::error::SyntaxError;
use crate::lexer::{Operator, is_operator};
use std::path::PathBuf;

/// One program invocation: the tokens between pipe boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubCommand {
    /// First token of the sub-command, as typed.
    pub program: String,
    /// Program name followed by every token that is not a redirection or its target.
    pub args: Vec<String>,
    pub stdin_file: Option<String>,
    pub stdout_file: Option<String>,
    /// Absolute executable path, filled in by the resolver. Stays `None` for builtins.
    pub path: Option<PathBuf>,
}

/// One input line: a single sub-command or two joined by a pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pipeline {
    Single(SubCommand),
    Piped(SubCommand, SubCommand),
}

impl Pipeline {
    pub fn commands(&self) -> Vec<&SubCommand> {
        match self {
            Pipeline::Single(cmd) => vec![cmd],
            Pipeline::Piped(first, second) => vec![first, second],
        }
    }

    pub fn commands_mut(&mut self) -> Vec<&mut SubCommand> {
        match self {
            Pipeline::Single(cmd) => vec![cmd],
            Pipeline::Piped(first, second) => vec![first, second],
        }
    }
}

/// Validate operator placement across the whole line.
///
/// - The first token must not be an operator.
/// - Every operator must be followed by a non-operator token.
/// - At most one pipe.
pub fn check_pipeline_syntax(tokens: &[String]) -> Result<(), SyntaxError> {
    let Some(first) = tokens.first() else {
        return Ok(());
    };
    if is_operator(first) {
        return Err(SyntaxError::InvalidSyntax);
    }

    let mut pipes = 0;
    for (i, token) in tokens.iter().enumerate() {
        let Some(op) = Operator::from_token(token) else {
            continue;
        };
        match tokens.get(i + 1) {
            Some(next) if !is_operator(next) => {}
            _ => return Err(SyntaxError::InvalidSyntax),
        }
        if op == Operator::Pipe {
            pipes += 1;
            if pipes > 1 {
                return Err(SyntaxError::InvalidSyntax);
            }
        }
    }
    Ok(())
}

/// Validate the redirections of one side of the pipe.
///
/// At most one `<` and one `>`, each followed by a file name.
pub fn check_subcommand_syntax(tokens: &[String]) -> Result<(), SyntaxError> {
    let mut builder = SubCommandBuilder::new(tokens);
    builder.scan().map(|_| ())
}

impl SubCommand {
    /// Check and decompose the tokens of one sub-command.
    pub fn parse(tokens: &[String]) -> Result<Self, SyntaxError> {
        let mut builder = SubCommandBuilder::new(tokens);
        builder.scan()
    }

    /// Arguments after the program name.
    pub fn extra_args(&self) -> &[String] {
        self.args.get(1..).unwrap_or_default()
    }
}

struct SubCommandBuilder<'a> {
    tokens: &'a [String],
    pos: usize,
}

impl<'a> SubCommandBuilder<'a> {
    fn new(tokens: &'a [String]) -> Self {
        SubCommandBuilder { tokens, pos: 0 }
    }

    fn consume(&mut self) -> Option<&'a String> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// The redirection target; `missing` when absent or another operator.
    fn target(&mut self, missing: SyntaxError) -> Result<String, SyntaxError> {
        match self.tokens.get(self.pos) {
            Some(token) if !is_operator(token) => {
                self.pos += 1;
                Ok(token.clone())
            }
            _ => Err(missing),
        }
    }

    fn scan(&mut self) -> Result<SubCommand, SyntaxError> {
        let mut args = Vec::new();
        let mut stdin_file = None;
        let mut stdout_file = None;

        while let Some(token) = self.consume() {
            match Operator::from_token(token) {
                Some(Operator::RedirectLeft) => {
                    if stdin_file.is_some() {
                        return Err(SyntaxError::MultipleStdin);
                    }
                    stdin_file = Some(self.target(SyntaxError::MissingStdinPath)?);
                }
                Some(Operator::RedirectRight) => {
                    if stdout_file.is_some() {
                        return Err(SyntaxError::MultipleStdout);
                    }
                    stdout_file = Some(self.target(SyntaxError::MissingStdoutPath)?);
                }
                Some(Operator::Pipe) => return Err(SyntaxError::InvalidSyntax),
                None => args.push(token.clone()),
            }
        }

        let program = args.first().cloned().ok_or(SyntaxError::InvalidSyntax)?;
        Ok(SubCommand {
            program,
            args,
            stdin_file,
            stdout_file,
            path: None,
        })
    }
}

/// Split a checked token sequence at its pipe and decompose each side.
///
/// Runs [`check_pipeline_syntax`] first, so either side failing aborts the whole line.
pub fn construct_pipeline(tokens: &[String]) -> Result<Pipeline, SyntaxError> {
    check_pipeline_syntax(tokens)?;
    if tokens.is_empty() {
        return Err(SyntaxError::InvalidSyntax);
    }

    match tokens.iter().position(|t| t == Operator::Pipe.as_str()) {
        None => Ok(Pipeline::Single(SubCommand::parse(tokens)?)),
        Some(at) => {
            let first = SubCommand::parse(&tokens[..at])?;
            let second = SubCommand::parse(&tokens[at + 1..])?;
            Ok(Pipeline::Piped(first, second))
        }
    }
}
