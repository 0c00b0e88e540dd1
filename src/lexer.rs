//! Lexical analysis of a command line.
//!
//! The shell grammar is deliberately flat: a line is a sequence of words separated by
//! delimiter characters, and a small set of "special" characters always form a
//! one-character token of their own. No quoting, no escaping.

use crate::error::ShellError;

/// Characters that separate words on a shell command line.
pub const WHITESPACE: &str = " \t\n\x0b\x0c\r";

/// Characters that always form a standalone token.
pub const OPERATORS: &str = "|<>";

/// Classification of a token that is one of the shell operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// The pipe operator, `|`.
    Pipe,
    /// Input redirection, `<`.
    RedirectLeft,
    /// Output redirection, `>`.
    RedirectRight,
}

impl Operator {
    /// Classify a token by string equality against the operator set.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "|" => Some(Operator::Pipe),
            "<" => Some(Operator::RedirectLeft),
            ">" => Some(Operator::RedirectRight),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Pipe => "|",
            Operator::RedirectLeft => "<",
            Operator::RedirectRight => ">",
        }
    }
}

/// Returns true when the token is `|`, `<` or `>`.
pub fn is_operator(token: &str) -> bool {
    Operator::from_token(token).is_some()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
}

struct LexingFSM<'a> {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    buffer: String,
    delimiters: &'a str,
    specials: &'a str,
}

impl<'a> LexingFSM<'a> {
    fn new(text: &str, delimiters: &'a str, specials: &'a str) -> Self {
        let stripped = text.trim_matches(|c| delimiters.contains(c));
        LexingFSM {
            input: stripped.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            buffer: String::new(),
            delimiters,
            specials,
        }
    }

    fn make_tokens(&mut self) -> Vec<String> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start => self.handle_start(ch, &mut out),
                LexingState::ReadingWord => self.handle_word(ch, &mut out),
            }
        }
        self.finalize_word(&mut out);

        out
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn handle_start(&mut self, ch: char, out: &mut Vec<String>) {
        if self.delimiters.contains(ch) {
            return;
        }
        if self.specials.contains(ch) {
            out.push(ch.to_string());
            return;
        }
        self.buffer.push(ch);
        self.state = LexingState::ReadingWord;
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<String>) {
        if self.delimiters.contains(ch) {
            self.finalize_word(out);
        } else if self.specials.contains(ch) {
            self.finalize_word(out);
            out.push(ch.to_string());
        } else {
            self.buffer.push(ch);
        }
    }

    fn finalize_word(&mut self, out: &mut Vec<String>) {
        if !self.buffer.is_empty() {
            out.push(std::mem::take(&mut self.buffer));
        }
        self.state = LexingState::Start;
    }
}

/// Split `text` into tokens.
///
/// Leading and trailing delimiters are stripped, runs of delimiters separate words, and
/// every character of `specials` becomes a token by itself even when glued to a word
/// (`file.txt>out` yields `file.txt`, `>`, `out`). An empty vector means "no tokens".
///
/// # Errors
/// [`ShellError::InvalidConfig`] when a character is both a delimiter and a special.
pub fn tokenize(text: &str, delimiters: &str, specials: &str) -> Result<Vec<String>, ShellError> {
    if let Some(c) = delimiters.chars().find(|c| specials.contains(*c)) {
        return Err(ShellError::InvalidConfig(format!(
            "{c:?} is both a delimiter and a special token"
        )));
    }
    let mut lexer = LexingFSM::new(text, delimiters, specials);
    Ok(lexer.make_tokens())
}

/// Tokenize a command line with the shell's own delimiter and operator sets.
pub fn split_into_tokens(line: &str) -> Vec<String> {
    let mut lexer = LexingFSM::new(line, WHITESPACE, OPERATORS);
    lexer.make_tokens()
}
