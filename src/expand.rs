//! Token rewriting passes run between lexing and syntax checking.

use crate::env::Session;
use crate::error::ShellError;
use log::trace;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Replace the leading `~` of every token starting with `~/` by the home directory.
///
/// A `~` anywhere else (`a~/b`, `x~`) or a bare `~` is left alone.
pub fn expand_home(tokens: Vec<String>, session: &Session) -> Result<Vec<String>, ShellError> {
    tokens
        .into_iter()
        .map(|token| -> Result<String, ShellError> {
            if token.starts_with("~/") {
                Ok(format!("{}{}", session.home_dir()?, &token[1..]))
            } else {
                Ok(token)
            }
        })
        .collect()
}

/// A token is a wildcard pattern when it contains `*` and does not name a directory.
pub fn is_pattern(token: &str) -> bool {
    token.contains('*') && !token.ends_with('/')
}

/// Replace every wildcard token by the regular files it matches, one token per file.
///
/// A pattern with no match stays in place unchanged. Matches come in directory
/// enumeration order.
pub fn expand_wildcards(tokens: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    for token in tokens {
        if !is_pattern(&token) {
            out.push(token);
            continue;
        }
        let matches = glob_paths(&token);
        trace!("wildcard {token:?} matched {matches:?}");
        if matches.is_empty() {
            out.push(token);
        } else {
            out.extend(matches);
        }
    }
    out
}

/// Every regular, non-hidden file matching `pattern`.
///
/// The pattern is matched one `/`-separated segment at a time. Segments without `*` are
/// taken literally; wildcard segments are compared against directory entries, skipping
/// names that start with `.`. Intermediate segments must be directories and the final
/// one a regular file. Returned paths keep the directory prefix as written.
pub fn glob_paths(pattern: &str) -> Vec<String> {
    let (prefix, rest) = match pattern.strip_prefix('/') {
        Some(rest) => ("/".to_string(), rest),
        None => (String::new(), pattern),
    };
    let segments: Vec<&str> = rest.split('/').collect();
    let mut out = Vec::new();
    walk(&prefix, &segments, &mut out);
    out
}

fn walk(prefix: &str, segments: &[&str], out: &mut Vec<String>) {
    let Some((segment, remaining)) = segments.split_first() else {
        return;
    };
    let is_last = remaining.is_empty();

    if !segment.contains('*') {
        let candidate = format!("{prefix}{segment}");
        if is_last {
            if is_regular_file(Path::new(&candidate)) {
                out.push(candidate);
            }
        } else if segment.is_empty() || Path::new(&candidate).is_dir() {
            walk(&format!("{candidate}/"), remaining, out);
        }
        return;
    }

    let Some(matcher) = SegmentMatcher::new(segment) else {
        return;
    };
    let dir = if prefix.is_empty() { "." } else { prefix };
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with('.') || !matcher.matches(name) {
            continue;
        }
        let candidate = format!("{prefix}{name}");
        if is_last {
            if is_regular_file(Path::new(&candidate)) {
                out.push(candidate);
            }
        } else if Path::new(&candidate).is_dir() {
            walk(&format!("{candidate}/"), remaining, out);
        }
    }
}

/// Whole-name matcher for one path segment; each `*` matches any run of characters.
struct SegmentMatcher(Regex);

impl SegmentMatcher {
    fn new(segment: &str) -> Option<Self> {
        let body = segment
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        Regex::new(&format!("^{body}$")).ok().map(SegmentMatcher)
    }

    fn matches(&self, name: &str) -> bool {
        self.0.is_match(name)
    }
}

/// Follows symlinks, like `stat(2)`.
pub(crate) fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}
