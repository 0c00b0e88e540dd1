use crate::builtin::is_builtin;
use crate::error::ShellError;
use crate::expand::is_regular_file;
use crate::parser::Pipeline;
use log::debug;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Directories searched, in order, for a bare program name.
pub const SEARCH_DIRS: [&str; 6] = [
    "/usr/local/sbin/",
    "/usr/local/bin/",
    "/usr/sbin/",
    "/usr/bin/",
    "/sbin/",
    "/bin/",
];

/// Resolve a program name the way this shell does.
///
/// Behavior:
/// - A name containing `/` is an explicit path: returned if it is an executable regular file.
/// - Otherwise each directory of [`SEARCH_DIRS`] is tried in order and the first
///   executable regular file wins.
/// - Empty names and anything not found: `None`.
pub fn find_command_path(name: &str) -> Option<PathBuf> {
    find_command_path_in(&SEARCH_DIRS, name)
}

/// [`find_command_path`] with a caller-supplied search list.
pub fn find_command_path_in(dirs: &[&str], name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    if name.contains('/') {
        return find_by_path(Path::new(name)).map(Path::to_path_buf);
    }
    dirs.iter()
        .map(|dir| PathBuf::from(format!("{dir}{name}")))
        .find(|candidate| is_executable_file(candidate))
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if is_executable_file(path) { Some(path) } else { None }
}

/// A regular file with at least one of the owner, group or other execute bits.
pub fn is_executable_file(path: &Path) -> bool {
    if !is_regular_file(path) {
        return false;
    }
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Fill in the executable path of every non-builtin sub-command.
///
/// Resolution keeps going after a failure so that every unknown name is reported.
pub fn resolve_pipeline(pipeline: &mut Pipeline) -> Result<(), ShellError> {
    let mut missing = Vec::new();
    for cmd in pipeline.commands_mut() {
        if is_builtin(&cmd.program) {
            continue;
        }
        match find_command_path(&cmd.program) {
            Some(path) => {
                debug!("resolved {} -> {}", cmd.program, path.display());
                cmd.path = Some(path);
            }
            None => missing.push(cmd.program.clone()),
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ShellError::CommandNotFound(missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::split_into_tokens;
    use crate::parser::construct_pipeline;
    use std::fs::File;

    fn make_file(dir: &Path, name: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    fn dir_str(dir: &Path) -> String {
        format!("{}/", dir.display())
    }

    #[test]
    fn bare_name_found_in_first_matching_dir() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        make_file(second.path(), "tool", 0o755);
        let expected = make_file(first.path(), "tool", 0o700);

        let (a, b) = (dir_str(first.path()), dir_str(second.path()));
        let found = find_command_path_in(&[a.as_str(), b.as_str()], "tool");
        assert_eq!(found, Some(expected));
    }

    #[test]
    fn non_executable_and_directories_are_skipped() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        make_file(first.path(), "tool", 0o644);
        fs::create_dir(first.path().join("dir")).unwrap();
        let expected = make_file(second.path(), "tool", 0o010);

        let (a, b) = (dir_str(first.path()), dir_str(second.path()));
        assert_eq!(find_command_path_in(&[a.as_str(), b.as_str()], "tool"), Some(expected));
        assert_eq!(find_command_path_in(&[a.as_str()], "dir"), None);
    }

    #[test]
    fn explicit_paths_are_checked_not_searched() {
        let dir = tempfile::tempdir().unwrap();
        let exe = make_file(dir.path(), "run.sh", 0o750);
        let plain = make_file(dir.path(), "data.txt", 0o640);

        assert_eq!(find_command_path(exe.to_str().unwrap()), Some(exe.clone()));
        assert_eq!(find_command_path(plain.to_str().unwrap()), None);
        assert_eq!(find_command_path("./definitely/not/here"), None);
    }

    #[test]
    #[cfg(unix)]
    fn sh_resolves_from_system_dirs() {
        let found = find_command_path("sh").expect("sh should exist on any unix system");
        assert!(found.ends_with("sh"));
        assert!(SEARCH_DIRS.iter().any(|d| found.starts_with(d)));
    }

    #[test]
    fn empty_name_is_none() {
        assert_eq!(find_command_path(""), None);
    }

    #[test]
    fn every_missing_name_is_reported_and_builtins_skipped() {
        let tokens = split_into_tokens("no-such-prog-1 | no-such-prog-2");
        let mut pipeline = construct_pipeline(&tokens).unwrap();
        match resolve_pipeline(&mut pipeline) {
            Err(ShellError::CommandNotFound(names)) => {
                assert_eq!(names, vec!["no-such-prog-1", "no-such-prog-2"]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let tokens = split_into_tokens("PWD > out | CD");
        let mut pipeline = construct_pipeline(&tokens).unwrap();
        resolve_pipeline(&mut pipeline).unwrap();
        assert!(pipeline.commands().iter().all(|c| c.path.is_none()));
    }
}
