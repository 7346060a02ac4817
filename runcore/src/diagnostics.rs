use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::warn;

/// Returned in place of output when the shell could not be started.
pub const SPAWN_FAILED: &str = "ERROR";

/// Runs `cmd` through `sh -c` and returns whatever it wrote to stdout.
/// The exit status is not checked.
pub fn exec(cmd: &str) -> String {
    exec_with_shell("sh", cmd)
}

pub fn exec_with_shell(shell: &str, cmd: &str) -> String {
    let output = Command::new(shell)
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output();
    match output {
        Ok(output) => String::from_utf8_lossy(&output.stdout).into_owned(),
        Err(e) => {
            warn!("failed to spawn `{cmd}`: {e}");
            SPAWN_FAILED.to_string()
        }
    }
}

/// Directory holding the running executable, empty if unknown.
pub fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_default()
}

pub fn default_command() -> String {
    list_command(&exe_dir())
}

/// `ls` run from inside `dir`.
pub fn list_command(dir: &Path) -> String {
    format!("cd {}; ls", shell_quote(&dir.to_string_lossy()))
}

/// Single-quotes `s` for `sh`, closing and reopening the quotes around any
/// embedded `'`.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// The line echoed for a finished diagnostic run.
pub fn report(output: &str) -> String {
    format!("res: '{output}'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_captures_stdout() {
        assert_eq!(exec("echo hello"), "hello\n");
        assert_eq!(exec("printf a; printf b 1>&2"), "a");
    }

    #[test]
    fn test_exec_ignores_exit_status() {
        assert_eq!(exec("echo partial; exit 3"), "partial\n");
    }

    #[test]
    fn test_exec_reports_spawn_failure() {
        assert_eq!(exec_with_shell("/no/such/shell", "ls"), SPAWN_FAILED);
    }

    #[test]
    fn test_exe_dir_contains_test_binary() {
        let dir = exe_dir();
        assert!(dir.is_dir());
        let exe = std::env::current_exe().unwrap();
        assert_eq!(exe.parent().unwrap(), dir);
    }

    #[test]
    fn test_default_command_lists_exe_dir() {
        let out = exec(&default_command());
        let exe = std::env::current_exe().unwrap();
        let name = exe.file_name().unwrap().to_string_lossy().into_owned();
        assert!(out.lines().any(|l| l == name), "{out}");
    }

    #[test]
    fn test_shell_quote_survives_single_quotes() {
        assert_eq!(shell_quote("/opt/app"), "'/opt/app'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(exec(&format!("printf %s {}", shell_quote("it's; ls"))), "it's; ls");
    }

    #[test]
    fn test_default_command_in_quoted_dir() {
        let parent = tempfile::tempdir().unwrap();
        let dir = parent.path().join("o'brien dir");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("marker.txt"), "").unwrap();
        assert_eq!(exec(&list_command(&dir)), "marker.txt\n");
    }

    #[test]
    fn test_report_format() {
        assert_eq!(report("a\nb\n"), "res: 'a\nb\n'");
    }
}
