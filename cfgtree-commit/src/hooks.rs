//! Commit hook execution.

use std::process::Command;

use camino::Utf8Path;

/// When a hook directory runs relative to commit execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitHook {
    Pre,
    Post,
}

/// Runs every executable in `dir` in name order, with `envs` exported.
/// Hook failures are reported but never fail the commit.
pub fn run_hook_dir(dir: &Utf8Path, envs: &[(String, String)]) {
    let Ok(rd) = dir.read_dir_utf8() else {
        return;
    };
    let mut entries: Vec<_> = rd
        .filter_map(|e| e.ok())
        .map(|e| e.path().to_owned())
        .filter(|p| p.is_file())
        .collect();
    entries.sort();
    for hook in entries {
        let mut cmd = Command::new(&hook);
        for (k, v) in envs {
            cmd.env(k, v);
        }
        match cmd.status() {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::warn!(%hook, %status, "commit hook failed"),
            Err(e) => tracing::warn!(%hook, error = %e, "commit hook did not run"),
        }
    }
}
