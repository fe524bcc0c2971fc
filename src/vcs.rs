//! Git integration: locating the repository and producing the change report.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use thiserror::Error;

/// VCS internal directories that are never listed, pruned or deployed.
pub const VCS_INTERNALS: &[&str] = &[
    ".git", ".jj", ".svn", ".hg", ".bzr", "_darcs", ".pijul", "CVS", ".fossil",
];

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("a comparison reference is required (for example `HEAD~1` or `origin/main...HEAD`)")]
    MissingReference,

    #[error("{} is not inside a git repository", .0.display())]
    NotARepository(PathBuf),

    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git diff exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("git diff against `{0}` produced no output")]
    EmptyReport(String),
}

/// Source of the raw `<status>\t<path>` change report.
pub trait ChangeSource {
    fn change_report(&self, reference: &str) -> Result<String, VcsError>;
}

/// Runs `git diff --name-status --relative --no-renames <reference>` from
/// `work_dir`, so
/// reported paths are relative to that directory and changes outside it are
/// left out.
#[derive(Debug, Clone)]
pub struct GitChangeSource {
    work_dir: PathBuf,
}

impl GitChangeSource {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        GitChangeSource {
            work_dir: work_dir.into(),
        }
    }
}

impl ChangeSource for GitChangeSource {
    fn change_report(&self, reference: &str) -> Result<String, VcsError> {
        if reference.trim().is_empty() {
            return Err(VcsError::MissingReference);
        }
        if detect_repo_root(&self.work_dir).is_none() {
            return Err(VcsError::NotARepository(self.work_dir.clone()));
        }

        log::debug!(
            "Running git diff --name-status --relative --no-renames {} in {}",
            reference,
            self.work_dir.display()
        );

        // quotePath off keeps non-ASCII names verbatim; renames are reported
        // as a delete plus an add so the new path is kept.
        let output = Command::new("git")
            .args(["-c", "core.quotePath=false"])
            .arg("diff")
            .arg("--name-status")
            .arg("--relative")
            .arg("--no-renames")
            .arg(reference)
            .current_dir(&self.work_dir)
            .output()?;

        if !output.status.success() {
            return Err(VcsError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.trim().is_empty() {
            return Err(VcsError::EmptyReport(reference.to_string()));
        }

        Ok(stdout)
    }
}

/// Walk up from `path` to the directory holding `.git`.
pub fn detect_repo_root(path: &Path) -> Option<PathBuf> {
    let start = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    start
        .ancestors()
        .find(|ancestor| ancestor.join(".git").exists())
        .map(Path::to_path_buf)
}
