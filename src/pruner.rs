//! Works out which files of a full snapshot are untouched by the change set
//! and removes them.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::fs::Filesystem;
use crate::path_tree::PathTree;

/// Folders whose direct subfolders are deployed as one unit.
pub const DEFAULT_BUNDLE_FOLDERS: &[&str] = &["aura"];

/// Compare the snapshot tree against the kept tree and return the absolute
/// path of every file that should be removed.
///
/// A file survives when it is listed in `kept`, or when it sits inside a
/// bundle (a subfolder of one of `bundle_folders`) that has at least one
/// kept file of its own.
pub fn removal_set<S: AsRef<str>>(
    root: &Path,
    latest: &PathTree,
    kept: &PathTree,
    bundle_folders: &[S],
) -> Vec<PathBuf> {
    let mut removals = Vec::new();
    let mut stack = Vec::new();
    collect(root, latest, Some(kept), &mut stack, bundle_folders, &mut removals);
    removals
}

fn collect<'a, S: AsRef<str>>(
    root: &Path,
    latest: &'a PathTree,
    kept: Option<&PathTree>,
    stack: &mut Vec<&'a str>,
    bundle_folders: &[S],
    removals: &mut Vec<PathBuf>,
) {
    if latest.has_files() {
        match kept.filter(|k| k.has_files()) {
            Some(kept) => {
                if !inside_bundle(stack, bundle_folders) {
                    for name in latest.files() {
                        if !kept.files().contains(name) {
                            removals.push(join(root, stack, name));
                        }
                    }
                }
            }
            None => {
                for name in latest.files() {
                    removals.push(join(root, stack, name));
                }
            }
        }
    }

    for (name, subtree) in latest.dirs() {
        stack.push(name);
        let counterpart = kept.and_then(|k| k.dir(name));
        collect(root, subtree, counterpart, stack, bundle_folders, removals);
        stack.pop();
    }
}

/// The current directory is inside a bundle when a bundle folder name shows
/// up above it. Files sitting directly in the bundle folder are not protected.
fn inside_bundle<S: AsRef<str>>(stack: &[&str], bundle_folders: &[S]) -> bool {
    match stack.split_last() {
        Some((_, ancestors)) => ancestors
            .iter()
            .any(|segment| bundle_folders.iter().any(|b| b.as_ref() == *segment)),
        None => false,
    }
}

fn join(root: &Path, stack: &[&str], name: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    path.extend(stack);
    path.push(name);
    path
}

/// Outcome of a removal pass.
#[derive(Debug, Default)]
pub struct RemovalReport {
    pub removed: Vec<PathBuf>,
    pub bytes: u64,
    pub pruned_dirs: usize,
    pub dry_run: bool,
}

#[derive(Debug, Error)]
pub enum RemovalError {
    /// Some deletions failed. Every path was attempted; `removed` lists the
    /// ones that are gone. Empty directories were left in place.
    #[error("failed to remove {} of {} files", .failed.len(), .failed.len() + .removed.len())]
    Partial {
        removed: Vec<PathBuf>,
        failed: Vec<(PathBuf, io::Error)>,
    },

    #[error("failed to prune empty directories under {}: {source}", .root.display())]
    PruneDirs { root: PathBuf, source: io::Error },
}

/// Delete `paths`, then prune directories left empty under `root`.
///
/// Deletion does not stop at the first failure: the remaining paths are
/// still attempted and all failures come back together in
/// [`RemovalError::Partial`].
pub fn apply_removals(
    fs: &dyn Filesystem,
    root: &Path,
    paths: &[PathBuf],
    dry_run: bool,
) -> Result<RemovalReport, RemovalError> {
    let mut report = RemovalReport {
        dry_run,
        ..RemovalReport::default()
    };
    let mut failed = Vec::new();

    for path in paths {
        let size = fs.file_len(path).unwrap_or(0);

        if dry_run {
            log::info!("Would remove: {}", path.display());
            report.bytes += size;
            report.removed.push(path.clone());
            continue;
        }

        match fs.remove_file(path) {
            Ok(()) => {
                log::debug!("Removed: {}", path.display());
                report.bytes += size;
                report.removed.push(path.clone());
            }
            Err(err) => {
                log::error!("Error removing {}: {}", path.display(), err);
                failed.push((path.clone(), err));
            }
        }
    }

    if !failed.is_empty() {
        return Err(RemovalError::Partial {
            removed: report.removed,
            failed,
        });
    }

    if !dry_run {
        report.pruned_dirs = fs
            .prune_empty_dirs(root)
            .map_err(|source| RemovalError::PruneDirs {
                root: root.to_path_buf(),
                source,
            })?;
    }

    Ok(report)
}
