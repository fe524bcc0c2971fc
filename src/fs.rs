//! Filesystem access used by the pruning and manifest stages.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use walkdir::WalkDir;

use crate::vcs::VCS_INTERNALS;

/// The handful of filesystem operations the pipeline needs. Kept behind a
/// trait so stages can run against an in-memory tree in tests.
pub trait Filesystem: Sync {
    /// Every regular file below `root`, as absolute paths. Order is not
    /// guaranteed.
    fn list_files(&self, root: &Path) -> io::Result<Vec<PathBuf>>;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn file_len(&self, path: &Path) -> io::Result<u64>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Remove directories below `root` left without any file. `root` itself
    /// survives. Returns the number of directories removed.
    fn prune_empty_dirs(&self, root: &Path) -> io::Result<usize>;

    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;
}

/// The real disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

fn is_vcs_internal(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| VCS_INTERNALS.contains(&name))
}

impl Filesystem for LocalFs {
    fn list_files(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", root.display()),
            ));
        }

        let walker = WalkBuilder::new(root)
            .hidden(false)
            // The snapshot is defined by what is on disk, not by ignore files.
            .git_ignore(false)
            .ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false)
            .filter_entry(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map_or(true, |name| !VCS_INTERNALS.contains(&name))
            })
            .build();

        let mut files = Vec::new();
        for result in walker {
            let entry = result.map_err(|err| match err.into_io_error() {
                Some(io_err) => io_err,
                None => io::Error::new(io::ErrorKind::Other, "failed to walk directory"),
            })?;
            if entry.file_type().is_some_and(|ft| ft.is_file()) {
                files.push(entry.into_path());
            }
        }

        log::debug!("Listed {} files under {}", files.len(), root.display());
        Ok(files)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        // symlink_metadata so a link is measured, not its target
        fs::symlink_metadata(path).map(|meta| meta.len())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn prune_empty_dirs(&self, root: &Path) -> io::Result<usize> {
        // Collected parent-first so filter_entry keeps the walk out of VCS
        // internals. Reversed, every directory comes after its children and a
        // chain of directories that only contained each other collapses in
        // one pass.
        let mut dirs = Vec::new();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| !is_vcs_internal(entry));

        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_dir() {
                dirs.push(entry.into_path());
            }
        }

        let mut removed = 0;
        for path in dirs.iter().rev() {
            if fs::read_dir(path)?.next().is_none() {
                fs::remove_dir(path)?;
                log::trace!("Removed empty directory {}", path.display());
                removed += 1;
            }
        }

        Ok(removed)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        fs::write(path, contents)
    }
}
