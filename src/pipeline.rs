//! The delta and package stages, wired to their collaborators.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::changeset::{expand, parse_change_report};
use crate::fs::Filesystem;
use crate::manifest::{build_manifest, build_manifest_from, ManifestDescriptor, MANIFEST_FILE_NAME};
use crate::path_tree::PathTree;
use crate::pruner::{apply_removals, removal_set, RemovalReport};
use crate::type_config::TypeConfig;
use crate::vcs::{ChangeSource, VcsError};
use crate::xml;

/// Options for the delta stage.
#[derive(Debug, Clone)]
pub struct DeltaOptions {
    /// Root of the metadata snapshot.
    pub src_root: PathBuf,
    /// Reference handed to `git diff`.
    pub reference: String,
    pub dry_run: bool,
}

#[derive(Debug)]
pub struct DeltaReport {
    pub changed: usize,
    pub kept: usize,
    pub listed: usize,
    pub removal: RemovalReport,
    /// Snapshot files outside the removal set: what survives the delta, even
    /// when a dry run left everything on disk.
    pub remaining: Vec<PathBuf>,
}

/// Reduce the snapshot under `src_root` to the files changed since
/// `reference`, plus their companions.
pub fn run_delta(
    options: &DeltaOptions,
    config: &TypeConfig,
    source: &dyn ChangeSource,
    fs: &dyn Filesystem,
) -> Result<DeltaReport> {
    if options.reference.trim().is_empty() {
        return Err(VcsError::MissingReference.into());
    }
    if !options.src_root.is_dir() {
        bail!("Source directory {} does not exist", options.src_root.display());
    }

    let report = source
        .change_report(&options.reference)
        .context("Failed to compute the change set")?;

    let records = parse_change_report(&report);
    let kept = expand(&records, &config.expansion_rules());
    log::info!(
        "{} changed paths, {} after adding companion files",
        records.len(),
        kept.len()
    );

    let listed = fs
        .list_files(&options.src_root)
        .with_context(|| format!("Failed to list files under {}", options.src_root.display()))?;
    let latest = PathTree::from_paths(relative_paths(&options.src_root, &listed));

    let bundle_folders = config.bundle_folders();
    let removals = removal_set(&options.src_root, &latest, &kept.to_tree(), &bundle_folders);
    log::info!(
        "{} of {} files are unchanged and will be removed",
        removals.len(),
        listed.len()
    );

    let removal = apply_removals(fs, &options.src_root, &removals, options.dry_run)?;

    let removed: HashSet<&PathBuf> = removals.iter().collect();
    let remaining = listed
        .iter()
        .filter(|path| !removed.contains(path))
        .cloned()
        .collect();

    Ok(DeltaReport {
        changed: records.len(),
        kept: kept.len(),
        listed: listed.len(),
        removal,
        remaining,
    })
}

fn relative_paths(root: &Path, paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|path| path.strip_prefix(root).ok())
        .map(|relative| relative.to_string_lossy().replace('\\', "/"))
        .collect()
}

/// Build the manifest for whatever is left under `src_root` and write it to
/// `package.xml` there. Nothing is written on a dry run.
pub fn run_package(
    src_root: &Path,
    config: &TypeConfig,
    fs: &dyn Filesystem,
    dry_run: bool,
) -> Result<ManifestDescriptor> {
    if !src_root.is_dir() {
        bail!("Source directory {} does not exist", src_root.display());
    }

    let manifest = build_manifest(fs, src_root, config)?;
    write_package(src_root, manifest, fs, dry_run)
}

/// Like [`run_package`], but classifies `files` instead of listing
/// `src_root`. Used after a dry-run delta, when the snapshot on disk still
/// holds the files that would have been removed.
pub fn run_package_from(
    src_root: &Path,
    files: Vec<PathBuf>,
    config: &TypeConfig,
    fs: &dyn Filesystem,
    dry_run: bool,
) -> Result<ManifestDescriptor> {
    let manifest = build_manifest_from(fs, src_root, files, config);
    write_package(src_root, manifest, fs, dry_run)
}

fn write_package(
    src_root: &Path,
    manifest: ManifestDescriptor,
    fs: &dyn Filesystem,
    dry_run: bool,
) -> Result<ManifestDescriptor> {
    let rendered = xml::write_manifest(&manifest).context("Failed to render package.xml")?;
    log::debug!("package.xml:\n{}", rendered);

    if !dry_run {
        let path = manifest_path(src_root);
        fs.write(&path, &rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    Ok(manifest)
}

pub fn manifest_path(src_root: &Path) -> PathBuf {
    src_root.join(MANIFEST_FILE_NAME)
}
