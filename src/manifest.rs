//! Classification of surviving files into manifest categories.
//!
//! Building happens in two phases. The first walks the file list once,
//! classifies every file and records members directly. Container files
//! (objects, workflows, sharing and matching rules, label sets) are also
//! queued, grouped by category. The second phase reads each queued file once,
//! in parallel, and registers the nested members found in its content.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use thiserror::Error;

use crate::changeset::SIDECAR_SUFFIX;
use crate::fs::Filesystem;
use crate::type_config::{TypeConfig, TypeEntry};
use crate::xml::{self, XmlError};

/// Member value meaning "every component of this type".
pub const WILDCARD: &str = "*";

/// File name of the manifest, written at the snapshot root.
pub const MANIFEST_FILE_NAME: &str = "package.xml";

/// Folders whose content is named relative to the folder rather than by file
/// name alone, together with the lookup key used for them.
struct FolderConvention {
    folder: &'static str,
    key: &'static str,
    keep_extension: bool,
}

const FOLDER_CONVENTIONS: &[FolderConvention] = &[
    FolderConvention {
        folder: "documents",
        key: "document",
        keep_extension: true,
    },
    FolderConvention {
        folder: "email",
        key: "email",
        keep_extension: false,
    },
    FolderConvention {
        folder: "reports",
        key: "report",
        keep_extension: false,
    },
];

/// How nested members of a container are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestedStyle {
    /// `<container>.<value>`, e.g. `Account.Region__c`.
    Prefixed,
    /// The value alone; label names are global. The container file itself
    /// is not a member.
    Bare,
}

/// Extensions whose content holds nested members.
const CONTAINER_EXTENSIONS: &[(&str, NestedStyle)] = &[
    ("object", NestedStyle::Prefixed),
    ("workflow", NestedStyle::Prefixed),
    ("matchingRule", NestedStyle::Prefixed),
    ("sharingRules", NestedStyle::Prefixed),
    ("labels", NestedStyle::Bare),
];

/// Key used for application files inside a bundle folder.
const BUNDLE_APP_KEY: &str = "auraApp";

/// One file of the snapshot, split the way classification needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Directory segments relative to the snapshot root.
    pub dirs: Vec<String>,
    /// File name with extension.
    pub base: String,
    /// File name without its last extension.
    pub stem: String,
    /// Last extension without the dot, empty when there is none.
    pub extension: String,
}

impl SourceFile {
    /// Describe `path`, which must live under `root`. `None` when it does not,
    /// or when a segment of its name is not valid UTF-8.
    pub fn from_path(root: &Path, path: &Path) -> Option<Self> {
        let relative = path.strip_prefix(root).ok()?;
        let base = relative.file_name()?.to_str()?.to_string();
        let stem = relative
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&base)
            .to_string();
        let extension = relative
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();
        let dirs = relative
            .parent()
            .map(|parent| {
                parent
                    .components()
                    .filter_map(|c| match c {
                        std::path::Component::Normal(name) => {
                            name.to_str().map(str::to_string)
                        }
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(SourceFile {
            path: path.to_path_buf(),
            dirs,
            base,
            stem,
            extension,
        })
    }

    pub fn is_sidecar(&self) -> bool {
        self.base.ends_with(SIDECAR_SUFFIX)
    }
}

/// A file's place in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification<'c> {
    pub key: String,
    pub category: &'c TypeEntry,
    pub member: String,
    /// Set for container files whose content must be read in phase two.
    pub nested: Option<NestedStyle>,
}

/// A manifest category and its members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryEntry {
    name: String,
    allows_wildcard: bool,
    members: Vec<String>,
}

impl CategoryEntry {
    pub fn new(name: impl Into<String>, allows_wildcard: bool) -> Self {
        CategoryEntry {
            name: name.into(),
            allows_wildcard,
            members: Vec::new(),
        }
    }

    /// Add a member. Wildcard categories collapse to `*` on the first add and
    /// ignore everything after it.
    pub fn add(&mut self, member: &str) {
        if self.allows_wildcard {
            if self.members.is_empty() {
                self.members.push(WILDCARD.to_string());
            }
        } else if !self.members.iter().any(|m| m == member) {
            self.members.push(member.to_string());
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn allows_wildcard(&self) -> bool {
        self.allows_wildcard
    }
}

/// Everything that goes into `package.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDescriptor {
    version: String,
    categories: Vec<CategoryEntry>,
}

impl ManifestDescriptor {
    pub fn new(version: impl Into<String>) -> Self {
        ManifestDescriptor {
            version: version.into(),
            categories: Vec::new(),
        }
    }

    /// Add `member` to the category named by `entry`, creating the category
    /// on first use. Categories keep first-touched order.
    pub fn add_member(&mut self, entry: &TypeEntry, member: &str) {
        let index = match self.categories.iter().position(|c| c.name == entry.name) {
            Some(index) => index,
            None => {
                self.categories
                    .push(CategoryEntry::new(entry.name.clone(), entry.wildcard));
                self.categories.len() - 1
            }
        };
        self.categories[index].add(member);
    }

    pub fn category(&self, name: &str) -> Option<&CategoryEntry> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn categories(&self) -> &[CategoryEntry] {
        &self.categories
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn member_count(&self) -> usize {
        self.categories.iter().map(|c| c.members.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Files of one category waiting for nested-member extraction.
#[derive(Debug, Clone)]
pub struct PendingExtraction {
    pub key: String,
    pub style: NestedStyle,
    pub files: Vec<SourceFile>,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse { path: PathBuf, source: XmlError },
}

pub struct ManifestBuilder<'c> {
    config: &'c TypeConfig,
    bundle_folders: Vec<String>,
    manifest: ManifestDescriptor,
    pending: Vec<PendingExtraction>,
}

impl<'c> ManifestBuilder<'c> {
    pub fn new(config: &'c TypeConfig) -> Self {
        ManifestBuilder {
            config,
            bundle_folders: config.bundle_folders(),
            manifest: ManifestDescriptor::new(config.version()),
            pending: Vec::new(),
        }
    }

    /// Decide where `file` belongs. `None` means the file is not a deployable
    /// component: a descriptor outside the conventional folders, or a key
    /// with no configured type.
    pub fn classify(&self, file: &SourceFile) -> Option<Classification<'c>> {
        let (key, member, nested) = if file.is_sidecar() {
            let convention = FOLDER_CONVENTIONS
                .iter()
                .find(|c| file.dirs.last().is_some_and(|dir| dir == c.folder))?;
            let folder = file.base.strip_suffix(SIDECAR_SUFFIX)?;
            (convention.key.to_string(), folder.to_string(), None)
        } else if let Some((convention, member)) = self.conventional_member(file) {
            (convention.key.to_string(), member, None)
        } else if file.extension == "app" && self.inside_bundle(file) {
            (BUNDLE_APP_KEY.to_string(), file.stem.clone(), None)
        } else {
            let nested = CONTAINER_EXTENSIONS
                .iter()
                .find(|(ext, _)| *ext == file.extension)
                .map(|(_, style)| *style);
            (file.extension.clone(), file.stem.clone(), nested)
        };

        let config: &'c TypeConfig = self.config;
        let category = config.get(&key)?;
        Some(Classification {
            key,
            category,
            member,
            nested,
        })
    }

    /// Member name for a file stored below a conventional folder, relative to
    /// that folder.
    fn conventional_member(&self, file: &SourceFile) -> Option<(&'static FolderConvention, String)> {
        FOLDER_CONVENTIONS.iter().find_map(|convention| {
            let index = file.dirs.iter().position(|dir| dir == convention.folder)?;
            let rest = &file.dirs[index + 1..];
            if rest.is_empty() {
                return None;
            }
            let name = if convention.keep_extension {
                &file.base
            } else {
                &file.stem
            };
            Some((convention, format!("{}/{}", rest.join("/"), name)))
        })
    }

    fn inside_bundle(&self, file: &SourceFile) -> bool {
        match file.dirs.split_last() {
            Some((_, ancestors)) => ancestors
                .iter()
                .any(|dir| self.bundle_folders.iter().any(|b| b == dir)),
            None => false,
        }
    }

    /// Phase one for a single file.
    pub fn add_file(&mut self, file: SourceFile) {
        let Some(classification) = self.classify(&file) else {
            log::debug!("Not a deployable component: {}", file.path.display());
            return;
        };

        log::trace!(
            "{} -> {} {}",
            file.path.display(),
            classification.category.name,
            classification.member
        );
        // A label set is only a container; its labels are the members.
        if classification.nested != Some(NestedStyle::Bare) {
            self.manifest
                .add_member(classification.category, &classification.member);
        }

        if let Some(style) = classification.nested {
            self.queue(classification.key, style, file);
        }
    }

    fn queue(&mut self, key: String, style: NestedStyle, file: SourceFile) {
        match self.pending.iter_mut().find(|p| p.key == key) {
            Some(pending) => {
                if !pending.files.iter().any(|f| f.path == file.path) {
                    pending.files.push(file);
                }
            }
            None => self.pending.push(PendingExtraction {
                key,
                style,
                files: vec![file],
            }),
        }
    }

    pub fn pending(&self) -> &[PendingExtraction] {
        &self.pending
    }

    /// Phase two. Reads every queued file once and adds the nested members
    /// it declares. A file that cannot be read or parsed is logged and
    /// skipped; the returned count says how many were skipped.
    pub fn extract_nested(&mut self, fs: &dyn Filesystem) -> usize {
        let config = self.config;
        let jobs: Vec<(NestedStyle, &SourceFile)> = self
            .pending
            .iter()
            .flat_map(|p| p.files.iter().map(move |f| (p.style, f)))
            .collect();

        let results: Vec<Result<Vec<(&TypeEntry, String)>, ExtractionError>> = jobs
            .par_iter()
            .map(|(style, file)| nested_members(fs, config, file, *style))
            .collect();

        let mut failures = 0;
        for result in results {
            match result {
                Ok(members) => {
                    for (entry, member) in members {
                        self.manifest.add_member(entry, &member);
                    }
                }
                Err(err) => {
                    log::warn!("Skipping nested members: {}", err);
                    failures += 1;
                }
            }
        }

        self.pending.clear();
        failures
    }

    pub fn manifest(&self) -> &ManifestDescriptor {
        &self.manifest
    }

    pub fn finish(self) -> ManifestDescriptor {
        self.manifest
    }
}

/// Read a container file and list the nested members it declares.
fn nested_members<'c>(
    fs: &dyn Filesystem,
    config: &'c TypeConfig,
    file: &SourceFile,
    style: NestedStyle,
) -> Result<Vec<(&'c TypeEntry, String)>, ExtractionError> {
    let content = fs
        .read_to_string(&file.path)
        .map_err(|source| ExtractionError::Read {
            path: file.path.clone(),
            source,
        })?;
    let root = xml::parse(&content).map_err(|source| ExtractionError::Parse {
        path: file.path.clone(),
        source,
    })?;

    let mut members = Vec::new();
    for child in &root.children {
        let Some(entry) = config.get(&child.name) else {
            continue;
        };
        let Some(nested_key) = entry.nested_key.as_deref() else {
            continue;
        };
        let Some(value) = child.child_text(nested_key).filter(|v| !v.is_empty()) else {
            continue;
        };

        let member = match style {
            NestedStyle::Prefixed => format!("{}.{}", file.stem, value),
            NestedStyle::Bare => value.to_string(),
        };
        members.push((entry, member));
    }

    Ok(members)
}

/// Classify every file under `root` (except the manifest itself) and return
/// the finished manifest.
pub fn build_manifest(
    fs: &dyn Filesystem,
    root: &Path,
    config: &TypeConfig,
) -> Result<ManifestDescriptor> {
    let paths = fs
        .list_files(root)
        .with_context(|| format!("Failed to list files under {}", root.display()))?;
    Ok(build_manifest_from(fs, root, paths, config))
}

/// Build the manifest from an explicit file list under `root`, such as the
/// files a dry-run delta would leave behind.
pub fn build_manifest_from(
    fs: &dyn Filesystem,
    root: &Path,
    mut paths: Vec<PathBuf>,
    config: &TypeConfig,
) -> ManifestDescriptor {
    // Listing order is not stable; sort so category order is reproducible.
    paths.sort();

    let manifest_path = root.join(MANIFEST_FILE_NAME);
    let mut builder = ManifestBuilder::new(config);

    for path in paths {
        if path == manifest_path {
            continue;
        }
        match SourceFile::from_path(root, &path) {
            Some(file) => builder.add_file(file),
            None if path.starts_with(root) => {
                log::warn!("Skipping file with a non-UTF-8 name: {}", path.display())
            }
            None => log::warn!("Skipping file outside the source root: {}", path.display()),
        }
    }

    let queued: usize = builder.pending().iter().map(|p| p.files.len()).sum();
    if queued > 0 {
        log::debug!("Reading {} container files for nested members", queued);
    }
    let skipped = builder.extract_nested(fs);
    if skipped > 0 {
        log::warn!("{} container files were skipped", skipped);
    }

    builder.finish()
}
