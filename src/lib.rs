//! metadata delta - prune a metadata source tree to what changed and describe it
//!
//! Given a working copy and a git reference, `metadelta` keeps only the files
//! added or modified since that reference (plus the descriptor files they
//! cannot be deployed without), deletes everything else from the snapshot and
//! writes a `package.xml` manifest listing the surviving components by type.
//!
//! ## Stages
//!
//! - [`changeset`]: parse the `git diff --name-status` report and expand it with
//!   companion paths.
//! - [`pruner`]: compare the snapshot tree with the kept tree and remove what
//!   was not touched. Bundle folders are kept whole.
//! - [`manifest`]: classify what survived into manifest categories, including
//!   nested members read from container files.

pub mod changeset;
pub mod fs;
pub mod manifest;
pub mod path_tree;
pub mod pipeline;
pub mod pruner;
pub mod type_config;
pub mod vcs;
pub mod xml;

// Re-export commonly used items
pub use changeset::{expand, parse_change_report, ChangeRecord, ChangeStatus, KeptPathSet};
pub use fs::{Filesystem, LocalFs};
pub use manifest::{
    build_manifest, build_manifest_from, CategoryEntry, ManifestBuilder, ManifestDescriptor,
};
pub use path_tree::PathTree;
pub use pipeline::{run_delta, run_package, run_package_from, DeltaOptions, DeltaReport};
pub use pruner::{apply_removals, removal_set, RemovalError, RemovalReport};
pub use type_config::{TypeConfig, TypeEntry};
pub use vcs::{ChangeSource, GitChangeSource, VcsError};
