//! Hierarchical view of a flat list of relative paths.

use std::collections::BTreeMap;

/// One directory level: named subdirectories plus the leaf files that live
/// directly in it.
///
/// The file list is kept apart from the subdirectory map, so a real folder
/// called `files` is just another entry in `dirs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathTree {
    dirs: BTreeMap<String, PathTree>,
    files: Vec<String>,
}

impl PathTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from relative paths. Leaf names are appended in input
    /// order and never deduplicated.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = PathTree::new();
        for path in paths {
            tree.insert(path.as_ref());
        }
        tree
    }

    /// Insert a single relative path. Both `/` and `\` separate segments;
    /// empty and `.` segments are dropped.
    pub fn insert(&mut self, path: &str) {
        let mut segments: Vec<&str> = split_segments(path).collect();
        let Some(leaf) = segments.pop() else {
            return;
        };

        let mut node = self;
        for segment in segments {
            node = node.dirs.entry(segment.to_string()).or_default();
        }
        node.files.push(leaf.to_string());
    }

    pub fn dir(&self, name: &str) -> Option<&PathTree> {
        self.dirs.get(name)
    }

    pub fn dirs(&self) -> impl Iterator<Item = (&str, &PathTree)> {
        self.dirs.iter().map(|(name, tree)| (name.as_str(), tree))
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// The files slot only exists once something has been appended to it.
    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }

    /// Number of leaf entries in the whole subtree, duplicates included.
    pub fn file_count(&self) -> usize {
        self.files.len() + self.dirs.values().map(PathTree::file_count).sum::<usize>()
    }

    pub fn contains(&self, path: &str) -> bool {
        let mut segments: Vec<&str> = split_segments(path).collect();
        let Some(leaf) = segments.pop() else {
            return false;
        };

        let mut node = self;
        for segment in segments {
            match node.dirs.get(segment) {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.files.iter().any(|f| f == leaf)
    }
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
}
