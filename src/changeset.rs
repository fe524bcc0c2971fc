//! Change report parsing and expansion into the set of paths to keep.

use std::path::Path;

use crate::path_tree::PathTree;

/// Suffix that turns an artifact path into its deployment descriptor path.
pub const SIDECAR_SUFFIX: &str = "-meta.xml";

/// Extensions whose artifacts cannot be deployed without their descriptor.
pub const DEFAULT_SIDECAR_EXTENSIONS: &[&str] = &[
    "cmp",
    "evt",
    "app",
    "cls",
    "component",
    "email",
    "page",
    "resource",
    "trigger",
];

/// Status letter from `git diff --name-status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Added,
    Copied,
    Deleted,
    Modified,
    Renamed,
    TypeChanged,
    Unmerged,
    Unknown,
}

impl ChangeStatus {
    /// Parse a status column. Rename and copy entries carry a similarity
    /// score (`R100`), so only the first letter is significant.
    pub fn from_code(code: &str) -> Option<Self> {
        let status = match code.chars().next()? {
            'A' => ChangeStatus::Added,
            'C' => ChangeStatus::Copied,
            'D' => ChangeStatus::Deleted,
            'M' => ChangeStatus::Modified,
            'R' => ChangeStatus::Renamed,
            'T' => ChangeStatus::TypeChanged,
            'U' => ChangeStatus::Unmerged,
            'X' => ChangeStatus::Unknown,
            _ => return None,
        };
        Some(status)
    }

    /// Only additions and modifications leave something to deploy.
    pub fn is_deployable(self) -> bool {
        matches!(self, ChangeStatus::Added | ChangeStatus::Modified)
    }
}

/// A single added or modified path from the change report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub path: String,
    pub status: ChangeStatus,
}

/// Parse `<status>\t<path>` lines, keeping only added and modified entries.
pub fn parse_change_report(report: &str) -> Vec<ChangeRecord> {
    let mut records = Vec::new();

    for line in report.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let mut columns = line.split('\t');
        let status = columns.next().and_then(|code| ChangeStatus::from_code(code.trim()));
        let path = columns.next().map(str::trim).filter(|p| !p.is_empty());

        match (status, path) {
            (Some(status), Some(path)) if status.is_deployable() => records.push(ChangeRecord {
                path: unquote_path(path),
                status,
            }),
            (Some(status), Some(path)) => {
                log::trace!("Ignoring {:?} entry: {}", status, path);
            }
            _ => {
                log::trace!("Skipping unrecognised change line: {:?}", line);
            }
        }
    }

    records
}

/// Undo git's C-style quoting (`"caf\303\251.png"`). Paths with control
/// characters, quotes or backslashes are quoted even with `core.quotePath`
/// off. Unquoted paths are returned unchanged.
pub fn unquote_path(path: &str) -> String {
    let Some(inner) = path
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return path.to_string();
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('a') => bytes.push(0x07),
            Some('b') => bytes.push(0x08),
            Some('t') => bytes.push(b'\t'),
            Some('n') => bytes.push(b'\n'),
            Some('v') => bytes.push(0x0b),
            Some('f') => bytes.push(0x0c),
            Some('r') => bytes.push(b'\r'),
            Some(d @ '0'..='7') => {
                let mut value = d.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                bytes.push(value as u8);
            }
            Some(other) => {
                let mut buf = [0; 4];
                bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => bytes.push(b'\\'),
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

/// Which companions a kept path drags along with it.
#[derive(Debug, Clone)]
pub struct ExpansionRules {
    pub sidecar_suffix: String,
    pub sidecar_extensions: Vec<String>,
}

impl Default for ExpansionRules {
    fn default() -> Self {
        ExpansionRules {
            sidecar_suffix: SIDECAR_SUFFIX.to_string(),
            sidecar_extensions: DEFAULT_SIDECAR_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl ExpansionRules {
    fn requires_sidecar(&self, path: &str) -> bool {
        Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.sidecar_extensions.iter().any(|e| e == ext))
    }
}

/// Ordered, duplicate-free list of paths that must survive pruning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeptPathSet {
    paths: Vec<String>,
}

impl KeptPathSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every path in `paths` along with its companions.
    pub fn expand_paths<I, S>(&mut self, paths: I, rules: &ExpansionRules)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in paths {
            self.expand_one(path.as_ref(), rules);
        }
    }

    fn expand_one(&mut self, path: &str, rules: &ExpansionRules) {
        if rules.requires_sidecar(path) {
            self.push(format!("{}{}", path, rules.sidecar_suffix));
        }

        self.push(path.to_string());

        if let Some(base) = path.strip_suffix(rules.sidecar_suffix.as_str()) {
            if !base.is_empty() {
                self.push(base.to_string());
            }
        }
    }

    fn push(&mut self, path: String) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn to_tree(&self) -> PathTree {
        PathTree::from_paths(&self.paths)
    }
}

/// Expand change records into the paths to keep.
pub fn expand(records: &[ChangeRecord], rules: &ExpansionRules) -> KeptPathSet {
    let mut kept = KeptPathSet::new();
    kept.expand_paths(records.iter().map(|r| r.path.as_str()), rules);
    kept
}
