use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::{debug, info};

use crate::error::Error;

pub const SMALI_EXTENSION: &str = "smali";

/// Partition directories produced by the disassembler, in priority order.
pub const DEFAULT_SEARCH_DIRS: &[&str] = &[
    "smali",
    "smali_classes2",
    "smali_classes3",
    "smali_classes4",
    "smali_classes5",
    "smali_classes6",
];

/// File-name substrings of well-known wrapper activities, in priority order.
pub const DEFAULT_HEURISTIC_PATTERNS: &[&str] = &[
    "UnityPlayer",
    "UnityActivity",
    "MessagingUnityPlayer",
    "Unity",
    "Firebase",
    "Messaging",
    "Player",
    "Activity",
    "Main",
];

/// The class being looked for, e.g. `com.example.MainActivity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    class: String,
}

impl EntryPoint {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// `MainActivity.smali`
    pub fn file_name(&self) -> String {
        let simple = self.class.rsplit('.').next().unwrap_or(&self.class);
        format!("{simple}.{SMALI_EXTENSION}")
    }

    /// `com/example/MainActivity.smali`
    pub fn relative_path(&self) -> PathBuf {
        let mut path: PathBuf = self.class.split('.').collect();
        path.set_extension(SMALI_EXTENSION);
        path
    }
}

/// A decoded tree: a root plus the partition directories and fallback
/// patterns to search it with.
#[derive(Debug, Clone)]
pub struct SearchTree {
    root: PathBuf,
    dirs: Vec<String>,
    patterns: Vec<String>,
}

impl SearchTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dirs: DEFAULT_SEARCH_DIRS.iter().map(|s| s.to_string()).collect(),
            patterns: DEFAULT_HEURISTIC_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn with_dirs(mut self, dirs: Vec<String>) -> Self {
        self.dirs = dirs;
        self
    }

    pub fn with_patterns(mut self, patterns: Vec<String>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Partition directories that exist, in priority order. Missing ones are
    /// skipped.
    pub fn partitions(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.dirs
            .iter()
            .map(|d| self.root.join(d))
            .filter(|p| p.is_dir())
    }

    /// Every `.smali` file in every partition, in traversal order.
    pub fn smali_files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.partitions()
            .flat_map(|dir| walk_files(&dir))
            .filter(|p| is_smali(p))
    }

    /// Every `.smali` file anywhere under the root, partitions or not.
    pub fn all_smali_files(&self) -> impl Iterator<Item = PathBuf> + use<> {
        walk_files(&self.root).filter(|p| is_smali(p))
    }
}

fn is_smali(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == SMALI_EXTENSION)
}

/// Recursively list files under `dir`, sorted by name at each level.
/// Ignore files are not honoured: the tree is disassembler output.
fn walk_files(dir: &Path) -> impl Iterator<Item = PathBuf> + use<> {
    WalkBuilder::new(dir)
        .standard_filters(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .map(ignore::DirEntry::into_path)
}

/// One way of finding the entry document. Strategies never touch the files
/// they find.
pub type Strategy = fn(&SearchTree, &EntryPoint) -> Option<PathBuf>;

/// Strategies in the order they are tried; the first hit wins.
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("exact path", exact_path),
    ("file name", file_name),
    ("heuristic", heuristic),
];

/// `<partition>/com/example/MainActivity.smali` in the first partition that
/// has it.
pub fn exact_path(tree: &SearchTree, entry: &EntryPoint) -> Option<PathBuf> {
    let relative = entry.relative_path();
    tree.partitions()
        .map(|dir| dir.join(&relative))
        .find(|p| p.is_file())
}

/// Any file named `MainActivity.smali`, wherever it sits.
pub fn file_name(tree: &SearchTree, entry: &EntryPoint) -> Option<PathBuf> {
    let target = entry.file_name();
    tree.partitions().find_map(|dir| {
        walk_files(&dir).find(|p| p.file_name().is_some_and(|name| name == target.as_str()))
    })
}

/// First `.smali` file whose name contains the highest-priority pattern that
/// matches anything.
pub fn heuristic(tree: &SearchTree, _entry: &EntryPoint) -> Option<PathBuf> {
    tree.patterns.iter().find_map(|pattern| {
        tree.smali_files().find(|p| {
            p.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.contains(pattern.as_str()))
        })
    })
}

/// Find the document defining `entry`, trying each of [`STRATEGIES`] in turn.
pub fn locate(tree: &SearchTree, entry: &EntryPoint) -> Result<PathBuf, Error> {
    info!("looking for {}", entry.file_name());
    for (name, strategy) in STRATEGIES {
        debug!("trying {name} search");
        if let Some(path) = strategy(tree, entry) {
            info!("found {} by {name}", path.display());
            return Ok(path);
        }
    }

    let total = tree.smali_files().count();
    info!(
        "no candidate for {} among {total} .smali files under {}",
        entry.class(),
        tree.root().display()
    );
    Err(Error::NotFound {
        class: entry.class().to_string(),
    })
}
