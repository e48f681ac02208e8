use std::path::{Path, PathBuf};

use toml_edit::{DocumentMut, Item};

use crate::error::Error;
use crate::inject::END_METHOD_WINDOW;
use crate::locate::{DEFAULT_HEURISTIC_PATTERNS, DEFAULT_SEARCH_DIRS};

pub const DEFAULT_LIBRARY: &str = "frida-gadget";

/// Classes tried when the entry document can't be patched.
pub const DEFAULT_ALTERNATIVE_TARGETS: &[&str] = &[
    "UnityPlayerActivity",
    "UnityPlayer",
    "MainActivity",
    "LauncherActivity",
];

/// Settings for a run. Every field has a default; a TOML file may override
/// any subset of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub library: String,
    pub search_dirs: Vec<String>,
    pub heuristic_patterns: Vec<String>,
    pub alternative_targets: Vec<String>,
    pub end_method_window: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library: DEFAULT_LIBRARY.to_string(),
            search_dirs: to_strings(DEFAULT_SEARCH_DIRS),
            heuristic_patterns: to_strings(DEFAULT_HEURISTIC_PATTERNS),
            alternative_targets: to_strings(DEFAULT_ALTERNATIVE_TARGETS),
            end_method_window: END_METHOD_WINDOW,
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Config {
    /// Read a TOML config file. Unknown keys are ignored.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|reason| Error::InvalidConfig {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse TOML text on top of the defaults.
    pub fn parse(content: &str) -> Result<Self, String> {
        let doc: DocumentMut = content.parse().map_err(|e| format!("{e}"))?;
        let mut config = Config::default();

        if let Some(item) = doc.get("library") {
            config.library = string_value(item, "library")?;
        }
        if let Some(item) = doc.get("search_dirs") {
            config.search_dirs = string_array(item, "search_dirs")?;
        }
        if let Some(item) = doc.get("heuristic_patterns") {
            config.heuristic_patterns = string_array(item, "heuristic_patterns")?;
        }
        if let Some(item) = doc.get("alternative_targets") {
            config.alternative_targets = string_array(item, "alternative_targets")?;
        }
        if let Some(item) = doc.get("end_method_window") {
            let window = item
                .as_integer()
                .filter(|w| *w > 0)
                .ok_or("`end_method_window` must be a positive integer")?;
            config.end_method_window = usize::try_from(window).map_err(|e| e.to_string())?;
        }
        Ok(config)
    }

    /// Load `path` if given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&PathBuf>) -> Result<Self, Error> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

fn string_value(item: &Item, key: &str) -> Result<String, String> {
    item.as_str()
        .map(String::from)
        .ok_or_else(|| format!("`{key}` must be a string"))
}

fn string_array(item: &Item, key: &str) -> Result<Vec<String>, String> {
    let array = item
        .as_array()
        .ok_or_else(|| format!("`{key}` must be an array of strings"))?;
    array
        .iter()
        .map(|v| {
            v.as_str()
                .map(String::from)
                .ok_or_else(|| format!("`{key}` must be an array of strings"))
        })
        .collect()
}
