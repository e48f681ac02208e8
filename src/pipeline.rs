use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::Config;
use crate::document;
use crate::error::Error;
use crate::inject::{InjectionReport, Injector, Warning};
use crate::locate::{EntryPoint, SearchTree, locate};

/// Patch a single document and write it back.
///
/// The document is written back even when injection fails; a failed write is
/// recorded as a [`Warning::PersistFailed`] on a successful report.
pub fn patch_file(
    path: &Path,
    library: &str,
    injector: &Injector,
) -> Result<InjectionReport, Error> {
    let edit = document::edit(path, |doc| injector.inject(doc, library))?;
    let mut report = edit.outcome?;
    if let Err(e) = edit.commit {
        let reason = match e {
            Error::WriteError { source, .. } => source.to_string(),
            other => other.to_string(),
        };
        report.warnings.push(Warning::PersistFailed {
            path: path.to_path_buf(),
            reason,
        });
    }
    Ok(report)
}

/// Build the search tree described by `config` over `root`.
pub fn search_tree(root: &Path, config: &Config) -> SearchTree {
    SearchTree::new(root)
        .with_dirs(config.search_dirs.clone())
        .with_patterns(config.heuristic_patterns.clone())
}

/// Inject into the entry class `class` under `root`.
///
/// If the entry document can't be found or patched, each of the configured
/// alternative targets is tried in order: the first `.smali` file under the
/// root whose name contains it is patched, whether or not it sits in one of
/// the search partitions. I/O failures are not retried.
pub fn inject_entry(root: &Path, class: &str, config: &Config) -> Result<InjectionReport, Error> {
    let tree = search_tree(root, config);
    let injector = Injector::new().with_window(config.end_method_window);
    let entry = EntryPoint::new(class);
    let mut attempts = Vec::new();

    let primary = match locate(&tree, &entry) {
        Ok(path) => match patch_file(&path, &config.library, &injector) {
            Ok(report) => return Ok(report),
            Err(e) if e.is_structural() => {
                attempts.push(e.to_string());
                Some(path)
            }
            Err(e) => return Err(e),
        },
        Err(e) if e.is_structural() => {
            attempts.push(e.to_string());
            None
        }
        Err(e) => return Err(e),
    };
    warn!("primary injection failed: {}", attempts.join("; "));

    for target in &config.alternative_targets {
        let Some(candidate) = alternative_candidate(&tree, target, primary.as_ref()) else {
            continue;
        };
        info!("using alternative target {}", candidate.display());
        match patch_file(&candidate, &config.library, &injector) {
            Ok(report) => return Ok(report),
            Err(e) if e.is_structural() => {
                warn!("alternative {target} failed: {e}");
                attempts.push(e.to_string());
            }
            Err(e) => return Err(e),
        }
    }

    Err(Error::AllTargetsFailed {
        class: class.to_string(),
        attempts,
    })
}

fn alternative_candidate(
    tree: &SearchTree,
    target: &str,
    skip: Option<&PathBuf>,
) -> Option<PathBuf> {
    tree.all_smali_files().find(|p| {
        Some(p) != skip
            && p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains(target))
    })
}
