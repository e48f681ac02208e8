use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("couldn't find smali containing entrypoint ({class})")]
    NotFound { class: String },

    #[error("no `# direct methods` marker in {} -- cannot determine where to inject", path.display())]
    NoAnchor { path: PathBuf },

    #[error("failed to determine injection point in {}", path.display())]
    UnresolvedInjectionPoint { path: PathBuf },

    #[error("malformed method in {}: {reason}", path.display())]
    MalformedMethod { path: PathBuf, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {reason}", path.display())]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("all injection targets failed for {class}: {}", attempts.join("; "))]
    AllTargetsFailed { class: String, attempts: Vec<String> },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Structural failures abort the current document; the caller may try
    /// another candidate.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. }
                | Error::NoAnchor { .. }
                | Error::UnresolvedInjectionPoint { .. }
                | Error::MalformedMethod { .. }
        )
    }
}
