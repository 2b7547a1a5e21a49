use std::path::PathBuf;

/// Why a `run`, `run_source` or `evaluate` call failed.
///
/// Every variant is also written to the engine's diagnostic buffer, so
/// `last_error()` is never empty after a failure.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no *.msproj manifest found in {}", dir.display())]
    NoManifestFound { dir: PathBuf },

    #[error("invalid project manifest {}: {message}", path.display())]
    ManifestInvalid { path: PathBuf, message: String },

    #[error("source file listed in the manifest does not exist: {}", path.display())]
    SourceFileMissing { path: PathBuf },

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("compilation failed with {errors} error(s)")]
    CompilationFailed { errors: usize },

    #[error("entry point {0} is not declared")]
    EntryPointMissing(String),

    #[error("script faulted: {0}")]
    InvocationFault(String),

    #[error("{operation} is not available in {mode} mode")]
    WrongMode {
        operation: &'static str,
        mode: &'static str,
    },
}

/// Reading or writing the loader settings file failed.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_path() {
        let e = EngineError::SourceFileMissing {
            path: PathBuf::from("proj/b.ms"),
        };
        assert_eq!(
            e.to_string(),
            "source file listed in the manifest does not exist: proj/b.ms"
        );
        let e = EngineError::WrongMode {
            operation: "evaluate",
            mode: "project",
        };
        assert_eq!(e.to_string(), "evaluate is not available in project mode");
    }
}
