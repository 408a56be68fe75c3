//! Error types for the AWQ to GGUF converter.
//!
//! Variants follow the failure classes the host distinguishes: environment
//! problems found before any stage runs, acquisition failures, subprocess
//! failures, and the intentional non-completion of the internal fallback.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the converter.
#[derive(Debug, Error)]
pub enum ConvertError {
    // Environment errors
    #[error("No Python interpreter found (tried: {tried})")]
    InterpreterNotFound { tried: String },

    #[error("Python {required}+ required, found {found}")]
    InterpreterTooOld { found: String, required: String },

    #[error("Missing dependencies: {}", missing.join(", "))]
    MissingDependencies { missing: Vec<String> },

    #[error("Environment provisioning failed for {package}: {message}")]
    ProvisionFailed { package: String, message: String },

    // Acquisition errors
    #[error("Download failed for {repo_id}: {message}")]
    DownloadFailed { repo_id: String, message: String },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    // Subprocess errors
    #[error("Dequantization failed: {message}")]
    DequantizeFailed { message: String },

    #[error("Converter failed: {stderr}")]
    ConverterFailed { stderr: String },

    #[error("Failed to spawn {program}: {message}")]
    SpawnFailed { program: String, message: String },

    // Internal fallback reached
    #[error(
        "Direct GGUF packaging is unavailable without the external converter. \
         Run convert_hf_to_gguf.py from llama.cpp to finish the conversion. \
         FP16 model saved to: {}",
        saved_to.display()
    )]
    FallbackIncomplete { saved_to: PathBuf },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for converter operations.
pub type Result<T> = std::result::Result<T, ConvertError>;

impl From<std::io::Error> for ConvertError {
    fn from(err: std::io::Error) -> Self {
        ConvertError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ConvertError {
    fn from(err: serde_json::Error) -> Self {
        ConvertError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Timeouts land here as `Network` too; callers that know the deadline map
/// them to `Timeout` themselves.
impl From<reqwest::Error> for ConvertError {
    fn from(err: reqwest::Error) -> Self {
        ConvertError::Network {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl ConvertError {
    /// Create an IO error with path context.
    pub fn io(context: &str, path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        ConvertError::Io {
            message: format!("{context}: {err}"),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Process exit status for this failure.
    ///
    /// The host only distinguishes success from failure, so every variant maps
    /// to 1.
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// Text placed into the `error` field of the terminal progress event.
    ///
    /// Subprocess failures carry the child's stderr verbatim.
    pub fn detail(&self) -> String {
        match self {
            ConvertError::ConverterFailed { stderr } => stderr.clone(),
            ConvertError::DequantizeFailed { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the failure was detected before any pipeline stage ran.
    pub fn is_environment(&self) -> bool {
        matches!(
            self,
            ConvertError::InterpreterNotFound { .. }
                | ConvertError::InterpreterTooOld { .. }
                | ConvertError::MissingDependencies { .. }
        )
    }
}

/// Attach path context to `std::io::Result` values.
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| {
            let path = path.into();
            ConvertError::Io {
                message: e.to_string(),
                path: Some(path),
                source: Some(e),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConvertError::MissingDependencies {
            missing: vec!["torch".into(), "autoawq".into()],
        };
        assert_eq!(err.to_string(), "Missing dependencies: torch, autoawq");
    }

    #[test]
    fn test_fallback_message_names_saved_location() {
        let err = ConvertError::FallbackIncomplete {
            saved_to: PathBuf::from("/models/out_fp16"),
        };
        assert!(err.to_string().contains("/models/out_fp16"));
        assert!(err.detail().contains("/models/out_fp16"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_converter_detail_is_stderr_verbatim() {
        let err = ConvertError::ConverterFailed {
            stderr: "KeyError: 'model.layers.0'\n".into(),
        };
        assert_eq!(err.detail(), "KeyError: 'model.layers.0'\n");
    }

    #[test]
    fn test_environment_classification() {
        assert!(ConvertError::InterpreterTooOld {
            found: "3.8.10".into(),
            required: "3.9".into()
        }
        .is_environment());
        assert!(!ConvertError::Timeout(std::time::Duration::from_secs(5)).is_environment());
    }

    #[test]
    fn test_with_path_attaches_context() {
        let res: std::io::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = res.with_path("/tmp/x").unwrap_err();
        match err {
            ConvertError::Io { path, .. } => assert_eq!(path, Some(PathBuf::from("/tmp/x"))),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
