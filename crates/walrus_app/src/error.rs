//! Application-level error types.

use std::path::PathBuf;

use walrus_layer::LayerError;
use walrus_task::EngineError;

/// Errors that can stop an application from starting.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    ConfigIo {
        /// The file that was requested.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// No preset exists under the requested name.
    #[error("unknown preset '{0}'")]
    UnknownPreset(String),

    /// The task engine could not be built.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// A layer could not be added to the tree.
    #[error("layer error: {0}")]
    Layer(#[from] LayerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::UnknownPreset("turbo".to_string());
        assert_eq!(err.to_string(), "unknown preset 'turbo'");

        let err = AppError::from(LayerError::UnknownLayer("ghost".to_string()));
        assert!(err.to_string().starts_with("layer error:"));
    }

    #[test]
    fn test_json_error_converts() {
        let parse: Result<u32, _> = serde_json::from_str("not json");
        let err: AppError = parse.unwrap_err().into();
        assert!(matches!(err, AppError::Config(_)));
    }
}
