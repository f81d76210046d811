use crate::state::LifecycleState;
use camino::Utf8PathBuf;
use std::fmt;
use thiserror::Error;

/// Kind of collaborator named in a config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollaboratorKind {
    Runtime,
    Publisher,
    Plugin,
}

impl fmt::Display for CollaboratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CollaboratorKind::Runtime => "runtime",
            CollaboratorKind::Publisher => "publisher",
            CollaboratorKind::Plugin => "plugin",
        })
    }
}

/// Errors that end a generation run.
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("config validation failed: {0}")]
    ConfigValidation(String),

    #[error("failed to load {kind} '{name}': {reason}")]
    CollaboratorLoad {
        kind: CollaboratorKind,
        name: String,
        reason: String,
    },

    #[error("lifecycle already terminated")]
    Terminated,

    #[error("invalid lifecycle transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
}

impl GenerateError {
    pub fn validation(message: impl Into<String>) -> Self {
        GenerateError::ConfigValidation(message.into())
    }
}

/// A single file (or virtual fragment) failed to parse.
#[derive(Error, Debug)]
#[error("failed to parse {path}")]
pub struct FileParseError {
    pub path: Utf8PathBuf,

    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl FileParseError {
    pub fn new(path: impl Into<Utf8PathBuf>, source: anyhow::Error) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }
}

/// Context attached to failures raised inside a named collaborator so the
/// error handler can attribute them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorFailure {
    pub module: String,
    pub stage: &'static str,
}

impl CollaboratorFailure {
    pub fn new(module: impl Into<String>, stage: &'static str) -> Self {
        Self {
            module: module.into(),
            stage,
        }
    }

    /// Modules published as part of TJSDoc itself.
    pub fn is_builtin(&self) -> bool {
        self.module.starts_with("tjsdoc")
    }
}

impl fmt::Display for CollaboratorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' failed during {}", self.module, self.stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_collaborator_failure_downcast_through_context() {
        let err = Err::<(), _>(anyhow::anyhow!("boom"))
            .context(CollaboratorFailure::new("tjsdoc-publisher-json", "publish"))
            .context("publishing")
            .unwrap_err();

        let failure = err.downcast_ref::<CollaboratorFailure>().unwrap();
        assert_eq!(failure.module, "tjsdoc-publisher-json");
        assert!(failure.is_builtin());
    }

    #[test]
    fn test_file_parse_error_keeps_source() {
        let err = FileParseError::new("src/a.js", anyhow::anyhow!("unexpected token"));
        assert_eq!(err.to_string(), "failed to parse src/a.js");
        assert_eq!(
            std::error::Error::source(&err).map(ToString::to_string),
            Some("unexpected token".to_string())
        );
    }
}
