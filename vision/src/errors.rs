use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by an [`ActionDispatcher`](crate::dispatcher::ActionDispatcher) backend.
#[derive(Error, Debug, Clone)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Element is detached from DOM: {0}")]
    ElementDetached(String),

    #[error("Element is not visible: {0}")]
    ElementNotVisible(String),

    #[error("Element is not enabled: {0}")]
    ElementNotEnabled(String),
}

/// Failures of the noun resolution engine.
#[derive(Error, Debug, Clone)]
pub enum ResolutionError {
    #[error("Could not find {0}")]
    NotFound(String),

    #[error("Found {count} matches for {description}; use an ordinal or before/after to pick one")]
    Ambiguous { description: String, count: usize },

    #[error("Timed out after {waited:?} waiting for {description}")]
    Timeout { waited: Duration, description: String },

    #[error("Context {0:?} is not defined")]
    UndefinedContext(String),
}

#[derive(Error, Debug, Clone)]
pub enum VisionError {
    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Line {line}: {message}")]
    StructuralIndent { line: usize, message: String },

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("An alert is open, so {0} cannot be used until the alert is accepted or dismissed")]
    AlertBlocking(String),

    #[error("The file literal <{name}> does not exist at {}", path.display())]
    FileLiteralMissing { name: String, path: PathBuf },

    #[error("The requirement is already met: {0}")]
    RequireConflict(String),

    #[error("{0}")]
    AssertionFailed(String),

    #[error(transparent)]
    Automation(#[from] AutomationError),

    #[error("Script error: {0}")]
    Script(String),

    #[error("{0}")]
    InvalidCommand(String),

    #[error("The session has ended")]
    SessionClosed,
}

impl VisionError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        VisionError::Parse {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn indent(line: usize, message: impl Into<String>) -> Self {
        VisionError::StructuralIndent {
            line,
            message: message.into(),
        }
    }

    /// Parse and indentation errors reject a line before it is buffered.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            VisionError::Parse { .. } | VisionError::StructuralIndent { .. }
        )
    }
}

impl From<std::io::Error> for VisionError {
    fn from(e: std::io::Error) -> Self {
        VisionError::Script(e.to_string())
    }
}
