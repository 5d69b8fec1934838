use std::error::Error;

/// Boxed error returned by external collaborators (exception reporter,
/// package metadata source).
pub type BoxError = Box<dyn Error + Send + Sync>;

/// The message template could not be combined with its arguments.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to format log message: {message}")]
pub struct FormatError {
    message: String,
}

impl FormatError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A value in the assembled record has no JSON-safe rendering.
///
/// `path` is the dotted location of the offending value inside the record,
/// e.g. `settings.DATABASES[0]`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("value at `{path}` is not JSON serializable: {reason}")]
pub struct SerializationError {
    path: String,
    reason: String,
}

impl SerializationError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { path: path.into(), reason: reason.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Error returned by [`RecordSanitizer::format`](crate::formatter::RecordSanitizer::format).
#[derive(thiserror::Error, Debug)]
pub enum SanitizeError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

/// Invalid formatter or layer configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnv { var: &'static str, reason: String },

    #[error("invalid date format pattern `{0}`")]
    InvalidDateFormat(String),
}

/// Error returned when installing the global subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to set global subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}
