//! Error types for the compounder screener.

use thiserror::Error;

/// Result type alias using the shared error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Shared error type for universe and storage failures.
///
/// Per-ticker fetch failures never surface here; they are logged and the
/// ticker is skipped.
#[derive(Error, Debug)]
pub enum Error {
    /// Ticker universe could not be resolved
    #[error("Universe error: {0}")]
    Universe(String),

    /// Snapshot storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this error means the ticker universe is unavailable.
    pub fn is_universe(&self) -> bool {
        match self {
            Self::Universe(_) => true,
            Self::WithContext { source, .. } => source.is_universe(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_context() {
        let err = Error::Universe("no tickers for market xx".into());
        let with_ctx = err.with_context("resolving universe");
        assert!(matches!(with_ctx, Error::WithContext { .. }));
        assert!(with_ctx.is_universe());
        assert!(with_ctx.to_string().starts_with("resolving universe: "));
    }

    #[test]
    fn test_result_ext_adds_context() {
        let res: Result<()> = Err(Error::Storage("database is locked".into()));
        let err = res.context("writing snapshot").unwrap_err();
        assert!(!err.is_universe());
        assert_eq!(err.to_string(), "writing snapshot: Storage error: database is locked");
    }
}
