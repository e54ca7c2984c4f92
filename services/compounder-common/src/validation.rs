//! Configuration validation.
//!
//! Rejects configurations that would make a run meaningless before any
//! network traffic happens.

use thiserror::Error;

use crate::config::{CacheConfig, MAX_TTL_DAYS, Config, FetchConfig, FilterConfig, ObservabilityConfig, ScreenerConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            self.observability.validate(),
            self.screener.validate(),
            self.filters.validate(),
            self.cache.validate(),
            self.fetch.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(invalid(
                "observability.log_level",
                format!("'{}' is not one of {:?}", self.log_level, LEVELS),
            ));
        }
        if self.log_format != "json" && self.log_format != "pretty" {
            return Err(invalid(
                "observability.log_format",
                format!("'{}' must be 'json' or 'pretty'", self.log_format),
            ));
        }
        Ok(())
    }
}

impl Validate for ScreenerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.concurrency == 0 {
            return Err(invalid("screener.concurrency", "must be at least 1"));
        }
        if self.top_n == 0 {
            return Err(invalid("screener.top_n", "must be at least 1"));
        }
        if self.market.trim().is_empty() && self.tickers.is_none() {
            return Err(ValidationError::MissingField {
                field: "screener.market".into(),
            });
        }
        Ok(())
    }
}

impl Validate for FilterConfig {
    fn validate(&self) -> ValidationResult<()> {
        for (field, value) in [
            ("filters.min_roic", self.min_roic),
            ("filters.min_operating_margin", self.min_operating_margin),
            ("filters.min_buyback", self.min_buyback),
        ] {
            if !value.is_finite() {
                return Err(invalid(field, "must be a finite number"));
            }
            if value < 0.0 {
                return Err(invalid(field, "must not be negative"));
            }
        }
        Ok(())
    }
}

impl Validate for CacheConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(ValidationError::MissingField {
                field: "cache.path".into(),
            });
        }
        if self.ttl_days < 0 {
            return Err(invalid("cache.ttl_days", "must not be negative"));
        }
        if self.ttl_days > MAX_TTL_DAYS {
            return Err(invalid(
                "cache.ttl_days",
                format!("must be at most {} days", MAX_TTL_DAYS),
            ));
        }
        Ok(())
    }
}

impl Validate for FetchConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.request_timeout_secs == 0 {
            return Err(invalid("fetch.request_timeout_secs", "must be at least 1"));
        }
        if self.history_years == 0 {
            return Err(invalid("fetch.history_years", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default();
        config.screener.concurrency = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("screener.concurrency"));
    }

    #[test]
    fn test_multiple_errors_collected() {
        let mut config = Config::default();
        config.observability.log_format = "xml".into();
        config.cache.path = PathBuf::new();
        config.filters.min_roic = f64::NAN;

        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_huge_ttl_rejected() {
        let mut config = Config::default();
        config.cache.ttl_days = 1_000_000_000_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache.ttl_days"));

        config.cache.ttl_days = MAX_TTL_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let mut config = Config::default();
        config.filters.min_operating_margin = -5.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("filters.min_operating_margin"));
    }
}
