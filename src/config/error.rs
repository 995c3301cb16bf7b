//! Configuration Error Types
//!
//! Errors raised while loading configuration sources and while validating a
//! schema's backend composition during setup. None of these can occur once a
//! schema has been built.

use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// No primary backend named for a schema
    #[error("Schema '{schema}' requires a primary backend")]
    MissingPrimary { schema: String },

    /// Primary names a backend that was never registered
    #[error("Primary backend '{primary}' is not registered for schema '{schema}'")]
    UnknownPrimary { schema: String, primary: String },

    /// Secondary names a backend that was never registered
    #[error("Secondary backend '{secondary}' is not registered for schema '{schema}'")]
    UnknownSecondary { schema: String, secondary: String },

    /// Primary and secondary resolve to the same backend
    #[error("Schema '{schema}' uses '{backend}' as both primary and secondary")]
    PrimaryEqualsSecondary { schema: String, backend: String },

    /// A schema was requested that has no configuration entry
    #[error("No configuration entry for schema '{schema}'")]
    UnknownSchema { schema: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// Failure reading or deserializing configuration sources
    #[error("Failed to load configuration: {error}")]
    Load { error: String },
}

impl ConfigurationError {
    pub fn missing_primary(schema: impl Into<String>) -> Self {
        Self::MissingPrimary {
            schema: schema.into(),
        }
    }

    pub fn unknown_primary(schema: impl Into<String>, primary: impl Into<String>) -> Self {
        Self::UnknownPrimary {
            schema: schema.into(),
            primary: primary.into(),
        }
    }

    pub fn unknown_secondary(schema: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self::UnknownSecondary {
            schema: schema.into(),
            secondary: secondary.into(),
        }
    }

    pub fn primary_equals_secondary(schema: impl Into<String>, backend: impl Into<String>) -> Self {
        Self::PrimaryEqualsSecondary {
            schema: schema.into(),
            backend: backend.into(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        Self::Load {
            error: err.to_string(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
