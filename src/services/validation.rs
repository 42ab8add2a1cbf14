//! Explicit request validation.
//!
//! Each request type implements [`Validate`] by running its fields through a
//! [`Checks`] collector, which gathers every failure instead of stopping at
//! the first so the user sees all of them at once.

use crate::error::{FieldError, ValidationError};

/// Maximum length of any project, environment or secret name.
pub const MAX_NAME_LEN: usize = 256;

/// Maximum length of a sealed secret value as sent on the wire.
pub const MAX_VALUE_LEN: usize = 64 * 1024;

/// A request that can check its own fields.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Collector of field errors.
#[derive(Debug, Default)]
pub struct Checks {
    fields: Vec<FieldError>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    /// A name: required, at most [`MAX_NAME_LEN`] characters, no whitespace.
    pub fn name(self, label: &'static str, value: &str) -> Self {
        self.token(label, value, MAX_NAME_LEN)
    }

    /// A secret key: a name that also never contains `=`, since listings
    /// render secrets as `KEY=value` lines.
    pub fn secret_key(mut self, label: &'static str, value: &str) -> Self {
        let before = self.fields.len();
        self = self.name(label, value);
        if self.fields.len() == before && value.contains('=') {
            self.fields.push(FieldError {
                field: label,
                message: "must not contain '='".to_string(),
            });
        }
        self
    }

    /// A sealed value: required, bounded, no whitespace.
    pub fn sealed_value(self, label: &'static str, value: &str) -> Self {
        self.token(label, value, MAX_VALUE_LEN)
    }

    fn token(mut self, label: &'static str, value: &str, max: usize) -> Self {
        let message = if value.is_empty() {
            Some("is required".to_string())
        } else if value.chars().count() > max {
            Some(format!("must be at most {} characters", max))
        } else if value.chars().any(char::is_whitespace) {
            Some("must not contain whitespace".to_string())
        } else {
            None
        };

        if let Some(message) = message {
            self.fields.push(FieldError {
                field: label,
                message,
            });
        }
        self
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.fields.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                fields: self.fields,
            })
        }
    }
}
