use std::{collections::HashSet, net::SocketAddr, path::Path};

use eyre::Result;

use crate::config::models::{LocationConfig, ServerConfig};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Location conflict detected: {message}")]
    LocationConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration, reporting every problem found
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if let Some(upstream) = &config.upstream
            && let Err(e) = Self::validate_url(upstream, "upstream")
        {
            errors.push(e);
        }

        if let Err(e) = config.upstream_timeout() {
            errors.push(ValidationError::InvalidField {
                field: "upstream_timeout".to_string(),
                message: format!("'{}' is not a duration: {e}", config.upstream_timeout),
            });
        }

        if config.max_body_size == 0 {
            errors.push(ValidationError::InvalidField {
                field: "max_body_size".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        for path in &config.main_rules {
            if let Err(e) = Self::validate_rules_file(path, "main_rules") {
                errors.push(e);
            }
        }

        if config.locations.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "locations".to_string(),
            });
        } else {
            for location in &config.locations {
                errors.extend(Self::validate_location(location));
            }
        }

        errors.extend(Self::check_location_conflicts(&config.locations));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_location(location: &LocationConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let prefix = &location.prefix;

        if !prefix.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("location prefix: {prefix}"),
                message: "Location prefixes must start with '/'".to_string(),
            });
        }

        for path in &location.rules_files {
            if let Err(e) = Self::validate_rules_file(path, &format!("location '{prefix}' rules_files"))
            {
                errors.push(e);
            }
        }

        for (i, directive) in location.directives.iter().enumerate() {
            if directive.trim().is_empty() {
                errors.push(ValidationError::InvalidField {
                    field: format!("location '{prefix}' directive {}", i + 1),
                    message: "Directive cannot be empty".to_string(),
                });
            }
        }

        errors
    }

    fn validate_rules_file(path: &str, context: &str) -> ValidationResult<()> {
        if !Path::new(path).is_file() {
            return Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Rules file '{path}' does not exist"),
            });
        }
        Ok(())
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!("URL scheme must be 'http', got '{}'", url.scheme()),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    fn check_location_conflicts(locations: &[LocationConfig]) -> Vec<ValidationError> {
        let mut seen = HashSet::new();
        locations
            .iter()
            .filter(|location| !seen.insert(location.prefix.as_str()))
            .map(|location| ValidationError::LocationConflict {
                message: format!("prefix '{}' is configured more than once", location.prefix),
            })
            .collect()
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
