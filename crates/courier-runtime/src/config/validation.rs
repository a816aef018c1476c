//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{CourierConfig, LogOutput, LoggingConfig};

const BROKER_SCHEMES: [&str; 3] = ["amqp", "amqps", "memory"];

/// Validates the entire configuration.
pub fn validate_config(config: &CourierConfig) -> ConfigResult<()> {
    validate_url(&config.connection.url)?;

    if let Some(name) = &config.connection.service_name
        && name.chars().any(char::is_whitespace)
    {
        return Err(ConfigError::validation(format!(
            "Service name must not contain whitespace: '{name}'"
        )));
    }

    validate_logging(&config.logging)
}

fn validate_url(url: &str) -> ConfigResult<()> {
    let Some((scheme, rest)) = url.split_once("://") else {
        return Err(ConfigError::invalid_url(url, "missing scheme"));
    };
    if !BROKER_SCHEMES.contains(&scheme) {
        return Err(ConfigError::invalid_url(
            url,
            format!("unsupported scheme '{scheme}', expected one of {BROKER_SCHEMES:?}"),
        ));
    }
    if rest.is_empty() {
        return Err(ConfigError::invalid_url(url, "missing host"));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "File log output requires logging.file_path",
        ));
    }
    if logging.max_files == 0 {
        return Err(ConfigError::validation("logging.max_files must be at least 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&CourierConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_urls() {
        let mut config = CourierConfig::default();

        config.connection.url = "localhost:5672".into();
        assert!(matches!(validate_config(&config), Err(ConfigError::InvalidUrl { .. })));

        config.connection.url = "http://localhost".into();
        assert!(matches!(validate_config(&config), Err(ConfigError::InvalidUrl { .. })));

        config.connection.url = "amqp://".into();
        assert!(matches!(validate_config(&config), Err(ConfigError::InvalidUrl { .. })));

        config.connection.url = "amqps://broker:5671/vhost".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = CourierConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        config.logging.file_path = Some("courier.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
