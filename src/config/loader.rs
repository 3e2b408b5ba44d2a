//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::{FileConfig, GatewayConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
    /// A certificate or key file named by the config could not be read.
    Pem { path: PathBuf, source: std::io::Error },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
            ConfigError::Pem { path, source } => {
                write!(f, "Cannot read {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<FileConfig, ConfigError> {
    let config: FileConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Read the PEM files named by `config` and build the gateway configuration.
///
/// Relative paths are resolved against `base`, normally the config file's directory.
pub fn read_gateway_config(config: FileConfig, base: &Path) -> Result<GatewayConfig, ConfigError> {
    let cert_pem = read_pem(&base.join(&config.tls.cert_path))?;
    let key_pem = read_pem(&base.join(&config.tls.key_path))?;
    Ok(config.into_gateway_config(cert_pem, key_pem))
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ConfigError> {
    fs::read(path).map_err(|source| ConfigError::Pem {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_values_fail_with_all_reasons() {
        let err = parse_config("[listener]\nport = 0\n[gateway]\nmetrics_path = \"m\"\n").unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        assert!(matches!(parse_config("[listener"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn reads_pem_files_relative_to_base() {
        let mut config = parse_config("").unwrap();
        config.tls.cert_path = "cert_localhost.pem".into();
        config.tls.key_path = "key_localhost.pem".into();

        let base = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
        let gateway = read_gateway_config(config, &base).unwrap();
        assert!(gateway.cert_pem.starts_with(b"-----BEGIN CERTIFICATE-----"));
        assert!(!gateway.key_pem.is_empty());
    }

    #[test]
    fn missing_pem_names_the_file() {
        let config = parse_config("").unwrap();
        let err = read_gateway_config(config, Path::new("/nonexistent")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cert.pem"), "{err}");
    }
}
