//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MILKMASTER_API_BASE_URL` - Base URL of the MilkMaster REST API
//! - `MILKMASTER_MAIL_ACCESS_KEY` - Access key for the transactional mail
//!   relay used for OTP delivery
//!
//! ## Optional
//! - `MILKMASTER_MAIL_ENDPOINT` - Mail relay submit URL (default:
//!   `https://api.web3forms.com/submit`)
//! - `MILKMASTER_STORAGE_PATH` - Location of the durable key-value file
//!   used by the file storage adapter

use std::collections::HashMap;
use std::path::PathBuf;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Default submit endpoint for the transactional mail relay.
const DEFAULT_MAIL_ENDPOINT: &str = "https://api.web3forms.com/submit";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Checkout client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the MilkMaster REST API, without a trailing slash.
    pub api_base_url: String,
    /// Transactional mail relay configuration for OTP delivery.
    pub mail: MailRelayConfig,
    /// Optional location of the durable key-value storage file.
    pub storage_path: Option<PathBuf>,
}

/// Transactional mail relay configuration.
///
/// Implements `Debug` manually to redact the access key.
#[derive(Clone)]
pub struct MailRelayConfig {
    /// Submit URL of the relay.
    pub endpoint: String,
    /// API access key sent with every message.
    pub access_key: SecretString,
}

impl std::fmt::Debug for MailRelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailRelayConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key", &"[REDACTED]")
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the mail access key fails validation (placeholder detection,
    /// entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base_url = get_required_env("MILKMASTER_API_BASE_URL")?;
        let api_base_url = validate_base_url("MILKMASTER_API_BASE_URL", &api_base_url)?;

        let mail = MailRelayConfig::from_env()?;
        let storage_path = get_optional_env("MILKMASTER_STORAGE_PATH").map(PathBuf::from);

        Ok(Self {
            api_base_url,
            mail,
            storage_path,
        })
    }
}

impl MailRelayConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: get_env_or_default("MILKMASTER_MAIL_ENDPOINT", DEFAULT_MAIL_ENDPOINT),
            access_key: get_validated_secret("MILKMASTER_MAIL_ACCESS_KEY")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse-validate a base URL and normalize away any trailing slash.
fn validate_base_url(var_name: &str, value: &str) -> Result<String, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            "URL must have a host".to_string(),
        ));
    }
    Ok(value.trim_end_matches('/').to_string())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real access keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key issued by the mail relay."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        // "ab" has entropy of 1 bit per char (50% a, 50% b)
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_shannon_entropy_high() {
        // Random-looking string should have high entropy
        let entropy = shannon_entropy("aB3$xY9!mK2@nL5#");
        assert!(entropy > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-access-key-here", "TEST_VAR");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_changeme() {
        let result = validate_secret_strength("changeme123", "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        // UUID-shaped access key like the relay issues
        let result = validate_secret_strength("59514737-8b60-43af-b7c4-376df900c936", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_base_url_accepts_http() {
        let url = validate_base_url("TEST_URL", "http://localhost:5000/").unwrap();
        assert_eq!(url, "http://localhost:5000");
    }

    #[test]
    fn test_validate_base_url_rejects_garbage() {
        assert!(validate_base_url("TEST_URL", "not a url").is_err());
    }

    #[test]
    fn test_mail_config_debug_redacts_access_key() {
        let config = MailRelayConfig {
            endpoint: DEFAULT_MAIL_ENDPOINT.to_string(),
            access_key: SecretString::from("59514737-8b60-43af-b7c4-376df900c936"),
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains(DEFAULT_MAIL_ENDPOINT));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("59514737"));
    }
}
