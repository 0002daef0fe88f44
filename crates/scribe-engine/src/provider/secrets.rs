//! Secure credential handling for the completion endpoint.
//!
//! The API key is the only secret this crate touches. Wrapping it in
//! [`ApiCredential`] ensures:
//!
//! - **No accidental logging**: the key cannot appear in Debug output
//! - **Memory safety**: the key is zeroed on drop via `secrecy`
//! - **Explicit exposure**: the raw value is only reachable via `.expose()`

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
///
/// Useful when debugging configuration issues without exposing the
/// credential value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Loaded from an environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely-stored API credential.
///
/// The raw value is wrapped in [`SecretString`] at construction and can
/// only be read back through [`ApiCredential::expose`], at the point the
/// HTTP authorization header is built.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    /// Create a new credential from a string value.
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load a credential from an environment variable.
    ///
    /// # Arguments
    /// * `env_var` - Name of the environment variable
    /// * `name` - Human-readable name for error messages (e.g., "OpenAI API key")
    pub fn from_env(env_var: &str, name: &'static str) -> Result<Self, ProviderError> {
        std::env::var(env_var)
            .map(|v| Self::new(v, CredentialSource::Environment, name))
            .map_err(|_| {
                ProviderError::NotConfigured(format!(
                    "{} not set: configure '{}' environment variable",
                    name, env_var
                ))
            })
    }

    /// Expose the raw credential value.
    ///
    /// Call this only at the point of use (building a request header).
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    /// Whether the credential is an empty string.
    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    /// Where this credential was loaded from.
    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_redacted_in_debug() {
        let secret = "sk-super-secret-key-12345";
        let cred = ApiCredential::new(secret, CredentialSource::Programmatic, "test key");

        let debug_output = format!("{:?}", cred);
        assert!(
            !debug_output.contains(secret),
            "credential was exposed in Debug output!"
        );
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_credential_expose() {
        let cred = ApiCredential::new("sk-abc", CredentialSource::Programmatic, "test key");
        assert_eq!(cred.expose(), "sk-abc");
        assert!(!cred.is_empty());

        let empty = ApiCredential::new("", CredentialSource::Programmatic, "test key");
        assert!(empty.is_empty());
    }

    #[test]
    fn test_from_env_missing() {
        let result = ApiCredential::from_env("SCRIBE_TEST_KEY_THAT_DOES_NOT_EXIST", "test key");
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
    }

    #[test]
    fn test_source_is_tracked() {
        let cred = ApiCredential::new("k", CredentialSource::Programmatic, "test key");
        assert_eq!(cred.source(), CredentialSource::Programmatic);
        assert_eq!(cred.source().to_string(), "programmatic");
    }
}
