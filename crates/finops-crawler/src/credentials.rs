//! Credential resolution from a YAML field list and a secret source.
//!
//! The field list names, per platform, the variables that make up its
//! credential set:
//!
//! ```yaml
//! azure:
//!   fields:
//!     - key: AZURE_TENANT_ID
//!     - key: AZURE_CLIENT_ID
//!     - key: AZURE_CLIENT_SECRET
//! ```
//!
//! A field marked `optional: true` is passed through when set and never
//! counts as missing. Values are looked up through a [`SecretSource`], the process environment
//! by default.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::CostProviderError;

/// Field list used when no credentials file is given.
pub const DEFAULT_CREDENTIALS_YAML: &str = r"
aws:
  fields:
    - key: AWS_ACCESS_KEY_ID
    - key: AWS_SECRET_ACCESS_KEY
    - key: AWS_SESSION_TOKEN
      optional: true
azure:
  fields:
    - key: AZURE_TENANT_ID
    - key: AZURE_CLIENT_ID
    - key: AZURE_CLIENT_SECRET
openai:
  fields:
    - key: OPENAI_ORG_ID
    - key: OPENAI_ADMIN_KEY
";

// ============================================================================
// Config file
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct PlatformFields {
    fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Deserialize)]
struct FieldSpec {
    key: String,
    #[serde(default)]
    optional: bool,
}

/// Resolved secrets for one platform, keyed by field name.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials(HashMap<String, String>);

impl Credentials {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Look up a field that resolution guaranteed to be present.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::Config`] if the field list used for
    /// resolution did not include `key`.
    pub fn require(&self, key: &str) -> Result<&str, CostProviderError> {
        self.get(key).ok_or_else(|| {
            CostProviderError::Config(format!("credential field {key} is not configured"))
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.0.keys().collect();
        keys.sort();
        f.debug_struct("Credentials")
            .field("fields", &keys)
            .finish_non_exhaustive()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// ============================================================================
// Secret sources
// ============================================================================

/// Where secret values come from.
pub trait SecretSource: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Reads secrets from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretSource;

impl SecretSource for EnvSecretSource {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl SecretSource for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves the credential set of a platform.
pub trait CredentialsResolver: Send + Sync {
    /// Resolve every field of `platform`.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::UnknownPlatform`] if the platform is not
    /// configured, or [`CostProviderError::MissingCredential`] listing every
    /// absent field.
    fn resolve(&self, platform: &str) -> Result<Credentials, CostProviderError>;

    /// Platforms whose full credential set is present.
    fn list_available_platforms(&self) -> Vec<String>;
}

/// Resolver over a YAML field list and a [`SecretSource`].
pub struct EnvCredentialsResolver<S = EnvSecretSource> {
    platforms: BTreeMap<String, PlatformFields>,
    source: S,
}

impl EnvCredentialsResolver<EnvSecretSource> {
    /// Resolver using the built-in field list and the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::Config`] if the built-in list fails to parse.
    pub fn from_env() -> Result<Self, CostProviderError> {
        Self::from_yaml(DEFAULT_CREDENTIALS_YAML, EnvSecretSource)
    }

    /// Resolver using a field list file and the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, CostProviderError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CostProviderError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text, EnvSecretSource)
    }
}

impl<S: SecretSource> EnvCredentialsResolver<S> {
    /// Resolver over an explicit field list and secret source.
    ///
    /// # Errors
    ///
    /// Returns [`CostProviderError::Config`] if the YAML is malformed.
    pub fn from_yaml(yaml: &str, source: S) -> Result<Self, CostProviderError> {
        let platforms: BTreeMap<String, PlatformFields> = serde_yaml::from_str(yaml)
            .map_err(|e| CostProviderError::Config(format!("invalid credentials config: {e}")))?;
        Ok(Self { platforms, source })
    }
}

impl<S: SecretSource> CredentialsResolver for EnvCredentialsResolver<S> {
    fn resolve(&self, platform: &str) -> Result<Credentials, CostProviderError> {
        let spec = self
            .platforms
            .get(platform)
            .ok_or_else(|| CostProviderError::UnknownPlatform(platform.to_string()))?;

        let mut values = HashMap::new();
        let mut missing = Vec::new();
        for field in &spec.fields {
            match self.source.lookup(&field.key).filter(|v| !v.is_empty()) {
                Some(value) => {
                    values.insert(field.key.clone(), value);
                }
                None if field.optional => {}
                None => missing.push(field.key.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(CostProviderError::MissingCredential {
                platform: platform.to_string(),
                missing,
            });
        }

        debug!(platform, fields = values.len(), "Resolved credentials");
        Ok(Credentials(values))
    }

    fn list_available_platforms(&self) -> Vec<String> {
        self.platforms
            .keys()
            .filter(|platform| self.resolve(platform).is_ok())
            .cloned()
            .collect()
    }
}
