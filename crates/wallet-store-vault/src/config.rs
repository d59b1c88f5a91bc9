//! Connection and authentication settings for the Vault backend.
//!
//! # Environment Variables
//!
//! - `VAULT_ADDR` - Vault server address (required)
//! - `VAULT_AUTH` - `token` or `kubernetes` (required)
//! - `VAULT_TOKEN` - static token (required for `token` auth)
//! - `VAULT_K8S_AUTH_ROLE` - Vault role (required for `kubernetes` auth)
//! - `VAULT_K8S_AUTH_SA_TOKEN_PATH` - service account JWT location
//! - `VAULT_K8S_AUTH_MOUNT_PATH` - Kubernetes auth method mount (default: "kubernetes")
//! - `VAULT_SECRETS_MOUNT_PATH` - KV2 secrets engine mount path (required)
//! - `WALLET_STORE_PASSPHRASE` - optional encryption passphrase

use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;

use crate::{Result, StoreError};

const ENV_VAULT_ADDR: &str = "VAULT_ADDR";
const ENV_VAULT_AUTH: &str = "VAULT_AUTH";
const ENV_VAULT_TOKEN: &str = "VAULT_TOKEN";
const ENV_K8S_ROLE: &str = "VAULT_K8S_AUTH_ROLE";
const ENV_K8S_TOKEN_PATH: &str = "VAULT_K8S_AUTH_SA_TOKEN_PATH";
const ENV_K8S_MOUNT_PATH: &str = "VAULT_K8S_AUTH_MOUNT_PATH";
const ENV_SECRETS_MOUNT: &str = "VAULT_SECRETS_MOUNT_PATH";
const ENV_PASSPHRASE: &str = "WALLET_STORE_PASSPHRASE";

/// Vault connection configuration.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct VaultConfig {
    /// Vault server address, e.g. `https://vault.example.com:8200`
    pub address: String,

    /// Mount path of the KV2 secrets engine holding the wallets
    pub secrets_mount_path: String,

    /// How the session token is obtained
    pub auth: VaultAuth,
}

/// Session authentication mode.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum VaultAuth {
    /// Pre-shared static token
    Token { token: String },

    /// Workload identity exchange through the Kubernetes auth method
    Kubernetes {
        role: String,

        #[serde(default = "default_sa_token_path")]
        service_account_token_path: PathBuf,

        #[serde(default = "default_k8s_mount_path")]
        mount_path: String,
    },
}

fn default_sa_token_path() -> PathBuf {
    PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/token")
}

fn default_k8s_mount_path() -> String {
    "kubernetes".to_string()
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("address", &self.address)
            .field("secrets_mount_path", &self.secrets_mount_path)
            .field("auth", &self.auth)
            .finish()
    }
}

impl std::fmt::Debug for VaultAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token { .. } => f
                .debug_struct("Token")
                .field("token", &"[REDACTED]")
                .finish(),
            Self::Kubernetes {
                role,
                service_account_token_path,
                mount_path,
            } => f
                .debug_struct("Kubernetes")
                .field("role", role)
                .field("service_account_token_path", service_account_token_path)
                .field("mount_path", mount_path)
                .finish(),
        }
    }
}

impl VaultAuth {
    /// Kubernetes auth with the default token path and mount.
    pub fn kubernetes(role: impl Into<String>) -> Self {
        Self::Kubernetes {
            role: role.into(),
            service_account_token_path: default_sa_token_path(),
            mount_path: default_k8s_mount_path(),
        }
    }
}

impl VaultConfig {
    pub fn new(
        address: impl Into<String>,
        secrets_mount_path: impl Into<String>,
        auth: VaultAuth,
    ) -> Self {
        Self {
            address: address.into(),
            secrets_mount_path: secrets_mount_path.into(),
            auth,
        }
    }

    /// Checks that every parameter the chosen auth mode needs is present.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Configuration` naming the first missing parameter.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(missing("vault address"));
        }
        if self.secrets_mount_path.trim().is_empty() {
            return Err(missing("vault secrets mount path"));
        }

        match &self.auth {
            VaultAuth::Token { token } if token.is_empty() => Err(missing("vault token")),
            VaultAuth::Kubernetes { role, .. } if role.is_empty() => {
                Err(missing("vault kubernetes auth role"))
            }
            VaultAuth::Kubernetes { mount_path, .. } if mount_path.is_empty() => {
                Err(missing("vault kubernetes auth mount path"))
            }
            _ => Ok(()),
        }
    }

    /// Reads the configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Configuration` if a required variable is missing
    /// or `VAULT_AUTH` names an unknown mode.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    StoreError::Configuration(format!(
                        "Missing required environment variable: {name}"
                    ))
                })
        };

        let address = required(ENV_VAULT_ADDR)?;
        let secrets_mount_path = required(ENV_SECRETS_MOUNT)?;

        let auth = match required(ENV_VAULT_AUTH)?.as_str() {
            "token" => VaultAuth::Token {
                token: required(ENV_VAULT_TOKEN)?,
            },
            "kubernetes" => VaultAuth::Kubernetes {
                role: required(ENV_K8S_ROLE)?,
                service_account_token_path: lookup(ENV_K8S_TOKEN_PATH)
                    .map_or_else(default_sa_token_path, PathBuf::from),
                mount_path: lookup(ENV_K8S_MOUNT_PATH).unwrap_or_else(default_k8s_mount_path),
            },
            other => {
                return Err(StoreError::Configuration(format!(
                    "Unsupported {ENV_VAULT_AUTH} value '{other}', expected 'token' or 'kubernetes'"
                )))
            }
        };

        let config = Self {
            address,
            secrets_mount_path,
            auth,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Reads the optional store passphrase from `WALLET_STORE_PASSPHRASE`.
#[must_use]
pub fn passphrase_from_env() -> Option<SecretString> {
    std::env::var(ENV_PASSPHRASE)
        .ok()
        .filter(|p| !p.is_empty())
        .map(SecretString::from)
}

fn missing(what: &str) -> StoreError {
    StoreError::Configuration(format!("{what} option missing"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_token_config_from_env() {
        let config = VaultConfig::from_lookup(lookup_from(&[
            (ENV_VAULT_ADDR, "http://localhost:8200"),
            (ENV_VAULT_AUTH, "token"),
            (ENV_VAULT_TOKEN, "golang-test"),
            (ENV_SECRETS_MOUNT, "secret"),
        ]))
        .unwrap();

        assert_eq!(config.address, "http://localhost:8200");
        assert_eq!(config.secrets_mount_path, "secret");
        assert_eq!(
            config.auth,
            VaultAuth::Token {
                token: "golang-test".to_string()
            }
        );
    }

    #[test]
    fn test_kubernetes_config_defaults() {
        let config = VaultConfig::from_lookup(lookup_from(&[
            (ENV_VAULT_ADDR, "https://vault:8200"),
            (ENV_VAULT_AUTH, "kubernetes"),
            (ENV_K8S_ROLE, "validator"),
            (ENV_SECRETS_MOUNT, "eth2"),
        ]))
        .unwrap();

        assert_eq!(config.auth, VaultAuth::kubernetes("validator"));
    }

    #[test]
    fn test_missing_address() {
        let err = VaultConfig::from_lookup(lookup_from(&[
            (ENV_VAULT_AUTH, "token"),
            (ENV_VAULT_TOKEN, "t"),
            (ENV_SECRETS_MOUNT, "secret"),
        ]))
        .unwrap_err();

        assert!(matches!(err, StoreError::Configuration(_)));
        assert!(err.to_string().contains(ENV_VAULT_ADDR));
    }

    #[test]
    fn test_missing_token_for_token_auth() {
        let err = VaultConfig::from_lookup(lookup_from(&[
            (ENV_VAULT_ADDR, "http://localhost:8200"),
            (ENV_VAULT_AUTH, "token"),
            (ENV_SECRETS_MOUNT, "secret"),
        ]))
        .unwrap_err();

        assert!(err.to_string().contains(ENV_VAULT_TOKEN));
    }

    #[test]
    fn test_unknown_auth_mode() {
        let err = VaultConfig::from_lookup(lookup_from(&[
            (ENV_VAULT_ADDR, "http://localhost:8200"),
            (ENV_VAULT_AUTH, "ldap"),
            (ENV_SECRETS_MOUNT, "secret"),
        ]))
        .unwrap_err();

        assert!(err.to_string().contains("ldap"));
    }

    #[test]
    fn test_validate() {
        let token = VaultAuth::Token {
            token: "t".to_string(),
        };

        assert!(VaultConfig::new("http://localhost:8200", "secret", token.clone())
            .validate()
            .is_ok());

        let err = VaultConfig::new("", "secret", token.clone())
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("vault address"));

        let err = VaultConfig::new("http://localhost:8200", "", token)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("secrets mount path"));

        let err = VaultConfig::new("http://localhost:8200", "secret", VaultAuth::kubernetes(""))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("role"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: VaultConfig = serde_json::from_str(
            r#"{
                "address": "https://vault:8200",
                "secrets_mount_path": "secret",
                "auth": { "method": "kubernetes", "role": "signer" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.auth, VaultAuth::kubernetes("signer"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = VaultConfig::new(
            "http://localhost:8200",
            "secret",
            VaultAuth::Token {
                token: "hvs.very-secret".to_string(),
            },
        );

        let debug = format!("{config:?}");
        assert!(!debug.contains("hvs.very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
