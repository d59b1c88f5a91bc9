//! `HashiCorp` Vault backend using the KV2 secrets engine.
//!
//! # Example
//!
//! ```no_run
//! use wallet_store_vault::{VaultBackend, VaultConfig, WalletStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = VaultConfig::from_env()?;
//!     let backend = VaultBackend::connect(&config).await?;
//!     let store = WalletStore::new(backend);
//!     println!("{} at {}", store.name(), store.location());
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use tracing::{debug, info};
use vaultrs::client::{Client, VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use crate::backend::{SecretData, SecretsBackend};
use crate::config::{VaultAuth, VaultConfig};
use crate::{Result, StoreError};

/// Vault backend bound to one KV2 mount.
///
/// The session is established once in [`VaultBackend::connect`] and reused
/// by every call; `VaultClient` is safe for concurrent use.
pub struct VaultBackend {
    client: VaultClient,
    address: String,
    mount: String,
}

impl std::fmt::Debug for VaultBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultBackend")
            .field("address", &self.address)
            .field("mount", &self.mount)
            .field("client", &"VaultClient { ... }")
            .finish()
    }
}

impl VaultBackend {
    /// Creates the client and authenticates it.
    ///
    /// With token auth the token is used as-is. With Kubernetes auth the
    /// service account JWT is read from disk and exchanged for a session
    /// token at the configured auth mount.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Configuration` if the configuration is incomplete
    /// or the service account token cannot be read, and `StoreError::Backend`
    /// if the client cannot be created or the login is rejected.
    pub async fn connect(config: &VaultConfig) -> Result<Self> {
        config.validate()?;

        let mut settings = VaultClientSettingsBuilder::default();
        settings.address(&config.address);
        if let VaultAuth::Token { token } = &config.auth {
            settings.token(token);
        }
        let settings = settings.build().map_err(|e| {
            StoreError::Configuration(format!("Failed to build Vault client settings: {e}"))
        })?;

        let mut client = VaultClient::new(settings)
            .map_err(|e| StoreError::Backend(format!("Failed to create Vault client: {e}")))?;

        if let VaultAuth::Kubernetes {
            role,
            service_account_token_path,
            mount_path,
        } = &config.auth
        {
            let jwt = read_service_account_token(service_account_token_path).await?;

            let auth = vaultrs::auth::kubernetes::login(&client, mount_path, role, &jwt)
                .await
                .map_err(|e| {
                    StoreError::Backend(format!(
                        "Kubernetes login with role '{role}' at '{mount_path}' failed: {e}"
                    ))
                })?;
            client.set_token(&auth.client_token);

            info!(role = %role, mount = %mount_path, "Authenticated to Vault via Kubernetes");
        }

        Ok(Self {
            client,
            address: config.address.clone(),
            mount: config.secrets_mount_path.clone(),
        })
    }

    /// The KV2 mount this backend writes to.
    #[must_use]
    pub fn mount(&self) -> &str {
        &self.mount
    }
}

async fn read_service_account_token(path: &std::path::Path) -> Result<String> {
    let jwt = tokio::fs::read_to_string(path).await.map_err(|e| {
        StoreError::Configuration(format!(
            "Failed to read service account token at {}: {e}",
            path.display()
        ))
    })?;

    let jwt = jwt.trim();
    if jwt.is_empty() {
        return Err(StoreError::Configuration(format!(
            "Service account token at {} is empty",
            path.display()
        )));
    }
    Ok(jwt.to_string())
}

fn is_not_found(error: &ClientError) -> bool {
    matches!(error, ClientError::APIError { code: 404, .. })
}

#[async_trait]
impl SecretsBackend for VaultBackend {
    async fn put(&self, path: &str, value: &SecretData) -> Result<()> {
        kv2::set(&self.client, &self.mount, path, value)
            .await
            .map_err(|e| {
                StoreError::Backend(format!("Failed to write secret to Vault at {path}: {e}"))
            })?;

        debug!(path = %path, "Wrote secret");
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<SecretData> {
        match kv2::read::<SecretData>(&self.client, &self.mount, path).await {
            Ok(data) => Ok(data),
            Err(e) if is_not_found(&e) => Err(StoreError::NotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(StoreError::Backend(format!(
                "Failed to read secret from Vault at {path}: {e}"
            ))),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        match kv2::list(&self.client, &self.mount, prefix).await {
            Ok(keys) => Ok(keys),
            // Nothing stored under the prefix yet
            Err(e) if is_not_found(&e) => Ok(Vec::new()),
            Err(e) => Err(StoreError::Backend(format!(
                "Failed to list secrets from Vault at {prefix}: {e}"
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "vault"
    }

    fn location(&self) -> String {
        self.address.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn token_config() -> VaultConfig {
        VaultConfig::new(
            "https://localhost:8200",
            "secret",
            VaultAuth::Token {
                token: "test-token".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_connect_with_token() {
        let backend = VaultBackend::connect(&token_config()).await.unwrap();

        assert_eq!(backend.name(), "vault");
        assert_eq!(backend.location(), "https://localhost:8200");
        assert_eq!(backend.mount(), "secret");
    }

    #[tokio::test]
    async fn test_connect_rejects_incomplete_config() {
        let config = VaultConfig::new(
            "https://localhost:8200",
            "",
            VaultAuth::Token {
                token: "test-token".to_string(),
            },
        );

        let result = VaultBackend::connect(&config).await;
        assert!(matches!(result, Err(StoreError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_kubernetes_missing_token_file() {
        let config = VaultConfig::new(
            "https://localhost:8200",
            "secret",
            VaultAuth::Kubernetes {
                role: "validator".to_string(),
                service_account_token_path: "/nonexistent/serviceaccount/token".into(),
                mount_path: "kubernetes".to_string(),
            },
        );

        let err = VaultBackend::connect(&config).await.unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));
        assert!(err.to_string().contains("/nonexistent/serviceaccount/token"));
    }

    #[tokio::test]
    async fn test_service_account_token_is_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  eyJhbGciOi.test.jwt  ").unwrap();

        let jwt = read_service_account_token(file.path()).await.unwrap();
        assert_eq!(jwt, "eyJhbGciOi.test.jwt");
    }

    #[tokio::test]
    async fn test_empty_service_account_token() {
        let file = tempfile::NamedTempFile::new().unwrap();

        let result = read_service_account_token(file.path()).await;
        assert!(matches!(result, Err(StoreError::Configuration(_))));
    }

    #[test]
    fn test_not_found_detection() {
        let missing = ClientError::APIError {
            code: 404,
            errors: vec![],
        };
        let denied = ClientError::APIError {
            code: 403,
            errors: vec!["permission denied".to_string()],
        };

        assert!(is_not_found(&missing));
        assert!(!is_not_found(&denied));
    }
}
