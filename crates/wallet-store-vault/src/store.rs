//! Wallet, account and index persistence.
//!
//! Payloads are opaque bytes chosen by the caller. Two operations rely on a
//! JSON payload shape:
//!
//! - [`WalletStore::retrieve_wallet`] and [`WalletStore::retrieve_wallet_by_id`]
//!   match wallet payloads on their `name` / `uuid` fields.
//! - [`WalletStore::store_account`] checks the `uuid` field of both the
//!   incoming payload and the account already stored in the target slot.
//!   Payloads that are not JSON at all carry no identity and are not checked.

use std::sync::Arc;

use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::backend::SecretsBackend;
use crate::codec::Codec;
use crate::enumerator::{enumerate, Listing, PayloadStream};
use crate::{paths, Result, StoreError};

#[derive(Deserialize)]
struct NamedPayload {
    name: String,
}

/// Identity a payload claims through its `uuid` field.
#[derive(Debug, PartialEq, Eq)]
enum Claim {
    /// Not JSON; nothing to compare.
    Opaque,
    /// JSON whose `uuid` names the expected entity.
    Matches,
    /// JSON with a missing, non-string or different `uuid`.
    Mismatch,
}

fn claim(payload: &[u8], id: Uuid) -> Claim {
    let Ok(value) = serde_json::from_slice::<Value>(payload) else {
        return Claim::Opaque;
    };

    match value.get("uuid").and_then(Value::as_str).map(Uuid::parse_str) {
        Some(Ok(claimed)) if claimed == id => Claim::Matches,
        _ => Claim::Mismatch,
    }
}

/// Wallet store over a secrets backend.
///
/// Cloning is cheap and clones share the backend session.
pub struct WalletStore<B: SecretsBackend> {
    backend: Arc<B>,
    codec: Arc<Codec>,
}

impl<B: SecretsBackend> Clone for WalletStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            codec: Arc::clone(&self.codec),
        }
    }
}

impl<B: SecretsBackend> std::fmt::Debug for WalletStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletStore")
            .field("backend", &self.backend.name())
            .field("location", &self.backend.location())
            .field("codec", &self.codec)
            .finish()
    }
}

impl<B: SecretsBackend> WalletStore<B> {
    /// Store without encryption.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self::with_backend(Arc::new(backend), None)
    }

    /// Store that encrypts every payload with `passphrase`.
    #[must_use]
    pub fn with_passphrase(backend: B, passphrase: SecretString) -> Self {
        Self::with_backend(Arc::new(backend), Some(passphrase))
    }

    /// Store over an already shared backend handle.
    #[must_use]
    pub fn with_backend(backend: Arc<B>, passphrase: Option<SecretString>) -> Self {
        Self {
            backend,
            codec: Arc::new(Codec::new(passphrase)),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Name of the underlying backend.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    /// Location of the underlying backend.
    #[must_use]
    pub fn location(&self) -> String {
        self.backend.location()
    }

    /// Stores wallet-level data, replacing any existing data for `id`.
    ///
    /// Name uniqueness is not checked; callers that need it must look the
    /// name up first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Encryption` or `StoreError::Backend` if the
    /// payload cannot be encoded or written.
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub async fn store_wallet(&self, id: Uuid, name: &str, data: &[u8]) -> Result<()> {
        let value = self
            .codec
            .encode(data)
            .await
            .map_err(|e| e.context("failed to encrypt wallet"))?;

        self.backend
            .put(&paths::wallet_header_path(id), &value)
            .await
            .map_err(|e| e.context("failed to store wallet"))?;

        debug!("Stored wallet");
        Ok(())
    }

    /// Finds a wallet by the `name` field of its payload.
    ///
    /// Scans every wallet.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no readable wallet has that name.
    #[instrument(skip(self))]
    pub async fn retrieve_wallet(&self, name: &str) -> Result<Vec<u8>> {
        let mut wallets = self.retrieve_wallets();
        while let Some(data) = wallets.next_payload().await {
            if let Ok(info) = serde_json::from_slice::<NamedPayload>(&data) {
                if info.name == name {
                    return Ok(data);
                }
            }
        }

        Err(StoreError::NotFound {
            path: format!("{}/<name={name}>", paths::wallets_prefix()),
        })
    }

    /// Finds a wallet by the `uuid` field of its payload.
    ///
    /// Scans every wallet.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no readable wallet has that ID.
    #[instrument(skip(self))]
    pub async fn retrieve_wallet_by_id(&self, id: Uuid) -> Result<Vec<u8>> {
        let mut wallets = self.retrieve_wallets();
        while let Some(data) = wallets.next_payload().await {
            if claim(&data, id) == Claim::Matches {
                return Ok(data);
            }
        }

        Err(StoreError::NotFound {
            path: paths::wallet_header_path(id),
        })
    }

    /// Streams the data of every readable wallet.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn retrieve_wallets(&self) -> PayloadStream {
        enumerate(
            Arc::clone(&self.backend),
            Arc::clone(&self.codec),
            Listing::Wallets,
        )
    }

    /// Stores an account, replacing any existing data for `account_id`.
    ///
    /// A JSON payload's `uuid` field must equal `account_id`, and so must the
    /// `uuid` of a JSON account already in the slot. Non-JSON payloads are
    /// stored and overwritten without that check.
    ///
    /// # Errors
    ///
    /// - `StoreError::UnknownWallet` if the wallet is not stored
    /// - `StoreError::ReservedId` if `account_id` equals `wallet_id`
    /// - `StoreError::AlreadyExists` if the payload or the slot does not
    ///   identify itself as `account_id`
    /// - `StoreError::Encryption` or `StoreError::Backend` on write failure
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub async fn store_account(
        &self,
        wallet_id: Uuid,
        account_id: Uuid,
        data: &[u8],
    ) -> Result<()> {
        match self.retrieve_wallet_by_id(wallet_id).await {
            Ok(_) => {}
            Err(StoreError::NotFound { .. }) => {
                return Err(StoreError::UnknownWallet { id: wallet_id })
            }
            Err(e) => return Err(e),
        }

        if account_id == wallet_id {
            return Err(StoreError::ReservedId { id: account_id });
        }

        if claim(data, account_id) == Claim::Mismatch {
            return Err(StoreError::AlreadyExists { id: account_id });
        }

        match self.retrieve_account(wallet_id, account_id).await {
            Ok(existing) => {
                if claim(&existing, account_id) == Claim::Mismatch {
                    return Err(StoreError::AlreadyExists { id: account_id });
                }
            }
            Err(StoreError::NotFound { .. }) => {}
            Err(e @ (StoreError::Decryption(_) | StoreError::MalformedPayload(_))) => {
                warn!(error = %e, "Overwriting unreadable account");
            }
            Err(e) => return Err(e),
        }

        let value = self
            .codec
            .encode(data)
            .await
            .map_err(|e| e.context("failed to encrypt account"))?;

        self.backend
            .put(&paths::account_path(wallet_id, account_id), &value)
            .await
            .map_err(|e| e.context("failed to store account"))?;

        debug!("Stored account");
        Ok(())
    }

    /// Retrieves account-level data.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account is not stored, or a
    /// decoding or backend error.
    #[instrument(skip(self))]
    pub async fn retrieve_account(&self, wallet_id: Uuid, account_id: Uuid) -> Result<Vec<u8>> {
        let value = self
            .backend
            .get(&paths::account_path(wallet_id, account_id))
            .await
            .map_err(|e| e.context("failed to retrieve account"))?;

        self.codec
            .decode(&value)
            .await
            .map_err(|e| e.context("failed to decode account"))
    }

    /// Streams the data of every readable account of a wallet.
    ///
    /// An unknown wallet yields an empty stream. Must be called from within
    /// a Tokio runtime.
    pub fn retrieve_accounts(&self, wallet_id: Uuid) -> PayloadStream {
        enumerate(
            Arc::clone(&self.backend),
            Arc::clone(&self.codec),
            Listing::Accounts(wallet_id),
        )
    }

    /// Stores the account index of a wallet.
    ///
    /// An empty index is stored unencrypted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Encryption` or `StoreError::Backend` on failure.
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub async fn store_accounts_index(&self, wallet_id: Uuid, data: &[u8]) -> Result<()> {
        let value = self
            .codec
            .encode_index(data)
            .await
            .map_err(|e| e.context("failed to encrypt wallet index"))?;

        self.backend
            .put(&paths::wallet_index_path(wallet_id), &value)
            .await
            .map_err(|e| e.context("failed to store wallet index"))?;

        debug!("Stored wallet index");
        Ok(())
    }

    /// Retrieves the account index of a wallet.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no index is stored, or a decoding or
    /// backend error.
    #[instrument(skip(self))]
    pub async fn retrieve_accounts_index(&self, wallet_id: Uuid) -> Result<Vec<u8>> {
        let value = self
            .backend
            .get(&paths::wallet_index_path(wallet_id))
            .await
            .map_err(|e| e.context("failed to retrieve wallet index"))?;

        self.codec
            .decode_index(&value)
            .await
            .map_err(|e| e.context("failed to decode wallet index"))
    }
}
