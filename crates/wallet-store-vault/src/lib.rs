//! Wallet storage on a versioned key-value secrets service.
//!
//! Stores wallets, the accounts of each wallet, and a per-wallet account
//! index on a backend that only knows paths and flat value maps, such as
//! `HashiCorp` Vault's KV2 engine.
//!
//! ## Envelope
//! Each payload is optionally encrypted with a passphrase
//! (Argon2id + `XChaCha20-Poly1305`), base64 encoded, and stored under the
//! `data` field of the backend value.
//!
//! ## Collections
//! The backend cannot query, so listing all wallets or all accounts of a
//! wallet lists the keys of a directory and fetches each entity. Results
//! arrive as a [`PayloadStream`]; unreadable entries are skipped.

mod backend;
mod codec;
mod config;
mod encryption;
mod enumerator;
mod error;
pub mod paths;
mod store;

#[cfg(feature = "vault")]
mod vault;

pub use backend::{MemoryBackend, SecretData, SecretsBackend};
pub use codec::{Codec, DATA_FIELD, EMPTY_INDEX_LEN};
pub use config::{passphrase_from_env, VaultAuth, VaultConfig};
pub use enumerator::{Listing, PayloadStream, STREAM_CAPACITY};
pub use error::{Result, StoreError};
pub use store::WalletStore;

#[cfg(feature = "vault")]
pub use vault::VaultBackend;

pub use secrecy::SecretString;
pub use uuid::Uuid;
