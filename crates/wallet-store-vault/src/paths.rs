//! Storage key derivation for wallets, accounts and indices.
//!
//! Layout within the KV2 mount:
//!
//! ```text
//! wallets/
//!   {wallet-id}/
//!     {wallet-id}     wallet header
//!     index           account index
//!     {account-id}    one entry per account
//! ```
//!
//! Each wallet owns a directory, so listing `wallets` yields `{wallet-id}/`
//! entries only, and listing a wallet directory yields its header, its index
//! and its accounts side by side.

use uuid::Uuid;

/// Root under which every wallet directory lives.
pub const WALLETS_ROOT: &str = "wallets";

/// Key of the account index inside a wallet directory.
pub const INDEX_KEY: &str = "index";

/// Separator between path segments; a trailing separator marks a directory
/// in listings.
pub const SEPARATOR: char = '/';

/// Prefix listed to enumerate all wallets.
#[must_use]
pub fn wallets_prefix() -> &'static str {
    WALLETS_ROOT
}

/// Directory holding everything belonging to a wallet.
#[must_use]
pub fn wallet_path(wallet_id: Uuid) -> String {
    format!("{WALLETS_ROOT}/{wallet_id}")
}

#[must_use]
pub fn wallet_header_path(wallet_id: Uuid) -> String {
    format!("{}/{wallet_id}", wallet_path(wallet_id))
}

#[must_use]
pub fn wallet_index_path(wallet_id: Uuid) -> String {
    format!("{}/{INDEX_KEY}", wallet_path(wallet_id))
}

/// Path of an account.
///
/// An account ID equal to its wallet ID would land on the wallet header; the
/// store refuses such IDs before calling this.
#[must_use]
pub fn account_path(wallet_id: Uuid, account_id: Uuid) -> String {
    format!("{}/{account_id}", wallet_path(wallet_id))
}
