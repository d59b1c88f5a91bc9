//! Collection reconstruction by listing, filtering and fetching keys.
//!
//! The backend has no query primitive, so "all wallets" and "all accounts of
//! a wallet" are rebuilt by listing one directory level, discarding entries
//! that are structure rather than entities, and fetching each remaining key.
//! A background task does the work and pushes decoded payloads into a
//! bounded channel that the caller drains through a [`PayloadStream`].
//!
//! Per-entry failures (fetch, decode) drop that entry only. A failing listing
//! yields an empty stream.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::backend::SecretsBackend;
use crate::codec::Codec;
use crate::paths::{self, INDEX_KEY, SEPARATOR};

/// Capacity of the channel between producer and consumer.
pub const STREAM_CAPACITY: usize = 1024;

/// The collection being enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    /// Every wallet header under the wallets root.
    Wallets,
    /// Every account of one wallet.
    Accounts(Uuid),
}

impl Listing {
    fn prefix(self) -> String {
        match self {
            Self::Wallets => paths::wallets_prefix().to_string(),
            Self::Accounts(wallet_id) => paths::wallet_path(wallet_id),
        }
    }

    /// Maps a listed entry to the path holding its payload, or `None` when
    /// the entry is not an entity of this collection.
    ///
    /// Wallets are the directories under the root; a leaf directly under the
    /// root is not a wallet. Inside a wallet directory, nested directories,
    /// the wallet's own header and the index are skipped.
    #[must_use]
    pub fn entity_path(self, entry: &str) -> Option<String> {
        match self {
            Self::Wallets => {
                let name = entry.strip_suffix(SEPARATOR)?;
                let wallet_id = Uuid::parse_str(name).ok()?;
                Some(paths::wallet_header_path(wallet_id))
            }
            Self::Accounts(wallet_id) => {
                if entry.ends_with(SEPARATOR) || entry == INDEX_KEY {
                    return None;
                }
                let account_id = Uuid::parse_str(entry).ok()?;
                if account_id == wallet_id {
                    return None;
                }
                Some(paths::account_path(wallet_id, account_id))
            }
        }
    }
}

/// Lazy, finite sequence of decoded payloads.
///
/// Not restartable: enumerate again for a second pass. Dropping the stream
/// stops the producer.
#[derive(Debug)]
pub struct PayloadStream {
    rx: mpsc::Receiver<Vec<u8>>,
    producer: JoinHandle<()>,
}

impl PayloadStream {
    /// Waits for the next payload; `None` once the collection is exhausted.
    pub async fn next_payload(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Drains the remaining payloads.
    pub async fn collect_all(mut self) -> Vec<Vec<u8>> {
        let mut payloads = Vec::new();
        while let Some(payload) = self.rx.recv().await {
            payloads.push(payload);
        }
        payloads
    }
}

impl Stream for PayloadStream {
    type Item = Vec<u8>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for PayloadStream {
    fn drop(&mut self) {
        self.producer.abort();
    }
}

/// Starts enumerating `listing` in a background task.
///
/// Must be called from within a Tokio runtime.
pub fn enumerate<B: SecretsBackend>(
    backend: Arc<B>,
    codec: Arc<Codec>,
    listing: Listing,
) -> PayloadStream {
    let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
    let span = tracing::debug_span!("enumerate", ?listing);
    let producer = tokio::spawn(produce(backend, codec, listing, tx).instrument(span));
    PayloadStream { rx, producer }
}

async fn produce<B: SecretsBackend>(
    backend: Arc<B>,
    codec: Arc<Codec>,
    listing: Listing,
    tx: mpsc::Sender<Vec<u8>>,
) {
    let prefix = listing.prefix();

    let entries = match backend.list(&prefix).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(prefix = %prefix, error = %e, "Listing failed, yielding nothing");
            return;
        }
    };

    let mut emitted = 0usize;
    for entry in entries {
        let Some(path) = listing.entity_path(&entry) else {
            continue;
        };

        let value = match backend.get(&path).await {
            Ok(value) => value,
            Err(e) => {
                debug!(path = %path, error = %e, "Skipping entry that could not be fetched");
                continue;
            }
        };

        let payload = match codec.decode(&value).await {
            Ok(payload) => payload,
            Err(e) => {
                debug!(path = %path, error = %e, "Skipping entry that could not be decoded");
                continue;
            }
        };

        if tx.send(payload).await.is_err() {
            debug!("Consumer went away, stopping enumeration");
            return;
        }
        emitted += 1;
    }

    debug!(prefix = %prefix, emitted, "Enumeration complete");
}
