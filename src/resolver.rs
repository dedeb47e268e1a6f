//! Resolution of a transaction hash to the finalized block that contains it.
//!
//! The light client cannot look a transaction up by hash, so the resolver walks
//! backwards from the finalized head over a bounded window of recent blocks and
//! compares extrinsic hashes. The most recent block wins, and within a block the
//! first matching extrinsic in inclusion order.

use std::sync::Arc;
use tracing::instrument;

use crate::chain::{LightClient, LightClientError};

pub const DEFAULT_PRIMARY_WINDOW: u64 = 50;
pub const DEFAULT_FALLBACK_WINDOW: u64 = 30;

/// How many recent blocks each resolution pass scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindows {
    pub primary: u64,
    /// Scanned from a freshly fetched head when the primary pass finds nothing.
    /// Zero disables the second pass.
    pub fallback: u64,
}

impl Default for SearchWindows {
    fn default() -> Self {
        Self {
            primary: DEFAULT_PRIMARY_WINDOW,
            fallback: DEFAULT_FALLBACK_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found { block_number: u64, block_hash: String },
    /// `scanned` counts candidate blocks, including ones that failed to fetch.
    NotFound { head: u64, scanned: u64 },
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found { .. })
    }
}

/// Lowercases a hash and makes sure it carries a `0x` prefix.
pub fn normalize_hash(hash: &str) -> String {
    let lowered = hash.trim().to_ascii_lowercase();
    if lowered.starts_with("0x") {
        lowered
    } else {
        format!("0x{lowered}")
    }
}

pub struct BlockResolver {
    client: Arc<dyn LightClient>,
    windows: SearchWindows,
}

impl BlockResolver {
    pub fn new(client: Arc<dyn LightClient>, windows: SearchWindows) -> Self {
        Self { client, windows }
    }

    /// Runs the primary pass and, only if it comes back empty, the fallback pass.
    ///
    /// # Errors
    ///
    /// Fails only if the finalized head itself cannot be fetched.
    #[instrument(skip_all, err, fields(tx_hash = %tx_hash))]
    pub async fn resolve(&self, tx_hash: &str) -> Result<Resolution, LightClientError> {
        let primary = self.find_block_by_tx(tx_hash, self.windows.primary).await?;
        if primary.is_found() || self.windows.fallback == 0 {
            return Ok(primary);
        }
        tracing::debug!(
            window = self.windows.fallback,
            "Primary window exhausted, rescanning from current head"
        );
        self.find_block_by_tx(tx_hash, self.windows.fallback).await
    }

    /// Scans blocks `head, head - 1, ...` down to at most `max_blocks` candidates.
    ///
    /// A block that fails to fetch is logged and skipped; it never aborts the scan.
    ///
    /// # Errors
    ///
    /// Fails only if the finalized head cannot be fetched.
    #[instrument(skip_all, err, fields(tx_hash = %tx_hash, max_blocks = max_blocks))]
    pub async fn find_block_by_tx(
        &self,
        tx_hash: &str,
        max_blocks: u64,
    ) -> Result<Resolution, LightClientError> {
        let target = normalize_hash(tx_hash);
        let head = self.client.finalized_head().await?;
        tracing::debug!(head = head.number, "Searching recent finalized blocks");

        let mut scanned = 0;
        for offset in 0..max_blocks {
            let Some(number) = head.number.checked_sub(offset) else {
                break;
            };
            scanned += 1;
            let block = match self.client.block(number).await {
                Ok(block) => block,
                Err(e) => {
                    tracing::warn!(block = number, error = %e, "Skipping block");
                    continue;
                }
            };
            let contains_tx = block
                .extrinsics
                .iter()
                .filter_map(|extrinsic| extrinsic.any_hash())
                .any(|hash| normalize_hash(hash) == target);
            if contains_tx {
                let block_hash = normalize_hash(&block.hash);
                tracing::info!(block = number, block_hash = %block_hash, "Transaction found");
                return Ok(Resolution::Found {
                    block_number: number,
                    block_hash,
                });
            }
        }

        tracing::info!(scanned, head = head.number, "Transaction not found in window");
        Ok(Resolution::NotFound {
            head: head.number,
            scanned,
        })
    }
}
