//! In-memory chain used by tests.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::{BlockHandle, BlockHeader, ExtrinsicRef, LightClient, LightClientError, RawEvent};

/// Deterministic hash for a block number that was not set up explicitly.
pub fn block_hash(number: u64) -> String {
    format!("0x{number:064x}")
}

/// A `Balances.Transfer` event with account ids in nested byte-array form.
pub fn transfer(index: u32, from: [u8; 32], to: [u8; 32], amount: u64) -> RawEvent {
    RawEvent {
        index,
        pallet: "Balances".to_string(),
        name: "Transfer".to_string(),
        fields: json!({ "from": [from], "to": [to], "amount": amount })
            .as_object()
            .cloned()
            .unwrap_or_default(),
    }
}

pub fn event(index: u32, pallet: &str, name: &str) -> RawEvent {
    RawEvent {
        index,
        pallet: pallet.to_string(),
        name: name.to_string(),
        fields: Default::default(),
    }
}

#[derive(Default)]
pub struct MemoryChain {
    head: AtomicU64,
    head_step: u64,
    blocks: HashMap<u64, BlockHandle>,
    events: HashMap<String, Vec<RawEvent>>,
    failing_blocks: HashSet<u64>,
    unavailable: AtomicBool,
    latency: Option<Duration>,
    head_calls: AtomicUsize,
    block_calls: AtomicUsize,
    event_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fetched: std::sync::Mutex<Vec<u64>>,
}

impl MemoryChain {
    pub fn new(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            ..Default::default()
        }
    }

    /// Adds a block whose extrinsics expose their hash under `hash`.
    pub fn with_block(self, number: u64, tx_hashes: &[&str]) -> Self {
        let extrinsics = tx_hashes
            .iter()
            .map(|h| ExtrinsicRef {
                hash: Some(h.to_string()),
                extrinsic_hash: None,
            })
            .collect();
        self.with_extrinsics(number, extrinsics)
    }

    pub fn with_extrinsics(mut self, number: u64, extrinsics: Vec<ExtrinsicRef>) -> Self {
        self.blocks.insert(
            number,
            BlockHandle {
                number,
                hash: block_hash(number),
                extrinsics,
            },
        );
        self
    }

    pub fn with_events(mut self, block_hash: &str, events: Vec<RawEvent>) -> Self {
        self.events.insert(block_hash.to_string(), events);
        self
    }

    pub fn with_failing_block(mut self, number: u64) -> Self {
        self.failing_blocks.insert(number);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Finalizes `step` more blocks after every head read.
    pub fn with_head_step(mut self, step: u64) -> Self {
        self.head_step = step;
        self
    }

    /// Makes every call fail from now on.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    pub fn block_calls(&self) -> usize {
        self.block_calls.load(Ordering::SeqCst)
    }

    pub fn event_calls(&self) -> usize {
        self.event_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Block numbers requested so far, in call order.
    pub fn fetched_blocks(&self) -> Vec<u64> {
        self.fetched.lock().map(|f| f.clone()).unwrap_or_default()
    }

    async fn enter(&self) -> Result<InFlight<'_>, LightClientError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LightClientError::Upstream("connection refused".into()));
        }
        Ok(guard)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LightClient for MemoryChain {
    async fn finalized_head(&self) -> Result<BlockHeader, LightClientError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = self.enter().await?;
        let number = self.head.fetch_add(self.head_step, Ordering::SeqCst);
        Ok(BlockHeader {
            number,
            hash: block_hash(number),
        })
    }

    async fn block(&self, number: u64) -> Result<BlockHandle, LightClientError> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut fetched) = self.fetched.lock() {
            fetched.push(number);
        }
        let _in_flight = self.enter().await?;
        if self.failing_blocks.contains(&number) {
            return Err(LightClientError::Upstream(format!("block #{number} unavailable")));
        }
        Ok(self.blocks.get(&number).cloned().unwrap_or_else(|| BlockHandle {
            number,
            hash: block_hash(number),
            extrinsics: Vec::new(),
        }))
    }

    async fn events(
        &self,
        block_hash: &str,
        pallet: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<RawEvent>, LightClientError> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = self.enter().await?;
        let events = self.events.get(block_hash).cloned().unwrap_or_default();
        Ok(events
            .into_iter()
            .filter(|e| pallet.is_none_or(|p| e.pallet == p))
            .filter(|e| name.is_none_or(|n| e.name == n))
            .collect())
    }
}
