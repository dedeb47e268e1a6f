//! Exclusive access wrapper for light clients that are not safe for concurrent calls.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BlockHandle, BlockHeader, LightClient, LightClientError, RawEvent};

/// Holds a single lock across each individual call to the wrapped client.
///
/// The lock is per call, not per request: a block search interleaves with other
/// requests between fetches, so ordering within one search is unaffected.
pub struct SerializedLightClient<C> {
    inner: C,
    lock: Mutex<()>,
}

impl<C> SerializedLightClient<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl<C: LightClient> LightClient for SerializedLightClient<C> {
    async fn finalized_head(&self) -> Result<BlockHeader, LightClientError> {
        let _guard = self.lock.lock().await;
        self.inner.finalized_head().await
    }

    async fn block(&self, number: u64) -> Result<BlockHandle, LightClientError> {
        let _guard = self.lock.lock().await;
        self.inner.block(number).await
    }

    async fn events(
        &self,
        block_hash: &str,
        pallet: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<RawEvent>, LightClientError> {
        let _guard = self.lock.lock().await;
        self.inner.events(block_hash, pallet, name).await
    }
}
