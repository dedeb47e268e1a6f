//! Lazily bootstrapped light-client handle.
//!
//! Bootstrapping a light client (chain sync up to a finalized head) is expensive, so
//! it is deferred to the first request and happens at most once per process. The
//! handle lives in the service context that is built at start-up and shared by every
//! request; it is never torn down.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::instrument;

use super::{BlockHandle, BlockHeader, LightClient, LightClientError, RawEvent};

/// Builds the underlying light client on first use.
#[async_trait]
pub trait Connect: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn LightClient>, LightClientError>;
}

/// A [`LightClient`] that connects on first call.
///
/// Concurrent first calls wait on the same initialization rather than racing to build
/// two clients. A failed bootstrap leaves the handle empty so a later request can try
/// again.
pub struct LazyLightClient {
    connector: Box<dyn Connect>,
    handle: OnceCell<Arc<dyn LightClient>>,
}

impl LazyLightClient {
    pub fn new(connector: impl Connect + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            handle: OnceCell::new(),
        }
    }

    #[cfg(test)]
    pub fn is_initialized(&self) -> bool {
        self.handle.initialized()
    }

    #[instrument(skip_all, err)]
    async fn handle(&self) -> Result<&Arc<dyn LightClient>, LightClientError> {
        self.handle
            .get_or_try_init(|| async {
                tracing::info!("Initializing light client");
                let client = self
                    .connector
                    .connect()
                    .await
                    .map_err(|e| LightClientError::Bootstrap(e.to_string()))?;
                let head = client
                    .finalized_head()
                    .await
                    .map_err(|e| LightClientError::Bootstrap(e.to_string()))?;
                tracing::info!(
                    number = head.number,
                    hash = %head.hash,
                    "Light client ready"
                );
                Ok::<_, LightClientError>(client)
            })
            .await
    }
}

#[async_trait]
impl LightClient for LazyLightClient {
    async fn finalized_head(&self) -> Result<BlockHeader, LightClientError> {
        self.handle().await?.finalized_head().await
    }

    async fn block(&self, number: u64) -> Result<BlockHandle, LightClientError> {
        self.handle().await?.block(number).await
    }

    async fn events(
        &self,
        block_hash: &str,
        pallet: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<RawEvent>, LightClientError> {
        self.handle().await?.events(block_hash, pallet, name).await
    }
}
