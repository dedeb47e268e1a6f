//! JSON-over-HTTP light-client gateway.
//!
//! The gateway fronts an embedded light client and exposes its three read operations:
//! - `GET /finalized` → `{number, hash}`
//! - `GET /blocks/{number}` → `{hash, extrinsics: [{hash} | {extrinsicHash}]}`
//! - `GET /blocks/{hash}/events?pallet=&name=` → `[{index, pallet, name, fields}]`

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use url::Url;

use super::{
    BlockHandle, BlockHeader, Connect, LightClient, LightClientError, RawEvent,
    SerializedLightClient,
};

#[derive(Clone, Debug)]
pub struct RemoteLightClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RemoteLightClient {
    pub fn try_new(base_url: Url, timeout: Duration) -> Result<Self, LightClientError> {
        if base_url.cannot_be_a_base() {
            return Err(LightClientError::Bootstrap(format!(
                "{base_url} cannot be used as a base URL"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LightClientError::Bootstrap(format!("{e}")))?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, LightClientError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                LightClientError::Bootstrap(format!("{} cannot be a base", self.base_url))
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<T, LightClientError> {
        let upstream = |e: reqwest::Error| LightClientError::Upstream(format!("{e}"));
        self.http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(upstream)?
            .error_for_status()
            .map_err(upstream)?
            .json::<T>()
            .await
            .map_err(upstream)
    }
}

#[async_trait]
impl LightClient for RemoteLightClient {
    #[instrument(skip_all, err, fields(otel.kind = "client"))]
    async fn finalized_head(&self) -> Result<BlockHeader, LightClientError> {
        let url = self.endpoint(&["finalized"])?;
        self.get_json(url, &[]).await
    }

    #[instrument(skip_all, err, fields(number = number, otel.kind = "client"))]
    async fn block(&self, number: u64) -> Result<BlockHandle, LightClientError> {
        let url = self.endpoint(&["blocks", &number.to_string()])?;
        let mut block: BlockHandle = self.get_json(url, &[]).await?;
        block.number = number;
        Ok(block)
    }

    #[instrument(skip_all, err, fields(block_hash = %block_hash, otel.kind = "client"))]
    async fn events(
        &self,
        block_hash: &str,
        pallet: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<RawEvent>, LightClientError> {
        let url = self.endpoint(&["blocks", block_hash, "events"])?;
        let mut query = Vec::with_capacity(2);
        if let Some(pallet) = pallet {
            query.push(("pallet", pallet));
        }
        if let Some(name) = name {
            query.push(("name", name));
        }
        self.get_json(url, &query).await
    }
}

/// Connects a [`RemoteLightClient`], optionally behind a [`SerializedLightClient`].
#[derive(Clone, Debug)]
pub struct RemoteConnector {
    pub base_url: Url,
    pub timeout: Duration,
    pub serialize: bool,
}

#[async_trait]
impl Connect for RemoteConnector {
    async fn connect(&self) -> Result<Arc<dyn LightClient>, LightClientError> {
        let client = RemoteLightClient::try_new(self.base_url.clone(), self.timeout)?;
        tracing::info!(
            base_url = %self.base_url,
            serialize = self.serialize,
            "Connecting to light client gateway"
        );
        let client: Arc<dyn LightClient> = if self.serialize {
            Arc::new(SerializedLightClient::new(client))
        } else {
            Arc::new(client)
        };
        Ok(client)
    }
}
