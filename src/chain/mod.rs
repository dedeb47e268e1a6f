//! The light-client collaborator consumed by the payment gate.
//!
//! The gate never syncs the chain itself. It asks a [`LightClient`] for the finalized
//! head, for blocks by number and for the events of a block. Data crossing this
//! boundary is deserialized into the typed structs below; transfer events are then
//! narrowed further into [`TransferEvent`] before the verifier looks at them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::normalize;
use crate::types::CanonicalHex;

pub mod lazy;
#[cfg(test)]
pub mod memory;
pub mod remote;
pub mod serialized;

pub use lazy::{Connect, LazyLightClient};
pub use remote::RemoteConnector;
pub use serialized::SerializedLightClient;

pub const BALANCES_PALLET: &str = "Balances";
pub const TRANSFER_EVENT: &str = "Transfer";

#[derive(Debug, Clone, thiserror::Error)]
pub enum LightClientError {
    /// The handle could not be constructed. Not retried automatically.
    #[error("light client bootstrap failed: {0}")]
    Bootstrap(String),
    /// A single call failed.
    #[error("light client call failed: {0}")]
    Upstream(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHandle {
    #[serde(default)]
    pub number: u64,
    pub hash: String,
    /// In inclusion order.
    #[serde(default)]
    pub extrinsics: Vec<ExtrinsicRef>,
}

/// One extrinsic of a block. Depending on the light-client version its hash is
/// exposed as `hash` or as `extrinsicHash`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtrinsicRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(
        default,
        rename = "extrinsicHash",
        alias = "extrinsic_hash",
        skip_serializing_if = "Option::is_none"
    )]
    pub extrinsic_hash: Option<String>,
}

/// Where to read an extrinsic's hash from, in the order the resolver tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtrinsicHashField {
    Hash,
    ExtrinsicHash,
}

impl ExtrinsicHashField {
    pub const ALL: [ExtrinsicHashField; 2] =
        [ExtrinsicHashField::Hash, ExtrinsicHashField::ExtrinsicHash];

    pub fn read(self, extrinsic: &ExtrinsicRef) -> Option<&str> {
        let value = match self {
            ExtrinsicHashField::Hash => extrinsic.hash.as_deref(),
            ExtrinsicHashField::ExtrinsicHash => extrinsic.extrinsic_hash.as_deref(),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

impl ExtrinsicRef {
    /// The first non-empty hash found across [`ExtrinsicHashField::ALL`].
    pub fn any_hash(&self) -> Option<&str> {
        ExtrinsicHashField::ALL
            .iter()
            .find_map(|field| field.read(self))
    }
}

/// An event as emitted by the light client, before any schema is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub index: u32,
    pub pallet: String,
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// A `Balances.Transfer` event with its fields typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub from: Option<CanonicalHex>,
    pub to: Option<CanonicalHex>,
    pub amount: u128,
    /// Emission order within the block.
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventSchemaError {
    #[error("event {pallet}.{name} is not a balance transfer")]
    NotTransfer { pallet: String, name: String },
    #[error("transfer amount {0} is not a non-negative integer")]
    Amount(String),
}

impl TryFrom<&RawEvent> for TransferEvent {
    type Error = EventSchemaError;

    fn try_from(event: &RawEvent) -> Result<Self, Self::Error> {
        if !event.pallet.eq_ignore_ascii_case(BALANCES_PALLET)
            || !event.name.eq_ignore_ascii_case(TRANSFER_EVENT)
        {
            return Err(EventSchemaError::NotTransfer {
                pallet: event.pallet.clone(),
                name: event.name.clone(),
            });
        }
        Ok(TransferEvent {
            from: event.fields.get("from").and_then(normalize::to_hex),
            to: event.fields.get("to").and_then(normalize::to_hex),
            amount: parse_amount(event.fields.get("amount"))?,
            index: event.index,
        })
    }
}

/// Amounts arrive as JSON numbers, decimal strings or `0x` hex strings. A missing
/// amount counts as zero.
///
/// Numbers are read from their literal digits (`arbitrary_precision`), so balances
/// above `u64::MAX` keep full precision.
fn parse_amount(value: Option<&Value>) -> Result<u128, EventSchemaError> {
    let invalid = |v: &Value| EventSchemaError::Amount(v.to_string());
    match value {
        None | Some(Value::Null) => Ok(0),
        Some(v @ Value::Number(n)) => n.to_string().parse::<u128>().map_err(|_| invalid(v)),
        Some(v @ Value::String(s)) => {
            let s = s.trim();
            let parsed = match s.strip_prefix("0x") {
                Some(digits) => u128::from_str_radix(digits, 16),
                None => s.parse::<u128>(),
            };
            parsed.map_err(|_| invalid(v))
        }
        Some(v) => Err(invalid(v)),
    }
}

/// The operations the gate needs from a light client.
///
/// Implementations must be safe to call concurrently; wrap a collaborator that is
/// not in [`SerializedLightClient`].
#[async_trait]
pub trait LightClient: Send + Sync {
    /// Number and hash of the latest finalized block.
    async fn finalized_head(&self) -> Result<BlockHeader, LightClientError>;

    /// The finalized block at `number`, with its extrinsics in inclusion order.
    async fn block(&self, number: u64) -> Result<BlockHandle, LightClientError>;

    /// Events of the block identified by `block_hash`, in emission order, optionally
    /// filtered by pallet and event name.
    async fn events(
        &self,
        block_hash: &str,
        pallet: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<RawEvent>, LightClientError>;
}

#[async_trait]
impl<C> LightClient for Arc<C>
where
    C: LightClient + ?Sized,
{
    async fn finalized_head(&self) -> Result<BlockHeader, LightClientError> {
        (**self).finalized_head().await
    }

    async fn block(&self, number: u64) -> Result<BlockHandle, LightClientError> {
        (**self).block(number).await
    }

    async fn events(
        &self,
        block_hash: &str,
        pallet: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<RawEvent>, LightClientError> {
        (**self).events(block_hash, pallet, name).await
    }
}
