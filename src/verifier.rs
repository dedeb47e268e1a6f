//! Matching of `Balances.Transfer` events against a payment requirement.

use std::sync::Arc;
use tracing::instrument;

use crate::address;
use crate::address::AddressError;
use crate::chain::{
    BALANCES_PALLET, EventSchemaError, LightClient, LightClientError, TRANSFER_EVENT,
    TransferEvent,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum VerifyError {
    /// The recipient is not a decodable address. A caller bug, not a miss.
    #[error(transparent)]
    Decode(#[from] AddressError),
    #[error(transparent)]
    Upstream(#[from] LightClientError),
}

pub struct PaymentVerifier {
    client: Arc<dyn LightClient>,
}

impl PaymentVerifier {
    pub fn new(client: Arc<dyn LightClient>) -> Self {
        Self { client }
    }

    /// Returns the first transfer in `block_hash`, in emission order, that pays at
    /// least `min_amount` planck to `recipient`.
    ///
    /// Read-only: calling it twice with the same arguments gives the same answer.
    #[instrument(skip_all, err, fields(block_hash = %block_hash, recipient = %recipient, min_amount = %min_amount))]
    pub async fn verify(
        &self,
        block_hash: &str,
        recipient: &str,
        min_amount: u128,
    ) -> Result<Option<TransferEvent>, VerifyError> {
        let expected = address::decode(recipient)?;
        let events = self
            .client
            .events(block_hash, Some(BALANCES_PALLET), Some(TRANSFER_EVENT))
            .await?;
        tracing::debug!(count = events.len(), "Fetched transfer events");

        for raw in &events {
            let transfer = match TransferEvent::try_from(raw) {
                Ok(transfer) => transfer,
                Err(EventSchemaError::NotTransfer { pallet, name }) => {
                    tracing::debug!(%pallet, %name, "Ignoring non-transfer event");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(index = raw.index, error = %e, "Skipping malformed transfer");
                    continue;
                }
            };
            let to_matches = transfer.to.as_ref() == Some(&expected);
            tracing::debug!(
                index = transfer.index,
                to = ?transfer.to.as_ref().map(|to| to.as_str()),
                amount = %transfer.amount,
                to_matches,
                "Comparing transfer"
            );
            if to_matches && transfer.amount >= min_amount {
                tracing::info!(
                    index = transfer.index,
                    amount = %transfer.amount,
                    "Qualifying transfer found"
                );
                return Ok(Some(transfer));
            }
        }
        Ok(None)
    }
}
