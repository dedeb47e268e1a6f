//! The payment gate: turns an optional proof into a challenge or a settled outcome.
//!
//! A [`PaymentGate`] is the service context shared by every request. It owns the one
//! light-client handle of the process together with the resolver and verifier built
//! on top of it, and the deployment settings echoed back in payment instructions.

use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::address;
use crate::address::AddressError;
use crate::chain::{LightClient, LightClientError};
use crate::normalize;
use crate::resolver::{BlockResolver, Resolution, SearchWindows, normalize_hash};
use crate::types::{
    CanonicalHex, DebugEvent, PaymentInstructions, PaymentProof, PaymentRequirement,
    ProofError, RejectionReason, VerifiedPayment,
};
use crate::verifier::{PaymentVerifier, VerifyError};

#[derive(Debug, Clone)]
pub struct GateSettings {
    pub network: String,
    pub currency: String,
    pub default_recipient: String,
    /// Default `/premium` price in planck.
    pub premium_price: u128,
    /// Upper bound on resolve + verify for a single proof.
    pub deadline: Duration,
    pub windows: SearchWindows,
}

/// Result of checking a proof, for every case that is not a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified(VerifiedPayment),
    /// No block could be tied to the proof in time. The caller should retry later.
    NotFound { reason: RejectionReason },
    /// The block is known but carries no qualifying transfer.
    Rejected {
        reason: RejectionReason,
        block_hash: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// No proof was supplied: the client has to pay first.
    Challenged(PaymentInstructions),
    Settled(VerificationOutcome),
}

/// Outcome of a transaction-to-block lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockLookup {
    Found { block_number: u64, block_hash: String },
    NotFound { reason: RejectionReason },
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("light client is not configured: {0}")]
    Configuration(String),
    #[error(transparent)]
    Decode(#[from] AddressError),
    #[error("light client unavailable: {0}")]
    Upstream(String),
    #[error(transparent)]
    MalformedProof(ProofError),
    #[error("{0} is required")]
    MissingField(String),
    /// The request body or query could not be parsed.
    #[error("{0}")]
    MalformedRequest(String),
}

impl GateError {
    pub fn reason(&self) -> RejectionReason {
        match self {
            GateError::Configuration(_) => RejectionReason::Misconfigured,
            GateError::Decode(_) => RejectionReason::InvalidRecipient,
            GateError::Upstream(_) => RejectionReason::UpstreamUnavailable,
            GateError::MalformedProof(_) => RejectionReason::MalformedProof,
            GateError::MissingField(_) => RejectionReason::MissingFields,
            GateError::MalformedRequest(_) => RejectionReason::MalformedRequest,
        }
    }
}

impl From<LightClientError> for GateError {
    fn from(e: LightClientError) -> Self {
        match e {
            LightClientError::Bootstrap(msg) => GateError::Configuration(msg),
            LightClientError::Upstream(msg) => GateError::Upstream(msg),
        }
    }
}

impl From<VerifyError> for GateError {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::Decode(e) => GateError::Decode(e),
            VerifyError::Upstream(e) => e.into(),
        }
    }
}

impl From<ProofError> for GateError {
    fn from(e: ProofError) -> Self {
        match e {
            ProofError::Missing => {
                GateError::MissingField("transactionHash or blockHash".to_string())
            }
            other => GateError::MalformedProof(other),
        }
    }
}

pub struct PaymentGate {
    client: Arc<dyn LightClient>,
    resolver: BlockResolver,
    verifier: PaymentVerifier,
    settings: GateSettings,
    default_recipient_hex: CanonicalHex,
}

impl PaymentGate {
    /// Builds the gate around `client`. The default recipient must decode.
    pub fn new(client: Arc<dyn LightClient>, settings: GateSettings) -> Result<Self, AddressError> {
        let default_recipient_hex = address::decode(&settings.default_recipient)?;
        Ok(Self {
            resolver: BlockResolver::new(client.clone(), settings.windows),
            verifier: PaymentVerifier::new(client.clone()),
            client,
            settings,
            default_recipient_hex,
        })
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    pub fn default_recipient_hex(&self) -> &CanonicalHex {
        &self.default_recipient_hex
    }

    /// Payment instructions for `requirement`.
    ///
    /// An undecodable recipient still gets instructions, just without `recipientHex`.
    pub fn challenge(
        &self,
        requirement: &PaymentRequirement,
        instructions: &str,
    ) -> PaymentInstructions {
        PaymentInstructions {
            network: self.settings.network.clone(),
            recipient: requirement.recipient.clone(),
            recipient_hex: address::decode(&requirement.recipient).ok(),
            amount: requirement.min_amount,
            currency: self.settings.currency.clone(),
            instructions: instructions.to_string(),
        }
    }

    /// The 402 protocol in one step: challenge without a proof, settle with one.
    pub async fn process(
        &self,
        proof: Option<PaymentProof>,
        requirement: &PaymentRequirement,
        instructions: &str,
    ) -> Result<GateDecision, GateError> {
        match proof {
            None => Ok(GateDecision::Challenged(
                self.challenge(requirement, instructions),
            )),
            Some(proof) => self
                .verify_proof(&proof, requirement)
                .await
                .map(GateDecision::Settled),
        }
    }

    /// Ties `proof` to a block and looks for a qualifying transfer in it.
    ///
    /// A supplied block hash is normalized like a resolved one and no block search is
    /// issued. The whole pipeline is bounded by the configured deadline.
    #[instrument(skip_all, err, fields(recipient = %requirement.recipient, min_amount = %requirement.min_amount))]
    pub async fn verify_proof(
        &self,
        proof: &PaymentProof,
        requirement: &PaymentRequirement,
    ) -> Result<VerificationOutcome, GateError> {
        let recipient_hex = address::decode(&requirement.recipient)?;
        match tokio::time::timeout(
            self.settings.deadline,
            self.settle(proof, requirement, recipient_hex),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    deadline = ?self.settings.deadline,
                    "Verification deadline exceeded"
                );
                Ok(VerificationOutcome::NotFound {
                    reason: RejectionReason::DeadlineExceeded,
                })
            }
        }
    }

    async fn settle(
        &self,
        proof: &PaymentProof,
        requirement: &PaymentRequirement,
        recipient_hex: CanonicalHex,
    ) -> Result<VerificationOutcome, GateError> {
        let block_hash = match proof {
            PaymentProof::Block { block_hash, .. } => {
                tracing::debug!(%block_hash, "Using supplied block hash");
                normalize_hash(block_hash)
            }
            PaymentProof::Transaction { tx_hash } => match self.resolver.resolve(tx_hash).await? {
                Resolution::Found { block_hash, .. } => block_hash,
                Resolution::NotFound { head, scanned } => {
                    tracing::warn!(%tx_hash, head, scanned, "Transaction not finalized");
                    return Ok(VerificationOutcome::NotFound {
                        reason: RejectionReason::TxNotFinalized,
                    });
                }
            },
        };

        let transfer = self
            .verifier
            .verify(&block_hash, &requirement.recipient, requirement.min_amount)
            .await?;
        let Some(transfer) = transfer else {
            tracing::warn!(%block_hash, "No qualifying transfer");
            return Ok(VerificationOutcome::Rejected {
                reason: RejectionReason::NoQualifyingTransfer,
                block_hash,
            });
        };

        Ok(VerificationOutcome::Verified(VerifiedPayment {
            from: transfer.from,
            to: transfer.to.unwrap_or(recipient_hex),
            to_ss58: requirement.recipient.clone(),
            amount: transfer.amount,
            block_hash,
            event_index: transfer.index,
            transaction_hash: proof.tx_hash().map(str::to_string),
        }))
    }

    /// Finds the finalized block containing `tx_hash`, within the deadline.
    #[instrument(skip_all, err, fields(tx_hash = %tx_hash))]
    pub async fn resolve_block(&self, tx_hash: &str) -> Result<BlockLookup, GateError> {
        match tokio::time::timeout(self.settings.deadline, self.resolver.resolve(tx_hash)).await {
            Ok(Ok(Resolution::Found {
                block_number,
                block_hash,
            })) => Ok(BlockLookup::Found {
                block_number,
                block_hash,
            }),
            Ok(Ok(Resolution::NotFound { .. })) => Ok(BlockLookup::NotFound {
                reason: RejectionReason::TxNotFinalized,
            }),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(BlockLookup::NotFound {
                reason: RejectionReason::DeadlineExceeded,
            }),
        }
    }

    pub async fn latest_block(&self) -> Result<u64, GateError> {
        Ok(self.client.finalized_head().await?.number)
    }

    /// Every event of a block with byte-array fields rewritten to hex.
    pub async fn block_events(&self, block_hash: &str) -> Result<Vec<DebugEvent>, GateError> {
        let events = self.client.events(block_hash, None, None).await?;
        Ok(events
            .into_iter()
            .map(|event| DebugEvent {
                index: event.index,
                pallet: event.pallet,
                name: event.name,
                fields: normalize::normalize_fields(&event.fields),
            })
            .collect())
    }
}
