//! Wire and domain types for the payment gate.
//!
//! Request bodies mirror the JSON accepted by the HTTP surface (camelCase keys),
//! while response bodies are typed structs so that planck amounts wider than `u64`
//! serialize without going through an intermediate [`serde_json::Value`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::fmt::{Display, Formatter};

/// A normalized `0x`-prefixed lowercase hex string with an even number of digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalHex(String);

impl CanonicalHex {
    /// Hex-encodes raw bytes.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    /// Parses a hex string into canonical form.
    ///
    /// Accepts any even-length hex string with a `0x` (or `0X`) prefix, and exactly
    /// 64 hex digits without one. Anything else yields `None`.
    pub fn parse(s: &str) -> Option<Self> {
        static EVEN_HEX_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^(?:[0-9a-fA-F]{2})*$").expect("invalid regex"));

        let digits = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(digits) => digits,
            None if s.len() == 64 => s,
            None => return None,
        };
        if !EVEN_HEX_REGEX.is_match(digits) {
            return None;
        }
        Some(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CanonicalHex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for CanonicalHex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Proof of payment supplied by a client.
///
/// A directly supplied block hash always wins over a transaction hash: it skips
/// block resolution entirely. The transaction hash, if any, is kept only to be
/// echoed back in the verified payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentProof {
    Transaction {
        tx_hash: String,
    },
    Block {
        block_hash: String,
        tx_hash: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofError {
    #[error("transactionHash or blockHash is required")]
    Missing,
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("Invalid X-Payment header format. Use: tx=0x... or block=0x...")]
    MalformedHeader,
}

impl PaymentProof {
    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            PaymentProof::Transaction { tx_hash } => Some(tx_hash),
            PaymentProof::Block { tx_hash, .. } => tx_hash.as_deref(),
        }
    }

    /// Parses an `X-Payment` header value of the form `tx=<hash>` and/or `block=<hash>`,
    /// with pairs separated by `;`.
    pub fn from_header(value: &str) -> Result<Self, ProofError> {
        let mut tx_hash = None;
        let mut block_hash = None;
        for pair in value.split(';') {
            let Some((key, hash)) = pair.split_once('=') else {
                continue;
            };
            let hash = hash.trim();
            if hash.is_empty() {
                return Err(ProofError::MalformedHeader);
            }
            match key.trim() {
                "tx" => tx_hash = Some(hash.to_string()),
                "block" => block_hash = Some(hash.to_string()),
                _ => {}
            }
        }
        match (block_hash, tx_hash) {
            (Some(block_hash), tx_hash) => Ok(PaymentProof::Block {
                block_hash,
                tx_hash,
            }),
            (None, Some(tx_hash)) => Ok(PaymentProof::Transaction { tx_hash }),
            (None, None) => Err(ProofError::MalformedHeader),
        }
    }
}

/// The `{transactionHash?, blockHash?}` object carried in request bodies.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofFields {
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub block_hash: Option<String>,
}

impl ProofFields {
    /// True when neither hash key is present at all.
    pub fn is_absent(&self) -> bool {
        self.transaction_hash.is_none() && self.block_hash.is_none()
    }
}

impl TryFrom<ProofFields> for PaymentProof {
    type Error = ProofError;

    fn try_from(fields: ProofFields) -> Result<Self, Self::Error> {
        let tx_hash = non_empty(fields.transaction_hash, "transactionHash")?;
        let block_hash = non_empty(fields.block_hash, "blockHash")?;
        match (block_hash, tx_hash) {
            (Some(block_hash), tx_hash) => Ok(PaymentProof::Block {
                block_hash,
                tx_hash,
            }),
            (None, Some(tx_hash)) => Ok(PaymentProof::Transaction { tx_hash }),
            (None, None) => Err(ProofError::Missing),
        }
    }
}

fn non_empty(value: Option<String>, name: &'static str) -> Result<Option<String>, ProofError> {
    match value {
        Some(value) if value.trim().is_empty() => Err(ProofError::Empty(name)),
        Some(value) => Ok(Some(value.trim().to_string())),
        None => Ok(None),
    }
}

/// What a proof has to demonstrate: a transfer of at least `min_amount` planck to `recipient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequirement {
    pub recipient: String,
    pub min_amount: u128,
}

impl PaymentRequirement {
    pub fn new(recipient: impl Into<String>, min_amount: impl Into<u128>) -> Self {
        Self {
            recipient: recipient.into(),
            min_amount: min_amount.into(),
        }
    }
}

/// Machine-readable payment instructions returned with every 402 challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInstructions {
    pub network: String,
    pub recipient: String,
    pub recipient_hex: Option<CanonicalHex>,
    pub amount: u128,
    pub currency: String,
    pub instructions: String,
}

/// A transfer that satisfied a [`PaymentRequirement`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedPayment {
    pub from: Option<CanonicalHex>,
    pub to: CanonicalHex,
    pub to_ss58: String,
    pub amount: u128,
    pub block_hash: String,
    pub event_index: u32,
    #[serde(rename = "transactionHash")]
    pub transaction_hash: Option<String>,
}

/// Why a proof was not accepted, serialized as a stable snake_case code so clients
/// can tell "retry later" apart from "resubmit" and "give up".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The transaction is not in the recent finalized window (yet).
    TxNotFinalized,
    /// The block was found but holds no matching transfer.
    NoQualifyingTransfer,
    /// The search did not finish before the request deadline.
    DeadlineExceeded,
    InvalidRecipient,
    MalformedProof,
    MalformedRequest,
    MissingFields,
    UpstreamUnavailable,
    Misconfigured,
}

impl Display for RejectionReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectionReason::TxNotFinalized => "tx not found or not finalized",
            RejectionReason::NoQualifyingTransfer => "no qualifying transfer in block",
            RejectionReason::DeadlineExceeded => "verification deadline exceeded",
            RejectionReason::InvalidRecipient => "invalid recipient address",
            RejectionReason::MalformedProof => "malformed payment proof",
            RejectionReason::MalformedRequest => "malformed request",
            RejectionReason::MissingFields => "missing required fields",
            RejectionReason::UpstreamUnavailable => "light client unavailable",
            RejectionReason::Misconfigured => "light client misconfigured",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub amount: u64,
}

impl VerifyRequest {
    /// The hash keys of the body, which sit alongside `recipient` and `amount`.
    pub fn proof(&self) -> ProofFields {
        ProofFields {
            transaction_hash: self.transaction_hash.clone(),
            block_hash: self.block_hash.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub course_cost: u64,
    #[serde(default)]
    pub payment_proof: Option<ProofFields>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PremiumQuery {
    pub recipient: Option<String>,
    pub amount: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentInfoQuery {
    pub recipient: Option<String>,
    pub amount: Option<u64>,
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub verified: bool,
    pub payment: VerifiedPayment,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollResponse {
    pub success: bool,
    pub course_id: String,
    pub wallet_address: String,
    pub payment: VerifiedPayment,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PremiumResponse {
    pub content: String,
    pub payment_verified: VerifiedPayment,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    pub payment: PaymentInstructions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfoResponse {
    pub course_id: String,
    pub course_title: String,
    pub payment: PaymentInstructions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxToBlockResponse {
    pub found: bool,
    pub transaction_hash: String,
    pub block_hash: String,
    pub block_number: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub network: String,
    pub latest_block: u64,
    pub default_recipient: String,
    pub default_recipient_hex: CanonicalHex,
}

#[derive(Debug, Serialize)]
pub struct DebugEvent {
    pub index: u32,
    pub pallet: String,
    pub name: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct DebugBlockResponse {
    pub block_hash: String,
    pub total_events: usize,
    pub events: Vec<DebugEvent>,
}

/// Body of every non-success response.
///
/// `reason` is always present; `verified` / `found` are set by the endpoints whose
/// success bodies carry those flags.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found: Option<bool>,
    pub error: String,
    pub reason: RejectionReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
}

impl RejectionResponse {
    pub fn new(reason: RejectionReason, error: impl Into<String>) -> Self {
        Self {
            verified: None,
            found: None,
            error: error.into(),
            reason,
            details: None,
            hint: None,
            transaction_hash: None,
        }
    }

    pub fn verified(mut self, verified: bool) -> Self {
        self.verified = Some(verified);
        self
    }

    pub fn found(mut self, found: bool) -> Self {
        self.found = Some(found);
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn transaction_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.transaction_hash = Some(tx_hash.into());
        self
    }
}
