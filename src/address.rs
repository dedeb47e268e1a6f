//! SS58 address decoding.
//!
//! Only the one-way mapping from a human-readable address to its 32-byte public key
//! is needed: transfer events carry raw public keys, so recipients are compared in
//! that form.
//!
//! Layout of a decoded address: `[prefix (1 or 2 bytes)][public key (32 bytes)][checksum (2 bytes)]`.
//! The checksum bytes are dropped without being verified.

use std::str::FromStr;

use crate::types::CanonicalHex;

pub const PUBLIC_KEY_LEN: usize = 32;
const CHECKSUM_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address {0:?} is not valid base58")]
    Base58(String),
    #[error("address {address:?} decodes to {len} bytes, expected 35 or 36")]
    Length { address: String, len: usize },
}

/// The public key encoded in a chain address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    public_key: [u8; PUBLIC_KEY_LEN],
}

impl Address {
    pub fn public_key_hex(&self) -> CanonicalHex {
        CanonicalHex::from_bytes(self.public_key)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let payload = bs58::decode(s)
            .into_vec()
            .map_err(|_| AddressError::Base58(s.to_string()))?;
        let prefix_len = match payload.len() {
            35 => 1,
            36 => 2,
            len => {
                return Err(AddressError::Length {
                    address: s.to_string(),
                    len,
                });
            }
        };
        debug_assert_eq!(payload.len(), prefix_len + PUBLIC_KEY_LEN + CHECKSUM_LEN);
        let mut public_key = [0u8; PUBLIC_KEY_LEN];
        public_key.copy_from_slice(&payload[prefix_len..prefix_len + PUBLIC_KEY_LEN]);
        Ok(Self { public_key })
    }
}

/// Decodes an SS58 address into the canonical hex of its public key.
pub fn decode(address: &str) -> Result<CanonicalHex, AddressError> {
    address.parse::<Address>().map(|a| a.public_key_hex())
}
