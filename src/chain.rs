//! Wallet and token-contract seam used by the action coordinator.
//!
//! [`ChainClient`] is the only way the coordinator talks to a chain. The
//! `net` feature provides a JSON-RPC implementation
//! ([`RpcWallet`](crate::net::RpcWallet)); [`MemoryLedger`](crate::ledger::MemoryLedger)
//! keeps balances in process for offline use and tests.

use crate::amount::TokenAmount;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Lower-cased, `0x`-prefixed 20-byte EVM address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    /// The all-zero address.
    pub fn zero() -> Self {
        Self(format!("0x{}", "0".repeat(40)))
    }

    /// Parses and normalises a hex address; returns `None` for malformed input.
    pub fn parse(value: &str) -> Option<Self> {
        normalize_evm_address(value).map(Self)
    }

    /// Builds an address from its raw 20 bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    /// Raw 20 bytes of the address.
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        // Construction guarantees 40 valid hex digits after the prefix.
        if let Ok(raw) = hex::decode(&self.0[2..]) {
            out.copy_from_slice(&raw);
        }
        out
    }

    /// Hex form, `0x`-prefixed.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ChainError::InvalidAddress(s.to_string()))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid address `{raw}`")))
    }
}

/// Transaction hash as returned by the chain (`0x`-prefixed hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Minimal view of a mined transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Hash of the mined transaction.
    pub transaction_hash: TxHash,
    /// Block that included the transaction.
    pub block_number: u64,
    /// `true` when execution succeeded (status `0x1`).
    pub success: bool,
}

/// Failures reported by a chain client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// Malformed address literal.
    #[error("invalid address `{0}`")]
    InvalidAddress(String),
    /// The endpoint answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message reported by the node.
        message: String,
    },
    /// The request never reached the node or the response was unreadable.
    #[error("transport error: {0}")]
    Transport(String),
    /// A response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Local signing failed or was refused.
    #[error("signing failed: {0}")]
    Signing(String),
    /// The sender cannot cover the transfer.
    #[error("insufficient token balance: have {available}, need {required}")]
    InsufficientFunds {
        /// Balance held by the sender.
        available: TokenAmount,
        /// Amount requested.
        required: TokenAmount,
    },
    /// The transaction was mined but execution reverted.
    #[error("transaction {0} reverted")]
    Reverted(TxHash),
    /// No receipt showed up within the polling budget.
    #[error("no receipt for {0} after {1} polls")]
    ReceiptTimeout(TxHash, u32),
}

/// Connected wallet plus the two contract calls the coordinator needs.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain the wallet is currently connected to.
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Account that signs transfers and owns the credit balance.
    fn account(&self) -> Address;

    /// Invoice contract `getUserTokens()` read for the connected account.
    async fn user_tokens(&self, invoice: &Address) -> Result<TokenAmount, ChainError>;

    /// Token contract `transfer(to, amount)`; returns once the transaction is submitted.
    async fn transfer(
        &self,
        token: &Address,
        to: &Address,
        amount: TokenAmount,
    ) -> Result<TxHash, ChainError>;

    /// Waits until `tx` is final. A reverted transaction is an error.
    async fn wait_for_receipt(&self, tx: &TxHash) -> Result<Receipt, ChainError>;
}

pub(crate) fn normalize_evm_address(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if !(trimmed.starts_with("0x") || trimmed.starts_with("0X")) {
        return None;
    }
    if trimmed.len() != 42 {
        return None;
    }
    let raw = &trimmed[2..];
    if !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", raw.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_hex_address() {
        let addr = Address::parse("0xAbCdEfabcdefABCDefAbcdefABcdefabCDefAb12").unwrap();
        assert_eq!(addr.as_str(), "0xabcdefabcdefabcdefabcdefabcdefabcdefab12");
    }

    #[test]
    fn rejects_short_or_unprefixed() {
        assert!(Address::parse("abcdefabcdefabcdefabcdefabcdefabcdefab12").is_none());
        assert!(Address::parse("0x1234").is_none());
        assert!(Address::parse("0xzzcdefabcdefabcdefabcdefabcdefabcdefab12").is_none());
    }

    #[test]
    fn bytes_round_trip() {
        let bytes = [0x11u8; 20];
        let addr = Address::from_bytes(bytes);
        assert_eq!(addr.to_bytes(), bytes);
        assert_eq!(Address::zero().to_bytes(), [0u8; 20]);
    }

    #[test]
    fn serde_validates_addresses() {
        let ok: Address =
            serde_json::from_str("\"0x00000000000000000000000000000000000000AA\"").unwrap();
        assert_eq!(ok.as_str(), "0x00000000000000000000000000000000000000aa");
        assert!(serde_json::from_str::<Address>("\"0x12\"").is_err());
    }
}
