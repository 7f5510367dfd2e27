//! Live network collaborators: a JSON-RPC wallet and an HTTP upload client.
//!
//! Gated behind the `net` Cargo feature. Offline builds use
//! [`MemoryLedger`](crate::ledger::MemoryLedger) and
//! [`MemoryContentStore`](crate::content::MemoryContentStore) instead.

#![cfg(feature = "net")]

/// ABI encoding for the token and invoice contract calls.
pub mod abi;
/// EIP-1559 signing wallet over JSON-RPC.
pub mod rpc;
/// IPFS-compatible upload client.
pub mod storage;

pub use rpc::{address_of, parse_signing_key, RpcWallet};
pub use storage::HttpContentStore;
