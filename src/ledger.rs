//! In-process credit ledger implementing [`ChainClient`].
//!
//! Balances are tracked per chain and per holder address. The ledger can be
//! persisted to JSON so the CLI's offline mode keeps state between runs.

use crate::amount::TokenAmount;
use crate::chain::{Address, ChainClient, ChainError, Receipt, TxHash};
use async_trait::async_trait;
use blake2::digest::{consts::U32, Digest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

type Blake2b256 = blake2::Blake2b<U32>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ChainBook {
    height: u64,
    nonce: u64,
    balances: BTreeMap<Address, TokenAmount>,
    receipts: BTreeMap<String, Receipt>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerState {
    active_chain: u64,
    chains: BTreeMap<u64, ChainBook>,
}

/// Per-chain token balances held in memory, optionally mirrored to a JSON file.
#[derive(Debug)]
pub struct MemoryLedger {
    account: Address,
    path: Option<PathBuf>,
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    /// Fresh ledger for `account`, connected to `chain_id`.
    pub fn new(account: Address, chain_id: u64) -> Self {
        Self {
            account,
            path: None,
            state: Mutex::new(LedgerState {
                active_chain: chain_id,
                chains: BTreeMap::new(),
            }),
        }
    }

    /// Loads from JSON; missing file -> fresh ledger on `default_chain`.
    /// Every mutation is written back to `path`.
    pub fn open(
        path: impl Into<PathBuf>,
        account: Address,
        default_chain: u64,
    ) -> Result<Self, ChainError> {
        let path = path.into();
        let state = if path.exists() {
            let bytes = fs::read(&path)
                .map_err(|err| ChainError::Transport(format!("failed to read ledger: {err}")))?;
            serde_json::from_slice(&bytes)
                .map_err(|err| ChainError::Decode(format!("failed to decode ledger: {err}")))?
        } else {
            LedgerState {
                active_chain: default_chain,
                chains: BTreeMap::new(),
            }
        };
        Ok(Self {
            account,
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Credits `amount` to `holder` on `chain_id`.
    pub fn fund(&self, chain_id: u64, holder: &Address, amount: TokenAmount) -> Result<(), ChainError> {
        self.mutate(|state| {
            let book = state.chains.entry(chain_id).or_default();
            let entry = book.balances.entry(holder.clone()).or_default();
            *entry = TokenAmount::from_base_units(
                entry.base_units().saturating_add(amount.base_units()),
            );
            Ok(())
        })
    }

    /// Reconnects the wallet to `chain_id`.
    pub fn switch_chain(&self, chain_id: u64) -> Result<(), ChainError> {
        self.mutate(|state| {
            state.active_chain = chain_id;
            Ok(())
        })
    }

    /// Balance of `holder` on `chain_id`.
    pub fn balance_of(&self, chain_id: u64, holder: &Address) -> TokenAmount {
        self.state
            .lock()
            .ok()
            .and_then(|state| {
                state
                    .chains
                    .get(&chain_id)
                    .and_then(|book| book.balances.get(holder).copied())
            })
            .unwrap_or_default()
    }

    /// Backing file, if persisted.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut LedgerState) -> Result<T, ChainError>,
    ) -> Result<T, ChainError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ChainError::Transport("ledger lock poisoned".into()))?;
        let mut next = state.clone();
        let out = apply(&mut next)?;
        save_state(self.path.as_deref(), &next)?;
        *state = next;
        Ok(out)
    }
}

#[async_trait]
impl ChainClient for MemoryLedger {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.state
            .lock()
            .map(|state| state.active_chain)
            .map_err(|_| ChainError::Transport("ledger lock poisoned".into()))
    }

    fn account(&self) -> Address {
        self.account.clone()
    }

    async fn user_tokens(&self, _invoice: &Address) -> Result<TokenAmount, ChainError> {
        let chain_id = self.chain_id().await?;
        Ok(self.balance_of(chain_id, &self.account))
    }

    async fn transfer(
        &self,
        _token: &Address,
        to: &Address,
        amount: TokenAmount,
    ) -> Result<TxHash, ChainError> {
        let from = self.account.clone();
        self.mutate(|state| {
            let chain_id = state.active_chain;
            let book = state.chains.entry(chain_id).or_default();
            let available = book.balances.get(&from).copied().unwrap_or_default();
            if available < amount {
                return Err(ChainError::InsufficientFunds {
                    available,
                    required: amount,
                });
            }
            book.balances.insert(from.clone(), available.saturating_sub(amount));
            let credited = book.balances.entry(to.clone()).or_default();
            *credited = TokenAmount::from_base_units(
                credited.base_units().saturating_add(amount.base_units()),
            );

            let hash = synthetic_tx_hash(chain_id, book.nonce, &from, to, amount);
            book.nonce = book.nonce.saturating_add(1);
            book.height = book.height.saturating_add(1);
            book.receipts.insert(
                hash.0.clone(),
                Receipt {
                    transaction_hash: hash.clone(),
                    block_number: book.height,
                    success: true,
                },
            );
            Ok(hash)
        })
    }

    async fn wait_for_receipt(&self, tx: &TxHash) -> Result<Receipt, ChainError> {
        let state = self
            .state
            .lock()
            .map_err(|_| ChainError::Transport("ledger lock poisoned".into()))?;
        state
            .chains
            .values()
            .find_map(|book| book.receipts.get(&tx.0).cloned())
            .ok_or_else(|| ChainError::Rpc {
                code: -32000,
                message: format!("unknown transaction {tx}"),
            })
    }
}

fn save_state(path: Option<&Path>, state: &LedgerState) -> Result<(), ChainError> {
    let Some(path) = path else {
        return Ok(());
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| ChainError::Transport(format!("failed to create ledger dir: {err}")))?;
    }
    let bytes = serde_json::to_vec_pretty(state)
        .map_err(|err| ChainError::Decode(format!("failed to encode ledger: {err}")))?;
    fs::write(path, bytes)
        .map_err(|err| ChainError::Transport(format!("failed to write ledger: {err}")))
}

fn synthetic_tx_hash(
    chain_id: u64,
    nonce: u64,
    from: &Address,
    to: &Address,
    amount: TokenAmount,
) -> TxHash {
    let mut hasher = Blake2b256::new();
    hasher.update(b"medisheet-ledger-tx-v1:");
    hasher.update(chain_id.to_be_bytes());
    hasher.update(nonce.to_be_bytes());
    hasher.update(from.to_bytes());
    hasher.update(to.to_bytes());
    hasher.update(amount.base_units().to_be_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    TxHash(format!("0x{}", hex::encode(digest)))
}
