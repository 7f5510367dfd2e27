use crate::amount::TokenAmount;
use crate::chain::{Address, ChainClient, ChainError, Receipt, TxHash};
use crate::config::ReceiptPolicy;
use crate::net::abi::{self, keccak256};
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use rlp::RlpStream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time;
use tracing::{debug, info};

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_PRIORITY_FEE: u128 = 1_000_000_000;
const GAS_MARGIN_PERCENT: u64 = 120;

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl From<RpcError> for ChainError {
    fn from(err: RpcError) -> Self {
        ChainError::Rpc {
            code: err.code,
            message: err.message,
        }
    }
}

/// Unsigned EIP-1559 token call.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Eip1559Call {
    chain_id: u64,
    nonce: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    gas_limit: u64,
    to: Address,
    data: Vec<u8>,
}

impl Eip1559Call {
    fn append_fields(&self, stream: &mut RlpStream) {
        stream.append(&self.chain_id);
        stream.append(&self.nonce);
        stream.append(&self.max_priority_fee_per_gas);
        stream.append(&self.max_fee_per_gas);
        stream.append(&self.gas_limit);
        stream.append(&self.to.to_bytes().to_vec());
        stream.append(&0u64);
        stream.append(&self.data);
        stream.begin_list(0);
    }

    fn sighash(&self) -> [u8; 32] {
        let mut stream = RlpStream::new_list(9);
        self.append_fields(&mut stream);
        keccak256(&typed_envelope(stream.out().as_ref()))
    }

    /// Signs and returns the raw `0x02 || rlp(...)` transaction.
    fn sign(&self, key: &SigningKey) -> Result<Vec<u8>, ChainError> {
        let (signature, recovery) = key
            .sign_prehash_recoverable(&self.sighash())
            .map_err(|err| ChainError::Signing(err.to_string()))?;
        let bytes = signature.to_bytes();
        let mut stream = RlpStream::new_list(12);
        self.append_fields(&mut stream);
        stream.append(&u64::from(recovery.to_byte()));
        stream.append(&strip_leading_zeros(&bytes[..32]));
        stream.append(&strip_leading_zeros(&bytes[32..]));
        Ok(typed_envelope(stream.out().as_ref()))
    }
}

fn typed_envelope(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(0x02);
    out.extend_from_slice(payload);
    out
}

fn strip_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes
        .iter()
        .position(|byte| *byte != 0)
        .unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

/// Wallet backed by a JSON-RPC node and a local secp256k1 key.
pub struct RpcWallet {
    http: reqwest::Client,
    url: String,
    key: SigningKey,
    account: Address,
    receipts: ReceiptPolicy,
    next_id: AtomicU64,
}

impl fmt::Debug for RpcWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcWallet")
            .field("url", &self.url)
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl RpcWallet {
    /// Wallet signing with `key` against the node at `url`.
    pub fn new(
        url: impl Into<String>,
        key: SigningKey,
        receipts: ReceiptPolicy,
        user_agent: &str,
    ) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS))
            .user_agent(user_agent)
            .build()
            .map_err(|err| ChainError::Transport(err.to_string()))?;
        let account = address_of(&key);
        Ok(Self {
            http,
            url: url.into(),
            key,
            account,
            receipts,
            next_id: AtomicU64::new(1),
        })
    }

    /// Node endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        debug!(method, id, "rpc request");
        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|err| ChainError::Transport(err.to_string()))?;
        let envelope: JsonRpcResponse = response
            .json()
            .await
            .map_err(|err| ChainError::Transport(format!("{method}: {err}")))?;
        if let Some(err) = envelope.error {
            return Err(err.into());
        }
        Ok(envelope.result.unwrap_or(Value::Null))
    }

    async fn quantity(&self, method: &str, params: Value) -> Result<u128, ChainError> {
        let value = self.call(method, params).await?;
        parse_quantity(&value).ok_or_else(|| {
            ChainError::Decode(format!("{method}: expected hex quantity, got {value}"))
        })
    }

    async fn priority_fee(&self) -> u128 {
        match self.quantity("eth_maxPriorityFeePerGas", json!([])).await {
            Ok(fee) => fee,
            Err(err) => {
                debug!(error = %err, "priority fee unavailable, using default");
                DEFAULT_PRIORITY_FEE
            }
        }
    }
}

#[async_trait]
impl ChainClient for RpcWallet {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        let id = self.quantity("eth_chainId", json!([])).await?;
        u64::try_from(id).map_err(|_| ChainError::Decode(format!("chain id {id} out of range")))
    }

    fn account(&self) -> Address {
        self.account.clone()
    }

    async fn user_tokens(&self, invoice: &Address) -> Result<TokenAmount, ChainError> {
        let call = json!({
            "from": self.account.as_str(),
            "to": invoice.as_str(),
            "data": to_hex_data(&abi::encode_user_tokens()),
        });
        let output = self.call("eth_call", json!([call, "latest"])).await?;
        let bytes = output
            .as_str()
            .ok_or_else(|| ChainError::Decode("eth_call: expected hex data".into()))
            .and_then(decode_hex_prefixed)?;
        abi::decode_uint(&bytes).map(TokenAmount::from_base_units)
    }

    async fn transfer(
        &self,
        token: &Address,
        to: &Address,
        amount: TokenAmount,
    ) -> Result<TxHash, ChainError> {
        let chain_id = self.chain_id().await?;
        let data = abi::encode_transfer(to, amount.base_units());
        let nonce = self
            .quantity(
                "eth_getTransactionCount",
                json!([self.account.as_str(), "pending"]),
            )
            .await?;
        let gas_price = self.quantity("eth_gasPrice", json!([])).await?;
        let priority = self.priority_fee().await;
        let estimate = self
            .quantity(
                "eth_estimateGas",
                json!([{
                    "from": self.account.as_str(),
                    "to": token.as_str(),
                    "data": to_hex_data(&data),
                }]),
            )
            .await?;
        let tx = Eip1559Call {
            chain_id,
            nonce: u64::try_from(nonce)
                .map_err(|_| ChainError::Decode("nonce out of range".into()))?,
            max_priority_fee_per_gas: priority,
            max_fee_per_gas: gas_price.saturating_mul(2).saturating_add(priority),
            gas_limit: gas_with_margin(estimate)?,
            to: token.clone(),
            data,
        };
        let raw = tx.sign(&self.key)?;
        let sent = self
            .call("eth_sendRawTransaction", json!([to_hex_data(&raw)]))
            .await?;
        let hash = sent
            .as_str()
            .map(|hash| TxHash(hash.to_ascii_lowercase()))
            .unwrap_or_else(|| TxHash(to_hex_data(&keccak256(&raw))));
        info!(tx = %hash, token = %token, to = %to, amount = %amount, "transfer submitted");
        Ok(hash)
    }

    async fn wait_for_receipt(&self, tx: &TxHash) -> Result<Receipt, ChainError> {
        for attempt in 0..self.receipts.max_polls {
            let value = self
                .call("eth_getTransactionReceipt", json!([tx.0.as_str()]))
                .await?;
            if value.is_null() {
                debug!(tx = %tx, attempt, "receipt pending");
                time::sleep(self.receipts.poll_interval()).await;
                continue;
            }
            let receipt = parse_receipt(tx, &value)?;
            if !receipt.success {
                return Err(ChainError::Reverted(tx.clone()));
            }
            return Ok(receipt);
        }
        Err(ChainError::ReceiptTimeout(
            tx.clone(),
            self.receipts.max_polls,
        ))
    }
}

/// Parses a hex private key (with or without `0x`).
pub fn parse_signing_key(input: &str) -> Result<SigningKey, ChainError> {
    let trimmed = input.trim();
    let raw = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(raw).map_err(|err| ChainError::Signing(format!("invalid key hex: {err}")))?;
    if bytes.len() != 32 {
        return Err(ChainError::Signing(format!(
            "expected a 32-byte key, got {} bytes",
            bytes.len()
        )));
    }
    SigningKey::from_slice(&bytes).map_err(|err| ChainError::Signing(err.to_string()))
}

/// EVM address controlled by `key`.
pub fn address_of(key: &SigningKey) -> Address {
    let point = key.verifying_key().to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Address::from_bytes(out)
}

fn parse_receipt(tx: &TxHash, value: &Value) -> Result<Receipt, ChainError> {
    let field = |name: &str| value.get(name).and_then(parse_quantity);
    let status = field("status")
        .ok_or_else(|| ChainError::Decode(format!("receipt for {tx} has no status")))?;
    let block_number = field("blockNumber")
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| ChainError::Decode(format!("receipt for {tx} has no block number")))?;
    Ok(Receipt {
        transaction_hash: tx.clone(),
        block_number,
        success: status == 1,
    })
}

fn gas_with_margin(estimate: u128) -> Result<u64, ChainError> {
    let gas = u64::try_from(estimate)
        .map_err(|_| ChainError::Decode(format!("gas estimate {estimate} out of range")))?;
    Ok(gas.saturating_mul(GAS_MARGIN_PERCENT) / 100)
}

fn parse_quantity(value: &Value) -> Option<u128> {
    if let Some(v) = value.as_u64() {
        return Some(u128::from(v));
    }
    let s = value.as_str()?;
    let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    if hex.is_empty() {
        return Some(0);
    }
    u128::from_str_radix(hex, 16).ok()
}

fn to_hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn decode_hex_prefixed(input: &str) -> Result<Vec<u8>, ChainError> {
    let trimmed = input.trim();
    let raw = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| ChainError::Decode("hex payload must start with 0x".into()))?;
    hex::decode(raw).map_err(|err| ChainError::Decode(format!("invalid hex payload: {err}")))
}
