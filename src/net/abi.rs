//! Solidity ABI encoding for the two token calls the wallet makes.

use crate::chain::{Address, ChainError};
use sha3::{Digest, Keccak256};

/// `transfer(address,uint256)` on the credit token.
pub const TRANSFER_SIGNATURE: &str = "transfer(address,uint256)";
/// `getUserTokens()` on the invoice contract.
pub const USER_TOKENS_SIGNATURE: &str = "getUserTokens()";

pub(crate) fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// First four bytes of the Keccak-256 hash of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

fn address_word(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&address.to_bytes());
    word
}

fn uint_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Calldata for `transfer(to, amount)`.
pub fn encode_transfer(to: &Address, amount: u128) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 64);
    data.extend_from_slice(&selector(TRANSFER_SIGNATURE));
    data.extend_from_slice(&address_word(to));
    data.extend_from_slice(&uint_word(amount));
    data
}

/// Calldata for `getUserTokens()`.
pub fn encode_user_tokens() -> Vec<u8> {
    selector(USER_TOKENS_SIGNATURE).to_vec()
}

/// Reads the first return word as a `uint256` that must fit in 128 bits.
pub fn decode_uint(output: &[u8]) -> Result<u128, ChainError> {
    if output.len() < 32 {
        return Err(ChainError::Decode(format!(
            "expected a 32-byte word, got {} bytes",
            output.len()
        )));
    }
    let word = &output[..32];
    if word[..16].iter().any(|byte| *byte != 0) {
        return Err(ChainError::Decode("uint256 exceeds 128 bits".into()));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_selector_matches_erc20() {
        assert_eq!(hex::encode(selector(TRANSFER_SIGNATURE)), "a9059cbb");
    }

    #[test]
    fn transfer_calldata_layout() {
        let to = Address::parse("0x00000000000000000000000000000000000000ff").unwrap();
        let data = encode_transfer(&to, 1_000_000_000_000_000_000);
        assert_eq!(data.len(), 68);
        assert_eq!(data[35], 0xff);
        assert!(data[4..35].iter().all(|b| *b == 0));
        assert_eq!(decode_uint(&data[36..]).unwrap(), 1_000_000_000_000_000_000);
    }

    #[test]
    fn oversized_words_rejected() {
        let mut word = [0u8; 32];
        word[0] = 1;
        assert!(decode_uint(&word).is_err());
        assert!(decode_uint(&[0u8; 8]).is_err());
    }
}
