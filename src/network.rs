//! Supported-network table and chain id resolution.

use crate::chain::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Chains the wallet connector is configured for, with their pinned transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownChain {
    /// Logical network key used in configuration.
    pub key: &'static str,
    /// Human-readable chain name.
    pub label: &'static str,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// RPC endpoint pinned for this chain, if any.
    pub default_rpc: Option<&'static str>,
}

/// Wallet connector chain catalog.
pub const KNOWN_CHAINS: &[KnownChain] = &[
    KnownChain {
        key: "filecoin",
        label: "Filecoin Mainnet",
        chain_id: 314,
        default_rpc: Some("https://api.node.glif.io"),
    },
    KnownChain {
        key: "filecoinCalibration",
        label: "Filecoin Calibration",
        chain_id: 314_159,
        default_rpc: None,
    },
    KnownChain {
        key: "optimism",
        label: "OP Mainnet",
        chain_id: 10,
        default_rpc: None,
    },
    KnownChain {
        key: "optimismSepolia",
        label: "OP Sepolia",
        chain_id: 11_155_420,
        default_rpc: None,
    },
    KnownChain {
        key: "polygon",
        label: "Polygon",
        chain_id: 137,
        default_rpc: None,
    },
    KnownChain {
        key: "polygonAmoy",
        label: "Polygon Amoy",
        chain_id: 80_002,
        default_rpc: None,
    },
    KnownChain {
        key: "polygonZkEvmCardona",
        label: "Polygon zkEVM Cardona",
        chain_id: 2_442,
        default_rpc: None,
    },
    KnownChain {
        key: "lineaSepolia",
        label: "Linea Sepolia",
        chain_id: 59_141,
        default_rpc: None,
    },
];

/// Looks up a catalog entry by chain id.
pub fn known_chain(chain_id: u64) -> Option<&'static KnownChain> {
    KNOWN_CHAINS.iter().find(|chain| chain.chain_id == chain_id)
}

/// Contract addresses deployed on one supported network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    /// Logical network name (e.g. `polygonAmoy`).
    pub name: String,
    /// EIP-155 chain id; configuration accepts a number or `0x` hex string.
    #[serde(
        serialize_with = "serialize_chain_id",
        deserialize_with = "deserialize_chain_id"
    )]
    pub chain_id: u64,
    /// Credit token (ERC-20) contract.
    pub token_address: Address,
    /// Invoice contract that receives debits and reports balances.
    pub invoice_address: Address,
    /// Optional RPC endpoint override for this network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

impl NetworkProfile {
    /// RPC endpoint for this network: explicit override, then the catalog default.
    pub fn rpc_endpoint(&self) -> Option<&str> {
        self.rpc_url
            .as_deref()
            .or_else(|| known_chain(self.chain_id).and_then(|chain| chain.default_rpc))
    }
}

/// Ordered table of supported networks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkTable {
    networks: Vec<NetworkProfile>,
}

impl NetworkTable {
    /// Builds a table, rejecting duplicate names or chain ids.
    pub fn new(networks: Vec<NetworkProfile>) -> Result<Self, NetworkError> {
        let table = Self { networks };
        table.validate()?;
        Ok(table)
    }

    /// Checks that every name and chain id appears once.
    pub fn validate(&self) -> Result<(), NetworkError> {
        for (idx, profile) in self.networks.iter().enumerate() {
            for other in &self.networks[idx + 1..] {
                if other.chain_id == profile.chain_id {
                    return Err(NetworkError::DuplicateChain(profile.chain_id));
                }
                if other.name == profile.name {
                    return Err(NetworkError::DuplicateName(profile.name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Maps a chain id to its profile by scanning the table in order.
    pub fn resolve(&self, chain_id: u64) -> Result<&NetworkProfile, NetworkError> {
        self.networks
            .iter()
            .find(|profile| profile.chain_id == chain_id)
            .ok_or(NetworkError::Unsupported { chain_id })
    }

    /// Iterates over all profiles in table order.
    pub fn iter(&self) -> impl Iterator<Item = &NetworkProfile> {
        self.networks.iter()
    }

    /// Number of supported networks.
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    /// `true` when no network is configured.
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

/// Network resolution and table validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// The wallet is on a chain with no configured profile.
    #[error("Unsupported network (chain id {})", hex_id(chain_id))]
    Unsupported {
        /// Chain the wallet reported.
        chain_id: u64,
    },
    /// Two profiles share a chain id.
    #[error("chain id {} configured twice", hex_id(.0))]
    DuplicateChain(u64),
    /// Two profiles share a name.
    #[error("network `{0}` configured twice")]
    DuplicateName(String),
}

/// `0x`-prefixed lower-case hex form used by wallets for chain ids.
pub fn chain_id_hex(chain_id: u64) -> String {
    format!("0x{chain_id:x}")
}

fn hex_id(chain_id: &u64) -> String {
    chain_id_hex(*chain_id)
}

/// Parses a chain id written as decimal or `0x` hex.
pub fn parse_chain_id(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => trimmed.parse().ok(),
    }
}

fn serialize_chain_id<S: Serializer>(chain_id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&chain_id_hex(*chain_id))
}

fn deserialize_chain_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(text) => parse_chain_id(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid chain id `{text}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn profile(name: &str, chain_id: u64, fill: char) -> NetworkProfile {
        let addr = |c: char| Address::parse(&format!("0x{}", c.to_string().repeat(40))).unwrap();
        NetworkProfile {
            name: name.to_string(),
            chain_id,
            token_address: addr(fill),
            invoice_address: addr('f'),
            rpc_url: None,
        }
    }

    #[test]
    fn resolves_configured_chain() {
        let table = NetworkTable::new(vec![
            profile("polygonAmoy", 80_002, 'a'),
            profile("filecoinCalibration", 314_159, 'b'),
        ])
        .unwrap();
        let hit = table.resolve(314_159).unwrap();
        assert_eq!(hit.name, "filecoinCalibration");
        assert_eq!(hit.token_address.as_str(), format!("0x{}", "b".repeat(40)));
    }

    #[test]
    fn unknown_chain_is_unsupported() {
        let table = NetworkTable::new(vec![profile("polygon", 137, 'a')]).unwrap();
        assert_eq!(
            table.resolve(1),
            Err(NetworkError::Unsupported { chain_id: 1 })
        );
        assert!(NetworkTable::default().resolve(137).is_err());
    }

    #[test]
    fn duplicate_entries_rejected() {
        let dup_chain = NetworkTable::new(vec![profile("a", 10, 'a'), profile("b", 10, 'b')]);
        assert_eq!(dup_chain, Err(NetworkError::DuplicateChain(10)));
        let dup_name = NetworkTable::new(vec![profile("a", 10, 'a'), profile("a", 11, 'b')]);
        assert_eq!(dup_name, Err(NetworkError::DuplicateName("a".into())));
    }

    #[test]
    fn chain_ids_parse_from_hex_or_decimal() {
        let json = r#"[
            {"name":"filecoin","chain_id":"0x13a","token_address":"0x1111111111111111111111111111111111111111","invoice_address":"0x2222222222222222222222222222222222222222"},
            {"name":"optimism","chain_id":10,"token_address":"0x3333333333333333333333333333333333333333","invoice_address":"0x4444444444444444444444444444444444444444"}
        ]"#;
        let table: NetworkTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.resolve(314).unwrap().name, "filecoin");
        assert_eq!(table.resolve(10).unwrap().name, "optimism");
        assert_eq!(parse_chain_id("0X13A"), Some(314));
        assert_eq!(parse_chain_id("nope"), None);
    }

    #[test]
    fn rpc_endpoint_falls_back_to_catalog() {
        let mut fil = profile("filecoin", 314, 'a');
        assert_eq!(fil.rpc_endpoint(), Some("https://api.node.glif.io"));
        fil.rpc_url = Some("http://localhost:1234/rpc/v1".into());
        assert_eq!(fil.rpc_endpoint(), Some("http://localhost:1234/rpc/v1"));
        assert_eq!(profile("optimism", 10, 'a').rpc_endpoint(), None);
    }

    #[test]
    fn unsupported_message_uses_hex_chain_id() {
        let err = NetworkError::Unsupported { chain_id: 314 };
        assert_eq!(err.to_string(), "Unsupported network (chain id 0x13a)");
        assert_eq!(known_chain(80_002).map(|c| c.key), Some("polygonAmoy"));
    }

    proptest! {
        #[test]
        fn unlisted_chains_never_resolve(chain_id in any::<u64>()) {
            prop_assume!(chain_id != 137 && chain_id != 80_002);
            let table = NetworkTable::new(vec![
                profile("polygon", 137, 'a'),
                profile("polygonAmoy", 80_002, 'b'),
            ])
            .unwrap();
            prop_assert_eq!(table.resolve(chain_id), Err(NetworkError::Unsupported { chain_id }));
        }
    }
}
