//! Ledger access over Solana JSON-RPC.
//!
//! [`LedgerClient`] is the seam between discovery and the network: the
//! chain scanner and the metadata resolver only need token accounts by
//! owner and raw account data. [`RpcClient`] is the HTTP implementation.

pub mod metadata;
pub mod rpc;

pub use metadata::{
    AgentDetail, MetadataAccount, MetadataError, MetadataResolver, OnChainMetadataResolver,
    ResolvedMetadata,
};
pub use rpc::RpcClient;

use async_trait::async_trait;

use crate::identity::wallet::Pubkey;

/// Commitment level used for every ledger read.
pub const COMMITMENT: &str = "confirmed";

/// A parsed SPL token account, reduced to what discovery needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccount {
    /// Mint the account holds. `None` when the parsed payload had no mint.
    pub mint: Option<String>,
    /// Raw amount in base units, before applying decimals.
    pub amount: u128,
}

impl TokenAccount {
    /// Parse one element of `getParsedTokenAccountsByOwner`'s `value` array.
    ///
    /// The amount may arrive as a string (the RPC default) or a number;
    /// anything unreadable counts as zero.
    pub fn from_parsed(entry: &serde_json::Value) -> Self {
        let info = entry.pointer("/account/data/parsed/info");
        let mint = info
            .and_then(|i| i.get("mint"))
            .and_then(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        let amount = match info.and_then(|i| i.pointer("/tokenAmount/amount")) {
            Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
            Some(serde_json::Value::Number(n)) => n.as_u64().map(u128::from).unwrap_or(0),
            _ => 0,
        };
        Self { mint, amount }
    }

    /// Whether the owner actually holds some of the token.
    pub fn is_held(&self) -> bool {
        self.amount > 0
    }
}

/// Read access to the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// All token accounts owned by `owner` under one token program.
    async fn token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        program_id: &Pubkey,
    ) -> Result<Vec<TokenAccount>, RpcError>;

    /// Raw data of an account, or `None` if it does not exist.
    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, RpcError>;
}

/// JSON-RPC failures.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Carries no request URL; endpoints may embed credentials.
    #[error("rpc transport error: {0}")]
    Transport(reqwest::Error),
    #[error("rpc endpoint returned HTTP {0}")]
    Status(u16),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed rpc response: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(mint: &str, amount: serde_json::Value) -> serde_json::Value {
        json!({
            "pubkey": "Acct",
            "account": {
                "data": {
                    "program": "spl-token",
                    "parsed": {
                        "type": "account",
                        "info": {"mint": mint, "tokenAmount": {"amount": amount, "decimals": 0}}
                    }
                }
            }
        })
    }

    #[test]
    fn parses_string_and_numeric_amounts() {
        let a = TokenAccount::from_parsed(&entry("MintA", json!("1")));
        assert_eq!(a.mint.as_deref(), Some("MintA"));
        assert!(a.is_held());

        let b = TokenAccount::from_parsed(&entry("MintB", json!(42)));
        assert_eq!(b.amount, 42);
    }

    #[test]
    fn zero_and_garbage_amounts_are_not_held() {
        assert!(!TokenAccount::from_parsed(&entry("MintC", json!("0"))).is_held());
        assert!(!TokenAccount::from_parsed(&entry("MintC", json!("lots"))).is_held());
        assert!(!TokenAccount::from_parsed(&json!({"account": {}})).is_held());
    }

    #[test]
    fn large_amounts_do_not_overflow() {
        let a = TokenAccount::from_parsed(&entry("MintD", json!("18446744073709551616")));
        assert_eq!(a.amount, 18_446_744_073_709_551_616);
    }
}
