//! Metaplex token metadata: on-chain account decoding and off-chain JSON.
//!
//! Resolution for a mint is three hops: derive the metadata PDA, read and
//! decode the account to get its `uri`, then fetch the JSON at that URI.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{LedgerClient, RpcError};
use crate::identity::wallet::{AddressError, Pubkey, metadata_pda};
use crate::identity::{AgentCard, AgentConfig};

/// Account discriminator for `MetadataV1`.
const METADATA_V1_KEY: u8 = 4;
/// key (1) + update authority (32) + mint (32)
const DATA_OFFSET: usize = 65;

const IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";
const ARWEAVE_GATEWAY: &str = "https://arweave.net/";

/// The leading fields of a Metaplex metadata account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataAccount {
    pub update_authority: Pubkey,
    pub mint: Pubkey,
    pub name: String,
    pub symbol: String,
    pub uri: String,
}

impl MetadataAccount {
    /// Decode the borsh-encoded prefix of a metadata account.
    ///
    /// Strings are `u32` little-endian length-prefixed and NUL-padded to
    /// their maximum size on chain; padding is stripped.
    pub fn decode(data: &[u8]) -> Result<Self, MetadataError> {
        let key = *data
            .first()
            .ok_or_else(|| MetadataError::InvalidAccount("empty account data".to_string()))?;
        if key != METADATA_V1_KEY {
            return Err(MetadataError::InvalidAccount(format!(
                "unexpected account key {key}"
            )));
        }
        if data.len() < DATA_OFFSET {
            return Err(MetadataError::InvalidAccount("account too short".to_string()));
        }

        let update_authority = Pubkey::new(fixed_32(&data[1..33]));
        let mint = Pubkey::new(fixed_32(&data[33..65]));

        let mut cursor = DATA_OFFSET;
        let name = read_string(data, &mut cursor)?;
        let symbol = read_string(data, &mut cursor)?;
        let uri = read_string(data, &mut cursor)?;

        Ok(Self {
            update_authority,
            mint,
            name,
            symbol,
            uri,
        })
    }
}

fn fixed_32(slice: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(slice);
    out
}

fn read_string(data: &[u8], cursor: &mut usize) -> Result<String, MetadataError> {
    let len_end = *cursor + 4;
    let len_bytes = data
        .get(*cursor..len_end)
        .ok_or_else(|| MetadataError::InvalidAccount("truncated string length".to_string()))?;
    let len =
        u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    let end = len_end
        .checked_add(len)
        .ok_or_else(|| MetadataError::InvalidAccount("string length overflow".to_string()))?;
    let bytes = data
        .get(len_end..end)
        .ok_or_else(|| MetadataError::InvalidAccount("truncated string".to_string()))?;
    *cursor = end;
    Ok(String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .trim()
        .to_string())
}

/// Map storage-scheme URIs onto public HTTP gateways.
pub fn gateway_url(uri: &str) -> Result<Url, MetadataError> {
    let uri = uri.trim();
    let rewritten = if let Some(cid) = uri.strip_prefix("ipfs://") {
        format!("{IPFS_GATEWAY}{}", cid.trim_start_matches("ipfs/"))
    } else if let Some(id) = uri.strip_prefix("ar://") {
        format!("{ARWEAVE_GATEWAY}{id}")
    } else {
        uri.to_string()
    };
    let url = Url::parse(&rewritten).map_err(|e| MetadataError::InvalidUri(format!("{uri}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(MetadataError::InvalidUri(format!("unsupported scheme {other}"))),
    }
}

/// Metadata resolved for one mint: the on-chain account and its JSON.
#[derive(Debug, Clone)]
pub struct ResolvedMetadata {
    pub mint: String,
    pub account: MetadataAccount,
    pub json: Value,
}

impl ResolvedMetadata {
    fn json_text(&self, key: &str) -> Option<String> {
        self.json
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// The display card for this mint.
    ///
    /// Name comes from the JSON, then the on-chain account, then the mint.
    pub fn to_card(&self) -> AgentCard {
        let name = self
            .json_text("name")
            .or_else(|| Some(self.account.name.clone()).filter(|n| !n.is_empty()))
            .unwrap_or_else(|| self.mint.clone());
        AgentCard {
            mint: self.mint.clone(),
            name,
            image: self.json_text("image"),
            model: AgentConfig::from_metadata(&self.json).model,
        }
    }

    /// Full detail view for a single agent.
    pub fn to_detail(&self) -> AgentDetail {
        let card = self.to_card();
        AgentDetail {
            symbol: self
                .json_text("symbol")
                .unwrap_or_else(|| self.account.symbol.clone()),
            description: self.json_text("description"),
            config: AgentConfig::from_metadata(&self.json),
            metadata_uri: self.account.uri.clone(),
            links: explorer_links(&self.mint),
            mint: card.mint,
            name: card.name,
            image: card.image,
        }
    }
}

/// Everything shown for a single agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentDetail {
    pub mint: String,
    pub name: String,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub config: AgentConfig,
    pub metadata_uri: String,
    pub links: Vec<ExplorerLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplorerLink {
    pub label: &'static str,
    pub url: String,
}

/// Block explorer pages for a mint.
pub fn explorer_links(mint: &str) -> Vec<ExplorerLink> {
    vec![
        ExplorerLink {
            label: "explorer",
            url: format!("https://explorer.solana.com/address/{mint}"),
        },
        ExplorerLink {
            label: "solscan",
            url: format!("https://solscan.io/token/{mint}"),
        },
        ExplorerLink {
            label: "solanafm",
            url: format!("https://solana.fm/address/{mint}"),
        },
    ]
}

/// Resolves a mint to its metadata.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn resolve(&self, mint: &str) -> Result<ResolvedMetadata, MetadataError>;
}

/// Resolver that reads the metadata account from the ledger and fetches
/// the off-chain JSON over HTTP.
pub struct OnChainMetadataResolver {
    ledger: Arc<dyn LedgerClient>,
    http: reqwest::Client,
}

impl OnChainMetadataResolver {
    pub fn new(ledger: Arc<dyn LedgerClient>, http: reqwest::Client) -> Self {
        Self { ledger, http }
    }

    async fn fetch_json(&self, uri: &str) -> Result<Value, MetadataError> {
        let url = gateway_url(uri)?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status {
                uri: uri.to_string(),
                status: status.as_u16(),
            });
        }
        let json: Value = response
            .json()
            .await
            .map_err(|e| MetadataError::InvalidJson(e.to_string()))?;
        if !json.is_object() {
            return Err(MetadataError::InvalidJson("document is not an object".to_string()));
        }
        Ok(json)
    }
}

#[async_trait]
impl MetadataResolver for OnChainMetadataResolver {
    async fn resolve(&self, mint: &str) -> Result<ResolvedMetadata, MetadataError> {
        let mint_key: Pubkey = mint.parse().map_err(MetadataError::InvalidMint)?;
        let pda = metadata_pda(&mint_key).map_err(MetadataError::Derivation)?;

        let data = self
            .ledger
            .account_data(&pda)
            .await?
            .ok_or(MetadataError::AccountNotFound(pda))?;
        let account = MetadataAccount::decode(&data)?;
        if account.uri.is_empty() {
            return Err(MetadataError::MissingUri);
        }

        debug!(mint, uri = %account.uri, "fetching off-chain metadata");
        let json = self.fetch_json(&account.uri).await?;

        Ok(ResolvedMetadata {
            mint: mint.to_string(),
            account,
            json,
        })
    }
}

/// Why metadata for a mint could not be resolved.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("invalid mint address: {0}")]
    InvalidMint(AddressError),
    #[error("cannot derive metadata address: {0}")]
    Derivation(AddressError),
    #[error("metadata account {0} not found")]
    AccountNotFound(Pubkey),
    #[error("invalid metadata account: {0}")]
    InvalidAccount(String),
    #[error("metadata account has no uri")]
    MissingUri,
    #[error("invalid metadata uri: {0}")]
    InvalidUri(String),
    #[error(transparent)]
    Ledger(#[from] RpcError),
    #[error("metadata fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("metadata fetch from {uri} returned HTTP {status}")]
    Status { uri: String, status: u16 },
    #[error("invalid metadata json: {0}")]
    InvalidJson(String),
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    fn borsh_string(out: &mut Vec<u8>, s: &str, padded_to: usize) {
        let mut bytes = s.as_bytes().to_vec();
        bytes.resize(padded_to.max(bytes.len()), 0);
        out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&bytes);
    }

    /// Encode a metadata account the way the program lays it out.
    pub(crate) fn encode_account(mint: &Pubkey, name: &str, symbol: &str, uri: &str) -> Vec<u8> {
        let mut data = vec![METADATA_V1_KEY];
        data.extend_from_slice(&[9u8; 32]);
        data.extend_from_slice(mint.as_bytes());
        borsh_string(&mut data, name, 32);
        borsh_string(&mut data, symbol, 10);
        borsh_string(&mut data, uri, 200);
        // seller fee basis points and the rest of the account follow
        data.extend_from_slice(&[0u8; 16]);
        data
    }

    #[test]
    fn decode_strips_padding() {
        let mint = Pubkey::new([3; 32]);
        let data = encode_account(&mint, "Oracle", "H402", "https://arweave.net/abc");
        let account = MetadataAccount::decode(&data).unwrap();
        assert_eq!(account.mint, mint);
        assert_eq!(account.name, "Oracle");
        assert_eq!(account.symbol, "H402");
        assert_eq!(account.uri, "https://arweave.net/abc");
    }

    #[test]
    fn decode_rejects_wrong_key_and_truncation() {
        let mint = Pubkey::new([3; 32]);
        let mut data = encode_account(&mint, "Oracle", "H402", "https://x");
        data[0] = 1;
        assert!(matches!(
            MetadataAccount::decode(&data),
            Err(MetadataError::InvalidAccount(_))
        ));

        let data = encode_account(&mint, "Oracle", "H402", "https://x");
        assert!(MetadataAccount::decode(&data[..80]).is_err());
        assert!(MetadataAccount::decode(&[]).is_err());
    }

    #[test]
    fn gateway_rewrites_storage_schemes() {
        assert_eq!(
            gateway_url("ipfs://bafy123/meta.json").unwrap().as_str(),
            "https://ipfs.io/ipfs/bafy123/meta.json"
        );
        assert_eq!(
            gateway_url("ar://TxId").unwrap().as_str(),
            "https://arweave.net/TxId"
        );
        assert!(gateway_url("file:///etc/passwd").is_err());
        assert!(gateway_url("not a uri").is_err());
    }

    fn resolved(json: Value, onchain_name: &str) -> ResolvedMetadata {
        ResolvedMetadata {
            mint: "MintX".to_string(),
            account: MetadataAccount {
                update_authority: Pubkey::new([0; 32]),
                mint: Pubkey::new([1; 32]),
                name: onchain_name.to_string(),
                symbol: "H402".to_string(),
                uri: "https://arweave.net/meta".to_string(),
            },
            json,
        }
    }

    #[test]
    fn card_prefers_json_name_then_account_name_then_mint() {
        let r = resolved(
            json!({"name": "Json", "image": "https://img", "x402_agent": {"model": "m1"}}),
            "Chain",
        );
        let card = r.to_card();
        assert_eq!(card.name, "Json");
        assert_eq!(card.image.as_deref(), Some("https://img"));
        assert_eq!(card.model.as_deref(), Some("m1"));

        assert_eq!(resolved(json!({"name": ""}), "Chain").to_card().name, "Chain");
        assert_eq!(resolved(json!({}), "").to_card().name, "MintX");
    }

    #[test]
    fn detail_carries_config_and_links() {
        let r = resolved(
            json!({
                "name": "Oracle",
                "description": "weather",
                "x402_agent": {"model": "m1", "temperature": 0.2, "system_prompt": "hi"}
            }),
            "Oracle",
        );
        let detail = r.to_detail();
        assert_eq!(detail.symbol, "H402");
        assert_eq!(detail.description.as_deref(), Some("weather"));
        assert_eq!(detail.config.temperature, Some(0.2));
        assert_eq!(detail.links.len(), 3);
        assert_eq!(detail.links[1].url, "https://solscan.io/token/MintX");
    }
}
