//! Discovery of the agent tokens a wallet owns.
//!
//! # Source selection
//!
//! ```text
//!   owner ──► indexer configured? ──yes──► Indexer query ──► records? ──yes──┐
//!                   │                          │ error             │ none     │
//!                   no                         ▼                   ▼          │
//!                   └──────────────────────► Chain scan ◄──────────┘          │
//!                                              │                              │
//!                                              ▼                              ▼
//!                                          reconcile (per source, never across)
//! ```
//!
//! Only one source's cards are reconciled per run. The indexer is preferred
//! because it sees everything in one call; the chain scan is the fallback
//! and the ground truth when the indexer is missing, failing, or empty.

pub mod board;
pub mod chain;
pub mod indexer;
pub mod reconcile;

pub use board::{BoardState, ResultBoard, RunTicket};
pub use chain::{ChainScan, ChainScanner, HeldMints};
pub use indexer::{AssetIndexer, IndexerClient, IndexerError, RawAsset};
pub use reconcile::reconcile;

use std::fmt;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::identity::AgentCard;
use crate::identity::wallet::{AddressError, Pubkey};
use crate::ledger::{
    AgentDetail, LedgerClient, MetadataError, MetadataResolver, OnChainMetadataResolver,
    RpcClient, RpcError,
};

/// Where a run's cards came from, with source-specific diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum DiscoverySource {
    Indexer {
        records: usize,
    },
    ChainScan {
        legacy: usize,
        token_2022: usize,
        truncated: usize,
    },
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoverySource::Indexer { .. } => write!(f, "indexer"),
            DiscoverySource::ChainScan { .. } => write!(f, "chain-scan"),
        }
    }
}

/// Outcome of one discovery run.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub cards: Vec<AgentCard>,
    pub source: DiscoverySource,
}

impl DiscoveryReport {
    /// Mints left unresolved because of the chain-scan cap.
    pub fn truncated(&self) -> usize {
        match self.source {
            DiscoverySource::ChainScan { truncated, .. } => truncated,
            DiscoverySource::Indexer { .. } => 0,
        }
    }
}

/// The discovery controller.
pub struct Discovery {
    indexer: Option<Arc<dyn AssetIndexer>>,
    scanner: ChainScanner,
}

impl Discovery {
    pub fn new(indexer: Option<Arc<dyn AssetIndexer>>, scanner: ChainScanner) -> Self {
        Self { indexer, scanner }
    }

    /// Wire the HTTP-backed sources described by `config`.
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("agentscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(DiscoveryError::Client)?;

        let ledger: Arc<dyn LedgerClient> =
            Arc::new(RpcClient::with_client(http.clone(), config.rpc_url.clone()));
        let resolver: Arc<dyn MetadataResolver> =
            Arc::new(OnChainMetadataResolver::new(ledger.clone(), http.clone()));
        let scanner = ChainScanner::new(ledger, resolver)
            .with_mint_cap(config.mint_cap)
            .with_concurrency(config.metadata_concurrency);

        let indexer = config.indexer_api_key.as_ref().map(|key| {
            Arc::new(IndexerClient::new(
                http.clone(),
                config.indexer_base_url.clone(),
                SecretString::from(key.expose_secret().to_string()),
            )) as Arc<dyn AssetIndexer>
        });

        Ok(Self::new(indexer, scanner))
    }

    /// Try the indexer; `None` means fall through to the chain scan.
    async fn from_indexer(&self, owner: &str) -> Option<DiscoveryReport> {
        let indexer = self.indexer.as_ref()?;
        match indexer.owned_assets(owner).await {
            Ok(assets) => {
                let cards: Vec<AgentCard> =
                    assets.into_iter().filter_map(RawAsset::into_card).collect();
                if cards.is_empty() {
                    info!(owner, "indexer found no agents, scanning chain");
                    return None;
                }
                let records = cards.len();
                Some(DiscoveryReport {
                    cards: reconcile(cards),
                    source: DiscoverySource::Indexer { records },
                })
            }
            Err(e) => {
                warn!(owner, error = %e, "indexer unavailable, scanning chain");
                None
            }
        }
    }

    /// List the agents `owner` holds.
    pub async fn discover(&self, owner: &str) -> Result<DiscoveryReport, DiscoveryError> {
        let owner_key: Pubkey = owner.parse().map_err(DiscoveryError::InvalidOwner)?;

        if let Some(report) = self.from_indexer(owner).await {
            info!(owner, cards = report.cards.len(), source = %report.source, "discovery complete");
            return Ok(report);
        }

        let scan = self
            .scanner
            .scan(&owner_key)
            .await
            .map_err(DiscoveryError::Failed)?;
        let report = DiscoveryReport {
            cards: reconcile(scan.cards),
            source: DiscoverySource::ChainScan {
                legacy: scan.legacy,
                token_2022: scan.token_2022,
                truncated: scan.truncated,
            },
        };
        info!(owner, cards = report.cards.len(), source = %report.source, "discovery complete");
        Ok(report)
    }

    /// Run discovery and publish the outcome to `board`.
    ///
    /// `None` for the owner means no wallet is connected. Returns whether
    /// this run's result was applied; a run superseded by a newer one is
    /// dropped.
    pub async fn refresh(&self, board: &ResultBoard, owner: Option<&str>) -> bool {
        let ticket = board.begin();
        let generation = ticket.generation();

        let next = match owner {
            None => BoardState::NoWallet,
            Some(owner) => match self.discover(owner).await {
                Ok(report) => BoardState::Ready(report),
                Err(e) => BoardState::Failed(e.to_string()),
            },
        };

        let applied = board.publish(ticket, next);
        if !applied {
            debug!(generation, "discarding result of superseded discovery run");
        }
        applied
    }

    /// Full metadata for a single agent.
    pub async fn agent_detail(&self, mint: &str) -> Result<AgentDetail, DiscoveryError> {
        mint.parse::<Pubkey>().map_err(DiscoveryError::InvalidMint)?;
        let resolved = self
            .scanner
            .resolver()
            .resolve(mint)
            .await
            .map_err(DiscoveryError::Metadata)?;
        Ok(resolved.to_detail())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("invalid wallet address: {0}")]
    InvalidOwner(AddressError),
    #[error("invalid mint address: {0}")]
    InvalidMint(AddressError),
    /// Both sources failed; the chain scan was the last resort.
    #[error("discovery failed: {0}")]
    Failed(RpcError),
    #[error("could not load agent metadata: {0}")]
    Metadata(MetadataError),
    #[error("failed to build http client: {0}")]
    Client(reqwest::Error),
}
