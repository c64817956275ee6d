//! Indexer query: owned NFTs from a DAS-style HTTP indexer.
//!
//! Pages through `/v0/addresses/{owner}/assets` until a page comes back
//! under-full. If that yields nothing usable, the legacy `/nfts` endpoint is
//! tried once. Both record shapes are normalized by [`normalize_asset`].

use async_trait::async_trait;
use futures::{Stream, TryStreamExt, stream};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::identity::{AgentCard, AgentConfig};

/// Records requested per page from either endpoint.
pub const PAGE_SIZE: usize = 1000;

/// Identifier fields, in priority order.
const ID_FIELDS: &[&str] = &["id", "mint", "tokenAddress"];

/// One indexer record reduced to the fields discovery uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAsset {
    pub id: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub model: Option<String>,
}

impl RawAsset {
    /// Convert to a display card. Records without an identifier are dropped.
    pub fn into_card(self) -> Option<AgentCard> {
        let mint = self.id?;
        Some(AgentCard {
            name: self.name.unwrap_or_else(|| mint.clone()),
            mint,
            image: self.image,
            model: self.model,
        })
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn object(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| v.is_object())
}

/// Normalize one indexer record of either endpoint's shape.
pub fn normalize_asset(item: &Value) -> RawAsset {
    let id = ID_FIELDS.iter().find_map(|field| text(item.get(*field)));

    let metadata = object(item.pointer("/content/metadata"))
        .or_else(|| object(item.get("offChainMetadata")));

    let name = metadata
        .and_then(|m| text(m.get("name")))
        .or_else(|| text(item.get("tokenName")))
        .or_else(|| id.clone());

    let image = text(item.pointer("/content/links/image"))
        .or_else(|| metadata.and_then(|m| text(m.get("image"))));

    let model = metadata.and_then(|m| AgentConfig::from_metadata(m).model);

    RawAsset {
        id,
        name,
        image,
        model,
    }
}

/// Pull the record list out of a response body: a bare array or `{items}`.
fn page_items(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Which indexer endpoint a request went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Assets,
    LegacyNfts,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Assets => write!(f, "assets"),
            Endpoint::LegacyNfts => write!(f, "nfts"),
        }
    }
}

/// A source of owned assets.
#[async_trait]
pub trait AssetIndexer: Send + Sync {
    /// Every owned non-fungible asset for `owner`.
    async fn owned_assets(&self, owner: &str) -> Result<Vec<RawAsset>, IndexerError>;
}

/// HTTP client for the indexer.
pub struct IndexerClient {
    http: reqwest::Client,
    base: Url,
    api_key: SecretString,
    page_size: usize,
}

impl IndexerClient {
    pub fn new(http: reqwest::Client, base: Url, api_key: SecretString) -> Self {
        Self {
            http,
            base,
            api_key,
            page_size: PAGE_SIZE,
        }
    }

    fn endpoint_url(
        &self,
        owner: &str,
        endpoint: Endpoint,
        page: u32,
    ) -> Result<Url, IndexerError> {
        let path = match endpoint {
            Endpoint::Assets => format!("v0/addresses/{owner}/assets"),
            Endpoint::LegacyNfts => format!("v0/addresses/{owner}/nfts"),
        };
        let mut url = self
            .base
            .join(&path)
            .map_err(|e| IndexerError::InvalidUrl(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            if endpoint == Endpoint::Assets {
                query
                    .append_pair("tokenType", "nonFungible")
                    .append_pair("displayOptions", "full");
            }
            query
                .append_pair("pageNumber", &page.to_string())
                .append_pair("pageSize", &self.page_size.to_string())
                .append_pair("api-key", self.api_key.expose_secret());
        }
        Ok(url)
    }

    /// Fetch one page and return its raw records.
    async fn fetch_page(
        &self,
        owner: &str,
        endpoint: Endpoint,
        page: u32,
    ) -> Result<Vec<Value>, IndexerError> {
        let url = self.endpoint_url(owner, endpoint, page)?;
        debug!(owner, %endpoint, page, "requesting indexer page");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| IndexerError::Transport(e.without_url()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(IndexerError::SourceUnavailable {
                endpoint,
                status: status.as_u16(),
            });
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| IndexerError::Decode(e.without_url().to_string()))?;
        Ok(page_items(body))
    }

    /// Lazily page through the assets endpoint.
    ///
    /// Each item is one page of normalized records. The next page is only
    /// requested once the previous one was full, so dropping the stream
    /// early stops the requests.
    pub fn pages<'a>(
        &'a self,
        owner: &'a str,
    ) -> impl Stream<Item = Result<Vec<RawAsset>, IndexerError>> + 'a {
        stream::try_unfold(Some(1u32), move |next| async move {
            let Some(page) = next else {
                return Ok(None);
            };
            let items = self.fetch_page(owner, Endpoint::Assets, page).await?;
            if items.is_empty() {
                return Ok(None);
            }
            let following = (items.len() >= self.page_size).then(|| page + 1);
            let records: Vec<RawAsset> = items.iter().map(normalize_asset).collect();
            Ok::<_, IndexerError>(Some((records, following)))
        })
    }

    /// Lazily yield every normalized record from the assets endpoint.
    pub fn assets<'a>(
        &'a self,
        owner: &'a str,
    ) -> impl Stream<Item = Result<RawAsset, IndexerError>> + 'a {
        self.pages(owner)
            .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, IndexerError>)))
            .try_flatten()
    }

    /// Single-page query against the legacy endpoint.
    pub async fn legacy_assets(&self, owner: &str) -> Result<Vec<RawAsset>, IndexerError> {
        let items = self.fetch_page(owner, Endpoint::LegacyNfts, 1).await?;
        Ok(items.iter().map(normalize_asset).collect())
    }
}

#[async_trait]
impl AssetIndexer for IndexerClient {
    async fn owned_assets(&self, owner: &str) -> Result<Vec<RawAsset>, IndexerError> {
        let records: Vec<RawAsset> = self.assets(owner).try_collect().await?;
        let usable = records.iter().filter(|r| r.id.is_some()).count();
        if usable > 0 {
            info!(owner, records = records.len(), "indexer returned assets");
            return Ok(records);
        }

        info!(owner, "assets endpoint empty, trying legacy nfts endpoint");
        self.legacy_assets(owner).await
    }
}

/// Indexer failures. All of them mean "try the next source".
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("indexer {endpoint} endpoint unavailable: HTTP {status}")]
    SourceUnavailable { endpoint: Endpoint, status: u16 },
    /// Never carries the request URL, which holds the API key.
    #[error("indexer transport error: {0}")]
    Transport(reqwest::Error),
    #[error("malformed indexer response: {0}")]
    Decode(String),
    #[error("invalid indexer url: {0}")]
    InvalidUrl(String),
}
