//! Off-chain metadata document for agent NFTs.
//!
//! Builds the JSON that an agent is minted with: standard NFT fields plus
//! the `x402_agent` extension. Uploading the document and creating the
//! token are done by wallet tooling; this module only shapes the content.

use serde::{Deserialize, Serialize};

use super::AgentConfig;

/// Symbol used when the caller does not pick one.
pub const DEFAULT_SYMBOL: &str = "H402";

/// Extension schema version written into new documents.
pub const AGENT_EXTENSION_VERSION: &str = "v0.1";

/// Project homepage linked from every document unless overridden.
pub const DEFAULT_EXTERNAL_URL: &str = "https://hyper402.app";

/// Off-chain metadata JSON for an agent NFT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub name: String,

    pub symbol: String,

    pub description: String,

    /// Permanent image URI, if an avatar was uploaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Marketplace-visible traits.
    pub attributes: Vec<Attribute>,

    pub properties: Properties,

    pub external_url: String,

    /// Agent configuration read back by discovery.
    pub x402_agent: AgentConfig,
}

/// A `{trait_type, value}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub trait_type: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Properties {
    #[serde(default)]
    pub files: Vec<FileEntry>,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub uri: String,
    #[serde(rename = "type")]
    pub content_type: String,
}

/// User-supplied fields for a new agent.
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub name: String,
    pub symbol: Option<String>,
    pub description: String,
    pub model: String,
    pub temperature: f64,
    pub system_prompt: String,
    pub image_uri: Option<String>,
    pub image_content_type: Option<String>,
    pub external_url: Option<String>,
}

/// Build the metadata document for a new agent.
pub fn build_agent_metadata(agent: &NewAgent) -> AgentMetadata {
    let image = agent.image_uri.clone().filter(|u| !u.is_empty());

    let files = match &image {
        Some(uri) => vec![FileEntry {
            uri: uri.clone(),
            content_type: agent
                .image_content_type
                .clone()
                .unwrap_or_else(|| "image/png".to_string()),
        }],
        None => Vec::new(),
    };

    AgentMetadata {
        name: agent.name.clone(),
        symbol: agent
            .symbol
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SYMBOL.to_string()),
        description: agent.description.clone(),
        image,
        attributes: vec![
            Attribute {
                trait_type: "Model".to_string(),
                value: agent.model.clone(),
            },
            Attribute {
                trait_type: "Temperature".to_string(),
                value: agent.temperature.to_string(),
            },
        ],
        properties: Properties {
            files,
            category: "image".to_string(),
        },
        external_url: agent
            .external_url
            .clone()
            .unwrap_or_else(|| DEFAULT_EXTERNAL_URL.to_string()),
        x402_agent: AgentConfig {
            model: Some(agent.model.clone()),
            temperature: Some(agent.temperature),
            system_prompt: Some(agent.system_prompt.clone()),
            version: Some(AGENT_EXTENSION_VERSION.to_string()),
        },
    }
}

/// Serialize the metadata document to pretty-printed JSON.
pub fn agent_metadata_json(agent: &NewAgent) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&build_agent_metadata(agent))
}
