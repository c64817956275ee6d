//! Agent token identity.
//!
//! An agent is an NFT whose off-chain metadata carries an `x402_agent`
//! extension with the model configuration. This module holds the shapes
//! shared by discovery and the CLI:
//!
//! - [`AgentCard`]: one owned agent as listed for a wallet
//! - [`AgentConfig`]: the `x402_agent` extension block
//! - [`agent_metadata`]: the off-chain JSON document an agent is minted with
//! - [`wallet`]: addresses and metadata-account derivation

pub mod agent_metadata;
pub mod wallet;

use serde::{Deserialize, Serialize};

/// Key of the vendor extension inside off-chain metadata.
pub const AGENT_EXTENSION_KEY: &str = "x402_agent";

/// A single owned agent token, as displayed in a wallet listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCard {
    /// Mint address of the token. Never empty.
    pub mint: String,

    /// Display name. Equal to `mint` when no name could be resolved.
    pub name: String,

    /// Preview image URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Model from the `x402_agent` extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AgentCard {
    /// A card carrying only the mint, used when metadata cannot be resolved.
    pub fn bare(mint: impl Into<String>) -> Self {
        let mint = mint.into();
        Self {
            name: mint.clone(),
            mint,
            image: None,
            model: None,
        }
    }

    /// Whether the card has a display name other than its mint.
    pub fn has_resolved_name(&self) -> bool {
        !self.name.is_empty() && self.name != self.mint
    }
}

/// The `x402_agent` extension block of an agent's metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl AgentConfig {
    /// Read the extension from a metadata JSON object, tolerating any shape.
    ///
    /// Temperature is accepted as a number or a numeric string.
    pub fn from_metadata(metadata: &serde_json::Value) -> Self {
        let ext = match metadata.get(AGENT_EXTENSION_KEY) {
            Some(v) if v.is_object() => v,
            _ => return Self::default(),
        };
        let text = |key: &str| {
            ext.get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let temperature = match ext.get("temperature") {
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        Self {
            model: text("model"),
            temperature,
            system_prompt: text("system_prompt"),
            version: text("version"),
        }
    }
}
