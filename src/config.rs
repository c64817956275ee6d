//! Resolved runtime configuration.
//!
//! Each value comes from the environment first, then the settings file,
//! then a built-in default. `.env` files are loaded by the binary before
//! resolution.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::discovery::chain::{DEFAULT_MINT_CAP, DEFAULT_RESOLVE_CONCURRENCY};
use crate::settings::Settings;

pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
pub const DEFAULT_INDEXER_URL: &str = "https://api.helius.xyz";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Env vars consulted for each value, first match wins.
const INDEXER_KEY_VARS: &[&str] = &["AGENTSCAN_INDEXER_KEY", "HELIUS_API_KEY"];
const INDEXER_URL_VARS: &[&str] = &["AGENTSCAN_INDEXER_URL"];
const RPC_URL_VARS: &[&str] = &["AGENTSCAN_RPC_URL", "RPC_URL"];
const WALLET_VARS: &[&str] = &["AGENTSCAN_WALLET"];

/// Configuration for a discovery session.
#[derive(Debug)]
pub struct DiscoveryConfig {
    /// Indexer credential. `None` disables the indexer source.
    pub indexer_api_key: Option<SecretString>,
    pub indexer_base_url: Url,
    pub rpc_url: Url,
    pub mint_cap: usize,
    pub metadata_concurrency: usize,
    pub request_timeout: Duration,
    /// Default wallet for `owned`.
    pub wallet: Option<String>,
}

impl DiscoveryConfig {
    /// Resolve from the process environment and `settings`.
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        Self::resolve_with(settings, |name| std::env::var(name).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve_with(
        settings: &Settings,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        // first non-blank value wins; a blank variable does not mask later sources
        let lookup = |vars: &[&str], fallback: &Option<String>| {
            vars.iter()
                .filter_map(|&v| env(v))
                .chain(fallback.clone())
                .map(|s| s.trim().to_string())
                .find(|s| !s.is_empty())
        };

        let indexer_api_key =
            lookup(INDEXER_KEY_VARS, &settings.indexer_api_key).map(SecretString::from);

        let indexer_base_url = parse_base_url(
            "indexer_base_url",
            &lookup(INDEXER_URL_VARS, &settings.indexer_base_url)
                .unwrap_or_else(|| DEFAULT_INDEXER_URL.to_string()),
        )?;

        let rpc_url = parse_url(
            "rpc_url",
            &lookup(RPC_URL_VARS, &settings.rpc_url).unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
        )?;

        let metadata_concurrency = settings
            .metadata_concurrency
            .unwrap_or(DEFAULT_RESOLVE_CONCURRENCY);
        if metadata_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "metadata_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            indexer_api_key,
            indexer_base_url,
            rpc_url,
            mint_cap: settings.mint_cap.unwrap_or(DEFAULT_MINT_CAP),
            metadata_concurrency,
            request_timeout: Duration::from_secs(
                settings.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            wallet: lookup(WALLET_VARS, &settings.wallet),
        })
    }

    pub fn has_indexer(&self) -> bool {
        self.indexer_api_key.is_some()
    }
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
        key,
        reason: format!("{raw}: {e}"),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

/// Parse a base URL so that relative joins append to its path.
fn parse_base_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let mut url = parse_url(key, raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
