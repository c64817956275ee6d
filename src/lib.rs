//! Discovery of AI-agent tokens held by a Solana wallet.
//!
//! Agents are NFTs whose off-chain metadata carries an `x402_agent`
//! extension. Ownership is discovered through a DAS indexer when one is
//! configured, falling back to a direct scan of the wallet's token accounts.

pub mod config;
pub mod discovery;
pub mod identity;
pub mod ledger;
pub mod settings;

pub use config::{ConfigError, DiscoveryConfig};
pub use discovery::{
    BoardState, Discovery, DiscoveryError, DiscoveryReport, DiscoverySource, ResultBoard,
};
pub use identity::{AgentCard, AgentConfig};
pub use settings::Settings;
