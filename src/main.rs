//! agentscan CLI
//!
//! Lists the agent tokens a wallet owns, shows one agent's configuration,
//! and builds metadata documents for new agents.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use url::Url;

use agentscan::identity::agent_metadata::{NewAgent, agent_metadata_json};
use agentscan::ledger::AgentDetail;
use agentscan::{BoardState, Discovery, DiscoveryConfig, DiscoveryReport, ResultBoard, Settings};

#[derive(Parser, Debug)]
#[command(name = "agentscan", about = "Find the AI agents a Solana wallet owns", version)]
struct Cli {
    /// Settings file (defaults to ~/.agentscan/settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// JSON-RPC endpoint, overriding env and settings
    #[arg(long, global = true)]
    rpc_url: Option<Url>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List agents held by a wallet
    Owned {
        /// Wallet address (defaults to the configured wallet)
        #[arg(long)]
        address: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show one agent's metadata and configuration
    Show {
        mint: String,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the metadata document for a new agent
    Metadata {
        #[arg(long)]
        name: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value_t = 0.7)]
        temperature: f64,
        #[arg(long, default_value = "")]
        system_prompt: String,
        /// Image URI, already hosted
        #[arg(long)]
        image: Option<String>,
        /// MIME type of the image
        #[arg(long)]
        image_type: Option<String>,
    },
    /// Read or change persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Get { key: String },
    Set { key: String, value: String },
    List,
    Path,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("agentscan=info"));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let settings_path = cli.settings.clone().unwrap_or_else(Settings::default_path);
    let settings = Settings::load_from(&settings_path);

    match cli.command {
        Command::Config { action } => run_config(action, settings, &settings_path),
        Command::Metadata {
            name,
            model,
            symbol,
            description,
            temperature,
            system_prompt,
            image,
            image_type,
        } => {
            let agent = NewAgent {
                name,
                symbol,
                description,
                model,
                temperature,
                system_prompt,
                image_uri: image,
                image_content_type: image_type,
                external_url: None,
            };
            println!("{}", agent_metadata_json(&agent)?);
            Ok(())
        }
        Command::Owned { address, json } => {
            let config = load_config(&settings, cli.rpc_url)?;
            let owner = address.or_else(|| config.wallet.clone());
            let discovery = Discovery::from_config(&config)?;
            let board = ResultBoard::new();
            discovery.refresh(&board, owner.as_deref()).await;

            match board.snapshot() {
                BoardState::NoWallet => {
                    println!(
                        "connect a wallet to see your agents: pass --address or run `agentscan config set wallet <ADDRESS>`"
                    );
                    Ok(())
                }
                BoardState::Ready(report) => print_report(&report, json),
                BoardState::Failed(message) => bail!(message),
                BoardState::Idle | BoardState::Loading => bail!("discovery did not complete"),
            }
        }
        Command::Show { mint, json } => {
            let config = load_config(&settings, cli.rpc_url)?;
            let discovery = Discovery::from_config(&config)?;
            let detail = discovery.agent_detail(&mint).await?;
            print_detail(&detail, json)
        }
    }
}

fn load_config(settings: &Settings, rpc_url: Option<Url>) -> anyhow::Result<DiscoveryConfig> {
    let mut config =
        DiscoveryConfig::resolve(settings).context("failed to resolve configuration")?;
    if let Some(url) = rpc_url {
        config.rpc_url = url;
    }
    if !config.has_indexer() {
        tracing::debug!("no indexer key configured, using chain scan only");
    }
    Ok(config)
}

fn run_config(
    action: ConfigAction,
    mut settings: Settings,
    path: &std::path::Path,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match settings.get(&key) {
            Some(value) => println!("{value}"),
            None => bail!("unknown setting: {key}"),
        },
        ConfigAction::Set { key, value } => {
            settings.set(&key, &value).map_err(anyhow::Error::msg)?;
            settings
                .save_to(path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(key = %key, path = %path.display(), "setting saved");
        }
        ConfigAction::List => {
            for (key, value) in settings.list() {
                println!("{key} = {value}");
            }
        }
        ConfigAction::Path => println!("{}", path.display()),
    }
    Ok(())
}

fn print_report(report: &DiscoveryReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else if report.cards.is_empty() {
        println!("no agents found");
    } else {
        let width = report.cards.iter().map(|c| c.mint.len()).max().unwrap_or(4);
        println!("{:<width$}  {:<32}  MODEL", "MINT", "NAME");
        for card in &report.cards {
            println!(
                "{:<width$}  {:<32}  {}",
                card.mint,
                card.name,
                card.model.as_deref().unwrap_or("-")
            );
        }
    }

    match report.source {
        agentscan::DiscoverySource::Indexer { records } => {
            eprintln!("source: indexer ({records} records)");
        }
        agentscan::DiscoverySource::ChainScan {
            legacy,
            token_2022,
            truncated,
        } => {
            eprintln!("source: chain scan (token {legacy}, token-2022 {token_2022})");
            if truncated > 0 {
                eprintln!("{truncated} more mints were not resolved; raise mint_cap to see them");
            }
        }
    }
    Ok(())
}

fn print_detail(detail: &AgentDetail, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(detail)?);
        return Ok(());
    }

    println!("{} ({})", detail.name, detail.symbol);
    println!("mint:          {}", detail.mint);
    if let Some(description) = &detail.description {
        println!("description:   {description}");
    }
    if let Some(image) = &detail.image {
        println!("image:         {image}");
    }
    let config = &detail.config;
    println!("model:         {}", config.model.as_deref().unwrap_or("-"));
    match config.temperature {
        Some(t) => println!("temperature:   {t}"),
        None => println!("temperature:   -"),
    }
    if let Some(version) = &config.version {
        println!("version:       {version}");
    }
    println!("metadata:      {}", detail.metadata_uri);
    if let Some(prompt) = &config.system_prompt {
        println!("\nsystem prompt:\n{prompt}");
    }
    println!();
    for link in &detail.links {
        println!("{:<10} {}", link.label, link.url);
    }
    Ok(())
}
