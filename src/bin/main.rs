use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use namechain::{Node, NodeConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "namechain")]
#[command(about = "Namechain full node", long_about = None)]
struct Cli {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// main, testnet or regtest
    #[arg(long)]
    network: Option<String>,

    /// Trust the network's checkpoints
    #[arg(long)]
    checkpoints: bool,

    #[arg(long)]
    log_level: Option<String>,

    /// Hex BLAKE2b-160 of the miner's public key
    #[arg(long)]
    miner_address: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tip and chain state
    Status,

    /// Mine blocks to the miner address
    Generate { count: u32 },

    /// Print a name's auction or ownership status
    Name { name: String },
}

impl Cli {
    fn apply(&self, config: &mut NodeConfig) {
        if let Some(network) = &self.network {
            config.network = network.clone();
        }
        if self.checkpoints {
            config.checkpoints = true;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(address) = &self.miner_address {
            config.miner_address = Some(address.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = NodeConfig::load(cli.config.as_deref()).context("loading node config")?;
    cli.apply(&mut config);
    config.validate().map_err(anyhow::Error::msg).context("validating node config")?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str())).init();

    if let Err(e) = run(cli.command, config).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(command: Option<Commands>, config: NodeConfig) -> Result<()> {
    let startup_blocks = config.generate;
    let node = Node::start(config).await.context("starting node")?;
    if startup_blocks > 0 {
        node.generate(startup_blocks).await?;
    }

    match command.unwrap_or(Commands::Status) {
        Commands::Status => {}
        Commands::Generate { count } => {
            node.generate(count).await?;
        }
        Commands::Name { name } => {
            match node.name_status(&name).await? {
                Some(status) => println!("{}", serde_json::to_string_pretty(&status)?),
                None => info!("name {:?} has never been opened", name),
            }
            return Ok(());
        }
    }
    println!("{}", serde_json::to_string_pretty(&node.status().await)?);
    Ok(())
}
