use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt};

use xrbroker_core::BrokerType;

mod commands;

#[derive(Parser)]
#[command(
    name = "xrbroker",
    about = "OpenXR runtime broker: find and select the active OpenXR runtime"
)]
struct Cli {
    /// Config file (default: ./xrbroker.toml, then ~/.config/xrbroker/xrbroker.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a content URI query against the brokers and print the rows as JSON
    Query {
        uri: String,
        /// Columns to return (default: every column of the table)
        #[arg(short, long = "column")]
        columns: Vec<String>,
    },
    /// Print the media type of a content URI
    Type { uri: String },
    /// Show the active runtime reported by a broker
    Active {
        #[arg(long, default_value_t = 1)]
        major: u32,
        /// ABI to look up (default: from config)
        #[arg(long)]
        abi: Option<String>,
        #[arg(long, value_enum, default_value = "runtime")]
        broker: BrokerArg,
    },
    /// List every runtime the application broker can offer
    List {
        #[arg(long, default_value_t = 1)]
        major: u32,
        #[arg(long)]
        abi: Option<String>,
    },
    /// Make an available runtime the active one
    Select {
        package: String,
        #[arg(long, default_value_t = 1)]
        major: u32,
        #[arg(long)]
        abi: Option<String>,
        /// Select even if no available runtime has this package name
        #[arg(long)]
        force: bool,
    },
    /// Clear the runtime selection
    Deselect,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BrokerArg {
    /// Application-facing broker
    Runtime,
    /// System-facing broker
    System,
}

impl From<BrokerArg> for BrokerType {
    fn from(arg: BrokerArg) -> Self {
        match arg {
            BrokerArg::Runtime => BrokerType::RuntimeBroker,
            BrokerArg::System => BrokerType::SystemRuntimeBroker,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only command output
    fmt()
        .with_env_filter(EnvFilter::from_env("XRBROKER_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Query { uri, columns } => commands::query(&config, &uri, &columns).await,
        Command::Type { uri } => commands::media_type(&config, &uri),
        Command::Active { major, abi, broker } => {
            let abi = abi.unwrap_or_else(|| config.broker.default_abi.clone());
            commands::active(&config, broker.into(), major, &abi).await
        }
        Command::List { major, abi } => {
            let abi = abi.unwrap_or_else(|| config.broker.default_abi.clone());
            commands::list(&config, major, &abi).await
        }
        Command::Select {
            package,
            major,
            abi,
            force,
        } => {
            let abi = abi.unwrap_or_else(|| config.broker.default_abi.clone());
            commands::select(&config, &package, major, &abi, force).await
        }
        Command::Deselect => commands::deselect(&config).await,
    }
}
