// src/main.rs
//! Operator CLI over the chain service factory.
use anyhow::{anyhow, Context, Result};
use chain_engine::core::config::EngineConfig;
use chain_engine::core::domain::{TransferOrder, TransferRequest};
use chain_engine::ChainServiceFactory;
use clap::{Args as ClapArgs, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

/// Environment variable the `send` command reads the signing key from.
const PRIVATE_KEY_ENV: &str = "ENGINE_PRIVATE_KEY";

#[derive(Parser)]
#[command(name = "chain-engine")]
#[command(about = "Quote, sign and broadcast transfers on BTC, ETH and USDT")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// TOML configuration file; the environment is used when absent
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Currency symbol (BTC, ETH, USDT)
    #[arg(long, global = true, default_value = "BTC")]
    chain: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new key pair
    Create,
    /// Show an address summary
    Address { address: String },
    /// Show an address balance in display units
    Balance { address: String },
    /// List unspent outputs that each cover an amount in smallest units
    Utxo {
        address: String,
        #[arg(long, default_value = "0")]
        amount: u64,
    },
    /// Quote a transfer without signing it
    Quote(TransferArgs),
    /// Quote, sign and broadcast a transfer; the key is read from ENGINE_PRIVATE_KEY
    Send(TransferArgs),
    /// Show the current chain height
    Head,
}

#[derive(ClapArgs)]
struct TransferArgs {
    #[arg(long)]
    from: String,
    #[arg(long)]
    to: String,
    /// Amount in display units, e.g. 0.01
    #[arg(long)]
    value: Decimal,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging()?;

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::from_env()?,
    };
    let factory = ChainServiceFactory::new(&config)?;
    let service = factory.service(&args.chain)?;
    info!(chain = %service.chain(), "service selected");

    match args.command {
        Commands::Create => {
            let pair = service.create()?;
            // The operator asked for the key; it goes to stdout only.
            print_json(&serde_json::json!({
                "address": pair.address,
                "privateKey": pair.expose_private_key(),
            }))
        }
        Commands::Address { address } => {
            let snapshot = service
                .get_address(&address)
                .await
                .ok_or_else(|| anyhow!("address {} could not be read", address))?;
            print_json(&snapshot)
        }
        Commands::Balance { address } => {
            let balance = service
                .get_balance(&address)
                .await
                .ok_or_else(|| anyhow!("balance of {} is unknown", address))?;
            println!("{} {}", balance, service.chain());
            Ok(())
        }
        Commands::Utxo { address, amount } => {
            let utxos = service
                .get_utxo(&address, amount)
                .await
                .ok_or_else(|| anyhow!("no UTXO view for {} on {}", address, service.chain()))?;
            print_json(&utxos)
        }
        Commands::Quote(transfer) => {
            let request =
                TransferRequest { from: transfer.from, to: transfer.to, value: transfer.value };
            print_json(&service.calculate_tx(&request).await?)
        }
        Commands::Send(transfer) => {
            let order = order_from_env(&transfer)?;

            let result = service.send_transaction(&order).await.map_err(|e| {
                if e.is_ambiguous_submission() {
                    tracing::error!("broadcast outcome unknown; check the explorer before resending");
                }
                e
            })?;
            print_json(&result)
        }
        Commands::Head => {
            let height = service
                .get_latest_block()
                .await
                .ok_or_else(|| anyhow!("chain head of {} is unknown", service.chain()))?;
            println!("{}", height);
            Ok(())
        }
    }
}

/// Pairs the transfer with the key from `ENGINE_PRIVATE_KEY`. The plain copy
/// of the key is wiped once it sits inside the order.
fn order_from_env(transfer: &TransferArgs) -> Result<TransferOrder> {
    let key = Zeroizing::new(
        std::env::var(PRIVATE_KEY_ENV)
            .with_context(|| format!("{} is not set", PRIVATE_KEY_ENV))?,
    );
    Ok(TransferOrder::new(&transfer.from, &transfer.to, transfer.value, &key))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=info,reqwest=info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
