use alloy::primitives::{Bytes, U256};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use tx_scheduler::chain::ChainId;
use tx_scheduler::schedule::{FileRepository, ScheduleRepository, ScheduledTransaction, TransactionStatus};

#[derive(Parser)]
#[command(name = "scheduler-cli")]
#[command(about = "Manage the scheduled transaction store", long_about = None)]
struct Cli {
    /// Path to the JSON store used by the scheduler.
    #[arg(short, long, default_value = "scheduled_transactions.json")]
    store: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule a raw signed transaction
    Schedule {
        /// Hex-encoded signed transaction
        raw: String,

        /// Chain id, for transactions signed without one
        #[arg(long)]
        chain_id: Option<u64>,

        /// Lower runs first among transactions sharing a nonce
        #[arg(long, default_value_t = 0)]
        priority: i64,

        /// Token contract whose balance must reach --amount (native balance if omitted)
        #[arg(long)]
        asset: Option<String>,

        /// Minimum balance of the sender, in base units
        #[arg(long, value_parser = parse_amount)]
        amount: Option<U256>,

        /// Earliest release time (RFC 3339)
        #[arg(long, value_parser = parse_time)]
        at: Option<DateTime<Utc>>,

        /// Time zone the release time was chosen in, kept for display
        #[arg(long)]
        tz: Option<String>,

        /// Hold until the network gas price drops to the signed gas price
        #[arg(long)]
        gas_aware: bool,
    },
    /// List scheduled transactions
    List {
        /// Only show records with this status (pending, completed, error, cancelled, stale_nonce)
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one record as JSON
    Show { id: String },
    /// Cancel a pending record
    Cancel { id: String },
}

fn parse_amount(s: &str) -> Result<U256, String> {
    s.parse::<U256>().map_err(|e| format!("invalid amount: {e}"))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 time: {e}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let store = FileRepository::load_from_file(&cli.store)?;

    match cli.command {
        Commands::Schedule {
            raw,
            chain_id,
            priority,
            asset,
            amount,
            at,
            tz,
            gas_aware,
        } => {
            let raw: Bytes = raw.trim().parse()?;
            let mut record = ScheduledTransaction::from_signed(raw, chain_id.map(ChainId))?;
            record.priority = priority;
            record.condition_asset = asset;
            record.condition_amount = amount;
            record.time_condition = at;
            record.time_condition_tz = tz;
            record.gas_price_aware = gas_aware;

            let stored = store.save(record).await?;
            store.flush().await?;
            println!("{}", stored.id);
        }
        Commands::List { status } => {
            let filter: Option<TransactionStatus> = match status {
                Some(s) => Some(serde_json::from_value(serde_json::Value::String(s))?),
                None => None,
            };
            for record in store.all() {
                if filter.is_some_and(|wanted| wanted != record.status) {
                    continue;
                }
                println!(
                    "{}  chain={}  nonce={}  priority={}  status={}  hash={}",
                    record.id,
                    record.chain_id,
                    record.nonce,
                    record.priority,
                    record.status,
                    record.transaction_hash
                );
            }
        }
        Commands::Show { id } => match store.get(&id) {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => {
                eprintln!("Error: no scheduled transaction with id {id}");
                std::process::exit(1);
            }
        },
        Commands::Cancel { id } => {
            let record = store.cancel(&id)?;
            store.flush().await?;
            println!("{}  status={}", record.id, record.status);
        }
    }

    Ok(())
}
