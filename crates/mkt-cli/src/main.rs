use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mkt")]
#[command(about = "Seller commission & payout operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Commission ledger commands
    Commission {
        #[command(subcommand)]
        cmd: CommissionCmd,
    },

    /// Payout commands
    Payout {
        #[command(subcommand)]
        cmd: PayoutCmd,
    },

    /// Print a seller's balance projection; fails if it does not reconcile
    Balance {
        #[arg(long)]
        seller: String,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations. Guardrail: refuses while any payout is PENDING/PROCESSING unless --yes is provided.
    Migrate {
        /// Acknowledge you are migrating a DB with payouts in flight.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum CommissionCmd {
    /// PENDING -> APPROVED
    Approve {
        #[arg(long)]
        id: String,
    },

    /// PENDING/APPROVED -> CANCELLED
    Cancel {
        #[arg(long)]
        id: String,
    },

    Show {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
enum PayoutCmd {
    /// Batch approved commissions into a new PENDING payout
    Request {
        #[arg(long)]
        seller: String,

        /// Commission id to include (repeatable)
        #[arg(long = "commission", conflicts_with = "all_approved")]
        commission_ids: Vec<String>,

        /// Include every APPROVED commission of the seller
        #[arg(long, default_value_t = false)]
        all_approved: bool,
    },

    /// PENDING -> PROCESSING
    Process {
        #[arg(long)]
        id: String,

        /// Reference from the payment provider
        #[arg(long)]
        reference: String,
    },

    /// PROCESSING -> COMPLETED
    Complete {
        #[arg(long)]
        id: String,
    },

    /// PROCESSING -> FAILED; member commissions return to APPROVED
    Fail {
        #[arg(long)]
        id: String,

        #[arg(long)]
        reason: String,
    },

    Show {
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience; silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let cfg = commands::load_engine_config()?;
            let pool = commands::connect_pool(&cfg).await?;
            match cmd {
                DbCmd::Status => {
                    let s = mkt_db::status(&pool).await?;
                    println!("db_ok={} has_commission_tables={}", s.ok, s.has_commission_tables);
                }
                DbCmd::Migrate { yes } => {
                    // Guardrail: a schema change under in-flight payouts needs an explicit ack.
                    let n = mkt_db::count_in_transit_payouts(&pool).await?;
                    if n > 0 && !yes {
                        anyhow::bail!(
                            "REFUSING MIGRATE: detected {} payout(s) in PENDING/PROCESSING. Re-run with: `mkt db migrate --yes`",
                            n
                        );
                    }

                    mkt_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = mkt_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Commission { cmd } => match cmd {
            CommissionCmd::Approve { id } => commands::commission::approve(&id).await?,
            CommissionCmd::Cancel { id } => commands::commission::cancel(&id).await?,
            CommissionCmd::Show { id } => commands::commission::show(&id).await?,
        },

        Commands::Payout { cmd } => match cmd {
            PayoutCmd::Request {
                seller,
                commission_ids,
                all_approved,
            } => commands::payout::request(&seller, &commission_ids, all_approved).await?,
            PayoutCmd::Process { id, reference } => commands::payout::process(&id, &reference).await?,
            PayoutCmd::Complete { id } => commands::payout::complete(&id).await?,
            PayoutCmd::Fail { id, reason } => commands::payout::fail(&id, &reason).await?,
            PayoutCmd::Show { id } => commands::payout::show(&id).await?,
        },

        Commands::Balance { seller } => commands::commission::balance(&seller).await?,
    }

    Ok(())
}

/// Logs go to stderr so stdout stays `key=value` for scripts.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
