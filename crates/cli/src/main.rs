use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

mod commands;

#[derive(Parser)]
#[command(name = "stock-track")]
#[command(about = "Track positions, a watchlist, and a self-expiring picklist", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config/Config.toml")]
    config: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Fetch the current quote for a ticker (cached per market hours)
    Quote {
        ticker: String,
    },
    /// Add a ticker to the picklist; it expires automatically after 24h
    Pick {
        ticker: String,
        /// Why this ticker looks interesting
        #[arg(default_value = "")]
        note: String,
    },
    /// Remove a ticker from the picklist, cancelling its expiry
    Unpick {
        ticker: String,
    },
    /// Expiry entry point invoked by the deferred job; tolerates a ticker
    /// that was already unpicked
    #[command(hide = true)]
    Expire {
        ticker: String,
    },
    /// Show the picklist
    Picklist,
    /// Add a ticker to the watchlist
    Watch {
        ticker: String,
        /// Why this ticker is being watched
        #[arg(default_value = "")]
        note: String,
    },
    /// Remove a ticker from the watchlist
    Unwatch {
        ticker: String,
    },
    /// Show the watchlist
    Watchlist,
    /// Record a buy
    Buy {
        ticker: String,
        shares: Decimal,
        price: Decimal,
        /// Stop-loss level
        #[arg(long)]
        stoploss: Option<Decimal>,
        /// Take-profit level
        #[arg(long)]
        takeprofit: Option<Decimal>,
    },
    /// Record a sell
    Sell {
        ticker: String,
        shares: Decimal,
        price: Decimal,
    },
    /// Show all position summaries
    Positions,
    /// Show the history for a ticker
    History {
        ticker: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = stock_track_core::ConfigLoader::load(&cli.config)?;
    commands::run(cli.command, config).await
}
