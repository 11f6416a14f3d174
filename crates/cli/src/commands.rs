use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use stock_track_core::{AppConfig, FreshnessPolicy, Ohlcv};
use stock_track_data::{Datastore, HttpFetcher, QuoteCache};
use stock_track_scheduler::{AtScheduler, PicklistCoordinator};

use crate::Commands;

pub async fn run(command: Commands, config: AppConfig) -> Result<()> {
    let store = Datastore::open(&config.store.data_dir).context("Failed to open datastore")?;
    let policy = FreshnessPolicy::new(
        config.market.utc_offset_hours,
        config.market.max_quote_age_secs,
    );
    let fetcher = Arc::new(HttpFetcher::new(&config.fetch));
    let cache = Arc::new(
        QuoteCache::open(
            &config.store.cache_dir,
            policy,
            fetcher,
            Duration::from_millis(config.fetch.retry_backoff_ms),
        )
        .context("Failed to open quote cache")?,
    );

    let expire_command = match &config.picklist.expire_command {
        Some(cmd) => cmd.clone(),
        None => std::env::current_exe()
            .context("Failed to resolve current executable for the expiry job")?
            .display()
            .to_string(),
    };
    let coordinator = PicklistCoordinator::new(
        store.clone(),
        cache.clone(),
        Arc::new(AtScheduler::new()),
        Duration::from_secs(u64::from(config.picklist.expiry_hours) * 3600),
        expire_command,
    );

    match command {
        Commands::Quote { ticker } => {
            let quote = cache.get(&ticker).await?;
            print_quote(&ticker, &quote);
        }
        Commands::Pick { ticker, note } => {
            let entry = coordinator.add(&ticker, &note).await?;
            println!(
                "picked {ticker} (expires in {}h, job {})",
                config.picklist.expiry_hours,
                entry.job.map_or_else(|| "-".to_string(), |j| j.to_string()),
            );
        }
        Commands::Unpick { ticker } => {
            coordinator.remove(&ticker).await?;
            println!("unpicked {ticker}");
        }
        Commands::Expire { ticker } => {
            coordinator.expire(&ticker).await?;
        }
        Commands::Picklist => {
            for (ticker, entry) in coordinator.entries()? {
                println!(
                    "{ticker:8} {:>10} added {} {}",
                    entry.prices.close,
                    entry.added_at.format("%Y-%m-%d %H:%M"),
                    entry.note,
                );
            }
        }
        Commands::Watch { ticker, note } => {
            let quote = cache.get(&ticker).await?;
            store.add_to_watchlist(&ticker, &note, quote)?;
            println!("watching {ticker}");
        }
        Commands::Unwatch { ticker } => {
            store.remove_from_watchlist(&ticker)?;
            println!("unwatched {ticker}");
        }
        Commands::Watchlist => {
            for (ticker, entry) in store.watchlist().entries()? {
                println!(
                    "{ticker:8} {:>10} added {} {}",
                    entry.prices.close,
                    entry.added_at.format("%Y-%m-%d %H:%M"),
                    entry.note,
                );
            }
        }
        Commands::Buy {
            ticker,
            shares,
            price,
            stoploss,
            takeprofit,
        } => {
            store.add_buy(&ticker, shares, price, stoploss, takeprofit)?;
            println!("bought {shares} {ticker} @ {price}");
        }
        Commands::Sell {
            ticker,
            shares,
            price,
        } => {
            store.add_sell(&ticker, shares, price)?;
            println!("sold {shares} {ticker} @ {price}");
        }
        Commands::Positions => {
            for (ticker, summary) in store.all_position_summaries()? {
                println!(
                    "{ticker:8} holding {:>10} avg {:>10} bought {:>10} sold {:>10}",
                    summary.holding, summary.average_cost, summary.bought, summary.sold,
                );
            }
        }
        Commands::History { ticker } => {
            let records = store.history().read(&ticker)?.unwrap_or_default();
            for record in records {
                println!(
                    "{} {:8} {}",
                    record.at.format("%Y-%m-%d %H:%M:%S"),
                    record.action,
                    record.details.join(" "),
                );
            }
        }
    }

    Ok(())
}

fn print_quote(ticker: &str, quote: &Ohlcv) {
    println!(
        "{ticker}: open {} high {} low {} close {} volume {}",
        quote.open, quote.high, quote.low, quote.close, quote.volume,
    );
}
