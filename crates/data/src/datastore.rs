//! The durable datastore: positions, watchlist, picklist, and history.
//!
//! One typed accessor per database instead of anything reflective; every
//! mutating operation appends a history record for the ticker it touched.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use stock_track_core::{JobHandle, Ohlcv};

use crate::store::{Namespace, StoreError};

/// Errors from datastore operations.
#[derive(Debug, Error)]
pub enum DatastoreError {
    /// The ticker already has an entry in the target database.
    #[error("{ticker} already exists")]
    EntryExists {
        /// The duplicate ticker.
        ticker: String,
    },

    /// The ticker has no entry in the target database.
    #[error("{ticker} does not exist")]
    EntryNotFound {
        /// The missing ticker.
        ticker: String,
    },

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A watched ticker with the note and quote captured when it was added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub note: String,
    pub added_at: DateTime<Utc>,
    pub prices: Ohlcv,
}

/// A picklist candidate. Unlike a watchlist entry it carries the handle of
/// the deferred job that will remove it when its window elapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicklistEntry {
    pub note: String,
    pub added_at: DateTime<Utc>,
    pub prices: Ohlcv,
    /// Live while exactly one pending removal job exists for this ticker.
    pub job: Option<JobHandle>,
}

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeKind {
    Buy,
    Sell,
}

/// One executed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub at: DateTime<Utc>,
    pub kind: TradeKind,
    pub shares: Decimal,
    pub price: Decimal,
}

/// All transactions for one ticker plus optional exit levels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Position {
    pub transactions: Vec<Transaction>,
    pub stoploss: Option<Decimal>,
    pub takeprofit: Option<Decimal>,
}

/// Derived view of a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSummary {
    pub holding: Decimal,
    pub average_cost: Decimal,
    pub bought: Decimal,
    pub sold: Decimal,
    pub last_update: DateTime<Utc>,
    pub stoploss: Option<Decimal>,
    pub takeprofit: Option<Decimal>,
}

/// One audited action against the datastore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub at: DateTime<Utc>,
    pub action: String,
    pub details: Vec<String>,
}

/// The local datastore of all program information.
#[derive(Debug, Clone)]
pub struct Datastore {
    positions: Namespace<Position>,
    watchlist: Namespace<WatchlistEntry>,
    picklist: Namespace<PicklistEntry>,
    history: Namespace<Vec<HistoryRecord>>,
}

impl Datastore {
    /// Opens the datastore rooted at `base`, creating the per-database
    /// directories if needed.
    ///
    /// # Errors
    /// Returns an error if a database directory cannot be created.
    pub fn open(base: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            positions: Namespace::open(&base.join("positions"))?,
            watchlist: Namespace::open(&base.join("watchlist"))?,
            picklist: Namespace::open(&base.join("picklist"))?,
            history: Namespace::open(&base.join("history"))?,
        })
    }

    #[must_use]
    pub fn positions(&self) -> &Namespace<Position> {
        &self.positions
    }

    #[must_use]
    pub fn watchlist(&self) -> &Namespace<WatchlistEntry> {
        &self.watchlist
    }

    #[must_use]
    pub fn picklist(&self) -> &Namespace<PicklistEntry> {
        &self.picklist
    }

    #[must_use]
    pub fn history(&self) -> &Namespace<Vec<HistoryRecord>> {
        &self.history
    }

    /// Appends a history record for `ticker`.
    ///
    /// # Errors
    /// Returns an error if the history record cannot be persisted.
    pub fn record_history(
        &self,
        ticker: &str,
        action: &str,
        details: &[String],
    ) -> Result<(), StoreError> {
        let mut records = self.history.read(ticker)?.unwrap_or_default();
        records.push(HistoryRecord {
            at: Utc::now(),
            action: action.to_string(),
            details: details.to_vec(),
        });
        self.history.write(ticker, &records)
    }

    /// Adds `ticker` to the watchlist with the quote captured at add time.
    ///
    /// # Errors
    /// Fails with [`DatastoreError::EntryExists`] if the ticker is already
    /// watched.
    pub fn add_to_watchlist(
        &self,
        ticker: &str,
        note: &str,
        prices: Ohlcv,
    ) -> Result<(), DatastoreError> {
        if self.watchlist.contains(ticker) {
            return Err(DatastoreError::EntryExists {
                ticker: ticker.to_string(),
            });
        }
        let entry = WatchlistEntry {
            note: note.to_string(),
            added_at: Utc::now(),
            prices,
        };
        self.watchlist.write(ticker, &entry)?;
        self.record_history(ticker, "watch", &[note.to_string()])?;
        info!(ticker, "added to watchlist");
        Ok(())
    }

    /// Removes `ticker` from the watchlist.
    ///
    /// # Errors
    /// Fails with [`DatastoreError::EntryNotFound`] if the ticker is not
    /// watched.
    pub fn remove_from_watchlist(&self, ticker: &str) -> Result<(), DatastoreError> {
        if !self.watchlist.delete(ticker)? {
            return Err(DatastoreError::EntryNotFound {
                ticker: ticker.to_string(),
            });
        }
        self.record_history(ticker, "unwatch", &[])?;
        info!(ticker, "removed from watchlist");
        Ok(())
    }

    /// Records a buy, optionally setting exit levels in the same call.
    ///
    /// # Errors
    /// Returns an error if the position cannot be persisted.
    pub fn add_buy(
        &self,
        ticker: &str,
        shares: Decimal,
        price: Decimal,
        stoploss: Option<Decimal>,
        takeprofit: Option<Decimal>,
    ) -> Result<(), DatastoreError> {
        self.add_transaction(ticker, TradeKind::Buy, shares, price)?;
        if stoploss.is_some() || takeprofit.is_some() {
            self.update_position(ticker, stoploss, takeprofit)?;
        }
        Ok(())
    }

    /// Records a sell.
    ///
    /// # Errors
    /// Returns an error if the position cannot be persisted.
    pub fn add_sell(
        &self,
        ticker: &str,
        shares: Decimal,
        price: Decimal,
    ) -> Result<(), DatastoreError> {
        self.add_transaction(ticker, TradeKind::Sell, shares, price)
    }

    /// Updates exit levels on an existing position. `None` leaves the
    /// current value in place.
    ///
    /// # Errors
    /// Fails with [`DatastoreError::EntryNotFound`] if there is no position
    /// for the ticker.
    pub fn update_position(
        &self,
        ticker: &str,
        stoploss: Option<Decimal>,
        takeprofit: Option<Decimal>,
    ) -> Result<(), DatastoreError> {
        let Some(mut position) = self.positions.read(ticker)? else {
            return Err(DatastoreError::EntryNotFound {
                ticker: ticker.to_string(),
            });
        };
        if stoploss.is_some() {
            position.stoploss = stoploss;
        }
        if takeprofit.is_some() {
            position.takeprofit = takeprofit;
        }
        self.positions.write(ticker, &position)?;
        Ok(())
    }

    /// Summarizes one position.
    ///
    /// # Errors
    /// Fails with [`DatastoreError::EntryNotFound`] if there is no position
    /// for the ticker.
    pub fn position_summary(&self, ticker: &str) -> Result<PositionSummary, DatastoreError> {
        let Some(position) = self.positions.read(ticker)? else {
            return Err(DatastoreError::EntryNotFound {
                ticker: ticker.to_string(),
            });
        };
        Ok(summarize(&position))
    }

    /// Summarizes every position, sorted by ticker.
    ///
    /// # Errors
    /// Returns an error if the positions database cannot be read.
    pub fn all_position_summaries(
        &self,
    ) -> Result<Vec<(String, PositionSummary)>, DatastoreError> {
        let mut summaries = Vec::new();
        for (ticker, position) in self.positions.entries()? {
            summaries.push((ticker, summarize(&position)));
        }
        Ok(summaries)
    }

    fn add_transaction(
        &self,
        ticker: &str,
        kind: TradeKind,
        shares: Decimal,
        price: Decimal,
    ) -> Result<(), DatastoreError> {
        let mut position = self.positions.read(ticker)?.unwrap_or_default();
        position.transactions.push(Transaction {
            at: Utc::now(),
            kind,
            shares,
            price,
        });
        self.positions.write(ticker, &position)?;
        let action = match kind {
            TradeKind::Buy => "buy",
            TradeKind::Sell => "sell",
        };
        self.record_history(ticker, action, &[shares.to_string(), price.to_string()])?;
        info!(ticker, action, %shares, %price, "recorded trade");
        Ok(())
    }
}

fn summarize(position: &Position) -> PositionSummary {
    let buys: Vec<&Transaction> = position
        .transactions
        .iter()
        .filter(|t| t.kind == TradeKind::Buy)
        .collect();
    let bought: Decimal = buys.iter().map(|t| t.shares).sum();
    let sold: Decimal = position
        .transactions
        .iter()
        .filter(|t| t.kind == TradeKind::Sell)
        .map(|t| t.shares)
        .sum();
    let average_cost = if buys.is_empty() {
        Decimal::ZERO
    } else {
        buys.iter().map(|t| t.price).sum::<Decimal>() / Decimal::from(buys.len() as u64)
    };
    let last_update = position
        .transactions
        .iter()
        .map(|t| t.at)
        .max()
        .unwrap_or_else(Utc::now);

    PositionSummary {
        holding: bought - sold,
        average_cost,
        bought,
        sold,
        last_update,
        stoploss: position.stoploss,
        takeprofit: position.takeprofit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn quote() -> Ohlcv {
        Ohlcv {
            open: dec!(10),
            high: dec!(12),
            low: dec!(9.5),
            close: dec!(11),
            volume: dec!(100000),
        }
    }

    fn open_store(dir: &TempDir) -> Datastore {
        Datastore::open(dir.path()).unwrap()
    }

    #[test]
    fn duplicate_watch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.add_to_watchlist("AAPL", "earnings", quote()).unwrap();

        let err = store
            .add_to_watchlist("AAPL", "again", quote())
            .unwrap_err();
        assert!(matches!(err, DatastoreError::EntryExists { ticker } if ticker == "AAPL"));
    }

    #[test]
    fn unwatch_of_unknown_ticker_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let err = store.remove_from_watchlist("AAPL").unwrap_err();
        assert!(matches!(err, DatastoreError::EntryNotFound { ticker } if ticker == "AAPL"));
    }

    #[test]
    fn watch_and_unwatch_leave_a_history_trail() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.add_to_watchlist("AAPL", "earnings", quote()).unwrap();
        store.remove_from_watchlist("AAPL").unwrap();

        let history = store.history().read("AAPL").unwrap().unwrap();
        let actions: Vec<_> = history.iter().map(|r| r.action.as_str()).collect();
        assert_eq!(actions, vec!["watch", "unwatch"]);
    }

    #[test]
    fn position_summary_nets_buys_against_sells() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store
            .add_buy("AAPL", dec!(10), dec!(100), Some(dec!(90)), None)
            .unwrap();
        store.add_buy("AAPL", dec!(10), dec!(110), None, None).unwrap();
        store.add_sell("AAPL", dec!(5), dec!(120)).unwrap();

        let summary = store.position_summary("AAPL").unwrap();
        assert_eq!(summary.holding, dec!(15));
        assert_eq!(summary.bought, dec!(20));
        assert_eq!(summary.sold, dec!(5));
        assert_eq!(summary.average_cost, dec!(105));
        assert_eq!(summary.stoploss, Some(dec!(90)));
        assert_eq!(summary.takeprofit, None);
    }

    #[test]
    fn update_position_requires_an_existing_position() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let err = store
            .update_position("AAPL", Some(dec!(90)), None)
            .unwrap_err();
        assert!(matches!(err, DatastoreError::EntryNotFound { .. }));
    }
}
