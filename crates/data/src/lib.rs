pub mod cache;
pub mod datastore;
pub mod fetch;
pub mod store;

pub use cache::{CacheError, CachedQuote, QuoteCache};
pub use datastore::{
    Datastore, DatastoreError, HistoryRecord, PicklistEntry, Position, PositionSummary,
    TradeKind, Transaction, WatchlistEntry,
};
pub use fetch::{FetchError, FetchSession, HttpFetcher, QuoteFetcher};
pub use store::{Namespace, StoreError};
