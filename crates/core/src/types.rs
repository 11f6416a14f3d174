//! Shared domain types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single day's open/high/low/close/volume snapshot for one ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Opaque identifier for a deferred one-shot job.
///
/// Returned by the scheduler on submission and must be presented back to
/// cancel the job. The inner id is whatever the external scheduling facility
/// printed; nothing outside the scheduler should interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(pub u32);

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
