//! Caller-owned FX rate cache.

use super::RateHistory;
use crate::types::CurrencyPair;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct CachedRates {
    history: RateHistory,
    /// Date range the history was requested for
    start: NaiveDate,
    end: NaiveDate,
    fetched_at: DateTime<Utc>,
}

impl CachedRates {
    fn covers(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start <= start && end <= self.end
    }
}

/// Rate histories kept between runs of a session.
///
/// The cache is constructed by the caller and passed into each run. Entries
/// older than the TTL are treated as absent, as are entries fetched for a
/// date range that does not contain the one asked for.
#[derive(Debug, Clone)]
pub struct FxRateCache {
    ttl: Duration,
    entries: HashMap<CurrencyPair, CachedRates>,
}

impl FxRateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh history for `pair` covering `start..=end`, as of `now`.
    pub fn get_at(
        &self,
        pair: CurrencyPair,
        start: NaiveDate,
        end: NaiveDate,
        now: DateTime<Utc>,
    ) -> Option<&RateHistory> {
        self.entries
            .get(&pair)
            .filter(|entry| now - entry.fetched_at < self.ttl)
            .filter(|entry| entry.covers(start, end))
            .map(|entry| &entry.history)
    }

    /// Fresh history for `pair` covering `start..=end`.
    pub fn get(&self, pair: CurrencyPair, start: NaiveDate, end: NaiveDate) -> Option<&RateHistory> {
        self.get_at(pair, start, end, Utc::now())
    }

    /// Store `history` as fetched for `start..=end`, replacing any entry for
    /// its pair.
    pub fn insert_at(
        &mut self,
        history: RateHistory,
        start: NaiveDate,
        end: NaiveDate,
        now: DateTime<Utc>,
    ) {
        self.entries.insert(
            history.pair(),
            CachedRates {
                history,
                start,
                end,
                fetched_at: now,
            },
        );
    }

    pub fn insert(&mut self, history: RateHistory, start: NaiveDate, end: NaiveDate) {
        self.insert_at(history, start, end, Utc::now());
    }

    /// Drop stale entries, returning how many were removed.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| now - entry.fetched_at < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
