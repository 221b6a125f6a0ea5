//! Price bucketing and per-level volume accumulation.
//!
//! Raw trade prices are quantised into buckets of `tick_size * ticks_per_level`. A bucket is
//! identified by its integer [`LevelKey`] (`floor(price / bucket_size)`), so two ticks share a
//! level exactly when they fall into the same bucket, and the adjacent lower level is always
//! `key - 1` regardless of floating point representation of the bucket size.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Quantises raw prices into fixed size price buckets.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Bucketing {
    tick_size: f64,
    ticks_per_level: u32,
}

impl Bucketing {
    pub fn new(tick_size: f64, ticks_per_level: u32) -> Self {
        Self {
            tick_size,
            ticks_per_level,
        }
    }

    pub fn tick_size(&self) -> f64 {
        self.tick_size
    }

    pub fn ticks_per_level(&self) -> u32 {
        self.ticks_per_level
    }

    /// Price distance between two adjacent levels.
    #[inline]
    pub fn size(&self) -> f64 {
        self.tick_size * f64::from(self.ticks_per_level)
    }

    /// Bucket a raw price into its [`LevelKey`].
    #[inline]
    pub fn key(&self, price: f64) -> LevelKey {
        LevelKey((price / self.size()).floor() as i64)
    }

    /// Lower boundary price of the bucket identified by `key`.
    #[inline]
    pub fn price(&self, key: LevelKey) -> f64 {
        key.0 as f64 * self.size()
    }
}

/// Integer index of a price bucket.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Deserialize, Serialize,
)]
pub struct LevelKey(pub i64);

impl LevelKey {
    /// The adjacent lower bucket.
    #[inline]
    pub fn below(self) -> Self {
        Self(self.0 - 1)
    }
}

/// Aggressor side of a trade, derived from the prevailing bid/ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Deserialize, Serialize)]
pub enum Aggressor {
    Buy,
    Sell,
}

impl Aggressor {
    /// Classify a trade against the prevailing quote.
    ///
    /// A trade lifting the ask is a buy, a trade hitting the bid is a sell. Trades printing
    /// strictly inside the spread, or against a missing (non-positive) quote, are unclassified.
    pub fn classify(price: f64, bid_price: f64, ask_price: f64) -> Option<Self> {
        if price >= ask_price && ask_price > 0.0 {
            Some(Aggressor::Buy)
        } else if price <= bid_price && bid_price > 0.0 {
            Some(Aggressor::Sell)
        } else {
            None
        }
    }
}

/// Traded volume at a single price level of a single bar.
///
/// Volumes only ever increase.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct VolumeLevel {
    pub total_volume: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
}

impl VolumeLevel {
    /// Aggressive buy volume minus aggressive sell volume.
    pub fn delta(&self) -> f64 {
        self.buy_volume - self.sell_volume
    }

    pub(crate) fn record(&mut self, size: f64, aggressor: Option<Aggressor>) {
        self.total_volume += size;
        match aggressor {
            Some(Aggressor::Buy) => self.buy_volume += size,
            Some(Aggressor::Sell) => self.sell_volume += size,
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucketing_key_and_price() {
        struct TestCase {
            price: f64,
            expected_key: LevelKey,
            expected_price: f64,
        }

        // ES style: 0.25 tick, 5 ticks per level => 1.25 buckets
        let bucketing = Bucketing::new(0.25, 5);

        let tests = vec![
            TestCase {
                // TC0: price exactly on a bucket boundary
                price: 100.0,
                expected_key: LevelKey(80),
                expected_price: 100.0,
            },
            TestCase {
                // TC1: price inside a bucket floors to the lower boundary
                price: 101.0,
                expected_key: LevelKey(80),
                expected_price: 100.0,
            },
            TestCase {
                // TC2: next bucket
                price: 101.25,
                expected_key: LevelKey(81),
                expected_price: 101.25,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let key = bucketing.key(test.price);
            assert_eq!(key, test.expected_key, "TC{} key failed", index);
            assert_eq!(
                bucketing.price(key),
                test.expected_price,
                "TC{} price failed",
                index
            );
        }
    }

    #[test]
    fn test_adjacent_level_with_inexact_bucket_size() {
        // 0.01 * 5 = 0.05 is not exactly representable, adjacency must still hold
        let bucketing = Bucketing::new(0.01, 5);
        let upper = bucketing.key(100.07);
        let lower = bucketing.key(100.02);

        assert_eq!(upper.below(), lower);
    }

    #[test]
    fn test_aggressor_classify() {
        struct TestCase {
            price: f64,
            bid: f64,
            ask: f64,
            expected: Option<Aggressor>,
        }

        let tests = vec![
            TestCase {
                // TC0: trade at the ask is a buy
                price: 100.25,
                bid: 100.0,
                ask: 100.25,
                expected: Some(Aggressor::Buy),
            },
            TestCase {
                // TC1: trade through the ask is a buy
                price: 100.5,
                bid: 100.0,
                ask: 100.25,
                expected: Some(Aggressor::Buy),
            },
            TestCase {
                // TC2: trade at the bid is a sell
                price: 100.0,
                bid: 100.0,
                ask: 100.25,
                expected: Some(Aggressor::Sell),
            },
            TestCase {
                // TC3: trade strictly inside the spread is unclassified
                price: 100.1,
                bid: 100.0,
                ask: 100.25,
                expected: None,
            },
            TestCase {
                // TC4: missing ask does not classify a buy
                price: 100.25,
                bid: 0.0,
                ask: 0.0,
                expected: None,
            },
            TestCase {
                // TC5: missing ask, valid bid at the trade price is a sell
                price: 100.0,
                bid: 100.0,
                ask: 0.0,
                expected: Some(Aggressor::Sell),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = Aggressor::classify(test.price, test.bid, test.ask);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_volume_level_record() {
        let mut level = VolumeLevel::default();
        level.record(10.0, Some(Aggressor::Buy));
        level.record(4.0, Some(Aggressor::Sell));
        level.record(3.0, None);

        assert_eq!(level.total_volume, 17.0);
        assert_eq!(level.buy_volume, 10.0);
        assert_eq!(level.sell_volume, 4.0);
        assert_eq!(level.delta(), 6.0);
    }
}
