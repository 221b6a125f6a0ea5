//! Core data types flowing through the order flow pipeline.

use crate::level::{Aggressor, LevelKey};
use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};

/// Primary bar index as resolved by the feed.
pub type BarIndex = u64;

/// A single trade execution with the prevailing top of book.
///
/// `bar_index` is resolved externally by mapping `time` to the primary bar that was open at
/// that time. A negative index means the mapping failed and the tick is discarded.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Tick {
    pub price: f64,
    pub size: f64,
    pub bid_price: f64,
    pub ask_price: f64,
    pub time: DateTime<Utc>,
    pub bar_index: i64,
}

impl Tick {
    pub fn aggressor(&self) -> Option<Aggressor> {
        Aggressor::classify(self.price, self.bid_price, self.ask_price)
    }
}

/// Signal that a primary bar has finalised.
///
/// `high` and `low` are the bar's authoritative price extremes when the feed provides them,
/// otherwise the extremes observed from ticks are used.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, Constructor)]
pub struct BarClose {
    pub bar_index: BarIndex,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
}

/// High/low price extremes of a bar.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, Constructor)]
pub struct PriceRange {
    pub high: f64,
    pub low: f64,
}

impl PriceRange {
    pub fn point(price: f64) -> Self {
        Self {
            high: price,
            low: price,
        }
    }

    pub fn extend(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
    }
}

/// A stacked imbalance found within a bar.
///
/// Positive `ratio` is a buy imbalance, negative `ratio` is a sell imbalance. A ratio whose
/// denominator volume was zero is infinite (serialised as `null` in JSON).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Imbalance {
    pub level: LevelKey,
    pub price: f64,
    pub ratio: f64,
}

impl Imbalance {
    pub fn is_buy(&self) -> bool {
        self.ratio > 0.0
    }

    pub fn is_sell(&self) -> bool {
        self.ratio < 0.0
    }
}

/// Derived metrics for a single primary bar.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct BarRecord {
    /// Sum of level deltas across the bar.
    pub bar_delta: f64,
    /// Bucketed price with the highest total volume, first level to reach the max wins.
    pub point_of_control: Option<f64>,
    /// `bar_delta` plus the deltas of the preceding short window of bars.
    pub cvd_short: f64,
    /// `bar_delta` plus the deltas of the preceding long window of bars.
    pub cvd_long: f64,
    pub stacked_imbalances: Vec<Imbalance>,
    /// Highest price among buy imbalance levels, the floor of the buy imbalance zone.
    pub lowest_buy_imbalance_level: Option<f64>,
    /// Highest price among sell imbalance levels.
    pub highest_sell_imbalance_level: Option<f64>,
    pub bullish_divergence: bool,
    pub bearish_divergence: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    Bullish,
    Bearish,
}

/// Delta divergence between a prior price pivot and a subsequent bar.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct DivergenceMarker {
    pub kind: DivergenceKind,
    /// Bar flagged as divergent.
    pub at_bar_index: BarIndex,
    /// Bar where the referenced pivot was confirmed.
    pub from_bar_index: BarIndex,
    /// Pivot price.
    pub price_from: f64,
    /// Divergent bar's high (bearish) or low (bullish).
    pub price_to: f64,
    /// Percentage change of short CVD from the pivot to the divergent bar, absent when the
    /// pivot CVD is zero.
    pub cvd_change_pct: Option<f64>,
}

/// Volume at one level as presented to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct LevelSnapshot {
    pub price: f64,
    pub total_volume: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub delta: f64,
    pub is_poc: bool,
    pub buy_imbalance: bool,
    pub sell_imbalance: bool,
}

/// Complete computed state of a bar, handed to the rendering sink.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BarSnapshot {
    pub bar_index: BarIndex,
    pub range: Option<PriceRange>,
    #[serde(flatten)]
    pub record: BarRecord,
    /// Levels ordered from highest to lowest price.
    pub levels: Vec<LevelSnapshot>,
}
