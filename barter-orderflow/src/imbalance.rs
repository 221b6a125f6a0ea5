//! Stacked order flow imbalance detection within a completed bar.
//!
//! Each level is compared only against the adjacent lower level of the same bar (diagonal
//! comparison): buy volume at `level` against sell volume at `level - 1`, and sell volume at
//! `level - 1` against buy volume at `level`.

use crate::{
    error::OrderflowError,
    level::Bucketing,
    store::BarStore,
    types::{BarIndex, BarRecord, Imbalance},
};
use tracing::info;

/// Flags stacked buy/sell imbalances between adjacent levels of a bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImbalanceDetector {
    bucketing: Bucketing,
    threshold: f64,
}

impl ImbalanceDetector {
    pub fn new(bucketing: Bucketing, threshold: f64) -> Self {
        Self {
            bucketing,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Scan the levels of `bar_index` and store the imbalances on its [`BarRecord`].
    ///
    /// Any imbalances from a previous scan of the same bar are replaced.
    pub fn scan<'a>(
        &self,
        store: &'a mut BarStore,
        bar_index: BarIndex,
    ) -> Result<&'a BarRecord, OrderflowError> {
        let bar = store
            .get_mut(bar_index)
            .ok_or(OrderflowError::MissingBarRecord { bar_index })?;

        let mut imbalances = Vec::new();
        let mut lowest_buy_level: Option<f64> = None;
        let mut highest_sell_level: Option<f64> = None;

        for (&key, level) in &bar.levels {
            let prev_key = key.below();
            let Some(prev) = bar.levels.get(&prev_key) else {
                continue;
            };

            let price = self.bucketing.price(key);
            let prev_price = self.bucketing.price(prev_key);

            match imbalance_ratio(level.buy_volume, prev.sell_volume) {
                Some(ratio) if ratio >= self.threshold => {
                    info!(bar_index, level = price, ratio, "buy imbalance");
                    imbalances.push(Imbalance::new(key, price, ratio));
                    lowest_buy_level = Some(lowest_buy_level.map_or(price, |max| max.max(price)));
                }
                _ => {}
            }

            match imbalance_ratio(prev.sell_volume, level.buy_volume) {
                Some(ratio) if ratio >= self.threshold => {
                    info!(bar_index, level = prev_price, ratio, "sell imbalance");
                    imbalances.push(Imbalance::new(prev_key, prev_price, -ratio));
                    highest_sell_level =
                        Some(highest_sell_level.map_or(prev_price, |max| max.max(prev_price)));
                }
                _ => {}
            }
        }

        let record = &mut bar.record;
        record.stacked_imbalances = imbalances;
        record.lowest_buy_imbalance_level = lowest_buy_level;
        record.highest_sell_imbalance_level = highest_sell_level;

        Ok(&*record)
    }
}

/// Ratio of two volumes.
///
/// A zero denominator with positive numerator yields `+inf`, which satisfies any threshold.
/// Both volumes zero is undefined and yields `None`.
pub fn imbalance_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator > 0.0 {
        Some(numerator / denominator)
    } else if numerator > 0.0 {
        Some(f64::INFINITY)
    } else {
        None
    }
}
