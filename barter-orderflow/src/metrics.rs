//! Bar delta, point of control and rolling cumulative volume delta.

use crate::{
    error::OrderflowError,
    level::{Bucketing, LevelKey},
    store::{BarStore, LevelMap},
    types::{BarIndex, BarRecord},
};

/// Derives bar delta, point of control, and short/long CVD from aggregated levels.
///
/// Every call recomputes from scratch, so repeated calls without new ticks are idempotent.
/// Cost is O(levels in bar + long window).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarMetricsCalculator {
    bucketing: Bucketing,
    short_window: usize,
    long_window: usize,
}

impl BarMetricsCalculator {
    pub fn new(bucketing: Bucketing, short_window: usize, long_window: usize) -> Self {
        Self {
            bucketing,
            short_window,
            long_window,
        }
    }

    /// Recompute the metrics of `bar_index` in place.
    ///
    /// The bar must already exist: only the aggregator creates bars.
    pub fn recompute<'a>(
        &self,
        store: &'a mut BarStore,
        bar_index: BarIndex,
    ) -> Result<&'a BarRecord, OrderflowError> {
        let bar = store
            .get(bar_index)
            .ok_or(OrderflowError::MissingBarRecord { bar_index })?;

        let bar_delta = bar_delta(bar.levels());
        let point_of_control = point_of_control(bar.levels()).map(|key| self.bucketing.price(key));
        let cvd_short = trailing_delta(store, bar_index, self.short_window) + bar_delta;
        let cvd_long = trailing_delta(store, bar_index, self.long_window) + bar_delta;

        let record = &mut store
            .get_mut(bar_index)
            .ok_or(OrderflowError::MissingBarRecord { bar_index })?
            .record;

        record.bar_delta = bar_delta;
        record.point_of_control = point_of_control;
        record.cvd_short = cvd_short;
        record.cvd_long = cvd_long;

        Ok(&*record)
    }
}

/// Sum of level deltas.
pub fn bar_delta(levels: &LevelMap) -> f64 {
    levels.values().map(|level| level.delta()).sum()
}

/// Level with the maximum total volume, ties resolved in favour of the level that traded first.
pub fn point_of_control(levels: &LevelMap) -> Option<LevelKey> {
    levels
        .iter()
        .fold(None, |best: Option<(LevelKey, f64)>, (key, level)| match best {
            Some((_, max_volume)) if level.total_volume <= max_volume => best,
            _ => Some((*key, level.total_volume)),
        })
        .map(|(key, _)| key)
}

/// Sum of bar deltas over the `window` bars preceding `bar_index`, clipped at bar zero.
fn trailing_delta(store: &BarStore, bar_index: BarIndex, window: usize) -> f64 {
    let start = bar_index.saturating_sub(window as BarIndex);
    (start..bar_index).map(|index| store.bar_delta(index)).sum()
}
