//! Price pivot tracking and cumulative delta divergence detection.
//!
//! A pivot high is a bar whose high exceeds the highs of both neighbours, confirmed once the
//! right hand neighbour has closed. Later bars that retest the pivot while short CVD fails to
//! confirm are flagged as divergent:
//!
//! - bearish: high >= pivot high, `cvd_short <= pivot cvd`, `bar_delta <= previous bar_delta`
//! - bullish: low <= pivot low, `cvd_short > pivot cvd`, `bar_delta >= previous bar_delta`
//!
//! The CVD comparison is asymmetric between the two branches and must stay that way.

use crate::{
    store::BarStore,
    types::{BarIndex, DivergenceKind, DivergenceMarker, PriceRange},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A confirmed price pivot and the short CVD observed at it.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Pivot {
    pub price: f64,
    pub bar_index: BarIndex,
    pub cvd: f64,
}

/// Most recent pivot high and pivot low of the session.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct PivotState {
    pub high: Option<Pivot>,
    pub low: Option<Pivot>,
}

/// Evaluates pivots and delta divergence once per closed primary bar.
///
/// Holds no session state of its own, the [`PivotState`] is passed into every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DivergencePivotTracker {
    min_history: BarIndex,
}

impl DivergencePivotTracker {
    pub fn new(min_history: BarIndex) -> Self {
        Self { min_history }
    }

    /// Evaluate pivots and divergence relative to `current`, the newly opened bar.
    ///
    /// The pivot candidate is `current - 2` (against `current - 3` and `current - 1`) and the
    /// divergence candidate is `current - 1`. Divergent bars are flagged on their
    /// [`BarRecord`](crate::types::BarRecord) and returned as markers.
    pub fn evaluate(
        &self,
        pivots: &mut PivotState,
        store: &mut BarStore,
        current: BarIndex,
    ) -> Vec<DivergenceMarker> {
        if current < self.min_history {
            return Vec::new();
        }

        let (one_back, two_back, three_back) = (current - 1, current - 2, current - 3);

        if let (Some(left), Some(middle), Some(right)) = (
            store.range(three_back),
            store.range(two_back),
            store.range(one_back),
        ) {
            let cvd = store
                .get(two_back)
                .map_or(0.0, |bar| bar.record().cvd_short);
            confirm_pivots(pivots, two_back, cvd, left, middle, right);
        }

        let (Some(range), Some(record)) = (
            store.range(one_back),
            store.get(one_back).map(|bar| bar.record()),
        ) else {
            debug!(bar_index = one_back, "skipping divergence check for bar without range");
            return Vec::new();
        };

        let previous_delta = store.bar_delta(two_back);
        let mut markers = Vec::new();

        let bearish = pivots.high.filter(|pivot| {
            range.high >= pivot.price
                && record.cvd_short <= pivot.cvd
                && record.bar_delta <= previous_delta
        });
        if let Some(pivot) = bearish {
            markers.push(marker(
                DivergenceKind::Bearish,
                one_back,
                pivot,
                range.high,
                record.cvd_short,
            ));
        }

        let bullish = pivots.low.filter(|pivot| {
            range.low <= pivot.price
                && record.cvd_short > pivot.cvd
                && record.bar_delta >= previous_delta
        });
        if let Some(pivot) = bullish {
            markers.push(marker(
                DivergenceKind::Bullish,
                one_back,
                pivot,
                range.low,
                record.cvd_short,
            ));
        }

        if let Some(bar) = store.get_mut(one_back) {
            for marker in &markers {
                info!(
                    kind = %marker.kind,
                    bar_index = marker.at_bar_index,
                    pivot_bar_index = marker.from_bar_index,
                    price_from = marker.price_from,
                    price_to = marker.price_to,
                    "delta divergence"
                );
                match marker.kind {
                    DivergenceKind::Bearish => bar.record.bearish_divergence = true,
                    DivergenceKind::Bullish => bar.record.bullish_divergence = true,
                }
            }
        }

        markers
    }
}

fn confirm_pivots(
    pivots: &mut PivotState,
    bar_index: BarIndex,
    cvd: f64,
    left: PriceRange,
    middle: PriceRange,
    right: PriceRange,
) {
    if middle.high > left.high && middle.high > right.high {
        debug!(bar_index, price = middle.high, cvd, "pivot high confirmed");
        pivots.high = Some(Pivot {
            price: middle.high,
            bar_index,
            cvd,
        });
    }

    if middle.low < left.low && middle.low < right.low {
        debug!(bar_index, price = middle.low, cvd, "pivot low confirmed");
        pivots.low = Some(Pivot {
            price: middle.low,
            bar_index,
            cvd,
        });
    }
}

fn marker(
    kind: DivergenceKind,
    at_bar_index: BarIndex,
    pivot: Pivot,
    price_to: f64,
    cvd_short: f64,
) -> DivergenceMarker {
    DivergenceMarker {
        kind,
        at_bar_index,
        from_bar_index: pivot.bar_index,
        price_from: pivot.price,
        price_to,
        cvd_change_pct: cvd_change_pct(pivot.cvd, cvd_short),
    }
}

/// Percentage change from `from` to `to` relative to `|from|`, `None` when `from` is zero.
pub fn cvd_change_pct(from: f64, to: f64) -> Option<f64> {
    (from != 0.0).then(|| (to - from) / from.abs() * 100.0)
}
