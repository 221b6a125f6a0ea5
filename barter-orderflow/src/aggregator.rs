//! Tick to bar volume aggregation.
//!
//! Every accepted tick touches exactly one [`VolumeLevel`](crate::level::VolumeLevel) of
//! exactly one bar: total volume always grows, and buy or sell volume grows when the tick
//! can be classified against the prevailing quote.

use crate::{
    error::OrderflowError,
    level::Bucketing,
    store::BarStore,
    types::{BarIndex, Tick},
};
use tracing::debug;

/// Accumulates per bar, per price level buy/sell/total volume from ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeLevelAggregator {
    bucketing: Bucketing,
}

impl VolumeLevelAggregator {
    pub fn new(bucketing: Bucketing) -> Self {
        Self { bucketing }
    }

    pub fn bucketing(&self) -> Bucketing {
        self.bucketing
    }

    /// Ingest a tick into `store`, returning the bar index it was aggregated into.
    ///
    /// Ticks with an unresolvable bar index, invalid price/size, or a bar index older than
    /// the retention window are dropped.
    pub fn ingest(&self, store: &mut BarStore, tick: &Tick) -> Option<BarIndex> {
        let bar_index = match validate(tick) {
            Ok(bar_index) => bar_index,
            Err(error) => {
                debug!(%error, time = %tick.time, "dropping tick");
                return None;
            }
        };

        let Some(bar) = store.touch(bar_index) else {
            debug!(bar_index, "dropping tick for bar outside retention window");
            return None;
        };

        if bar.closed {
            // Downstream detectors already ran for this bar and are not re-run
            debug!(bar_index, price = tick.price, "late tick for closed bar");
        } else {
            bar.extend_range(tick.price);
        }

        bar.levels
            .entry(self.bucketing.key(tick.price))
            .or_default()
            .record(tick.size, tick.aggressor());

        Some(bar_index)
    }

    /// Bar open notification: create the (empty) bar if absent and reset its divergence flags.
    ///
    /// Returns false if `bar_index` is older than the retention window.
    pub fn open_bar(&self, store: &mut BarStore, bar_index: BarIndex) -> bool {
        match store.open(bar_index) {
            Some(bar) => {
                bar.record.bullish_divergence = false;
                bar.record.bearish_divergence = false;
                true
            }
            None => {
                debug!(bar_index, "ignoring bar open outside retention window");
                false
            }
        }
    }
}

fn validate(tick: &Tick) -> Result<BarIndex, OrderflowError> {
    let bar_index = BarIndex::try_from(tick.bar_index)
        .map_err(|_| OrderflowError::UnresolvableBarIndex(tick.bar_index))?;

    if !(tick.price.is_finite() && tick.price > 0.0) {
        return Err(OrderflowError::InvalidTick(format!(
            "price must be positive, got {}",
            tick.price
        )));
    }

    if !(tick.size.is_finite() && tick.size > 0.0) {
        return Err(OrderflowError::InvalidTick(format!(
            "size must be positive, got {}",
            tick.size
        )));
    }

    Ok(bar_index)
}
