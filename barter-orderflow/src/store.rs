//! Bar indexed storage for volume levels and derived bar records.

use crate::{
    level::{LevelKey, VolumeLevel},
    types::{BarIndex, BarRecord, PriceRange},
};
use fnv::{FnvBuildHasher, FnvHashMap};
use indexmap::IndexMap;
use tracing::debug;

/// Volume levels of a bar, iterated in the order each level first traded.
pub type LevelMap = IndexMap<LevelKey, VolumeLevel, FnvBuildHasher>;

/// Everything known about a single primary bar.
///
/// The level map and [`BarRecord`] live in the same struct so that one can never exist
/// without the other.
#[derive(Debug, Clone, Default)]
pub struct BarProfile {
    pub(crate) levels: LevelMap,
    pub(crate) record: BarRecord,
    pub(crate) range: Option<PriceRange>,
    pub(crate) closed: bool,
}

impl BarProfile {
    pub fn levels(&self) -> &LevelMap {
        &self.levels
    }

    pub fn level(&self, key: LevelKey) -> Option<&VolumeLevel> {
        self.levels.get(&key)
    }

    pub fn record(&self) -> &BarRecord {
        &self.record
    }

    pub fn range(&self) -> Option<PriceRange> {
        self.range
    }

    /// True once the bar close for this bar has been processed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn extend_range(&mut self, price: f64) {
        match &mut self.range {
            Some(range) => range.extend(price),
            None => self.range = Some(PriceRange::point(price)),
        }
    }

    /// Apply the feed's authoritative extremes, falling back to tick extremes per side.
    pub(crate) fn apply_close(&mut self, high: Option<f64>, low: Option<f64>) {
        let ticks = self.range;
        let high = high.or(ticks.map(|range| range.high));
        let low = low.or(ticks.map(|range| range.low));

        self.range = match (high, low) {
            (Some(high), Some(low)) => Some(PriceRange::new(high, low)),
            _ => None,
        };
        self.closed = true;
    }
}

/// Session storage of [`BarProfile`]s keyed by primary bar index.
///
/// With `max_retained` set, opening a bar newer than any seen so far evicts every bar that
/// falls out of the trailing retention window. Only bar boundary events open bars, ticks
/// [`touch`](BarStore::touch) them. Otherwise the whole session is retained.
#[derive(Debug, Clone, Default)]
pub struct BarStore {
    bars: FnvHashMap<BarIndex, BarProfile>,
    newest: Option<BarIndex>,
    max_retained: Option<usize>,
}

impl BarStore {
    pub fn new(max_retained: Option<usize>) -> Self {
        Self {
            bars: FnvHashMap::default(),
            newest: None,
            max_retained,
        }
    }

    /// Fetch the [`BarProfile`] for `bar_index`, creating it if absent.
    ///
    /// Returns `None` if `bar_index` is older than the retention window.
    pub fn open(&mut self, bar_index: BarIndex) -> Option<&mut BarProfile> {
        if !self.bars.contains_key(&bar_index) {
            if self.is_expired(bar_index) {
                return None;
            }
            if self.newest.is_none_or(|newest| bar_index > newest) {
                self.newest = Some(bar_index);
                self.evict();
            }
        }

        Some(self.bars.entry(bar_index).or_default())
    }

    /// Fetch the [`BarProfile`] for `bar_index` on behalf of a tick, creating it if absent.
    ///
    /// Unlike [`BarStore::open`] this never moves the retention window, so a tick carrying an
    /// outlier bar index cannot evict the session. Returns `None` if `bar_index` is older than
    /// the retention window.
    pub fn touch(&mut self, bar_index: BarIndex) -> Option<&mut BarProfile> {
        if !self.bars.contains_key(&bar_index) && self.is_expired(bar_index) {
            return None;
        }

        Some(self.bars.entry(bar_index).or_default())
    }

    pub fn get(&self, bar_index: BarIndex) -> Option<&BarProfile> {
        self.bars.get(&bar_index)
    }

    pub fn get_mut(&mut self, bar_index: BarIndex) -> Option<&mut BarProfile> {
        self.bars.get_mut(&bar_index)
    }

    pub fn contains(&self, bar_index: BarIndex) -> bool {
        self.bars.contains_key(&bar_index)
    }

    /// Delta of a bar, zero for bars with no recorded data.
    pub fn bar_delta(&self, bar_index: BarIndex) -> f64 {
        self.bars
            .get(&bar_index)
            .map_or(0.0, |bar| bar.record.bar_delta)
    }

    pub fn range(&self, bar_index: BarIndex) -> Option<PriceRange> {
        self.bars.get(&bar_index).and_then(BarProfile::range)
    }

    pub fn newest(&self) -> Option<BarIndex> {
        self.newest
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// First bar index still inside the retention window.
    fn retention_floor(&self) -> BarIndex {
        match (self.max_retained, self.newest) {
            (Some(max_retained), Some(newest)) => {
                newest
                    .saturating_add(1)
                    .saturating_sub(max_retained as BarIndex)
            }
            _ => 0,
        }
    }

    fn is_expired(&self, bar_index: BarIndex) -> bool {
        bar_index < self.retention_floor()
    }

    fn evict(&mut self) {
        if self.max_retained.is_none() {
            return;
        }

        let floor = self.retention_floor();
        let before = self.bars.len();
        self.bars.retain(|bar_index, _| *bar_index >= floor);

        let evicted = before - self.bars.len();
        if evicted > 0 {
            debug!(evicted, floor, "evicted bars outside retention window");
        }
    }
}
