use crate::{
    aggregator::VolumeLevelAggregator,
    config::ProfileConfig,
    divergence::{DivergencePivotTracker, PivotState},
    error::OrderflowError,
    feed::FeedEvent,
    imbalance::ImbalanceDetector,
    level::LevelKey,
    metrics::{self, BarMetricsCalculator},
    store::{BarStore, LevelMap},
    types::{
        BarClose, BarIndex, BarRecord, BarSnapshot, DivergenceMarker, Imbalance, LevelSnapshot,
        Tick,
    },
};
use tracing::debug;

/// Consumer of computed bar metrics and divergence markers.
///
/// Sinks are invoked synchronously from the single engine writer, in order: every divergence
/// marker produced by a bar close, followed by the closed bar's [`BarSnapshot`].
pub trait ProfileSink {
    fn on_bar(&mut self, snapshot: &BarSnapshot) -> Result<(), OrderflowError>;

    fn on_divergence(&mut self, marker: &DivergenceMarker) -> Result<(), OrderflowError>;

    fn flush(&mut self) -> Result<(), OrderflowError> {
        Ok(())
    }
}

impl<S> ProfileSink for Box<S>
where
    S: ProfileSink + ?Sized,
{
    fn on_bar(&mut self, snapshot: &BarSnapshot) -> Result<(), OrderflowError> {
        (**self).on_bar(snapshot)
    }

    fn on_divergence(&mut self, marker: &DivergenceMarker) -> Result<(), OrderflowError> {
        (**self).on_divergence(marker)
    }

    fn flush(&mut self) -> Result<(), OrderflowError> {
        (**self).flush()
    }
}

/// Single writer order flow pipeline.
///
/// Owns all session state (bar storage and [`PivotState`]) and drives the
/// [`VolumeLevelAggregator`], [`BarMetricsCalculator`], [`ImbalanceDetector`] and
/// [`DivergencePivotTracker`] in feed order. Events must be delivered serially, with a bar's
/// close strictly after every tick belonging to that bar.
#[derive(Debug)]
pub struct OrderflowEngine<Sink> {
    config: ProfileConfig,
    store: BarStore,
    pivots: PivotState,
    aggregator: VolumeLevelAggregator,
    metrics: BarMetricsCalculator,
    imbalances: ImbalanceDetector,
    divergence: DivergencePivotTracker,
    sink: Sink,
}

impl<Sink> OrderflowEngine<Sink>
where
    Sink: ProfileSink,
{
    pub fn new(config: ProfileConfig, sink: Sink) -> Result<Self, OrderflowError> {
        config.validate()?;

        let bucketing = config.bucketing();

        Ok(Self {
            store: BarStore::new(config.max_retained_bars),
            pivots: PivotState::default(),
            aggregator: VolumeLevelAggregator::new(bucketing),
            metrics: BarMetricsCalculator::new(bucketing, config.short_window, config.long_window),
            imbalances: ImbalanceDetector::new(bucketing, config.imbalance_threshold),
            divergence: DivergencePivotTracker::new(config.min_divergence_history),
            config,
            sink,
        })
    }

    pub fn process(&mut self, event: FeedEvent) -> Result<(), OrderflowError> {
        match event {
            FeedEvent::Tick(tick) => {
                self.on_tick(&tick);
                Ok(())
            }
            FeedEvent::BarOpen { bar_index } => {
                self.on_bar_open(bar_index);
                Ok(())
            }
            FeedEvent::BarClose(close) => self.on_bar_close(close),
        }
    }

    /// Aggregate a tick and live recompute the metrics of the bar it touched.
    ///
    /// Returns the bar index the tick was aggregated into, `None` if it was dropped.
    pub fn on_tick(&mut self, tick: &Tick) -> Option<BarIndex> {
        let bar_index = self.aggregator.ingest(&mut self.store, tick)?;

        if let Err(error) = self.metrics.recompute(&mut self.store, bar_index) {
            debug!(%error, bar_index, "failed to recompute live bar metrics");
        }

        Some(bar_index)
    }

    /// Bar open notification, creating the bar ahead of its first tick.
    pub fn on_bar_open(&mut self, bar_index: BarIndex) -> bool {
        self.aggregator.open_bar(&mut self.store, bar_index)
    }

    /// Finalise a bar: authoritative metrics, imbalance scan, divergence evaluation, then
    /// emit divergence markers followed by the bar snapshot to the sink.
    ///
    /// Repeated closes of the same bar are ignored, as are closes of bars that fell outside
    /// the retention window and closes of `BarIndex::MAX`, which has no successor to open.
    pub fn on_bar_close(&mut self, close: BarClose) -> Result<(), OrderflowError> {
        let bar_index = close.bar_index;

        let Some(next) = bar_index.checked_add(1) else {
            debug!(bar_index, "ignoring bar close with no successor bar index");
            return Ok(());
        };

        let Some(bar) = self.store.open(bar_index) else {
            debug!(bar_index, "ignoring bar close outside retention window");
            return Ok(());
        };

        if bar.is_closed() {
            debug!(bar_index, "ignoring repeated bar close");
            return Ok(());
        }

        bar.apply_close(close.high, close.low);

        // The next bar starts with fresh divergence flags before the closed bar is evaluated
        self.aggregator.open_bar(&mut self.store, next);

        self.metrics.recompute(&mut self.store, bar_index)?;
        self.imbalances.scan(&mut self.store, bar_index)?;

        let markers = self
            .divergence
            .evaluate(&mut self.pivots, &mut self.store, next);

        for marker in &markers {
            self.sink.on_divergence(marker)?;
        }

        let snapshot = self.snapshot(bar_index)?;
        self.sink.on_bar(&snapshot)
    }

    /// Build the rendering view of a bar, levels ordered from highest to lowest price.
    pub fn snapshot(&self, bar_index: BarIndex) -> Result<BarSnapshot, OrderflowError> {
        let bar = self
            .store
            .get(bar_index)
            .ok_or(OrderflowError::MissingBarRecord { bar_index })?;

        let record = bar.record();
        let bucketing = self.config.bucketing();
        let threshold = self.imbalances.threshold();
        let point_of_control = metrics::point_of_control(bar.levels());

        let highlighted = |key: LevelKey, side: fn(&Imbalance) -> bool| {
            record
                .stacked_imbalances
                .iter()
                .any(|imbalance| {
                    imbalance.level == key && side(imbalance) && imbalance.ratio.abs() >= threshold
                })
        };

        let mut levels = bar.levels().iter().collect::<Vec<_>>();
        levels.sort_unstable_by(|(a, _), (b, _)| b.cmp(a));

        let levels = levels
            .into_iter()
            .map(|(&key, level)| LevelSnapshot {
                price: bucketing.price(key),
                total_volume: level.total_volume,
                buy_volume: level.buy_volume,
                sell_volume: level.sell_volume,
                delta: level.delta(),
                is_poc: point_of_control == Some(key),
                buy_imbalance: highlighted(key, Imbalance::is_buy),
                sell_imbalance: highlighted(key, Imbalance::is_sell),
            })
            .collect();

        Ok(BarSnapshot {
            bar_index,
            range: bar.range(),
            record: record.clone(),
            levels,
        })
    }

    pub fn flush(&mut self) -> Result<(), OrderflowError> {
        self.sink.flush()
    }

    pub fn bar_record(&self, bar_index: BarIndex) -> Result<&BarRecord, OrderflowError> {
        self.store
            .get(bar_index)
            .map(|bar| bar.record())
            .ok_or(OrderflowError::MissingBarRecord { bar_index })
    }

    pub fn bar_levels(&self, bar_index: BarIndex) -> Result<&LevelMap, OrderflowError> {
        self.store
            .get(bar_index)
            .map(|bar| bar.levels())
            .ok_or(OrderflowError::MissingBarRecord { bar_index })
    }

    pub fn bar_count(&self) -> usize {
        self.store.len()
    }

    pub fn pivots(&self) -> &PivotState {
        &self.pivots
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    pub fn into_sink(self) -> Sink {
        self.sink
    }
}
