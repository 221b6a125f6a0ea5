//! # Barter-Orderflow
//! Per bar order flow analytics driven by a serial stream of trade ticks and bar boundary
//! events:
//! * **Volume profile**: buy/sell/total volume per bucketed price level of every bar.
//! * **Point of control** and **bar delta**, recomputed live on every tick.
//! * **Cumulative volume delta** over rolling short and long bar windows.
//! * **Stacked imbalances** between diagonally adjacent levels of a closed bar.
//! * **Delta divergence** of price retests against the CVD observed at the last price pivots.
//!
//! ## Example
//! ```rust,no_run
//! use barter_orderflow::{
//!     OrderflowEngine, ProfileConfig,
//!     feed::FeedEvent,
//!     sink::JsonLinesSink,
//! };
//! use std::io::BufRead;
//!
//! let mut engine = OrderflowEngine::new(
//!     ProfileConfig::from_env(),
//!     JsonLinesSink::new(std::io::stdout()),
//! )
//! .unwrap();
//!
//! for line in std::io::stdin().lock().lines() {
//!     let event = FeedEvent::decode(&line.unwrap()).unwrap();
//!     engine.process(event).unwrap();
//! }
//! ```

/// All [`Error`](std::error::Error)s generated in Barter-Orderflow.
pub mod error;

/// [`ProfileConfig`] with environment overrides and validation.
pub mod config;

/// Price bucketing into [`LevelKey`](level::LevelKey)s and per level volume.
pub mod level;

/// Core event and record types.
pub mod types;

/// Bar indexed storage of level maps and bar records.
pub mod store;

/// [`VolumeLevelAggregator`](aggregator::VolumeLevelAggregator).
pub mod aggregator;

/// [`BarMetricsCalculator`](metrics::BarMetricsCalculator).
pub mod metrics;

/// [`ImbalanceDetector`](imbalance::ImbalanceDetector).
pub mod imbalance;

/// [`DivergencePivotTracker`](divergence::DivergencePivotTracker) and session pivot state.
pub mod divergence;

/// [`OrderflowEngine`] pipeline and the [`ProfileSink`] seam.
pub mod engine;

/// JSON lines and text ladder [`ProfileSink`] implementations.
pub mod sink;

/// Feed event decoding and the time based bar clock.
pub mod feed;

pub use config::{DisplayOptions, ProfileConfig};
pub use engine::{OrderflowEngine, ProfileSink};
pub use error::OrderflowError;
pub use types::{
    BarClose, BarIndex, BarRecord, BarSnapshot, DivergenceKind, DivergenceMarker, Imbalance,
    LevelSnapshot, PriceRange, Tick,
};
