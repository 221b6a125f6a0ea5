//! Feed events consumed by the [`OrderflowEngine`](crate::engine::OrderflowEngine), and a
//! time based bar clock for raw trade streams that carry no resolved bar index.

use crate::{
    error::OrderflowError,
    types::{BarClose, BarIndex, Tick},
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Serially ordered event from the tick/bar feed.
///
/// JSON representation is internally tagged:
/// `{"type": "bar_close", "bar_index": 12, "high": 4501.0, "low": 4497.5}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    Tick(Tick),
    BarOpen { bar_index: BarIndex },
    BarClose(BarClose),
}

impl FeedEvent {
    pub fn decode(line: &str) -> Result<Self, OrderflowError> {
        serde_json::from_str(line.trim()).map_err(OrderflowError::from)
    }
}

impl From<Tick> for FeedEvent {
    fn from(value: Tick) -> Self {
        Self::Tick(value)
    }
}

impl From<BarClose> for FeedEvent {
    fn from(value: BarClose) -> Self {
        Self::BarClose(value)
    }
}

/// Trade print without a resolved bar index.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawTrade {
    pub price: f64,
    pub size: f64,
    pub bid_price: f64,
    pub ask_price: f64,
    pub time: DateTime<Utc>,
}

impl RawTrade {
    pub fn decode(line: &str) -> Result<Self, OrderflowError> {
        serde_json::from_str(line.trim()).map_err(OrderflowError::from)
    }

    pub fn into_tick(self, bar_index: i64) -> Tick {
        Tick::new(
            self.price,
            self.size,
            self.bid_price,
            self.ask_price,
            self.time,
            bar_index,
        )
    }
}

/// Resolves trade timestamps into fixed duration primary bars.
///
/// The session starts at the bar boundary at or before the first trade, bar boundaries are
/// multiples of the bar duration since the Unix epoch. Uses trade timestamps, never the wall
/// clock, so replayed history produces the same bars as the live session did.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeBarClock {
    bar_duration_ms: i64,
    session_start_ms: Option<i64>,
    current: Option<BarIndex>,
}

impl TimeBarClock {
    pub fn new(bar_duration: TimeDelta) -> Result<Self, OrderflowError> {
        let bar_duration_ms = bar_duration.num_milliseconds();
        if bar_duration_ms <= 0 {
            return Err(OrderflowError::InvalidConfig(format!(
                "bar duration must be at least 1ms, got {bar_duration}"
            )));
        }

        Ok(Self {
            bar_duration_ms,
            session_start_ms: None,
            current: None,
        })
    }

    /// Clock with a bar duration of `secs` seconds, as configured by `ORDERFLOW_BAR_SECS`.
    pub fn from_secs(secs: i64) -> Result<Self, OrderflowError> {
        TimeDelta::try_seconds(secs)
            .ok_or_else(|| {
                OrderflowError::InvalidConfig(format!("bar duration of {secs}s is out of range"))
            })
            .and_then(Self::new)
    }

    /// Bar currently open, if any trade has been stamped.
    pub fn current(&self) -> Option<BarIndex> {
        self.current
    }

    #[inline]
    fn align_to_bar(&self, ts: i64) -> i64 {
        ts.div_euclid(self.bar_duration_ms) * self.bar_duration_ms
    }

    /// Map a timestamp to its bar index, `None` before the session start.
    pub fn resolve(&self, time: DateTime<Utc>) -> Option<BarIndex> {
        let session_start = self.session_start_ms?;
        let ts = time.timestamp_millis();
        if ts < session_start {
            return None;
        }

        BarIndex::try_from((ts - session_start) / self.bar_duration_ms).ok()
    }

    /// Resolve a trade into a [`Tick`], preceded by the bar boundary events it implies.
    ///
    /// A trade opening a newer bar yields a [`FeedEvent::BarClose`] for the current bar and a
    /// [`FeedEvent::BarOpen`] for the new one. Trades older than the current bar pass through as
    /// late ticks, trades before the session start carry an unresolvable (negative) index.
    pub fn stamp(&mut self, trade: RawTrade) -> Vec<FeedEvent> {
        if self.session_start_ms.is_none() {
            let session_start = self.align_to_bar(trade.time.timestamp_millis());
            self.session_start_ms = Some(session_start);
        }

        let bar_index = self.resolve(trade.time);
        let mut events = Vec::with_capacity(3);

        match (bar_index, self.current) {
            (Some(bar_index), None) => {
                events.push(FeedEvent::BarOpen { bar_index });
                self.current = Some(bar_index);
            }
            (Some(bar_index), Some(current)) if bar_index > current => {
                debug!(closed = current, opened = bar_index, "time bar boundary crossed");
                events.push(FeedEvent::BarClose(BarClose::new(current, None, None)));
                events.push(FeedEvent::BarOpen { bar_index });
                self.current = Some(bar_index);
            }
            _ => {}
        }

        let bar_index = bar_index
            .and_then(|bar_index| i64::try_from(bar_index).ok())
            .unwrap_or(-1);

        events.push(FeedEvent::Tick(trade.into_tick(bar_index)));
        events
    }

    /// Close the open bar at the end of the stream.
    pub fn finish(&mut self) -> Option<FeedEvent> {
        self.current
            .take()
            .map(|bar_index| FeedEvent::BarClose(BarClose::new(bar_index, None, None)))
    }
}
