//! [`ProfileSink`] implementations writing to any [`Write`] destination.

use crate::{
    config::DisplayOptions,
    engine::ProfileSink,
    error::OrderflowError,
    types::{BarSnapshot, DivergenceKind, DivergenceMarker},
};
use serde::Serialize;
use std::io::Write;

/// Message written by [`JsonLinesSink`], one JSON document per line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkMessage<'a> {
    Bar(&'a BarSnapshot),
    Divergence(&'a DivergenceMarker),
}

/// Writes every bar snapshot and divergence marker as a tagged JSON line.
///
/// Infinite imbalance ratios are written as `null`.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W> JsonLinesSink<W>
where
    W: Write,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write(&mut self, message: SinkMessage<'_>) -> Result<(), OrderflowError> {
        let line = serde_json::to_string(&message)?;
        writeln!(self.writer, "{line}")?;
        Ok(())
    }
}

impl<W> ProfileSink for JsonLinesSink<W>
where
    W: Write,
{
    fn on_bar(&mut self, snapshot: &BarSnapshot) -> Result<(), OrderflowError> {
        self.write(SinkMessage::Bar(snapshot))
    }

    fn on_divergence(&mut self, marker: &DivergenceMarker) -> Result<(), OrderflowError> {
        self.write(SinkMessage::Divergence(marker))
    }

    fn flush(&mut self) -> Result<(), OrderflowError> {
        self.writer.flush().map_err(OrderflowError::from)
    }
}

/// Human readable price ladder, one block per closed bar.
///
/// ```text
/// bar 12 | delta +31 | cvd +45 / +120 | poc 101.00
///         101.00         0 x 50       POC BUY
///         100.00        20 x 1
/// ```
///
/// Volumes are printed as `sell x buy` when [`DisplayOptions::show_volume_text`] is set, and
/// the imbalance zone boundaries are appended when
/// [`DisplayOptions::show_imbalance_lines`] is set.
#[derive(Debug)]
pub struct LadderSink<W> {
    writer: W,
    display: DisplayOptions,
    precision: usize,
}

impl<W> LadderSink<W>
where
    W: Write,
{
    pub fn new(writer: W, display: DisplayOptions) -> Self {
        Self {
            writer,
            display,
            precision: 2,
        }
    }

    /// Number of decimals used for prices.
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> ProfileSink for LadderSink<W>
where
    W: Write,
{
    fn on_bar(&mut self, snapshot: &BarSnapshot) -> Result<(), OrderflowError> {
        let precision = self.precision;
        let record = &snapshot.record;

        let poc = record
            .point_of_control
            .map_or_else(|| String::from("-"), |poc| format!("{poc:.precision$}"));

        writeln!(
            self.writer,
            "bar {} | delta {:+} | cvd {:+} / {:+} | poc {poc}",
            snapshot.bar_index, record.bar_delta, record.cvd_short, record.cvd_long
        )?;

        for level in &snapshot.levels {
            let mut line = format!("    {:>10.precision$}", level.price);

            if self.display.show_volume_text {
                line.push_str(&format!(
                    "  {:>8} x {:<8}",
                    level.sell_volume, level.buy_volume
                ));
            }

            let tags = [
                (level.is_poc, "POC"),
                (level.buy_imbalance, "BUY"),
                (level.sell_imbalance, "SELL"),
            ];
            for (_, tag) in tags.into_iter().filter(|(enabled, _)| *enabled) {
                line.push(' ');
                line.push_str(tag);
            }

            writeln!(self.writer, "{}", line.trim_end())?;
        }

        if self.display.show_imbalance_lines {
            if let Some(price) = record.lowest_buy_imbalance_level {
                writeln!(self.writer, "    buy imbalance zone from {price:.precision$}")?;
            }
            if let Some(price) = record.highest_sell_imbalance_level {
                writeln!(self.writer, "    sell imbalance zone to {price:.precision$}")?;
            }
        }

        if record.bearish_divergence {
            writeln!(self.writer, "    bearish divergence")?;
        }
        if record.bullish_divergence {
            writeln!(self.writer, "    bullish divergence")?;
        }

        Ok(())
    }

    fn on_divergence(&mut self, marker: &DivergenceMarker) -> Result<(), OrderflowError> {
        let precision = self.precision;
        let arrow = match marker.kind {
            DivergenceKind::Bearish => "v",
            DivergenceKind::Bullish => "^",
        };
        let change = marker
            .cvd_change_pct
            .map_or_else(String::new, |pct| format!(" (cvd {pct:+.1}%)"));

        writeln!(
            self.writer,
            "{arrow} {} divergence at bar {} from pivot bar {}: {:.precision$} -> {:.precision$}{change}",
            marker.kind,
            marker.at_bar_index,
            marker.from_bar_index,
            marker.price_from,
            marker.price_to,
        )?;

        Ok(())
    }

    fn flush(&mut self) -> Result<(), OrderflowError> {
        self.writer.flush().map_err(OrderflowError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        level::LevelKey,
        types::{BarRecord, Imbalance, LevelSnapshot, PriceRange},
    };

    fn snapshot() -> BarSnapshot {
        BarSnapshot {
            bar_index: 12,
            range: Some(PriceRange::new(101.5, 100.0)),
            record: BarRecord {
                bar_delta: 31.0,
                point_of_control: Some(101.0),
                cvd_short: 45.0,
                cvd_long: 120.0,
                stacked_imbalances: vec![Imbalance::new(LevelKey(101), 101.0, f64::INFINITY)],
                lowest_buy_imbalance_level: Some(101.0),
                highest_sell_imbalance_level: None,
                bullish_divergence: false,
                bearish_divergence: false,
            },
            levels: vec![
                LevelSnapshot {
                    price: 101.0,
                    total_volume: 50.0,
                    buy_volume: 50.0,
                    sell_volume: 0.0,
                    delta: 50.0,
                    is_poc: true,
                    buy_imbalance: true,
                    sell_imbalance: false,
                },
                LevelSnapshot {
                    price: 100.0,
                    total_volume: 21.0,
                    buy_volume: 1.0,
                    sell_volume: 20.0,
                    delta: -19.0,
                    is_poc: false,
                    buy_imbalance: false,
                    sell_imbalance: false,
                },
            ],
        }
    }

    fn marker() -> DivergenceMarker {
        DivergenceMarker {
            kind: DivergenceKind::Bearish,
            at_bar_index: 6,
            from_bar_index: 4,
            price_from: 15.0,
            price_to: 15.5,
            cvd_change_pct: Some(-50.0),
        }
    }

    #[test]
    fn test_json_lines_sink_tags_messages() {
        let mut sink = JsonLinesSink::new(Vec::new());

        sink.on_divergence(&marker()).unwrap();
        sink.on_bar(&snapshot()).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines = output
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
            .collect::<Vec<_>>();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "divergence");
        assert_eq!(lines[0]["kind"], "bearish");
        assert_eq!(lines[0]["cvd_change_pct"], -50.0);

        assert_eq!(lines[1]["type"], "bar");
        assert_eq!(lines[1]["bar_index"], 12);
        assert_eq!(lines[1]["bar_delta"], 31.0);
        assert_eq!(lines[1]["levels"][0]["is_poc"], true);
        // Infinite ratios have no JSON representation
        assert!(lines[1]["stacked_imbalances"][0]["ratio"].is_null());
    }

    #[test]
    fn test_ladder_sink_display_options() {
        struct TestCase {
            display: DisplayOptions,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: default options
                display: DisplayOptions::default(),
                expected: concat!(
                    "bar 12 | delta +31 | cvd +45 / +120 | poc 101.00\n",
                    "        101.00         0 x 50       POC BUY\n",
                    "        100.00        20 x 1\n",
                ),
            },
            TestCase {
                // TC1: volumes hidden, imbalance zone shown
                display: DisplayOptions {
                    show_volume_text: false,
                    show_imbalance_lines: true,
                },
                expected: concat!(
                    "bar 12 | delta +31 | cvd +45 / +120 | poc 101.00\n",
                    "        101.00 POC BUY\n",
                    "        100.00\n",
                    "    buy imbalance zone from 101.00\n",
                ),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let mut sink = LadderSink::new(Vec::new(), test.display);
            sink.on_bar(&snapshot()).unwrap();

            let actual = String::from_utf8(sink.into_inner()).unwrap();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_ladder_sink_price_precision() {
        let display = DisplayOptions {
            show_volume_text: false,
            show_imbalance_lines: true,
        };
        let mut sink = LadderSink::new(Vec::new(), display).with_precision(0);

        sink.on_bar(&snapshot()).unwrap();

        let actual = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            actual,
            concat!(
                "bar 12 | delta +31 | cvd +45 / +120 | poc 101\n",
                "           101 POC BUY\n",
                "           100\n",
                "    buy imbalance zone from 101\n",
            )
        );
    }

    #[test]
    fn test_ladder_sink_divergence_line() {
        let mut sink = LadderSink::new(Vec::new(), DisplayOptions::default());

        sink.on_divergence(&marker()).unwrap();

        let actual = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            actual,
            "v Bearish divergence at bar 6 from pivot bar 4: 15.00 -> 15.50 (cvd -50.0%)\n"
        );
    }
}
