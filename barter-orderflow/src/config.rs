use crate::{error::OrderflowError, level::Bucketing};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Rendering hints forwarded to sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayOptions {
    /// Print buy x sell volume for every level.
    pub show_volume_text: bool,
    /// Mark the buy/sell imbalance zone boundaries.
    pub show_imbalance_lines: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_volume_text: true,
            show_imbalance_lines: false,
        }
    }
}

/// Order flow engine configuration.
///
/// # Environment variable overrides
///
/// | Env Var                          | Config Field                   |
/// |----------------------------------|--------------------------------|
/// | `ORDERFLOW_TICK_SIZE`            | `tick_size`                    |
/// | `ORDERFLOW_TICKS_PER_LEVEL`      | `ticks_per_level`              |
/// | `ORDERFLOW_IMBALANCE_THRESHOLD`  | `imbalance_threshold`          |
/// | `ORDERFLOW_MAX_RETAINED_BARS`    | `max_retained_bars`            |
/// | `ORDERFLOW_SHOW_VOLUME_TEXT`     | `display.show_volume_text`     |
/// | `ORDERFLOW_SHOW_IMBALANCE_LINES` | `display.show_imbalance_lines` |
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Instrument minimum price increment.
    pub tick_size: f64,
    /// Number of ticks aggregated into one volume level.
    pub ticks_per_level: u32,
    /// Minimum ratio for a stacked imbalance.
    pub imbalance_threshold: f64,
    /// Number of preceding bars in the short CVD window.
    pub short_window: usize,
    /// Number of preceding bars in the long CVD window.
    pub long_window: usize,
    /// Bars of history required before divergence evaluation runs.
    pub min_divergence_history: u64,
    /// Bars retained in memory, `None` retains the whole session.
    pub max_retained_bars: Option<usize>,
    pub display: DisplayOptions,
}

pub const MAX_TICKS_PER_LEVEL: u32 = 100;

/// Bars retained beyond the long CVD window so pivot lookback never reads an evicted bar.
const RETENTION_MARGIN: usize = 4;

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            tick_size: 0.25,
            ticks_per_level: 5,
            imbalance_threshold: 2.5,
            short_window: 4,
            long_window: 14,
            min_divergence_history: 5,
            max_retained_bars: None,
            display: DisplayOptions::default(),
        }
    }
}

impl ProfileConfig {
    /// Default configuration with `ORDERFLOW_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Default configuration with overrides resolved through `lookup`.
    ///
    /// Unparsable values are ignored and the default is kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(tick_size) = parse_var(&lookup, "ORDERFLOW_TICK_SIZE") {
            config.tick_size = tick_size;
        }
        if let Some(ticks_per_level) = parse_var(&lookup, "ORDERFLOW_TICKS_PER_LEVEL") {
            config.ticks_per_level = ticks_per_level;
        }
        if let Some(threshold) = parse_var(&lookup, "ORDERFLOW_IMBALANCE_THRESHOLD") {
            config.imbalance_threshold = threshold;
        }
        if let Some(max_bars) = parse_var(&lookup, "ORDERFLOW_MAX_RETAINED_BARS") {
            config.max_retained_bars = Some(max_bars);
        }
        if let Some(show) = parse_bool_var(&lookup, "ORDERFLOW_SHOW_VOLUME_TEXT") {
            config.display.show_volume_text = show;
        }
        if let Some(show) = parse_bool_var(&lookup, "ORDERFLOW_SHOW_IMBALANCE_LINES") {
            config.display.show_imbalance_lines = show;
        }

        config
    }

    pub fn with_tick_size(mut self, tick_size: f64) -> Self {
        self.tick_size = tick_size;
        self
    }

    pub fn with_ticks_per_level(mut self, ticks_per_level: u32) -> Self {
        self.ticks_per_level = ticks_per_level;
        self
    }

    pub fn with_imbalance_threshold(mut self, threshold: f64) -> Self {
        self.imbalance_threshold = threshold;
        self
    }

    pub fn with_max_retained_bars(mut self, max_retained_bars: usize) -> Self {
        self.max_retained_bars = Some(max_retained_bars);
        self
    }

    pub fn with_display(mut self, display: DisplayOptions) -> Self {
        self.display = display;
        self
    }

    pub fn bucketing(&self) -> Bucketing {
        Bucketing::new(self.tick_size, self.ticks_per_level)
    }

    /// Smallest retention that still covers the long CVD window and pivot lookback.
    pub fn min_retained_bars(&self) -> usize {
        self.long_window.max(self.short_window) + RETENTION_MARGIN
    }

    pub fn validate(&self) -> Result<(), OrderflowError> {
        if !(self.tick_size.is_finite() && self.tick_size > 0.0) {
            return Err(OrderflowError::InvalidConfig(format!(
                "tick_size must be a positive number, got {}",
                self.tick_size
            )));
        }

        if !(1..=MAX_TICKS_PER_LEVEL).contains(&self.ticks_per_level) {
            return Err(OrderflowError::InvalidConfig(format!(
                "ticks_per_level must be within 1..={MAX_TICKS_PER_LEVEL}, got {}",
                self.ticks_per_level
            )));
        }

        if !(self.imbalance_threshold.is_finite() && self.imbalance_threshold > 0.0) {
            return Err(OrderflowError::InvalidConfig(format!(
                "imbalance_threshold must be a positive number, got {}",
                self.imbalance_threshold
            )));
        }

        if self.short_window == 0 || self.long_window < self.short_window {
            return Err(OrderflowError::InvalidConfig(format!(
                "CVD windows must satisfy 0 < short_window <= long_window, got {} and {}",
                self.short_window, self.long_window
            )));
        }

        // Pivot confirmation looks three bars back from the evaluated bar
        if self.min_divergence_history < 3 {
            return Err(OrderflowError::InvalidConfig(format!(
                "min_divergence_history must be >= 3, got {}",
                self.min_divergence_history
            )));
        }

        match self.max_retained_bars {
            Some(max_bars) if max_bars < self.min_retained_bars() => {
                return Err(OrderflowError::InvalidConfig(format!(
                    "max_retained_bars must be >= {}, got {max_bars}",
                    self.min_retained_bars()
                )));
            }
            _ => {}
        }

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable configuration override");
            None
        }
    }
}

fn parse_bool_var<F>(lookup: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(key, value = %raw, "ignoring unparsable configuration override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ProfileConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bucketing().size(), 1.25);
    }

    #[test]
    fn test_from_lookup_applies_overrides() {
        let config = ProfileConfig::from_lookup(lookup_from(&[
            ("ORDERFLOW_TICK_SIZE", "0.1"),
            ("ORDERFLOW_TICKS_PER_LEVEL", "2"),
            ("ORDERFLOW_IMBALANCE_THRESHOLD", "3.0"),
            ("ORDERFLOW_MAX_RETAINED_BARS", "500"),
            ("ORDERFLOW_SHOW_VOLUME_TEXT", "false"),
            ("ORDERFLOW_SHOW_IMBALANCE_LINES", "1"),
        ]));

        assert_eq!(config.tick_size, 0.1);
        assert_eq!(config.ticks_per_level, 2);
        assert_eq!(config.imbalance_threshold, 3.0);
        assert_eq!(config.max_retained_bars, Some(500));
        assert!(!config.display.show_volume_text);
        assert!(config.display.show_imbalance_lines);
    }

    #[test]
    fn test_from_lookup_ignores_unparsable_values() {
        let config = ProfileConfig::from_lookup(lookup_from(&[
            ("ORDERFLOW_TICKS_PER_LEVEL", "five"),
            ("ORDERFLOW_SHOW_VOLUME_TEXT", "maybe"),
        ]));

        assert_eq!(config, ProfileConfig::default());
    }

    #[test]
    fn test_de_partial_config() {
        let input = r#"{"ticks_per_level": 4, "display": {"show_imbalance_lines": true}}"#;

        let actual = serde_json::from_str::<ProfileConfig>(input).unwrap();

        assert_eq!(actual.ticks_per_level, 4);
        assert_eq!(actual.imbalance_threshold, 2.5);
        assert!(actual.display.show_volume_text);
        assert!(actual.display.show_imbalance_lines);
    }

    #[test]
    fn test_validate() {
        struct TestCase {
            input: ProfileConfig,
            expected_ok: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: zero tick size
                input: ProfileConfig::default().with_tick_size(0.0),
                expected_ok: false,
            },
            TestCase {
                // TC1: zero ticks per level
                input: ProfileConfig::default().with_ticks_per_level(0),
                expected_ok: false,
            },
            TestCase {
                // TC2: ticks per level above the maximum
                input: ProfileConfig::default().with_ticks_per_level(101),
                expected_ok: false,
            },
            TestCase {
                // TC3: non-positive threshold
                input: ProfileConfig::default().with_imbalance_threshold(-1.0),
                expected_ok: false,
            },
            TestCase {
                // TC4: retention too small to cover the long CVD window
                input: ProfileConfig::default().with_max_retained_bars(10),
                expected_ok: false,
            },
            TestCase {
                // TC5: retention exactly covering the long window plus margin
                input: ProfileConfig::default().with_max_retained_bars(18),
                expected_ok: true,
            },
            TestCase {
                // TC6: NaN tick size
                input: ProfileConfig::default().with_tick_size(f64::NAN),
                expected_ok: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.validate();
            assert_eq!(actual.is_ok(), test.expected_ok, "TC{} failed", index);
            if let Err(error) = actual {
                assert!(error.is_terminal(), "TC{} error should be terminal", index);
            }
        }
    }
}
