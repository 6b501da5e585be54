use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::chart::{ChartOptions, NanMode, PinPosition};
use crate::record::Field;
use crate::series::Window;

/// What to render from the selected report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewConfig {
    pub env: usize,
    pub start: i64,
    /// `None` runs to the end of the environment.
    pub end: Option<i64>,
    /// Target point count for downsampling.
    pub round: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            env: 0,
            start: 0,
            end: None,
            round: 200,
        }
    }
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub env: Option<usize>,
    pub start: Option<i64>,
    /// `Some(None)` clears the end bound back to +infinity.
    #[serde(default, deserialize_with = "double_option")]
    pub end: Option<Option<i64>>,
    pub round: Option<usize>,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<i64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer).map(Some)
}

impl ViewConfig {
    pub fn window(&self) -> Window {
        Window::new(self.start, self.end)
    }

    pub fn merge(&self, patch: &ConfigPatch) -> Self {
        Self {
            env: patch.env.unwrap_or(self.env),
            start: patch.start.unwrap_or(self.start),
            end: patch.end.unwrap_or(self.end),
            round: patch.round.unwrap_or(self.round),
        }
    }
}

/// Process-level settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub reports_dir: PathBuf,
    pub report_url: Option<String>,
    /// Report selected at startup; the first catalog entry when unset.
    pub initial_report: Option<String>,
    pub view: ViewConfig,
    pub chart: ChartOptions,
    pub parameter_columns: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from("src/assets/reports"),
            report_url: None,
            initial_report: None,
            view: ViewConfig::default(),
            chart: ChartOptions::default(),
            parameter_columns: 0,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        Self {
            reports_dir: std::env::var("REPORTS_DIR").map(PathBuf::from).unwrap_or(defaults.reports_dir),
            report_url: std::env::var("REPORT_URL").ok().filter(|v| !v.trim().is_empty()),
            initial_report: std::env::var("INITIAL_REPORT").ok().filter(|v| !v.trim().is_empty()),
            view: ViewConfig {
                env: std::env::var("DEFAULT_ENV").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.view.env),
                start: std::env::var("DEFAULT_START").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.view.start),
                end: std::env::var("DEFAULT_END").ok().and_then(|v| v.parse().ok()),
                round: std::env::var("DEFAULT_ROUND").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.view.round),
            },
            chart: ChartOptions {
                nan_mode: std::env::var("NAN_MODE").ok().and_then(|v| NanMode::parse(&v)).unwrap_or_default(),
                pinned: Field::Compatibility,
                pin_position: std::env::var("PINNED_POSITION").ok().and_then(|v| PinPosition::parse(&v)).unwrap_or_default(),
            },
            parameter_columns: std::env::var("PARAMETER_COLUMNS").ok().and_then(|v| v.parse().ok()).unwrap_or(0),
        }
    }
}
