//! Named series → chart-library payload (labels plus styled datasets).

use serde::{Deserialize, Serialize};

use crate::record::Field;
use crate::series::ChartReport;

/// Visual attributes of one dataset. Unset attributes fall back to the
/// renderer's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_color: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_dash: Option<[u32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<bool>,
}

const DASHED: Option<[u32; 2]> = Some([5, 5]);

const fn solid(color: &'static str) -> StyleSpec {
    StyleSpec {
        border_color: Some(color),
        background_color: Some(color),
        border_dash: None,
        fill: None,
    }
}

const fn dashed(color: &'static str) -> StyleSpec {
    StyleSpec {
        border_dash: DASHED,
        ..solid(color)
    }
}

pub fn style_for(field: Field) -> StyleSpec {
    match field {
        Field::EnvironmentRed => solid("#ff0000"),
        Field::EnvironmentGreen => solid("#00ff00"),
        Field::EnvironmentBlue => solid("#0000ff"),
        Field::AverageRed => dashed("#ff0000"),
        Field::AverageGreen => dashed("#00ff00"),
        Field::AverageBlue => dashed("#0000ff"),
        Field::Compatibility => StyleSpec {
            border_color: Some("rgba(255,255,0,1)"),
            background_color: Some("rgba(255,255,0,0.2)"),
            border_dash: None,
            fill: Some(true),
        },
        Field::Volume => solid("#000000"),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NanMode {
    /// `NaN` stays `NaN` (serialized as `null`).
    #[default]
    Keep,
    /// `NaN` becomes 0 so every point is renderable.
    Zero,
}

impl NanMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" | "nan" => Some(NanMode::Keep),
            "zero" | "0" => Some(NanMode::Zero),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinPosition {
    First,
    #[default]
    Last,
}

impl PinPosition {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Some(PinPosition::First),
            "last" => Some(PinPosition::Last),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartOptions {
    pub nan_mode: NanMode,
    pub pinned: Field,
    pub pin_position: PinPosition,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            nan_mode: NanMode::Keep,
            pinned: Field::Compatibility,
            pin_position: PinPosition::Last,
        }
    }
}

impl ChartOptions {
    /// Dataset order: schema order with the pinned field moved to its end.
    pub fn field_order(&self) -> Vec<Field> {
        let rest = Field::ALL.iter().copied().filter(|f| *f != self.pinned);
        match self.pin_position {
            PinPosition::First => std::iter::once(self.pinned).chain(rest).collect(),
            PinPosition::Last => rest.chain(std::iter::once(self.pinned)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub label: &'static str,
    pub data: Vec<f64>,
    #[serde(flatten)]
    pub style: StyleSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPayload {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

impl ChartPayload {
    pub fn dataset(&self, field: Field) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.label == field.label())
    }
}

pub fn to_chart_payload(report: &ChartReport, options: &ChartOptions) -> ChartPayload {
    let labels = (0..report.get(Field::Compatibility).len())
        .map(|i| i.to_string())
        .collect();

    let datasets = options
        .field_order()
        .into_iter()
        .map(|field| Dataset {
            label: field.label(),
            data: report
                .get(field)
                .iter()
                .map(|v| match options.nan_mode {
                    NanMode::Zero if v.is_nan() => 0.0,
                    _ => *v,
                })
                .collect(),
            style: style_for(field),
        })
        .collect();

    ChartPayload { labels, datasets }
}
