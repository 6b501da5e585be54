//! `(ViewConfig, RawReport) → ChartPayload`, with no state of its own.

use serde::Serialize;

use crate::chart::{to_chart_payload, ChartOptions, ChartPayload};
use crate::config::ViewConfig;
use crate::error::ReportError;
use crate::logging::{self, obj, v_num, Domain, ProfileScope};
use crate::record::{decode, Record};
use crate::report::RawReport;
use crate::series::{aggregate, downsample, window};

/// Windowed, downsampled and decoded records of the configured environment.
pub fn select_records(raw: &RawReport, config: &ViewConfig) -> Result<Vec<Record>, ReportError> {
    let column = raw
        .environment(config.env)
        .ok_or(ReportError::UnknownEnvironment {
            index: config.env,
            available: raw.environment_count(),
        })?;
    let cells = window(column, config.window());
    Ok(downsample(cells, config.round)
        .iter()
        .map(|cell| decode(cell))
        .collect())
}

/// Everything a consumer needs to draw one environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rendered {
    pub payload: ChartPayload,
    /// Records in the selected environment before windowing.
    pub record_count: usize,
    pub environment_count: usize,
}

pub fn render(
    raw: &RawReport,
    config: &ViewConfig,
    options: &ChartOptions,
) -> Result<Rendered, ReportError> {
    let _scope = ProfileScope::new("render");
    let records = select_records(raw, config)?;
    let degraded = records.iter().filter(|r| !r.nan_fields().is_empty()).count();
    if degraded > 0 {
        logging::warn(
            Domain::Pipeline,
            "records_degraded",
            obj(&[
                ("env", v_num(config.env as f64)),
                ("count", v_num(degraded as f64)),
            ]),
        );
    }

    let payload = to_chart_payload(&aggregate(&records), options);
    logging::debug(
        Domain::Chart,
        "rendered",
        obj(&[
            ("env", v_num(config.env as f64)),
            ("points", v_num(payload.labels.len() as f64)),
            ("round", v_num(config.round as f64)),
        ]),
    );

    Ok(Rendered {
        payload,
        record_count: raw.environment(config.env).map_or(0, |c| c.len()),
        environment_count: raw.environment_count(),
    })
}
