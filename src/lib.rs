//! Simulation report → chart pipeline.
//!
//! Reports are `;`/newline text, one column per environment. The pipeline:
//! parse → cache → window → downsample → decode → aggregate → chart payload.

pub mod cache;
pub mod chart;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod series;
pub mod service;
pub mod source;

pub use cache::{LoadedReport, PendingSelection, ReportCache, Selected};
pub use chart::{to_chart_payload, ChartOptions, ChartPayload, Dataset, NanMode, PinPosition, StyleSpec};
pub use config::{ConfigPatch, Settings, ViewConfig};
pub use error::ReportError;
pub use pipeline::{render, select_records, Rendered};
pub use record::{decode, Field, Record};
pub use report::{parse, RawReport, ReportSummary, RunParameters};
pub use series::{aggregate, downsample, window, ChartReport, Window};
pub use service::{ChartView, ReportService};
pub use source::{source_for, DirectorySource, Locator, ReportIdentity, ReportSource, SingleSource};
