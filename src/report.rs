//! Raw report text → column-major cells.
//!
//! A report is plain text: one line per time step, one `;`-separated cell per
//! environment. The final line is always a terminator artifact and is dropped.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::logging::{self, obj, v_num, Domain, ProfileScope};
use crate::record::parse_field;

pub type RawColumn = Vec<String>;

/// Parsed report, one column per environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReport {
    pub columns: Vec<RawColumn>,
    /// Lines that had fewer cells than the widest line seen before them.
    /// Columns past the short line's width did not receive a cell for it.
    pub short_lines: Vec<usize>,
    pub line_count: usize,
    pub parameters: Option<RunParameters>,
}

/// Simulation settings carried in trailing columns of some reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunParameters {
    pub compatibility_power: Option<f64>,
    pub mutation_chance: Option<f64>,
    pub vegetations_per_environment: Option<f64>,
    pub mutation_mode: Option<bool>,
}

/// Transpose report text into columns.
///
/// Lines are split on `\n` and cells on `;`; cell `j` of every line is
/// appended to column `j`. The last line is discarded, as are blank lines
/// left at the end after that. Interior lines are data, blank or not.
pub fn parse(text: &str) -> RawReport {
    let _scope = ProfileScope::with_context("parse", &[("bytes", v_num(text.len() as f64))]);

    let mut lines: Vec<&str> = text.split('\n').collect();
    lines.pop();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }

    let mut columns: Vec<RawColumn> = Vec::new();
    let mut short_lines = Vec::new();
    for (step, line) in lines.iter().enumerate() {
        let cells: Vec<&str> = line.split(';').collect();
        if cells.len() < columns.len() {
            short_lines.push(step);
        }
        for (env, cell) in cells.into_iter().enumerate() {
            if env == columns.len() {
                columns.push(Vec::new());
            }
            columns[env].push(cell.to_string());
        }
    }

    if !short_lines.is_empty() {
        logging::warn(
            Domain::Parse,
            "ragged_lines",
            obj(&[
                ("count", v_num(short_lines.len() as f64)),
                ("first", v_num(short_lines[0] as f64)),
            ]),
        );
    }

    RawReport {
        columns,
        short_lines,
        line_count: lines.len(),
        parameters: None,
    }
}

impl RawReport {
    pub fn environment_count(&self) -> usize {
        self.columns.len()
    }

    pub fn environment(&self, index: usize) -> Option<&[String]> {
        self.columns.get(index).map(|c| c.as_slice())
    }

    pub fn lengths(&self) -> Vec<usize> {
        self.columns.iter().map(|c| c.len()).collect()
    }

    /// Move the last `count` columns out as run parameters.
    ///
    /// Each parameter is read from the first cell of its column, in the order
    /// compatibility power, mutation chance, vegetations per environment,
    /// mutation mode.
    pub fn split_parameters(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let keep = self.columns.len().saturating_sub(count);
        let trailer = self.columns.split_off(keep);
        let first = |i: usize| trailer.get(i).and_then(|c| c.first()).map(|s| s.as_str());
        let number = |i: usize| {
            first(i)
                .map(|s| parse_field(&s.replacen(',', ".", 1)))
                .filter(|v| !v.is_nan())
        };
        self.parameters = Some(RunParameters {
            compatibility_power: number(0),
            mutation_chance: number(1),
            vegetations_per_environment: number(2),
            mutation_mode: first(3).map(|s| matches!(s.trim(), "true" | "True" | "1")),
        });
    }

    /// Row-major text again, one line per time step, without the terminator.
    /// Exact inverse of [`parse`] for reports without short lines.
    pub fn to_lines(&self) -> Vec<String> {
        let rows = self.columns.iter().map(|c| c.len()).max().unwrap_or(0);
        (0..rows)
            .map(|step| {
                self.columns
                    .iter()
                    .filter_map(|c| c.get(step).map(|s| s.as_str()))
                    .collect::<Vec<_>>()
                    .join(";")
            })
            .collect()
    }
}

/// Content digest and shape of one loaded report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub name: String,
    pub sha256: String,
    pub bytes: usize,
    pub lines: usize,
    pub environments: usize,
    pub lengths: Vec<usize>,
    pub short_lines: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<RunParameters>,
}

impl ReportSummary {
    pub fn new(name: &str, text: &str, report: &RawReport) -> Self {
        Self {
            name: name.to_string(),
            sha256: text_sha256(text),
            bytes: text.len(),
            lines: report.line_count,
            environments: report.environment_count(),
            lengths: report.lengths(),
            short_lines: report.short_lines.len(),
            parameters: report.parameters.clone(),
        }
    }
}

pub fn text_sha256(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
