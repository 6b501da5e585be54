use thiserror::Error;

/// Failures surfaced by the report pipeline.
///
/// Malformed cells never show up here: decoding degrades to `NaN` instead.
/// Degenerate windows and downsample targets are clamped, not reported.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReportError {
    #[error("report not in catalog: {name}")]
    Selection { name: String },
    #[error("report source unavailable ({locator}): {reason}")]
    SourceUnavailable { locator: String, reason: String },
    #[error("environment {index} out of range ({available} available)")]
    UnknownEnvironment { index: usize, available: usize },
    #[error("no report selected")]
    NoSelection,
    #[error("invalid locator: {0}")]
    InvalidLocator(String),
}

impl ReportError {
    pub fn unavailable(locator: impl ToString, reason: impl ToString) -> Self {
        ReportError::SourceUnavailable {
            locator: locator.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the caller can keep going with its previous state.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ReportError::SourceUnavailable { .. })
    }
}
