//! Where report text comes from: a directory catalog or one fixed locator.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::Settings;
use crate::error::ReportError;
use crate::logging::{self, obj, v_num, v_str, Domain};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locator {
    Path(PathBuf),
    Url(Url),
}

impl Locator {
    /// `http://` and `https://` strings are URLs, anything else is a path.
    pub fn parse(s: &str) -> Result<Self, ReportError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ReportError::InvalidLocator(s.to_string()));
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Url::parse(trimmed)
                .map(Locator::Url)
                .map_err(|e| ReportError::InvalidLocator(format!("{}: {}", trimmed, e)));
        }
        Ok(Locator::Path(PathBuf::from(trimmed)))
    }

    /// Last path segment, used as the display name.
    pub fn file_name(&self) -> String {
        let name = match self {
            Locator::Path(p) => p.file_name().and_then(|s| s.to_str()).map(str::to_string),
            Locator::Url(u) => u
                .path_segments()
                .and_then(|mut segs| segs.next_back())
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        };
        name.unwrap_or_else(|| self.to_string())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Path(p) => write!(f, "{}", p.display()),
            Locator::Url(u) => write!(f, "{}", u),
        }
    }
}

/// A named report and where to fetch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportIdentity {
    pub name: String,
    pub locator: Locator,
}

#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn list(&self) -> Result<Vec<ReportIdentity>, ReportError>;
    async fn fetch(&self, identity: &ReportIdentity) -> Result<String, ReportError>;
}

/// Read the text behind any locator. Files go through `tokio::fs`, URLs
/// through a plain GET; non-2xx responses count as unavailable.
pub async fn read_locator(client: &Client, locator: &Locator) -> Result<String, ReportError> {
    match locator {
        Locator::Path(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ReportError::unavailable(locator, e)),
        Locator::Url(url) => {
            let resp = client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| ReportError::unavailable(locator, e))?;
            let resp = resp
                .error_for_status()
                .map_err(|e| ReportError::unavailable(locator, e))?;
            resp.text().await.map_err(|e| ReportError::unavailable(locator, e))
        }
    }
}

/// `REPORT_URL` when set, the reports directory otherwise.
pub fn source_for(settings: &Settings) -> Result<Arc<dyn ReportSource>, ReportError> {
    match &settings.report_url {
        Some(url) => Ok(Arc::new(SingleSource::new(Locator::parse(url)?))),
        None => Ok(Arc::new(DirectorySource::new(settings.reports_dir.clone()))),
    }
}

/// Every regular file of one directory is a report, named by file name.
pub struct DirectorySource {
    root: PathBuf,
    client: Client,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            client: Client::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ReportSource for DirectorySource {
    async fn list(&self) -> Result<Vec<ReportIdentity>, ReportError> {
        let unavailable = |e: std::io::Error| ReportError::unavailable(self.root.display(), e);
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(unavailable)?;
        let mut reports = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            reports.push(ReportIdentity {
                name,
                locator: Locator::Path(entry.path()),
            });
        }
        reports.sort_by(|a, b| a.name.cmp(&b.name));

        logging::info(
            Domain::Source,
            "catalog_listed",
            obj(&[
                ("root", v_str(&self.root.display().to_string())),
                ("count", v_num(reports.len() as f64)),
            ]),
        );
        Ok(reports)
    }

    async fn fetch(&self, identity: &ReportIdentity) -> Result<String, ReportError> {
        read_locator(&self.client, &identity.locator).await
    }
}

/// One report at a fixed file path or URL, no catalog to browse.
pub struct SingleSource {
    identity: ReportIdentity,
    client: Client,
}

impl SingleSource {
    pub fn new(locator: Locator) -> Self {
        Self {
            identity: ReportIdentity {
                name: locator.file_name(),
                locator,
            },
            client: Client::new(),
        }
    }

    pub fn identity(&self) -> &ReportIdentity {
        &self.identity
    }
}

#[async_trait]
impl ReportSource for SingleSource {
    async fn list(&self) -> Result<Vec<ReportIdentity>, ReportError> {
        Ok(vec![self.identity.clone()])
    }

    async fn fetch(&self, identity: &ReportIdentity) -> Result<String, ReportError> {
        read_locator(&self.client, &identity.locator).await
    }
}
