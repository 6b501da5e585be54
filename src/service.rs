//! Consumer-facing state holder: catalog, selection, view config and the
//! latest rendered chart.
//!
//! Rendering is a pure call into [`crate::pipeline`]; this type only decides
//! when to call it and which result gets published. Subscribers see the most
//! recent [`ChartView`] only, never a history.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::watch;

use crate::cache::{LoadedReport, ReportCache, Selected};
use crate::chart::{ChartOptions, ChartPayload};
use crate::config::{ConfigPatch, Settings, ViewConfig};
use crate::error::ReportError;
use crate::logging::{self, obj, v_num, v_str, Domain};
use crate::pipeline::{self, Rendered};
use crate::source::{DirectorySource, Locator, ReportIdentity, ReportSource, SingleSource};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartView {
    pub report: String,
    pub config: ViewConfig,
    pub payload: ChartPayload,
    pub record_count: usize,
    pub environment_count: usize,
    /// Increases with every publish.
    pub revision: u64,
}

pub struct ReportService {
    cache: ReportCache,
    options: ChartOptions,
    config: Mutex<ViewConfig>,
    revision: AtomicU64,
    view: watch::Sender<Option<Arc<ChartView>>>,
    last_error: Mutex<Option<ReportError>>,
}

impl ReportService {
    /// Build from settings: `REPORT_URL` picks the single-report mode,
    /// otherwise the reports directory is the catalog.
    pub async fn from_settings(settings: &Settings) -> Result<Self, ReportError> {
        match &settings.report_url {
            Some(url) => Self::open_single(Locator::parse(url)?, settings).await,
            None => {
                let source = DirectorySource::new(settings.reports_dir.clone());
                Self::open(Arc::new(source), settings).await
            }
        }
    }

    /// List the catalog and select `settings.initial_report`, or the first
    /// entry. A failed initial selection is kept as
    /// [`last_error`](Self::last_error) rather than returned.
    pub async fn open(source: Arc<dyn ReportSource>, settings: &Settings) -> Result<Self, ReportError> {
        let service = Self::with_cache(ReportCache::open(source, settings.parameter_columns).await?, settings);
        let initial = settings
            .initial_report
            .clone()
            .or_else(|| service.cache.list().first().map(|r| r.name.clone()));
        match initial {
            Some(name) => {
                if let Err(err) = service.select(&name).await {
                    logging::warn(
                        Domain::System,
                        "initial_selection_failed",
                        obj(&[("report", v_str(&name)), ("msg", v_str(&err.to_string()))]),
                    );
                }
            }
            None => logging::warn(Domain::System, "empty_catalog", obj(&[])),
        }
        Ok(service)
    }

    /// One report from a fixed locator, loaded eagerly. Load failures are
    /// returned since there is nothing else to show.
    pub async fn open_single(locator: Locator, settings: &Settings) -> Result<Self, ReportError> {
        let source = SingleSource::new(locator);
        let name = source.identity().name.clone();
        let cache = ReportCache::open(Arc::new(source), settings.parameter_columns).await?;
        let service = Self::with_cache(cache, settings);
        service.select(&name).await?;
        Ok(service)
    }

    fn with_cache(cache: ReportCache, settings: &Settings) -> Self {
        let (view, _) = watch::channel(None);
        Self {
            cache,
            options: settings.chart,
            config: Mutex::new(settings.view),
            revision: AtomicU64::new(0),
            view,
            last_error: Mutex::new(None),
        }
    }

    pub fn reports(&self) -> &[ReportIdentity] {
        self.cache.list()
    }

    pub fn cache(&self) -> &ReportCache {
        &self.cache
    }

    pub fn selected(&self) -> Option<Arc<LoadedReport>> {
        self.cache.selected()
    }

    pub fn config(&self) -> ViewConfig {
        self.config.lock().map(|c| *c).unwrap_or_default()
    }

    pub fn options(&self) -> &ChartOptions {
        &self.options
    }

    pub fn is_loading(&self) -> bool {
        self.cache.is_loading()
    }

    pub fn latest(&self) -> Option<Arc<ChartView>> {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ChartView>>> {
        self.view.subscribe()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.cache.subscribe_loading()
    }

    /// Most recent selection or render failure, cleared by the next success.
    pub fn last_error(&self) -> Option<ReportError> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Switch to another report and render it with the current config.
    ///
    /// The report only becomes the selection if it renders, so unknown names,
    /// failed loads and failed renders all leave the selection and the
    /// published view as they were. A selection overtaken by a later one
    /// publishes nothing.
    pub async fn select(&self, name: &str) -> Result<Option<Arc<ChartView>>, ReportError> {
        let pending = self
            .cache
            .prepare(name)
            .await
            .map_err(|err| self.record_error(err))?;

        // Commit and publish under the config lock so concurrent selections
        // and config changes publish in the order they commit.
        let config = self.lock_config()?;
        if !self.cache.is_current(&pending) {
            return Ok(None);
        }
        let rendered = self.render(&pending.report, &config)?;
        match self.cache.commit(pending) {
            Selected::Committed(report) => Ok(Some(self.publish(&report, &config, rendered))),
            Selected::Superseded => Ok(None),
        }
    }

    /// Merge `patch` into the view config and re-render the selected report.
    ///
    /// With a selection, the config only changes if the render succeeds.
    /// Without one there is nothing to check it against: it is kept for the
    /// next selection and [`ReportError::NoSelection`] is returned.
    pub fn set_config(&self, patch: &ConfigPatch) -> Result<Arc<ChartView>, ReportError> {
        let mut config = self.lock_config()?;
        let next = config.merge(patch);
        let Some(report) = self.cache.selected() else {
            *config = next;
            return Err(ReportError::NoSelection);
        };
        let rendered = self.render(&report, &next)?;
        *config = next;
        Ok(self.publish(&report, &next, rendered))
    }

    fn lock_config(&self) -> Result<MutexGuard<'_, ViewConfig>, ReportError> {
        self.config
            .lock()
            .map_err(|_| ReportError::unavailable("view config", "lock poisoned"))
    }

    fn render(&self, report: &LoadedReport, config: &ViewConfig) -> Result<Rendered, ReportError> {
        pipeline::render(&report.raw, config, &self.options).map_err(|err| self.record_error(err))
    }

    /// Callers hold the config lock, which orders publishes.
    fn publish(&self, report: &LoadedReport, config: &ViewConfig, rendered: Rendered) -> Arc<ChartView> {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let view = Arc::new(ChartView {
            report: report.identity.name.clone(),
            config: *config,
            payload: rendered.payload,
            record_count: rendered.record_count,
            environment_count: rendered.environment_count,
            revision,
        });
        self.view.send_replace(Some(view.clone()));
        if let Ok(mut last) = self.last_error.lock() {
            *last = None;
        }

        logging::info(
            Domain::Pipeline,
            "published",
            obj(&[
                ("report", v_str(&view.report)),
                ("env", v_num(config.env as f64)),
                ("points", v_num(view.payload.labels.len() as f64)),
                ("revision", v_num(revision as f64)),
            ]),
        );
        view
    }

    fn record_error(&self, err: ReportError) -> ReportError {
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(err.clone());
        }
        err
    }
}
