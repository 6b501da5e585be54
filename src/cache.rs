//! Parsed reports keyed by name, loaded at most once each.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, OnceCell};

use crate::error::ReportError;
use crate::logging::{self, obj, v_num, v_str, Domain, ProfileScope};
use crate::report::{self, RawReport, ReportSummary};
use crate::source::{ReportIdentity, ReportSource};

/// A report as held by the cache. Never mutated after the load that made it.
#[derive(Debug)]
pub struct LoadedReport {
    pub identity: ReportIdentity,
    pub raw: RawReport,
    pub summary: ReportSummary,
}

/// Outcome of [`ReportCache::select`].
#[derive(Debug, Clone)]
pub enum Selected {
    Committed(Arc<LoadedReport>),
    /// A later `select` was issued while this one was loading; nothing changed.
    Superseded,
}

/// A loaded report waiting to become the selection, tagged with the request
/// token it was prepared under.
#[derive(Debug, Clone)]
pub struct PendingSelection {
    token: u64,
    pub report: Arc<LoadedReport>,
}

type Slot = Arc<OnceCell<Arc<LoadedReport>>>;

pub struct ReportCache {
    source: Arc<dyn ReportSource>,
    catalog: Vec<ReportIdentity>,
    parameter_columns: usize,
    slots: Mutex<HashMap<String, Slot>>,
    fetches: AtomicU64,
    select_seq: AtomicU64,
    in_flight: Arc<AtomicUsize>,
    loading: Arc<watch::Sender<bool>>,
    selected: watch::Sender<Option<Arc<LoadedReport>>>,
}

impl ReportCache {
    /// List the source once and keep the catalog for the cache's lifetime.
    pub async fn open(
        source: Arc<dyn ReportSource>,
        parameter_columns: usize,
    ) -> Result<Self, ReportError> {
        let catalog = source.list().await?;
        let (loading, _) = watch::channel(false);
        let (selected, _) = watch::channel(None);
        Ok(Self {
            source,
            catalog,
            parameter_columns,
            slots: Mutex::new(HashMap::new()),
            fetches: AtomicU64::new(0),
            select_seq: AtomicU64::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            loading: Arc::new(loading),
            selected,
        })
    }

    pub fn list(&self) -> &[ReportIdentity] {
        &self.catalog
    }

    pub fn identity(&self, name: &str) -> Option<&ReportIdentity> {
        self.catalog.iter().find(|r| r.name == name)
    }

    /// Number of raw text fetches performed so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub fn selected(&self) -> Option<Arc<LoadedReport>> {
        self.selected.borrow().clone()
    }

    pub fn subscribe_selected(&self) -> watch::Receiver<Option<Arc<LoadedReport>>> {
        self.selected.subscribe()
    }

    /// Already-parsed report, without triggering a load.
    pub fn cached(&self, name: &str) -> Option<Arc<LoadedReport>> {
        let slots = self.slots.lock().ok()?;
        slots.get(name).and_then(|slot| slot.get().cloned())
    }

    /// Fetch and parse `name` on first use; later calls share that result.
    /// Overlapping calls for the same name wait on the one fetch. A failed
    /// fetch is reported and not retried here; the next call tries again.
    pub async fn load(&self, name: &str) -> Result<Arc<LoadedReport>, ReportError> {
        let identity = self.identity(name).ok_or_else(|| ReportError::Selection {
            name: name.to_string(),
        })?;
        let slot = self.slot(name)?;
        if let Some(report) = slot.get() {
            return Ok(report.clone());
        }

        let _guard = LoadingGuard::enter(self.in_flight.clone(), self.loading.clone());
        slot.get_or_try_init(|| self.fetch_and_parse(identity))
            .await
            .cloned()
    }

    /// Load `name` and make it the selected report.
    ///
    /// Unknown names fail with [`ReportError::Selection`] and leave the
    /// selection untouched, as does a failed load. If another `select` was
    /// issued while this one loaded, only the later one commits.
    pub async fn select(&self, name: &str) -> Result<Selected, ReportError> {
        let pending = self.prepare(name).await?;
        Ok(self.commit(pending))
    }

    /// First half of [`select`](Self::select): take a request token and load
    /// `name`, without touching the selection.
    pub async fn prepare(&self, name: &str) -> Result<PendingSelection, ReportError> {
        if self.identity(name).is_none() {
            logging::warn(
                Domain::Cache,
                "selection_rejected",
                obj(&[("report", v_str(name)), ("msg", v_str("not in catalog"))]),
            );
            return Err(ReportError::Selection {
                name: name.to_string(),
            });
        }

        let token = self.select_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let report = self.load(name).await?;
        Ok(PendingSelection { token, report })
    }

    /// Whether no `prepare` was issued after this one.
    pub fn is_current(&self, pending: &PendingSelection) -> bool {
        self.select_seq.load(Ordering::SeqCst) == pending.token
    }

    /// Second half of [`select`](Self::select): make the prepared report the
    /// selection if its token is still the newest. The check and the write
    /// happen under the channel's lock, so a stale commit can never land
    /// after a newer one.
    pub fn commit(&self, pending: PendingSelection) -> Selected {
        let PendingSelection { token, report } = pending;
        let committed = self.selected.send_if_modified(|current| {
            if self.select_seq.load(Ordering::SeqCst) != token {
                return false;
            }
            *current = Some(report.clone());
            true
        });

        if !committed {
            logging::debug(
                Domain::Cache,
                "selection_superseded",
                obj(&[
                    ("report", v_str(&report.identity.name)),
                    ("token", v_num(token as f64)),
                ]),
            );
            return Selected::Superseded;
        }
        logging::info(
            Domain::Cache,
            "selected",
            obj(&[("report", v_str(&report.identity.name)), ("token", v_num(token as f64))]),
        );
        Selected::Committed(report)
    }

    fn slot(&self, name: &str) -> Result<Slot, ReportError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| ReportError::unavailable(name, "report cache lock poisoned"))?;
        Ok(slots.entry(name.to_string()).or_default().clone())
    }

    async fn fetch_and_parse(
        &self,
        identity: &ReportIdentity,
    ) -> Result<Arc<LoadedReport>, ReportError> {
        let scope = ProfileScope::with_context("load", &[("report", v_str(&identity.name))]);
        self.fetches.fetch_add(1, Ordering::SeqCst);
        logging::debug(
            Domain::Source,
            "load_started",
            obj(&[
                ("report", v_str(&identity.name)),
                ("locator", v_str(&identity.locator.to_string())),
            ]),
        );

        let text = match self.source.fetch(identity).await {
            Ok(text) => text,
            Err(err) => {
                logging::warn(
                    Domain::Source,
                    "load_failed",
                    obj(&[
                        ("report", v_str(&identity.name)),
                        ("msg", v_str(&err.to_string())),
                    ]),
                );
                return Err(err);
            }
        };

        let mut raw = report::parse(&text);
        raw.split_parameters(self.parameter_columns);
        let summary = ReportSummary::new(&identity.name, &text, &raw);

        logging::info(
            Domain::Cache,
            "loaded",
            obj(&[
                ("report", v_str(&identity.name)),
                ("sha256", v_str(&summary.sha256)),
                ("environments", v_num(summary.environments as f64)),
                ("lines", v_num(summary.lines as f64)),
                ("elapsed_ms", v_num(scope.elapsed_ms())),
            ]),
        );

        Ok(Arc::new(LoadedReport {
            identity: identity.clone(),
            raw,
            summary,
        }))
    }
}

/// Keeps the loading flag raised while any load is running; lowers it on drop
/// so a failed or abandoned load can't leave it stuck.
struct LoadingGuard {
    in_flight: Arc<AtomicUsize>,
    flag: Arc<watch::Sender<bool>>,
}

impl LoadingGuard {
    fn enter(in_flight: Arc<AtomicUsize>, flag: Arc<watch::Sender<bool>>) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        flag.send_replace(true);
        Self { in_flight, flag }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.flag.send_replace(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::source::Locator;
    use std::path::PathBuf;
    use tokio::sync::Notify;

    struct MemorySource {
        reports: Vec<(&'static str, Option<&'static str>)>,
    }

    #[async_trait]
    impl ReportSource for MemorySource {
        async fn list(&self) -> Result<Vec<ReportIdentity>, ReportError> {
            Ok(self
                .reports
                .iter()
                .map(|(name, _)| ReportIdentity {
                    name: name.to_string(),
                    locator: Locator::Path(PathBuf::from(name)),
                })
                .collect())
        }

        async fn fetch(&self, identity: &ReportIdentity) -> Result<String, ReportError> {
            self.reports
                .iter()
                .find(|(name, _)| *name == identity.name)
                .and_then(|(_, text)| text.map(str::to_string))
                .ok_or_else(|| ReportError::unavailable(&identity.locator, "gone"))
        }
    }

    async fn cache() -> ReportCache {
        let source = MemorySource {
            reports: vec![("a", Some("1;2\n3;4\n")), ("b", Some("5\n")), ("broken", None)],
        };
        ReportCache::open(Arc::new(source), 0).await.unwrap()
    }

    #[tokio::test]
    async fn test_load_is_memoized() {
        let cache = cache().await;
        let first = cache.load("a").await.unwrap();
        let second = cache.load("a").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.fetch_count(), 1);
        assert_eq!(first.raw.lengths(), vec![2, 2]);
    }

    #[tokio::test]
    async fn test_overlapping_loads_fetch_once() {
        let cache = cache().await;
        let (x, y) = tokio::join!(cache.load("a"), cache.load("a"));
        assert!(Arc::ptr_eq(&x.unwrap(), &y.unwrap()));
        assert_eq!(cache.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_selection_keeps_previous() {
        let cache = cache().await;
        cache.select("a").await.unwrap();
        let err = cache.select("zzz").await.unwrap_err();
        assert_eq!(err, ReportError::Selection { name: "zzz".into() });
        assert_eq!(cache.selected().unwrap().identity.name, "a");
    }

    #[tokio::test]
    async fn test_failed_load_clears_loading_and_keeps_selection() {
        let cache = cache().await;
        cache.select("b").await.unwrap();
        let err = cache.select("broken").await.unwrap_err();
        assert!(matches!(err, ReportError::SourceUnavailable { .. }));
        assert!(!cache.is_loading());
        assert_eq!(cache.selected().unwrap().identity.name, "b");
        assert!(cache.cached("broken").is_none());
    }

    #[tokio::test]
    async fn test_loading_flag_toggles_around_load() {
        let cache = cache().await;
        let mut rx = cache.subscribe_loading();
        assert!(!*rx.borrow_and_update());
        cache.load("a").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(!cache.is_loading());
    }

    #[tokio::test]
    async fn test_stale_commit_is_superseded() {
        let cache = cache().await;
        let older = cache.prepare("a").await.unwrap();
        let newer = cache.prepare("b").await.unwrap();
        assert!(!cache.is_current(&older));
        assert!(cache.is_current(&newer));

        assert!(matches!(cache.commit(newer), Selected::Committed(_)));
        assert!(matches!(cache.commit(older), Selected::Superseded));
        assert_eq!(cache.selected().unwrap().identity.name, "b");
    }

    #[tokio::test]
    async fn test_prepare_leaves_selection_alone() {
        let cache = cache().await;
        cache.select("a").await.unwrap();
        let pending = cache.prepare("b").await.unwrap();
        assert_eq!(pending.report.identity.name, "b");
        assert_eq!(cache.selected().unwrap().identity.name, "a");
    }

    /// Fetches of "slow" block until the gate opens.
    struct GatedSource {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl ReportSource for GatedSource {
        async fn list(&self) -> Result<Vec<ReportIdentity>, ReportError> {
            Ok(["fast", "slow"]
                .iter()
                .map(|name| ReportIdentity {
                    name: name.to_string(),
                    locator: Locator::Path(PathBuf::from(name)),
                })
                .collect())
        }

        async fn fetch(&self, identity: &ReportIdentity) -> Result<String, ReportError> {
            if identity.name == "slow" {
                self.gate.notified().await;
            }
            Ok("1.0.0.50.1.0.0\n".to_string())
        }
    }

    #[tokio::test]
    async fn test_later_select_wins_over_slow_load() {
        let gate = Arc::new(Notify::new());
        let source = GatedSource { gate: gate.clone() };
        let cache = Arc::new(ReportCache::open(Arc::new(source), 0).await.unwrap());

        let slow = tokio::spawn({
            let cache = cache.clone();
            async move { cache.select("slow").await }
        });
        while !cache.is_loading() {
            tokio::task::yield_now().await;
        }

        let fast = cache.select("fast").await.unwrap();
        assert!(matches!(fast, Selected::Committed(_)));

        gate.notify_one();
        let slow = slow.await.unwrap().unwrap();
        assert!(matches!(slow, Selected::Superseded));
        assert_eq!(cache.selected().unwrap().identity.name, "fast");
        assert!(cache.cached("slow").is_some());
        assert!(!cache.is_loading());
    }

    #[test]
    fn test_guard_lowers_flag_after_last_exit() {
        let (tx, _) = watch::channel(false);
        let flag = Arc::new(tx);
        let counter = Arc::new(AtomicUsize::new(0));
        let a = LoadingGuard::enter(counter.clone(), flag.clone());
        let b = LoadingGuard::enter(counter.clone(), flag.clone());
        drop(a);
        assert!(*flag.borrow());
        drop(b);
        assert!(!*flag.borrow());
    }
}
