use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use envreport::{
    ConfigPatch, Field, Locator, ReportError, ReportIdentity, ReportService, ReportSource,
    Settings, ViewConfig,
};
use tempfile::TempDir;
use tokio::sync::Notify;

fn write_report(dir: &Path, name: &str, steps: &[(f64, f64)]) {
    let mut out = String::new();
    for (a, b) in steps {
        out.push_str(&format!("0.0.0.{}.0.0.0;0.0.0.{}.0.0.0\n", a, b));
    }
    out.push('\n');
    fs::write(dir.join(name), out).unwrap();
}

fn catalog() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_report(dir.path(), "a.txt", &[(10.0, 20.0), (11.0, 21.0), (12.0, 22.0)]);
    write_report(dir.path(), "b.txt", &[(30.0, 40.0), (31.0, 41.0)]);
    dir
}

fn settings_for(dir: &Path) -> Settings {
    Settings {
        reports_dir: dir.to_path_buf(),
        ..Settings::default()
    }
}

fn compat(service: &ReportService) -> Vec<f64> {
    let view = service.latest().expect("a view was published");
    view.payload.dataset(Field::Compatibility).unwrap().data.clone()
}

#[tokio::test]
async fn first_report_is_selected_on_open() {
    let dir = catalog();
    let service = ReportService::from_settings(&settings_for(dir.path())).await.unwrap();

    let names: Vec<&str> = service.reports().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);

    let view = service.latest().unwrap();
    assert_eq!(view.report, "a.txt");
    assert_eq!(view.record_count, 3);
    assert_eq!(view.environment_count, 2);
    assert_eq!(view.revision, 1);
    assert_eq!(compat(&service), vec![10.0, 11.0, 12.0]);
    assert!(!service.is_loading());
}

#[tokio::test]
async fn initial_report_setting_is_honored() {
    let dir = catalog();
    let settings = Settings {
        initial_report: Some("b.txt".to_string()),
        ..settings_for(dir.path())
    };
    let service = ReportService::from_settings(&settings).await.unwrap();
    assert_eq!(service.latest().unwrap().report, "b.txt");
    assert_eq!(service.cache().fetch_count(), 1);
}

#[tokio::test]
async fn unknown_report_keeps_previous_view() {
    let dir = catalog();
    let service = ReportService::from_settings(&settings_for(dir.path())).await.unwrap();
    let before = service.latest().unwrap();

    let err = service.select("nope.txt").await.unwrap_err();
    assert!(matches!(err, ReportError::Selection { .. }));

    let after = service.latest().unwrap();
    assert_eq!(after.report, "a.txt");
    assert_eq!(after.revision, before.revision);
    assert_eq!(service.selected().unwrap().identity.name, "a.txt");
}

#[tokio::test]
async fn failed_load_clears_loading_and_keeps_selection() {
    let dir = catalog();
    let service = ReportService::from_settings(&settings_for(dir.path())).await.unwrap();
    fs::remove_file(dir.path().join("b.txt")).unwrap();

    let err = service.select("b.txt").await.unwrap_err();
    assert!(matches!(err, ReportError::SourceUnavailable { .. }));
    assert!(!service.is_loading());
    assert!(!*service.subscribe_loading().borrow());
    assert_eq!(service.last_error(), Some(err));
    assert_eq!(service.latest().unwrap().report, "a.txt");

    // a later success clears the error
    service.select("a.txt").await.unwrap();
    assert_eq!(service.last_error(), None);
}

#[tokio::test]
async fn reports_load_once() {
    let dir = catalog();
    let service = ReportService::from_settings(&settings_for(dir.path())).await.unwrap();
    service.select("b.txt").await.unwrap();
    service.select("a.txt").await.unwrap();
    service.select("b.txt").await.unwrap();
    assert_eq!(service.cache().fetch_count(), 2);
    assert_eq!(service.latest().unwrap().report, "b.txt");
}

#[tokio::test]
async fn config_changes_rerender_and_notify() {
    let dir = catalog();
    let service = ReportService::from_settings(&settings_for(dir.path())).await.unwrap();
    let mut rx = service.subscribe();
    rx.borrow_and_update();

    let view = service
        .set_config(&ConfigPatch {
            env: Some(1),
            start: Some(1),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(view.config, ViewConfig { env: 1, start: 1, end: None, round: 200 });
    assert_eq!(compat(&service), vec![21.0, 22.0]);
    assert_eq!(view.payload.labels, vec!["0".to_string(), "1".to_string()]);

    assert!(rx.has_changed().unwrap());
    let seen = rx.borrow_and_update().clone().unwrap();
    assert_eq!(seen.revision, view.revision);

    // switching reports keeps the config
    let view = service.select("b.txt").await.unwrap().unwrap();
    assert_eq!(view.config.env, 1);
    assert_eq!(compat(&service), vec![41.0]);
}

#[tokio::test]
async fn out_of_range_environment_is_rejected() {
    let dir = catalog();
    let service = ReportService::from_settings(&settings_for(dir.path())).await.unwrap();
    let before = service.latest().unwrap();

    let err = service
        .set_config(&ConfigPatch {
            env: Some(9),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err, ReportError::UnknownEnvironment { index: 9, available: 2 });
    assert_eq!(service.latest().unwrap().revision, before.revision);
    assert_eq!(service.config().env, 0);
    assert_eq!(service.last_error(), Some(err));
}

#[tokio::test]
async fn empty_catalog_has_no_selection() {
    let dir = TempDir::new().unwrap();
    let service = ReportService::from_settings(&settings_for(dir.path())).await.unwrap();
    assert!(service.reports().is_empty());
    assert!(service.latest().is_none());
    assert_eq!(
        service.set_config(&ConfigPatch::default()).unwrap_err(),
        ReportError::NoSelection
    );
}

#[tokio::test]
async fn missing_directory_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let settings = settings_for(&dir.path().join("absent"));
    let err = ReportService::from_settings(&settings).await.err().unwrap();
    assert!(matches!(err, ReportError::SourceUnavailable { .. }));
}

#[tokio::test]
async fn single_report_from_path() {
    let dir = catalog();
    let locator = Locator::Path(dir.path().join("b.txt"));
    let service = ReportService::open_single(locator, &Settings::default()).await.unwrap();
    assert_eq!(service.reports().len(), 1);
    assert_eq!(service.latest().unwrap().report, "b.txt");
    assert_eq!(compat(&service), vec![30.0, 31.0]);

    let missing = Locator::Path(dir.path().join("gone.txt"));
    let err = ReportService::open_single(missing, &Settings::default()).await.err().unwrap();
    assert!(matches!(err, ReportError::SourceUnavailable { .. }));
}

#[tokio::test]
async fn summary_reports_shape_and_digest() {
    let dir = catalog();
    let service = ReportService::from_settings(&settings_for(dir.path())).await.unwrap();
    let report = service.selected().unwrap();
    assert_eq!(report.summary.name, "a.txt");
    assert_eq!(report.summary.environments, 2);
    assert_eq!(report.summary.lengths, vec![3, 3]);
    assert_eq!(report.summary.sha256.len(), 64);
}

#[tokio::test]
async fn select_that_cannot_render_changes_nothing() {
    let dir = catalog();
    fs::write(dir.path().join("c.txt"), "0.0.0.70.0.0.0\n0.0.0.71.0.0.0\n\n").unwrap();
    let service = ReportService::from_settings(&settings_for(dir.path())).await.unwrap();
    let before = service
        .set_config(&ConfigPatch {
            env: Some(1),
            ..Default::default()
        })
        .unwrap();

    let err = service.select("c.txt").await.unwrap_err();
    assert_eq!(err, ReportError::UnknownEnvironment { index: 1, available: 1 });
    assert_eq!(service.selected().unwrap().identity.name, "a.txt");
    let after = service.latest().unwrap();
    assert_eq!(after.report, "a.txt");
    assert_eq!(after.revision, before.revision);
    assert_eq!(service.last_error(), Some(err));

    // the report itself loaded fine and renders once the env fits
    service
        .set_config(&ConfigPatch {
            env: Some(0),
            ..Default::default()
        })
        .unwrap();
    let view = service.select("c.txt").await.unwrap().unwrap();
    assert_eq!(view.report, "c.txt");
    assert_eq!(service.selected().unwrap().identity.name, "c.txt");
    assert_eq!(compat(&service), vec![70.0, 71.0]);
    assert_eq!(service.cache().fetch_count(), 2);
}

#[tokio::test]
async fn default_env_too_wide_selects_nothing_until_fixed() {
    let dir = catalog();
    let settings = Settings {
        view: ViewConfig {
            env: 5,
            ..ViewConfig::default()
        },
        ..settings_for(dir.path())
    };
    let service = ReportService::from_settings(&settings).await.unwrap();
    assert!(service.selected().is_none());
    assert!(service.latest().is_none());
    assert_eq!(
        service.last_error(),
        Some(ReportError::UnknownEnvironment { index: 5, available: 2 })
    );

    // with nothing selected the config is kept for the next selection
    let err = service
        .set_config(&ConfigPatch {
            env: Some(0),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err, ReportError::NoSelection);
    assert_eq!(service.config().env, 0);

    let view = service.select("a.txt").await.unwrap().unwrap();
    assert_eq!(view.report, "a.txt");
    assert_eq!(service.last_error(), None);
}

/// "slow" is held back until the gate opens.
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
            return Ok("0.0.0.90.0.0.0\n\n".to_string());
        }
        Ok("0.0.0.10.0.0.0\n\n".to_string())
    }
}

#[tokio::test]
async fn overtaken_selection_publishes_nothing() {
    let gate = Arc::new(Notify::new());
    let source = Arc::new(GatedSource { gate: gate.clone() });
    let service = Arc::new(ReportService::open(source, &Settings::default()).await.unwrap());
    assert_eq!(service.latest().unwrap().report, "fast");

    let slow = tokio::spawn({
        let service = service.clone();
        async move { service.select("slow").await }
    });
    while !service.is_loading() {
        tokio::task::yield_now().await;
    }

    let fast = service.select("fast").await.unwrap().unwrap();
    assert_eq!(fast.report, "fast");

    gate.notify_one();
    assert_eq!(slow.await.unwrap().unwrap(), None);

    let latest = service.latest().unwrap();
    assert_eq!(latest.report, "fast");
    assert_eq!(latest.revision, fast.revision);
    assert_eq!(service.selected().unwrap().identity.name, "fast");
    assert_eq!(compat(&service), vec![10.0]);
    assert!(!service.is_loading());
}
