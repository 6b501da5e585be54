use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;

use envreport::logging::{self, obj, v_str, Domain, Level};
use envreport::source::source_for;
use envreport::{
    ConfigPatch, DirectorySource, NanMode, PinPosition, ReportCache, ReportService, ReportSource,
    Settings,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Simulation report → chart payload", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the reports available in the reports directory
    List {
        /// Reports directory (defaults to REPORTS_DIR)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Print the chart payload for one environment of a report
    Render(RenderArgs),
    /// Print digest and shape of a report
    Inspect {
        /// Report name from the catalog (ignored with --url)
        name: Option<String>,
        #[command(flatten)]
        origin: Origin,
    },
}

#[derive(Args, Debug)]
struct Origin {
    /// Reports directory (defaults to REPORTS_DIR)
    #[arg(long, conflicts_with = "url")]
    dir: Option<PathBuf>,
    /// Fetch a single report from a file path or http(s) URL
    #[arg(long)]
    url: Option<String>,
    /// Trailing run-parameter columns to split off
    #[arg(long)]
    parameter_columns: Option<usize>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Report name from the catalog (ignored with --url)
    name: Option<String>,
    #[command(flatten)]
    origin: Origin,
    /// Environment (column) index
    #[arg(long)]
    env: Option<usize>,
    /// First record index of the window
    #[arg(long, allow_hyphen_values = true)]
    start: Option<i64>,
    /// End of the window, exclusive (default: to the end)
    #[arg(long, allow_hyphen_values = true)]
    end: Option<i64>,
    /// Target point count after downsampling
    #[arg(long)]
    round: Option<usize>,
    /// Replace NaN values with 0 in the payload
    #[arg(long)]
    zero_nan: bool,
    /// Where the compatibility dataset goes
    #[arg(long, value_enum)]
    pin: Option<PinOpt>,
    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PinOpt {
    First,
    Last,
}

impl From<PinOpt> for PinPosition {
    fn from(value: PinOpt) -> Self {
        match value {
            PinOpt::First => PinPosition::First,
            PinOpt::Last => PinPosition::Last,
        }
    }
}

impl Origin {
    fn apply(&self, settings: &mut Settings, name: Option<&String>) {
        if let Some(dir) = &self.dir {
            settings.reports_dir = dir.clone();
        }
        if let Some(url) = &self.url {
            settings.report_url = Some(url.clone());
        }
        if let Some(n) = self.parameter_columns {
            settings.parameter_columns = n;
        }
        if let (Some(name), None) = (name, &self.url) {
            settings.initial_report = Some(name.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::from_env();

    let result = match cli.command {
        Command::List { dir } => list(dir.unwrap_or(settings.reports_dir)).await,
        Command::Render(args) => {
            args.origin.apply(&mut settings, args.name.as_ref());
            render(args, settings).await
        }
        Command::Inspect { name, origin } => {
            origin.apply(&mut settings, name.as_ref());
            inspect(settings).await
        }
    };

    if let Err(err) = &result {
        logging::log(
            Level::Error,
            Domain::System,
            "command_failed",
            obj(&[("msg", v_str(&format!("{:#}", err)))]),
        );
    }
    result
}

async fn list(dir: PathBuf) -> Result<()> {
    let source = DirectorySource::new(dir);
    let reports = source.list().await.context("listing reports")?;
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

async fn render(args: RenderArgs, mut settings: Settings) -> Result<()> {
    if args.zero_nan {
        settings.chart.nan_mode = NanMode::Zero;
    }
    if let Some(pin) = args.pin {
        settings.chart.pin_position = pin.into();
    }
    // The initial selection renders with these, so an env valid for this
    // report works even when DEFAULT_ENV isn't.
    settings.view = settings.view.merge(&ConfigPatch {
        env: args.env,
        start: args.start,
        end: args.end.map(Some),
        round: args.round,
    });

    let service = open(&settings).await?;
    let view = service
        .latest()
        .ok_or_else(|| anyhow!("no chart rendered"))?;

    let out = if args.pretty {
        serde_json::to_string_pretty(view.as_ref())?
    } else {
        serde_json::to_string(view.as_ref())?
    };
    println!("{}", out);
    Ok(())
}

/// Summary only, so the view config never gets in the way.
async fn inspect(settings: Settings) -> Result<()> {
    let source = source_for(&settings).context("opening reports")?;
    let cache = ReportCache::open(source, settings.parameter_columns)
        .await
        .context("opening reports")?;
    let name = settings
        .initial_report
        .clone()
        .or_else(|| cache.list().first().map(|r| r.name.clone()))
        .ok_or_else(|| anyhow!("no reports found"))?;
    let report = cache
        .load(&name)
        .await
        .with_context(|| format!("loading {}", name))?;

    let payload = json!({
        "identity": report.identity,
        "summary": report.summary,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

/// Open the service and fail if the requested report didn't load.
async fn open(settings: &Settings) -> Result<ReportService> {
    let service = ReportService::from_settings(settings)
        .await
        .context("opening reports")?;
    if let Some(err) = service.last_error() {
        return Err(anyhow!(err).context("selecting report"));
    }
    if service.selected().is_none() {
        return Err(anyhow!("no report selected"));
    }
    Ok(service)
}
