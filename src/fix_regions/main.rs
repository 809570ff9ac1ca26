//! Region correction for a place store.
//!
//! Removes duplicate records, moves records whose region is geometrically
//! implausible, and removes the duplicates those moves would create.
//! Dry run by default; `--apply` writes after confirmation and a backup.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use placemend::notify::{maybe_notify, DiscordNotifier, RunEvent};
use placemend::pipeline::{
    AbortReason, Outcome, RegionFixPipeline, ReportEnvelope, RunMode, TerminalConfirmation,
};
use placemend::store::SqliteStore;
use placemend::Config;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "fix-regions")]
#[command(about = "Detect and correct duplicate and misassigned places")]
struct Args {
    /// SQLite place store
    #[arg(short, long)]
    db: PathBuf,

    /// TOML file with thresholds and batch sizes
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the changes (after confirmation); default is a dry run
    #[arg(long)]
    apply: bool,

    /// Also write the report as JSON
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Discord webhook URL for notifications (optional)
    #[arg(long)]
    discord_webhook: Option<String>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    let mode = RunMode::from_apply_flag(args.apply);

    info!("Placemend region correction");
    info!("Store: {} ({})", args.db.display(), mode);

    let notifier = args
        .discord_webhook
        .as_ref()
        .map(|url| DiscordNotifier::new(url.clone(), "fix-regions"))
        .transpose()?;

    let target = args.db.display().to_string();
    let mode_label = mode.to_string();
    maybe_notify(
        notifier.as_ref(),
        RunEvent::Started {
            target: &target,
            mode: &mode_label,
        },
    )
    .await;

    let result = run(&args, config, mode, notifier.as_ref()).await;
    if let Err(e) = &result {
        let error = format!("{:#}", e);
        maybe_notify(notifier.as_ref(), RunEvent::Failed { error: &error }).await;
    }
    result
}

async fn run(
    args: &Args,
    config: Config,
    mode: RunMode,
    notifier: Option<&DiscordNotifier>,
) -> Result<()> {
    let db = args.db.clone();
    let (store, mut pipeline, report) = tokio::task::spawn_blocking(move || -> Result<_> {
        let store = SqliteStore::open(&db).context("Failed to open place store")?;
        let mut pipeline = RegionFixPipeline::load(&store, config)?;
        let report = pipeline.analyze()?.clone();
        Ok((store, pipeline, report))
    })
    .await??;

    println!("{}", report);

    let summary = report.to_string();
    maybe_notify(notifier, RunEvent::Reported { summary: &summary }).await;

    // The confirmation prompt blocks on the terminal
    let (pipeline, outcome) = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut store = store;
        let outcome = pipeline.finish(&mut store, mode, &mut TerminalConfirmation)?;
        Ok((pipeline, outcome))
    })
    .await??;
    info!("Finished in stage {:?}", pipeline.stage());

    match &outcome {
        Outcome::Applied(summary) => {
            let text = format!(
                "deleted {} + {} duplicates, reassigned {}, {} records remain",
                summary.pre_deleted, summary.post_deleted, summary.reassigned, summary.final_count
            );
            info!("Applied: {}", text);
            maybe_notify(notifier, RunEvent::Finished { summary: &text }).await;
        }
        Outcome::Aborted { reason } => {
            let reason = match reason {
                AbortReason::DryRun => "dry run",
                AbortReason::Unconfirmed => "not confirmed",
            };
            maybe_notify(notifier, RunEvent::Aborted { reason }).await;
        }
    }

    if let Some(path) = &args.report_json {
        ReportEnvelope::new("fix-regions", &report, &outcome)
            .write_json(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    Ok(())
}
