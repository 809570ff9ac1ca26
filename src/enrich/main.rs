//! Population, classification and elevation enrichment of a place store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use placemend::elevation::{ElevationChain, GazetteerDem, SrtmTiles};
use placemend::enrichment::{
    apply_enrichment, ElevationAnnotator, EnrichOutcome, EnrichReport, Enrichment,
    PopulationReconciler,
};
use placemend::gazetteer::{ensure_gazetteer, load_gazetteer, GEONAMES_URL};
use placemend::notify::{maybe_notify, DiscordNotifier, RunEvent};
use placemend::pipeline::{AbortReason, ReportEnvelope, RunMode, TerminalConfirmation};
use placemend::store::{PlaceQuery, PlaceStore, SqliteStore};
use placemend::Config;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "enrich")]
#[command(about = "Attach population, classification and elevation to places")]
struct Args {
    /// SQLite place store
    #[arg(short, long)]
    db: PathBuf,

    /// GeoNames dump (cities500.txt, optionally .gz)
    #[arg(short, long, default_value = "cities500.txt")]
    gazetteer: PathBuf,

    /// Download and extract the dump if it is missing
    #[arg(long)]
    download: bool,

    /// Source of the dump archive
    #[arg(long, default_value = GEONAMES_URL)]
    gazetteer_url: String,

    /// Directory of SRTM .hgt tiles
    #[arg(long)]
    srtm_dir: Option<PathBuf>,

    /// Use only the gazetteer DEM for elevation
    #[arg(long)]
    no_srtm: bool,

    /// Skip the elevation phase, leaving stored values untouched
    #[arg(long)]
    no_elevation: bool,

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

fn progress_bar(label: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );
    pb.set_message(label);
    Ok(pb)
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

    info!("Placemend enrichment");
    info!("Store: {} ({})", args.db.display(), mode);

    let notifier = args
        .discord_webhook
        .as_ref()
        .map(|url| DiscordNotifier::new(url.clone(), "enrich"))
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
    let gazetteer_path = if args.download {
        ensure_gazetteer(&args.gazetteer, &args.gazetteer_url)
            .await
            .context("Failed to fetch the gazetteer")?
    } else {
        args.gazetteer.clone()
    };

    let db = args.db.clone();
    let srtm_dir = if args.no_srtm || args.no_elevation {
        None
    } else {
        args.srtm_dir.clone()
    };
    let with_elevation = !args.no_elevation;
    let thresholds = config.thresholds.clone();

    let (store, enrichment, report) = tokio::task::spawn_blocking(move || -> Result<_> {
        let store = SqliteStore::open(&db).context("Failed to open place store")?;
        let missing_columns = store.missing_enrichment_columns()?;
        let all = store.load_places(&PlaceQuery::all())?;
        let places: Vec<_> = all.iter().filter(|p| p.location.is_some()).cloned().collect();
        info!("Loaded {} places, {} with coordinates", all.len(), places.len());

        let gazetteer = load_gazetteer(&gazetteer_path).context("Failed to load gazetteer")?;

        let population = match gazetteer.ensure_usable() {
            Ok(()) => {
                let pb = progress_bar("population")?;
                let reconciler = PopulationReconciler::new(thresholds.same_place_km);
                Some(reconciler.reconcile(&places, &gazetteer.entries, &pb))
            }
            Err(e) => {
                warn!("{}; population phase disabled, stored values kept", e);
                None
            }
        };

        let mut elevation_models = Vec::new();
        let elevation = if with_elevation {
            let mut chain = ElevationChain::new();
            if let Some(dir) = &srtm_dir {
                match SrtmTiles::open(dir) {
                    Ok(tiles) => chain = chain.with(tiles),
                    Err(e) => warn!("{}; using the gazetteer DEM only", e),
                }
            }
            let dem = GazetteerDem::new(&gazetteer.entries, thresholds.same_place_km);
            if dem.is_empty() {
                warn!("Gazetteer carries no DEM values; fallback resolves nothing");
            } else {
                info!("Gazetteer DEM: {} entries", dem.len());
            }
            chain = chain.with(dem);
            elevation_models = chain.names().into_iter().map(String::from).collect();

            let pb = progress_bar("elevation")?;
            Some(ElevationAnnotator::new(&chain).annotate(&places, &pb))
        } else {
            info!("Elevation phase skipped");
            None
        };

        let report = EnrichReport {
            places_loaded: all.len(),
            located: places.len(),
            missing_columns,
            gazetteer: Some(gazetteer.stats.clone()),
            population: population.as_ref().map(|p| p.stats.clone()),
            elevation_models,
            elevation: elevation.as_ref().map(|e| e.stats.clone()),
        };
        let enrichment = Enrichment {
            population,
            elevation,
        };
        Ok((store, enrichment, report))
    })
    .await??;

    println!("{}", report);
    let summary = report.to_string();
    maybe_notify(notifier, RunEvent::Reported { summary: &summary }).await;

    let batches = config.batches.clone();
    let outcome = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut store = store;
        Ok(apply_enrichment(
            &mut store,
            &enrichment,
            mode,
            &mut TerminalConfirmation,
            &batches,
        )?)
    })
    .await??;

    match &outcome {
        EnrichOutcome::Applied(applied) => {
            let text = format!(
                "{} places classified, {} elevations updated, {} records",
                applied.classified, applied.elevations_updated, applied.final_count
            );
            info!("Applied: {}", text);
            maybe_notify(notifier, RunEvent::Finished { summary: &text }).await;
        }
        EnrichOutcome::Aborted { reason } => {
            let reason = match reason {
                AbortReason::DryRun => "dry run",
                AbortReason::Unconfirmed => "not confirmed",
            };
            maybe_notify(notifier, RunEvent::Aborted { reason }).await;
        }
    }

    if let Some(path) = &args.report_json {
        ReportEnvelope::new("enrich", &report, &outcome)
            .write_json(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    Ok(())
}
