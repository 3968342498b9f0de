//! Judge importer CLI
//!
//! Local execution entry point: the daily daemon, one-off sweeps and a
//! segmenter runner for inspecting merged PDFs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use judge_importer::{
    error::{AppError, Result},
    models::{Config, StorageBackend},
    pipeline::{self, DailyTrigger, Orchestrator},
    services::{PdfSegmenter, PopplerTools, ProblemImporter},
    sources::SourceRegistry,
    storage::{AssetPublisher, LocalStorage, ProblemRepository},
    utils::http::{self, Fetcher, HttpFetcher},
};

/// Online judge problem importer
#[derive(Parser, Debug)]
#[command(
    name = "judge-importer",
    version,
    about = "Imports online judge problem statements"
)]
struct Cli {
    /// Storage directory holding config.toml and the problem repository
    #[arg(short, long)]
    storage_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import stored problems, then sweep daily at the configured time
    Run,

    /// Run one full sweep now
    Sweep,

    /// Import eligible stored problems without fetching listings
    Import,

    /// Split a merged problem-set PDF into one PDF per problem
    Segment {
        /// URL of the merged PDF
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        url: Option<String>,

        /// Local merged PDF
        #[arg(long)]
        file: Option<PathBuf>,

        /// Number of problems in the PDF
        #[arg(long)]
        count: usize,

        /// Directory receiving 1.pdf, 2.pdf, ...
        #[arg(long, default_value = "segments")]
        out: PathBuf,
    },

    /// Validate configuration files
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Pick the publisher of the configured backend.
async fn publisher(config: &Config, local: &LocalStorage) -> Result<Arc<dyn AssetPublisher>> {
    match config.storage.backend {
        StorageBackend::Local => Ok(Arc::new(local.clone())),
        #[cfg(feature = "s3")]
        StorageBackend::S3 => Ok(Arc::new(judge_importer::storage::s3::S3Storage::from_env().await?)),
        #[cfg(not(feature = "s3"))]
        StorageBackend::S3 => Err(AppError::config(
            "storage.backend = \"s3\" requires the s3 feature",
        )),
    }
}

async fn build_orchestrator(config: Arc<Config>) -> Result<Orchestrator> {
    let client = http::create_async_client(&config.http)?;
    let registry = SourceRegistry::from_config(&config, client.clone())?;
    log::info!("Registered sources: {}", registry.names().join(", "));

    let mut local = LocalStorage::new(&config.storage.root_dir);
    if let Some(base_url) = &config.storage.public_base_url {
        local = local.with_public_base_url(base_url);
    }
    let repository: Arc<dyn ProblemRepository> = Arc::new(local.clone());
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(client));
    let extractor = Arc::new(PopplerTools::new(config.segmenter.tools.clone()));

    let importer = ProblemImporter::new(
        &config,
        repository.clone(),
        publisher(&config, &local).await?,
        fetcher,
        extractor,
    )?;
    Ok(Orchestrator::new(config, registry, repository, Arc::new(importer)))
}

async fn segment(config: &Config, source: SegmentSource, count: usize, out: &Path) -> Result<()> {
    let client = http::create_async_client(&config.http)?;
    let segmenter = PdfSegmenter::new(
        Arc::new(PopplerTools::new(config.segmenter.tools.clone())),
        Arc::new(HttpFetcher::new(client)),
        config.segmenter.clone(),
    )?;

    let segmentation = match source {
        SegmentSource::Url(url) => segmenter.segment_url(&url, count).await?,
        SegmentSource::File(path) => segmenter.segment_file(&path, count).await?,
    };

    tokio::fs::create_dir_all(out).await?;
    for (index, problem) in segmentation.problems.iter().enumerate() {
        let target = out.join(format!("{}.pdf", index + 1));
        tokio::fs::copy(&problem.path, &target).await?;
        log::info!(
            "{} pages {}-{} \"{}\" -> {}",
            index + 1,
            problem.range.start_page,
            problem.range.end_page,
            problem.range.detected_name,
            target.display()
        );
    }
    log::info!("Language: {}", segmentation.language);
    Ok(())
}

enum SegmentSource {
    Url(String),
    File(PathBuf),
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Judge importer starting...");

    // Load configuration
    let storage_dir = cli.storage_dir.clone().unwrap_or_else(|| PathBuf::from("storage"));
    let config_path = storage_dir.join("config.toml");
    let mut config = Config::load_or_default(&config_path);
    if let Some(dir) = cli.storage_dir {
        config.storage.root_dir = dir;
    }

    log::info!("Loaded configuration from {}", config_path.display());

    match cli.command {
        Command::Run => {
            config.validate()?;
            let trigger = DailyTrigger::from_config(&config.schedule)?;
            let run_on_start = config.schedule.run_on_start;
            let orchestrator = Arc::new(build_orchestrator(Arc::new(config)).await?);

            if run_on_start {
                orchestrator.sweep().await?;
            } else {
                orchestrator.import_sweep().await?;
            }
            pipeline::run_daemon(orchestrator, trigger).await?;
        }

        Command::Sweep => {
            config.validate()?;
            let orchestrator = build_orchestrator(Arc::new(config)).await?;
            orchestrator.sweep().await?;
        }

        Command::Import => {
            config.validate()?;
            let orchestrator = build_orchestrator(Arc::new(config)).await?;
            orchestrator.import_sweep().await?;
        }

        Command::Segment {
            url,
            file,
            count,
            out,
        } => {
            let source = match (url, file) {
                (Some(url), _) => SegmentSource::Url(url),
                (None, Some(file)) => SegmentSource::File(file),
                (None, None) => return Err(AppError::validation("--url or --file is required")),
            };
            segment(&config, source, count, &out).await?;
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            DailyTrigger::from_config(&config.schedule)?;
            log::info!("✓ Config OK ({} sources)", config.sources.len());

            log::info!("All validations passed!");
        }
    }

    log::info!("Done!");

    Ok(())
}
