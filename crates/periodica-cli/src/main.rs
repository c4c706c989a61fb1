use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use periodica_core::{Config, ResultCache, SearchEngine, SearchRequest, config_file};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod output;

use output::ColorMode;

/// Periodica - federated search across bibliographic sources
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Cache directory (overrides config file and PERIODICA_CACHE_DIR)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search all (or the selected) sources
    Search {
        /// Search terms; AND, OR and NOT in upper case are kept as operators
        #[arg(required = true)]
        terms: Vec<String>,

        /// Restrict to an author
        #[arg(long)]
        author: Option<String>,

        /// Earliest publication date (YYYY-MM-DD, default: one year ago)
        #[arg(long)]
        start: Option<String>,

        /// Latest publication date (YYYY-MM-DD, default: today)
        #[arg(long)]
        end: Option<String>,

        /// Comma-separated journal ISSNs or names
        #[arg(long, value_delimiter = ',')]
        journal: Vec<String>,

        /// Comma-separated sources to query (default: all)
        #[arg(long, value_delimiter = ',')]
        source: Vec<String>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Also print per-source diagnostics
        #[arg(long)]
        reports: bool,
    },

    /// Delete expired cache entries
    SweepCache {
        /// Keep sweeping at the configured interval until Ctrl-C
        #[arg(long)]
        watch: bool,

        /// Sweep interval in seconds (implies --watch)
        #[arg(long)]
        every: Option<u64>,
    },

    /// List the registered sources
    Sources,
}

fn init_tracing(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Resolve configuration: CLI flags > env vars > config file > defaults.
fn load_config(cache_dir: Option<PathBuf>) -> Config {
    let mut config = Config::default();
    config_file::load_config().apply_to(&mut config);

    if let Ok(mailto) = std::env::var("CROSSREF_MAILTO") {
        config.crossref_mailto = Some(mailto);
    }
    if let Ok(mailto) = std::env::var("OPENALEX_MAILTO") {
        config.openalex_mailto = Some(mailto);
    }
    if let Ok(key) = std::env::var("S2_API_KEY") {
        config.s2_api_key = Some(key);
    }
    if let Ok(dir) = std::env::var("PERIODICA_CACHE_DIR") {
        config.cache_dir = PathBuf::from(dir);
    }

    if let Some(dir) = cache_dir {
        config.cache_dir = dir;
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = load_config(cli.cache_dir);
    tracing::debug!(?config, "configuration resolved");
    let color = ColorMode(!cli.no_color);

    match cli.command {
        Command::Search {
            terms,
            author,
            start,
            end,
            journal,
            source,
            limit,
            json,
            reports,
        } => {
            let request = SearchRequest {
                terms: terms.join(" "),
                author,
                start_date: start,
                end_date: end,
                journals: journal,
                limit,
                sources: source,
            };
            search(config, request, json, reports, color).await
        }
        Command::SweepCache { watch, every } => {
            let interval = match every {
                Some(secs) => Some(Duration::from_secs(secs.max(1))),
                None if watch => Some(config.sweep_interval()),
                None => None,
            };
            sweep_cache(config, interval, color).await
        }
        Command::Sources => {
            let engine = SearchEngine::from_config(config)?;
            let mut out = std::io::stdout().lock();
            output::print_sources(&mut out, engine.registry(), color)?;
            Ok(())
        }
    }
}

async fn search(
    config: Config,
    request: SearchRequest,
    json: bool,
    show_reports: bool,
    color: ColorMode,
) -> anyhow::Result<()> {
    let engine = SearchEngine::from_config(config)?;
    let results = engine.search(&request).await?;

    let mut out = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &results)?;
        writeln!(out)?;
        return Ok(());
    }

    output::print_results(&mut out, &results, color)?;
    if show_reports {
        output::print_reports(&mut out, &results.reports, color)?;
    }
    Ok(())
}

async fn sweep_cache(
    config: Config,
    interval: Option<Duration>,
    color: ColorMode,
) -> anyhow::Result<()> {
    let cache = Arc::new(ResultCache::new(config.cache_dir.clone(), config.cache_ttl()));

    let Some(interval) = interval else {
        let removed = cache.evict_expired();
        let mut out = std::io::stdout().lock();
        output::print_sweep(&mut out, cache.dir(), removed, color)?;
        return Ok(());
    };

    let cancel = CancellationToken::new();
    let sweeper = cache.spawn_sweeper(interval, cancel.clone());
    eprintln!(
        "Sweeping {} every {}s, press Ctrl-C to stop",
        cache.dir().display(),
        interval.as_secs()
    );
    tokio::signal::ctrl_c().await?;
    cancel.cancel();
    sweeper.await?;
    Ok(())
}
