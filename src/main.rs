// src/main.rs
mod browser;
mod config;
mod extractors;
mod pipeline;
mod storage;
mod utils;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use browser::{BrowserSession, LaunchOptions, RetryPolicy};
use config::RunConfig;
use extractors::ExtractorSettings;
use pipeline::{Pipeline, PipelineOptions};
use storage::{SheetsClient, StorageManager};
use utils::AppError;

/// Scrapes rendered stat leaderboards into CSV files and Google Sheets tabs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file listing targets (defaults to the built-in leaderboards)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only run the named target (repeatable)
    #[arg(long)]
    only: Vec<String>,

    /// Output directory for CSV exports and debug artifacts
    #[arg(short, long, default_value = "./output")]
    output_dir: String,

    /// Debug mode - save annotated HTML for every extracted page
    #[arg(short, long)]
    debug: bool,

    /// Process at most this many body rows per page
    #[arg(long)]
    debug_rows: Option<usize>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Chrome binary to launch
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// Bearer token for the Sheets and Drive APIs
    #[arg(long, env = "GOOGLE_SHEETS_TOKEN", hide_env_values = true)]
    sheets_token: Option<String>,

    /// Seconds to wait for the table to render
    #[arg(long, default_value_t = 30)]
    ready_timeout: u64,

    /// Page load attempts per URL
    #[arg(long, default_value_t = 3)]
    nav_retries: usize,

    /// Seconds between page load attempts
    #[arg(long, default_value_t = 5)]
    nav_backoff: u64,

    /// Seconds before a single page load is abandoned
    #[arg(long, default_value_t = 30)]
    page_load_timeout: u64,

    /// Seconds to let lazy-loaded rows settle after each scroll
    #[arg(long, default_value_t = 3)]
    scroll_settle: u64,

    /// Minimum pause between targets, in seconds
    #[arg(long, default_value_t = 2.0)]
    delay_min: f64,

    /// Maximum pause between targets, in seconds
    #[arg(long, default_value_t = 4.0)]
    delay_max: f64,
}

impl Args {
    fn pipeline_options(&self) -> Result<PipelineOptions, AppError> {
        let delay_min = delay_secs("delay-min", self.delay_min)?;
        let delay_max = delay_secs("delay-max", self.delay_max)?;
        if delay_max < delay_min {
            return Err(AppError::Config(format!(
                "Invalid delay range {}..{}",
                self.delay_min, self.delay_max
            )));
        }

        Ok(PipelineOptions {
            extractor: ExtractorSettings {
                scroll_settle: Duration::from_secs(self.scroll_settle),
                ready_timeout: Duration::from_secs(self.ready_timeout),
                ..ExtractorSettings::default()
            },
            retry: RetryPolicy {
                attempts: self.nav_retries,
                backoff: Duration::from_secs(self.nav_backoff),
                load_timeout: Duration::from_secs(self.page_load_timeout),
            },
            row_cap: self.debug_rows,
            debug: self.debug,
            delay_range: (delay_min, delay_max),
        })
    }
}

/// Rejects negative, NaN and unbounded delays.
fn delay_secs(flag: &str, secs: f64) -> Result<Duration, AppError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| AppError::Config(format!("Invalid --{} {}: {}", flag, secs, e)))
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI Arguments
    let args = Args::parse();
    tracing::info!("Starting run with output dir {} (debug: {})", args.output_dir, args.debug);

    // 3. Resolve targets
    let run_config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::defaults(),
    }
    .select(&args.only)?;
    if run_config.targets.is_empty() {
        return Err(AppError::Config("No targets to run".to_string()));
    }
    tracing::info!("{} target(s) queued", run_config.targets.len());

    let options = args.pipeline_options()?;

    // 4. Initialize outputs
    let storage = StorageManager::new(&args.output_dir)?;
    let sheets = match args.sheets_token.as_deref().filter(|t| !t.trim().is_empty()) {
        Some(token) => Some(SheetsClient::new(token)?),
        None => {
            tracing::warn!("No Sheets token set; sheet targets will be skipped");
            None
        }
    };

    // 5. Start the browser
    let launch = LaunchOptions {
        headed: args.headed,
        chrome_path: args.chrome_path.clone(),
        request_timeout: Some(Duration::from_secs(args.page_load_timeout)),
    };
    let session = BrowserSession::launch(&launch).await?;

    // 6. Process each target
    let summary = {
        let pipeline = Pipeline::new(session.page(), &storage, sheets.as_ref(), options);
        pipeline.run(&run_config.targets).await
    };

    // The browser is released whatever the targets did
    if let Err(e) = session.close().await {
        tracing::error!("Failed to close browser cleanly: {}", e);
    }

    tracing::info!(
        "Processing finished. Success: {}, Empty: {}, Failures: {}",
        summary.succeeded,
        summary.empty,
        summary.failed
    );

    if summary.succeeded == 0 && summary.failed > 0 {
        return Err(AppError::Processing(format!(
            "All {} attempted target(s) failed",
            summary.failed
        )));
    }

    Ok(())
}
