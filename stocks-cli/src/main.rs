//! Stocks CLI: download and plot commands.
//!
//! Commands:
//! - `download`: fetch bars from Yahoo Finance and merge them into the workspace
//! - `plot`: render a stored series' Close as an SVG line chart

mod plot;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use stocks_core::config::Workspace;
use stocks_core::data::{
    dates, download_symbols, resolve_tickers, DateRange, DownloadRequest, SeriesStore,
    TracingProgress, YahooProvider,
};
use stocks_core::domain::{Interval, Symbol};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stocks", about = "Stocks: market-data download and merge store")]
struct Cli {
    /// Log filter (e.g. info, debug, stocks_core=trace). RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download bars and merge them into the stored series.
    Download {
        /// Reference-file directory, a single reference file, or a comma list (AAPL,MSFT).
        #[arg(short = 't', long)]
        tickers: String,

        /// Start: YYYY-MM-DD, now, or a relative offset like _6d / _1m.
        #[arg(short = 's', long, default_value = "_6d", allow_hyphen_values = true)]
        start: String,

        /// End: YYYY-MM-DD, now, or a relative offset like +1d.
        #[arg(short = 'e', long, default_value = "+1d", allow_hyphen_values = true)]
        end: String,

        /// Bar interval: 1d, 60m, 15m, 5m, 2m, 1m.
        #[arg(short = 'i', long, default_value = "1d")]
        interval: String,

        /// Also write a timestamped snapshot of each symbol's fetched rows.
        #[arg(long, default_value_t = false)]
        snapshot: bool,
    },
    /// Plot a stored series' Close between two dates.
    Plot {
        /// Ticker symbol.
        #[arg(short = 't', long)]
        ticker: String,

        /// Start: YYYY-MM-DD, now, or a relative offset.
        #[arg(short = 's', long, allow_hyphen_values = true)]
        start: String,

        /// End: YYYY-MM-DD, now, or a relative offset.
        #[arg(short = 'e', long, allow_hyphen_values = true)]
        end: String,

        /// Bar interval of the stored series.
        #[arg(short = 'i', long, default_value = "1d")]
        interval: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Download {
            tickers,
            start,
            end,
            interval,
            snapshot,
        } => run_download(&tickers, &start, &end, &interval, snapshot),
        Commands::Plot {
            ticker,
            start,
            end,
            interval,
        } => run_plot(&ticker, &start, &end, &interval),
    }
}

/// Install the global fmt subscriber. `RUST_LOG` overrides `--log-level`.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_download(
    tickers: &str,
    start: &str,
    end: &str,
    interval: &str,
    snapshot: bool,
) -> Result<()> {
    // Validate every input before touching the network or the store.
    let interval: Interval = interval.parse()?;
    let now = dates::now();
    let start = dates::resolve(start, now)?;
    let end = dates::resolve(end, now)?;
    let range = DateRange::from_instants(&start, &end)?;
    let symbols = resolve_tickers(tickers)?;

    let workspace = Workspace::from_env()?;
    let settings = workspace.load_settings()?;
    let provider = YahooProvider::new(settings.provider_config())?;
    let store = SeriesStore::new(workspace.data_root());

    tracing::info!(
        workspace = %workspace.root().display(),
        %interval,
        start = %range.start,
        end = %range.end,
        "download range"
    );

    let request = DownloadRequest {
        symbols,
        range,
        interval,
        snapshot,
    };
    let summary = download_symbols(
        &provider,
        &store,
        &request,
        settings.download_options(),
        &TracingProgress,
    )?;

    if !summary.all_succeeded() {
        for (batch, err) in &summary.batch_failures {
            eprintln!("Batch {batch} failed: {err}");
        }
        for (sym, err) in &summary.symbol_failures {
            eprintln!("Error for {sym}: {err}");
        }
        bail!(
            "{} batch(es) and {} symbol(s) failed",
            summary.batch_failures.len(),
            summary.symbol_failures.len()
        );
    }

    Ok(())
}

fn run_plot(ticker: &str, start: &str, end: &str, interval: &str) -> Result<()> {
    let interval: Interval = interval.parse()?;
    let Some(symbol) = Symbol::parse(ticker) else {
        bail!("ticker must not be empty");
    };
    let now = dates::now();
    let start = dates::resolve(start, now)?;
    let end = dates::resolve(end, now)?;
    if start > end {
        bail!("start {start} is after end {end}");
    }

    let workspace = Workspace::from_env()?;
    let store = SeriesStore::new(workspace.data_root());
    let records = store.load_range(&symbol, interval, &start, &end)?;

    let Some(svg) = plot::render_close_svg(&symbol, &records) else {
        tracing::warn!(%symbol, "no Close values in range, nothing to plot");
        return Ok(());
    };

    let path = workspace.plot_path(&symbol.file_stem());
    std::fs::write(&path, svg).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(%symbol, rows = records.len(), path = %path.display(), "saved plot");
    Ok(())
}
