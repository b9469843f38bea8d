use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

use listing_scraper::browser::ChromiumDriver;
use listing_scraper::config::{AppConfig, ExtractionMode};
use listing_scraper::fetcher::HttpFetcher;
use listing_scraper::product_finder::ProductFinder;
use listing_scraper::sink::CsvSink;
use listing_scraper::variants::VariantPriceResolver;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    let _log_guard = init_logging(&config)?;

    info!(
        "Starting {:?} scrape of {}",
        config.mode, config.scraper.listing_url
    );

    let fetcher = HttpFetcher::new(
        config.scraper.clone(),
        &config.user_agent,
        config.request_timeout,
    )?;

    let resolver = match config.mode {
        ExtractionMode::Static => None,
        ExtractionMode::Dynamic => Some(VariantPriceResolver::new(
            ChromiumDriver::new(config.browser.clone(), &config.scraper.selectors),
            config.variant_failure_policy,
        )),
    };

    let finder = ProductFinder::new(
        &config.scraper,
        fetcher,
        config.malformed_product_policy,
        resolver,
    )?;

    let first_page = finder.fetch_first_page().await?;
    let mut sink = CsvSink::create(&config.output, config.mode == ExtractionMode::Dynamic)?;
    let result = finder.run(first_page, &mut sink).await;

    if let Some(resolver) = finder.into_resolver()
        && let Err(e) = resolver.into_driver().shutdown().await
    {
        warn!("Failed to shut down browser: {}", e);
    }

    let report = result?;
    report.log_summary();

    if let Some(e) = report.fetch_error {
        return Err(e).context(format!(
            "listing only partially scraped; {} records written to {}",
            report.records_written,
            config.output.display()
        ));
    }

    Ok(())
}

/// Log to stdout and, when configured, to a file as well
fn init_logging(config: &AppConfig) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("log file {} has no file name", path.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .with(LevelFilter::from_level(config.log_level))
        .init();

    Ok(guard)
}
