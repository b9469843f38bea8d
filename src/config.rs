//! Runtime configuration, read from the environment
//!
//! `main` loads `.env` with dotenvy first, so every variable can live there as well.

use std::path::PathBuf;
use std::time::Duration;

use tracing::Level;
use url::Url;

use crate::browser::BrowserSettings;
use crate::error::ConfigError;
use crate::scraper::MalformedProductPolicy;
use crate::traits::{ScraperConfig, SiteSelectors};
use crate::variants::VariantFailurePolicy;

const DEFAULT_BASE_URL: &str = "https://webscraper.io/";
const DEFAULT_LISTING_PATH: &str = "test-sites/e-commerce/static/computers/laptops";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Whether per-variant prices are resolved in a browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionMode {
    /// Listing markup only
    #[default]
    Static,
    /// Listing markup plus a browser visit per product for variant prices
    Dynamic,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub mode: ExtractionMode,
    pub output: PathBuf,
    pub malformed_product_policy: MalformedProductPolicy,
    pub variant_failure_policy: VariantFailurePolicy,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub log_level: Level,
    /// Log file next to stdout; `None` logs to stdout only
    pub log_file: Option<PathBuf>,
    pub browser: BrowserSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let base_url = Url::parse(
            &var("SCRAPER_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        )?;
        let listing_url = match var("SCRAPER_LISTING_URL") {
            Some(url) => Url::parse(&url)?,
            None => base_url.join(DEFAULT_LISTING_PATH)?,
        };

        let mode = match var("SCRAPER_MODE") {
            None => ExtractionMode::default(),
            Some(value) => choice(
                "SCRAPER_MODE",
                &value,
                &[
                    ("static", ExtractionMode::Static),
                    ("dynamic", ExtractionMode::Dynamic),
                ],
            )?,
        };

        let malformed_product_policy = match var("SCRAPER_ON_MALFORMED_PRODUCT") {
            None => MalformedProductPolicy::default(),
            Some(value) => choice(
                "SCRAPER_ON_MALFORMED_PRODUCT",
                &value,
                &[
                    ("skip", MalformedProductPolicy::Skip),
                    ("abort", MalformedProductPolicy::Abort),
                ],
            )?,
        };

        let variant_failure_policy = match var("SCRAPER_ON_VARIANT_FAILURE") {
            None => VariantFailurePolicy::default(),
            Some(value) => choice(
                "SCRAPER_ON_VARIANT_FAILURE",
                &value,
                &[
                    ("abort", VariantFailurePolicy::AbortProduct),
                    ("skip", VariantFailurePolicy::SkipControl),
                ],
            )?,
        };

        let request_timeout = Duration::from_secs(number(
            "SCRAPER_REQUEST_TIMEOUT_SECS",
            var("SCRAPER_REQUEST_TIMEOUT_SECS"),
            30,
        )?);
        let settle_delay = Duration::from_millis(number(
            "SCRAPER_VARIANT_SETTLE_MS",
            var("SCRAPER_VARIANT_SETTLE_MS"),
            250,
        )?);

        let log_level = match var("SCRAPER_LOG_LEVEL") {
            None => Level::INFO,
            Some(value) => value
                .parse::<Level>()
                .map_err(|e| ConfigError::InvalidValue {
                    name: "SCRAPER_LOG_LEVEL",
                    message: e.to_string(),
                    value,
                })?,
        };

        // Set but empty disables the file
        let log_file = match lookup("SCRAPER_LOG_FILE") {
            None => Some(PathBuf::from("parser.log")),
            Some(path) if path.trim().is_empty() => None,
            Some(path) => Some(PathBuf::from(path)),
        };

        Ok(Self {
            scraper: ScraperConfig {
                name: listing_url.host_str().unwrap_or("listing").to_string(),
                base_url,
                listing_url,
                selectors: SiteSelectors::default(),
            },
            mode,
            output: PathBuf::from(
                var("SCRAPER_OUTPUT").unwrap_or_else(|| "results.csv".to_string()),
            ),
            malformed_product_policy,
            variant_failure_policy,
            request_timeout,
            user_agent: var("SCRAPER_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            log_level,
            log_file,
            browser: BrowserSettings {
                remote_debugging_url: var("CHROMIUM_REMOTE_DEBUGGING_URL"),
                request_timeout,
                settle_delay,
            },
        })
    }
}

fn choice<T: Copy>(
    name: &'static str,
    value: &str,
    options: &[(&str, T)],
) -> Result<T, ConfigError> {
    let wanted = value.trim().to_lowercase();
    options
        .iter()
        .find(|(key, _)| *key == wanted)
        .map(|(_, option)| *option)
        .ok_or_else(|| ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            message: format!(
                "expected one of {}",
                options.iter().map(|(key, _)| *key).collect::<Vec<_>>().join(", ")
            ),
        })
}

fn number(name: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue {
                name,
                message: e.to_string(),
                value,
            }),
    }
}
