//! Error types for fetching, extraction, variant resolution and export

use thiserror::Error;

/// Failure to derive one field of one product
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("missing `{field}` element")]
    MissingElement { field: &'static str },
    #[error("title attribute is missing or empty")]
    MissingTitle,
    #[error("malformed price: {raw:?}")]
    MalformedPrice { raw: String },
    #[error("rating attribute is missing")]
    MissingRating,
    #[error("rating {raw:?} is not an integer between 1 and 5")]
    InvalidRating { raw: String },
    #[error("malformed review count: {raw:?}")]
    MalformedReviewCount { raw: String },
}

/// A field error located within a listing
#[derive(Error, Debug, Clone, PartialEq)]
#[error("page {page}, product #{index}: {kind}")]
pub struct ProductError {
    pub page: u32,
    /// Position of the product container on its page, zero-based
    pub index: usize,
    /// Title, when it could be read before the failure
    pub title: Option<String>,
    #[source]
    pub kind: FieldError,
}

/// Transport-level failure reaching a page or a browser session
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Aborts pagination; records gathered before it are kept
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("failed to fetch page {page_number}: {source}")]
    PageFetch {
        page_number: u32,
        #[source]
        source: FetchError,
    },
}

/// Failure reported by a browser session
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("browser error: {0}")]
    Browser(String),
    #[error("no element matches `{selector}`")]
    ElementNotFound { selector: String },
    #[error("variant control #{position} is gone from the page")]
    StaleControl { position: usize },
    #[error("session already closed")]
    Closed,
}

impl From<chromiumoxide::error::CdpError> for DriverError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Self::Browser(err.to_string())
    }
}

/// Variant prices for a product could not be resolved
#[derive(Error, Debug)]
pub enum VariantResolutionError {
    #[error("product has no detail link")]
    MissingDetailLink,
    #[error("cannot resolve detail link {href:?}: {source}")]
    InvalidDetailUrl {
        href: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to open {url}: {source}")]
    Open {
        url: String,
        #[source]
        source: DriverError,
    },
    #[error("failed to list variant controls: {0}")]
    Controls(#[source] DriverError),
    #[error("failed to activate variant {label:?}: {source}")]
    Activate {
        label: String,
        #[source]
        source: DriverError,
    },
    #[error("failed to read price for variant {label:?}: {source}")]
    ReadPrice {
        label: String,
        #[source]
        source: DriverError,
    },
    #[error("price for variant {label:?} is unusable: {source}")]
    ParsePrice {
        label: String,
        #[source]
        source: FieldError,
    },
}

/// Failure while exporting or re-reading records
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("additional_info is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("row {row}: {message}")]
    InvalidRow { row: usize, message: String },
}

/// Invalid configuration value or selector
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}: {message}")]
    InvalidValue {
        name: &'static str,
        value: String,
        message: String,
    },
    #[error("invalid selector `{selector}`: {message}")]
    Selector { selector: String, message: String },
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}
