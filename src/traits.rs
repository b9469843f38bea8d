//! Traits and interfaces for website-agnostic scraping

use async_trait::async_trait;
use url::Url;

use crate::error::{DriverError, FetchError, SinkError};
use crate::models::{Page, Record, VariantControl};

/// Configuration for a product listing
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Display name used in logs
    pub name: String,
    /// Base URL that relative detail links are resolved against
    pub base_url: Url,
    /// First page of the listing
    pub listing_url: Url,
    /// CSS selectors for extracting data
    pub selectors: SiteSelectors,
}

impl ScraperConfig {
    /// URL of a listing page. Page 1 is the listing URL unchanged.
    ///
    /// # Arguments
    /// * `page_number` - 1-based page number
    ///
    /// # Returns
    /// * `Url` - The listing URL, with a `page` query pair for pages after the first
    pub fn page_url(&self, page_number: u32) -> Url {
        let mut url = self.listing_url.clone();
        if page_number > 1 {
            url.query_pairs_mut()
                .append_pair("page", &page_number.to_string());
        }
        url
    }
}

/// CSS selectors for the parts of a listing and of a product detail view
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    /// Container selector for individual products
    pub product_container: String,
    /// Element carrying the full title in an attribute and the detail link in `href`
    pub title: String,
    /// Attribute of the title element holding the untruncated title
    pub title_attribute: String,
    pub description: String,
    pub price: String,
    /// Element carrying the star rating as a data attribute
    pub rating: String,
    pub rating_attribute: String,
    /// Element whose text starts with the number of reviews
    pub review_count: String,
    /// Pagination container selector
    pub pagination_container: String,
    /// Entries within the pagination container; the last one is the "next" control
    pub pagination_entry: String,
    /// Container of the variant buttons on a detail view
    pub variant_group: String,
    /// Selectable variant control within the group
    pub variant_control: String,
    /// Attribute of a control holding its variant label
    pub variant_label_attribute: String,
    /// Price element on a detail view
    pub detail_price: String,
}

impl Default for SiteSelectors {
    /// Markup of the webscraper.io e-commerce test site
    fn default() -> Self {
        Self {
            product_container: ".card-body".to_string(),
            title: ".title".to_string(),
            title_attribute: "title".to_string(),
            description: ".description".to_string(),
            price: ".price".to_string(),
            rating: "p[data-rating]".to_string(),
            rating_attribute: "data-rating".to_string(),
            review_count: ".review-count".to_string(),
            pagination_container: ".pagination".to_string(),
            pagination_entry: "li".to_string(),
            variant_group: ".swatches".to_string(),
            variant_control: "button".to_string(),
            variant_label_attribute: "value".to_string(),
            detail_price: ".price".to_string(),
        }
    }
}

/// Fetches listing pages
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one page of the listing
    ///
    /// # Arguments
    /// * `page_number` - 1-based page number
    ///
    /// # Returns
    /// * `Result<Page, FetchError>` - The fetched page or a transport error
    async fn fetch_page(&self, page_number: u32) -> Result<Page, FetchError>;
}

/// Opens browser sessions on product detail views
#[async_trait]
pub trait VariantDriver: Send + Sync {
    type Session: VariantSession;

    /// Navigate a fresh session to an absolute detail URL
    async fn open(&self, url: &Url) -> Result<Self::Session, DriverError>;
}

/// A single browser-controlled page view
///
/// `close` consumes the session, so a closed session can never be activated again.
#[async_trait]
pub trait VariantSession: Send {
    /// Variant controls of the variant group, in document order
    async fn controls(&mut self) -> Result<Vec<VariantControl>, DriverError>;

    /// Select a variant, as a user clicking its button would
    async fn activate(&mut self, control: &VariantControl) -> Result<(), DriverError>;

    /// Text of the currently displayed price element
    async fn read_price(&mut self) -> Result<String, DriverError>;

    /// Release the underlying page view
    async fn close(self) -> Result<(), DriverError>;
}

/// Persists extracted records
pub trait RecordSink {
    /// Write a header row followed by one row per record
    fn write(&mut self, records: &[Record]) -> Result<(), SinkError>;
}
