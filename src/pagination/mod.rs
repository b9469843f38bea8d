//! Walks every page of a listing and feeds it to the static extractor

use scraper::{Html, Selector};
use tracing::{error, info, warn};

use crate::error::{ConfigError, ProductError, ScrapeError};
use crate::models::{ListedProduct, Page};
use crate::scraper::{MalformedProductPolicy, StaticExtractor, parse_selector};
use crate::traits::{PageFetcher, SiteSelectors};

/// Everything gathered from a listing, including a possible early stop
#[derive(Debug, Default)]
pub struct PaginationOutcome {
    /// Products of all visited pages, in page order then document order
    pub products: Vec<ListedProduct>,
    /// Page count announced by the first page
    pub total_pages: u32,
    /// Pages fetched and parsed, rejected ones included
    pub pages_visited: u32,
    /// Products skipped under [`MalformedProductPolicy::Skip`]
    pub product_errors: Vec<ProductError>,
    /// Pages dropped as a whole under [`MalformedProductPolicy::Abort`], with the product
    /// that caused it. Traversal continues past them.
    pub rejected_pages: Vec<ProductError>,
    /// Set when traversal stopped before `total_pages`
    pub error: Option<ScrapeError>,
}

impl PaginationOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

pub struct PaginationDriver {
    extractor: StaticExtractor,
    pagination: Selector,
    entry: Selector,
    policy: MalformedProductPolicy,
}

impl PaginationDriver {
    pub fn new(
        selectors: &SiteSelectors,
        policy: MalformedProductPolicy,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            extractor: StaticExtractor::new(selectors)?,
            pagination: parse_selector(&selectors.pagination_container)?,
            entry: parse_selector(&selectors.pagination_entry)?,
            policy,
        })
    }

    /// Number of pages announced by a listing page.
    ///
    /// The last pagination entry is the "next" control, so the total is the label of the
    /// entry before it. Anything that does not fit that shape counts as a single page.
    pub fn page_count(&self, document: &Html) -> u32 {
        let Some(pagination) = document.select(&self.pagination).next() else {
            return 1;
        };

        let labels: Vec<String> = pagination
            .select(&self.entry)
            .map(|entry| entry.text().collect::<String>().trim().to_string())
            .collect();

        let Some(label) = labels.len().checked_sub(2).map(|i| &labels[i]) else {
            warn!(
                "Pagination has {} entries, expected at least 2; assuming a single page",
                labels.len()
            );
            return 1;
        };

        match label.parse::<u32>() {
            Ok(total) if total >= 1 => total,
            _ => {
                warn!(
                    "Pagination entry {:?} is not a page number; assuming a single page",
                    label
                );
                1
            }
        }
    }

    /// Collect products from the already fetched first page and every following page.
    ///
    /// A failed fetch stops traversal; products gathered until then are kept and the
    /// failure is returned in [`PaginationOutcome::error`]. A page rejected by the
    /// extractor only loses its own products.
    pub async fn collect<F>(&self, fetcher: &F, first_page: Page) -> PaginationOutcome
    where
        F: PageFetcher + ?Sized,
    {
        let mut outcome = PaginationOutcome {
            total_pages: self.page_count(&first_page.document()),
            ..PaginationOutcome::default()
        };

        info!("Start parsing page #{} of {}", first_page.number, outcome.total_pages);
        self.absorb(&first_page, &mut outcome);
        drop(first_page);

        for page_number in 2..=outcome.total_pages {
            info!("Start parsing page #{} of {}", page_number, outcome.total_pages);

            let page = match fetcher.fetch_page(page_number).await {
                Ok(page) => page,
                Err(source) => {
                    error!("Failed to fetch page {}: {}", page_number, source);
                    outcome.error = Some(ScrapeError::PageFetch {
                        page_number,
                        source,
                    });
                    break;
                }
            };

            self.absorb(&page, &mut outcome);
        }

        info!(
            "Collected {} products from {} of {} pages",
            outcome.products.len(),
            outcome.pages_visited,
            outcome.total_pages
        );
        outcome
    }

    fn absorb(&self, page: &Page, outcome: &mut PaginationOutcome) {
        outcome.pages_visited += 1;
        match self.extractor.extract_page(page, self.policy) {
            Ok(extraction) => {
                outcome.products.extend(extraction.products);
                outcome.product_errors.extend(extraction.errors);
            }
            Err(e) => {
                error!("Page {} rejected: {}", page.number, e);
                outcome.rejected_pages.push(e);
            }
        }
    }
}
