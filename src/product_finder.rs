use chrono::{DateTime, Utc};
use tracing::{info, warn};
use url::Url;

use crate::error::{ConfigError, ProductError, ScrapeError, SinkError, VariantResolutionError};
use crate::models::Page;
use crate::pagination::PaginationDriver;
use crate::scraper::MalformedProductPolicy;
use crate::traits::{PageFetcher, RecordSink, ScraperConfig, VariantDriver};
use crate::variants::VariantPriceResolver;

/// A product, or one of its variants, whose price could not be resolved
#[derive(Debug)]
pub struct VariantFailure {
    pub title: String,
    pub error: VariantResolutionError,
}

/// Summary of one pipeline run
#[derive(Debug)]
pub struct RunReport {
    pub records_written: usize,
    pub pages_visited: u32,
    pub total_pages: u32,
    pub product_errors: Vec<ProductError>,
    /// Pages dropped as a whole because of a malformed product
    pub rejected_pages: Vec<ProductError>,
    pub variant_errors: Vec<VariantFailure>,
    /// Why pagination stopped early, if it did
    pub fetch_error: Option<ScrapeError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn log_summary(&self) {
        info!(
            "Wrote {} records from {} of {} pages in {}s \
             ({} malformed products, {} rejected pages, {} variant failures)",
            self.records_written,
            self.pages_visited,
            self.total_pages,
            (self.finished_at - self.started_at).num_seconds(),
            self.product_errors.len(),
            self.rejected_pages.len(),
            self.variant_errors.len()
        );
        for rejected in &self.rejected_pages {
            warn!("Rejected page: {}", rejected);
        }
        for failure in &self.variant_errors {
            warn!("Variant price missing for {}: {}", failure.title, failure.error);
        }
        if let Some(e) = &self.fetch_error {
            warn!("Listing incomplete: {}", e);
        }
    }
}

/// Listing → records → (variant prices) → sink
pub struct ProductFinder<F, D> {
    fetcher: F,
    pagination: PaginationDriver,
    resolver: Option<VariantPriceResolver<D>>,
    /// Used for detail links when a page's own URL cannot be parsed
    base_url: Url,
}

impl<F: PageFetcher, D: VariantDriver> ProductFinder<F, D> {
    /// # Arguments
    /// * `resolver` - Variant price resolver; `None` keeps the run static
    pub fn new(
        config: &ScraperConfig,
        fetcher: F,
        policy: MalformedProductPolicy,
        resolver: Option<VariantPriceResolver<D>>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            fetcher,
            pagination: PaginationDriver::new(&config.selectors, policy)?,
            resolver,
            base_url: config.base_url.clone(),
        })
    }

    pub async fn fetch_first_page(&self) -> Result<Page, ScrapeError> {
        self.fetcher
            .fetch_page(1)
            .await
            .map_err(|source| ScrapeError::PageFetch {
                page_number: 1,
                source,
            })
    }

    /// Collect every product of the listing starting from its first page, resolve variant
    /// prices when a resolver is configured, and hand the records to `sink`.
    ///
    /// Records gathered before a pagination failure are still written; the failure is
    /// returned in [`RunReport::fetch_error`]. Only a sink failure fails the run.
    pub async fn run<S: RecordSink>(
        &self,
        first_page: Page,
        sink: &mut S,
    ) -> Result<RunReport, SinkError> {
        let started_at = Utc::now();
        let outcome = self.pagination.collect(&self.fetcher, first_page).await;

        let mut records = Vec::with_capacity(outcome.products.len());
        let mut variant_errors = Vec::new();

        for product in outcome.products {
            let Some(resolver) = &self.resolver else {
                records.push(product.record);
                continue;
            };

            info!("Resolving variant prices for {}", product.record.title);
            let page_url = self.link_base(&product.page_url);
            let record = match resolver
                .resolve_link(&page_url, product.detail_href.as_deref())
                .await
            {
                Ok(resolution) => {
                    variant_errors.extend(resolution.skipped.into_iter().map(|error| {
                        VariantFailure {
                            title: product.record.title.clone(),
                            error,
                        }
                    }));
                    product.record.with_additional_info(resolution.prices)
                }
                Err(error) => {
                    warn!(
                        "Variant resolution failed for {}: {}",
                        product.record.title, error
                    );
                    variant_errors.push(VariantFailure {
                        title: product.record.title.clone(),
                        error,
                    });
                    product.record
                }
            };
            records.push(record);
        }

        sink.write(&records)?;

        Ok(RunReport {
            records_written: records.len(),
            pages_visited: outcome.pages_visited,
            total_pages: outcome.total_pages,
            product_errors: outcome.product_errors,
            rejected_pages: outcome.rejected_pages,
            variant_errors,
            fetch_error: outcome.error,
            started_at,
            finished_at: Utc::now(),
        })
    }

    pub fn into_resolver(self) -> Option<VariantPriceResolver<D>> {
        self.resolver
    }

    fn link_base(&self, page_url: &str) -> Url {
        Url::parse(page_url).unwrap_or_else(|e| {
            warn!("Listing page URL {:?} is invalid ({}); using {}", page_url, e, self.base_url);
            self.base_url.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use super::*;
    use crate::error::FetchError;
    use crate::models::{PriceTable, Record};
    use crate::traits::SiteSelectors;
    use crate::variants::VariantFailurePolicy;
    use crate::variants::tests::ScriptedDriver;

    #[derive(Default)]
    struct MemorySink {
        records: Vec<Record>,
    }

    impl RecordSink for MemorySink {
        fn write(&mut self, records: &[Record]) -> Result<(), SinkError> {
            self.records.extend_from_slice(records);
            Ok(())
        }
    }

    fn card(title: &str, href: Option<&str>) -> String {
        let href = href.map(|h| format!(r#"href="{h}""#)).unwrap_or_default();
        format!(
            r#"<div class="card-body">
                 <h4 class="price">$295.99</h4>
                 <a class="title" {href} title="{title}">{title}</a>
                 <p class="description">14", Celeron N3450</p>
                 <p class="review-count">14 reviews</p>
                 <p data-rating="3"></p>
               </div>"#
        )
    }

    const PAGINATION: &str = r#"<ul class="pagination"><li>1</li><li>2</li><li>›</li></ul>"#;

    /// Two-page listing; the second page can be made unreachable
    struct TwoPages {
        broken: bool,
    }

    #[async_trait]
    impl PageFetcher for TwoPages {
        async fn fetch_page(&self, page_number: u32) -> Result<Page, FetchError> {
            if self.broken && page_number == 2 {
                return Err(FetchError::Status {
                    url: "https://webscraper.io/laptops?page=2".to_string(),
                    status: 500,
                });
            }
            let body = match page_number {
                1 => format!(
                    "{}{}{}",
                    card("Asus VivoBook", Some("/product/31")),
                    card("Packard 255 G2", None),
                    PAGINATION
                ),
                _ => format!(
                    "{}{}",
                    card("Aspire E1-510", Some("product/40")),
                    PAGINATION
                ),
            };
            Ok(Page::new(page_number, "https://webscraper.io/laptops", body))
        }
    }

    fn config() -> ScraperConfig {
        ScraperConfig {
            name: "webscraper.io".to_string(),
            base_url: Url::parse("https://webscraper.io/").unwrap(),
            listing_url: Url::parse("https://webscraper.io/laptops").unwrap(),
            selectors: SiteSelectors::default(),
        }
    }

    #[tokio::test]
    async fn static_run_writes_all_pages() {
        let finder = ProductFinder::<_, ScriptedDriver>::new(
            &config(),
            TwoPages { broken: false },
            MalformedProductPolicy::Skip,
            None,
        )
        .unwrap();
        let mut sink = MemorySink::default();

        let first = finder.fetch_first_page().await.unwrap();
        let report = finder.run(first, &mut sink).await.unwrap();

        let titles: Vec<_> = sink.records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["Asus VivoBook", "Packard 255 G2", "Aspire E1-510"]);
        assert!(sink.records.iter().all(|r| r.additional_info.is_none()));
        assert_eq!(report.records_written, 3);
        assert_eq!(report.pages_visited, 2);
        assert!(report.fetch_error.is_none());
    }

    #[tokio::test]
    async fn dynamic_run_attaches_price_tables() {
        let driver = ScriptedDriver::new(&[
            ("128", false, "$295.99"),
            ("256", false, "$315.99"),
            ("512", true, "$335.99"),
        ]);
        let resolver = VariantPriceResolver::new(driver.clone(), VariantFailurePolicy::default());
        let finder = ProductFinder::new(
            &config(),
            TwoPages { broken: false },
            MalformedProductPolicy::Skip,
            Some(resolver),
        )
        .unwrap();
        let mut sink = MemorySink::default();

        let first = finder.fetch_first_page().await.unwrap();
        let report = finder.run(first, &mut sink).await.unwrap();

        let asus = &sink.records[0];
        assert_eq!(asus.additional_info.as_ref().map(|p| p.len()), Some(2));
        // No detail link, so nothing to open
        assert_eq!(sink.records[1].additional_info, None);
        assert!(sink.records[2].additional_info.is_some());

        assert_eq!(report.variant_errors.len(), 1);
        assert_eq!(report.variant_errors[0].title, "Packard 255 G2");
        assert!(matches!(
            report.variant_errors[0].error,
            VariantResolutionError::MissingDetailLink
        ));
        assert_eq!(
            *driver.opened.lock().unwrap(),
            [
                "https://webscraper.io/product/31",
                "https://webscraper.io/product/40"
            ]
        );
        assert_eq!(driver.closed.load(Ordering::SeqCst), 2);
    }

    /// One listing page served from its own host
    struct SingleListing {
        url: &'static str,
    }

    #[async_trait]
    impl PageFetcher for SingleListing {
        async fn fetch_page(&self, page_number: u32) -> Result<Page, FetchError> {
            Ok(Page::new(
                page_number,
                self.url,
                card("Asus VivoBook", Some("/product/31")),
            ))
        }
    }

    #[tokio::test]
    async fn detail_links_resolve_against_the_listing_host() {
        let driver = ScriptedDriver::new(&[("128", false, "$295.99")]);
        let resolver = VariantPriceResolver::new(driver.clone(), VariantFailurePolicy::default());
        let config = ScraperConfig {
            listing_url: Url::parse("https://shop.example/laptops").unwrap(),
            ..config()
        };
        let finder = ProductFinder::new(
            &config,
            SingleListing {
                url: "https://shop.example/laptops",
            },
            MalformedProductPolicy::Skip,
            Some(resolver),
        )
        .unwrap();
        let mut sink = MemorySink::default();

        let first = finder.fetch_first_page().await.unwrap();
        finder.run(first, &mut sink).await.unwrap();

        assert_eq!(
            *driver.opened.lock().unwrap(),
            ["https://shop.example/product/31"]
        );
        assert!(sink.records[0].additional_info.is_some());
    }

    #[tokio::test]
    async fn skipped_variants_are_reported() {
        let driver = ScriptedDriver::new(&[("128", false, "$295.99"), ("256", false, "$315.99")])
            .failing_on("256");
        let resolver = VariantPriceResolver::new(driver, VariantFailurePolicy::SkipControl);
        let finder = ProductFinder::new(
            &config(),
            SingleListing {
                url: "https://webscraper.io/laptops",
            },
            MalformedProductPolicy::Skip,
            Some(resolver),
        )
        .unwrap();
        let mut sink = MemorySink::default();

        let first = finder.fetch_first_page().await.unwrap();
        let report = finder.run(first, &mut sink).await.unwrap();

        assert_eq!(
            sink.records[0].additional_info,
            Some(PriceTable::from([("128".to_string(), 295.99)]))
        );
        assert_eq!(report.variant_errors.len(), 1);
        assert_eq!(report.variant_errors[0].title, "Asus VivoBook");
        assert!(matches!(
            report.variant_errors[0].error,
            VariantResolutionError::Activate { ref label, .. } if label == "256"
        ));
    }

    #[tokio::test]
    async fn failed_page_still_writes_earlier_records() {
        let finder = ProductFinder::<_, ScriptedDriver>::new(
            &config(),
            TwoPages { broken: true },
            MalformedProductPolicy::Skip,
            None,
        )
        .unwrap();
        let mut sink = MemorySink::default();

        let first = finder.fetch_first_page().await.unwrap();
        let report = finder.run(first, &mut sink).await.unwrap();

        assert_eq!(sink.records.len(), 2);
        assert_eq!(report.records_written, 2);
        assert_eq!(report.pages_visited, 1);
        assert_eq!(report.total_pages, 2);
        assert!(matches!(
            report.fetch_error,
            Some(ScrapeError::PageFetch { page_number: 2, .. })
        ));
    }
}
