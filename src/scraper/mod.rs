use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use crate::error::{ConfigError, FieldError, ProductError};
use crate::models::{ListedProduct, Page, Record};
use crate::traits::SiteSelectors;

/// What to do with a product whose fields cannot be parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedProductPolicy {
    /// Log the product, leave it out and keep going
    #[default]
    Skip,
    /// Reject the whole page; pagination carries on with the next one
    Abort,
}

/// Products of one page plus the ones that were skipped
#[derive(Debug, Default)]
pub struct PageExtraction {
    pub products: Vec<ListedProduct>,
    pub errors: Vec<ProductError>,
}

/// Turns listing markup into records using CSS selectors
pub struct StaticExtractor {
    product: Selector,
    title: Selector,
    title_attribute: String,
    description: Selector,
    price: Selector,
    rating: Selector,
    rating_attribute: String,
    review_count: Selector,
}

impl StaticExtractor {
    pub fn new(selectors: &SiteSelectors) -> Result<Self, ConfigError> {
        Ok(Self {
            product: parse_selector(&selectors.product_container)?,
            title: parse_selector(&selectors.title)?,
            title_attribute: selectors.title_attribute.clone(),
            description: parse_selector(&selectors.description)?,
            price: parse_selector(&selectors.price)?,
            rating: parse_selector(&selectors.rating)?,
            rating_attribute: selectors.rating_attribute.clone(),
            review_count: parse_selector(&selectors.review_count)?,
        })
    }

    /// One result per product container of `page`, in document order
    ///
    /// `document` must be the parsed body of `page`.
    pub fn products<'a>(
        &'a self,
        document: &'a Html,
        page: &'a Page,
    ) -> impl Iterator<Item = Result<ListedProduct, ProductError>> + 'a {
        document
            .select(&self.product)
            .enumerate()
            .map(move |(index, product)| {
                self.parse_product(product, &page.url)
                    .map_err(|(title, kind)| ProductError {
                        page: page.number,
                        index,
                        title,
                        kind,
                    })
            })
    }

    /// Extract every product of a page, applying `policy` to malformed ones
    pub fn extract_page(
        &self,
        page: &Page,
        policy: MalformedProductPolicy,
    ) -> Result<PageExtraction, ProductError> {
        let document = page.document();
        let mut extraction = PageExtraction::default();

        for result in self.products(&document, page) {
            match result {
                Ok(product) => extraction.products.push(product),
                Err(e) if policy == MalformedProductPolicy::Skip => {
                    warn!("Skipping malformed product: {}", e);
                    extraction.errors.push(e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(extraction)
    }

    fn parse_product(
        &self,
        product: ElementRef<'_>,
        page_url: &str,
    ) -> Result<ListedProduct, (Option<String>, FieldError)> {
        let title_el = product
            .select(&self.title)
            .next()
            .ok_or((None, FieldError::MissingElement { field: "title" }))?;

        // The visible text is ellipsized, the attribute holds the full title
        let title = title_el
            .value()
            .attr(&self.title_attribute)
            .filter(|t| !t.trim().is_empty())
            .ok_or((None, FieldError::MissingTitle))?
            .to_string();

        self.parse_fields(product, title.clone())
            .map(|record| ListedProduct {
                record,
                detail_href: title_el.value().attr("href").map(str::to_string),
                page_url: page_url.to_string(),
            })
            .map_err(|kind| (Some(title), kind))
    }

    fn parse_fields(&self, product: ElementRef<'_>, title: String) -> Result<Record, FieldError> {
        let description = product
            .select(&self.description)
            .next()
            .ok_or(FieldError::MissingElement {
                field: "description",
            })?
            .text()
            .collect::<String>();

        let price_text = product
            .select(&self.price)
            .next()
            .ok_or(FieldError::MissingElement { field: "price" })?
            .text()
            .collect::<String>();

        let rating_raw = product
            .select(&self.rating)
            .next()
            .and_then(|el| el.value().attr(&self.rating_attribute))
            .ok_or(FieldError::MissingRating)?;

        let reviews_text = product
            .select(&self.review_count)
            .next()
            .ok_or(FieldError::MissingElement {
                field: "review_count",
            })?
            .text()
            .collect::<String>();

        Ok(Record {
            title,
            description,
            price: parse_price(&price_text)?,
            rating: parse_rating(rating_raw)?,
            num_of_reviews: parse_review_count(&reviews_text)?,
            additional_info: None,
        })
    }
}

/// Parse a dollar-prefixed price such as `"$101.46"`
pub fn parse_price(raw: &str) -> Result<f64, FieldError> {
    let malformed = || FieldError::MalformedPrice {
        raw: raw.to_string(),
    };

    let price = raw
        .replace('$', "")
        .trim()
        .parse::<f64>()
        .map_err(|_| malformed())?;

    if price.is_finite() && price >= 0.0 {
        Ok(price)
    } else {
        Err(malformed())
    }
}

/// Parse the leading number of a text such as `"12 reviews"`
pub fn parse_review_count(raw: &str) -> Result<u32, FieldError> {
    raw.split_whitespace()
        .next()
        .and_then(|token| token.parse::<u32>().ok())
        .ok_or_else(|| FieldError::MalformedReviewCount {
            raw: raw.to_string(),
        })
}

/// Parse a star rating between 1 and 5
pub fn parse_rating(raw: &str) -> Result<u8, FieldError> {
    raw.trim()
        .parse::<u8>()
        .ok()
        .filter(|rating| (1..=5).contains(rating))
        .ok_or_else(|| FieldError::InvalidRating {
            raw: raw.to_string(),
        })
}

pub(crate) fn parse_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::Selector {
        selector: selector.to_string(),
        message: format!("{e:?}"),
    })
}
