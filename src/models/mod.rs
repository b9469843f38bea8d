//! Data models for product records scraped from a listing

use std::collections::BTreeMap;

use scraper::Html;

/// Variant label (e.g. storage size) mapped to the price shown once that variant is selected
pub type PriceTable = BTreeMap<String, f64>;

/// Column order used by every sink. Downstream consumers rely on these positions.
pub const RECORD_FIELDS: [&str; 6] = [
    "title",
    "description",
    "price",
    "rating",
    "num_of_reviews",
    "additional_info",
];

/// One product as it appears on a listing page
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub rating: u8,
    pub num_of_reviews: u32,
    /// Only present when variant resolution ran for this product
    pub additional_info: Option<PriceTable>,
}

impl Record {
    /// Field names in column order, without `additional_info` when it is not exported
    pub fn field_names(with_additional_info: bool) -> &'static [&'static str] {
        if with_additional_info {
            &RECORD_FIELDS
        } else {
            &RECORD_FIELDS[..5]
        }
    }

    /// Attach a resolved price table. The record is otherwise immutable after extraction.
    #[must_use]
    pub fn with_additional_info(mut self, prices: PriceTable) -> Self {
        self.additional_info = Some(prices);
        self
    }
}

/// A record together with the link to its detail view, as found on the listing
#[derive(Debug, Clone, PartialEq)]
pub struct ListedProduct {
    pub record: Record,
    /// Raw `href` of the title element; may be relative to `page_url`
    pub detail_href: Option<String>,
    /// URL of the listing page the product was found on
    pub page_url: String,
}

/// A fetched listing page, owned by whoever fetched it
#[derive(Debug, Clone)]
pub struct Page {
    pub number: u32,
    pub url: String,
    pub body: String,
}

impl Page {
    pub fn new(number: u32, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            number,
            url: url.into(),
            body: body.into(),
        }
    }

    /// Parse the body. The returned document is not `Send`; drop it before the next await.
    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }
}

/// A selectable variant button on a product detail view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantControl {
    /// Position within the variant group, zero-based
    pub position: usize,
    pub label: String,
    /// Out of stock or otherwise not purchasable
    pub disabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_order_is_fixed() {
        assert_eq!(
            Record::field_names(false),
            &["title", "description", "price", "rating", "num_of_reviews"]
        );
        assert_eq!(Record::field_names(true).last(), Some(&"additional_info"));
    }

    #[test]
    fn with_additional_info_keeps_other_fields() {
        let record = Record {
            title: "Asus VivoBook".to_string(),
            description: "15.6\", Core i3".to_string(),
            price: 295.99,
            rating: 3,
            num_of_reviews: 14,
            additional_info: None,
        };

        let prices = PriceTable::from([("128".to_string(), 295.99), ("256".to_string(), 315.99)]);
        let updated = record.clone().with_additional_info(prices.clone());

        assert_eq!(updated.title, record.title);
        assert_eq!(updated.price, record.price);
        assert_eq!(updated.additional_info, Some(prices));
    }
}
