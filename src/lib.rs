//! Product listing scraper
//!
//! Walks a paginated e-commerce listing, turns every product card into a [`models::Record`]
//! and optionally drives a browser to read the price of each storage variant.

pub mod browser;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod pagination;
pub mod product_finder;
pub mod scraper;
pub mod sink;
pub mod traits;
pub mod variants;
