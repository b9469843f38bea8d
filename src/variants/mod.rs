//! Resolves per-variant prices on a product detail view
//!
//! A session moves through `open → (activate → read price)* → close`. The resolver always
//! closes the session it opened, whether the controls resolved or not, and `close` takes
//! the session by value so it cannot run twice or be followed by another activation.

use tracing::{debug, warn};
use url::Url;

use crate::error::VariantResolutionError;
use crate::models::{PriceTable, VariantControl};
use crate::scraper::parse_price;
use crate::traits::{VariantDriver, VariantSession};

/// What to do when one variant cannot be activated or priced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VariantFailurePolicy {
    /// Give up on the product; it keeps no price table at all
    #[default]
    AbortProduct,
    /// Log the variant, leave it out of the table and continue
    SkipControl,
}

/// Prices read from one detail view
#[derive(Debug, Default)]
pub struct VariantResolution {
    pub prices: PriceTable,
    /// Variants left out under [`VariantFailurePolicy::SkipControl`], in document order
    pub skipped: Vec<VariantResolutionError>,
}

pub struct VariantPriceResolver<D> {
    driver: D,
    policy: VariantFailurePolicy,
}

impl<D: VariantDriver> VariantPriceResolver<D> {
    pub fn new(driver: D, policy: VariantFailurePolicy) -> Self {
        Self { driver, policy }
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Resolve the prices behind a detail link taken from a listing page
    ///
    /// # Arguments
    /// * `page_url` - URL of the listing page the link was found on
    /// * `detail_href` - `href` of the product's title link, if it had one
    pub async fn resolve_link(
        &self,
        page_url: &Url,
        detail_href: Option<&str>,
    ) -> Result<VariantResolution, VariantResolutionError> {
        let href = detail_href.ok_or(VariantResolutionError::MissingDetailLink)?;
        let url = page_url
            .join(href)
            .map_err(|source| VariantResolutionError::InvalidDetailUrl {
                href: href.to_string(),
                source,
            })?;

        self.resolve(&url).await
    }

    /// Map every enabled variant label on the detail view at `url` to its price
    pub async fn resolve(&self, url: &Url) -> Result<VariantResolution, VariantResolutionError> {
        let mut session = self
            .driver
            .open(url)
            .await
            .map_err(|source| VariantResolutionError::Open {
                url: url.to_string(),
                source,
            })?;

        let result = self.resolve_controls(&mut session).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close browser session for {}: {}", url, e);
        }

        result
    }

    async fn resolve_controls(
        &self,
        session: &mut D::Session,
    ) -> Result<VariantResolution, VariantResolutionError> {
        let controls = session
            .controls()
            .await
            .map_err(VariantResolutionError::Controls)?;

        let mut resolution = VariantResolution::default();
        for control in controls {
            if control.disabled {
                debug!("Skipping unavailable variant {}", control.label);
                continue;
            }

            match Self::price_of(session, &control).await {
                Ok(price) => {
                    resolution.prices.insert(control.label, price);
                }
                Err(e) if self.policy == VariantFailurePolicy::SkipControl => {
                    warn!("Skipping variant: {}", e);
                    resolution.skipped.push(e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(resolution)
    }

    async fn price_of(
        session: &mut D::Session,
        control: &VariantControl,
    ) -> Result<f64, VariantResolutionError> {
        session
            .activate(control)
            .await
            .map_err(|source| VariantResolutionError::Activate {
                label: control.label.clone(),
                source,
            })?;

        let text = session
            .read_price()
            .await
            .map_err(|source| VariantResolutionError::ReadPrice {
                label: control.label.clone(),
                source,
            })?;

        parse_price(&text).map_err(|source| VariantResolutionError::ParsePrice {
            label: control.label.clone(),
            source,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::error::DriverError;

    /// Detail view with a fixed set of variant buttons
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedDriver {
        controls: Vec<(String, bool, String)>,
        fail_activation: Option<String>,
        fail_open: bool,
        pub(crate) opened: Arc<Mutex<Vec<String>>>,
        pub(crate) closed: Arc<AtomicUsize>,
        pub(crate) activated: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedDriver {
        /// `(label, disabled, price text)` per control, in document order
        pub(crate) fn new(controls: &[(&str, bool, &str)]) -> Self {
            Self {
                controls: controls
                    .iter()
                    .map(|(label, disabled, price)| {
                        (label.to_string(), *disabled, price.to_string())
                    })
                    .collect(),
                ..Self::default()
            }
        }

        pub(crate) fn failing_on(mut self, label: &str) -> Self {
            self.fail_activation = Some(label.to_string());
            self
        }

        pub(crate) fn unreachable(mut self) -> Self {
            self.fail_open = true;
            self
        }
    }

    pub(crate) struct ScriptedSession {
        driver: ScriptedDriver,
        prices: HashMap<String, String>,
        shown: String,
    }

    #[async_trait]
    impl VariantDriver for ScriptedDriver {
        type Session = ScriptedSession;

        async fn open(&self, url: &Url) -> Result<ScriptedSession, DriverError> {
            if self.fail_open {
                return Err(DriverError::Browser("net::ERR_CONNECTION_REFUSED".to_string()));
            }
            self.opened.lock().unwrap().push(url.to_string());
            Ok(ScriptedSession {
                driver: self.clone(),
                prices: self
                    .controls
                    .iter()
                    .map(|(label, _, price)| (label.clone(), price.clone()))
                    .collect(),
                shown: "$0.00".to_string(),
            })
        }
    }

    #[async_trait]
    impl VariantSession for ScriptedSession {
        async fn controls(&mut self) -> Result<Vec<VariantControl>, DriverError> {
            Ok(self
                .driver
                .controls
                .iter()
                .enumerate()
                .map(|(position, (label, disabled, _))| VariantControl {
                    position,
                    label: label.clone(),
                    disabled: *disabled,
                })
                .collect())
        }

        async fn activate(&mut self, control: &VariantControl) -> Result<(), DriverError> {
            if self.driver.fail_activation.as_deref() == Some(control.label.as_str()) {
                return Err(DriverError::StaleControl {
                    position: control.position,
                });
            }
            self.driver.activated.lock().unwrap().push(control.label.clone());
            self.shown = self.prices[&control.label].clone();
            Ok(())
        }

        async fn read_price(&mut self) -> Result<String, DriverError> {
            Ok(self.shown.clone())
        }

        async fn close(self) -> Result<(), DriverError> {
            self.driver.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn detail_url() -> Url {
        Url::parse("https://webscraper.io/test-sites/e-commerce/static/product/31").unwrap()
    }

    fn storage_variants() -> ScriptedDriver {
        ScriptedDriver::new(&[
            ("128", false, "$295.99"),
            ("256", false, "$315.99"),
            ("512", false, "$335.99"),
            ("1024", true, "$355.99"),
        ])
    }

    #[tokio::test]
    async fn disabled_variants_are_never_activated() {
        let driver = storage_variants();
        let resolver = VariantPriceResolver::new(driver.clone(), VariantFailurePolicy::default());

        let prices = resolver.resolve(&detail_url()).await.unwrap().prices;

        assert_eq!(prices.len(), 3);
        assert_eq!(prices["128"], 295.99);
        assert_eq!(prices["256"], 315.99);
        assert_eq!(prices["512"], 335.99);
        assert!(!prices.contains_key("1024"));
        assert_eq!(*driver.activated.lock().unwrap(), ["128", "256", "512"]);
        assert_eq!(driver.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn activation_failure_aborts_and_closes_once() {
        let driver = storage_variants().failing_on("256");
        let resolver =
            VariantPriceResolver::new(driver.clone(), VariantFailurePolicy::AbortProduct);

        let error = resolver.resolve(&detail_url()).await.unwrap_err();

        assert!(matches!(
            error,
            VariantResolutionError::Activate { ref label, .. } if label == "256"
        ));
        assert_eq!(*driver.activated.lock().unwrap(), ["128"]);
        assert_eq!(driver.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skip_policy_leaves_out_failed_variant() {
        let driver = storage_variants().failing_on("256");
        let resolver = VariantPriceResolver::new(driver.clone(), VariantFailurePolicy::SkipControl);

        let resolution = resolver.resolve(&detail_url()).await.unwrap();

        assert_eq!(resolution.prices.keys().collect::<Vec<_>>(), ["128", "512"]);
        assert_eq!(resolution.skipped.len(), 1);
        assert!(matches!(
            resolution.skipped[0],
            VariantResolutionError::Activate { ref label, .. } if label == "256"
        ));
        assert_eq!(driver.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unparseable_price_is_a_resolution_error() {
        let driver = ScriptedDriver::new(&[("128", false, "Out of stock")]);
        let resolver =
            VariantPriceResolver::new(driver.clone(), VariantFailurePolicy::AbortProduct);

        let error = resolver.resolve(&detail_url()).await.unwrap_err();

        assert!(matches!(error, VariantResolutionError::ParsePrice { .. }));
        assert_eq!(driver.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_variants_disabled_gives_empty_table() {
        let driver = ScriptedDriver::new(&[("128", true, "$1.00"), ("256", true, "$2.00")]);
        let resolver = VariantPriceResolver::new(driver.clone(), VariantFailurePolicy::default());

        let resolution = resolver.resolve(&detail_url()).await.unwrap();

        assert!(resolution.prices.is_empty());
        assert!(resolution.skipped.is_empty());
        assert_eq!(driver.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_open_has_nothing_to_close() {
        let driver = storage_variants().unreachable();
        let resolver = VariantPriceResolver::new(driver.clone(), VariantFailurePolicy::default());

        let error = resolver.resolve(&detail_url()).await.unwrap_err();

        assert!(matches!(error, VariantResolutionError::Open { .. }));
        assert_eq!(driver.closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn relative_links_resolve_against_listing_page() {
        let driver = storage_variants();
        let resolver = VariantPriceResolver::new(driver.clone(), VariantFailurePolicy::default());
        let page =
            Url::parse("https://webscraper.io/test-sites/e-commerce/static/computers/laptops")
                .unwrap();

        resolver
            .resolve_link(&page, Some("/test-sites/e-commerce/static/product/31"))
            .await
            .unwrap();
        resolver
            .resolve_link(&page, Some("../product/32"))
            .await
            .unwrap();

        assert_eq!(
            *driver.opened.lock().unwrap(),
            [
                "https://webscraper.io/test-sites/e-commerce/static/product/31",
                "https://webscraper.io/test-sites/e-commerce/static/product/32"
            ]
        );

        let missing = resolver.resolve_link(&page, None).await.unwrap_err();
        assert!(matches!(missing, VariantResolutionError::MissingDetailLink));
    }
}
