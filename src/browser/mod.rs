//! Chromium-backed variant sessions
//!
//! The browser is launched (or connected to) on the first `open`, so static runs never
//! start Chrome. Each session is one tab; closing the session closes the tab.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::StreamExt;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::DriverError;
use crate::models::VariantControl;
use crate::traits::{SiteSelectors, VariantDriver, VariantSession};

/// How to reach a browser and how long to let it work
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Attach to a running Chrome instead of launching one
    pub remote_debugging_url: Option<String>,
    pub request_timeout: Duration,
    /// Pause after clicking a variant so the page can update its price
    pub settle_delay: Duration,
}

#[derive(Debug, Clone)]
struct DetailSelectors {
    group: String,
    control: String,
    label_attribute: String,
    price: String,
}

pub struct ChromiumDriver {
    settings: BrowserSettings,
    selectors: DetailSelectors,
    browser: OnceCell<Browser>,
    handler: Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumDriver {
    pub fn new(settings: BrowserSettings, selectors: &SiteSelectors) -> Self {
        Self {
            settings,
            selectors: DetailSelectors {
                group: selectors.variant_group.clone(),
                control: selectors.variant_control.clone(),
                label_attribute: selectors.variant_label_attribute.clone(),
                price: selectors.detail_price.clone(),
            },
            browser: OnceCell::new(),
            handler: Mutex::new(None),
        }
    }

    async fn browser(&self) -> Result<&Browser, DriverError> {
        self.browser
            .get_or_try_init(|| async {
                let remote = self.settings.remote_debugging_url.as_deref();
                let (browser, mut handler) = if let Some(url) = remote {
                    info!("Connecting to remote Chrome instance at: {}", url);
                    Browser::connect(url).await?
                } else {
                    info!("Launching headless Chrome");
                    let config = BrowserConfig::builder()
                        .no_sandbox()
                        .request_timeout(self.settings.request_timeout)
                        .arg("--disable-gpu")
                        .arg("--disable-dev-shm-usage")
                        .build()
                        .map_err(DriverError::Browser)?;
                    Browser::launch(config).await?
                };

                // Browser events must be polled for any command to complete
                let task = tokio::spawn(async move {
                    while let Some(event) = handler.next().await {
                        if event.is_err() {
                            break;
                        }
                    }
                });
                if let Ok(mut slot) = self.handler.lock() {
                    *slot = Some(task);
                }

                Ok::<_, DriverError>(browser)
            })
            .await
    }

    /// Close the browser if it was ever started
    pub async fn shutdown(self) -> Result<(), DriverError> {
        let handler = self.handler.lock().ok().and_then(|mut slot| slot.take());

        if let Some(mut browser) = self.browser.into_inner() {
            info!("Closing browser");
            browser.close().await?;
            if let Err(e) = browser.wait().await {
                warn!("Browser process did not exit cleanly: {}", e);
            }
        }

        if let Some(task) = handler {
            task.abort();
        }
        Ok(())
    }
}

#[async_trait]
impl VariantDriver for ChromiumDriver {
    type Session = ChromiumSession;

    async fn open(&self, url: &Url) -> Result<ChromiumSession, DriverError> {
        let browser = self.browser().await?;

        debug!("Opening {}", url);
        let page = browser.new_page(url.as_str()).await?;
        page.wait_for_navigation().await?;

        Ok(ChromiumSession {
            page: Some(page),
            selectors: self.selectors.clone(),
            settle_delay: self.settings.settle_delay,
        })
    }
}

/// One browser tab showing a product detail view
pub struct ChromiumSession {
    page: Option<Page>,
    selectors: DetailSelectors,
    settle_delay: Duration,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page, DriverError> {
        self.page.as_ref().ok_or(DriverError::Closed)
    }

    async fn find(&self, selector: &str) -> Result<Element, DriverError> {
        self.page()?
            .find_element(selector)
            .await
            .map_err(|_| DriverError::ElementNotFound {
                selector: selector.to_string(),
            })
    }

    async fn control_elements(&self) -> Result<Vec<Element>, DriverError> {
        let group = self.find(&self.selectors.group).await?;
        Ok(group.find_elements(&self.selectors.control).await?)
    }
}

#[async_trait]
impl VariantSession for ChromiumSession {
    async fn controls(&mut self) -> Result<Vec<VariantControl>, DriverError> {
        let mut controls = Vec::new();

        for (position, element) in self.control_elements().await?.into_iter().enumerate() {
            let label = match element.attribute(&self.selectors.label_attribute).await? {
                Some(value) => value,
                None => element.inner_text().await?.unwrap_or_default(),
            };
            let disabled = element.attribute("disabled").await?.is_some();

            controls.push(VariantControl {
                position,
                label: label.trim().to_string(),
                disabled,
            });
        }

        Ok(controls)
    }

    async fn activate(&mut self, control: &VariantControl) -> Result<(), DriverError> {
        let element = self
            .control_elements()
            .await?
            .into_iter()
            .nth(control.position)
            .ok_or(DriverError::StaleControl {
                position: control.position,
            })?;

        element.click().await?;
        tokio::time::sleep(self.settle_delay).await;
        Ok(())
    }

    async fn read_price(&mut self) -> Result<String, DriverError> {
        let price = self.find(&self.selectors.price).await?;
        Ok(price.inner_text().await?.unwrap_or_default())
    }

    async fn close(mut self) -> Result<(), DriverError> {
        let page = self.page.take().ok_or(DriverError::Closed)?;
        page.close().await?;
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        // Only reached when the owning task was cancelled before `close`
        if let Some(page) = self.page.take() {
            warn!("Browser session dropped without close; closing in background");
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    let _ = page.close().await;
                });
            }
        }
    }
}
