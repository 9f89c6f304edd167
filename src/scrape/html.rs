//! Static HTML Backend
//!
//! A [`Browser`] that fetches documents over http(s) with `reqwest` (or
//! reads them from `file://` urls) and evaluates CSS selectors with
//! `scraper`. There is no script execution: a document is ready as soon as
//! its body has arrived.
//!
//! Parsing runs on the blocking thread pool, so a deadline around a query
//! is honored even while a large document is being parsed.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use scraper::{Html, Selector};

use super::browser::{Browser, Page, BLANK_PAGE};
use crate::error::BrowserError;
use crate::{APP_NAME, VERSION};

static USER_AGENT: Lazy<String> = Lazy::new(|| format!("{}/{}", APP_NAME, VERSION));

/// Maximum redirects followed per navigation.
const MAX_REDIRECTS: usize = 5;

/// Browser backed by a shared HTTP client.
#[derive(Clone)]
pub struct HttpBrowser {
    client: reqwest::Client,
}

impl HttpBrowser {
    /// Creates a browser with its own HTTP client.
    pub fn new() -> Result<Self, BrowserError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT.as_str())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;

        Ok(Self { client })
    }

    /// Creates a browser around an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    type Page = HtmlPage;

    async fn open_page(&self) -> Result<HtmlPage, BrowserError> {
        Ok(HtmlPage {
            client: self.client.clone(),
            document: None,
        })
    }
}

/// A page holding the body of the last fetched document.
pub struct HtmlPage {
    client: reqwest::Client,
    document: Option<Arc<str>>,
}

/// Text snapshot of a matched element, whitespace collapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlElement {
    text: String,
}

impl HtmlPage {
    async fn fetch(&self, url: &str) -> Result<String, BrowserError> {
        if url == BLANK_PAGE {
            return Ok(String::new());
        }

        if let Some(path) = url.strip_prefix("file://") {
            return Ok(tokio::fs::read_to_string(path).await?);
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(BrowserError::Http {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
            return Ok(response.text().await?);
        }

        Err(BrowserError::UnsupportedUrl(url.to_string()))
    }
}

#[async_trait]
impl Page for HtmlPage {
    type Element = HtmlElement;

    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.document = None;
        let body = self.fetch(url).await?;
        self.document = Some(Arc::from(body));
        Ok(())
    }

    async fn wait_ready(&mut self) -> Result<(), BrowserError> {
        match self.document {
            Some(_) => Ok(()),
            None => Err(BrowserError::NotLoaded),
        }
    }

    async fn query_all(&mut self, selector: &str) -> Result<Vec<HtmlElement>, BrowserError> {
        let document = self.document.clone().ok_or(BrowserError::NotLoaded)?;
        let selector = selector.to_string();
        tokio::task::spawn_blocking(move || select(&document, &selector))
            .await
            .map_err(|e| BrowserError::Other(format!("query task failed: {}", e)))?
    }

    async fn text(&mut self, element: &HtmlElement) -> Result<String, BrowserError> {
        Ok(element.text.clone())
    }
}

/// Parses `html` and returns text snapshots of every element matching
/// `selector`. `Html` is not `Send`, so it never outlives this call.
fn select(html: &str, selector: &str) -> Result<Vec<HtmlElement>, BrowserError> {
    let parsed = Selector::parse(selector).map_err(|e| BrowserError::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{:?}", e),
    })?;

    let document = Html::parse_document(html);
    Ok(document
        .select(&parsed)
        .map(|element| HtmlElement {
            text: collapse_whitespace(&element.text().collect::<String>()),
        })
        .collect())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
