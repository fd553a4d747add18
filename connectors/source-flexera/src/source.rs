//! Incremental advisory fetcher.
//!
//! Pages through `GET /api/advisories/` from a background task and hands
//! advisories to the pipeline over a bounded channel, so a slow consumer
//! stops paging instead of buffering the feed.

use std::collections::HashSet;
use std::sync::Arc;

use reqwest::Url;
use tokio::sync::mpsc;
use vulnfeed_sdk::prelude::*;

use crate::client::{HttpTransport, PageTransport};
use crate::config::Config;
use crate::schema::Advisory;

const TOKEN_PREFIX: &str = "Token ";

pub struct FlexeraFetcher {
    config: Config,
    token: Option<String>,
    transport: Arc<dyn PageTransport>,
}

impl FlexeraFetcher {
    /// Fetcher over the real API. A missing `token` is reported by
    /// `fetch_since` as a setup error.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Setup`] if the HTTP client can't be built.
    pub fn new(config: Config, token: Option<String>, http: &HttpConfig) -> Result<Self, FetchError> {
        let transport = HttpTransport::new(http)?;
        Ok(Self::with_transport(config, token, Arc::new(transport)))
    }

    #[must_use]
    pub fn with_transport(
        config: Config,
        token: Option<String>,
        transport: Arc<dyn PageTransport>,
    ) -> Self {
        Self {
            config,
            token,
            transport,
        }
    }

    fn authorization(&self) -> Result<String, FetchError> {
        let token = self
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                FetchError::Setup(format!("please set {} in environment", self.config.token_env))
            })?;
        Ok(authorization_header(token))
    }
}

/// `Authorization` value for an API token, adding the `Token ` scheme when
/// the caller passed a bare secret.
pub(crate) fn authorization_header(token: &str) -> String {
    if token.starts_with(TOKEN_PREFIX) {
        token.to_string()
    } else {
        format!("{TOKEN_PREFIX}{token}")
    }
}

/// First page URL for advisories modified at or after `since`.
pub(crate) fn advisories_url(base: &Url, since: Checkpoint, page_size: u32) -> Result<Url, FetchError> {
    let endpoint = format!("{}/api/advisories/", base.as_str().trim_end_matches('/'));
    let mut url = Url::parse(&endpoint)
        .map_err(|e| FetchError::Setup(format!("invalid base_url '{base}': {e}")))?;
    url.query_pairs_mut()
        .append_pair("modified_date__gte", &since.to_rfc3339())
        .append_pair("page_size", &page_size.to_string());
    Ok(url)
}

#[async_trait]
impl Fetcher for FlexeraFetcher {
    type Record = Advisory;

    async fn fetch_since(
        &self,
        cancel: CancellationToken,
        since: Checkpoint,
    ) -> Result<VendorStream<Advisory>, FetchError> {
        let authorization = self.authorization()?;
        self.config.validate()?;
        let base = self.config.parsed_base_url()?;
        let first = advisories_url(&base, since, self.config.page_size)?;

        let capacity = usize::try_from(self.config.page_size).unwrap_or(1).max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let pager = Pager {
            transport: self.transport.clone(),
            base,
            authorization,
            tx,
            cancel,
        };
        tokio::spawn(pager.run(first));
        Ok(receiver_stream(rx))
    }
}

/// Background paging task. Ends after the last page, the first error, or
/// cancellation; dropping `tx` ends the stream.
struct Pager {
    transport: Arc<dyn PageTransport>,
    base: Url,
    authorization: String,
    tx: mpsc::Sender<Result<Advisory, FetchError>>,
    cancel: CancellationToken,
}

impl Pager {
    async fn run(self, first: Url) {
        if let Err(e) = self.pages(first).await {
            // Receiver may be gone already; nothing left to report to.
            let _ = self.tx.send(Err(e)).await;
        }
    }

    async fn pages(&self, first: Url) -> Result<(), FetchError> {
        let mut seen = HashSet::new();
        let mut next = Some(first);
        let mut page_no = 0u32;
        while let Some(url) = next.take() {
            if !seen.insert(url.to_string()) {
                return Err(FetchError::Response(format!(
                    "pagination loop: {url} was already fetched"
                )));
            }
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            page_no += 1;
            let page = self
                .transport
                .get_page(url.as_str(), &self.authorization, &self.cancel)
                .await?;
            tracing::debug!(
                page = page_no,
                results = page.results.len(),
                total = page.count,
                "Fetched advisory page"
            );

            for advisory in page.results {
                let sent = tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                    sent = self.tx.send(Ok(advisory)) => sent,
                };
                if sent.is_err() {
                    // Consumer stopped; stop paging.
                    return Ok(());
                }
            }

            next = match page.next.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(link) => Some(self.base.join(link).map_err(|e| {
                    FetchError::Response(format!("invalid next link '{link}': {e}"))
                })?),
            };
        }
        Ok(())
    }
}
