//! Advisory API transport.

use vulnfeed_sdk::prelude::*;

use crate::schema::AdvisoryPage;

/// Fetches one page of advisories. Abstracted so the paging logic can be
/// driven without a network.
#[async_trait]
pub trait PageTransport: Send + Sync {
    async fn get_page(
        &self,
        url: &str,
        authorization: &str,
        cancel: &CancellationToken,
    ) -> Result<AdvisoryPage, FetchError>;
}

/// Retrying HTTP transport.
pub struct HttpTransport {
    client: HttpClient,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns [`FetchError::Setup`] if the HTTP client can't be built.
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        Ok(Self {
            client: HttpClient::new(config)?,
        })
    }
}

#[async_trait]
impl PageTransport for HttpTransport {
    async fn get_page(
        &self,
        url: &str,
        authorization: &str,
        cancel: &CancellationToken,
    ) -> Result<AdvisoryPage, FetchError> {
        self.client
            .get_json(
                url,
                &[
                    ("authorization", authorization),
                    ("accept", "application/json"),
                ],
                cancel,
            )
            .await
    }
}
