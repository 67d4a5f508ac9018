pub mod datadog;

pub use datadog::DatadogClient;

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, error};

use crate::error::{HarvestError, Result};
use crate::translate::TranslatedSeries;

/// Entries per submitted page; keeps each payload under the intake size ceiling.
pub const PAGE_SIZE: usize = 100;

/// Time box for a single page.
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivery target for one harvest cycle's series.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn submit(&self, series: Vec<TranslatedSeries>) -> Result<()>;
}

/// Wire-level submission of a single page.
#[async_trait]
pub trait PageClient: Send + Sync {
    /// Submit one page; returns the error list embedded in the response.
    async fn submit_page(&self, page: Vec<TranslatedSeries>) -> Result<Vec<String>>;
}

/// Split `items` into consecutive pages of at most `size` entries.
pub fn paginate<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut pages = Vec::with_capacity(items.len().div_ceil(size));
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        pages.push(items.by_ref().take(size).collect());
    }
    pages
}

/// A [`Sink`] that submits every page concurrently and fails if any page fails.
///
/// All pages run to completion before an error is returned; the error of the
/// lowest-numbered failing page is reported.
pub struct PagedSink<C> {
    client: C,
    page_size: usize,
    page_timeout: Duration,
}

impl<C: PageClient> PagedSink<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            page_size: PAGE_SIZE,
            page_timeout: PAGE_TIMEOUT,
        }
    }

    async fn submit_one(
        &self,
        index: usize,
        page: Vec<TranslatedSeries>,
    ) -> Result<()> {
        let entries = page.len();
        let call = self.client.submit_page(page);
        match tokio::time::timeout(self.page_timeout, call).await {
            Err(_) => Err(HarvestError::SubmissionFailed(format!(
                "page {index}: {}",
                HarvestError::Timeout(self.page_timeout)
            ))),
            Ok(Err(e)) => {
                Err(HarvestError::SubmissionFailed(format!("page {index}: {e}")))
            }
            Ok(Ok(errors)) if !errors.is_empty() => {
                Err(HarvestError::SubmissionFailed(format!(
                    "page {index} rejected: {}",
                    errors.join("; ")
                )))
            }
            Ok(Ok(_)) => {
                debug!(page = index, entries, "page submitted");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<C: PageClient> Sink for PagedSink<C> {
    async fn submit(&self, series: Vec<TranslatedSeries>) -> Result<()> {
        let pages = paginate(series, self.page_size);
        let total = pages.len();

        let results = join_all(
            pages
                .into_iter()
                .enumerate()
                .map(|(index, page)| self.submit_one(index, page)),
        )
        .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            error!(failed, total, "pages failed to submit");
        }
        results.into_iter().collect()
    }
}
