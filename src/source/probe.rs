use super::{FetchError, SourceAdapter};
use crate::ledger::SeenLedger;
use crate::model::{Post, Source, SourceConfig};
use async_trait::async_trait;
use std::sync::Arc;

/// Quota-saving decorator for expensive upstreams.
///
/// Before a full fetch it asks the wrapped adapter for its single latest
/// item; if that item is already in the ledger's seen-set, nothing newer
/// can exist upstream and the full fetch is skipped. The check trades one
/// cheap request against a full page on quiet cycles.
///
/// The probe is advisory only. A probe failure, an empty probe, or a
/// watermark-tracked source (no id set to check) all fall through to the
/// full fetch, so wrapping an adapter can never lose posts.
pub struct QuotaProbe {
    inner: Arc<dyn SourceAdapter>,
    ledger: SeenLedger,
}

impl QuotaProbe {
    pub fn new(inner: Arc<dyn SourceAdapter>, ledger: SeenLedger) -> Self {
        Self { inner, ledger }
    }
}

#[async_trait]
impl SourceAdapter for QuotaProbe {
    fn source(&self) -> Source {
        self.inner.source()
    }

    async fn fetch_posts(&self, config: &SourceConfig) -> Result<Vec<Post>, FetchError> {
        match self.inner.fetch_latest(config).await {
            Ok(Some(latest)) => {
                if self.ledger.contains(self.source(), latest.native_id()).await {
                    tracing::debug!(
                        source = %self.source(),
                        latest = %latest.id,
                        "Latest item already seen, skipping full fetch"
                    );
                    return Ok(Vec::new());
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    source = %self.source(),
                    error = %e,
                    "Probe failed, falling through to full fetch"
                );
            }
        }
        self.inner.fetch_posts(config).await
    }

    async fn fetch_latest(&self, config: &SourceConfig) -> Result<Option<Post>, FetchError> {
        self.inner.fetch_latest(config).await
    }
}
