use super::{FetchOptions, ProviderAdapter, RawProviderPayload};
use crate::errors::ProviderError;
use crate::models::ProviderId;
use async_trait::async_trait;

/// Placeholder for the central-bank registry. Every fetch fails with `BCU_NOT_IMPLEMENTED`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BcuAdapter;

#[async_trait]
impl ProviderAdapter for BcuAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Bcu
    }

    async fn fetch(
        &self,
        documento: &str,
        _options: &FetchOptions,
    ) -> Result<RawProviderPayload, ProviderError> {
        tracing::info!("BCU adapter called for document {}", documento);
        Err(ProviderError::prefixed(
            ProviderId::Bcu,
            "NOT_IMPLEMENTED",
            "BCU provider is not implemented",
        ))
    }
}
