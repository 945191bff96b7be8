//! Credit-bureau provider adapters.
//!
//! Every adapter performs the network call for one provider and returns its
//! typed raw payload; turning that payload into a `CreditReport` is the
//! normalizer's job.

pub mod bcu;
pub mod coerce;
pub mod equifax;
pub mod mym;

use crate::errors::ProviderError;
use crate::models::ProviderId;
use async_trait::async_trait;

pub use bcu::BcuAdapter;
pub use equifax::{EquifaxAdapter, EquifaxEnvironment, EquifaxPayload, EquifaxSettings};
pub use mym::{MymAdapter, MymPayload, MymSettings};

/// Per-fetch switches derived from `ScoringOptions`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Discard any cached credential before calling the provider.
    pub force_refresh: bool,
}

/// Provider payload handed to the normalizer.
#[derive(Debug, Clone)]
pub enum RawProviderPayload {
    Equifax(EquifaxPayload),
    Mym(MymPayload),
}

impl RawProviderPayload {
    pub fn provider(&self) -> ProviderId {
        match self {
            RawProviderPayload::Equifax(_) => ProviderId::Equifax,
            RawProviderPayload::Mym(_) => ProviderId::Mym,
        }
    }
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    async fn fetch(
        &self,
        documento: &str,
        options: &FetchOptions,
    ) -> Result<RawProviderPayload, ProviderError>;
}

/// Maps a transport-level reqwest failure to a typed provider error.
pub(crate) fn transport_error(provider: ProviderId, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::timeout(provider, err)
    } else {
        ProviderError::network(provider, err)
    }
}

/// Builds the error for a non-success response, consuming its body.
pub(crate) async fn status_error(provider: ProviderId, response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    tracing::error!("{} returned error {}: {}", provider, status, error_text);
    ProviderError::from_status(provider, status, &error_text)
}
