use super::{coerce, status_error, transport_error, FetchOptions, ProviderAdapter, RawProviderPayload};
use crate::cache::CacheService;
use crate::errors::ProviderError;
use crate::models::ProviderId;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const PROVIDER: ProviderId = ProviderId::Equifax;

/// Equifax deployment the credentials belong to. Tokens are cached per environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EquifaxEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl EquifaxEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquifaxEnvironment::Sandbox => "sandbox",
            EquifaxEnvironment::Production => "production",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Some(EquifaxEnvironment::Sandbox),
            "production" | "prod" => Some(EquifaxEnvironment::Production),
            _ => None,
        }
    }

    /// 50 minutes in sandbox, 24 hours in production.
    pub fn token_ttl(&self) -> Duration {
        match self {
            EquifaxEnvironment::Sandbox => Duration::from_secs(50 * 60),
            EquifaxEnvironment::Production => Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EquifaxSettings {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub environment: EquifaxEnvironment,
}

// ============ Wire DTOs ============

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquifaxScoreRequest {
    pub document_type: String,
    pub document_number: String,
    pub period: EquifaxRequestPeriod,
    pub products: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct EquifaxRequestPeriod {
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct EquifaxTokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquifaxResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub applicants: Option<EquifaxApplicants>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquifaxApplicants {
    #[serde(default)]
    pub primary_consumer: Option<EquifaxConsumer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquifaxConsumer {
    #[serde(default)]
    pub personal_information: Option<EquifaxPersonalInformation>,
    #[serde(default)]
    pub credit_report: Option<EquifaxCreditReport>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquifaxPersonalInformation {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub document_number: Option<String>,
    /// `"S"`/`"N"`, a boolean or `1`/`0` depending on the product version.
    #[serde(default)]
    pub deceased: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquifaxCreditReport {
    #[serde(default)]
    pub current_period: Option<EquifaxPeriod>,
    #[serde(default)]
    pub previous_period: Option<EquifaxPeriod>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquifaxPeriod {
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default, deserialize_with = "coerce::sequence")]
    pub entities: Vec<EquifaxEntity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquifaxEntity {
    #[serde(default)]
    pub entity_name: Option<String>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default, deserialize_with = "coerce::amount")]
    pub current_mn: f64,
    #[serde(default, deserialize_with = "coerce::amount")]
    pub current_me: f64,
    #[serde(default, deserialize_with = "coerce::amount")]
    pub past_due_mn: f64,
    #[serde(default, deserialize_with = "coerce::amount")]
    pub past_due_me: f64,
    #[serde(default, deserialize_with = "coerce::amount")]
    pub charged_off_mn: f64,
    #[serde(default, deserialize_with = "coerce::amount")]
    pub charged_off_me: f64,
    #[serde(default, deserialize_with = "coerce::sequence")]
    pub items: Vec<EquifaxItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquifaxItem {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "coerce::amount")]
    pub mn: f64,
    #[serde(default, deserialize_with = "coerce::amount")]
    pub me: f64,
}

/// Parsed Equifax response plus the transport metadata the normalizer needs.
#[derive(Debug, Clone)]
pub struct EquifaxPayload {
    pub documento: String,
    pub correlation_id: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub response: EquifaxResponse,
}

// ============ Adapter ============

/// OAuth client-credentials adapter for the Equifax scoring API.
pub struct EquifaxAdapter {
    client: Client,
    settings: EquifaxSettings,
    token_cache: Arc<dyn CacheService>,
}

impl EquifaxAdapter {
    pub const TIMEOUT: Duration = Duration::from_secs(15);
    const TOKEN_PATH: &'static str = "/v2/oauth/token";
    const SCORE_PATH: &'static str = "/v1/credit-reports/score";
    const CORRELATION_HEADERS: [&'static str; 2] = ["x-correlation-id", "efx-transaction-id"];

    pub fn new(
        settings: EquifaxSettings,
        token_cache: Arc<dyn CacheService>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|e| ProviderError::network(PROVIDER, format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            settings,
            token_cache,
        })
    }

    pub fn environment(&self) -> EquifaxEnvironment {
        self.settings.environment
    }

    pub fn token_cache_key(&self) -> String {
        format!("equifax:token:{}", self.settings.environment.as_str())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    /// Returns a bearer token, reusing the cached one unless `force_refresh` is set.
    pub async fn access_token(&self, force_refresh: bool) -> Result<String, ProviderError> {
        let key = self.token_cache_key();

        if force_refresh {
            tracing::info!("Equifax token force-refresh requested ({})", key);
            self.token_cache.invalidate(&key).await;
        } else if let Some(token) = self.token_cache.get(&key).await {
            tracing::debug!("Equifax token cache HIT ({})", key);
            return Ok(token);
        }

        let token = self.request_token().await?;
        self.token_cache
            .put(&key, token.clone(), Some(self.settings.environment.token_ttl()))
            .await;
        Ok(token)
    }

    async fn request_token(&self) -> Result<String, ProviderError> {
        tracing::info!(
            "Requesting Equifax access token ({})",
            self.settings.environment.as_str()
        );

        let response = self
            .client
            .post(self.url(Self::TOKEN_PATH))
            .basic_auth(&self.settings.client_id, Some(&self.settings.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(status_error(PROVIDER, response).await);
        }

        let body: EquifaxTokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::parse(PROVIDER, e))?;

        body.access_token
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::prefixed(
                    PROVIDER,
                    "AUTH_ERROR",
                    "token response did not contain an access_token",
                )
            })
    }

    /// Request body for `documento`, keyed by the current year and month.
    pub fn build_request(documento: &str, now: DateTime<Utc>) -> EquifaxScoreRequest {
        EquifaxScoreRequest {
            document_type: "CI".to_string(),
            document_number: documento.to_string(),
            period: EquifaxRequestPeriod {
                year: now.year(),
                month: now.month(),
            },
            products: vec!["T0".to_string(), "T6".to_string()],
        }
    }

    fn correlation_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
        Self::CORRELATION_HEADERS.iter().find_map(|name| {
            headers
                .get(*name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
    }
}

#[async_trait]
impl ProviderAdapter for EquifaxAdapter {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    async fn fetch(
        &self,
        documento: &str,
        options: &FetchOptions,
    ) -> Result<RawProviderPayload, ProviderError> {
        let token = self.access_token(options.force_refresh).await?;
        let now = Utc::now();
        let body = Self::build_request(documento, now);

        tracing::info!("Fetching Equifax report for document: {}", documento);

        let response = self
            .client
            .post(self.url(Self::SCORE_PATH))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = response.status();
        if status.as_u16() != 200 {
            if status.as_u16() == 401 {
                // Token was revoked or expired early.
                self.token_cache.invalidate(&self.token_cache_key()).await;
            }
            return Err(status_error(PROVIDER, response).await);
        }

        let correlation_id = Self::correlation_id(response.headers());
        let parsed: EquifaxResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::parse(PROVIDER, e))?;

        tracing::info!(
            "Successfully fetched Equifax report (correlation id: {:?})",
            correlation_id
        );

        Ok(RawProviderPayload::Equifax(EquifaxPayload {
            documento: documento.to_string(),
            correlation_id,
            fetched_at: now,
            response: parsed,
        }))
    }
}
