//! Score orchestration: validate, load rules, fetch with fallback, normalize, score.

use crate::cache::{CacheService, MokaCacheService};
use crate::circuit_breaker::{create_provider_circuit_breaker, ProviderCircuitBreaker};
use crate::config::Config;
use crate::errors::{ProviderError, ScoringError};
use crate::events::{EventSink, ServiceEvent, TracingEventSink};
use crate::models::{ProviderId, QualityLevel, ScoreResult, ScoringOptions, ScoringRules};
use crate::normalizer::normalize;
use crate::providers::{
    BcuAdapter, EquifaxAdapter, FetchOptions, MymAdapter, ProviderAdapter, RawProviderPayload,
};
use crate::rules::{DefaultsOnlyRulesSource, JsonFileRulesSource, RulesSource, ScoringRulesProvider};
use crate::scoring::{compute_score, debug_snapshot};
use crate::validator::{clean_document, validate_document};
use chrono::Utc;
use failsafe::futures::CircuitBreaker;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Confidence deducted when the result came from a fallback provider.
const FALLBACK_CONFIDENCE_PENALTY: f64 = 0.1;

/// Where a calculation stands between the primary and secondary fetch.
enum FetchState {
    Primary,
    Secondary {
        primary_error: ProviderError,
    },
    Fetched {
        payload: RawProviderPayload,
        fallback_from: Option<ProviderId>,
    },
    /// Carries the error of the primary provider, whatever the secondary did.
    Failed(ProviderError),
}

pub struct ScoringService {
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
    breakers: HashMap<ProviderId, ProviderCircuitBreaker>,
    rules: Arc<ScoringRulesProvider>,
    events: Arc<dyn EventSink>,
}

impl ScoringService {
    pub fn new(rules: Arc<ScoringRulesProvider>) -> Self {
        Self {
            adapters: HashMap::new(),
            breakers: HashMap::new(),
            rules,
            events: Arc::new(TracingEventSink),
        }
    }

    /// Registers `adapter` under its own id, replacing any previous one.
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        let id = adapter.id();
        self.breakers.insert(id, create_provider_circuit_breaker());
        self.adapters.insert(id, adapter);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Wires the production adapters, caches and rules source from `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let token_cache: Arc<dyn CacheService> = Arc::new(MokaCacheService::new(100));
        let rules_cache: Arc<dyn CacheService> = Arc::new(MokaCacheService::new(10));

        let source: Arc<dyn RulesSource> = match &config.scoring_rules_path {
            Some(path) => Arc::new(JsonFileRulesSource::new(path.clone())),
            None => {
                tracing::warn!("SCORING_RULES_PATH not set, scoring with default rules");
                Arc::new(DefaultsOnlyRulesSource)
            }
        };
        let rules = Arc::new(ScoringRulesProvider::new(source, rules_cache));
        rules.set_strict_mode(config.strict_rules);

        let equifax = EquifaxAdapter::new(config.equifax_settings(), token_cache)?;
        let mym = MymAdapter::new(config.mym_settings())?;

        Ok(Self::new(rules)
            .with_adapter(Arc::new(equifax))
            .with_adapter(Arc::new(mym))
            .with_adapter(Arc::new(BcuAdapter)))
    }

    pub fn rules(&self) -> &ScoringRulesProvider {
        &self.rules
    }

    /// Scores `documento`. Never fails: every error becomes a rejected result.
    ///
    /// On fallback, `options.provider` is rewritten to the provider that
    /// produced the result.
    pub async fn calculate_score(&self, documento: &str, options: &mut ScoringOptions) -> ScoreResult {
        let request_id = Uuid::new_v4();
        tracing::info!(
            %request_id,
            provider = %options.provider,
            "Calculating score"
        );

        let mut result = match self.run(documento, options).await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(%request_id, "Score calculation failed: {}", err);
                let documento = match &err {
                    ScoringError::Validation(_) => documento.trim().to_string(),
                    _ => clean_document(documento),
                };
                ScoreResult::failed(
                    &documento,
                    options.provider,
                    err.rejection_reason(),
                    err.to_error_info(),
                    0.0,
                )
            }
        };

        result.metadata.request_id = Some(request_id);
        result.metadata.calculated_at = Utc::now();

        tracing::info!(
            %request_id,
            provider = %result.metadata.provider,
            final_score = result.final_score,
            rejected = result.is_rejected(),
            "Score calculated"
        );
        result
    }

    async fn run(
        &self,
        documento: &str,
        options: &mut ScoringOptions,
    ) -> Result<ScoreResult, ScoringError> {
        let documento = validate_document(documento)?;
        // Rules first: incomplete strict rules must abort before any provider call.
        let rules = self.rules.get_rules_with(options.strict_rules).await?;

        let fetch_options = FetchOptions {
            force_refresh: options.force_refresh,
        };
        let primary = options.provider;
        let secondary = primary.fallback();

        let mut state = FetchState::Primary;
        loop {
            state = match state {
                FetchState::Primary => match self.fetch(primary, &documento, &fetch_options).await {
                    Ok(payload) => FetchState::Fetched {
                        payload,
                        fallback_from: None,
                    },
                    Err(err) if options.no_fallback => {
                        tracing::warn!("{} failed and fallback is disabled", primary);
                        FetchState::Failed(err)
                    }
                    Err(err) => FetchState::Secondary { primary_error: err },
                },
                FetchState::Secondary { primary_error } => {
                    self.events.record(&ServiceEvent::ProviderFallback {
                        original_provider: primary,
                        fallback_to: secondary,
                        reason: primary_error.code.clone(),
                    });
                    match self.fetch(secondary, &documento, &fetch_options).await {
                        Ok(payload) => {
                            options.provider = secondary;
                            FetchState::Fetched {
                                payload,
                                fallback_from: Some(primary),
                            }
                        }
                        Err(_) => FetchState::Failed(primary_error),
                    }
                }
                FetchState::Fetched {
                    payload,
                    fallback_from,
                } => return self.score(payload, &rules, fallback_from, options.debug),
                FetchState::Failed(err) => return Err(err.into()),
            };
        }
    }

    /// One guarded provider call. Every failure is recorded as an event, but only
    /// outages trip the breaker.
    async fn fetch(
        &self,
        provider: ProviderId,
        documento: &str,
        options: &FetchOptions,
    ) -> Result<RawProviderPayload, ProviderError> {
        let result = match (self.adapters.get(&provider), self.breakers.get(&provider)) {
            (Some(adapter), Some(breaker)) => {
                match breaker
                    .call_with(ProviderError::is_outage, adapter.fetch(documento, options))
                    .await
                {
                    Ok(payload) => Ok(payload),
                    Err(failsafe::Error::Inner(err)) => Err(err),
                    Err(failsafe::Error::Rejected) => Err(ProviderError::prefixed(
                        provider,
                        "CIRCUIT_OPEN",
                        format!("{} circuit breaker is open", provider),
                    )),
                }
            }
            _ => Err(ProviderError::prefixed(
                provider,
                "NOT_CONFIGURED",
                format!("no adapter registered for {}", provider),
            )),
        };

        if let Err(err) = &result {
            tracing::warn!("{} fetch failed: {}", provider, err);
            self.events.record(&ServiceEvent::ProviderFailure {
                provider,
                code: err.code.clone(),
            });
        }
        result
    }

    fn score(
        &self,
        payload: RawProviderPayload,
        rules: &ScoringRules,
        fallback_from: Option<ProviderId>,
        debug: bool,
    ) -> Result<ScoreResult, ScoringError> {
        let report = normalize(payload, &rules.rejection_rules.bad_ratings)?;
        let mut result = compute_score(&report, rules);

        if fallback_from.is_some() {
            let confidence = &mut result.validation.confidence;
            confidence.score = (confidence.score - FALLBACK_CONFIDENCE_PENALTY).max(0.0);
            confidence.level = QualityLevel::from_score(confidence.score);
        }
        result.metadata.fallback_from = fallback_from;
        if debug {
            result.metadata.debug = Some(debug_snapshot(&report));
        }
        Ok(result)
    }
}
