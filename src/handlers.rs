use crate::config::Config;
use crate::errors::AppError;
use crate::models::{ScoreRequest, ScoreResult};
use crate::orchestrator::ScoringService;
use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// Header carrying the provider that finally produced the score.
pub const PROVIDER_HEADER: &str = "x-score-provider";

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Scoring pipeline (adapters, rules, breakers).
    pub service: Arc<ScoringService>,
    /// Application configuration.
    pub config: Config,
}

/// Rejects the request unless it carries the configured `x-api-key`.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = state.config.api_key.as_deref() else {
        return Ok(());
    };
    match headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        Some(provided) if provided == expected => Ok(()),
        Some(_) => Err(AppError::Unauthorized("invalid x-api-key".to_string())),
        None => Err(AppError::Unauthorized("missing x-api-key".to_string())),
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-credit-score",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/v1/score
///
/// Scores a document. Rejections are still HTTP 200: the body says why.
/// Only a missing `documento` is a 400.
pub async fn score_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ScoreRequest>,
) -> Result<Response, AppError> {
    authorize(&state, &headers)?;

    let documento = request
        .documento
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| AppError::BadRequest("documento is required".to_string()))?
        .to_string();

    let mut options = request.options();
    tracing::info!(
        "POST /score - provider: {}, noFallback: {}",
        options.provider,
        options.no_fallback
    );

    let result: ScoreResult = state.service.calculate_score(&documento, &mut options).await;

    let mut response = Json(result).into_response();
    response.headers_mut().insert(
        PROVIDER_HEADER,
        HeaderValue::from_static(options.provider.as_str()),
    );
    Ok(response)
}

/// POST /api/v1/rules/invalidate
pub async fn invalidate_rules(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    authorize(&state, &headers)?;
    state.service.rules().invalidate_cache().await;
    Ok(Json(json!({ "status": "invalidated" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MokaCacheService;
    use crate::providers::EquifaxEnvironment;
    use crate::rules::{DefaultsOnlyRulesSource, ScoringRulesProvider};

    fn state(api_key: Option<&str>) -> Arc<AppState> {
        let rules = Arc::new(ScoringRulesProvider::new(
            Arc::new(DefaultsOnlyRulesSource),
            Arc::new(MokaCacheService::default()),
        ));
        Arc::new(AppState {
            service: Arc::new(ScoringService::new(rules)),
            config: Config {
                port: 3000,
                api_key: api_key.map(String::from),
                equifax_base_url: "http://localhost".to_string(),
                equifax_client_id: "id".to_string(),
                equifax_client_secret: "secret".to_string(),
                equifax_environment: EquifaxEnvironment::Sandbox,
                mym_base_url: "http://localhost".to_string(),
                mym_api_key: "key".to_string(),
                scoring_rules_path: None,
                strict_rules: false,
            },
        })
    }

    fn request(body: serde_json::Value) -> Json<ScoreRequest> {
        Json(serde_json::from_value(body).unwrap())
    }

    #[tokio::test]
    async fn test_missing_documento_is_bad_request() {
        let err = score_document(State(state(None)), HeaderMap::new(), request(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_rejected_score_is_ok_with_provider_header() {
        let response = score_document(
            State(state(None)),
            HeaderMap::new(),
            request(json!({"documento": "12ab", "noFallback": true})),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[PROVIDER_HEADER], "equifax");
    }

    #[tokio::test]
    async fn test_api_key_is_enforced() {
        let err = invalidate_rules(State(state(Some("secret"))), HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("secret"));
        assert!(invalidate_rules(State(state(Some("secret"))), headers)
            .await
            .is_ok());
    }
}
