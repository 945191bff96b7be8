/// Provider adapter tests against mocked upstream APIs
/// Exercises token caching, status mapping and payload coercion over real HTTP
use rust_credit_score::cache::MokaCacheService;
use rust_credit_score::models::ProviderId;
use rust_credit_score::normalizer::normalize;
use rust_credit_score::providers::{
    EquifaxAdapter, EquifaxEnvironment, EquifaxSettings, FetchOptions, MymAdapter, MymSettings,
    ProviderAdapter, RawProviderPayload,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn equifax_adapter(base_url: String) -> EquifaxAdapter {
    EquifaxAdapter::new(
        EquifaxSettings {
            base_url,
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            environment: EquifaxEnvironment::Sandbox,
        },
        Arc::new(MokaCacheService::default()),
    )
    .unwrap()
}

fn mym_adapter(base_url: String) -> MymAdapter {
    MymAdapter::new(MymSettings {
        base_url,
        api_key: "mym-key".to_string(),
    })
    .unwrap()
}

fn equifax_report() -> serde_json::Value {
    json!({
        "status": "OK",
        "applicants": {"primaryConsumer": {
            "personalInformation": {"fullName": "Ana Gomez", "documentNumber": "1234567"},
            "creditReport": {
                "currentPeriod": {"period": "2024-05", "entities": [
                    {"entityName": "Banco Santander", "rating": "1A", "currentMn": 1000}
                ]},
                "previousPeriod": {"period": "2023-11", "entities": []}
            }
        }}
    })
}

async fn mount_token(server: &MockServer, token: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/v2/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": token,
            "expires_in": 3000
        })))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_equifax_token_is_cached_between_fetches() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1", 1).await;

    Mock::given(method("POST"))
        .and(path("/v1/credit-reports/score"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-correlation-id", "corr-42")
                .set_body_json(equifax_report()),
        )
        .expect(2)
        .mount(&server)
        .await;

    let adapter = equifax_adapter(server.uri());
    let options = FetchOptions::default();

    let first = adapter.fetch("1234567", &options).await.unwrap();
    adapter.fetch("1234567", &options).await.unwrap();

    match first {
        RawProviderPayload::Equifax(payload) => {
            assert_eq!(payload.correlation_id.as_deref(), Some("corr-42"));
            assert_eq!(payload.documento, "1234567");
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_equifax_force_refresh_requests_new_token() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1", 2).await;

    Mock::given(method("POST"))
        .and(path("/v1/credit-reports/score"))
        .respond_with(ResponseTemplate::new(200).set_body_json(equifax_report()))
        .mount(&server)
        .await;

    let adapter = equifax_adapter(server.uri());
    adapter
        .fetch("1234567", &FetchOptions::default())
        .await
        .unwrap();
    adapter
        .fetch(
            "1234567",
            &FetchOptions {
                force_refresh: true,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_equifax_status_codes_are_mapped() {
    for (status, code) in [
        (500, "EQUIFAX_SERVER_ERROR"),
        (429, "EQUIFAX_RATE_LIMIT"),
        (418, "EQUIFAX_REJECTED"),
        (502, "EQUIFAX_UNKNOWN_ERROR"),
    ] {
        let server = MockServer::start().await;
        mount_token(&server, "tok-1", 1).await;
        Mock::given(method("POST"))
            .and(path("/v1/credit-reports/score"))
            .respond_with(ResponseTemplate::new(status).set_body_string("upstream says no"))
            .mount(&server)
            .await;

        let err = equifax_adapter(server.uri())
            .fetch("1234567", &FetchOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, code, "status {}", status);
        assert_eq!(err.http_status, Some(status));
        assert_eq!(err.provider, ProviderId::Equifax);
        assert!(err.to_string().contains(code));
    }
}

#[tokio::test]
async fn test_equifax_unauthorized_evicts_cached_token() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1", 2).await;

    Mock::given(method("POST"))
        .and(path("/v1/credit-reports/score"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let adapter = equifax_adapter(server.uri());
    for _ in 0..2 {
        let err = adapter
            .fetch("1234567", &FetchOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, "EQUIFAX_UNAUTHORIZED");
    }
}

#[tokio::test]
async fn test_equifax_token_failure_is_typed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token_type": "bearer"})))
        .mount(&server)
        .await;

    let err = equifax_adapter(server.uri())
        .fetch("1234567", &FetchOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, "EQUIFAX_AUTH_ERROR");
}

#[tokio::test]
async fn test_mym_embedded_documents_are_coerced() {
    let server = MockServer::start().await;

    let t0 = json!({
        "nombre": "Luis Perez",
        "entidades": {
            "0": {"entidad": "Creditel", "calificacion": "2A", "vigente": {"mn": "12.500,00"}},
            "1": {"entidad": "BROU", "calificacion": "1A", "vencido": {"mn": 100}}
        }
    });

    Mock::given(method("GET"))
        .and(path("/api/v1/consultas/1234567"))
        .and(header("x-api-key", "mym-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "t0": t0.to_string(),
            "t6": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = mym_adapter(server.uri())
        .fetch("1234567", &FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(payload.provider(), ProviderId::Mym);

    let report = normalize(payload, &["4".to_string(), "5".to_string()]).unwrap();
    assert_eq!(report.periods.t0.entities.len(), 2);
    assert_eq!(report.periods.t0.entities[0].name, "CREDITEL");
    assert_eq!(report.periods.t0.aggregates.vigente, 12_500.0);
    assert_eq!(report.periods.t0.aggregates.vencido, 100.0);
    assert_eq!(report.metadata.worst_rating.as_deref(), Some("2A"));
    assert!(report.periods.t6.is_empty());
    assert_eq!(report.metadata.nombre.as_deref(), Some("LUIS PEREZ"));
}

#[tokio::test]
async fn test_mym_not_found_reads_flat_arrays() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/consultas/1234567"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "t0": json!({"error": {"code": 404, "message": "Not found"}}).to_string(),
            "t6": null,
            "entidades_t0": [{"entidad": "OCA", "calificacion": "1C"}],
            "entidades_t6": [{"entidad": "OCA", "calificacion": "1A"}]
        })))
        .mount(&server)
        .await;

    let payload = mym_adapter(server.uri())
        .fetch("1234567", &FetchOptions::default())
        .await
        .unwrap();
    match payload {
        RawProviderPayload::Mym(payload) => {
            assert_eq!(payload.t0.len(), 1);
            assert_eq!(payload.t6.len(), 1);
        }
        other => panic!("unexpected payload: {:?}", other),
    }
}

#[tokio::test]
async fn test_mym_empty_data() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/consultas/1234567"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "t0": json!({"error": {"code": "404"}}).to_string(),
            "t6": false
        })))
        .mount(&server)
        .await;

    let err = mym_adapter(server.uri())
        .fetch("1234567", &FetchOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, "MYM_EMPTY_DATA");
}

#[tokio::test]
async fn test_mym_http_errors_are_mapped() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/consultas/1234567"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = mym_adapter(server.uri())
        .fetch("1234567", &FetchOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, "MYM_UNAVAILABLE");
    assert_eq!(err.http_status, Some(503));
}
