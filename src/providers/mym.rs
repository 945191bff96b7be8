use super::{coerce, status_error, transport_error, FetchOptions, ProviderAdapter, RawProviderPayload};
use crate::errors::ProviderError;
use crate::models::ProviderId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const PROVIDER: ProviderId = ProviderId::Mym;

#[derive(Debug, Clone)]
pub struct MymSettings {
    pub base_url: String,
    pub api_key: String,
}

// ============ Wire DTOs ============

/// Top-level MYM response. `t0`/`t6` are separately encoded JSON documents;
/// `entidades_t0`/`entidades_t6` are flat copies some deployments also send.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MymEnvelope {
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub fallecido: Option<Value>,
    #[serde(default)]
    pub t0: Value,
    #[serde(default)]
    pub t6: Value,
    #[serde(default, deserialize_with = "coerce::sequence")]
    pub entidades_t0: Vec<MymEntity>,
    #[serde(default, deserialize_with = "coerce::sequence")]
    pub entidades_t6: Vec<MymEntity>,
}

/// One embedded period document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MymDocument {
    #[serde(default)]
    pub error: Option<MymDocumentError>,
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub fallecido: Option<Value>,
    #[serde(default, deserialize_with = "coerce::sequence")]
    pub entidades: Vec<MymEntity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MymDocumentError {
    #[serde(default)]
    pub code: Value,
    #[serde(default)]
    pub message: Option<String>,
}

impl MymDocumentError {
    /// Numeric error code; upstream sends either `404` or `"404"`.
    pub fn code(&self) -> Option<i64> {
        match &self.code {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MymAmount {
    #[serde(default, deserialize_with = "coerce::amount")]
    pub mn: f64,
    #[serde(default, deserialize_with = "coerce::amount")]
    pub me: f64,
}

impl MymAmount {
    pub fn total(&self) -> f64 {
        self.mn + self.me
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MymRubro {
    #[serde(default)]
    pub rubro: Option<String>,
    #[serde(default, deserialize_with = "coerce::amount")]
    pub mn: f64,
    #[serde(default, deserialize_with = "coerce::amount")]
    pub me: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MymEntity {
    #[serde(default)]
    pub entidad: Option<String>,
    #[serde(default)]
    pub calificacion: Option<String>,
    #[serde(default)]
    pub vigente: MymAmount,
    #[serde(default)]
    pub vencido: MymAmount,
    #[serde(default)]
    pub castigado: MymAmount,
    #[serde(default, deserialize_with = "coerce::sequence")]
    pub rubros: Vec<MymRubro>,
}

/// Both MYM periods, decoded and coerced into real sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct MymPayload {
    pub documento: String,
    pub nombre: Option<String>,
    pub is_deceased: bool,
    pub fetched_at: DateTime<Utc>,
    pub t0: Vec<MymEntity>,
    pub t6: Vec<MymEntity>,
}

/// How an embedded period document resolved.
enum EmbeddedPeriod {
    Absent,
    NotFound,
    Document(MymDocument),
}

/// Decodes an embedded period document, re-parsing JSON strings (possibly
/// double-encoded). `null`, `false` and empty strings mean "absent".
fn parse_embedded(value: Value, label: &str) -> Result<EmbeddedPeriod, ProviderError> {
    let mut current = value;
    for _ in 0..3 {
        match current {
            Value::Null | Value::Bool(false) => return Ok(EmbeddedPeriod::Absent),
            Value::String(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() || trimmed == "false" || trimmed == "null" {
                    return Ok(EmbeddedPeriod::Absent);
                }
                current = serde_json::from_str(trimmed).map_err(|e| {
                    ProviderError::parse(PROVIDER, format!("embedded {} document: {}", label, e))
                })?;
            }
            Value::Object(_) => {
                let document: MymDocument = serde_json::from_value(current).map_err(|e| {
                    ProviderError::parse(PROVIDER, format!("embedded {} document: {}", label, e))
                })?;
                return match document.error.as_ref() {
                    Some(err) if err.code() == Some(404) => Ok(EmbeddedPeriod::NotFound),
                    Some(err) => Err(ProviderError::prefixed(
                        PROVIDER,
                        "UPSTREAM_ERROR",
                        format!(
                            "embedded {} document reported error {:?}: {}",
                            label,
                            err.code(),
                            err.message.as_deref().unwrap_or("no message")
                        ),
                    )),
                    None => Ok(EmbeddedPeriod::Document(document)),
                };
            }
            other => {
                return Err(ProviderError::parse(
                    PROVIDER,
                    format!("embedded {} document has unexpected type: {}", label, other),
                ))
            }
        }
    }
    Err(ProviderError::parse(
        PROVIDER,
        format!("embedded {} document is encoded too many times", label),
    ))
}

impl MymPayload {
    /// Resolves both periods from an envelope. t0 is mandatory, t6 is optional.
    pub fn from_envelope(
        documento: &str,
        envelope: MymEnvelope,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, ProviderError> {
        let MymEnvelope {
            nombre,
            fallecido,
            t0,
            t6,
            entidades_t0,
            entidades_t6,
        } = envelope;

        let (t0_document, t0_entities) = match parse_embedded(t0, "t0")? {
            EmbeddedPeriod::Document(mut doc) if !doc.entidades.is_empty() => {
                let entities = std::mem::take(&mut doc.entidades);
                (Some(doc), entities)
            }
            EmbeddedPeriod::NotFound => {
                tracing::info!("MYM t0 document returned 404, reading flat entity list");
                (None, entidades_t0)
            }
            EmbeddedPeriod::Document(doc) => (Some(doc), entidades_t0),
            EmbeddedPeriod::Absent => (None, entidades_t0),
        };

        if t0_entities.is_empty() {
            return Err(ProviderError::prefixed(
                PROVIDER,
                "EMPTY_DATA",
                format!("MYM returned no t0 data for document {}", documento),
            ));
        }

        let t6_entities = match parse_embedded(t6, "t6") {
            Ok(EmbeddedPeriod::Document(doc)) if !doc.entidades.is_empty() => doc.entidades,
            Ok(_) => entidades_t6,
            Err(e) => {
                tracing::warn!("Ignoring unreadable MYM t6 document: {}", e);
                entidades_t6
            }
        };

        let nombre = t0_document
            .as_ref()
            .and_then(|doc| doc.nombre.clone())
            .or(nombre)
            .filter(|n| !n.trim().is_empty());
        let is_deceased = t0_document
            .as_ref()
            .and_then(|doc| doc.fallecido.as_ref())
            .or(fallecido.as_ref())
            .map(coerce::is_truthy_marker)
            .unwrap_or(false);

        Ok(Self {
            documento: documento.to_string(),
            nombre,
            is_deceased,
            fetched_at,
            t0: t0_entities,
            t6: t6_entities,
        })
    }
}

// ============ Adapter ============

pub struct MymAdapter {
    client: Client,
    settings: MymSettings,
}

impl MymAdapter {
    pub const TIMEOUT: Duration = Duration::from_secs(20);

    pub fn new(settings: MymSettings) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|e| ProviderError::network(PROVIDER, format!("failed to build client: {}", e)))?;

        Ok(Self { client, settings })
    }
}

#[async_trait]
impl ProviderAdapter for MymAdapter {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    async fn fetch(
        &self,
        documento: &str,
        _options: &FetchOptions,
    ) -> Result<RawProviderPayload, ProviderError> {
        let url = format!(
            "{}/api/v1/consultas/{}",
            self.settings.base_url.trim_end_matches('/'),
            documento
        );

        tracing::info!("Fetching MYM report for document: {}", documento);

        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.settings.api_key)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(status_error(PROVIDER, response).await);
        }

        let envelope: MymEnvelope = response
            .json()
            .await
            .map_err(|e| ProviderError::parse(PROVIDER, e))?;

        let payload = MymPayload::from_envelope(documento, envelope, Utc::now())?;
        tracing::info!(
            "Successfully fetched MYM report: {} t0 / {} t6 entities",
            payload.t0.len(),
            payload.t6.len()
        );
        Ok(RawProviderPayload::Mym(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: Value) -> MymEnvelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_embedded_strings_and_array_like_objects() {
        let t0 = json!({
            "nombre": "ANA GOMEZ",
            "fallecido": "N",
            "entidades": {
                "1": {"entidad": "OCA", "calificacion": "1C", "vigente": {"mn": 200}},
                "0": {
                    "entidad": "BROU",
                    "calificacion": "1A",
                    "vigente": {"mn": "1.000,50", "me": 10},
                    "rubros": {"0": {"rubro": "PRESTAMOS", "mn": 1000.5}}
                }
            }
        });
        let env = envelope(json!({"t0": t0.to_string(), "t6": false}));

        let payload = MymPayload::from_envelope("1234567", env, Utc::now()).unwrap();
        assert_eq!(payload.t0.len(), 2);
        assert_eq!(payload.t0[0].entidad.as_deref(), Some("BROU"));
        assert_eq!(payload.t0[0].vigente.total(), 1010.5);
        assert_eq!(payload.t0[0].rubros.len(), 1);
        assert_eq!(payload.t0[1].entidad.as_deref(), Some("OCA"));
        assert!(payload.t6.is_empty());
        assert_eq!(payload.nombre.as_deref(), Some("ANA GOMEZ"));
        assert!(!payload.is_deceased);
    }

    #[test]
    fn test_double_encoded_document() {
        let inner = json!({"entidades": [{"entidad": "ITAU", "calificacion": "2A"}]}).to_string();
        let env = envelope(json!({"t0": Value::String(inner).to_string(), "t6": null}));
        let payload = MymPayload::from_envelope("1234567", env, Utc::now()).unwrap();
        assert_eq!(payload.t0[0].entidad.as_deref(), Some("ITAU"));
    }

    #[test]
    fn test_not_found_falls_back_to_flat_arrays() {
        let env = envelope(json!({
            "nombre": "LUIS PEREZ",
            "t0": json!({"error": {"code": "404", "message": "sin datos"}}).to_string(),
            "t6": json!({"error": {"code": 404}}).to_string(),
            "entidades_t0": [{"entidad": "SANTANDER", "calificacion": "1A"}],
            "entidades_t6": {"0": {"entidad": "SANTANDER", "calificacion": "1C"}}
        }));
        let payload = MymPayload::from_envelope("1234567", env, Utc::now()).unwrap();
        assert_eq!(payload.t0.len(), 1);
        assert_eq!(payload.t6.len(), 1);
        assert_eq!(payload.t6[0].calificacion.as_deref(), Some("1C"));
        assert_eq!(payload.nombre.as_deref(), Some("LUIS PEREZ"));
    }

    #[test]
    fn test_empty_t0_is_an_error() {
        let env = envelope(json!({
            "t0": json!({"error": {"code": 404}}).to_string(),
            "t6": json!({"entidades": [{"entidad": "OCA"}]}).to_string()
        }));
        let err = MymPayload::from_envelope("1234567", env, Utc::now()).unwrap_err();
        assert_eq!(err.code, "MYM_EMPTY_DATA");
    }

    #[test]
    fn test_other_embedded_errors_are_upstream_errors() {
        let env = envelope(json!({"t0": json!({"error": {"code": 500}}).to_string()}));
        let err = MymPayload::from_envelope("1234567", env, Utc::now()).unwrap_err();
        assert_eq!(err.code, "MYM_UPSTREAM_ERROR");
    }

    #[test]
    fn test_unreadable_t6_is_tolerated() {
        let env = envelope(json!({
            "t0": {"entidades": [{"entidad": "BBVA", "calificacion": "1A"}], "fallecido": "S"},
            "t6": "{not json"
        }));
        let payload = MymPayload::from_envelope("1234567", env, Utc::now()).unwrap();
        assert!(payload.t6.is_empty());
        assert!(payload.is_deceased);
    }
}
