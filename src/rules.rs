//! Scoring rules: loading, per-field defaults, strict validation and caching.

use crate::cache::CacheService;
use crate::errors::RulesError;
use crate::models::{BucketRule, EngineVariant, RejectionRules, ScoringRules};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const RULES_CACHE_KEY: &str = "scoring:rules";

/// Coefficients the logistic formula reads, besides `intercept`.
pub const LOGISTIC_FEATURES: [&str; 23] = [
    "banco_brou",
    "banco_scotia",
    "banco_santander",
    "banco_itau",
    "banco_bbva",
    "fin_oca",
    "fin_creditel",
    "fin_anda",
    "fin_pronto",
    "fin_cash",
    "contingencia_scotia",
    "contingencia_brou",
    "t6_entidades_1",
    "t6_entidades_2_3",
    "t6_entidades_4_mas",
    "t6_peor_1c",
    "t6_peor_2a",
    "t6_peor_2b_mas",
    "t6_sin_datos",
    "t0_peor_1c",
    "t0_peor_2a",
    "t0_con_vencido",
    "t0_entidades_crecen",
];

pub const BUCKET_KEYS: [&str; 3] = ["deudaTotal", "deudaVencida", "entidadesT0"];

const DEFAULT_INTERCEPT: f64 = 1.2;
const DEFAULT_BASE_SCORE: f64 = 0.75;

fn default_coefficient(feature: &str) -> f64 {
    match feature {
        "banco_brou" => 0.35,
        "banco_scotia" => 0.25,
        "banco_santander" => 0.2,
        "banco_itau" => 0.3,
        "banco_bbva" => 0.2,
        "fin_oca" => -0.15,
        "fin_creditel" => -0.35,
        "fin_anda" => -0.3,
        "fin_pronto" => -0.45,
        "fin_cash" => -0.5,
        "contingencia_scotia" => 0.15,
        "contingencia_brou" => 0.1,
        "t6_entidades_1" => 0.2,
        "t6_entidades_2_3" => 0.0,
        "t6_entidades_4_mas" => -0.4,
        "t6_peor_1c" => -0.3,
        "t6_peor_2a" => -0.6,
        "t6_peor_2b_mas" => -1.1,
        "t6_sin_datos" => -0.2,
        "t0_peor_1c" => -0.35,
        "t0_peor_2a" => -0.7,
        "t0_con_vencido" => -0.8,
        "t0_entidades_crecen" => -0.25,
        _ => 0.0,
    }
}

fn default_bucket(key: &str) -> BucketRule {
    match key {
        "deudaTotal" => BucketRule {
            threshold: 100_000.0,
            weight: -0.000001,
            max_impact: 0.3,
        },
        "deudaVencida" => BucketRule {
            threshold: 0.0,
            weight: -0.00005,
            max_impact: 0.25,
        },
        _ => BucketRule {
            threshold: 3.0,
            weight: -0.05,
            max_impact: 0.2,
        },
    }
}

pub fn default_rejection_rules() -> RejectionRules {
    RejectionRules {
        is_deceased: true,
        bad_ratings: vec!["4".to_string(), "5".to_string()],
        max_vencido: 5_000.0,
        max_castigado: 0.0,
        max_total_debt: 2_000_000.0,
    }
}

pub fn default_aliases() -> BTreeMap<String, Vec<String>> {
    [
        ("brou", &["BROU", "REPUBLICA ORIENTAL"][..]),
        ("scotia", &["SCOTIA"][..]),
        ("santander", &["SANTANDER"][..]),
        ("itau", &["ITAU"][..]),
        ("bbva", &["BBVA"][..]),
        ("oca", &["OCA"][..]),
        ("creditel", &["CREDITEL"][..]),
        ("anda", &["ANDA"][..]),
        ("pronto", &["PRONTO"][..]),
        ("cash", &["CASH"][..]),
    ]
    .into_iter()
    .map(|(key, names)| {
        (
            key.to_string(),
            names.iter().map(|n| n.to_string()).collect(),
        )
    })
    .collect()
}

/// Fully hardcoded rule set.
pub fn default_rules() -> ScoringRules {
    assemble_rules(&Value::Null).0
}

fn number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    match value? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.trim().to_uppercase()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        Value::String(s) => Some(
            s.split(',')
                .map(|part| part.trim().to_uppercase())
                .filter(|part| !part.is_empty())
                .collect(),
        ),
        _ => None,
    }
}

fn bucket(raw: Option<&Value>, key: &str) -> Option<BucketRule> {
    let raw = raw?.get(key)?;
    let fallback = default_bucket(key);
    let threshold = number(raw.get("threshold"));
    let weight = number(raw.get("weight"));
    let max_impact = number(raw.get("maxImpact"));
    if threshold.is_none() && weight.is_none() && max_impact.is_none() {
        return None;
    }
    Some(BucketRule {
        threshold: threshold.unwrap_or(fallback.threshold),
        weight: weight.unwrap_or(fallback.weight),
        max_impact: max_impact.unwrap_or(fallback.max_impact),
    })
}

/// Builds rules from a raw configuration document, defaulting each field
/// independently. Returns the rules and the required keys that were defaulted.
pub fn assemble_rules(raw: &Value) -> (ScoringRules, Vec<String>) {
    let mut missing = Vec::new();

    let variant = raw
        .get("variant")
        .and_then(Value::as_str)
        .and_then(EngineVariant::parse)
        .unwrap_or_default();

    let raw_coefficients = raw.get("coefficients");
    let mut coefficients = BTreeMap::new();
    for feature in LOGISTIC_FEATURES {
        let value = number(raw_coefficients.and_then(|c| c.get(feature)));
        if value.is_none() && variant == EngineVariant::Logistic {
            missing.push(feature.to_string());
        }
        coefficients.insert(
            feature.to_string(),
            value.unwrap_or_else(|| default_coefficient(feature)),
        );
    }

    // Either a top-level `intercept` or one inside the coefficient map.
    let intercept = number(raw.get("intercept"))
        .or_else(|| number(raw_coefficients.and_then(|c| c.get("intercept"))));
    if intercept.is_none() && variant == EngineVariant::Logistic {
        missing.push("intercept".to_string());
    }

    let base_score = number(raw.get("baseScore"));
    if base_score.is_none() && variant == EngineVariant::Bounded {
        missing.push("baseScore".to_string());
    }

    let raw_buckets = raw.get("buckets");
    let mut buckets = BTreeMap::new();
    for key in BUCKET_KEYS {
        let rule = bucket(raw_buckets, key);
        if rule.is_none() && variant == EngineVariant::Bounded {
            missing.push(format!("buckets.{}", key));
        }
        buckets.insert(key.to_string(), rule.unwrap_or_else(|| default_bucket(key)));
    }

    let defaults = default_rejection_rules();
    let raw_rejection = raw.get("rejectionRules");
    let rejection_rules = RejectionRules {
        is_deceased: raw_rejection
            .and_then(|r| r.get("isDeceased"))
            .and_then(Value::as_bool)
            .unwrap_or(defaults.is_deceased),
        bad_ratings: string_list(raw_rejection.and_then(|r| r.get("badRatings")))
            .unwrap_or(defaults.bad_ratings),
        max_vencido: number(raw_rejection.and_then(|r| r.get("maxVencido")))
            .unwrap_or(defaults.max_vencido),
        max_castigado: number(raw_rejection.and_then(|r| r.get("maxCastigado")))
            .unwrap_or(defaults.max_castigado),
        max_total_debt: number(raw_rejection.and_then(|r| r.get("maxTotalDebt")))
            .unwrap_or(defaults.max_total_debt),
    };

    let mut aliases = default_aliases();
    if let Some(Value::Object(raw_aliases)) = raw.get("aliases") {
        for (key, names) in raw_aliases {
            if let Some(names) = string_list(Some(names)) {
                aliases.insert(key.to_lowercase(), names);
            }
        }
    }

    let rules = ScoringRules {
        variant,
        coefficients,
        intercept: intercept.unwrap_or(DEFAULT_INTERCEPT),
        base_score: base_score.unwrap_or(DEFAULT_BASE_SCORE),
        rejection_rules,
        aliases,
        buckets,
    };
    (rules, missing)
}

// ============ Sources ============

/// External configuration store for scoring rules.
#[async_trait]
pub trait RulesSource: Send + Sync {
    async fn load(&self) -> Result<Value, RulesError>;
}

/// Reads the rule document from a JSON file on every load.
pub struct JsonFileRulesSource {
    path: PathBuf,
}

impl JsonFileRulesSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RulesSource for JsonFileRulesSource {
    async fn load(&self) -> Result<Value, RulesError> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            RulesError::Unavailable(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            RulesError::Unavailable(format!("invalid JSON in {}: {}", self.path.display(), e))
        })
    }
}

/// In-memory rule document.
pub struct StaticRulesSource(pub Value);

#[async_trait]
impl RulesSource for StaticRulesSource {
    async fn load(&self) -> Result<Value, RulesError> {
        Ok(self.0.clone())
    }
}

/// No external store; every field takes its default.
pub struct DefaultsOnlyRulesSource;

#[async_trait]
impl RulesSource for DefaultsOnlyRulesSource {
    async fn load(&self) -> Result<Value, RulesError> {
        Ok(Value::Null)
    }
}

// ============ Provider ============

#[derive(Serialize, Deserialize)]
struct CachedRules {
    rules: ScoringRules,
    missing: Vec<String>,
    /// Why the source could not be read. Such entries are never cached.
    #[serde(skip)]
    unavailable: Option<String>,
}

pub struct ScoringRulesProvider {
    source: Arc<dyn RulesSource>,
    cache: Arc<dyn CacheService>,
    strict: AtomicBool,
}

impl ScoringRulesProvider {
    pub fn new(source: Arc<dyn RulesSource>, cache: Arc<dyn CacheService>) -> Self {
        Self {
            source,
            cache,
            strict: AtomicBool::new(false),
        }
    }

    pub fn set_strict_mode(&self, strict: bool) {
        self.strict.store(strict, Ordering::Relaxed);
    }

    pub fn is_strict(&self) -> bool {
        self.strict.load(Ordering::Relaxed)
    }

    pub async fn invalidate_cache(&self) {
        tracing::info!("Invalidating scoring rules cache");
        self.cache.invalidate(RULES_CACHE_KEY).await;
    }

    pub async fn get_rules(&self) -> Result<ScoringRules, RulesError> {
        self.get_rules_with(false).await
    }

    /// Like [`get_rules`](Self::get_rules); `strict` forces strict mode for this call only.
    pub async fn get_rules_with(&self, strict: bool) -> Result<ScoringRules, RulesError> {
        let CachedRules {
            rules,
            missing,
            unavailable,
        } = self.load().await;
        let strict = strict || self.is_strict();

        if let Some(reason) = unavailable {
            if strict {
                tracing::error!("Scoring rules unavailable in strict mode: {}", reason);
                return Err(RulesError::Unavailable(reason));
            }
        }
        if missing.is_empty() {
            return Ok(rules);
        }
        if strict {
            tracing::error!("Scoring rules incomplete in strict mode: {:?}", missing);
            return Err(RulesError::Incomplete { missing });
        }
        tracing::warn!(
            "Scoring rules missing {} values, using defaults: {:?}",
            missing.len(),
            missing
        );
        Ok(rules)
    }

    async fn load(&self) -> CachedRules {
        if let Some(cached) = self.cache.get(RULES_CACHE_KEY).await {
            match serde_json::from_str::<CachedRules>(&cached) {
                Ok(entry) => return entry,
                Err(e) => tracing::warn!("Discarding unreadable cached rules: {}", e),
            }
        }

        let (raw, unavailable) = match self.source.load().await {
            Ok(raw) => (raw, None),
            Err(e) => {
                tracing::error!("Failed to load scoring rules, using defaults: {}", e);
                let reason = match e {
                    RulesError::Unavailable(reason) => reason,
                    other => other.to_string(),
                };
                (Value::Null, Some(reason))
            }
        };
        let (rules, missing) = assemble_rules(&raw);
        let entry = CachedRules {
            rules,
            missing,
            unavailable,
        };

        if entry.unavailable.is_none() {
            match serde_json::to_string(&entry) {
                Ok(serialized) => self.cache.put(RULES_CACHE_KEY, serialized, None).await,
                Err(e) => tracing::warn!("Failed to cache scoring rules: {}", e),
            }
            tracing::info!(
                "Loaded scoring rules (variant: {:?}, defaulted: {})",
                entry.rules.variant,
                entry.missing.len()
            );
        }
        entry
    }
}
