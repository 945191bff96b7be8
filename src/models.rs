use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ============ Providers ============

/// Identifier of an external credit-bureau provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    #[default]
    Equifax,
    Mym,
    Bcu,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Equifax => "equifax",
            ProviderId::Mym => "mym",
            ProviderId::Bcu => "bcu",
        }
    }

    /// Prefix used when building provider error codes (`EQUIFAX_SERVER_ERROR`).
    pub fn error_prefix(&self) -> &'static str {
        match self {
            ProviderId::Equifax => "EQUIFAX",
            ProviderId::Mym => "MYM",
            ProviderId::Bcu => "BCU",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "equifax" => Some(ProviderId::Equifax),
            "mym" => Some(ProviderId::Mym),
            "bcu" => Some(ProviderId::Bcu),
            _ => None,
        }
    }

    /// Resolves a caller-supplied identifier. Unknown values fall back to Equifax.
    pub fn resolve(value: Option<&str>) -> Self {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            None => ProviderId::default(),
            Some(raw) => ProviderId::parse(raw).unwrap_or_else(|| {
                tracing::info!(
                    requested = raw,
                    using = ProviderId::Equifax.as_str(),
                    "Unknown provider requested, using default provider"
                );
                ProviderId::Equifax
            }),
        }
    }

    /// Secondary provider tried after this one fails. BCU is never a fallback target.
    pub fn fallback(&self) -> ProviderId {
        match self {
            ProviderId::Equifax => ProviderId::Mym,
            ProviderId::Mym => ProviderId::Equifax,
            ProviderId::Bcu => ProviderId::Equifax,
        }
    }

    /// Reliability weight applied to the confidence score.
    pub fn reliability(&self) -> f64 {
        match self {
            ProviderId::Equifax => 1.0,
            ProviderId::Mym => 0.9,
            ProviderId::Bcu => 0.8,
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Ratings ============

/// Rating codes from best to worst.
pub const RATING_ORDER: [&str; 10] = ["1A", "1C", "2A", "0", "N/C", "N", "2B", "3", "4", "5"];

/// Position of a rating code in [`RATING_ORDER`]; `None` for unknown codes.
pub fn rating_rank(code: &str) -> Option<usize> {
    let code = code.trim();
    RATING_ORDER.iter().position(|known| known.eq_ignore_ascii_case(code))
}

/// Worst known rating among `codes`. Unknown codes are ignored.
pub fn worst_rating<'a, I>(codes: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut worst: Option<(usize, &'a str)> = None;
    for code in codes {
        if let Some(rank) = rating_rank(code) {
            match worst {
                Some((current, _)) if current >= rank => {}
                _ => worst = Some((rank, RATING_ORDER[rank])),
            }
        }
    }
    worst.map(|(_, code)| code)
}

// ============ Credit Report ============

/// Sub-ledger line of an entity, in local (`mn`) and foreign (`me`) currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rubro {
    pub nombre: String,
    pub mn: f64,
    pub me: f64,
}

impl Rubro {
    pub fn total(&self) -> f64 {
        self.mn + self.me
    }
}

/// A lending institution reported for the subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Normalized uppercase institution name.
    pub name: String,
    pub rating: String,
    pub vigente: f64,
    pub vencido: f64,
    pub castigado: f64,
    pub rubros: Vec<Rubro>,
}

impl Entity {
    pub fn total_debt(&self) -> f64 {
        self.vigente + self.vencido + self.castigado
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodAggregates {
    pub vigente: f64,
    pub vencido: f64,
    pub castigado: f64,
    pub entity_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worst_rating: Option<String>,
}

impl PeriodAggregates {
    pub fn total(&self) -> f64 {
        self.vigente + self.vencido + self.castigado
    }
}

/// One bureau snapshot (t0 or t6).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub entities: Vec<Entity>,
    pub aggregates: PeriodAggregates,
}

impl Period {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entities(entities: Vec<Entity>) -> Self {
        let mut aggregates = PeriodAggregates {
            entity_count: entities.len(),
            ..PeriodAggregates::default()
        };
        for entity in &entities {
            aggregates.vigente += entity.vigente;
            aggregates.vencido += entity.vencido;
            aggregates.castigado += entity.castigado;
        }
        aggregates.worst_rating =
            worst_rating(entities.iter().map(|e| e.rating.as_str())).map(String::from);
        Self {
            entities,
            aggregates,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Periods {
    pub t0: Period,
    pub t6: Period,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFlags {
    pub is_deceased: bool,
    pub has_rejectable_rating: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub nombre: Option<String>,
    pub worst_rating: Option<String>,
    pub fetched_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// Canonical credit report produced by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditReport {
    pub documento: String,
    pub provider: ProviderId,
    pub periods: Periods,
    pub flags: ReportFlags,
    pub metadata: ReportMetadata,
}

// ============ Scoring Rules ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineVariant {
    /// `1000 * exp(t) / (1 + exp(t))`, rounded.
    #[default]
    Logistic,
    /// Base score plus capped bucket impacts, clamped to `[0, 1]`.
    Bounded,
}

impl EngineVariant {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "logistic" => Some(EngineVariant::Logistic),
            "bounded" => Some(EngineVariant::Bounded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionRules {
    pub is_deceased: bool,
    pub bad_ratings: Vec<String>,
    pub max_vencido: f64,
    pub max_castigado: f64,
    pub max_total_debt: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketRule {
    pub threshold: f64,
    pub weight: f64,
    pub max_impact: f64,
}

impl BucketRule {
    /// Impact of `value`: zero up to the threshold, then `weight` per unit, capped at `max_impact`.
    pub fn impact(&self, value: f64) -> f64 {
        if value <= self.threshold {
            return 0.0;
        }
        let cap = self.max_impact.abs();
        ((value - self.threshold) * self.weight).clamp(-cap, cap)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringRules {
    pub variant: EngineVariant,
    pub coefficients: BTreeMap<String, f64>,
    pub intercept: f64,
    pub base_score: f64,
    pub rejection_rules: RejectionRules,
    /// Institution key -> uppercase name fragments that identify it.
    pub aliases: BTreeMap<String, Vec<String>>,
    pub buckets: BTreeMap<String, BucketRule>,
}

impl ScoringRules {
    pub fn coefficient(&self, feature: &str) -> f64 {
        self.coefficients.get(feature).copied().unwrap_or(0.0)
    }
}

// ============ Score Result ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    Deceased,
    BadRating,
    NoData,
    ExcessVencido,
    ExcessCastigado,
    ExcessTotalDebt,
    InvalidDocument,
    ServiceError,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::Deceased => "DECEASED",
            RejectionReason::BadRating => "BAD_RATING",
            RejectionReason::NoData => "NO_DATA",
            RejectionReason::ExcessVencido => "EXCESS_VENCIDO",
            RejectionReason::ExcessCastigado => "EXCESS_CASTIGADO",
            RejectionReason::ExcessTotalDebt => "EXCESS_TOTAL_DEBT",
            RejectionReason::InvalidDocument => "INVALID_DOCUMENT",
            RejectionReason::ServiceError => "SERVICE_ERROR",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub impact: f64,
    pub raw_value: f64,
}

/// Serialized error attached to `SERVICE_ERROR` and other failed results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub name: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QualityLevel {
    High,
    Medium,
    Low,
    None,
}

impl QualityLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            QualityLevel::High
        } else if score >= 0.5 {
            QualityLevel::Medium
        } else if score > 0.0 {
            QualityLevel::Low
        } else {
            QualityLevel::None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuality {
    pub level: QualityLevel,
    pub score: f64,
    pub percentage: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confidence {
    pub level: QualityLevel,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    pub has_valid_data: bool,
    pub data_quality: DataQuality,
    pub confidence: Confidence,
}

impl Validation {
    /// Validation block for results produced without any report.
    pub fn no_data() -> Self {
        Self {
            has_valid_data: false,
            data_quality: DataQuality {
                level: QualityLevel::None,
                score: 0.0,
                percentage: 0,
            },
            confidence: Confidence {
                level: QualityLevel::None,
                score: 0.0,
            },
        }
    }
}

/// Extra diagnostics attached when `ScoringOptions::debug` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
    pub worst_rating_t0: Option<String>,
    pub worst_rating_t6: Option<String>,
    pub entities_t0: usize,
    pub entities_t6: usize,
    pub totals: PeriodAggregates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    pub provider: ProviderId,
    pub documento: String,
    pub calculated_at: DateTime<Utc>,
    pub is_rejected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<RejectionReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineVariant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_from: Option<ProviderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    pub final_score: f64,
    pub raw_score: f64,
    pub base_score: f64,
    pub contributions: BTreeMap<String, Contribution>,
    pub metadata: ScoreMetadata,
    pub flags: ReportFlags,
    pub validation: Validation,
}

impl ScoreResult {
    /// Rejected result for failures that happen before a report exists.
    pub fn failed(
        documento: &str,
        provider: ProviderId,
        reason: RejectionReason,
        error: ErrorInfo,
        base_score: f64,
    ) -> Self {
        Self {
            final_score: 0.0,
            raw_score: 0.0,
            base_score,
            contributions: BTreeMap::new(),
            metadata: ScoreMetadata {
                request_id: None,
                provider,
                documento: documento.to_string(),
                calculated_at: Utc::now(),
                is_rejected: true,
                rejection_reason: Some(reason),
                error: Some(error),
                engine: None,
                fallback_from: None,
                correlation_id: None,
                debug: None,
            },
            flags: ReportFlags::default(),
            validation: Validation::no_data(),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.metadata.is_rejected
    }

    pub fn rejection_reason(&self) -> Option<RejectionReason> {
        self.metadata.rejection_reason
    }
}

// ============ Options ============

/// Per-call options for `ScoringService::calculate_score`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringOptions {
    /// Primary provider. Rewritten to the provider that produced the result.
    pub provider: ProviderId,
    pub no_fallback: bool,
    pub force_refresh: bool,
    pub strict_rules: bool,
    pub debug: bool,
}

impl ScoringOptions {
    pub fn with_provider(provider: ProviderId) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }
}

/// Request body for `POST /api/v1/score`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRequest {
    #[serde(default)]
    pub documento: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub no_fallback: Option<bool>,
    #[serde(default)]
    pub force_refresh: Option<bool>,
    #[serde(default)]
    pub strict_rules: Option<bool>,
    #[serde(default)]
    pub debug: Option<bool>,
}

impl ScoreRequest {
    pub fn options(&self) -> ScoringOptions {
        ScoringOptions {
            provider: ProviderId::resolve(self.provider.as_deref()),
            no_fallback: self.no_fallback.unwrap_or(false),
            force_refresh: self.force_refresh.unwrap_or(false),
            strict_rules: self.strict_rules.unwrap_or(false),
            debug: self.debug.unwrap_or(false),
        }
    }
}
