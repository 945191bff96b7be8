//! Pure scoring engine: rejection rules, then either the logistic (0-1000)
//! or the bounded ([0, 1]) formula.
//!
//! Nothing here performs I/O or reads the clock: `calculated_at` is taken
//! from the report's fetch time and `request_id` is left for the caller.

use crate::models::{
    rating_rank, worst_rating, Confidence, Contribution, CreditReport, DataQuality, DebugSnapshot,
    EngineVariant, Entity, PeriodAggregates, QualityLevel, RejectionReason, ScoreMetadata,
    ScoreResult, ScoringRules, Validation,
};
use std::collections::BTreeMap;

const BANK_GROUP: [(&str, &str); 5] = [
    ("banco_brou", "brou"),
    ("banco_scotia", "scotia"),
    ("banco_santander", "santander"),
    ("banco_itau", "itau"),
    ("banco_bbva", "bbva"),
];

const FINANCIERA_GROUP: [(&str, &str); 5] = [
    ("fin_oca", "oca"),
    ("fin_creditel", "creditel"),
    ("fin_anda", "anda"),
    ("fin_pronto", "pronto"),
    ("fin_cash", "cash"),
];

const CONTINGENCY_FEATURES: [(&str, &str); 2] = [
    ("contingencia_scotia", "scotia"),
    ("contingencia_brou", "brou"),
];

const CONTINGENCY_MARKER: &str = "CONTINGENC";

/// A single pass over t0: debt buckets plus the worst rating.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Totals {
    pub vigente: f64,
    pub vencido: f64,
    pub castigado: f64,
    pub entity_count: usize,
    pub worst_rating: Option<String>,
}

impl Totals {
    pub fn accumulate(entities: &[Entity]) -> Self {
        let mut totals = Totals {
            entity_count: entities.len(),
            ..Totals::default()
        };
        let mut worst: Option<usize> = None;
        for entity in entities {
            totals.vigente += entity.vigente;
            totals.vencido += entity.vencido;
            totals.castigado += entity.castigado;
            if let Some(rank) = rating_rank(&entity.rating) {
                if worst.map_or(true, |current| rank > current) {
                    worst = Some(rank);
                }
            }
        }
        totals.worst_rating = worst.map(|rank| crate::models::RATING_ORDER[rank].to_string());
        totals
    }

    pub fn total_debt(&self) -> f64 {
        self.vigente + self.vencido + self.castigado
    }
}

/// Computes the score for `report` under `rules`. Same inputs, same output.
pub fn compute_score(report: &CreditReport, rules: &ScoringRules) -> ScoreResult {
    let rejection = &rules.rejection_rules;
    let base_score = match rules.variant {
        EngineVariant::Logistic => rules.intercept,
        EngineVariant::Bounded => rules.base_score,
    };

    if rejection.is_deceased && report.flags.is_deceased {
        return rejected(report, rules, base_score, RejectionReason::Deceased, "isDeceased", 1.0);
    }

    if report.flags.has_rejectable_rating {
        let rank = report
            .metadata
            .worst_rating
            .as_deref()
            .and_then(rating_rank)
            .map_or(-1.0, |r| r as f64);
        return rejected(report, rules, base_score, RejectionReason::BadRating, "badRatings", rank);
    }

    let t0 = &report.periods.t0.entities;
    if t0.is_empty() {
        return rejected(report, rules, base_score, RejectionReason::NoData, "t0", 0.0);
    }

    let totals = Totals::accumulate(t0);

    if totals.vencido > rejection.max_vencido {
        return rejected(
            report,
            rules,
            base_score,
            RejectionReason::ExcessVencido,
            "maxVencido",
            totals.vencido,
        );
    }
    if totals.castigado > rejection.max_castigado {
        return rejected(
            report,
            rules,
            base_score,
            RejectionReason::ExcessCastigado,
            "maxCastigado",
            totals.castigado,
        );
    }
    if totals.total_debt() > rejection.max_total_debt {
        return rejected(
            report,
            rules,
            base_score,
            RejectionReason::ExcessTotalDebt,
            "maxTotalDebt",
            totals.total_debt(),
        );
    }

    let (final_score, raw_score, contributions) = match rules.variant {
        EngineVariant::Logistic => logistic(report, rules, &totals),
        EngineVariant::Bounded => bounded(rules, &totals),
    };

    ScoreResult {
        final_score,
        raw_score,
        base_score,
        contributions,
        metadata: metadata(report, rules, None),
        flags: report.flags,
        validation: validate(report),
    }
}

fn rejected(
    report: &CreditReport,
    rules: &ScoringRules,
    base_score: f64,
    reason: RejectionReason,
    rule: &str,
    measured: f64,
) -> ScoreResult {
    tracing::info!(
        documento = %report.documento,
        reason = reason.as_str(),
        "Score rejected"
    );
    let mut contributions = BTreeMap::new();
    contributions.insert(
        rule.to_string(),
        Contribution {
            impact: 0.0,
            raw_value: measured,
        },
    );
    ScoreResult {
        final_score: 0.0,
        raw_score: 0.0,
        base_score,
        contributions,
        metadata: metadata(report, rules, Some(reason)),
        flags: report.flags,
        validation: validate(report),
    }
}

fn metadata(
    report: &CreditReport,
    rules: &ScoringRules,
    reason: Option<RejectionReason>,
) -> ScoreMetadata {
    ScoreMetadata {
        request_id: None,
        provider: report.provider,
        documento: report.documento.clone(),
        calculated_at: report.metadata.fetched_at,
        is_rejected: reason.is_some(),
        rejection_reason: reason,
        error: None,
        engine: Some(rules.variant),
        fallback_from: None,
        correlation_id: report.metadata.correlation_id.clone(),
        debug: None,
    }
}

// ============ Logistic ============

fn matches_alias(name: &str, alias_key: &str, rules: &ScoringRules) -> bool {
    rules.aliases.get(alias_key).map_or(false, |fragments| {
        fragments
            .iter()
            .any(|fragment| !fragment.is_empty() && name.contains(fragment.as_str()))
    })
}

/// Last entity (document order) matching any member of `group` wins.
fn exclusive_match(
    entities: &[Entity],
    group: &[(&'static str, &'static str)],
    rules: &ScoringRules,
) -> Option<&'static str> {
    let mut selected = None;
    for entity in entities {
        if let Some((feature, _)) = group
            .iter()
            .find(|(_, alias)| matches_alias(&entity.name, alias, rules))
        {
            selected = Some(*feature);
        }
    }
    selected
}

fn has_contingency(entities: &[Entity], alias: &str, rules: &ScoringRules) -> bool {
    entities.iter().any(|entity| {
        matches_alias(&entity.name, alias, rules)
            && entity
                .rubros
                .iter()
                .any(|r| r.nombre.contains(CONTINGENCY_MARKER))
    })
}

fn rating_is(worst: Option<&str>, code: &str) -> bool {
    worst == Some(code)
}

fn rating_at_least(worst: Option<&str>, code: &str) -> bool {
    match (worst.and_then(rating_rank), rating_rank(code)) {
        (Some(rank), Some(floor)) => rank >= floor,
        _ => false,
    }
}

/// Activation and raw measurement for every logistic feature.
pub fn feature_activations(
    report: &CreditReport,
    rules: &ScoringRules,
    totals: &Totals,
) -> Vec<(&'static str, f64, f64)> {
    let t0 = &report.periods.t0.entities;
    let t6 = &report.periods.t6.entities;
    let t6_count = t6.len();
    let t6_worst = worst_rating(t6.iter().map(|e| e.rating.as_str()));
    let t0_worst = totals.worst_rating.as_deref();
    let flag = |active: bool| if active { 1.0 } else { 0.0 };

    let mut features = Vec::with_capacity(24);

    let bank = exclusive_match(t0, &BANK_GROUP, rules);
    for (feature, _) in BANK_GROUP {
        let active = flag(bank == Some(feature));
        features.push((feature, active, active));
    }
    let financiera = exclusive_match(t0, &FINANCIERA_GROUP, rules);
    for (feature, _) in FINANCIERA_GROUP {
        let active = flag(financiera == Some(feature));
        features.push((feature, active, active));
    }
    for (feature, alias) in CONTINGENCY_FEATURES {
        let active = flag(has_contingency(t0, alias, rules));
        features.push((feature, active, active));
    }

    let count = t6_count as f64;
    features.push(("t6_entidades_1", flag(t6_count == 1), count));
    features.push(("t6_entidades_2_3", flag((2..=3).contains(&t6_count)), count));
    features.push(("t6_entidades_4_mas", flag(t6_count >= 4), count));

    let t6_rank = t6_worst.and_then(rating_rank).map_or(-1.0, |r| r as f64);
    features.push(("t6_peor_1c", flag(rating_is(t6_worst, "1C")), t6_rank));
    features.push(("t6_peor_2a", flag(rating_is(t6_worst, "2A")), t6_rank));
    features.push(("t6_peor_2b_mas", flag(rating_at_least(t6_worst, "2B")), t6_rank));
    features.push(("t6_sin_datos", flag(t6_count == 0), count));

    let t0_rank = t0_worst.and_then(rating_rank).map_or(-1.0, |r| r as f64);
    features.push(("t0_peor_1c", flag(rating_is(t0_worst, "1C")), t0_rank));
    features.push(("t0_peor_2a", flag(rating_is(t0_worst, "2A")), t0_rank));
    features.push(("t0_con_vencido", flag(totals.vencido > 0.0), totals.vencido));

    let growth = totals.entity_count as f64 - count;
    features.push((
        "t0_entidades_crecen",
        flag(t6_count > 0 && totals.entity_count > t6_count),
        growth,
    ));

    features
}

/// `1 / (1 + e^-t)`, evaluated without overflowing for large `|t|`.
pub fn sigmoid(t: f64) -> f64 {
    if t >= 0.0 {
        1.0 / (1.0 + (-t).exp())
    } else {
        let e = t.exp();
        e / (1.0 + e)
    }
}

fn logistic(
    report: &CreditReport,
    rules: &ScoringRules,
    totals: &Totals,
) -> (f64, f64, BTreeMap<String, Contribution>) {
    let mut contributions = BTreeMap::new();
    contributions.insert(
        "intercept".to_string(),
        Contribution {
            impact: rules.intercept,
            raw_value: 1.0,
        },
    );

    let mut total = rules.intercept;
    for (feature, activation, raw_value) in feature_activations(report, rules, totals) {
        let impact = rules.coefficient(feature) * activation;
        total += impact;
        contributions.insert(feature.to_string(), Contribution { impact, raw_value });
    }

    let probability = sigmoid(total);
    ((1000.0 * probability).round(), probability, contributions)
}

// ============ Bounded ============

fn bounded(rules: &ScoringRules, totals: &Totals) -> (f64, f64, BTreeMap<String, Contribution>) {
    let measured = [
        ("deudaTotal", totals.total_debt()),
        ("deudaVencida", totals.vencido),
        ("entidadesT0", totals.entity_count as f64),
    ];

    let mut contributions = BTreeMap::new();
    let mut raw = rules.base_score;
    for (key, value) in measured {
        let impact = rules.buckets.get(key).map_or(0.0, |bucket| bucket.impact(value));
        raw += impact;
        contributions.insert(
            key.to_string(),
            Contribution {
                impact,
                raw_value: value,
            },
        );
    }

    (raw.clamp(0.0, 1.0), raw, contributions)
}

// ============ Validation ============

/// Data-quality checks over the report. Each passing check adds 1/5.
pub fn data_quality(report: &CreditReport) -> DataQuality {
    let t0 = &report.periods.t0.entities;
    let checks = [
        !t0.is_empty(),
        !report.periods.t6.entities.is_empty(),
        report.metadata.nombre.is_some(),
        !t0.is_empty() && t0.iter().all(|e| rating_rank(&e.rating).is_some()),
        !t0.is_empty() && t0.iter().all(|e| !e.name.is_empty()),
    ];
    let passed = checks.iter().filter(|ok| **ok).count();
    let score = passed as f64 / checks.len() as f64;
    DataQuality {
        level: QualityLevel::from_score(score),
        score,
        percentage: (score * 100.0).round() as u8,
    }
}

pub fn validate(report: &CreditReport) -> Validation {
    let data_quality = data_quality(report);
    let confidence_score = data_quality.score * report.provider.reliability();
    Validation {
        has_valid_data: !report.periods.t0.is_empty(),
        data_quality,
        confidence: Confidence {
            level: QualityLevel::from_score(confidence_score),
            score: confidence_score,
        },
    }
}

pub fn debug_snapshot(report: &CreditReport) -> DebugSnapshot {
    let t0 = &report.periods.t0;
    let t6 = &report.periods.t6;
    let totals = Totals::accumulate(&t0.entities);
    DebugSnapshot {
        worst_rating_t0: totals.worst_rating.clone(),
        worst_rating_t6: t6.aggregates.worst_rating.clone(),
        entities_t0: t0.entities.len(),
        entities_t6: t6.entities.len(),
        totals: PeriodAggregates {
            vigente: totals.vigente,
            vencido: totals.vencido,
            castigado: totals.castigado,
            entity_count: totals.entity_count,
            worst_rating: totals.worst_rating,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        EngineVariant, Period, Periods, ProviderId, ReportFlags, ReportMetadata, Rubro,
    };
    use crate::rules::default_rules;
    use chrono::{TimeZone, Utc};

    fn entity(name: &str, rating: &str, vigente: f64, vencido: f64) -> Entity {
        Entity {
            name: name.to_string(),
            rating: rating.to_string(),
            vigente,
            vencido,
            castigado: 0.0,
            rubros: vec![],
        }
    }

    fn report(t0: Vec<Entity>, t6: Vec<Entity>) -> CreditReport {
        let t0 = Period::from_entities(t0);
        CreditReport {
            documento: "1234567".into(),
            provider: ProviderId::Equifax,
            flags: ReportFlags::default(),
            metadata: ReportMetadata {
                nombre: Some("ANA".into()),
                worst_rating: t0.aggregates.worst_rating.clone(),
                fetched_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
                correlation_id: None,
            },
            periods: Periods {
                t0,
                t6: Period::from_entities(t6),
            },
        }
    }

    fn zero_rules() -> ScoringRules {
        let mut rules = default_rules();
        for value in rules.coefficients.values_mut() {
            *value = 0.0;
        }
        rules.intercept = 0.0;
        rules
    }

    #[test]
    fn test_deceased_rejects_regardless_of_debt() {
        let mut r = report(vec![entity("BROU", "1A", 10.0, 0.0)], vec![]);
        r.flags.is_deceased = true;
        let result = compute_score(&r, &default_rules());
        assert_eq!(result.final_score, 0.0);
        assert!(result.is_rejected());
        assert_eq!(result.rejection_reason(), Some(RejectionReason::Deceased));
    }

    #[test]
    fn test_bad_rating_rejects() {
        let mut r = report(vec![entity("OCA", "5", 0.0, 0.0)], vec![]);
        r.flags.has_rejectable_rating = true;
        let result = compute_score(&r, &default_rules());
        assert_eq!(result.rejection_reason(), Some(RejectionReason::BadRating));
        assert_eq!(result.contributions["badRatings"].raw_value, 9.0);
    }

    #[test]
    fn test_empty_t0_is_no_data() {
        let result = compute_score(&report(vec![], vec![]), &default_rules());
        assert_eq!(result.rejection_reason(), Some(RejectionReason::NoData));
        assert!(!result.validation.has_valid_data);
    }

    #[test]
    fn test_excess_rules_fire_in_order() {
        let mut rules = default_rules();
        rules.rejection_rules.max_vencido = 100.0;
        let r = report(vec![entity("BROU", "1A", 0.0, 150.0)], vec![]);
        let result = compute_score(&r, &rules);
        assert_eq!(result.rejection_reason(), Some(RejectionReason::ExcessVencido));
        assert_eq!(result.contributions["maxVencido"].raw_value, 150.0);

        let mut castigado = entity("BROU", "1A", 0.0, 0.0);
        castigado.castigado = 1.0;
        let result = compute_score(&report(vec![castigado], vec![]), &rules);
        assert_eq!(result.rejection_reason(), Some(RejectionReason::ExcessCastigado));

        rules.rejection_rules.max_total_debt = 1_000.0;
        let r = report(vec![entity("BROU", "1A", 2_000.0, 0.0)], vec![]);
        let result = compute_score(&r, &rules);
        assert_eq!(result.rejection_reason(), Some(RejectionReason::ExcessTotalDebt));
    }

    #[test]
    fn test_logistic_intercept_only() {
        let mut rules = zero_rules();
        rules.intercept = 4f64.ln();
        let r = report(vec![entity("BROU", "1A", 10.0, 0.0)], vec![]);
        let result = compute_score(&r, &rules);
        assert!(!result.is_rejected());
        assert_eq!(result.final_score, 800.0);
        assert_eq!(result.base_score, 4f64.ln());
        assert_eq!(result.metadata.engine, Some(EngineVariant::Logistic));
        assert!(result.contributions.contains_key("intercept"));
        assert!(result.contributions.contains_key("t0_entidades_crecen"));
    }

    #[test]
    fn test_last_matching_bank_wins() {
        let mut rules = zero_rules();
        rules.coefficients.insert("banco_brou".into(), 1.0);
        rules.coefficients.insert("banco_itau".into(), 2.0);
        let r = report(
            vec![
                entity("BANCO ITAU URUGUAY", "1A", 1.0, 0.0),
                entity("BROU", "1A", 1.0, 0.0),
            ],
            vec![],
        );
        let result = compute_score(&r, &rules);
        assert_eq!(result.contributions["banco_brou"].impact, 1.0);
        assert_eq!(result.contributions["banco_itau"].impact, 0.0);
    }

    #[test]
    fn test_alias_matching_is_case_sensitive() {
        let mut rules = zero_rules();
        rules.coefficients.insert("fin_cash".into(), 1.0);
        let r = report(vec![entity("cash sa", "1A", 1.0, 0.0)], vec![]);
        let result = compute_score(&r, &rules);
        assert_eq!(result.contributions["fin_cash"].impact, 0.0);
    }

    #[test]
    fn test_contingency_and_t6_features() {
        let rules = zero_rules();
        let mut scotia = entity("SCOTIABANK", "1C", 100.0, 5.0);
        scotia.rubros.push(Rubro {
            nombre: "CONTINGENCIAS".into(),
            mn: 10.0,
            me: 0.0,
        });
        let r = report(
            vec![scotia, entity("OCA", "1A", 1.0, 0.0), entity("BROU", "1A", 1.0, 0.0)],
            vec![entity("OCA", "2B", 1.0, 0.0), entity("BROU", "1A", 1.0, 0.0)],
        );
        let totals = Totals::accumulate(&r.periods.t0.entities);
        let features: BTreeMap<_, _> = feature_activations(&r, &rules, &totals)
            .into_iter()
            .map(|(name, active, raw)| (name, (active, raw)))
            .collect();

        assert_eq!(features.len(), crate::rules::LOGISTIC_FEATURES.len());
        assert_eq!(features["contingencia_scotia"].0, 1.0);
        assert_eq!(features["contingencia_brou"].0, 0.0);
        assert_eq!(features["t6_entidades_2_3"], (1.0, 2.0));
        assert_eq!(features["t6_peor_2b_mas"].0, 1.0);
        assert_eq!(features["t6_sin_datos"].0, 0.0);
        assert_eq!(features["t0_peor_1c"].0, 1.0);
        assert_eq!(features["t0_con_vencido"], (1.0, 5.0));
        assert_eq!(features["t0_entidades_crecen"], (1.0, 1.0));
        assert_eq!(features["fin_oca"].0, 1.0);
        assert_eq!(features["banco_brou"].0, 1.0);
        assert_eq!(features["banco_scotia"].0, 0.0);
    }

    #[test]
    fn test_bounded_variant_is_clamped() {
        let mut rules = default_rules();
        rules.variant = EngineVariant::Bounded;
        rules.base_score = 0.75;

        let clean = compute_score(&report(vec![entity("BROU", "1A", 10.0, 0.0)], vec![]), &rules);
        assert_eq!(clean.final_score, 0.75);
        assert_eq!(clean.base_score, 0.75);

        let heavy = report(
            (0..8)
                .map(|i| entity(&format!("ENT{}", i), "1A", 200_000.0, 600.0))
                .collect(),
            vec![],
        );
        rules.base_score = 0.5;
        let result = compute_score(&heavy, &rules);
        // 0.5 - 0.3 (capped) - 0.24 - 0.2 (capped)
        assert_eq!(result.final_score, 0.0);
        assert!(result.raw_score < 0.0);
        assert_eq!(result.contributions["deudaTotal"].impact, -0.3);
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(1_000.0) <= 1.0);
        assert!(sigmoid(-1_000.0) >= 0.0);
        assert!(sigmoid(-1_000.0).is_finite());
    }

    #[test]
    fn test_data_quality_levels() {
        let full = report(
            vec![entity("BROU", "1A", 1.0, 0.0)],
            vec![entity("BROU", "1A", 1.0, 0.0)],
        );
        let quality = data_quality(&full);
        assert_eq!(quality.level, QualityLevel::High);
        assert_eq!(quality.percentage, 100);

        let mut partial = report(vec![entity("", "ZZ", 1.0, 0.0)], vec![]);
        partial.metadata.nombre = None;
        let quality = data_quality(&partial);
        assert_eq!(quality.percentage, 20);
        assert_eq!(quality.level, QualityLevel::Low);
    }

    #[test]
    fn test_identical_inputs_give_identical_results() {
        let r = report(
            vec![entity("BBVA", "2A", 100.0, 0.0), entity("CREDITEL", "1C", 50.0, 0.0)],
            vec![entity("BBVA", "1A", 10.0, 0.0)],
        );
        let rules = default_rules();
        assert_eq!(compute_score(&r, &rules), compute_score(&r, &rules));
    }
}
