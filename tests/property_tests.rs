/// Property-based tests using proptest
/// Tests invariants that should hold for all documents, reports and rating sets
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rust_credit_score::cache::MokaCacheService;
use rust_credit_score::models::{
    rating_rank, worst_rating, CreditReport, Entity, Period, Periods, ProviderId, ReportFlags,
    ReportMetadata, ScoringOptions, RATING_ORDER,
};
use rust_credit_score::orchestrator::ScoringService;
use rust_credit_score::providers::BcuAdapter;
use rust_credit_score::rules::{default_rules, DefaultsOnlyRulesSource, ScoringRulesProvider};
use rust_credit_score::scoring::compute_score;
use rust_credit_score::validator::{clean_document, is_valid_document};
use std::sync::Arc;

fn rating() -> impl Strategy<Value = String> {
    prop::sample::select(RATING_ORDER.to_vec()).prop_map(String::from)
}

fn entity() -> impl Strategy<Value = Entity> {
    (
        prop::sample::select(vec!["BROU", "SCOTIABANK", "OCA", "CREDITEL", "BANCO ITAU", "OTRO"]),
        rating(),
        0.0..50_000.0f64,
        0.0..2_000.0f64,
        prop::bool::weighted(0.1),
    )
        .prop_map(|(name, rating, vigente, vencido, castigado)| Entity {
            name: name.to_string(),
            rating,
            vigente,
            vencido,
            castigado: if castigado { 10.0 } else { 0.0 },
            rubros: vec![],
        })
}

fn report() -> impl Strategy<Value = CreditReport> {
    (
        prop::collection::vec(entity(), 0..6),
        prop::collection::vec(entity(), 0..6),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(t0, t6, is_deceased, has_rejectable_rating)| {
            let t0 = Period::from_entities(t0);
            CreditReport {
                documento: "1234567".to_string(),
                provider: ProviderId::Equifax,
                flags: ReportFlags {
                    is_deceased,
                    has_rejectable_rating,
                },
                metadata: ReportMetadata {
                    nombre: None,
                    worst_rating: t0.aggregates.worst_rating.clone(),
                    fetched_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                    correlation_id: None,
                },
                periods: Periods {
                    t0,
                    t6: Period::from_entities(t6),
                },
            }
        })
}

// Property: document validation
proptest! {
    #[test]
    fn document_validation_never_panics(raw in "\\PC*") {
        let _ = is_valid_document(&raw);
    }

    #[test]
    fn seven_or_eight_digits_are_valid(digits in "[0-9]{7,8}") {
        prop_assert!(is_valid_document(&digits));
        prop_assert_eq!(clean_document(&digits), digits);
    }

    #[test]
    fn formatting_characters_are_ignored(digits in "[0-9]{7,8}") {
        let formatted = format!("{}.{}-{}", &digits[..1], &digits[1..4], &digits[4..]);
        prop_assert!(is_valid_document(&formatted));
    }

    #[test]
    fn other_lengths_are_invalid(digits in "[0-9]{0,6}|[0-9]{9,12}") {
        prop_assert!(!is_valid_document(&digits));
    }
}

// Property: scoring engine
proptest! {
    #[test]
    fn scoring_is_deterministic(report in report()) {
        let rules = default_rules();
        prop_assert_eq!(compute_score(&report, &rules), compute_score(&report, &rules));
    }

    #[test]
    fn deceased_always_scores_zero(mut report in report()) {
        report.flags.is_deceased = true;
        let result = compute_score(&report, &default_rules());
        prop_assert!(result.is_rejected());
        prop_assert_eq!(result.final_score, 0.0);
    }

    #[test]
    fn logistic_scores_stay_in_range(report in report()) {
        let result = compute_score(&report, &default_rules());
        prop_assert!(result.final_score >= 0.0 && result.final_score <= 1000.0);
        prop_assert_eq!(result.final_score, result.final_score.round());
        if !result.is_rejected() {
            prop_assert!(result.contributions.contains_key("intercept"));
        }
    }

    #[test]
    fn worst_rating_is_never_beaten(codes in prop::collection::vec(rating(), 1..10)) {
        let worst = worst_rating(codes.iter().map(String::as_str)).unwrap();
        let worst_rank = rating_rank(worst).unwrap();
        for code in &codes {
            prop_assert!(rating_rank(code).unwrap() <= worst_rank);
        }
        prop_assert!(codes.iter().any(|c| c == worst));
    }
}

// Property: the public entry point always returns a result
proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn calculate_score_never_fails(documento in "[0-9]{7,8}", provider in 0usize..3) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let rules = Arc::new(ScoringRulesProvider::new(
            Arc::new(DefaultsOnlyRulesSource),
            Arc::new(MokaCacheService::default()),
        ));
        let service = ScoringService::new(rules).with_adapter(Arc::new(BcuAdapter));
        let provider = [ProviderId::Equifax, ProviderId::Mym, ProviderId::Bcu][provider];
        let mut options = ScoringOptions::with_provider(provider);

        let result = runtime.block_on(service.calculate_score(&documento, &mut options));
        prop_assert!(result.is_rejected());
        prop_assert_eq!(result.metadata.documento, documento);
        prop_assert!(result.metadata.error.is_some());
    }
}
