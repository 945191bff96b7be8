//! Provider payload -> canonical `CreditReport`.

use crate::errors::NormalizationError;
use crate::models::{
    CreditReport, Entity, Period, Periods, ProviderId, ReportFlags, ReportMetadata, Rubro,
};
use crate::providers::coerce;
use crate::providers::equifax::{EquifaxEntity, EquifaxPayload};
use crate::providers::mym::{MymEntity, MymPayload};
use crate::providers::RawProviderPayload;
use crate::validator::clean_document;

/// Rating used when a provider sends an entity without one.
pub const UNRATED: &str = "N/C";

/// Uppercases and collapses whitespace so alias matching sees one spelling.
pub fn canonical_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

fn canonical_rating(raw: Option<&str>) -> String {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        Some(rating) => rating.to_ascii_uppercase(),
        None => UNRATED.to_string(),
    }
}

fn rubro(name: Option<&str>, mn: f64, me: f64) -> Rubro {
    Rubro {
        nombre: canonical_name(name.unwrap_or_default()),
        mn,
        me,
    }
}

pub fn normalize(
    payload: RawProviderPayload,
    bad_ratings: &[String],
) -> Result<CreditReport, NormalizationError> {
    let report = match payload {
        RawProviderPayload::Equifax(payload) => normalize_equifax(payload)?,
        RawProviderPayload::Mym(payload) => normalize_mym(payload)?,
    };
    Ok(flag_rejectable(report, bad_ratings))
}

fn flag_rejectable(mut report: CreditReport, bad_ratings: &[String]) -> CreditReport {
    report.flags.has_rejectable_rating = report
        .metadata
        .worst_rating
        .as_deref()
        .map(|worst| bad_ratings.iter().any(|bad| bad.trim().eq_ignore_ascii_case(worst)))
        .unwrap_or(false);
    report
}

fn require_documento(provider: ProviderId, candidates: &[Option<&str>]) -> Result<String, NormalizationError> {
    candidates
        .iter()
        .flatten()
        .map(|raw| clean_document(raw))
        .find(|doc| !doc.is_empty())
        .ok_or_else(|| NormalizationError::missing(provider, "documento"))
}

fn build_report(
    documento: String,
    provider: ProviderId,
    t0: Vec<Entity>,
    t6: Vec<Entity>,
    nombre: Option<String>,
    is_deceased: bool,
    metadata: ReportMetadata,
) -> Result<CreditReport, NormalizationError> {
    if t0.is_empty() {
        return Err(NormalizationError::missing(provider, "t0.entities"));
    }

    let t0 = Period::from_entities(t0);
    let t6 = Period::from_entities(t6);

    tracing::debug!(
        provider = %provider,
        t0_entities = t0.aggregates.entity_count,
        t6_entities = t6.aggregates.entity_count,
        "Normalized credit report"
    );

    Ok(CreditReport {
        documento,
        provider,
        flags: ReportFlags {
            is_deceased,
            has_rejectable_rating: false,
        },
        metadata: ReportMetadata {
            nombre: nombre.map(|n| canonical_name(&n)).filter(|n| !n.is_empty()),
            worst_rating: t0.aggregates.worst_rating.clone(),
            ..metadata
        },
        periods: Periods { t0, t6 },
    })
}

// ============ Equifax ============

fn equifax_entity(raw: EquifaxEntity) -> Entity {
    Entity {
        name: canonical_name(raw.entity_name.as_deref().unwrap_or_default()),
        rating: canonical_rating(raw.rating.as_deref()),
        vigente: raw.current_mn + raw.current_me,
        vencido: raw.past_due_mn + raw.past_due_me,
        castigado: raw.charged_off_mn + raw.charged_off_me,
        rubros: raw
            .items
            .into_iter()
            .map(|item| rubro(item.name.as_deref(), item.mn, item.me))
            .collect(),
    }
}

fn normalize_equifax(payload: EquifaxPayload) -> Result<CreditReport, NormalizationError> {
    const PROVIDER: ProviderId = ProviderId::Equifax;

    let consumer = payload
        .response
        .applicants
        .and_then(|a| a.primary_consumer)
        .ok_or_else(|| NormalizationError::missing(PROVIDER, "applicants.primaryConsumer"))?;
    let personal = consumer.personal_information.unwrap_or_default();
    let credit_report = consumer.credit_report.unwrap_or_default();

    let documento = require_documento(
        PROVIDER,
        &[
            Some(payload.documento.as_str()),
            personal.document_number.as_deref(),
        ],
    )?;

    let t0 = credit_report
        .current_period
        .map(|p| p.entities.into_iter().map(equifax_entity).collect())
        .unwrap_or_default();
    let t6 = credit_report
        .previous_period
        .map(|p| p.entities.into_iter().map(equifax_entity).collect())
        .unwrap_or_default();
    let is_deceased = personal
        .deceased
        .as_ref()
        .map(coerce::is_truthy_marker)
        .unwrap_or(false);

    build_report(
        documento,
        PROVIDER,
        t0,
        t6,
        personal.full_name,
        is_deceased,
        ReportMetadata {
            nombre: None,
            worst_rating: None,
            fetched_at: payload.fetched_at,
            correlation_id: payload.correlation_id,
        },
    )
}

// ============ MYM ============

fn mym_entity(raw: MymEntity) -> Entity {
    Entity {
        name: canonical_name(raw.entidad.as_deref().unwrap_or_default()),
        rating: canonical_rating(raw.calificacion.as_deref()),
        vigente: raw.vigente.total(),
        vencido: raw.vencido.total(),
        castigado: raw.castigado.total(),
        rubros: raw
            .rubros
            .into_iter()
            .map(|r| rubro(r.rubro.as_deref(), r.mn, r.me))
            .collect(),
    }
}

fn normalize_mym(payload: MymPayload) -> Result<CreditReport, NormalizationError> {
    const PROVIDER: ProviderId = ProviderId::Mym;

    let documento = require_documento(PROVIDER, &[Some(payload.documento.as_str())])?;

    build_report(
        documento,
        PROVIDER,
        payload.t0.into_iter().map(mym_entity).collect(),
        payload.t6.into_iter().map(mym_entity).collect(),
        payload.nombre,
        payload.is_deceased,
        ReportMetadata {
            nombre: None,
            worst_rating: None,
            fetched_at: payload.fetched_at,
            correlation_id: None,
        },
    )
}
