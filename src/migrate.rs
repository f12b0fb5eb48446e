use std::collections::HashMap;

use tracing::info;

use crate::error::{Error, Result};
use crate::models::AnalysisRecord;
use crate::store::AnalysisStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: usize,
    pub verified: usize,
}

/// Copy every record of `source` into `dest`, optionally reading the
/// destination back and comparing it field by field. The source is only read.
pub fn migrate(
    source: &dyn AnalysisStore,
    dest: &dyn AnalysisStore,
    verify: bool,
) -> Result<MigrationReport> {
    let records = source.load_all()?;
    info!(
        from = %source.describe(),
        to = %dest.describe(),
        count = records.len(),
        "migrating analyses"
    );

    for record in &records {
        dest.save(record)?;
    }
    let mut report = MigrationReport {
        migrated: records.len(),
        verified: 0,
    };

    if verify {
        let stored: HashMap<String, AnalysisRecord> = dest
            .load_all()?
            .into_iter()
            .map(|record| (record.file_name.clone(), record))
            .collect();

        for expected in &records {
            let field = match stored.get(&expected.file_name) {
                None => Some("record"),
                Some(actual) => first_difference(expected, actual),
            };
            if let Some(field) = field {
                return Err(Error::MigrationVerification {
                    file_name: expected.file_name.clone(),
                    field: field.to_string(),
                });
            }
            report.verified += 1;
        }
        info!(verified = report.verified, "migration verified");
    }

    Ok(report)
}

/// Dotted path of the first field where the two records disagree.
fn first_difference(a: &AnalysisRecord, b: &AnalysisRecord) -> Option<&'static str> {
    let (js_a, js_b) = (&a.job_summary, &b.job_summary);
    let (sr_a, sr_b) = (&a.strategic_recommendations, &b.strategic_recommendations);

    let checks = [
        ("file_name", a.file_name == b.file_name),
        ("timestamp", a.timestamp == b.timestamp),
        ("job_summary.job_title", js_a.job_title == js_b.job_title),
        ("job_summary.job_company", js_a.job_company == js_b.job_company),
        ("job_summary.job_location", js_a.job_location == js_b.job_location),
        ("job_summary.job_overview", js_a.job_overview == js_b.job_overview),
        (
            "job_summary.job_failure_factors",
            js_a.job_failure_factors == js_b.job_failure_factors,
        ),
        (
            "job_summary.job_pain_points_analysis",
            js_a.job_pain_points_analysis == js_b.job_pain_points_analysis,
        ),
        (
            "career_fit.career_analysis",
            a.career_fit.career_analysis == b.career_fit.career_analysis,
        ),
        (
            "career_fit.career_development_rating",
            same_f64(
                a.career_fit.career_development_rating,
                b.career_fit.career_development_rating,
            ),
        ),
        (
            "profile_match.profile_match_analysis",
            a.profile_match.profile_match_analysis == b.profile_match.profile_match_analysis,
        ),
        (
            "profile_match.match_compatibility_rating",
            same_f64(
                a.profile_match.match_compatibility_rating,
                b.profile_match.match_compatibility_rating,
            ),
        ),
        (
            "competitive_profile.competitive_analysis",
            a.competitive_profile.competitive_analysis == b.competitive_profile.competitive_analysis,
        ),
        (
            "competitive_profile.success_probability_rating",
            same_f64(
                a.competitive_profile.success_probability_rating,
                b.competitive_profile.success_probability_rating,
            ),
        ),
        (
            "strategic_recommendations.should_apply.decision",
            sr_a.should_apply.decision == sr_b.should_apply.decision,
        ),
        (
            "strategic_recommendations.should_apply.explanation",
            sr_a.should_apply.explanation == sr_b.should_apply.explanation,
        ),
        (
            "strategic_recommendations.should_apply.chance_rating",
            same_f64(sr_a.should_apply.chance_rating, sr_b.should_apply.chance_rating),
        ),
        (
            "strategic_recommendations.key_points_in_job_offer",
            sr_a.key_points_in_job_offer == sr_b.key_points_in_job_offer,
        ),
        (
            "strategic_recommendations.matching_points_with_profile",
            sr_a.matching_points_with_profile == sr_b.matching_points_with_profile,
        ),
        (
            "strategic_recommendations.key_words_to_use",
            sr_a.key_words_to_use == sr_b.key_words_to_use,
        ),
        (
            "strategic_recommendations.preparation_steps",
            sr_a.preparation_steps == sr_b.preparation_steps,
        ),
        (
            "strategic_recommendations.interview_focus_areas",
            sr_a.interview_focus_areas == sr_b.interview_focus_areas,
        ),
        ("offer_content", a.offer_content == b.offer_content),
        ("analysis_cost", same_f64(a.analysis_cost, b.analysis_cost)),
    ];
    if let Some((field, _)) = checks.into_iter().find(|(_, equal)| !equal) {
        return Some(field);
    }

    match (&a.cover_letter, &b.cover_letter) {
        (None, None) => None,
        (Some(x), Some(y)) if x.content != y.content => Some("cover_letter.content"),
        (Some(x), Some(y)) if x.generated_at != y.generated_at => Some("cover_letter.generated_at"),
        (Some(x), Some(y)) if !same_f64(x.generation_cost, y.generation_cost) => {
            Some("cover_letter.generation_cost")
        }
        (Some(_), Some(_)) => None,
        _ => Some("cover_letter"),
    }
}

// Bitwise: a round trip must not lose a single ulp.
fn same_f64(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits()
}
