use crate::models::{AnalysisRecord, MAX_RATING};

const WRAP_WIDTH: usize = 80;

/// Markdown view of one analysis, as printed by `show`.
pub fn render_markdown(record: &AnalysisRecord) -> String {
    let summary = &record.job_summary;
    let recommendations = &record.strategic_recommendations;
    let mut out = String::new();

    out.push_str(&format!("# {} - {}\n\n", summary.job_title, summary.job_company));
    if !summary.job_location.is_empty() {
        out.push_str(&format!("**Location**: {}\n", summary.job_location));
    }
    out.push_str(&format!("**File**: {}\n", record.file_name));
    out.push_str(&format!(
        "**Analyzed**: {}\n",
        record.timestamp.format("%Y-%m-%d %H:%M UTC")
    ));
    out.push_str(&format!(
        "**Overall rating**: {:.1} / {:.0}\n\n",
        record.total_rating(),
        4.0 * MAX_RATING
    ));

    out.push_str("## Overview\n\n");
    out.push_str(&textwrap::fill(&summary.job_overview, WRAP_WIDTH));
    out.push_str("\n\n");
    push_list(&mut out, "Failure factors", &summary.job_failure_factors);
    push_list(&mut out, "Pain points", &summary.job_pain_points_analysis);

    out.push_str("## Ratings\n\n");
    out.push_str("| Dimension | Rating |\n|---|---|\n");
    for (label, rating) in [
        ("Career development", record.career_fit.career_development_rating),
        ("Match compatibility", record.profile_match.match_compatibility_rating),
        ("Success probability", record.competitive_profile.success_probability_rating),
        ("Chance", recommendations.should_apply.chance_rating),
    ] {
        out.push_str(&format!("| {} | {:.1} |\n", label, rating));
    }
    out.push('\n');

    push_list(&mut out, "Career fit", &record.career_fit.career_analysis);
    push_list(&mut out, "Profile match", &record.profile_match.profile_match_analysis);
    push_list(
        &mut out,
        "Competitive profile",
        &record.competitive_profile.competitive_analysis,
    );

    out.push_str("## Recommendation\n\n");
    let decision = if record.should_apply() { "Apply" } else { "Do not apply" };
    out.push_str(&format!("**{}**\n\n", decision));
    if !recommendations.should_apply.explanation.is_empty() {
        out.push_str(&textwrap::fill(&recommendations.should_apply.explanation, WRAP_WIDTH));
        out.push_str("\n\n");
    }
    push_list(&mut out, "Key points in the offer", &recommendations.key_points_in_job_offer);
    push_list(
        &mut out,
        "Matching points",
        &recommendations.matching_points_with_profile,
    );
    if !recommendations.key_words_to_use.is_empty() {
        out.push_str(&format!(
            "**Keywords**: {}\n\n",
            recommendations.key_words_to_use.join(", ")
        ));
    }
    push_text(&mut out, "Preparation", &recommendations.preparation_steps);
    push_text(&mut out, "Interview focus", &recommendations.interview_focus_areas);

    if let Some(letter) = &record.cover_letter {
        out.push_str("## Cover letter\n\n");
        for paragraph in letter.content.split("\n\n") {
            out.push_str(&textwrap::fill(paragraph.trim(), WRAP_WIDTH));
            out.push_str("\n\n");
        }
        out.push_str(&format!(
            "*Generated {} (${:.4})*\n\n",
            letter.generated_at.format("%Y-%m-%d %H:%M UTC"),
            letter.generation_cost
        ));
    }

    out.push_str("---\n");
    out.push_str(&format!("*Analysis cost: ${:.4}*\n", record.analysis_cost));
    out
}

fn push_list(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("### {}\n\n", heading));
    for item in items {
        let wrapped = textwrap::fill(
            item,
            textwrap::Options::new(WRAP_WIDTH)
                .initial_indent("- ")
                .subsequent_indent("  "),
        );
        out.push_str(&wrapped);
        out.push('\n');
    }
    out.push('\n');
}

fn push_text(out: &mut String, heading: &str, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    out.push_str(&format!("### {}\n\n", heading));
    out.push_str(&textwrap::fill(text, WRAP_WIDTH));
    out.push_str("\n\n");
}
