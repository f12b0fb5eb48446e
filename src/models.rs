use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Upper bound of every rating the model is asked to produce.
pub const MAX_RATING: f64 = 10.0;

/// Structured result of analyzing one offer.
///
/// Section keys keep the camelCase names of the analysis response so the JSON
/// document stays readable next to the prompt that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub file_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "jobSummary")]
    pub job_summary: JobSummary,
    #[serde(rename = "careerFitAnalysis")]
    pub career_fit: CareerFit,
    #[serde(rename = "profileMatchAssessment")]
    pub profile_match: ProfileMatch,
    #[serde(rename = "competitiveProfile")]
    pub competitive_profile: CompetitiveProfile,
    #[serde(rename = "strategicRecommendations")]
    pub strategic_recommendations: StrategicRecommendations,
    #[serde(rename = "offerContent")]
    pub offer_content: String,
    pub analysis_cost: f64,
    #[serde(default)]
    pub cover_letter: Option<CoverLetter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_title: String,
    pub job_company: String,
    pub job_location: String,
    pub job_overview: String,
    #[serde(default, deserialize_with = "nullable")]
    pub job_failure_factors: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub job_pain_points_analysis: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareerFit {
    #[serde(default, deserialize_with = "nullable")]
    pub career_analysis: Vec<String>,
    pub career_development_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileMatch {
    #[serde(default, deserialize_with = "nullable")]
    pub profile_match_analysis: Vec<String>,
    pub match_compatibility_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitiveProfile {
    #[serde(default, deserialize_with = "nullable")]
    pub competitive_analysis: Vec<String>,
    pub success_probability_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShouldApply {
    pub decision: bool,
    pub explanation: String,
    pub chance_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategicRecommendations {
    pub should_apply: ShouldApply,
    #[serde(default, deserialize_with = "nullable")]
    pub key_points_in_job_offer: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub matching_points_with_profile: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub key_words_to_use: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub preparation_steps: String,
    #[serde(default, deserialize_with = "nullable")]
    pub interview_focus_areas: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverLetter {
    pub content: String,
    pub generated_at: DateTime<Utc>,
    pub generation_cost: f64,
}

/// Aggregate API spend, always derived from the stored records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiUsageSummary {
    pub total_cost: f64,
    pub analysis_costs: f64,
    pub cover_letter_costs: f64,
    pub requests_count: u64,
}

impl ApiUsageSummary {
    pub fn from_records(records: &[AnalysisRecord]) -> Self {
        records.iter().fold(Self::default(), |mut usage, record| {
            let letter_cost = record
                .cover_letter
                .as_ref()
                .map(|letter| letter.generation_cost)
                .unwrap_or(0.0);

            usage.analysis_costs += record.analysis_cost;
            usage.total_cost += record.analysis_cost + letter_cost;
            usage.requests_count += 1;
            if record.cover_letter.is_some() {
                usage.cover_letter_costs += letter_cost;
                usage.requests_count += 1;
            }
            usage
        })
    }
}

impl AnalysisRecord {
    /// Sum of the four ratings; used to rank offers against each other.
    pub fn total_rating(&self) -> f64 {
        self.career_fit.career_development_rating
            + self.profile_match.match_compatibility_rating
            + self.competitive_profile.success_probability_rating
            + self.strategic_recommendations.should_apply.chance_rating
    }

    /// First rating or cost that JSON and REAL columns cannot hold.
    pub fn non_finite_field(&self) -> Option<&'static str> {
        let numbers = [
            ("analysis_cost", self.analysis_cost),
            (
                "career_development_rating",
                self.career_fit.career_development_rating,
            ),
            (
                "match_compatibility_rating",
                self.profile_match.match_compatibility_rating,
            ),
            (
                "success_probability_rating",
                self.competitive_profile.success_probability_rating,
            ),
            (
                "chance_rating",
                self.strategic_recommendations.should_apply.chance_rating,
            ),
            (
                "cover_letter.generation_cost",
                self.cover_letter
                    .as_ref()
                    .map(|letter| letter.generation_cost)
                    .unwrap_or(0.0),
            ),
        ];
        numbers
            .into_iter()
            .find(|(_, value)| !value.is_finite())
            .map(|(field, _)| field)
    }

    pub fn should_apply(&self) -> bool {
        self.strategic_recommendations.should_apply.decision
    }

    pub fn company(&self) -> &str {
        &self.job_summary.job_company
    }

    pub fn title(&self) -> &str {
        &self.job_summary.job_title
    }
}

/// Analysis-time window for `rank`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Period {
    /// Analyzed on the current calendar day
    Today,
    /// Analyzed in the last 7 days
    Week,
    /// Analyzed in the last 30 days
    Month,
    All,
}

impl Period {
    /// Calendar days are taken in the time zone of `now`.
    pub fn includes<Tz: TimeZone>(self, timestamp: DateTime<Utc>, now: &DateTime<Tz>) -> bool {
        let since = |days| now.with_timezone(&Utc) - TimeDelta::days(days);
        match self {
            Period::Today => {
                timestamp.with_timezone(&now.timezone()).date_naive() == now.date_naive()
            }
            Period::Week => timestamp >= since(7),
            Period::Month => timestamp >= since(30),
            Period::All => true,
        }
    }
}

/// Records analyzed within `period`, best overall rating first.
pub fn ranked<Tz: TimeZone>(
    records: Vec<AnalysisRecord>,
    period: Period,
    now: &DateTime<Tz>,
) -> Vec<AnalysisRecord> {
    let mut kept: Vec<AnalysisRecord> = records
        .into_iter()
        .filter(|record| period.includes(record.timestamp, now))
        .collect();
    sort_by_rating(&mut kept);
    kept
}

/// Records grouped by the day they were analyzed in `tz`. Latest day first,
/// each day ranked by overall rating.
pub fn group_by_day<Tz: TimeZone>(
    records: Vec<AnalysisRecord>,
    tz: &Tz,
) -> Vec<(NaiveDate, Vec<AnalysisRecord>)> {
    let mut days: BTreeMap<NaiveDate, Vec<AnalysisRecord>> = BTreeMap::new();
    for record in records {
        let day = record.timestamp.with_timezone(tz).date_naive();
        days.entry(day).or_default().push(record);
    }
    days.into_iter()
        .rev()
        .map(|(day, mut records)| {
            sort_by_rating(&mut records);
            (day, records)
        })
        .collect()
}

fn sort_by_rating(records: &mut [AnalysisRecord]) {
    records.sort_by(|a, b| b.total_rating().total_cmp(&a.total_rating()));
}

// Models answer `null` for "not applicable"; treat it like an absent value.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn record(file_name: &str, analysis_cost: f64) -> AnalysisRecord {
        AnalysisRecord {
            file_name: file_name.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 11, 5, 9, 30, 0).unwrap(),
            job_summary: JobSummary {
                job_title: "Data Engineer".to_string(),
                job_company: "Acme Analytics".to_string(),
                job_location: "Lyon".to_string(),
                job_overview: "Build and run the batch pipelines.".to_string(),
                job_failure_factors: vec!["Tight budget".to_string()],
                job_pain_points_analysis: vec![
                    "Legacy ETL".to_string(),
                    "No monitoring".to_string(),
                ],
            },
            career_fit: CareerFit {
                career_analysis: vec!["Moves toward platform work".to_string()],
                career_development_rating: 7.5,
            },
            profile_match: ProfileMatch {
                profile_match_analysis: vec!["Strong SQL".to_string()],
                match_compatibility_rating: 8.1,
            },
            competitive_profile: CompetitiveProfile {
                competitive_analysis: vec!["Rare mix of ops and data".to_string()],
                success_probability_rating: 6.3,
            },
            strategic_recommendations: StrategicRecommendations {
                should_apply: ShouldApply {
                    decision: true,
                    explanation: "Good overlap with recent projects".to_string(),
                    chance_rating: 7.2,
                },
                key_points_in_job_offer: vec!["Airflow".to_string()],
                matching_points_with_profile: vec!["Ran Airflow in production".to_string()],
                key_words_to_use: vec!["orchestration".to_string(), "SLA".to_string()],
                preparation_steps: "Review the data stack".to_string(),
                interview_focus_areas: "Incident handling".to_string(),
            },
            offer_content: "We are hiring a data engineer in Lyon.".to_string(),
            analysis_cost,
            cover_letter: None,
        }
    }

    pub fn cover_letter(generation_cost: f64) -> CoverLetter {
        CoverLetter {
            content: "Dear hiring team,\n\nI would like to apply.".to_string(),
            generated_at: Utc.with_ymd_and_hms(2024, 11, 6, 14, 0, 0).unwrap(),
            generation_cost,
        }
    }
}
