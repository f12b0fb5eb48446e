use std::time::Instant;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};

use crate::ai::{AIProvider, CompletionRequest, TokenUsage};
use crate::error::{Error, Result};
use crate::models::{
    AnalysisRecord, CareerFit, CompetitiveProfile, CoverLetter, JobSummary, MAX_RATING,
    ProfileMatch, StrategicRecommendations,
};
use crate::prompts::{ANALYSIS_PROMPT, COVER_LETTER_PROMPT, SYSTEM_PROMPT};

/// Cost per token, in the currency the user budgets in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenRates {
    pub input: f64,
    pub output: f64,
}

impl Default for TokenRates {
    fn default() -> Self {
        Self {
            input: 0.000003,
            output: 0.000015,
        }
    }
}

impl TokenRates {
    pub fn cost(&self, usage: TokenUsage) -> f64 {
        usage.input_tokens as f64 * self.input + usage.output_tokens as f64 * self.output
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    pub cover_letter_temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.2,
            cover_letter_temperature: 0.7,
        }
    }
}

/// Shape the model must answer with. Anything else is rejected.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisResponse {
    job_summary: JobSummary,
    career_fit_analysis: CareerFit,
    profile_match_assessment: ProfileMatch,
    competitive_profile: CompetitiveProfile,
    strategic_recommendations: StrategicRecommendations,
}

pub struct OfferAnalyzer<'a> {
    provider: &'a dyn AIProvider,
    rates: TokenRates,
    settings: GenerationSettings,
}

impl<'a> OfferAnalyzer<'a> {
    pub fn new(provider: &'a dyn AIProvider, rates: TokenRates, settings: GenerationSettings) -> Self {
        Self {
            provider,
            rates,
            settings,
        }
    }

    /// Run one analysis request and turn the answer into a record for `file_name`.
    pub fn analyze(
        &self,
        file_name: &str,
        offer_text: &str,
        personal_context: &str,
    ) -> Result<AnalysisRecord> {
        let system = system_prompt(personal_context);
        let prompt = format!("{ANALYSIS_PROMPT}\n\n<job_offer>\n{offer_text}\n</job_offer>");
        let (text, cost) = self.request(file_name, &system, &prompt, self.settings.temperature)?;

        let response = parse_analysis_response(&text)?;
        Ok(AnalysisRecord {
            file_name: file_name.to_string(),
            timestamp: Utc::now(),
            job_summary: response.job_summary,
            career_fit: response.career_fit_analysis,
            profile_match: response.profile_match_assessment,
            competitive_profile: response.competitive_profile,
            strategic_recommendations: response.strategic_recommendations,
            offer_content: offer_text.to_string(),
            analysis_cost: cost,
            cover_letter: None,
        })
    }

    pub fn generate_cover_letter(
        &self,
        record: &AnalysisRecord,
        personal_context: &str,
    ) -> Result<CoverLetter> {
        let analysis = serde_json::to_string_pretty(record)
            .map_err(|e| Error::AnalysisParse(format!("cannot encode analysis: {e}")))?;
        let system = system_prompt(personal_context);
        let prompt = format!("Job analysis:\n{analysis}\n\n{COVER_LETTER_PROMPT}");
        let (text, cost) = self.request(
            &record.file_name,
            &system,
            &prompt,
            self.settings.cover_letter_temperature,
        )?;

        let content = text.trim();
        if content.is_empty() {
            return Err(Error::AnalysisParse(format!(
                "empty cover letter returned for '{}'",
                record.file_name
            )));
        }
        Ok(CoverLetter {
            content: content.to_string(),
            generated_at: Utc::now(),
            generation_cost: cost,
        })
    }

    fn request(
        &self,
        file_name: &str,
        system: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<(String, f64)> {
        let started = Instant::now();
        let completion = self.provider.complete(&CompletionRequest {
            system,
            prompt,
            max_tokens: self.settings.max_tokens,
            temperature,
        })?;
        let cost = self.rates.cost(completion.usage);

        info!(
            file_name,
            model = self.provider.model_name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            input_tokens = completion.usage.input_tokens,
            output_tokens = completion.usage.output_tokens,
            cost,
            "LLM call finished"
        );
        Ok((completion.text, cost))
    }
}

fn system_prompt(personal_context: &str) -> String {
    if personal_context.is_empty() {
        SYSTEM_PROMPT.to_string()
    } else {
        format!("{SYSTEM_PROMPT}\n\n{personal_context}")
    }
}

fn parse_analysis_response(text: &str) -> Result<AnalysisResponse> {
    let json = extract_json(text)
        .ok_or_else(|| Error::AnalysisParse("response contains no JSON object".to_string()))?;
    debug!(bytes = json.len(), "parsing analysis response");

    let response: AnalysisResponse =
        serde_json::from_str(json).map_err(|e| Error::AnalysisParse(e.to_string()))?;

    let ratings = [
        (
            "careerDevelopmentRating",
            response.career_fit_analysis.career_development_rating,
        ),
        (
            "matchCompatibilityRating",
            response.profile_match_assessment.match_compatibility_rating,
        ),
        (
            "successProbabilityRating",
            response.competitive_profile.success_probability_rating,
        ),
        (
            "chanceRating",
            response.strategic_recommendations.should_apply.chance_rating,
        ),
    ];
    for (name, value) in ratings {
        if !value.is_finite() || !(0.0..=MAX_RATING).contains(&value) {
            return Err(Error::AnalysisParse(format!(
                "{name} must be between 0 and {MAX_RATING}, got {value}"
            )));
        }
    }
    Ok(response)
}

/// Strips ```json fences, or falls back to the outermost `{...}` slice.
fn extract_json(text: &str) -> Option<&str> {
    let text = text.trim();
    let unfenced = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .map(|rest| rest.trim_start())
        .map(|rest| rest.strip_suffix("```").unwrap_or(rest).trim());
    let text = unfenced.unwrap_or(text);

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ai::Completion;
    use crate::models::fixtures::record;
    use std::cell::RefCell;

    /// Replays canned completions and remembers the prompts it was sent.
    pub struct StubProvider {
        replies: RefCell<Vec<Completion>>,
        pub prompts: RefCell<Vec<(String, String, f32)>>,
    }

    impl StubProvider {
        pub fn new(replies: Vec<(&str, TokenUsage)>) -> Self {
            Self {
                replies: RefCell::new(
                    replies
                        .into_iter()
                        .rev()
                        .map(|(text, usage)| Completion {
                            text: text.to_string(),
                            usage,
                        })
                        .collect(),
                ),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl AIProvider for StubProvider {
        fn complete(&self, request: &CompletionRequest) -> anyhow::Result<Completion> {
            self.prompts.borrow_mut().push((
                request.system.to_string(),
                request.prompt.to_string(),
                request.temperature,
            ));
            self.replies
                .borrow_mut()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("no canned reply left"))
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    pub fn usage(input_tokens: u64, output_tokens: u64) -> TokenUsage {
        TokenUsage {
            input_tokens,
            output_tokens,
        }
    }

    pub fn analysis_json() -> String {
        r#"{
          "jobSummary": {
            "jobTitle": "Data Engineer",
            "jobCompany": "Acme Analytics",
            "jobLocation": "Lyon",
            "jobOverview": "Build pipelines.",
            "jobFailureFactors": ["Tight budget"],
            "jobPainPointsAnalysis": null
          },
          "careerFitAnalysis": { "careerAnalysis": ["Good step"], "careerDevelopmentRating": 7.5 },
          "profileMatchAssessment": { "profileMatchAnalysis": [], "matchCompatibilityRating": 8 },
          "competitiveProfile": { "competitiveAnalysis": ["Ops background"], "successProbabilityRating": 6.5 },
          "strategicRecommendations": {
            "shouldApply": { "decision": true, "explanation": "Strong overlap", "chanceRating": 7.2 },
            "keyPointsInJobOffer": ["Airflow"],
            "matchingPointsWithProfile": ["Airflow in production"],
            "keyWordsToUse": ["orchestration"],
            "preparationSteps": "Review the stack",
            "interviewFocusAreas": "Incidents"
          },
          "offerContent": "ignored"
        }"#
        .to_string()
    }

    fn analyzer(provider: &StubProvider, rates: TokenRates) -> OfferAnalyzer<'_> {
        OfferAnalyzer::new(provider, rates, GenerationSettings::default())
    }

    #[test]
    fn test_analysis_cost_follows_rate_table() {
        let json = analysis_json();
        let provider = StubProvider::new(vec![(json.as_str(), usage(1000, 500))]);
        let rates = TokenRates {
            input: 0.000003,
            output: 0.000015,
        };

        let record = analyzer(&provider, rates)
            .analyze("offer.pdf", "Offer text", "")
            .unwrap();
        assert_eq!(record.analysis_cost, 1000.0 * 0.000003 + 500.0 * 0.000015);

        let round = TokenRates {
            input: 0.25,
            output: 1.0,
        };
        assert_eq!(round.cost(usage(1000, 500)), 750.0);
    }

    #[test]
    fn test_analyze_builds_record() {
        let json = analysis_json();
        let provider = StubProvider::new(vec![(json.as_str(), usage(10, 10))]);
        let record = analyzer(&provider, TokenRates::default())
            .analyze("offer.pdf", "We hire in Lyon.", "<documents>cv</documents>")
            .unwrap();

        assert_eq!(record.file_name, "offer.pdf");
        assert_eq!(record.company(), "Acme Analytics");
        assert_eq!(record.offer_content, "We hire in Lyon.");
        assert!(record.job_summary.job_pain_points_analysis.is_empty());
        assert_eq!(record.profile_match.match_compatibility_rating, 8.0);
        assert!(record.should_apply());
        assert!(record.cover_letter.is_none());

        let prompts = provider.prompts.borrow();
        let (system, prompt, temperature) = &prompts[0];
        assert!(system.contains("<documents>cv</documents>"));
        assert!(prompt.contains("<job_offer>\nWe hire in Lyon.\n</job_offer>"));
        assert_eq!(*temperature, 0.2);
    }

    #[test]
    fn test_analyze_accepts_fenced_json() {
        let fenced = format!("```json\n{}\n```", analysis_json());
        let provider = StubProvider::new(vec![(fenced.as_str(), usage(1, 1))]);
        assert!(
            analyzer(&provider, TokenRates::default())
                .analyze("offer.pdf", "text", "")
                .is_ok()
        );
    }

    #[test]
    fn test_prose_response_is_a_parse_error() {
        let provider = StubProvider::new(vec![("Sorry, I cannot help with that.", usage(1, 1))]);
        let result = analyzer(&provider, TokenRates::default()).analyze("offer.pdf", "text", "");
        assert!(matches!(result, Err(Error::AnalysisParse(_))));
    }

    #[test]
    fn test_missing_section_is_a_parse_error() {
        let mut value: serde_json::Value = serde_json::from_str(&analysis_json()).unwrap();
        value.as_object_mut().unwrap().remove("competitiveProfile");
        let text = value.to_string();
        let provider = StubProvider::new(vec![(text.as_str(), usage(1, 1))]);

        let err = analyzer(&provider, TokenRates::default())
            .analyze("offer.pdf", "text", "")
            .unwrap_err();
        assert!(matches!(&err, Error::AnalysisParse(msg) if msg.contains("competitiveProfile")));
    }

    #[test]
    fn test_out_of_range_rating_is_a_parse_error() {
        let text = analysis_json().replace("\"chanceRating\": 7.2", "\"chanceRating\": 72");
        let provider = StubProvider::new(vec![(text.as_str(), usage(1, 1))]);

        let err = analyzer(&provider, TokenRates::default())
            .analyze("offer.pdf", "text", "")
            .unwrap_err();
        assert!(matches!(&err, Error::AnalysisParse(msg) if msg.contains("chanceRating")));
    }

    #[test]
    fn test_provider_failure_is_surfaced() {
        let provider = StubProvider::new(vec![]);
        let result = analyzer(&provider, TokenRates::default()).analyze("offer.pdf", "text", "");
        assert!(matches!(result, Err(Error::Provider(_))));
    }

    #[test]
    fn test_cover_letter_generation() {
        let provider = StubProvider::new(vec![("\n  Dear team,\nHire me.  \n", usage(2000, 400))]);
        let rates = TokenRates {
            input: 0.5,
            output: 2.0,
        };
        let letter = analyzer(&provider, rates)
            .generate_cover_letter(&record("acme.pdf", 0.1), "ctx")
            .unwrap();

        assert_eq!(letter.content, "Dear team,\nHire me.");
        assert_eq!(letter.generation_cost, 1800.0);

        let prompts = provider.prompts.borrow();
        let (_, prompt, temperature) = &prompts[0];
        assert!(prompt.starts_with("Job analysis:\n{"));
        assert!(prompt.contains("\"file_name\": \"acme.pdf\""));
        assert_eq!(*temperature, 0.7);
    }

    #[test]
    fn test_empty_cover_letter_is_rejected() {
        let provider = StubProvider::new(vec![("   ", usage(1, 1))]);
        let result = analyzer(&provider, TokenRates::default())
            .generate_cover_letter(&record("acme.pdf", 0.1), "");
        assert!(matches!(result, Err(Error::AnalysisParse(_))));
    }

    #[test]
    fn test_extract_json() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), Some("{\"a\": 1}"));
        assert_eq!(extract_json("```\n{\"a\": 1}\n```"), Some("{\"a\": 1}"));
        assert_eq!(extract_json("Here you go: {\"a\": 1} done"), Some("{\"a\": 1}"));
        assert_eq!(extract_json("no json"), None);
    }
}
