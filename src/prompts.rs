pub const SYSTEM_PROMPT: &str = "You are a career coach specialised in technology and digital jobs. \
You give direct, concrete guidance on job offers, applications and cover letters, grounded only in \
the documents you are given about the candidate and the offer.";

/// Instructions for the offer analysis. The offer text is appended after them.
pub const ANALYSIS_PROMPT: &str = r#"Analyze the job offer below against my profile.

Cover these points:
1. Job summary: title, company, location, an overview (description, key responsibilities,
   required qualifications, company context, working conditions), three likely reasons the
   hire could fail, and the two or three pain points the company wants this role to solve.
2. Career fit: how the role fits my trajectory, growth opportunities, work-life balance.
   Rate the career development potential from 0 to 10.
3. Profile match: matching qualifications, gaps, strengths, weaknesses, red flags, cultural fit.
   Rate the match compatibility from 0 to 10.
4. Competitive profile: distinctive experience, the value I can bring, how to stand out.
   Rate the probability of success from 0 to 10.
5. Strategic recommendations: a chance rating from 0 to 10, whether I should apply (a chance
   rating under 7.1 means no) with an explanation, verbatim key points of the offer, matching points with my
   profile, verbatim keywords to reuse, preparation steps and likely interview focus areas.

Respond with this JSON object and nothing else:
{
  "jobSummary": {
    "jobTitle": "",
    "jobCompany": "",
    "jobLocation": "",
    "jobOverview": "",
    "jobFailureFactors": [],
    "jobPainPointsAnalysis": []
  },
  "careerFitAnalysis": {
    "careerAnalysis": [],
    "careerDevelopmentRating": 0
  },
  "profileMatchAssessment": {
    "profileMatchAnalysis": [],
    "matchCompatibilityRating": 0
  },
  "competitiveProfile": {
    "competitiveAnalysis": [],
    "successProbabilityRating": 0
  },
  "strategicRecommendations": {
    "shouldApply": {
      "decision": false,
      "explanation": "",
      "chanceRating": 0
    },
    "keyPointsInJobOffer": [],
    "matchingPointsWithProfile": [],
    "keyWordsToUse": [],
    "preparationSteps": "",
    "interviewFocusAreas": ""
  }
}

Rules:
- Follow the structure exactly and add no text outside the JSON.
- Use [] or null for anything that does not apply.
- Round ratings to one decimal place.
- Keep at most five items per list."#;

/// Instructions for the cover letter. The stored analysis is prepended as JSON.
pub const COVER_LETTER_PROMPT: &str = r#"Write the best possible cover letter for this offer.

Source rules:
- Only use facts stated in the job offer and in my documents.
- Every achievement and metric must come from my documents; invent nothing.
- Prefer the verbatim wording of the offer for skills and keywords.

Structure:
1. An opening centred on the company and the pain points identified in the analysis.
2. Two or three concrete experiences that answer those pain points.
3. What I would bring in the first months.
4. A short, confident closing.

Keep it under 350 words. Return only the letter text."#;
