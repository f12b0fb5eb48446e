use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{
    AnalysisRecord, CareerFit, CompetitiveProfile, CoverLetter, JobSummary, ProfileMatch,
    ShouldApply, StrategicRecommendations,
};
use crate::store::{ensure_finite, AnalysisStore};

/// Tabular backend: one row per analysis, ratings and costs as REAL columns,
/// list fields as embedded JSON text.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

const COLUMNS: &str = "file_name, timestamp,
    job_title, job_company, job_location, job_overview, job_failure_factors, job_pain_points,
    career_analysis, career_development_rating,
    profile_match_analysis, match_compatibility_rating,
    competitive_analysis, success_probability_rating,
    should_apply, should_apply_explanation, chance_rating,
    key_points_in_job_offer, matching_points_with_profile, key_words_to_use,
    preparation_steps, interview_focus_areas,
    offer_content, analysis_cost,
    cover_letter_content, cover_letter_generated_at, cover_letter_cost";

impl SqliteStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let read_error = |reason: String| Error::StorageRead {
            path: path.clone(),
            reason,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| read_error(e.to_string()))?;
        }
        let conn = Connection::open(&path).map_err(|e| read_error(e.to_string()))?;
        let store = Self { conn, path };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS analyses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_name TEXT NOT NULL UNIQUE,
                timestamp TEXT NOT NULL,
                job_title TEXT NOT NULL,
                job_company TEXT NOT NULL,
                job_location TEXT NOT NULL,
                job_overview TEXT NOT NULL,
                job_failure_factors TEXT NOT NULL,
                job_pain_points TEXT NOT NULL,
                career_analysis TEXT NOT NULL,
                career_development_rating REAL NOT NULL,
                profile_match_analysis TEXT NOT NULL,
                match_compatibility_rating REAL NOT NULL,
                competitive_analysis TEXT NOT NULL,
                success_probability_rating REAL NOT NULL,
                should_apply INTEGER NOT NULL CHECK (should_apply IN (0, 1)),
                should_apply_explanation TEXT NOT NULL,
                chance_rating REAL NOT NULL,
                key_points_in_job_offer TEXT NOT NULL,
                matching_points_with_profile TEXT NOT NULL,
                key_words_to_use TEXT NOT NULL,
                preparation_steps TEXT NOT NULL,
                interview_focus_areas TEXT NOT NULL,
                offer_content TEXT NOT NULL,
                analysis_cost REAL NOT NULL,
                cover_letter_content TEXT,
                cover_letter_generated_at TEXT,
                cover_letter_cost REAL
            );

            CREATE INDEX IF NOT EXISTS idx_analyses_company ON analyses(job_company);
            "#,
            )
            .map_err(|e| self.read_error(e))
    }

    fn read_error(&self, reason: impl ToString) -> Error {
        Error::StorageRead {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    fn write_error(&self, file_name: &str, reason: impl ToString) -> Error {
        Error::StorageWrite {
            path: self.path.clone(),
            file_name: file_name.to_string(),
            reason: reason.to_string(),
        }
    }

    fn upsert(&self, conn: &Connection, record: &AnalysisRecord) -> Result<()> {
        let summary = &record.job_summary;
        let strategy = &record.strategic_recommendations;
        let letter = record.cover_letter.as_ref();
        let list = |items: &[String]| {
            serde_json::to_string(items).map_err(|e| self.write_error(&record.file_name, e))
        };

        let sql = format!(
            "INSERT INTO analyses ({COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)
             ON CONFLICT(file_name) DO UPDATE SET
                timestamp = excluded.timestamp,
                job_title = excluded.job_title,
                job_company = excluded.job_company,
                job_location = excluded.job_location,
                job_overview = excluded.job_overview,
                job_failure_factors = excluded.job_failure_factors,
                job_pain_points = excluded.job_pain_points,
                career_analysis = excluded.career_analysis,
                career_development_rating = excluded.career_development_rating,
                profile_match_analysis = excluded.profile_match_analysis,
                match_compatibility_rating = excluded.match_compatibility_rating,
                competitive_analysis = excluded.competitive_analysis,
                success_probability_rating = excluded.success_probability_rating,
                should_apply = excluded.should_apply,
                should_apply_explanation = excluded.should_apply_explanation,
                chance_rating = excluded.chance_rating,
                key_points_in_job_offer = excluded.key_points_in_job_offer,
                matching_points_with_profile = excluded.matching_points_with_profile,
                key_words_to_use = excluded.key_words_to_use,
                preparation_steps = excluded.preparation_steps,
                interview_focus_areas = excluded.interview_focus_areas,
                offer_content = excluded.offer_content,
                analysis_cost = excluded.analysis_cost,
                cover_letter_content = excluded.cover_letter_content,
                cover_letter_generated_at = excluded.cover_letter_generated_at,
                cover_letter_cost = excluded.cover_letter_cost"
        );

        conn.execute(
            &sql,
            params![
                record.file_name,
                encode_time(&record.timestamp),
                summary.job_title,
                summary.job_company,
                summary.job_location,
                summary.job_overview,
                list(&summary.job_failure_factors)?,
                list(&summary.job_pain_points_analysis)?,
                list(&record.career_fit.career_analysis)?,
                record.career_fit.career_development_rating,
                list(&record.profile_match.profile_match_analysis)?,
                record.profile_match.match_compatibility_rating,
                list(&record.competitive_profile.competitive_analysis)?,
                record.competitive_profile.success_probability_rating,
                strategy.should_apply.decision,
                strategy.should_apply.explanation,
                strategy.should_apply.chance_rating,
                list(&strategy.key_points_in_job_offer)?,
                list(&strategy.matching_points_with_profile)?,
                list(&strategy.key_words_to_use)?,
                strategy.preparation_steps,
                strategy.interview_focus_areas,
                record.offer_content,
                record.analysis_cost,
                letter.map(|l| l.content.as_str()),
                letter.map(|l| encode_time(&l.generated_at)),
                letter.map(|l| l.generation_cost),
            ],
        )
        .map_err(|e| self.write_error(&record.file_name, e))?;
        Ok(())
    }

    fn query_one(&self, conn: &Connection, file_name: &str) -> Result<Option<AnalysisRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM analyses WHERE file_name = ?1");
        let raw = conn
            .query_row(&sql, [file_name], RawRow::from_row)
            .optional()
            .map_err(|e| self.read_error(e))?;
        raw.map(|raw| raw.into_record().map_err(|e| self.read_error(e)))
            .transpose()
    }
}

impl AnalysisStore for SqliteStore {
    fn load_all(&self) -> Result<Vec<AnalysisRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM analyses ORDER BY id");
        let mut stmt = self.conn.prepare(&sql).map_err(|e| self.read_error(e))?;
        let rows = stmt
            .query_map([], RawRow::from_row)
            .map_err(|e| self.read_error(e))?;

        let mut records = Vec::new();
        for raw in rows {
            let raw = raw.map_err(|e| self.read_error(e))?;
            records.push(raw.into_record().map_err(|e| self.read_error(e))?);
        }
        Ok(records)
    }

    fn save(&self, record: &AnalysisRecord) -> Result<()> {
        ensure_finite(record, &self.path)?;
        self.upsert(&self.conn, record)?;
        info!(file_name = %record.file_name, path = %self.path.display(), "saved analysis");
        Ok(())
    }

    fn append_cover_letter(
        &self,
        file_name: &str,
        cover_letter: CoverLetter,
    ) -> Result<AnalysisRecord> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| self.write_error(file_name, e))?;

        let mut record = self
            .query_one(&tx, file_name)?
            .ok_or_else(|| Error::RecordNotFound(file_name.to_string()))?;
        if record.cover_letter.is_some() {
            return Err(Error::CoverLetterExists(file_name.to_string()));
        }
        record.cover_letter = Some(cover_letter);
        ensure_finite(&record, &self.path)?;

        if let Some(letter) = &record.cover_letter {
            tx.execute(
                "UPDATE analyses
                 SET cover_letter_content = ?1, cover_letter_generated_at = ?2, cover_letter_cost = ?3
                 WHERE file_name = ?4",
                params![
                    letter.content,
                    encode_time(&letter.generated_at),
                    letter.generation_cost,
                    file_name
                ],
            )
            .map_err(|e| self.write_error(file_name, e))?;
        }
        tx.commit().map_err(|e| self.write_error(file_name, e))?;

        info!(file_name, "stored cover letter");
        Ok(record)
    }

    fn get(&self, file_name: &str) -> Result<Option<AnalysisRecord>> {
        self.query_one(&self.conn, file_name)
    }

    fn describe(&self) -> String {
        format!("sqlite ({})", self.path.display())
    }
}

/// Column values as stored, before the JSON columns are decoded.
struct RawRow {
    file_name: String,
    timestamp: String,
    job_title: String,
    job_company: String,
    job_location: String,
    job_overview: String,
    job_failure_factors: String,
    job_pain_points: String,
    career_analysis: String,
    career_development_rating: f64,
    profile_match_analysis: String,
    match_compatibility_rating: f64,
    competitive_analysis: String,
    success_probability_rating: f64,
    should_apply: bool,
    should_apply_explanation: String,
    chance_rating: f64,
    key_points_in_job_offer: String,
    matching_points_with_profile: String,
    key_words_to_use: String,
    preparation_steps: String,
    interview_focus_areas: String,
    offer_content: String,
    analysis_cost: f64,
    cover_letter_content: Option<String>,
    cover_letter_generated_at: Option<String>,
    cover_letter_cost: Option<f64>,
}

impl RawRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            file_name: row.get(0)?,
            timestamp: row.get(1)?,
            job_title: row.get(2)?,
            job_company: row.get(3)?,
            job_location: row.get(4)?,
            job_overview: row.get(5)?,
            job_failure_factors: row.get(6)?,
            job_pain_points: row.get(7)?,
            career_analysis: row.get(8)?,
            career_development_rating: row.get(9)?,
            profile_match_analysis: row.get(10)?,
            match_compatibility_rating: row.get(11)?,
            competitive_analysis: row.get(12)?,
            success_probability_rating: row.get(13)?,
            should_apply: row.get(14)?,
            should_apply_explanation: row.get(15)?,
            chance_rating: row.get(16)?,
            key_points_in_job_offer: row.get(17)?,
            matching_points_with_profile: row.get(18)?,
            key_words_to_use: row.get(19)?,
            preparation_steps: row.get(20)?,
            interview_focus_areas: row.get(21)?,
            offer_content: row.get(22)?,
            analysis_cost: row.get(23)?,
            cover_letter_content: row.get(24)?,
            cover_letter_generated_at: row.get(25)?,
            cover_letter_cost: row.get(26)?,
        })
    }

    fn into_record(self) -> std::result::Result<AnalysisRecord, String> {
        let cover_letter = match (
            self.cover_letter_content,
            self.cover_letter_generated_at,
            self.cover_letter_cost,
        ) {
            (Some(content), Some(generated_at), Some(generation_cost)) => Some(CoverLetter {
                content,
                generated_at: decode_time(&generated_at)?,
                generation_cost,
            }),
            (None, None, None) => None,
            _ => {
                return Err(format!(
                    "incomplete cover letter columns for '{}'",
                    self.file_name
                ));
            }
        };

        Ok(AnalysisRecord {
            timestamp: decode_time(&self.timestamp)?,
            job_summary: JobSummary {
                job_title: self.job_title,
                job_company: self.job_company,
                job_location: self.job_location,
                job_overview: self.job_overview,
                job_failure_factors: decode_list(&self.job_failure_factors)?,
                job_pain_points_analysis: decode_list(&self.job_pain_points)?,
            },
            career_fit: CareerFit {
                career_analysis: decode_list(&self.career_analysis)?,
                career_development_rating: self.career_development_rating,
            },
            profile_match: ProfileMatch {
                profile_match_analysis: decode_list(&self.profile_match_analysis)?,
                match_compatibility_rating: self.match_compatibility_rating,
            },
            competitive_profile: CompetitiveProfile {
                competitive_analysis: decode_list(&self.competitive_analysis)?,
                success_probability_rating: self.success_probability_rating,
            },
            strategic_recommendations: StrategicRecommendations {
                should_apply: ShouldApply {
                    decision: self.should_apply,
                    explanation: self.should_apply_explanation,
                    chance_rating: self.chance_rating,
                },
                key_points_in_job_offer: decode_list(&self.key_points_in_job_offer)?,
                matching_points_with_profile: decode_list(&self.matching_points_with_profile)?,
                key_words_to_use: decode_list(&self.key_words_to_use)?,
                preparation_steps: self.preparation_steps,
                interview_focus_areas: self.interview_focus_areas,
            },
            offer_content: self.offer_content,
            analysis_cost: self.analysis_cost,
            cover_letter,
            file_name: self.file_name,
        })
    }
}

fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)
}

fn decode_time(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{raw}': {e}"))
}

fn decode_list(raw: &str) -> std::result::Result<Vec<String>, String> {
    serde_json::from_str(raw).map_err(|e| format!("bad list column '{raw}': {e}"))
}
