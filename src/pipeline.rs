use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::analyzer::OfferAnalyzer;
use crate::models::AnalysisRecord;
use crate::offers::{OfferFile, OfferFileManager};
use crate::store::AnalysisStore;

pub type TextExtractor = fn(&Path) -> anyhow::Result<String>;

pub fn extract_pdf_text(path: &Path) -> anyhow::Result<String> {
    let text = pdf_extract::extract_text(path)
        .with_context(|| format!("Failed to extract text from {}", path.display()))?;
    if text.trim().is_empty() {
        anyhow::bail!("No text layer in {}", path.display());
    }
    Ok(text)
}

#[derive(Debug)]
pub struct ProcessedOffer {
    pub file: OfferFile,
    pub record: AnalysisRecord,
}

/// One offer that could not be carried through; the file stays where it stopped.
#[derive(Debug)]
pub struct ProcessFailure {
    pub file_name: String,
    pub step: &'static str,
    pub error: anyhow::Error,
}

#[derive(Debug, Default)]
pub struct ProcessSummary {
    pub processed: Vec<ProcessedOffer>,
    pub failed: Vec<ProcessFailure>,
}

/// Drives new offers through analysis one at a time.
pub struct OfferPipeline<'a> {
    pub offers: &'a OfferFileManager,
    pub store: &'a dyn AnalysisStore,
    pub analyzer: &'a OfferAnalyzer<'a>,
    pub personal_context: &'a str,
    pub extract_text: TextExtractor,
    pub write_cover_letters: bool,
    pub today: NaiveDate,
}

impl OfferPipeline<'_> {
    pub fn process_all(&self, offers: Vec<OfferFile>) -> ProcessSummary {
        let mut summary = ProcessSummary::default();
        for offer in offers {
            match self.process(&offer) {
                Ok(done) => summary.processed.push(done),
                Err(failure) => {
                    warn!(
                        file_name = %failure.file_name,
                        step = failure.step,
                        error = %failure.error,
                        "offer processing failed"
                    );
                    summary.failed.push(failure);
                }
            }
        }
        summary
    }

    fn process(&self, offer: &OfferFile) -> Result<ProcessedOffer, ProcessFailure> {
        let fail = |file: &OfferFile, step: &'static str| {
            let file_name = file.file_name();
            move |error: anyhow::Error| ProcessFailure {
                file_name,
                step,
                error,
            }
        };

        let file = self
            .offers
            .begin_processing(offer)
            .map_err(|e| fail(offer, "start processing")(e.into()))?;
        let text = (self.extract_text)(&file.path).map_err(fail(&file, "extract text"))?;

        let analysis = self
            .analyzer
            .analyze(&file.file_name(), &text, self.personal_context)
            .map_err(|e| fail(&file, "analyze")(e.into()))?;
        let file = match self
            .offers
            .finalize(&file, analysis.company(), analysis.title(), self.today)
        {
            Ok(renamed) => renamed,
            Err(e) => {
                // The analysis is paid for; keep it under the in-progress name.
                if let Err(save_error) = self.store.save(&analysis) {
                    warn!(file_name = %analysis.file_name, error = %save_error, "could not keep analysis");
                }
                return Err(fail(&file, "rename")(e.into()));
            }
        };

        let mut record = analysis;
        record.file_name = file.file_name();
        self.store
            .save(&record)
            .map_err(|e| fail(&file, "save analysis")(e.into()))?;
        info!(
            file_name = %record.file_name,
            original = %file.original_name,
            rating = record.total_rating(),
            "offer analyzed"
        );

        if self.write_cover_letters && record.should_apply() {
            let letter = self
                .analyzer
                .generate_cover_letter(&record, self.personal_context)
                .map_err(|e| fail(&file, "generate cover letter")(e.into()))?;
            record = self
                .store
                .append_cover_letter(&record.file_name, letter)
                .map_err(|e| fail(&file, "store cover letter")(e.into()))?;
        }

        Ok(ProcessedOffer { file, record })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::tests::{analysis_json, usage, StubProvider};
    use crate::analyzer::{GenerationSettings, TokenRates};
    use crate::json_store::JsonStore;
    use crate::offers::OfferState;
    use std::fs;
    use tempfile::tempdir;

    fn read_plain(path: &Path) -> anyhow::Result<String> {
        Ok(fs::read_to_string(path)?)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, 5).unwrap()
    }

    fn run(
        replies: Vec<(&str, crate::ai::TokenUsage)>,
        files: &[&str],
        write_cover_letters: bool,
    ) -> (tempfile::TempDir, ProcessSummary, JsonStore, OfferFileManager) {
        let dir = tempdir().unwrap();
        let offers = OfferFileManager::new(dir.path().join("offers"), 10);
        offers.ensure_dirs().unwrap();
        for name in files {
            fs::write(
                offers.dir(OfferState::New).join(name),
                "Data engineer wanted in Lyon.",
            )
            .unwrap();
        }
        let store = JsonStore::new(dir.path().join("analyses.json"));
        let provider = StubProvider::new(replies);
        let rates = TokenRates {
            input: 0.001,
            output: 0.002,
        };
        let analyzer = OfferAnalyzer::new(&provider, rates, GenerationSettings::default());

        let pipeline = OfferPipeline {
            offers: &offers,
            store: &store,
            analyzer: &analyzer,
            personal_context: "",
            extract_text: read_plain,
            write_cover_letters,
            today: date(),
        };
        let summary = pipeline.process_all(offers.list_new().unwrap().offers);
        (dir, summary, store, offers)
    }

    #[test]
    fn test_offer_is_analyzed_renamed_and_stored() {
        let json = analysis_json();
        let (_dir, summary, store, offers) = run(
            vec![
                (json.as_str(), usage(1000, 500)),
                ("Dear team,\nHire me.", usage(100, 50)),
            ],
            &["scan.pdf"],
            true,
        );

        assert!(summary.failed.is_empty());
        let done = &summary.processed[0];
        assert_eq!(done.file.file_name(), "acme_analytics_data_engineer_20241105.pdf");
        assert_eq!(done.file.original_name, "scan.pdf");

        let stored = store.load_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].file_name, done.file.file_name());
        assert_eq!(stored[0].offer_content, "Data engineer wanted in Lyon.");
        assert_eq!(
            stored[0].cover_letter.as_ref().map(|l| l.content.as_str()),
            Some("Dear team,\nHire me.")
        );

        let usage = store.usage_summary().unwrap();
        assert_eq!(usage.requests_count, 2);
        assert!((usage.total_cost - (2.0 + 0.2)).abs() < 1e-9);
        assert_eq!(offers.list(OfferState::InProgress).unwrap().len(), 1);
        assert!(offers.list(OfferState::New).unwrap().is_empty());
    }

    #[test]
    fn test_cover_letters_can_be_skipped() {
        let json = analysis_json();
        let (_dir, summary, store, _offers) =
            run(vec![(json.as_str(), usage(10, 10))], &["scan.pdf"], false);
        assert!(summary.failed.is_empty());
        assert!(store.load_all().unwrap()[0].cover_letter.is_none());
    }

    #[test]
    fn test_same_posting_twice_on_one_day_keeps_both() {
        let json = analysis_json();
        let (_dir, summary, store, offers) = run(
            vec![
                (json.as_str(), usage(1000, 500)),
                (json.as_str(), usage(1000, 500)),
            ],
            &["a.pdf", "b.pdf"],
            false,
        );

        assert!(summary.failed.is_empty());
        let names: Vec<String> = store
            .load_all()
            .unwrap()
            .into_iter()
            .map(|r| r.file_name)
            .collect();
        assert_eq!(
            names,
            vec![
                "acme_analytics_data_engineer_20241105.pdf",
                "acme_analytics_data_engineer_20241105_2.pdf",
            ]
        );
        assert_eq!(offers.list(OfferState::InProgress).unwrap().len(), 2);
        assert!((store.usage_summary().unwrap().total_cost - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_unusable_company_name_still_keeps_the_analysis() {
        let json = analysis_json().replace("\"Acme Analytics\"", "\"???\"");
        let (_dir, summary, store, offers) =
            run(vec![(json.as_str(), usage(1000, 500))], &["scan.pdf"], true);

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].step, "rename");
        let stored = store.load_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].file_name, "scan.pdf");
        assert!((store.usage_summary().unwrap().total_cost - 2.0).abs() < 1e-9);
        assert_eq!(
            offers.list(OfferState::InProgress).unwrap()[0].file_name(),
            "scan.pdf"
        );
    }

    #[test]
    fn test_failure_is_reported_and_loop_continues() {
        let json = analysis_json();
        let (_dir, summary, store, offers) = run(
            vec![
                ("I cannot help with that.", usage(10, 10)),
                (json.as_str(), usage(10, 10)),
            ],
            &["a.pdf", "b.pdf"],
            false,
        );

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].file_name, "a.pdf");
        assert_eq!(summary.failed[0].step, "analyze");
        assert_eq!(summary.processed.len(), 1);
        assert_eq!(summary.processed[0].file.original_name, "b.pdf");

        let in_progress: Vec<String> = offers
            .list(OfferState::InProgress)
            .unwrap()
            .iter()
            .map(OfferFile::file_name)
            .collect();
        assert!(in_progress.contains(&"a.pdf".to_string()));
        assert_eq!(store.load_all().unwrap().len(), 1);
    }
}
