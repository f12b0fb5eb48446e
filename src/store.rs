use std::path::Path;

use crate::config::{Config, StorageKind};
use crate::db::SqliteStore;
use crate::error::{Error, Result};
use crate::json_store::JsonStore;
use crate::models::{AnalysisRecord, ApiUsageSummary, CoverLetter};

/// Persistence contract shared by the JSON document and the SQLite table.
///
/// Implementations assume a single writer. A missing backing file is an empty
/// store, never an error.
pub trait AnalysisStore {
    /// Every stored record, in a stable order.
    fn load_all(&self) -> Result<Vec<AnalysisRecord>>;

    /// Insert, or replace the record with the same `file_name`.
    fn save(&self, record: &AnalysisRecord) -> Result<()>;

    /// Attach a cover letter to an existing record and return the updated record.
    fn append_cover_letter(&self, file_name: &str, cover_letter: CoverLetter)
    -> Result<AnalysisRecord>;

    fn describe(&self) -> String;

    fn get(&self, file_name: &str) -> Result<Option<AnalysisRecord>> {
        Ok(self
            .load_all()?
            .into_iter()
            .find(|record| record.file_name == file_name))
    }

    fn usage_summary(&self) -> Result<ApiUsageSummary> {
        Ok(ApiUsageSummary::from_records(&self.load_all()?))
    }
}

/// Refuse records whose numbers cannot be written back faithfully.
pub(crate) fn ensure_finite(record: &AnalysisRecord, path: &Path) -> Result<()> {
    match record.non_finite_field() {
        Some(field) => Err(Error::StorageWrite {
            path: path.to_path_buf(),
            file_name: record.file_name.clone(),
            reason: format!("{field} is not a finite number"),
        }),
        None => Ok(()),
    }
}

pub const JSON_FILE_NAME: &str = "analyses.json";
pub const SQLITE_FILE_NAME: &str = "analyses.db";

/// Open the backend selected in the configuration.
pub fn open_store(config: &Config) -> Result<Box<dyn AnalysisStore>> {
    let store: Box<dyn AnalysisStore> = match config.storage {
        StorageKind::Json => Box::new(JsonStore::new(config.data_dir.join(JSON_FILE_NAME))),
        StorageKind::Sqlite => Box::new(SqliteStore::open(config.data_dir.join(SQLITE_FILE_NAME))?),
    };
    tracing::debug!(store = %store.describe(), "opened analysis store");
    Ok(store)
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every backend must share; each backend's tests call these.

    use super::AnalysisStore;
    use crate::error::Error;
    use crate::models::ApiUsageSummary;
    use crate::models::fixtures::{cover_letter, record};

    pub fn empty_store_loads_nothing(store: &dyn AnalysisStore) {
        assert!(store.load_all().unwrap().is_empty());
        assert_eq!(store.usage_summary().unwrap(), ApiUsageSummary::default());
    }

    pub fn save_distinct_records(store: &dyn AnalysisStore) {
        let records = vec![
            record("first.pdf", 0.5),
            record("second.pdf", 0.25),
            record("third.pdf", 0.125),
        ];
        for r in &records {
            store.save(r).unwrap();
        }

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded, records);

        let expected_total: f64 = records.iter().map(|r| r.analysis_cost).sum();
        let usage = store.usage_summary().unwrap();
        assert_eq!(usage.total_cost, expected_total);
        assert_eq!(usage.requests_count, 3);
    }

    pub fn save_is_idempotent(store: &dyn AnalysisStore) {
        let r = record("offer.pdf", 0.5);
        store.save(&r).unwrap();
        let once = store.load_all().unwrap();
        store.save(&r).unwrap();
        assert_eq!(store.load_all().unwrap(), once);
    }

    pub fn save_replaces_same_file_name(store: &dyn AnalysisStore) {
        store.save(&record("a.pdf", 0.5)).unwrap();
        store.save(&record("b.pdf", 0.5)).unwrap();

        let mut updated = record("a.pdf", 0.75);
        updated.job_summary.job_title = "Senior Data Engineer".to_string();
        store.save(&updated).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], updated);
        assert_eq!(loaded[1].file_name, "b.pdf");
    }

    pub fn non_finite_numbers_are_refused(store: &dyn AnalysisStore) {
        store.save(&record("good.pdf", 0.5)).unwrap();
        let before = store.load_all().unwrap();

        let err = store.save(&record("nan.pdf", f64::NAN)).unwrap_err();
        assert!(matches!(
            err,
            Error::StorageWrite { ref file_name, ref reason, .. }
                if file_name == "nan.pdf" && reason.contains("analysis_cost")
        ));

        let err = store
            .append_cover_letter("good.pdf", cover_letter(f64::INFINITY))
            .unwrap_err();
        assert!(matches!(err, Error::StorageWrite { ref file_name, .. } if file_name == "good.pdf"));

        assert_eq!(store.load_all().unwrap(), before);
        assert_eq!(store.usage_summary().unwrap().total_cost, 0.5);
    }

    pub fn append_cover_letter_rules(store: &dyn AnalysisStore) {
        store.save(&record("a.pdf", 0.5)).unwrap();

        let missing = store.append_cover_letter("nope.pdf", cover_letter(0.25));
        assert!(matches!(missing, Err(Error::RecordNotFound(name)) if name == "nope.pdf"));

        let updated = store.append_cover_letter("a.pdf", cover_letter(0.25)).unwrap();
        assert_eq!(updated.cover_letter, Some(cover_letter(0.25)));
        assert_eq!(store.get("a.pdf").unwrap(), Some(updated));

        let again = store.append_cover_letter("a.pdf", cover_letter(0.5));
        assert!(matches!(again, Err(Error::CoverLetterExists(_))));

        let usage = store.usage_summary().unwrap();
        assert_eq!(usage.total_cost, 0.75);
        assert_eq!(usage.cover_letter_costs, 0.25);
        assert_eq!(usage.requests_count, 2);
    }
}
