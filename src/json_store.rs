//! Row-oriented backend: one pretty-printed JSON document, easy to diff by hand.

use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{AnalysisRecord, ApiUsageSummary, CoverLetter};
use crate::store::{ensure_finite, AnalysisStore};

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    timestamp: DateTime<Utc>,
    analyses: Vec<Batch>,
    // Written for people reading the file; usage is always recomputed from records.
    #[serde(default)]
    api_usage: ApiUsageSummary,
}

#[derive(Debug, Serialize, Deserialize)]
struct Batch {
    timestamp: DateTime<Utc>,
    offers: Vec<AnalysisRecord>,
}

impl Document {
    fn empty() -> Self {
        let now = Utc::now();
        Self {
            timestamp: now,
            analyses: vec![Batch {
                timestamp: now,
                offers: Vec::new(),
            }],
            api_usage: ApiUsageSummary::default(),
        }
    }

    fn records(&self) -> impl Iterator<Item = &AnalysisRecord> {
        self.analyses.iter().flat_map(|batch| batch.offers.iter())
    }

    fn find_mut(&mut self, file_name: &str) -> Option<&mut AnalysisRecord> {
        self.analyses
            .iter_mut()
            .flat_map(|batch| batch.offers.iter_mut())
            .find(|record| record.file_name == file_name)
    }

    fn upsert(&mut self, record: &AnalysisRecord) {
        if let Some(existing) = self.find_mut(&record.file_name) {
            *existing = record.clone();
            return;
        }
        if self.analyses.is_empty() {
            self.analyses.push(Batch {
                timestamp: Utc::now(),
                offers: Vec::new(),
            });
        }
        if let Some(batch) = self.analyses.last_mut() {
            batch.offers.push(record.clone());
        }
    }
}

pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Document> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "analysis file missing, starting empty");
                return Ok(Document::empty());
            }
            Err(e) => return Err(self.read_error(e)),
        };
        serde_json::from_str(&raw).map_err(|e| self.read_error(e))
    }

    fn write_document(&self, mut document: Document, file_name: &str) -> Result<()> {
        let write_error = |reason: String| Error::StorageWrite {
            path: self.path.clone(),
            file_name: file_name.to_string(),
            reason,
        };

        let records: Vec<AnalysisRecord> = document.records().cloned().collect();
        document.api_usage = ApiUsageSummary::from_records(&records);
        document.timestamp = Utc::now();

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| write_error(e.to_string()))?;

        // Readers only ever see the old or the new document.
        let temp = NamedTempFile::new_in(&dir).map_err(|e| write_error(e.to_string()))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, &document)
                .map_err(|e| write_error(e.to_string()))?;
            writer.flush().map_err(|e| write_error(e.to_string()))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| write_error(e.to_string()))?;
        temp.persist(&self.path)
            .map_err(|e| write_error(e.error.to_string()))?;
        Ok(())
    }

    fn read_error(&self, reason: impl ToString) -> Error {
        Error::StorageRead {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

impl AnalysisStore for JsonStore {
    fn load_all(&self) -> Result<Vec<AnalysisRecord>> {
        Ok(self.read_document()?.records().cloned().collect())
    }

    fn save(&self, record: &AnalysisRecord) -> Result<()> {
        ensure_finite(record, &self.path)?;
        let mut document = self.read_document()?;
        document.upsert(record);
        self.write_document(document, &record.file_name)?;
        info!(file_name = %record.file_name, path = %self.path.display(), "saved analysis");
        Ok(())
    }

    fn append_cover_letter(
        &self,
        file_name: &str,
        cover_letter: CoverLetter,
    ) -> Result<AnalysisRecord> {
        let mut document = self.read_document()?;
        let record = document
            .find_mut(file_name)
            .ok_or_else(|| Error::RecordNotFound(file_name.to_string()))?;
        if record.cover_letter.is_some() {
            return Err(Error::CoverLetterExists(file_name.to_string()));
        }
        record.cover_letter = Some(cover_letter);
        let updated = record.clone();
        ensure_finite(&updated, &self.path)?;

        self.write_document(document, file_name)?;
        info!(file_name, "stored cover letter");
        Ok(updated)
    }

    fn describe(&self) -> String {
        format!("json ({})", self.path.display())
    }
}
