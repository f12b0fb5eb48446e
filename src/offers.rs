//! Offer PDFs on disk. The directory a file sits in is its lifecycle state:
//! `0_new` → `1_in_progress` → `2_archived` → deleted.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, SystemTime};

use chrono::NaiveDate;
use regex::Regex;
use tracing::{info, warn};

use crate::error::{Error, Result};

const BYTES_PER_MB: u64 = 1024 * 1024;
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;
const MAX_NAME_SUFFIX: u32 = 99;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{Alphabetic}\p{Nd}]+").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferState {
    New,
    InProgress,
    Archived,
}

impl OfferState {
    pub const ALL: [OfferState; 3] = [OfferState::New, OfferState::InProgress, OfferState::Archived];

    fn dir_name(self) -> &'static str {
        match self {
            OfferState::New => "0_new",
            OfferState::InProgress => "1_in_progress",
            OfferState::Archived => "2_archived",
        }
    }
}

impl fmt::Display for OfferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OfferState::New => "new",
            OfferState::InProgress => "in progress",
            OfferState::Archived => "archived",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferFile {
    pub path: PathBuf,
    pub state: OfferState,
    /// Name the file had when it was first picked up.
    pub original_name: String,
}

impl OfferFile {
    fn at(path: PathBuf, state: OfferState) -> Self {
        let original_name = file_name_of(&path);
        Self {
            path,
            state,
            original_name,
        }
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotPdf,
    TooLarge { size: u64, limit: u64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotPdf => f.write_str("not a PDF"),
            SkipReason::TooLarge { size, limit } => write!(
                f,
                "{:.1} MB exceeds the {} MB limit",
                *size as f64 / BYTES_PER_MB as f64,
                limit / BYTES_PER_MB
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub file_name: String,
    pub reason: SkipReason,
}

#[derive(Debug, Default)]
pub struct NewOffers {
    pub offers: Vec<OfferFile>,
    pub skipped: Vec<SkippedFile>,
}

pub struct OfferFileManager {
    root: PathBuf,
    max_file_size_bytes: u64,
}

impl OfferFileManager {
    pub fn new(root: impl Into<PathBuf>, max_file_size_mb: u64) -> Self {
        Self {
            root: root.into(),
            max_file_size_bytes: max_file_size_mb.saturating_mul(BYTES_PER_MB),
        }
    }

    pub fn dir(&self, state: OfferState) -> PathBuf {
        self.root.join(state.dir_name())
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for state in OfferState::ALL {
            let dir = self.dir(state);
            fs::create_dir_all(&dir)
                .map_err(|e| Error::offer_io(&dir.display().to_string(), "create directory", e))?;
        }
        Ok(())
    }

    /// PDFs waiting for analysis, plus every file that was passed over and why.
    pub fn list_new(&self) -> Result<NewOffers> {
        let mut result = NewOffers::default();
        for path in self.files_in(OfferState::New)? {
            let file_name = file_name_of(&path);
            if !is_pdf(&path) {
                result.skipped.push(SkippedFile {
                    file_name,
                    reason: SkipReason::NotPdf,
                });
                continue;
            }

            let size = fs::metadata(&path)
                .map_err(|e| Error::offer_io(&file_name, "inspect", e))?
                .len();
            if size > self.max_file_size_bytes {
                warn!(file_name = %file_name, size, "skipping oversized offer");
                result.skipped.push(SkippedFile {
                    file_name,
                    reason: SkipReason::TooLarge {
                        size,
                        limit: self.max_file_size_bytes,
                    },
                });
                continue;
            }
            result.offers.push(OfferFile::at(path, OfferState::New));
        }
        Ok(result)
    }

    pub fn list(&self, state: OfferState) -> Result<Vec<OfferFile>> {
        Ok(self
            .files_in(state)?
            .into_iter()
            .map(|path| OfferFile::at(path, state))
            .collect())
    }

    pub fn find(&self, state: OfferState, file_name: &str) -> Result<OfferFile> {
        let path = self.dir(state).join(file_name);
        if file_name.contains(['/', '\\']) || !path.is_file() {
            return Err(Error::offer_io(
                file_name,
                "find",
                std::io::Error::new(ErrorKind::NotFound, format!("not in {state} offers")),
            ));
        }
        Ok(OfferFile::at(path, state))
    }

    /// New → InProgress.
    pub fn begin_processing(&self, file: &OfferFile) -> Result<OfferFile> {
        self.expect_state(file, OfferState::New, "start processing")?;
        let target = self.dir(OfferState::InProgress).join(file.file_name());
        self.move_file(file, target, OfferState::InProgress, "start processing")
    }

    /// Give an in-progress offer its canonical `company_position_YYYYMMDD.pdf`
    /// name. A taken name is retried as `..._YYYYMMDD_2.pdf`, `_3` and so on.
    pub fn finalize(
        &self,
        file: &OfferFile,
        company: &str,
        position: &str,
        date: NaiveDate,
    ) -> Result<OfferFile> {
        self.expect_state(file, OfferState::InProgress, "rename")?;
        let name = canonical_name(&file.file_name(), company, position, date)?;
        let stem = name.trim_end_matches(".pdf");

        let mut candidate = name.clone();
        for n in 2..=MAX_NAME_SUFFIX {
            match self.rename_in_progress(file, &candidate) {
                Err(Error::FileConflict { .. }) => candidate = format!("{stem}_{n}.pdf"),
                other => return other,
            }
        }
        self.rename_in_progress(file, &candidate)
    }

    /// InProgress → Archived. The archival time is kept as the file's mtime,
    /// stamped before the move so an archived file always carries it.
    pub fn archive(&self, file: &OfferFile) -> Result<OfferFile> {
        self.expect_state(file, OfferState::InProgress, "archive")?;
        let target = self.dir(OfferState::Archived).join(file.file_name());
        if target.exists() {
            return Err(self.conflict(file, &target, "archive"));
        }

        let name = file.file_name();
        fs::File::options()
            .write(true)
            .open(&file.path)
            .and_then(|f| f.set_modified(SystemTime::now()))
            .map_err(|e| Error::offer_io(&name, "stamp archival time of", e))?;
        self.move_file(file, target, OfferState::Archived, "archive")
    }

    /// Archived offers whose archival time is at least `retention_days` old.
    pub fn expired(&self, retention_days: u32) -> Result<Vec<OfferFile>> {
        let retention = Duration::from_secs(u64::from(retention_days) * SECONDS_PER_DAY);
        let now = SystemTime::now();

        let mut expired = Vec::new();
        for file in self.list(OfferState::Archived)? {
            let name = file.file_name();
            let archived_at = fs::metadata(&file.path)
                .and_then(|m| m.modified())
                .map_err(|e| Error::offer_io(&name, "inspect", e))?;
            // A stamp in the future counts as age zero.
            let age = now.duration_since(archived_at).unwrap_or(Duration::ZERO);
            if age >= retention {
                expired.push(file);
            }
        }
        Ok(expired)
    }

    /// Delete expired archives. Irreversible.
    pub fn cleanup(&self, retention_days: u32) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        for file in self.expired(retention_days)? {
            let name = file.file_name();
            fs::remove_file(&file.path).map_err(|e| Error::offer_io(&name, "delete", e))?;
            info!(file_name = %name, "removed archived offer");
            deleted.push(name);
        }
        Ok(deleted)
    }

    fn files_in(&self, state: OfferState) -> Result<Vec<PathBuf>> {
        let dir = self.dir(state);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::offer_io(&dir.display().to_string(), "list", e));
            }
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::offer_io(&dir.display().to_string(), "list", e))?;
            let path = entry.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn expect_state(&self, file: &OfferFile, expected: OfferState, operation: &'static str) -> Result<()> {
        let in_expected_dir = file.path.parent() == Some(self.dir(expected).as_path());
        if file.state != expected || !in_expected_dir {
            return Err(Error::InvalidTransition {
                file_name: file.file_name(),
                operation,
                state: file.state.to_string(),
            });
        }
        Ok(())
    }

    fn rename_in_progress(&self, file: &OfferFile, name: &str) -> Result<OfferFile> {
        let target = self.dir(OfferState::InProgress).join(name);
        if target == file.path {
            return Ok(file.clone());
        }
        self.move_file(file, target, OfferState::InProgress, "rename")
    }

    fn conflict(&self, file: &OfferFile, target: &Path, operation: &'static str) -> Error {
        Error::FileConflict {
            file_name: file.file_name(),
            target: file_name_of(target),
            operation,
            dir: target.parent().map(Path::to_path_buf).unwrap_or_default(),
        }
    }

    fn move_file(
        &self,
        file: &OfferFile,
        target: PathBuf,
        state: OfferState,
        operation: &'static str,
    ) -> Result<OfferFile> {
        let name = file.file_name();
        if target.exists() {
            return Err(self.conflict(file, &target, operation));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::offer_io(&name, operation, e))?;
        }
        fs::rename(&file.path, &target).map_err(|e| Error::offer_io(&name, operation, e))?;
        info!(from = %file.path.display(), to = %target.display(), "moved offer");

        Ok(OfferFile {
            path: target,
            state,
            original_name: file.original_name.clone(),
        })
    }
}

/// `company_position_YYYYMMDD.pdf`, with each component lowercased and every
/// run of non-alphanumeric characters collapsed into `_`.
pub fn canonical_name(
    file_name: &str,
    company: &str,
    position: &str,
    date: NaiveDate,
) -> Result<String> {
    let company = sanitize_component(file_name, "company", company)?;
    let position = sanitize_component(file_name, "position", position)?;
    Ok(format!("{company}_{position}_{}.pdf", date.format("%Y%m%d")))
}

fn sanitize_component(file_name: &str, component: &'static str, value: &str) -> Result<String> {
    let invalid = || Error::InvalidNameComponent {
        file_name: file_name.to_string(),
        component,
        value: value.to_string(),
    };

    if value.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        return Err(invalid());
    }
    let lowered = value.to_lowercase();
    let cleaned = NON_ALPHANUMERIC.replace_all(&lowered, "_");
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        return Err(invalid());
    }
    Ok(cleaned.to_string())
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
