use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::warn;

use crate::error::{Error, Result};

/// Collect the user's `.txt` and `.md` documents (CV, profile notes) into one
/// tagged block that is sent along with every request.
///
/// A missing directory yields an empty string; unreadable files are skipped.
pub fn load_personal_context(dir: &Path) -> Result<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(String::new()),
        Err(e) => return Err(Error::offer_io(&dir.display().to_string(), "read context directory", e)),
    };

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_context_document(path))
        .collect();
    paths.sort();

    let mut documents = String::new();
    let mut index = 1;
    for path in paths {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable context document");
                continue;
            }
        };
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        documents.push_str(&format!(
            "<document index=\"{index}\">\n<source>{source}</source>\n<document_content>\n{}\n</document_content>\n</document>\n",
            content.trim()
        ));
        index += 1;
    }

    if documents.is_empty() {
        return Ok(String::new());
    }
    Ok(format!(
        "Here is the context about me to use for the analysis:\n<documents>\n{documents}</documents>"
    ))
}

fn is_context_document(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}
