//! Document enumeration and change fingerprinting.
//!
//! The corpus is the set of regular, non-hidden files directly inside the
//! document directory whose extension is in an allow-list. The fingerprint of
//! that set is a blake3 hash over each file's name, modification time and size,
//! so touching, resizing, adding, removing or renaming a document changes it.
//! Contents are not hashed.

use crate::error::{Result, RetrieverError};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Extensions indexed when none are configured
pub const DEFAULT_EXTENSIONS: &[&str] = &["md"];

/// A document found in the document directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFile {
    /// File name, used as the chunk `source`
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

fn has_allowed_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

/// List the documents directly inside `dir`, sorted by file name.
///
/// Subdirectories are not descended into. Files that vanish between the
/// directory listing and the metadata lookup are skipped.
pub async fn list_documents(dir: &Path, extensions: &[String]) -> Result<Vec<DocumentFile>> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        RetrieverError::configuration(format!(
            "document directory {} is not readable: {e}",
            dir.display()
        ))
    })?;

    let mut documents = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| RetrieverError::io(dir, e))?
    {
        let Ok(name) = entry.file_name().into_string() else {
            tracing::debug!("Skipping non UTF-8 file name {:?}", entry.file_name());
            continue;
        };
        if name.starts_with('.') {
            continue;
        }

        let path = entry.path();
        if !has_allowed_extension(&path, extensions) {
            continue;
        }

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(RetrieverError::io(path, e)),
        };
        if !metadata.is_file() {
            continue;
        }

        documents.push(DocumentFile {
            name,
            path,
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
        });
    }

    documents.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(documents)
}

/// Lowercase hex blake3 digest identifying the state of a document list.
///
/// Order sensitive; pass the list as returned by [`list_documents`].
pub fn fingerprint(documents: &[DocumentFile]) -> String {
    let mut hasher = blake3::Hasher::new();
    for doc in documents {
        let mtime_ns = doc
            .modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        hasher.update(doc.name.as_bytes());
        hasher.update(&[0]);
        hasher.update(&mtime_ns.to_le_bytes());
        hasher.update(&doc.size.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Read a document as text. Invalid UTF-8 sequences are replaced, not rejected.
pub async fn read_document(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| RetrieverError::io(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
