use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::EngineError;

/// File extensions recognized as reference images, lowercase.
pub const REFERENCE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "tif", "tiff", "bmp"];

/// A catalogued genuine sample.
///
/// Created when an operator submits a document to the corpus; never mutated
/// afterwards. Removal is an external corpus-management action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceImage {
    /// Display name, which is the stored file name.
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl ReferenceImage {
    /// Base name without extension, lowercased, for name-identity checks.
    pub fn stem_lowercase(&self) -> String {
        stem_lowercase(&self.name)
    }
}

/// Lowercased file stem of `name`, empty when there is none.
pub fn stem_lowercase(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Whether `path` carries one of the recognized raster extensions.
pub fn has_reference_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| REFERENCE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Enumerate the reference corpus.
///
/// The listing is a snapshot of the directory's top level, filtered to
/// recognized raster extensions and sorted by file name so repeated calls
/// over an unchanged corpus see the same order (ties elsewhere break on that
/// order). A missing directory reports [`EngineError::CorpusUnavailable`],
/// which the engine treats as an empty corpus rather than a failure.
pub fn list_references(corpus_dir: &Path) -> Result<Vec<ReferenceImage>, EngineError> {
    if !corpus_dir.is_dir() {
        return Err(EngineError::CorpusUnavailable {
            path: corpus_dir.display().to_string(),
        });
    }

    let mut references = Vec::new();
    for entry in WalkDir::new(corpus_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() || !has_reference_extension(entry.path()) {
            continue;
        }
        let metadata = entry.metadata().map_err(io::Error::from)?;
        references.push(ReferenceImage {
            name: entry.file_name().to_string_lossy().to_string(),
            path: entry.path().to_path_buf(),
            size_bytes: metadata.len(),
        });
    }

    Ok(references)
}

/// Register a genuine sample, preserving the submitted name.
///
/// Directory components in `submitted_name` are dropped, so a hostile name
/// cannot write outside `corpus_dir`. The directory is created on first use.
/// An existing file of the same name is overwritten; interactive callers
/// should confirm before letting that happen.
pub fn add_reference(
    corpus_dir: &Path,
    submitted_name: &str,
    bytes: &[u8],
) -> Result<ReferenceImage, EngineError> {
    let file_name = Path::new(submitted_name)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid reference name: {submitted_name:?}"),
            )
        })?;

    fs::create_dir_all(corpus_dir)?;
    let path = corpus_dir.join(&file_name);
    fs::write(&path, bytes)?;
    log::debug!("registered reference {} in {}", file_name, corpus_dir.display());

    Ok(ReferenceImage {
        name: file_name,
        path,
        size_bytes: bytes.len() as u64,
    })
}
