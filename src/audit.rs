//! Append-only audit trail of verification outcomes.
//!
//! Each verdict is recorded as one JSON line in `.verifications.jsonl`
//! inside the corpus directory, so the trail travels with the references it
//! was judged against. Records carry a content digest of the upload, which
//! lets an operator later prove which bytes were judged without retaining
//! the upload itself.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::engine::{UploadEvidence, Verdict};

pub const AUDIT_FILE_NAME: &str = ".verifications.jsonl";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub timestamp: String,
    pub file: String,
    /// blake3 digest of the uploaded bytes, hex-encoded.
    pub content_digest: String,
    pub is_forged: bool,
    pub similarity: f64,
    pub best_match: Option<String>,
    pub reason: String,
}

impl AuditRecord {
    pub fn capture(upload: &UploadEvidence, verdict: &Verdict) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            file: upload.original_filename.clone(),
            content_digest: blake3::hash(&upload.bytes).to_hex().to_string(),
            is_forged: verdict.is_forged,
            similarity: verdict.similarity,
            best_match: verdict.best_match.clone(),
            reason: verdict.reason.clone(),
        }
    }
}

pub fn audit_path(corpus_dir: &Path) -> PathBuf {
    corpus_dir.join(AUDIT_FILE_NAME)
}

/// Append one record to the trail, creating the file (and corpus directory)
/// on first use.
pub fn append(corpus_dir: &Path, record: &AuditRecord) -> Result<()> {
    fs::create_dir_all(corpus_dir)
        .with_context(|| format!("Failed to create directory {:?}", corpus_dir))?;
    let path = audit_path(corpus_dir);
    let mut out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open audit file {:?}", path))?;
    writeln!(out, "{}", serde_json::to_string(record)?)?;
    Ok(())
}

/// Read the whole trail in write order. Malformed lines are skipped with a
/// warning so one bad entry cannot hide the rest.
pub fn read_all(corpus_dir: &Path) -> Result<Vec<AuditRecord>> {
    let path = audit_path(corpus_dir);
    let file =
        File::open(&path).with_context(|| format!("Could not open audit file {:?}", path))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        match serde_json::from_str::<AuditRecord>(&line) {
            Ok(record) => records.push(record),
            Err(err) => log::warn!("skipping malformed audit entry {index}: {err}"),
        }
    }
    Ok(records)
}
