//! Forgery screening for uploaded document images.
//!
//! An upload is compared against a directory of operator-catalogued
//! reference images using a perceptual fingerprint, its byte size, and
//! metadata signals drawn from its client-supplied name and storage path.
//! The outcome is always a [`engine::Verdict`]; when anything goes wrong
//! mid-pipeline the engine resolves to forged-by-default rather than
//! surfacing an error.
//!
//! Corpus file names carry trust: a reference's base name identifies the
//! document it vouches for, and an upload bearing a catalogued name is
//! accepted on the name alone. Point the engine only at corpus directories
//! whose contents operators control.

pub mod audit;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod signals;
pub mod similarity;

pub use config::EngineConfig;
pub use engine::{CancelToken, DecisionEngine, UploadEvidence, Verdict};
pub use error::{ConfigError, EngineError};

use std::path::Path;

/// One-call verification for embedders that do not hold an engine.
///
/// Fails only on an invalid `config`; every other condition is folded into
/// the verdict.
pub fn verify(
    upload_bytes: Vec<u8>,
    original_filename: &str,
    storage_path: &Path,
    corpus_dir: &Path,
    config: EngineConfig,
) -> Result<Verdict, ConfigError> {
    let engine = DecisionEngine::new(config)?;
    let upload = UploadEvidence::new(upload_bytes, original_filename, storage_path);
    Ok(engine.verify(&upload, corpus_dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_call_verify_rejects_bad_config() {
        let config = EngineConfig {
            similarity_threshold: 200.0,
            ..EngineConfig::default()
        };
        let result = verify(
            Vec::new(),
            "scan.png",
            Path::new("/uploads/scan.png"),
            Path::new("/nowhere"),
            config,
        );
        assert!(matches!(result, Err(ConfigError::ThresholdOutOfRange(_))));
    }

    #[test]
    fn test_one_call_verify_reaches_a_verdict() {
        let temp_dir = tempfile::tempdir().unwrap();
        let verdict = verify(
            b"bytes".to_vec(),
            "scan.png",
            Path::new("/uploads/scan.png"),
            temp_dir.path(),
            EngineConfig::default(),
        )
        .unwrap();
        assert!(verdict.is_forged);
        assert_eq!(verdict.reason, "no references available");
    }
}
