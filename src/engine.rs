//! The decision engine: one pass from upload to verdict.
//!
//! Every verification walks the same short-circuit ladder (empty-corpus
//! bootstrap, exact-name identity, metadata fraud signals, then pixel
//! comparison and fusion) and always ends in a [`Verdict`]. Internal
//! failures such as undecodable images or disk errors fold into a
//! forged-by-default verdict carrying the cause; nothing propagates to the
//! caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::corpus::{self, ReferenceImage};
use crate::error::{ConfigError, EngineError};
use crate::fingerprint::{ImageFingerprint, PerceptualHasher};
use crate::signals::{self, MetadataSignals};
use crate::similarity;

/// The subject of one verification request.
///
/// Held only for the duration of the call; the engine keeps no reference to
/// it once the verdict is produced.
#[derive(Debug, Clone)]
pub struct UploadEvidence {
    pub bytes: Vec<u8>,
    /// Name the client supplied, independent of where the file was stored.
    pub original_filename: String,
    /// Where the upload receiver stored the file.
    pub storage_path: PathBuf,
    pub size_bytes: u64,
}

impl UploadEvidence {
    pub fn new(
        bytes: Vec<u8>,
        original_filename: impl Into<String>,
        storage_path: impl Into<PathBuf>,
    ) -> Self {
        let size_bytes = bytes.len() as u64;
        Self {
            bytes,
            original_filename: original_filename.into(),
            storage_path: storage_path.into(),
            size_bytes,
        }
    }

    /// Read an upload from disk, taking the file's own name and location.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self::new(bytes, name, path))
    }

    fn stem_lowercase(&self) -> String {
        corpus::stem_lowercase(&self.original_filename)
    }
}

/// Per-signal evidence behind a verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBreakdown {
    pub signals: MetadataSignals,
    /// Raw fingerprint agreement with the best match, when pixels were
    /// compared.
    pub hash_similarity: Option<f64>,
    /// Byte-size agreement with the best match, when pixels were compared.
    pub size_similarity: Option<f64>,
    /// Upload fingerprint in hex, when one was computed.
    pub upload_fingerprint: Option<String>,
    /// How many references the upload was compared against.
    pub references_compared: usize,
}

impl EvidenceBreakdown {
    fn signals_only(signals: MetadataSignals) -> Self {
        Self {
            signals,
            hash_similarity: None,
            size_similarity: None,
            upload_fingerprint: None,
            references_compared: 0,
        }
    }
}

/// The engine's sole output: the decision plus everything behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_forged: bool,
    /// Combined similarity, always in 0-100.
    pub similarity: f64,
    /// Display name of the closest reference, when one was involved.
    pub best_match: Option<String>,
    /// Which rule decided, in operator-readable form.
    pub reason: String,
    pub evidence: EvidenceBreakdown,
}

/// Cooperative cancellation for a verification call.
///
/// Cloned handles share one flag. [`CancelToken::with_deadline`] arms a
/// wall-clock cutoff that is checked together with the flag, so callers
/// express a timeout without racing a timer against the pipeline. A
/// cancelled call resolves to the documented fallback verdict (forged,
/// similarity 0) rather than a partial result.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::Relaxed) {
            return true;
        }
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Orchestrates signal collection, corpus comparison and fusion.
///
/// Stateless across requests: the corpus is re-enumerated from disk on every
/// call so freshly added references take part immediately. Corpus file names
/// are operator-controlled; an upload whose base name matches a catalogued
/// reference is trusted as that reference without pixel comparison, and a
/// suitably named upload may bootstrap an empty corpus.
pub struct DecisionEngine {
    config: EngineConfig,
    hasher: PerceptualHasher,
}

impl DecisionEngine {
    /// Build an engine, rejecting configurations that could produce
    /// out-of-range scores.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            hasher: PerceptualHasher::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decide whether `upload` is genuine against the corpus in
    /// `corpus_dir`. Never fails; see [`DecisionEngine::verify_with_cancel`].
    pub fn verify(&self, upload: &UploadEvidence, corpus_dir: &Path) -> Verdict {
        self.verify_with_cancel(upload, corpus_dir, &CancelToken::new())
    }

    /// Like [`DecisionEngine::verify`], honoring a cancellation token.
    ///
    /// Always returns a verdict: internal failures resolve to
    /// forged-by-default with the cause in `reason`, and a cancelled token
    /// resolves to the fallback verdict.
    pub fn verify_with_cancel(
        &self,
        upload: &UploadEvidence,
        corpus_dir: &Path,
        cancel: &CancelToken,
    ) -> Verdict {
        let signals = signals::collect(&upload.original_filename, &upload.storage_path, &self.config);
        log::debug!(
            "verifying {:?} against corpus {} (signals: {:?})",
            upload.original_filename,
            corpus_dir.display(),
            signals
        );

        match self.run_pipeline(upload, corpus_dir, signals, cancel) {
            Ok(verdict) => verdict,
            Err(EngineError::Cancelled) => {
                log::warn!("verification of {:?} cancelled", upload.original_filename);
                Verdict {
                    is_forged: true,
                    similarity: 0.0,
                    best_match: None,
                    reason: "verification cancelled before completion".to_string(),
                    evidence: EvidenceBreakdown::signals_only(signals),
                }
            }
            Err(err) => {
                log::warn!(
                    "verification of {:?} failed: {err}",
                    upload.original_filename
                );
                Verdict {
                    is_forged: true,
                    similarity: 0.0,
                    best_match: None,
                    reason: format!("processing error: {err}"),
                    evidence: EvidenceBreakdown::signals_only(signals),
                }
            }
        }
    }

    fn run_pipeline(
        &self,
        upload: &UploadEvidence,
        corpus_dir: &Path,
        signals: MetadataSignals,
        cancel: &CancelToken,
    ) -> Result<Verdict, EngineError> {
        self.check_cancelled(cancel)?;

        // A missing corpus directory is the empty-corpus state, not an
        // error; anything else from enumeration is real.
        let references = match corpus::list_references(corpus_dir) {
            Ok(references) => references,
            Err(EngineError::CorpusUnavailable { .. }) => Vec::new(),
            Err(err) => return Err(err),
        };

        if references.is_empty() {
            return self.bootstrap(upload, corpus_dir, signals);
        }

        // Identity by name: an exact stem match with a catalogued sample is
        // authoritative and skips pixel comparison. This outranks the fraud
        // signals checked next.
        let upload_stem = upload.stem_lowercase();
        if !upload_stem.is_empty() {
            if let Some(reference) = references
                .iter()
                .find(|reference| reference.stem_lowercase() == upload_stem)
            {
                return Ok(Verdict {
                    is_forged: false,
                    similarity: 100.0,
                    best_match: Some(reference.name.clone()),
                    reason: format!("exact filename match with reference {:?}", reference.name),
                    evidence: EvidenceBreakdown::signals_only(signals),
                });
            }
        }

        if signals.any_fraud() {
            let mut parts = Vec::new();
            if signals.fraud_hint {
                parts.push("fraud keyword in filename");
            }
            if signals.fraud_path_hint {
                parts.push("fraud marker in storage path");
            }
            return Ok(Verdict {
                is_forged: true,
                similarity: 0.0,
                best_match: None,
                reason: parts.join(" and "),
                evidence: EvidenceBreakdown::signals_only(signals),
            });
        }

        self.check_cancelled(cancel)?;

        let upload_fp = self.hasher.hash(&upload.bytes)?;
        let Some((best_reference, best_hash)) =
            self.best_match(upload_fp, &references, cancel)?
        else {
            // The bootstrap branch already handled the empty corpus.
            return Err(EngineError::CorpusUnavailable {
                path: corpus_dir.display().to_string(),
            });
        };

        Ok(self.fuse(upload, signals, upload_fp, best_reference, best_hash, references.len()))
    }

    /// Empty-corpus policy: a cleanly genuine-named upload becomes the first
    /// reference; everything else is rejected for lack of evidence.
    ///
    /// Registration preserves the submitted name. A name outside
    /// [`corpus::REFERENCE_EXTENSIONS`] is still registered, but later
    /// listings will not see it; that case is logged as a warning.
    fn bootstrap(
        &self,
        upload: &UploadEvidence,
        corpus_dir: &Path,
        signals: MetadataSignals,
    ) -> Result<Verdict, EngineError> {
        if signals.trusted_for_bootstrap() {
            let reference =
                corpus::add_reference(corpus_dir, &upload.original_filename, &upload.bytes)?;
            log::info!(
                "bootstrapped corpus {} with first reference {:?}",
                corpus_dir.display(),
                reference.name
            );
            if !corpus::has_reference_extension(Path::new(&reference.name)) {
                log::warn!(
                    "first reference {:?} has an unrecognized extension and will not be listed",
                    reference.name
                );
            }
            return Ok(Verdict {
                is_forged: false,
                similarity: 100.0,
                best_match: None,
                reason: "added as first reference".to_string(),
                evidence: EvidenceBreakdown::signals_only(signals),
            });
        }

        Ok(Verdict {
            is_forged: true,
            similarity: 0.0,
            best_match: None,
            reason: "no references available".to_string(),
            evidence: EvidenceBreakdown::signals_only(signals),
        })
    }

    /// Hash every reference and return the best fingerprint match.
    ///
    /// The fan-out runs on the rayon pool but results are collected in
    /// corpus order and reduced sequentially, so neither the winner nor
    /// which error surfaces depends on scheduling. Ties keep the earliest
    /// reference.
    fn best_match<'a>(
        &self,
        upload_fp: ImageFingerprint,
        references: &'a [ReferenceImage],
        cancel: &CancelToken,
    ) -> Result<Option<(&'a ReferenceImage, f64)>, EngineError> {
        let scores: Vec<Result<f64, EngineError>> = references
            .par_iter()
            .map(|reference| {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                let bytes = std::fs::read(&reference.path)?;
                let reference_fp = self.hasher.hash(&bytes)?;
                Ok(similarity::hash_similarity(upload_fp, reference_fp))
            })
            .collect();

        let mut best: Option<(&ReferenceImage, f64)> = None;
        for (reference, score) in references.iter().zip(scores) {
            let score = score?;
            match best {
                Some((_, leader)) if score <= leader => {}
                _ => best = Some((reference, score)),
            }
        }
        Ok(best)
    }

    /// Blend pixel and metadata evidence into the final decision.
    fn fuse(
        &self,
        upload: &UploadEvidence,
        signals: MetadataSignals,
        upload_fp: ImageFingerprint,
        best_reference: &ReferenceImage,
        best_hash: f64,
        references_compared: usize,
    ) -> Verdict {
        let size_score = similarity::size_similarity(upload.size_bytes, best_reference.size_bytes);
        let combined = similarity::combined_similarity(best_hash, size_score, &self.config);

        let meets_threshold = combined >= self.config.similarity_threshold;
        let mut is_genuine = meets_threshold || signals.genuine_hint;
        let mut reason = if meets_threshold {
            format!(
                "similarity {combined:.1}% meets threshold {:.1}%",
                self.config.similarity_threshold
            )
        } else if signals.genuine_hint {
            format!("genuine keyword accepted despite similarity {combined:.1}%")
        } else {
            format!(
                "similarity {combined:.1}% below threshold {:.1}%",
                self.config.similarity_threshold
            )
        };

        // The fraud short-circuit fires earlier in the pipeline; fusion
        // still refuses a genuine verdict while a fraud signal is present.
        if is_genuine && signals.any_fraud() {
            is_genuine = false;
            reason = "fraud signal overrides similarity".to_string();
        }

        if is_genuine && best_hash < self.config.pixel_forgery_floor {
            is_genuine = false;
            reason = format!(
                "fingerprint similarity {best_hash:.1}% below forgery floor {:.1}%",
                self.config.pixel_forgery_floor
            );
        }

        Verdict {
            is_forged: !is_genuine,
            similarity: combined,
            best_match: Some(best_reference.name.clone()),
            reason,
            evidence: EvidenceBreakdown {
                signals,
                hash_similarity: Some(best_hash),
                size_similarity: Some(size_score),
                upload_fingerprint: Some(upload_fp.to_hex()),
                references_compared,
            },
        }
    }

    fn check_cancelled(&self, cancel: &CancelToken) -> Result<(), EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }
}
