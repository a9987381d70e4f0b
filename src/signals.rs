use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

/// Filename substrings that suggest an operator-labelled genuine sample.
pub const GENUINE_KEYWORDS: [&str; 3] = ["genuine", "original", "authentic"];

/// Filename substrings that suggest a known forgery. "forg" is a prefix
/// form and catches both "forged" and "forgery".
pub const FRAUD_KEYWORDS: [&str; 3] = ["fraud", "fake", "forg"];

/// Metadata-only evidence for one upload.
///
/// These signals come from names an uploader controls, not from pixels.
/// While a corpus exists they only ever narrow or override the pixel
/// comparison, never replace it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSignals {
    /// The filename carries a genuine-sounding keyword.
    pub genuine_hint: bool,
    /// The filename carries a fraud keyword.
    pub fraud_hint: bool,
    /// The storage path crosses a known fraudulent-sample location.
    pub fraud_path_hint: bool,
}

impl MetadataSignals {
    /// True when the metadata alone would justify trusting the upload as a
    /// first reference.
    pub fn trusted_for_bootstrap(self) -> bool {
        self.genuine_hint && !self.fraud_hint && !self.fraud_path_hint
    }

    pub fn any_fraud(self) -> bool {
        self.fraud_hint || self.fraud_path_hint
    }
}

/// Derive metadata signals from the upload's original filename and storage
/// path. All checks are case-insensitive substring matches.
pub fn collect(
    original_filename: &str,
    storage_path: &Path,
    config: &EngineConfig,
) -> MetadataSignals {
    let name = original_filename.to_lowercase();
    let path = storage_path.to_string_lossy().to_lowercase();

    MetadataSignals {
        genuine_hint: GENUINE_KEYWORDS.iter().any(|keyword| name.contains(keyword)),
        fraud_hint: FRAUD_KEYWORDS.iter().any(|keyword| name.contains(keyword)),
        fraud_path_hint: config
            .fraud_path_markers
            .iter()
            .filter(|marker| !marker.is_empty())
            .any(|marker| path.contains(&marker.to_lowercase())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_default(filename: &str, storage_path: &str) -> MetadataSignals {
        collect(filename, Path::new(storage_path), &EngineConfig::default())
    }

    #[test]
    fn test_genuine_keywords_set_the_hint() {
        for name in ["passport_GENUINE.png", "original-scan.jpg", "authentic.tif"] {
            let signals = collect_default(name, "/uploads/a.png");
            assert!(signals.genuine_hint, "{name} should hint genuine");
            assert!(!signals.fraud_hint);
        }
    }

    #[test]
    fn test_fraud_keywords_including_prefix_form() {
        for name in ["fraud.png", "FAKE_id.jpg", "forged.png", "forgery_v2.bmp"] {
            let signals = collect_default(name, "/uploads/a.png");
            assert!(signals.fraud_hint, "{name} should hint fraud");
        }
    }

    #[test]
    fn test_plain_names_carry_no_hints() {
        let signals = collect_default("invoice123.png", "/uploads/invoice123.png");
        assert!(!signals.genuine_hint);
        assert!(!signals.fraud_hint);
        assert!(!signals.fraud_path_hint);
    }

    #[test]
    fn test_path_markers_match_case_insensitively() {
        let signals = collect_default("receipt.png", "/data/Copy_Paste/receipt.png");
        assert!(signals.fraud_path_hint);

        let signals = collect_default("receipt.png", "/data/inbox/receipt.png");
        assert!(!signals.fraud_path_hint);
    }

    #[test]
    fn test_custom_markers_from_config() {
        let mut config = EngineConfig::default();
        config.fraud_path_markers.insert("quarantine".to_string());
        let signals = collect(
            "scan.png",
            Path::new("/srv/quarantine/scan.png"),
            &config,
        );
        assert!(signals.fraud_path_hint);
    }

    #[test]
    fn test_bootstrap_trust_requires_clean_signals() {
        let trusted = collect_default("id_genuine.png", "/uploads/id_genuine.png");
        assert!(trusted.trusted_for_bootstrap());

        // A genuine keyword is not enough when a fraud signal also fires.
        let conflicted = collect_default("genuine_fake.png", "/uploads/genuine_fake.png");
        assert!(conflicted.genuine_hint && conflicted.fraud_hint);
        assert!(!conflicted.trusted_for_bootstrap());

        let bad_path = collect_default("genuine.png", "/data/imitation/genuine.png");
        assert!(!bad_path.trusted_for_bootstrap());
    }
}
