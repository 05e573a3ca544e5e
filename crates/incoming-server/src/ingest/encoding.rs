//! Character-encoding detection
//!
//! Only a bounded leading sample is inspected. A byte-order mark decides on
//! its own; otherwise `chardetng` scores the candidates. Inputs without any
//! non-ASCII evidence give no confident answer and fall back to UTF-8.

use encoding_rs::{Encoding, UTF_8};
use tracing::debug;

use super::config::DEFAULT_ENCODING_SAMPLE_BYTES;

/// Label returned when detection has nothing to go on
pub const FALLBACK_ENCODING: &str = "utf-8";

#[derive(Debug, Clone, Copy)]
pub struct EncodingDetector {
    sample_bytes: usize,
}

impl Default for EncodingDetector {
    fn default() -> Self {
        Self::new(DEFAULT_ENCODING_SAMPLE_BYTES)
    }
}

impl EncodingDetector {
    pub fn new(sample_bytes: usize) -> Self {
        Self {
            sample_bytes: sample_bytes.max(1),
        }
    }

    /// Guess the encoding of `data` from its leading sample
    pub fn detect(&self, data: &[u8]) -> &'static Encoding {
        let sample = &data[..data.len().min(self.sample_bytes)];
        let complete = sample.len() == data.len();

        if let Some((encoding, _)) = Encoding::for_bom(sample) {
            debug!(encoding = encoding.name(), "Encoding taken from byte-order mark");
            return encoding;
        }

        if sample.is_ascii() {
            return UTF_8;
        }

        let mut detector = chardetng::EncodingDetector::new();
        // A truncated sample may end inside a multi-byte sequence
        detector.feed(sample, complete);
        let (encoding, confident) = detector.guess_assess(None, true);
        let chosen = resolve_guess(encoding, confident);
        debug!(
            encoding = chosen.name(),
            confident,
            sample_bytes = sample.len(),
            "Encoding detected"
        );
        chosen
    }

    /// Like [`detect`](Self::detect) but returns the lower-case label
    pub fn detect_label(&self, data: &[u8]) -> String {
        label(self.detect(data))
    }
}

/// Keep a confident guess, otherwise fall back to UTF-8
fn resolve_guess(guess: &'static Encoding, confident: bool) -> &'static Encoding {
    if confident {
        guess
    } else {
        UTF_8
    }
}

/// Lower-case label of an encoding, e.g. `utf-8` or `windows-1252`
pub fn label(encoding: &'static Encoding) -> String {
    encoding.name().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{SHIFT_JIS, UTF_16LE, WINDOWS_1252};

    #[test]
    fn test_empty_sample_falls_back() {
        assert_eq!(EncodingDetector::default().detect_label(b""), FALLBACK_ENCODING);
    }

    #[test]
    fn test_ascii_sample_falls_back() {
        let data = b"ID,AGENT,DUREE\n1,alice,42\n";
        assert_eq!(EncodingDetector::default().detect_label(data), FALLBACK_ENCODING);
    }

    #[test]
    fn test_unconfident_guess_falls_back() {
        assert_eq!(resolve_guess(WINDOWS_1252, false), UTF_8);
        assert_eq!(label(resolve_guess(SHIFT_JIS, false)), FALLBACK_ENCODING);
        assert_eq!(resolve_guess(WINDOWS_1252, true), WINDOWS_1252);
    }

    #[test]
    fn test_short_non_ascii_sample_gets_a_decodable_answer() {
        // One accented byte is weak evidence; whatever is chosen must decode it
        let data = b"A,B\n1,caf\xE9\n";
        let encoding = EncodingDetector::default().detect(data);
        let (_, _, had_errors) = encoding.decode(data);
        assert!(!had_errors, "{} cannot decode the sample", encoding.name());
        assert_eq!(EncodingDetector::default().detect(data), encoding);
    }

    #[test]
    fn test_bom_wins() {
        let mut data = vec![0xFF, 0xFE];
        data.extend_from_slice(&[b'A', 0, b',', 0, b'B', 0]);
        assert_eq!(EncodingDetector::default().detect(&data), UTF_16LE);

        let mut data = vec![0xEF, 0xBB, 0xBF];
        data.extend_from_slice("Appelé,Durée\n".as_bytes());
        assert_eq!(EncodingDetector::default().detect(&data), UTF_8);
    }

    #[test]
    fn test_utf8_text_detected() {
        let text = "AGENT,COMMENTAIRE\nhélène,déjà rappelé à côté du numéro prévu\nzoé,très satisfaite\n";
        assert_eq!(EncodingDetector::default().detect(text.as_bytes()), UTF_8);
    }

    #[test]
    fn test_windows_1252_text_detected() {
        let text = "AGENT,COMMENTAIRE\nhélène,le client a été rappelé après sa réclamation, problème réglé\n\
                    zoé,appel transféré au service réclamations, très mécontent de la durée d'attente\n";
        let (bytes, _, unmappable) = WINDOWS_1252.encode(text);
        assert!(!unmappable);
        assert_eq!(EncodingDetector::default().detect(&bytes), WINDOWS_1252);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let detector = EncodingDetector::new(64);
        let data = "réclamation,épuisé,garçon\n".repeat(20);
        let first = detector.detect(data.as_bytes());
        for _ in 0..5 {
            assert_eq!(detector.detect(data.as_bytes()), first);
        }
    }

    #[test]
    fn test_only_sample_is_inspected() {
        // Non-ASCII bytes past the sample are invisible to the detector
        let mut data = b"A,B\n1,2\n".to_vec();
        data.extend_from_slice(&[0xE9, 0xE8, 0xE0]);
        assert_eq!(EncodingDetector::new(8).detect(&data), UTF_8);
    }
}
