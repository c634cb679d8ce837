use super::{LanguageDetector, iso639_1, significant_chars};
use log::debug;

/// Trigram-based detection backed by the `whatlang` crate.
#[derive(Debug, Clone)]
pub struct WhatlangDetector {
    min_chars: usize,
    min_confidence: f64,
}

impl WhatlangDetector {
    pub fn new(min_chars: usize, min_confidence: f64) -> Self {
        Self {
            min_chars,
            min_confidence,
        }
    }
}

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<String> {
        let chars = significant_chars(text);
        if chars < self.min_chars {
            debug!(
                "Skipping detection: {chars} characters is below the {} character minimum",
                self.min_chars
            );
            return None;
        }

        let info = ::whatlang::detect(text)?;
        let code = info.lang().code();
        if info.confidence() < self.min_confidence {
            debug!(
                "Detected '{code}' with confidence {:.2}, below {:.2}",
                info.confidence(),
                self.min_confidence
            );
            return None;
        }

        match iso639_1(code) {
            Some(iso) => {
                debug!("Detected language '{iso}' (confidence {:.2})", info.confidence());
                Some(iso.to_string())
            }
            None => {
                debug!("Detected '{code}' has no ISO 639-1 code");
                None
            }
        }
    }
}
