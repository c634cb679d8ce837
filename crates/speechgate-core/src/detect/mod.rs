//! Language detection for requests that name neither a model nor a language.
//!
//! A detector returns an ISO 639-1 code, or `None` when it has no confident
//! answer. Short or ambiguous text must produce `None` rather than a guess.

use crate::config::DetectionConfig;
use std::sync::Arc;

#[cfg(feature = "whatlang")]
mod whatlang;

#[cfg(feature = "whatlang")]
pub use self::whatlang::WhatlangDetector;

pub trait LanguageDetector: Send + Sync {
    /// ISO 639-1 code of `text`, or `None` when the result is not confident.
    fn detect(&self, text: &str) -> Option<String>;
}

/// Detector that never reaches a confident result.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDetection;

impl LanguageDetector for NoDetection {
    fn detect(&self, _text: &str) -> Option<String> {
        None
    }
}

/// The detector described by `config`.
pub fn detector_from_config(config: &DetectionConfig) -> Arc<dyn LanguageDetector> {
    if !config.enabled {
        log::info!("Language detection disabled; requests without a language use the default model");
        return Arc::new(NoDetection);
    }
    statistical_detector(config)
}

#[cfg(feature = "whatlang")]
fn statistical_detector(config: &DetectionConfig) -> Arc<dyn LanguageDetector> {
    Arc::new(WhatlangDetector::new(config.min_chars, config.min_confidence))
}

#[cfg(not(feature = "whatlang"))]
fn statistical_detector(_config: &DetectionConfig) -> Arc<dyn LanguageDetector> {
    log::warn!("Built without the `whatlang` feature; language detection is unavailable");
    Arc::new(NoDetection)
}

/// Number of characters that count toward the detection threshold.
pub fn significant_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Map an ISO 639-3 code to ISO 639-1, for languages that have one.
pub fn iso639_1(code: &str) -> Option<&'static str> {
    let mapped = match code {
        "afr" => "af",
        "aka" => "ak",
        "amh" => "am",
        "ara" => "ar",
        "aze" => "az",
        "bel" => "be",
        "ben" => "bn",
        "bul" => "bg",
        "cat" => "ca",
        "ces" => "cs",
        "cmn" | "zho" => "zh",
        "dan" => "da",
        "deu" => "de",
        "ell" => "el",
        "eng" => "en",
        "epo" => "eo",
        "est" => "et",
        "fin" => "fi",
        "fra" => "fr",
        "guj" => "gu",
        "heb" => "he",
        "hin" => "hi",
        "hrv" => "hr",
        "hun" => "hu",
        "hye" => "hy",
        "ind" => "id",
        "ita" => "it",
        "jav" => "jv",
        "jpn" => "ja",
        "kan" => "kn",
        "kat" => "ka",
        "khm" => "km",
        "kor" => "ko",
        "lat" => "la",
        "lav" => "lv",
        "lit" => "lt",
        "mal" => "ml",
        "mar" => "mr",
        "mkd" => "mk",
        "mya" => "my",
        "nep" => "ne",
        "nld" => "nl",
        "nob" => "nb",
        "ori" => "or",
        "pan" => "pa",
        "pes" | "fas" => "fa",
        "pol" => "pl",
        "por" => "pt",
        "ron" => "ro",
        "rus" => "ru",
        "sin" => "si",
        "slk" => "sk",
        "slv" => "sl",
        "sna" => "sn",
        "spa" => "es",
        "srp" => "sr",
        "swe" => "sv",
        "tam" => "ta",
        "tel" => "te",
        "tgl" => "tl",
        "tha" => "th",
        "tuk" => "tk",
        "tur" => "tr",
        "ukr" => "uk",
        "urd" => "ur",
        "uzb" => "uz",
        "vie" => "vi",
        "yid" => "yi",
        "zul" => "zu",
        _ => return None,
    };
    Some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_mapping() {
        assert_eq!(iso639_1("rus"), Some("ru"));
        assert_eq!(iso639_1("cmn"), Some("zh"));
        assert_eq!(iso639_1("xxx"), None);
    }

    #[test]
    fn test_significant_chars_ignores_whitespace() {
        assert_eq!(significant_chars(" да  нет \n"), 5);
    }

    #[test]
    fn test_disabled_detection_never_answers() {
        let config = DetectionConfig {
            enabled: false,
            ..DetectionConfig::default()
        };
        let detector = detector_from_config(&config);
        assert_eq!(
            detector.detect("Это достаточно длинный русский текст для уверенного определения."),
            None
        );
    }
}
