use crate::detect::LanguageDetector;
use crate::error::{Result, SynthesisError};
use crate::language::{self, LanguageMatch};
use crate::model::Model;
use crate::registry::EngineRegistry;
use log::debug;
use std::sync::Arc;

/// The model and language chosen for a request.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub model: Arc<Model>,
    /// Always one of `model.languages`.
    pub language: String,
    /// ISO 639-1 code reported by detection, when detection ran and was confident.
    pub detected_language: Option<String>,
}

/// Picks a model and language from the caller's hints and the text itself.
///
/// Configuration order breaks every tie.
pub struct LanguageResolver {
    registry: Arc<EngineRegistry>,
    detector: Arc<dyn LanguageDetector>,
}

impl LanguageResolver {
    pub fn new(registry: Arc<EngineRegistry>, detector: Arc<dyn LanguageDetector>) -> Self {
        Self { registry, detector }
    }

    pub fn resolve(
        &self,
        text: &str,
        model_id: Option<&str>,
        language: Option<&str>,
    ) -> Result<Resolution> {
        let resolution = match (model_id, language) {
            (Some(model_id), language) => self.resolve_model(model_id, language)?,
            (None, Some(language)) => self.resolve_language(language)?,
            (None, None) => self.resolve_detected(text)?,
        };
        debug!(
            "Resolved model '{}' with language '{}'",
            resolution.model.id, resolution.language
        );
        Ok(resolution)
    }

    fn resolve_model(&self, model_id: &str, language: Option<&str>) -> Result<Resolution> {
        let model = self
            .registry
            .get(model_id)
            .ok_or_else(|| SynthesisError::ModelNotFound {
                model_id: model_id.to_string(),
                available_models: self.registry.model_ids(),
            })?;
        if let Some(state) = self.registry.state(model_id) {
            if let Some(reason) = state.reason() {
                return Err(SynthesisError::ModelUnavailable {
                    model_id: model_id.to_string(),
                    reason,
                });
            }
        }

        let language = match language {
            None => model.default_language.clone(),
            Some(requested) => match model.match_language(requested) {
                Some((declared, _)) => declared.to_string(),
                None => {
                    return Err(SynthesisError::LanguageNotSupported {
                        language: requested.to_string(),
                        model_id: Some(model.id.clone()),
                        supported_languages: model.languages.clone(),
                    });
                }
            },
        };
        Ok(Resolution {
            model,
            language,
            detected_language: None,
        })
    }

    /// First available model with an exact tag match, else the first with a
    /// primary-subtag match.
    fn resolve_language(&self, requested: &str) -> Result<Resolution> {
        let available = self.registry.list_available();
        let best = [LanguageMatch::Exact, LanguageMatch::Primary]
            .into_iter()
            .find_map(|wanted| {
                available.iter().find_map(|model| match model.match_language(requested) {
                    Some((declared, found)) if found == wanted => {
                        Some((model.clone(), declared.to_string()))
                    }
                    _ => None,
                })
            });

        match best {
            Some((model, language)) => Ok(Resolution {
                model,
                language,
                detected_language: None,
            }),
            None => {
                let mut supported: Vec<String> = Vec::new();
                for tag in available.iter().flat_map(|model| model.languages.iter()) {
                    if !supported.iter().any(|seen| language::is_exact(seen, tag)) {
                        supported.push(tag.clone());
                    }
                }
                Err(SynthesisError::LanguageNotSupported {
                    language: requested.to_string(),
                    model_id: None,
                    supported_languages: supported,
                })
            }
        }
    }

    fn resolve_detected(&self, text: &str) -> Result<Resolution> {
        let detected = self.detector.detect(text);
        let Some(code) = detected else {
            debug!("No confident language detection; using the default model");
            return self.default_resolution(None);
        };

        let matched = self.registry.list_available().into_iter().find_map(|model| {
            let declared = model
                .languages
                .iter()
                .find(|tag| language::same_primary(tag, &code))?
                .clone();
            Some((model, declared))
        });
        match matched {
            Some((model, language)) => {
                debug!("Detected '{code}' served by model '{}'", model.id);
                Ok(Resolution {
                    model,
                    language,
                    detected_language: Some(code),
                })
            }
            None => {
                debug!("No available model speaks detected language '{code}'");
                self.default_resolution(Some(code))
            }
        }
    }

    fn default_resolution(&self, detected_language: Option<String>) -> Result<Resolution> {
        let model = self
            .registry
            .get_default()
            .ok_or(SynthesisError::ServiceUnavailable)?;
        Ok(Resolution {
            language: model.default_language.clone(),
            model,
            detected_language,
        })
    }
}
