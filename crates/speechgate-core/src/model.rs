use crate::language::{self, LanguageMatch};
use crate::params::{ParameterDefinition, ParameterSchema};
use serde::Serialize;

/// A configured synthesis model. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub engine_type: String,
    pub model_path: String,
    pub languages: Vec<String>,
    pub default_language: String,
    pub parameters: ParameterSchema,
    pub is_default: bool,
    pub sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl Model {
    /// The declared tag that serves `requested`, preferring an exact entry.
    pub fn match_language(&self, requested: &str) -> Option<(&str, LanguageMatch)> {
        language::best_match(&self.languages, requested)
    }

    pub fn supports(&self, requested: &str) -> bool {
        self.match_language(requested).is_some()
    }
}

/// Runtime availability of a model, decided once during startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum Availability {
    Loading,
    Available,
    Unavailable(String),
    Disabled,
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Availability::Loading => "loading",
            Availability::Available => "available",
            Availability::Unavailable(_) => "unavailable",
            Availability::Disabled => "disabled",
        }
    }

    /// Why the model cannot serve requests, if it cannot.
    pub fn reason(&self) -> Option<String> {
        match self {
            Availability::Available => None,
            Availability::Loading => Some("model is still loading".to_string()),
            Availability::Unavailable(reason) => Some(reason.clone()),
            Availability::Disabled => Some("model is disabled in configuration".to_string()),
        }
    }
}

/// Listing entry for one model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub id: String,
    pub name: String,
    pub engine: String,
    pub languages: Vec<String>,
    pub is_available: bool,
    pub is_default: bool,
}

/// Full description of one model, including its parameter definitions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDetail {
    pub id: String,
    pub name: String,
    pub engine: String,
    pub languages: Vec<String>,
    pub default_language: String,
    pub sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    pub is_default: bool,
    pub availability: Availability,
    pub parameters: Vec<ParameterDefinition>,
}

impl ModelSummary {
    pub(crate) fn new(model: &Model, availability: &Availability) -> Self {
        Self {
            id: model.id.clone(),
            name: model.name.clone(),
            engine: model.engine_type.clone(),
            languages: model.languages.clone(),
            is_available: availability.is_available(),
            is_default: model.is_default,
        }
    }
}

impl ModelDetail {
    pub(crate) fn new(model: &Model, availability: &Availability) -> Self {
        Self {
            id: model.id.clone(),
            name: model.name.clone(),
            engine: model.engine_type.clone(),
            languages: model.languages.clone(),
            default_language: model.default_language.clone(),
            sample_rate: model.sample_rate,
            speaker: model.speaker.clone(),
            is_default: model.is_default,
            availability: availability.clone(),
            parameters: model.parameters.parameters().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_serialization() {
        let json = serde_json::to_value(Availability::Unavailable("binary missing".into())).unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["reason"], "binary missing");

        let json = serde_json::to_value(Availability::Available).unwrap();
        assert_eq!(json["status"], "available");
        assert!(Availability::Available.reason().is_none());
        assert!(Availability::Disabled.reason().unwrap().contains("disabled"));
    }
}
