use crate::params::ParameterSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Root of the YAML configuration file.
///
/// ```yaml
/// server:
///   max_queue_size: 100
///   synthesis_timeout: 30
/// detection:
///   min_chars: 12
/// engines:
///   - name: piper-en
///     type: command
///     model: /models/en_US-lessac-medium.onnx
///     languages: [en-US]
///     default: true
///     options:
///       program: piper
///       args: ["--model", "{model}", "--output_file", "{output}"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engines: Vec<ModelConfig>,
}

/// Service-wide limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
    /// Seconds; covers waiting for the engine lane plus execution.
    #[serde(default = "default_timeout_secs")]
    pub synthesis_timeout: f64,
    /// Seconds allowed for each model's startup probe.
    #[serde(default = "default_timeout_secs")]
    pub probe_timeout: f64,
    #[serde(default = "default_workers_per_engine")]
    pub workers_per_engine: usize,
}

impl ServerConfig {
    pub fn synthesis_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.synthesis_timeout).unwrap_or(Duration::MAX)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.probe_timeout).unwrap_or(Duration::MAX)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            max_text_length: default_max_text_length(),
            synthesis_timeout: default_timeout_secs(),
            probe_timeout: default_timeout_secs(),
            workers_per_engine: default_workers_per_engine(),
        }
    }
}

fn default_max_queue_size() -> usize {
    100
}

fn default_max_text_length() -> usize {
    5000
}

fn default_timeout_secs() -> f64 {
    30.0
}

fn default_workers_per_engine() -> usize {
    1
}

/// Thresholds below which language detection reports no confident result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum number of non-whitespace characters.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_chars: default_min_chars(),
            min_confidence: default_min_confidence(),
        }
    }
}

fn default_min_chars() -> usize {
    12
}

fn default_min_confidence() -> f64 {
    0.5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One configured model, in the order it appears in the `engines` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Unique model id.
    pub name: String,
    #[serde(rename = "type")]
    pub engine_type: String,
    /// Backend model path or identifier.
    pub model: String,
    #[serde(default)]
    pub languages: Vec<String>,
    /// Defaults to the first entry of `languages`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,
    #[serde(default)]
    pub default: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    /// Overrides for parameter defaults.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,
    /// Replaces the engine's built-in parameter schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<ParameterSchema>,
    /// Engine-specific settings handed to the engine factory.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

impl ModelConfig {
    pub fn new(
        name: impl Into<String>,
        engine_type: impl Into<String>,
        model: impl Into<String>,
        languages: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            engine_type: engine_type.into(),
            model: model.into(),
            languages: languages.iter().map(|l| l.to_string()).collect(),
            default_language: None,
            default: false,
            enabled: true,
            speaker: None,
            sample_rate: None,
            parameters: BTreeMap::new(),
            schema: None,
            options: Map::new(),
        }
    }

    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = Some(language.into());
        self
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    pub fn with_schema(mut self, schema: ParameterSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Declared default language, falling back to the first supported one.
    pub fn effective_default_language(&self) -> Option<&str> {
        self.default_language
            .as_deref()
            .or_else(|| self.languages.first().map(String::as_str))
    }
}

fn default_true() -> bool {
    true
}
