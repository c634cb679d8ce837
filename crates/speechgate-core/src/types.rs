use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Container the caller wants the audio delivered in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    /// RIFF/WAVE exactly as produced by the engine.
    #[default]
    Wav,
    /// Raw 16-bit little-endian PCM samples, interleaved by channel.
    Pcm,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Wav => "audio/wav",
            OutputFormat::Pcm => "audio/L16",
        }
    }
}

/// Caller input for one synthesis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// Facts about a finished synthesis, measured from the produced audio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisMetadata {
    pub request_id: String,
    pub model_id: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_language: Option<String>,
    pub output_format: OutputFormat,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: u64,
    pub audio_size_bytes: usize,
    pub processing_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub audio: Vec<u8>,
    pub metadata: SynthesisMetadata,
}
