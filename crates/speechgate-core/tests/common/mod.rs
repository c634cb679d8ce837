#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Map, Value};
use speechgate_core::engine::EngineResult;
use speechgate_core::{
    CancelSignal, EngineAdapter, EngineError, EngineFactories, EngineFactory, EngineRequest,
    LanguageDetector, Model, ModelConfig, ParameterDefinition, ParameterSchema, ProbeOutcome,
    ServerConfig, ServiceBuilder, ServiceConfig, SynthesisService,
};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Encode `duration_ms` of mono 16-bit silence.
pub fn silent_wav(sample_rate: u32, duration_ms: u64) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let frames = u64::from(sample_rate) * duration_ms / 1000;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// `silent_wav` with the data length left as the placeholder a streaming encoder writes.
pub fn streamed_wav(sample_rate: u32, duration_ms: u64) -> Vec<u8> {
    let mut bytes = silent_wav(sample_rate, duration_ms);
    let at = bytes.windows(4).position(|w| w == b"data").unwrap() + 4;
    bytes[at..at + 4].copy_from_slice(&0x7FFF_F000u32.to_le_bytes());
    bytes
}

/// One engine call as seen by the mock backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub model_id: String,
    pub text: String,
    pub language: String,
    pub speed: Option<f64>,
    pub speaker: Option<String>,
}

/// Backend behaviour driven by the model's `options`:
///
/// - `fail_probe: <reason>` makes the probe fail
/// - `probe_delay_ms: <n>` delays the probe
/// - `delay_ms: <n>` delays each synthesis
/// - `fail: <detail>` makes synthesis fail
/// - `garbage: true` returns bytes that are not WAV
/// - `streamed: true` leaves a placeholder data length in the WAV header
/// - `duration_ms: <n>` length of the produced audio (default 500)
pub struct MockAdapter {
    model_id: String,
    sample_rate: u32,
    options: Map<String, Value>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl MockAdapter {
    fn option_u64(&self, key: &str) -> Option<u64> {
        self.options.get(key).and_then(Value::as_u64)
    }

    fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }
}

#[async_trait]
impl EngineAdapter for MockAdapter {
    async fn probe(&self) -> ProbeOutcome {
        if let Some(delay) = self.option_u64("probe_delay_ms") {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        match self.option_str("fail_probe") {
            Some(reason) => ProbeOutcome::Unavailable(reason.to_string()),
            None => ProbeOutcome::Available,
        }
    }

    async fn synthesize(
        &self,
        request: EngineRequest,
        _cancel: CancelSignal,
    ) -> EngineResult<Vec<u8>> {
        self.calls.lock().unwrap().push(Call {
            model_id: self.model_id.clone(),
            text: request.text.clone(),
            language: request.language.clone(),
            speed: request.parameters.get_f64("speed"),
            speaker: request.parameters.get_str("speaker").map(str::to_string),
        });
        if let Some(delay) = self.option_u64("delay_ms") {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if let Some(detail) = self.option_str("fail") {
            return Err(EngineError::Backend(detail.to_string()));
        }
        if self.options.get("garbage").and_then(Value::as_bool) == Some(true) {
            return Ok(b"RIFF? no, just noise".to_vec());
        }
        let duration = self.option_u64("duration_ms").unwrap_or(500);
        if self.options.get("streamed").and_then(Value::as_bool) == Some(true) {
            return Ok(streamed_wav(self.sample_rate, duration));
        }
        Ok(silent_wav(self.sample_rate, duration))
    }
}

/// Factory for the `mock` engine type; records every synthesis call.
#[derive(Clone, Default)]
pub struct MockFactory {
    pub calls: Arc<Mutex<Vec<Call>>>,
}

impl MockFactory {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl EngineFactory for MockFactory {
    fn engine_type(&self) -> &str {
        "mock"
    }

    fn parameter_schema(&self) -> ParameterSchema {
        ParameterSchema::new(vec![
            ParameterDefinition::float("speed", "Speech rate multiplier", 1.0, 0.5, 2.0),
            ParameterDefinition::string_enum("speaker", "Voice", "xenia", &["aidar", "baya", "xenia"]),
        ])
    }

    fn default_sample_rate(&self) -> u32 {
        24000
    }

    fn build(
        &self,
        model: &Model,
        options: &Map<String, Value>,
    ) -> EngineResult<Arc<dyn EngineAdapter>> {
        Ok(Arc::new(MockAdapter {
            model_id: model.id.clone(),
            sample_rate: model.sample_rate,
            options: options.clone(),
            calls: self.calls.clone(),
        }))
    }
}

/// Detector with a canned answer.
pub struct FixedDetector(pub Option<&'static str>);

impl LanguageDetector for FixedDetector {
    fn detect(&self, _text: &str) -> Option<String> {
        self.0.map(str::to_string)
    }
}

pub fn mock(name: &str, languages: &[&str]) -> ModelConfig {
    ModelConfig::new(name, "mock", format!("/models/{name}"), languages)
}

pub struct Harness {
    pub service: Arc<SynthesisService>,
    pub factory: MockFactory,
}

pub async fn service_with(
    engines: Vec<ModelConfig>,
    server: ServerConfig,
    detected: Option<&'static str>,
) -> Harness {
    init_logging();
    let factory = MockFactory::default();
    let config = ServiceConfig {
        server,
        engines,
        ..ServiceConfig::default()
    };
    let service = ServiceBuilder::new(config)
        .unwrap()
        .with_factories(EngineFactories::new().with_factory(factory.clone()))
        .with_detector(Arc::new(FixedDetector(detected)))
        .build()
        .await
        .unwrap();
    Harness {
        service: Arc::new(service),
        factory,
    }
}

pub async fn service(engines: Vec<ModelConfig>, detected: Option<&'static str>) -> Harness {
    let server = ServerConfig {
        probe_timeout: 1.0,
        synthesis_timeout: 5.0,
        ..ServerConfig::default()
    };
    service_with(engines, server, detected).await
}
