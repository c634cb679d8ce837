use crate::audio;
use crate::config::ServerConfig;
use crate::detect::LanguageDetector;
use crate::engine::EngineRequest;
use crate::error::{Result, SynthesisError};
use crate::model::{Availability, ModelDetail, ModelSummary};
use crate::params::validate_parameters;
use crate::queue::{AdmissionQueue, QueueError, QueueStats};
use crate::registry::EngineRegistry;
use crate::resolver::LanguageResolver;
use crate::types::{OutputFormat, SynthesisMetadata, SynthesisRequest, SynthesisResult};
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelHealth {
    pub model_id: String,
    pub engine: String,
    pub availability: Availability,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineHealth {
    pub models: Vec<String>,
    pub available: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub models_available: usize,
    pub models_total: usize,
    pub engines: BTreeMap<String, EngineHealth>,
    pub models: Vec<ModelHealth>,
    pub queue: QueueStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsList {
    pub models: Vec<ModelSummary>,
    pub default_model: Option<String>,
}

/// Runs synthesis requests end to end: text checks, model and language
/// resolution, parameter validation, admission and the engine call.
pub struct SynthesisService {
    registry: Arc<EngineRegistry>,
    resolver: LanguageResolver,
    queue: AdmissionQueue,
    max_text_length: usize,
    synthesis_timeout: Duration,
    started_at: Instant,
}

impl SynthesisService {
    pub fn new(
        registry: Arc<EngineRegistry>,
        detector: Arc<dyn LanguageDetector>,
        server: &ServerConfig,
    ) -> Self {
        Self {
            resolver: LanguageResolver::new(registry.clone(), detector),
            queue: AdmissionQueue::new(server.max_queue_size, server.workers_per_engine),
            registry,
            max_text_length: server.max_text_length,
            synthesis_timeout: server.synthesis_timeout(),
            started_at: Instant::now(),
        }
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    /// Available models in configuration order.
    pub fn list_available_models(&self) -> Vec<ModelSummary> {
        self.registry
            .summaries()
            .into_iter()
            .filter(|summary| summary.is_available)
            .collect()
    }

    /// Every configured model with its availability, plus the effective default.
    pub fn list_models(&self) -> ModelsList {
        ModelsList {
            models: self.registry.summaries(),
            default_model: self.registry.get_default().map(|model| model.id.clone()),
        }
    }

    pub fn get_model(&self, model_id: &str) -> Result<ModelDetail> {
        self.registry
            .detail(model_id)
            .ok_or_else(|| SynthesisError::ModelNotFound {
                model_id: model_id.to_string(),
                available_models: self.registry.model_ids(),
            })
    }

    pub fn health(&self) -> HealthReport {
        let mut engines: BTreeMap<String, EngineHealth> = BTreeMap::new();
        let mut models = Vec::with_capacity(self.registry.len());
        for (model, availability) in self.registry.list_all() {
            let engine = engines
                .entry(model.engine_type.clone())
                .or_insert_with(|| EngineHealth {
                    models: Vec::new(),
                    available: 0,
                });
            engine.models.push(model.id.clone());
            if availability.is_available() {
                engine.available += 1;
            }
            models.push(ModelHealth {
                model_id: model.id.clone(),
                engine: model.engine_type.clone(),
                availability,
            });
        }

        // Disabled models are switched off on purpose and do not degrade health.
        let enabled = models
            .iter()
            .filter(|m| m.availability != Availability::Disabled)
            .count();
        let available = models
            .iter()
            .filter(|m| m.availability.is_available())
            .count();
        let status = if available == 0 {
            HealthStatus::Unhealthy
        } else if available < enabled {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            models_available: available,
            models_total: models.len(),
            engines,
            models,
            queue: self.queue.stats(),
        }
    }

    pub async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisResult> {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        self.check_text(&request.text)?;

        let resolution = self.resolver.resolve(
            &request.text,
            non_blank(request.model_id.as_deref()),
            non_blank(request.language.as_deref()),
        )?;
        let model = resolution.model;
        let parameters = validate_parameters(&model.parameters, &request.parameters)?;
        let adapter =
            self.registry
                .adapter(&model.id)
                .ok_or_else(|| SynthesisError::ModelUnavailable {
                    model_id: model.id.clone(),
                    reason: "no engine adapter".to_string(),
                })?;

        let slot = self
            .queue
            .admit(&model.engine_type)
            .map_err(|e| self.queue_error(e, &model.id))?;
        let engine_request = EngineRequest {
            text: request.text,
            language: resolution.language.clone(),
            parameters,
            timeout: self.synthesis_timeout,
        };
        let wav = self
            .queue
            .run(slot, self.synthesis_timeout, |cancel| {
                adapter.synthesize(engine_request, cancel)
            })
            .await
            .map_err(|e| self.queue_error(e, &model.id))?
            .map_err(|e| {
                warn!("[{request_id}] Model '{}' failed: {e}", model.id);
                SynthesisError::SynthesisFailed {
                    model_id: model.id.clone(),
                    detail: e.to_string(),
                }
            })?;

        let invalid_audio = |e: hound::Error| SynthesisError::SynthesisFailed {
            model_id: model.id.clone(),
            detail: format!("engine returned invalid WAV audio: {e}"),
        };
        let info = audio::inspect_wav(&wav).map_err(invalid_audio)?;
        let audio = match request.output_format {
            OutputFormat::Wav => wav,
            OutputFormat::Pcm => audio::wav_to_pcm(&wav).map_err(invalid_audio)?,
        };

        let metadata = SynthesisMetadata {
            request_id,
            model_id: model.id.clone(),
            language: resolution.language,
            detected_language: resolution.detected_language,
            output_format: request.output_format,
            sample_rate: info.sample_rate,
            channels: info.channels,
            duration_ms: info.duration_ms,
            audio_size_bytes: audio.len(),
            processing_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "[{}] Synthesized {} ms of {} audio with '{}' ({}) in {} ms",
            metadata.request_id,
            metadata.duration_ms,
            metadata.output_format,
            metadata.model_id,
            metadata.language,
            metadata.processing_ms
        );
        Ok(SynthesisResult { audio, metadata })
    }

    fn check_text(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(SynthesisError::TextEmpty);
        }
        let length = text.chars().count();
        if length > self.max_text_length {
            return Err(SynthesisError::TextTooLong {
                max_length: self.max_text_length,
                actual_length: length,
            });
        }
        Ok(())
    }

    fn queue_error(&self, error: QueueError, model_id: &str) -> SynthesisError {
        match error {
            QueueError::Full {
                outstanding,
                capacity,
            } => SynthesisError::ServiceBusy {
                outstanding,
                capacity,
            },
            QueueError::Timeout { timeout, .. } => SynthesisError::SynthesisTimeout {
                model_id: model_id.to_string(),
                timeout,
            },
            QueueError::LaneClosed(_) => SynthesisError::SynthesisFailed {
                model_id: model_id.to_string(),
                detail: error.to_string(),
            },
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
