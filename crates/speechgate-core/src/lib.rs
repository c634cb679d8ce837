//! # Speechgate Core
//!
//! Synthesis orchestration for multi-engine, multi-language text-to-speech.
//!
//! A service is built from YAML configuration listing models backed by engine
//! adapters. At startup every model is probed; models that fail stay listed as
//! unavailable while the rest keep serving. Each request is resolved to a model
//! and language (explicit model, explicit language or detected language),
//! its parameters are validated against the model's schema, and the engine call
//! runs through a bounded admission queue with per-engine FIFO lanes.
//!
//! ## Features
//!
//! - `whatlang` (default): language detection with the `whatlang` crate
//!

pub mod audio;
pub mod builder;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod language;
pub mod model;
pub mod params;
pub mod queue;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod types;

pub use builder::ServiceBuilder;
pub use config::{ModelConfig, ServerConfig, ServiceConfig};
pub use detect::{LanguageDetector, NoDetection};
pub use engine::{
    CancelSignal, EngineAdapter, EngineError, EngineFactories, EngineFactory, EngineRequest,
    ProbeOutcome,
};
pub use error::{ConfigError, ErrorCode, ErrorKind, Result, SynthesisError};
pub use model::{Availability, Model, ModelDetail, ModelSummary};
pub use params::{ParamValue, ParameterDefinition, ParameterKind, ParameterSchema};
pub use queue::{AdmissionQueue, QueueError, QueueStats};
pub use registry::EngineRegistry;
pub use resolver::{LanguageResolver, Resolution};
pub use service::{HealthReport, HealthStatus, SynthesisService};
pub use types::{OutputFormat, SynthesisMetadata, SynthesisRequest, SynthesisResult};

#[cfg(feature = "whatlang")]
pub use detect::WhatlangDetector;
