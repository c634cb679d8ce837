//! Engine backends as a capability trait.
//!
//! The registry and the orchestrator only talk to [`EngineAdapter`]; they never
//! branch on engine-type tags. Concrete engines are constructed by an
//! [`EngineFactory`] registered under its type tag in [`EngineFactories`].

mod command;

pub use command::{CommandEngine, CommandEngineFactory, CommandOptions};

use crate::model::Model;
use crate::params::{EffectiveParameters, ParameterSchema};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Synthesis was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Result of a startup readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Available,
    Unavailable(String),
}

/// Everything an engine needs for one synthesis.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub text: String,
    /// One of the model's declared language tags.
    pub language: String,
    /// One value per schema parameter.
    pub parameters: EffectiveParameters,
    /// Deadline the orchestrator enforces; engines may use it to bound backend calls.
    pub timeout: Duration,
}

/// Cooperative cancellation signal handed to running work.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Pends forever if it never is.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// A ready-to-use synthesis backend bound to one model.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Check that the backend can serve requests
    ///
    /// # Returns
    /// `Available`, or `Unavailable` with a human-readable reason
    async fn probe(&self) -> ProbeOutcome;

    /// Synthesize speech
    ///
    /// # Arguments
    /// * `request` - Text, resolved language and effective parameters
    /// * `cancel` - Fires when the orchestrator gives up on this request
    ///
    /// # Returns
    /// A complete RIFF/WAVE byte stream
    async fn synthesize(&self, request: EngineRequest, cancel: CancelSignal)
    -> EngineResult<Vec<u8>>;
}

/// Builds adapters for one engine type.
pub trait EngineFactory: Send + Sync {
    /// Type tag used in configuration (`type:`)
    fn engine_type(&self) -> &str;

    /// Parameters every model of this type accepts, unless configuration replaces them
    fn parameter_schema(&self) -> ParameterSchema {
        ParameterSchema::default()
    }

    /// Output sample rate when configuration does not set one
    fn default_sample_rate(&self) -> u32 {
        22050
    }

    /// Construct the adapter for `model`
    ///
    /// # Arguments
    /// * `model` - The fully built model, including its final parameter schema
    /// * `options` - The entry's engine-specific `options` map
    fn build(&self, model: &Model, options: &Map<String, Value>)
    -> EngineResult<Arc<dyn EngineAdapter>>;
}

/// Engine factories keyed by lower-cased type tag.
#[derive(Clone, Default)]
pub struct EngineFactories {
    factories: HashMap<String, Arc<dyn EngineFactory>>,
}

impl EngineFactories {
    /// No factories at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// The engines shipped with this crate.
    pub fn builtin() -> Self {
        Self::new().with_factory(CommandEngineFactory)
    }

    pub fn with_factory(mut self, factory: impl EngineFactory + 'static) -> Self {
        self.register(Arc::new(factory));
        self
    }

    /// Register a factory, replacing any previous one for the same type.
    pub fn register(&mut self, factory: Arc<dyn EngineFactory>) {
        let key = factory.engine_type().to_ascii_lowercase();
        if self.factories.insert(key.clone(), factory).is_some() {
            log::warn!("Engine factory for type '{key}' replaced");
        }
    }

    pub fn get(&self, engine_type: &str) -> Option<Arc<dyn EngineFactory>> {
        self.factories
            .get(&engine_type.to_ascii_lowercase())
            .cloned()
    }

    pub fn engine_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }
}

impl fmt::Debug for EngineFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineFactories")
            .field("engine_types", &self.engine_types())
            .finish()
    }
}
