use crate::{
    config::{ServiceConfig, load_config, parse_yaml_file, parse_yaml_str, validate_config},
    detect::{LanguageDetector, detector_from_config},
    engine::{EngineFactories, EngineFactory},
    error::ConfigResult,
    registry::EngineRegistry,
    service::SynthesisService,
};
use std::path::Path;
use std::sync::Arc;

/// Builder for constructing a [`SynthesisService`] from YAML configuration
///
/// # Examples
///
/// ```no_run
/// use speechgate_core::{ServiceBuilder, SynthesisRequest};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = ServiceBuilder::from_yaml_file("config.yaml")?
///         .build()
///         .await?;
///
///     let result = service.synthesize(SynthesisRequest::new("Привет, мир!")).await?;
///     println!("{} ms of audio from {}", result.metadata.duration_ms, result.metadata.model_id);
///     Ok(())
/// }
/// ```
pub struct ServiceBuilder {
    config: ServiceConfig,
    factories: EngineFactories,
    detector: Option<Arc<dyn LanguageDetector>>,
}

impl ServiceBuilder {
    /// Create a builder from an already parsed configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is structurally invalid
    pub fn new(config: ServiceConfig) -> ConfigResult<Self> {
        validate_config(&config)?;
        Ok(Self {
            config,
            factories: EngineFactories::builtin(),
            detector: None,
        })
    }

    /// Create a builder from a YAML file path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - The configuration is invalid
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        Self::new(parse_yaml_file(path)?)
    }

    /// Create a builder from a YAML string
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        Self::new(parse_yaml_str(yaml)?)
    }

    /// Create a builder from the explicit path, `CONFIG_PATH`, or `config.yaml`
    pub fn from_env(explicit: Option<&Path>) -> ConfigResult<Self> {
        let config = load_config(explicit)?;
        Ok(Self {
            config,
            factories: EngineFactories::builtin(),
            detector: None,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Register an additional engine type
    pub fn with_engine(mut self, factory: impl EngineFactory + 'static) -> Self {
        self.factories.register(Arc::new(factory));
        self
    }

    /// Replace the whole set of engine factories, dropping the built-in ones
    pub fn with_factories(mut self, factories: EngineFactories) -> Self {
        self.factories = factories;
        self
    }

    /// Use `detector` instead of the one described by the `detection` section
    pub fn with_detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Load and probe every model, then assemble the service
    ///
    /// # Errors
    ///
    /// Returns an error if the model catalog is structurally invalid. Models that
    /// fail their probe do not cause an error; they are reported unavailable.
    pub async fn build(self) -> ConfigResult<SynthesisService> {
        let server = &self.config.server;
        let registry = EngineRegistry::load(
            &self.config.engines,
            &self.factories,
            server.probe_timeout(),
        )
        .await?;
        let detector = self
            .detector
            .unwrap_or_else(|| detector_from_config(&self.config.detection));
        Ok(SynthesisService::new(Arc::new(registry), detector, server))
    }
}
