use crate::config::{ModelConfig, validate_models};
use crate::engine::{EngineAdapter, EngineFactories, EngineFactory, ProbeOutcome};
use crate::error::{ConfigError, ConfigResult};
use crate::language;
use crate::model::{Availability, Model, ModelDetail, ModelSummary};
use crate::params::ParameterSchema;
use futures::future::join_all;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

const FALLBACK_SAMPLE_RATE: u32 = 22050;

struct Entry {
    model: Arc<Model>,
    adapter: Option<Arc<dyn EngineAdapter>>,
    availability: Availability,
}

/// Catalog of configured models and their availability, in configuration order.
///
/// Built once by [`EngineRegistry::load`]; read-only afterwards.
pub struct EngineRegistry {
    entries: Vec<Entry>,
}

impl EngineRegistry {
    /// Build the catalog and probe every enabled model.
    ///
    /// Structural problems abort loading with an error naming the model. A model
    /// whose engine is unknown, fails to construct or fails its probe is recorded
    /// as unavailable and loading carries on.
    pub async fn load(
        configs: &[ModelConfig],
        factories: &EngineFactories,
        probe_timeout: Duration,
    ) -> ConfigResult<Self> {
        validate_models(configs)?;
        let models = configs
            .iter()
            .map(|config| build_model(config, factories.get(&config.engine_type).as_deref()))
            .collect::<ConfigResult<Vec<_>>>()?;

        let mut entries: Vec<Entry> = configs
            .iter()
            .zip(models)
            .map(|(config, model)| prepare(config, model, factories))
            .collect();

        let outcomes = join_all(entries.iter().map(|entry| probe(entry, probe_timeout))).await;
        for (entry, outcome) in entries.iter_mut().zip(outcomes) {
            if let Some(availability) = outcome {
                entry.availability = availability;
            }
            match &entry.availability {
                Availability::Available => info!("Model '{}' is available", entry.model.id),
                Availability::Disabled => info!("Model '{}' is disabled", entry.model.id),
                other => warn!(
                    "Model '{}' is unavailable: {}",
                    entry.model.id,
                    other.reason().unwrap_or_default()
                ),
            }
        }

        let registry = Self { entries };
        let available = registry.list_available().len();
        if available == 0 {
            warn!("No models are available; synthesis requests will fail");
        } else {
            info!(
                "Engine registry ready: {available}/{} model(s) available",
                registry.entries.len()
            );
        }
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Model>> {
        self.entry(id).map(|entry| entry.model.clone())
    }

    pub fn state(&self, id: &str) -> Option<&Availability> {
        self.entry(id).map(|entry| &entry.availability)
    }

    /// Adapter for `id`, only when the model is available.
    pub fn adapter(&self, id: &str) -> Option<Arc<dyn EngineAdapter>> {
        self.entry(id)
            .filter(|entry| entry.availability.is_available())
            .and_then(|entry| entry.adapter.clone())
    }

    pub fn list_available(&self) -> Vec<Arc<Model>> {
        self.entries
            .iter()
            .filter(|entry| entry.availability.is_available())
            .map(|entry| entry.model.clone())
            .collect()
    }

    /// The configured default when it is available, otherwise the first available model.
    pub fn get_default(&self) -> Option<Arc<Model>> {
        self.entries
            .iter()
            .find(|entry| entry.model.is_default && entry.availability.is_available())
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|entry| entry.availability.is_available())
            })
            .map(|entry| entry.model.clone())
    }

    pub fn list_all(&self) -> Vec<(Arc<Model>, Availability)> {
        self.entries
            .iter()
            .map(|entry| (entry.model.clone(), entry.availability.clone()))
            .collect()
    }

    pub fn model_ids(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.model.id.clone()).collect()
    }

    pub fn health_snapshot(&self) -> Vec<(String, Availability)> {
        self.entries
            .iter()
            .map(|entry| (entry.model.id.clone(), entry.availability.clone()))
            .collect()
    }

    pub fn summaries(&self) -> Vec<ModelSummary> {
        self.entries
            .iter()
            .map(|entry| ModelSummary::new(&entry.model, &entry.availability))
            .collect()
    }

    pub fn detail(&self, id: &str) -> Option<ModelDetail> {
        self.entry(id)
            .map(|entry| ModelDetail::new(&entry.model, &entry.availability))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.model.id == id)
    }
}

fn build_model(config: &ModelConfig, factory: Option<&dyn EngineFactory>) -> ConfigResult<Model> {
    let invalid = |(parameter, reason): (String, String)| ConfigError::InvalidParameter {
        model: config.name.clone(),
        parameter,
        reason,
    };

    let mut parameters = match (&config.schema, factory) {
        (Some(schema), _) => schema.clone(),
        (None, Some(factory)) => factory.parameter_schema(),
        (None, None) => ParameterSchema::default(),
    };
    parameters.check().map_err(invalid)?;
    if config.schema.is_some() || factory.is_some() {
        for (name, value) in &config.parameters {
            parameters.override_default(name, value).map_err(invalid)?;
        }
    } else if !config.parameters.is_empty() {
        debug!(
            "Model '{}': parameter overrides not checked, engine type '{}' is unknown",
            config.name, config.engine_type
        );
    }

    // Report the default language the way the model declares it.
    let default_language = config
        .effective_default_language()
        .and_then(|requested| {
            config
                .languages
                .iter()
                .find(|tag| language::is_exact(tag, requested))
        })
        .cloned()
        .ok_or_else(|| ConfigError::NoLanguages {
            model: config.name.clone(),
        })?;

    let engine_type = config.engine_type.to_ascii_lowercase();
    Ok(Model {
        id: config.name.clone(),
        name: display_name(&engine_type, &config.name),
        engine_type,
        model_path: config.model.clone(),
        languages: config.languages.clone(),
        default_language,
        parameters,
        is_default: config.default,
        sample_rate: config
            .sample_rate
            .or_else(|| factory.map(|factory| factory.default_sample_rate()))
            .unwrap_or(FALLBACK_SAMPLE_RATE),
        speaker: config.speaker.clone(),
    })
}

fn display_name(engine_type: &str, id: &str) -> String {
    let mut chars = engine_type.chars();
    let title: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    format!("{title} ({id})")
}

fn prepare(config: &ModelConfig, model: Model, factories: &EngineFactories) -> Entry {
    let model = Arc::new(model);
    if !config.enabled {
        return Entry {
            model,
            adapter: None,
            availability: Availability::Disabled,
        };
    }
    let Some(factory) = factories.get(&config.engine_type) else {
        let reason = format!(
            "unknown engine type '{}' (known: {})",
            config.engine_type,
            factories.engine_types().join(", ")
        );
        return Entry {
            model,
            adapter: None,
            availability: Availability::Unavailable(reason),
        };
    };
    match factory.build(&model, &config.options) {
        Ok(adapter) => Entry {
            model,
            adapter: Some(adapter),
            availability: Availability::Loading,
        },
        Err(e) => Entry {
            model,
            adapter: None,
            availability: Availability::Unavailable(e.to_string()),
        },
    }
}

async fn probe(entry: &Entry, timeout: Duration) -> Option<Availability> {
    if entry.availability != Availability::Loading {
        return None;
    }
    let adapter = entry.adapter.as_ref()?;
    debug!("Probing model '{}'", entry.model.id);
    let availability = match tokio::time::timeout(timeout, adapter.probe()).await {
        Ok(ProbeOutcome::Available) => Availability::Available,
        Ok(ProbeOutcome::Unavailable(reason)) => Availability::Unavailable(reason),
        Err(_) => Availability::Unavailable(format!("probe timed out after {timeout:?}")),
    };
    Some(availability)
}
