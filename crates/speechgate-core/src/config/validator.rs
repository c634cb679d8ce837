use super::schema::{DetectionConfig, ModelConfig, ServerConfig, ServiceConfig};
use crate::error::{ConfigError, ConfigResult};
use crate::language;
use std::collections::HashSet;
use std::time::Duration;

pub fn validate_config(config: &ServiceConfig) -> ConfigResult<()> {
    validate_server(&config.server)?;
    validate_detection(&config.detection)?;
    validate_models(&config.engines)?;
    Ok(())
}

pub fn validate_server(server: &ServerConfig) -> ConfigResult<()> {
    let counts = [
        ("max_queue_size", server.max_queue_size),
        ("max_text_length", server.max_text_length),
        ("workers_per_engine", server.workers_per_engine),
    ];
    for (name, value) in counts {
        if value < 1 {
            return Err(ConfigError::InvalidServer(format!("{name} must be at least 1")));
        }
    }
    let timeouts = [
        ("synthesis_timeout", server.synthesis_timeout),
        ("probe_timeout", server.probe_timeout),
    ];
    for (name, value) in timeouts {
        let representable = Duration::try_from_secs_f64(value).is_ok();
        if !representable || value <= 0.0 {
            return Err(ConfigError::InvalidServer(format!(
                "{name} must be a positive number of seconds, got {value}"
            )));
        }
    }
    Ok(())
}

fn validate_detection(detection: &DetectionConfig) -> ConfigResult<()> {
    if !(0.0..=1.0).contains(&detection.min_confidence) {
        return Err(ConfigError::InvalidServer(format!(
            "detection.min_confidence must be within 0..=1, got {}",
            detection.min_confidence
        )));
    }
    Ok(())
}

/// Structural checks on the model list that need no engine knowledge.
pub fn validate_models(models: &[ModelConfig]) -> ConfigResult<()> {
    if models.is_empty() {
        return Err(ConfigError::NoModels);
    }

    let mut seen = HashSet::new();
    let mut default_model: Option<&str> = None;
    for model in models {
        if !seen.insert(model.name.as_str()) {
            return Err(ConfigError::DuplicateModelId(model.name.clone()));
        }
        if model.languages.is_empty() {
            return Err(ConfigError::NoLanguages {
                model: model.name.clone(),
            });
        }
        if let Some(declared) = &model.default_language {
            if !model
                .languages
                .iter()
                .any(|tag| language::is_exact(tag, declared))
            {
                return Err(ConfigError::DefaultLanguageNotSupported {
                    model: model.name.clone(),
                    language: declared.clone(),
                    languages: model.languages.clone(),
                });
            }
        }
        if model.default {
            if let Some(first) = default_model {
                return Err(ConfigError::MultipleDefaults {
                    first: first.to_string(),
                    second: model.name.clone(),
                });
            }
            default_model = Some(&model.name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str, languages: &[&str]) -> ModelConfig {
        ModelConfig::new(name, "command", format!("{name}.onnx"), languages)
    }

    #[test]
    fn test_valid_models() {
        let models = vec![
            model("a", &["en-US"]).as_default(),
            model("b", &["ru-RU"]).with_default_language("ru-ru"),
        ];
        assert!(validate_models(&models).is_ok());
    }

    #[test]
    fn test_no_models() {
        assert!(matches!(validate_models(&[]), Err(ConfigError::NoModels)));
    }

    #[test]
    fn test_duplicate_id_is_named() {
        let err = validate_models(&[model("a", &["en"]), model("a", &["de"])]).unwrap_err();
        assert_eq!(err.model(), Some("a"));
    }

    #[test]
    fn test_default_language_must_be_declared() {
        let models = vec![
            model("ok", &["en-US"]),
            model("silero-ru", &["ru-RU"]).with_default_language("en-US"),
        ];
        let err = validate_models(&models).unwrap_err();
        assert!(matches!(err, ConfigError::DefaultLanguageNotSupported { .. }));
        assert_eq!(err.model(), Some("silero-ru"));
    }

    #[test]
    fn test_single_default_only() {
        let models = vec![
            model("a", &["en"]).as_default(),
            model("b", &["de"]),
            model("c", &["fr"]).as_default(),
        ];
        match validate_models(&models).unwrap_err() {
            ConfigError::MultipleDefaults { first, second } => {
                assert_eq!(first, "a");
                assert_eq!(second, "c");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_languages() {
        let err = validate_models(&[model("mute", &[])]).unwrap_err();
        assert_eq!(err.model(), Some("mute"));
    }

    #[test]
    fn test_server_limits() {
        let mut server = ServerConfig::default();
        assert!(validate_server(&server).is_ok());
        server.max_queue_size = 0;
        assert!(validate_server(&server).is_err());

        let mut server = ServerConfig::default();
        server.synthesis_timeout = 0.0;
        assert!(validate_server(&server).is_err());
    }

    #[test]
    fn test_timeouts_must_fit_a_duration() {
        let mut server = ServerConfig::default();
        server.probe_timeout = 0.25;
        assert!(validate_server(&server).is_ok());

        for value in [1e20, f64::INFINITY, f64::NAN, -1.0] {
            let mut server = ServerConfig::default();
            server.synthesis_timeout = value;
            assert!(matches!(
                validate_server(&server),
                Err(ConfigError::InvalidServer(msg)) if msg.contains("synthesis_timeout")
            ));
        }
    }

    #[test]
    fn test_oversized_timeout_in_yaml_is_a_config_error() {
        let yaml = r#"
server:
  probe_timeout: 1.0e20
engines:
  - name: piper-en
    type: command
    model: /models/en.onnx
    languages: [en-US]
"#;
        let config = crate::config::parse_yaml_str(yaml).unwrap();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidServer(msg)) if msg.contains("probe_timeout")
        ));
    }
}
