use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use speechgate_core::config::{LogFormat, LoggingConfig, parse_yaml_file, resolve_config_path};
use speechgate_core::{
    HealthStatus, OutputFormat, ServiceBuilder, SynthesisRequest, SynthesisService,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "speechgate")]
#[command(about = "Speechgate CLI - Route text to local speech-synthesis engines", long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, global = true, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured models with their availability
    Models {
        /// Only show models that are ready to synthesize
        #[arg(long)]
        available: bool,
    },
    /// Probe all models and print the health report
    Health,
    /// Synthesize text to an audio file
    Synth {
        /// Text to speak
        #[arg(short, long)]
        text: String,

        /// Model id (resolved from language or detection when omitted)
        #[arg(short, long)]
        model: Option<String>,

        /// BCP-47 language tag, e.g. en-US
        #[arg(short, long)]
        language: Option<String>,

        /// Model parameter as name=value; repeatable
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,

        /// Output format
        #[arg(short, long, default_value = "wav")]
        format: OutputFormat,

        /// Where to write the audio
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let path = resolve_config_path(cli.config.as_deref());
    let config = parse_yaml_file(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    init_logging(&config.logging);
    log::info!("Loaded configuration from {}", path.display());

    let service = ServiceBuilder::new(config)
        .context("Invalid configuration")?
        .build()
        .await
        .context("Failed to start the synthesis service")?;

    match cli.command {
        Commands::Models { available } => {
            let listing = if available {
                json!({ "models": service.list_available_models() })
            } else {
                serde_json::to_value(service.list_models())?
            };
            println!("{}", serde_json::to_string_pretty(&listing)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Health => {
            let report = service.health();
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.status == HealthStatus::Unhealthy {
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Synth {
            text,
            model,
            language,
            params,
            format,
            output,
        } => {
            let mut request = SynthesisRequest::new(text).with_format(format);
            request.model_id = model;
            request.language = language;
            request.parameters = params.into_iter().collect();
            let output = output.unwrap_or_else(|| PathBuf::from(format!("speech.{format}")));
            synthesize(&service, request, &output).await
        }
    }
}

async fn synthesize(
    service: &SynthesisService,
    request: SynthesisRequest,
    output: &Path,
) -> Result<ExitCode> {
    match service.synthesize(request).await {
        Ok(result) => {
            std::fs::write(output, &result.audio)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            log::info!("Wrote {} bytes to {}", result.audio.len(), output.display());
            println!("{}", serde_json::to_string_pretty(&result.metadata)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", serde_json::to_string_pretty(&e.to_body())?);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// `name=value`; the value is read as JSON when it parses, as a string otherwise.
fn parse_param(raw: &str) -> std::result::Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing parameter name in '{raw}'"));
    }
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

/// Initialise `env_logger` from the `logging` section. `RUST_LOG` takes precedence.
fn init_logging(logging: &LoggingConfig) {
    let env = env_logger::Env::default().default_filter_or(logging.level.as_str());
    let mut builder = env_logger::Builder::from_env(env);
    if logging.format == LogFormat::Json {
        builder.format(|buf, record| {
            let line = json!({
                "timestamp": buf.timestamp().to_string(),
                "level": record.level().as_str(),
                "target": record.target(),
                "message": record.args().to_string(),
            });
            writeln!(buf, "{line}")
        });
    }
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("speed=1.5").unwrap(),
            ("speed".to_string(), json!(1.5))
        );
        assert_eq!(
            parse_param("speaker=xenia").unwrap(),
            ("speaker".to_string(), json!("xenia"))
        );
        assert_eq!(
            parse_param("normalize=true").unwrap(),
            ("normalize".to_string(), json!(true))
        );
        assert!(parse_param("speed").is_err());
        assert!(parse_param("=1").is_err());
    }

    #[test]
    fn test_cli_parses_synth() {
        let cli = Cli::try_parse_from([
            "speechgate",
            "--config",
            "/etc/speechgate.yaml",
            "synth",
            "--text",
            "Привет",
            "--param",
            "speed=1.2",
            "-p",
            "speaker=baya",
            "--format",
            "pcm",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/speechgate.yaml")));
        match cli.command {
            Commands::Synth { params, format, .. } => {
                assert_eq!(params.len(), 2);
                assert_eq!(format, OutputFormat::Pcm);
            }
            _ => panic!("expected synth"),
        }
    }
}
