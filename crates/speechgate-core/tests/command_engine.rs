#![cfg(unix)]

mod common;

use common::{init_logging, silent_wav};
use speechgate_core::{
    Availability, ErrorCode, HealthStatus, OutputFormat, ServiceBuilder, SynthesisRequest,
};
use std::path::Path;

fn config(model: &Path) -> String {
    format!(
        r#"
server:
  max_queue_size: 4
  synthesis_timeout: 5
  probe_timeout: 5
detection:
  enabled: false
engines:
  - name: local-en
    type: command
    model: {model}
    languages: [en-US, en-GB]
    default: true
    sample_rate: 16000
    options:
      program: sh
      args: ["-c", "cat > /dev/null; cp '{{model}}' '{{output}}'"]
  - name: echo-ru
    type: command
    model: {model}
    languages: [ru-RU]
    parameters:
      speed: 1.25
    options:
      program: sh
      args: ["-c", "test '{{speed}}' = 1.25 || exit 7; cat > /dev/null; cat '{{model}}'"]
  - name: missing
    type: command
    model: /no/such/voice.onnx
    languages: [de-DE]
    options:
      program: sh
"#,
        model = model.display()
    )
}

#[tokio::test]
async fn test_yaml_configured_command_engines_synthesize() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let wav_path = dir.path().join("voice.wav");
    let wav = silent_wav(16000, 250);
    std::fs::write(&wav_path, &wav).unwrap();

    let service = ServiceBuilder::from_yaml_str(&config(&wav_path))
        .unwrap()
        .build()
        .await
        .unwrap();

    assert!(matches!(
        service.registry().state("missing"),
        Some(Availability::Unavailable(reason)) if reason.contains("does not exist")
    ));
    assert_eq!(service.health().status, HealthStatus::Degraded);

    let result = service
        .synthesize(SynthesisRequest::new("Hello world"))
        .await
        .unwrap();
    assert_eq!(result.metadata.model_id, "local-en");
    assert_eq!(result.metadata.sample_rate, 16000);
    assert_eq!(result.metadata.duration_ms, 250);
    assert_eq!(result.audio, wav);

    let result = service
        .synthesize(
            SynthesisRequest::new("Привет")
                .with_language("ru")
                .with_format(OutputFormat::Pcm),
        )
        .await
        .unwrap();
    assert_eq!(result.metadata.model_id, "echo-ru");
    assert_eq!(result.audio.len(), 4000 * 2);

    // Overriding the configured default makes the script exit non-zero.
    let err = service
        .synthesize(
            SynthesisRequest::new("Привет")
                .with_model("echo-ru")
                .with_parameter("speed", 1.5),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::SynthesisFailed);

    let err = service
        .synthesize(SynthesisRequest::new("Hallo").with_model("missing"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ModelUnavailable);
}
