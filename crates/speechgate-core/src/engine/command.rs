use super::{
    CancelSignal, EngineAdapter, EngineError, EngineFactory, EngineRequest, EngineResult,
    ProbeOutcome,
};
use crate::model::Model;
use crate::params::{ParamValue, ParameterDefinition, ParameterSchema};
use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const STDERR_TAIL: usize = 512;

/// `options` accepted by the `command` engine.
///
/// ```yaml
/// options:
///   program: piper
///   args: ["--model", "{model}", "--length_scale", "{speed}", "--output_file", "{output}"]
///   env:
///     ESPEAK_DATA_PATH: /usr/share/espeak-ng-data
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CommandOptions {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Write the text to the program's stdin.
    #[serde(default = "default_true")]
    pub stdin: bool,
    /// Require the model path to exist when probing.
    #[serde(default = "default_true")]
    pub check_model: bool,
}

fn default_true() -> bool {
    true
}

/// Placeholders every template may use besides the model's parameter names.
const BUILTIN_PLACEHOLDERS: &[&str] = &[
    "model",
    "language",
    "speaker",
    "sample_rate",
    "output",
    "text",
];

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// One command-line argument with `{name}` placeholders; `{{` and `}}` escape braces.
#[derive(Debug, Clone, PartialEq)]
struct ArgTemplate {
    segments: Vec<Segment>,
}

impl ArgTemplate {
    fn parse(raw: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => return Err(format!("unclosed placeholder in '{raw}'")),
                        }
                    }
                    if name.is_empty() {
                        return Err(format!("empty placeholder in '{raw}'"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    fn render(&self, values: &HashMap<&str, String>) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(text) => text.as_str(),
                Segment::Placeholder(name) => values.get(name.as_str()).map_or("", String::as_str),
            })
            .collect()
    }
}

/// Runs a local synthesis program per request and reads the WAV it produces.
#[derive(Debug)]
pub struct CommandEngine {
    model_id: String,
    model_path: String,
    speaker: Option<String>,
    sample_rate: u32,
    options: CommandOptions,
    args: Vec<ArgTemplate>,
    writes_output_file: bool,
}

impl CommandEngine {
    pub fn new(model: &Model, options: CommandOptions) -> EngineResult<Self> {
        if options.program.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "options.program must not be empty".to_string(),
            ));
        }
        let args = options
            .args
            .iter()
            .map(|raw| ArgTemplate::parse(raw))
            .collect::<Result<Vec<_>, _>>()
            .map_err(EngineError::InvalidConfig)?;

        let parameter_names = model.parameters.names();
        for name in args.iter().flat_map(ArgTemplate::placeholders) {
            let known = BUILTIN_PLACEHOLDERS.contains(&name)
                || parameter_names.iter().any(|p| p == name);
            if !known {
                return Err(EngineError::InvalidConfig(format!(
                    "unknown placeholder '{{{name}}}' in options.args"
                )));
            }
        }
        let writes_output_file = args
            .iter()
            .flat_map(ArgTemplate::placeholders)
            .any(|name| name == "output");

        Ok(Self {
            model_id: model.id.clone(),
            model_path: model.model_path.clone(),
            speaker: model.speaker.clone(),
            sample_rate: model.sample_rate,
            options,
            args,
            writes_output_file,
        })
    }

    fn render_args(&self, request: &EngineRequest, output: Option<&Path>) -> Vec<String> {
        let mut values: HashMap<&str, String> = HashMap::new();
        values.insert("model", self.model_path.clone());
        values.insert("language", request.language.clone());
        values.insert("speaker", self.speaker.clone().unwrap_or_default());
        values.insert("sample_rate", self.sample_rate.to_string());
        values.insert("text", request.text.clone());
        if let Some(path) = output {
            values.insert("output", path.display().to_string());
        }
        // Per-request parameters shadow model attributes of the same name.
        for (name, value) in request.parameters.iter() {
            values.insert(name, render_value(value));
        }
        self.args.iter().map(|arg| arg.render(&values)).collect()
    }
}

fn render_value(value: &ParamValue) -> String {
    match value {
        ParamValue::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Locate `program` as a path or on `PATH`.
fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|path| path.is_file())
    })
}

fn tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map_or(0, |(index, _)| index);
    text[start..].to_string()
}

#[async_trait]
impl EngineAdapter for CommandEngine {
    async fn probe(&self) -> ProbeOutcome {
        let Some(program) = resolve_program(&self.options.program) else {
            return ProbeOutcome::Unavailable(format!(
                "program '{}' not found",
                self.options.program
            ));
        };
        if self.options.check_model && !Path::new(&self.model_path).exists() {
            return ProbeOutcome::Unavailable(format!(
                "model file '{}' does not exist",
                self.model_path
            ));
        }
        debug!("Model '{}' will run {}", self.model_id, program.display());
        ProbeOutcome::Available
    }

    async fn synthesize(
        &self,
        request: EngineRequest,
        mut cancel: CancelSignal,
    ) -> EngineResult<Vec<u8>> {
        let output_file = if self.writes_output_file {
            Some(
                tempfile::Builder::new()
                    .prefix("speechgate-")
                    .suffix(".wav")
                    .tempfile()?,
            )
        } else {
            None
        };
        let args = self.render_args(&request, output_file.as_ref().map(|f| f.path()));
        debug!("Model '{}': running {} {:?}", self.model_id, self.options.program, args);

        let mut child = Command::new(&self.options.program)
            .args(&args)
            .envs(&self.options.env)
            .stdin(if self.options.stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::Backend(format!("failed to start '{}': {e}", self.options.program))
            })?;

        let stdin = child.stdin.take();
        let text = request.text.as_bytes();
        let run = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(text).await {
                    Ok(()) => {}
                    // The program may exit without reading its input.
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    Err(e) => return Err(e),
                }
            }
            child.wait_with_output().await
        };

        let output = tokio::select! {
            output = run => output?,
            _ = cancel.cancelled() => {
                warn!("Model '{}': synthesis cancelled, killing {}", self.model_id, self.options.program);
                return Err(EngineError::Cancelled);
            }
        };

        if !output.status.success() {
            return Err(EngineError::Backend(format!(
                "'{}' exited with {}: {}",
                self.options.program,
                output.status,
                tail(&output.stderr)
            )));
        }

        let audio = match &output_file {
            Some(file) => tokio::fs::read(file.path()).await?,
            None => output.stdout,
        };
        if audio.is_empty() {
            return Err(EngineError::Backend(format!(
                "'{}' produced no audio",
                self.options.program
            )));
        }
        Ok(audio)
    }
}

/// Factory for the `command` engine type.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandEngineFactory;

impl EngineFactory for CommandEngineFactory {
    fn engine_type(&self) -> &str {
        "command"
    }

    fn parameter_schema(&self) -> ParameterSchema {
        ParameterSchema::new(vec![ParameterDefinition::float(
            "speed",
            "Speech rate multiplier",
            1.0,
            0.5,
            2.0,
        )])
    }

    fn build(
        &self,
        model: &Model,
        options: &Map<String, Value>,
    ) -> EngineResult<Arc<dyn EngineAdapter>> {
        let options: CommandOptions = serde_json::from_value(Value::Object(options.clone()))
            .map_err(|e| EngineError::InvalidConfig(format!("invalid options: {e}")))?;
        Ok(Arc::new(CommandEngine::new(model, options)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::validate_parameters;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::watch;

    fn model(path: &str) -> Model {
        Model {
            id: "cmd".to_string(),
            name: "Command (cmd)".to_string(),
            engine_type: "command".to_string(),
            model_path: path.to_string(),
            languages: vec!["en-US".to_string()],
            default_language: "en-US".to_string(),
            parameters: CommandEngineFactory.parameter_schema(),
            is_default: false,
            sample_rate: 16000,
            speaker: Some("amy".to_string()),
        }
    }

    fn engine(model: &Model, options: Value) -> EngineResult<Arc<dyn EngineAdapter>> {
        let Value::Object(map) = options else {
            panic!("options must be an object");
        };
        CommandEngineFactory.build(model, &map)
    }

    fn request(model: &Model) -> EngineRequest {
        EngineRequest {
            text: "Hello there".to_string(),
            language: "en-US".to_string(),
            parameters: validate_parameters(&model.parameters, &Default::default()).unwrap(),
            timeout: Duration::from_secs(5),
        }
    }

    fn write_wav(dir: &Path) -> PathBuf {
        let path = dir.join("fixture.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..1600 {
            writer.write_sample((i % 64) as i16).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_template_parsing() {
        let template = ArgTemplate::parse("--length_scale={speed}").unwrap();
        assert_eq!(
            template.segments,
            vec![
                Segment::Literal("--length_scale=".to_string()),
                Segment::Placeholder("speed".to_string())
            ]
        );
        let escaped = ArgTemplate::parse("{{literal}}").unwrap();
        assert_eq!(escaped.placeholders().count(), 0);
        assert_eq!(escaped.render(&HashMap::new()), "{literal}");
        assert!(ArgTemplate::parse("{model").is_err());
        assert!(ArgTemplate::parse("{}").is_err());
    }

    #[test]
    fn test_render_args() {
        let model = model("/models/amy.onnx");
        let engine = CommandEngine::new(
            &model,
            CommandOptions {
                program: "piper".to_string(),
                args: vec![
                    "-m".into(),
                    "{model}".into(),
                    "--speaker={speaker}".into(),
                    "{language}:{speed}:{sample_rate}".into(),
                ],
                env: BTreeMap::new(),
                stdin: true,
                check_model: true,
            },
        )
        .unwrap();
        let args = engine.render_args(&request(&model), None);
        assert_eq!(args, vec!["-m", "/models/amy.onnx", "--speaker=amy", "en-US:1:16000"]);
    }

    #[test]
    fn test_unknown_placeholder_is_rejected() {
        let model = model("/models/amy.onnx");
        let err = engine(&model, json!({"program": "piper", "args": ["{pitch}"]})).err();
        assert!(matches!(err, Some(EngineError::InvalidConfig(msg)) if msg.contains("pitch")));
    }

    #[test]
    fn test_missing_program_option() {
        let model = model("/models/amy.onnx");
        assert!(matches!(
            engine(&model, json!({"args": []})),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_reports_missing_program() {
        let model = model("/models/amy.onnx");
        let adapter = engine(&model, json!({"program": "definitely-not-a-tts-binary"})).unwrap();
        match adapter.probe().await {
            ProbeOutcome::Unavailable(reason) => assert!(reason.contains("not found")),
            ProbeOutcome::Available => panic!("probe should fail"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_checks_model_path() {
        let model = model("/no/such/model.onnx");
        let adapter = engine(&model, json!({"program": "sh"})).unwrap();
        assert!(matches!(adapter.probe().await, ProbeOutcome::Unavailable(r) if r.contains("model file")));

        let adapter = engine(&model, json!({"program": "sh", "check_model": false})).unwrap();
        assert_eq!(adapter.probe().await, ProbeOutcome::Available);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reads_wav_from_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let wav = write_wav(dir.path());
        let model = model(wav.to_str().unwrap());
        let adapter = engine(
            &model,
            json!({"program": "sh", "args": ["-c", "cat > /dev/null; cat '{model}'"]}),
        )
        .unwrap();
        assert_eq!(adapter.probe().await, ProbeOutcome::Available);

        let audio = adapter
            .synthesize(request(&model), CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(audio, std::fs::read(&wav).unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reads_wav_from_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let wav = write_wav(dir.path());
        let model = model(wav.to_str().unwrap());
        let adapter = engine(
            &model,
            json!({"program": "sh", "args": ["-c", "cat > /dev/null; cp '{model}' '{output}'"]}),
        )
        .unwrap();
        let audio = adapter
            .synthesize(request(&model), CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(audio, std::fs::read(&wav).unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_program_reports_stderr() {
        let model = model("/unused");
        let adapter = engine(
            &model,
            json!({"program": "sh", "args": ["-c", "echo voice not found >&2; exit 3"]}),
        )
        .unwrap();
        let err = adapter
            .synthesize(request(&model), CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Backend(msg) if msg.contains("voice not found")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_output_is_an_error() {
        let model = model("/unused");
        let adapter = engine(&model, json!({"program": "sh", "args": ["-c", "cat > /dev/null"]})).unwrap();
        let err = adapter
            .synthesize(request(&model), CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Backend(msg) if msg.contains("no audio")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_stops_the_program() {
        let model = model("/unused");
        let adapter = engine(
            &model,
            json!({"program": "sh", "args": ["-c", "sleep 10"], "stdin": false}),
        )
        .unwrap();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn({
            let request = request(&model);
            async move { adapter.synthesize(request, CancelSignal::new(rx)).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send_replace(true);

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("cancelled synthesis should return promptly")
            .unwrap();
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
