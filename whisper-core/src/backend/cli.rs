//! Backend that shells out to a command-line generator (the `gemini` CLI).

use super::{BackendError, GenerationBackend, GenerationRequest};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

const DEFAULT_PROGRAM: &str = "gemini";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Runs one subprocess per request and returns its stdout.
///
/// The child is spawned with `kill_on_drop`, so a caller that gives up on
/// the future (for example on timeout) also kills the process.
#[derive(Debug, Clone)]
pub struct CliBackend {
    program: String,
    base_args: Vec<String>,
    prompt_flag: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
}

impl CliBackend {
    /// A backend running `program` with no extra arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            prompt_flag: None,
            model: None,
            api_key: None,
        }
    }

    /// The `gemini -p <prompt> --model <model>` layout.
    pub fn gemini() -> Self {
        Self::new(DEFAULT_PROGRAM)
            .with_prompt_flag("-p")
            .with_model(DEFAULT_MODEL)
    }

    /// Like [`CliBackend::gemini`], forwarding GEMINI_API_KEY if set.
    pub fn gemini_from_env() -> Self {
        let backend = Self::gemini();
        match std::env::var("GEMINI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => backend.with_api_key(key),
            _ => backend,
        }
    }

    /// Arguments placed before the prompt.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Flag that introduces the prompt argument, e.g. `-p`.
    pub fn with_prompt_flag(mut self, flag: impl Into<String>) -> Self {
        self.prompt_flag = Some(flag.into());
        self
    }

    /// Default model, passed as `--model` unless the request names one.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn command(&self, request: &GenerationRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args);

        if let Some(flag) = &self.prompt_flag {
            cmd.arg(flag);
        }
        cmd.arg(&request.prompt);

        if let Some(model) = request.model.as_ref().or(self.model.as_ref()) {
            cmd.arg("--model").arg(model);
        }
        if let Some(key) = &self.api_key {
            cmd.env("GEMINI_API_KEY", key);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl GenerationBackend for CliBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<String, BackendError> {
        let child = self
            .command(&request)
            .spawn()
            .map_err(|e| BackendError::Spawn(format!("{}: {e}", self.program)))?;

        debug!(program = %self.program, pid = child.id(), "Spawned backend process");

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !output.status.success() {
            return Err(BackendError::ExitStatus {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(BackendError::EmptyOutput);
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        &self.program
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::backend::invoke_with_deadline;
    use std::time::Duration;

    fn sh(script: &str) -> CliBackend {
        CliBackend::new("sh").with_args(["-c", script])
    }

    #[test]
    fn test_gemini_layout() {
        let backend = CliBackend::gemini();
        let cmd = backend.command(&GenerationRequest::new("hello"));
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, vec!["-p", "hello", "--model", DEFAULT_MODEL]);
    }

    #[test]
    fn test_request_model_overrides_default() {
        let backend = CliBackend::gemini();
        let cmd = backend.command(&GenerationRequest::new("x").with_model("gemini-2.5-pro"));
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args.last().map(String::as_str), Some("gemini-2.5-pro"));
    }

    #[tokio::test]
    async fn test_stdout_is_trimmed() {
        let out = sh("printf '  你好呀  \\n'")
            .generate(GenerationRequest::new("ignored"))
            .await
            .unwrap();
        assert_eq!(out, "你好呀");
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let err = sh("echo boom >&2; exit 3")
            .generate(GenerationRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::ExitStatus { code: Some(3), ref stderr } if stderr == "boom"
        ));
    }

    #[tokio::test]
    async fn test_empty_output() {
        let err = sh("true")
            .generate(GenerationRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::EmptyOutput));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = CliBackend::new("definitely-not-a-real-binary-4242")
            .generate(GenerationRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_slow_process_times_out() {
        let backend = sh("sleep 30; echo late");
        let started = std::time::Instant::now();
        let err = invoke_with_deadline(
            &backend,
            GenerationRequest::new("x"),
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timed_out_process_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let backend = sh(&format!("sleep 1; touch '{}'", marker.display()));

        let err = invoke_with_deadline(
            &backend,
            GenerationRequest::new("x"),
            Duration::from_millis(200),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!marker.exists(), "child kept running after the deadline");
    }
}
