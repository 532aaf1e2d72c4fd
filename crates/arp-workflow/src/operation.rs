//! External operation and validation capabilities

use async_trait::async_trait;
use serde::Serialize;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::debug;

/// What the coordinator asks the external capability to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    pub operation: String,
    pub target: String,
    pub context: String,
    /// Strategy chosen in step 3, if any
    pub strategy: Option<String>,
    /// 1 for the first attempt
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    /// Short human-readable outcome, used to classify failures
    pub message: String,
    #[serde(with = "secs")]
    pub elapsed: Duration,
}

impl OperationResult {
    #[must_use]
    pub fn success(message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            success: true,
            message: message.into(),
            elapsed,
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            success: false,
            message: message.into(),
            elapsed,
        }
    }
}

mod secs {
    use serde::Serializer;
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

/// Performs the actual file operation
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    async fn execute(&self, request: &OperationRequest) -> OperationResult;
}

/// Checks an executor-reported success (step 8)
#[async_trait]
pub trait ResultValidator: Send + Sync {
    async fn validate(&self, request: &OperationRequest, result: &OperationResult) -> bool;
}

/// Accepts whatever the executor reported
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustExecutor;

#[async_trait]
impl ResultValidator for TrustExecutor {
    async fn validate(&self, _request: &OperationRequest, result: &OperationResult) -> bool {
        result.success
    }
}

/// Runs a command; exit status 0 is success
///
/// The request is exposed to the child as `ARP_OPERATION`, `ARP_TARGET`,
/// `ARP_CONTEXT`, `ARP_STRATEGY` and `ARP_ATTEMPT`.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandExecutor {
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `argv[0]` is the program
    #[must_use]
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

#[async_trait]
impl OperationExecutor for CommandExecutor {
    async fn execute(&self, request: &OperationRequest) -> OperationResult {
        let started = Instant::now();
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .env("ARP_OPERATION", &request.operation)
            .env("ARP_TARGET", &request.target)
            .env("ARP_CONTEXT", &request.context)
            .env("ARP_STRATEGY", request.strategy.as_deref().unwrap_or(""))
            .env("ARP_ATTEMPT", request.attempt.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;
        let elapsed = started.elapsed();

        match output {
            Ok(output) if output.status.success() => {
                debug!(program = %self.program, attempt = request.attempt, "command succeeded");
                OperationResult::success(
                    last_line(&output.stdout).unwrap_or_else(|| "ok".to_string()),
                    elapsed,
                )
            }
            Ok(output) => {
                let message = last_line(&output.stderr)
                    .or_else(|| last_line(&output.stdout))
                    .unwrap_or_else(|| format!("{} exited with {}", self.program, output.status));
                OperationResult::failure(message, elapsed)
            }
            Err(e) => OperationResult::failure(format!("failed to run {}: {e}", self.program), elapsed),
        }
    }
}

/// Last non-blank line; invalid UTF-8 is replaced, not dropped
fn last_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> OperationRequest {
        OperationRequest {
            operation: "modify".into(),
            target: "src/lib.rs".into(),
            context: "build_error".into(),
            strategy: Some("rebuild".into()),
            attempt: 1,
        }
    }

    #[test]
    fn last_line_skips_blank_lines() {
        assert_eq!(last_line(b"one\ntwo\n\n  \n").as_deref(), Some("two"));
        assert_eq!(last_line(b""), None);
    }

    #[test]
    fn invalid_utf8_keeps_the_message() {
        let stderr = b"warning: \xff\xfe garbage\nerror: No such module 'Core'\n";
        assert_eq!(last_line(stderr).as_deref(), Some("error: No such module 'Core'"));
        let mangled = last_line(b"Build failed \xff").unwrap();
        assert!(mangled.starts_with("Build failed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_status_maps_to_result() {
        let ok = CommandExecutor::from_argv(&["true".to_string()]).unwrap();
        assert!(ok.execute(&request()).await.success);

        let fail = CommandExecutor::new(
            "sh",
            vec!["-c".into(), "echo \"No such module $ARP_TARGET\" >&2; exit 3".into()],
        );
        let result = fail.execute(&request()).await;
        assert!(!result.success);
        assert_eq!(result.message, "No such module src/lib.rs");
    }

    #[tokio::test]
    async fn missing_program_is_a_failure() {
        let missing = CommandExecutor::new("definitely-not-a-real-binary-arp", Vec::new());
        let result = missing.execute(&request()).await;
        assert!(!result.success);
        assert!(result.message.starts_with("failed to run"));
    }
}
