//! gRPC transport via `grpcurl`
//!
//! Reflection-free calls are issued by the `grpcurl` CLI in verbose mode so
//! response headers and trailers are printed alongside the messages. Unary
//! calls print a single message; server-streaming calls print every message
//! in arrival order, which is kept verbatim as the raw output.

use super::command::{render_command, CommandRunner, TokioCommandRunner};
use crate::registry::Protocol;
use crate::request::ResolvedRequest;
use crate::transport::{
    InvocationResult, StatsSnapshot, Transport, TransportConfig, TransportError, TransportInfo,
    TransportStats, TransportType,
};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{debug, warn};

/// gRPC transport shelling out to `grpcurl`
#[derive(Debug)]
pub struct GrpcurlTransport {
    runner: Arc<dyn CommandRunner>,
    config: TransportConfig,
    stats: TransportStats,
}

impl GrpcurlTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self::with_runner(config, Arc::new(TokioCommandRunner))
    }

    pub fn with_runner(config: TransportConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            config,
            stats: TransportStats::default(),
        }
    }

    /// Command-line arguments for one request
    pub fn arguments(&self, request: &ResolvedRequest) -> Vec<String> {
        let mut args = vec!["-v".to_string()];
        if request.plaintext {
            args.push("-plaintext".to_string());
        } else if request.insecure || self.config.insecure {
            args.push("-insecure".to_string());
        }
        for (name, value) in &request.headers {
            args.push("-H".to_string());
            args.push(format!("{}: {}", name, value));
        }
        if let Some(token) = &request.token {
            args.push("-H".to_string());
            args.push(format!("Authorization: Bearer {}", token.expose_secret()));
        }
        if !request.body.is_empty() {
            args.push("-d".to_string());
            args.push(request.body.clone());
        }
        args.push("-max-time".to_string());
        args.push(self.config.request_timeout_secs.to_string());
        args.push(request.target.clone());
        args.push(request.endpoint.clone());
        args
    }

    async fn call(&self, request: &ResolvedRequest) -> Result<InvocationResult, TransportError> {
        if request.protocol != Protocol::Grpc {
            return Err(TransportError::InvalidRequest(format!(
                "grpcurl transport cannot carry {} requests",
                request.protocol
            )));
        }

        let args = self.arguments(request);
        let command = render_command(&self.config.grpcurl_path, &args);
        debug!(command = %command, "Invoking grpcurl");

        // grpcurl enforces -max-time itself; the outer bound only catches a
        // wedged process.
        let outer_timeout = self.config.request_timeout() + self.config.connect_timeout();
        let output = self
            .runner
            .run(&self.config.grpcurl_path, &args, outer_timeout)
            .await
            .map_err(|e| match e {
                TransportError::Command {
                    message, output, ..
                } => TransportError::Command {
                    command: command.clone(),
                    message,
                    output,
                },
                TransportError::Timeout { timeout, .. } => TransportError::Timeout {
                    target: request.destination(),
                    timeout,
                },
                other => other,
            })?;

        let verbose = VerboseOutput::parse(&output.stdout);

        if output.success() {
            let mut result = InvocationResult::ok(verbose.contents);
            result.headers = verbose.metadata;
            return Ok(result);
        }

        warn!(
            command = %command,
            exit_code = ?output.exit_code,
            "grpcurl exited unsuccessfully"
        );
        // Trailers arrive on stdout, the status on stderr
        let captured = [output.stdout.trim_end(), output.stderr.trim_end()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n");
        let mut result = InvocationResult::failed(captured);
        result.headers = verbose.metadata;
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Descriptor,
    RequestMetadata,
    ResponseMetadata,
    Contents,
}

/// `grpcurl -v` output split into response metadata and message contents
#[derive(Debug, Default, PartialEq, Eq)]
struct VerboseOutput {
    /// Response headers followed by trailers
    metadata: Vec<(String, String)>,
    contents: String,
}

impl VerboseOutput {
    /// Output without any section banner is taken as contents
    fn parse(stdout: &str) -> Self {
        let mut parsed = VerboseOutput::default();
        let mut contents = Vec::new();
        let mut section = Section::Preamble;
        let mut saw_banner = false;

        for line in stdout.lines() {
            let trimmed = line.trim();
            let next = match trimmed {
                "Resolved method descriptor:" => Some(Section::Descriptor),
                "Request metadata to send:" => Some(Section::RequestMetadata),
                "Response headers received:" | "Response trailers received:" => {
                    Some(Section::ResponseMetadata)
                }
                "Response contents:" => Some(Section::Contents),
                _ => None,
            };
            if let Some(next) = next {
                section = next;
                saw_banner = true;
                continue;
            }
            if trimmed.starts_with("Sent ") && trimmed.contains(" request") {
                section = Section::Preamble;
                continue;
            }
            if trimmed.starts_with("Estimated response size") {
                continue;
            }

            match section {
                Section::ResponseMetadata => {
                    if let Some((name, value)) = trimmed.split_once(':') {
                        parsed
                            .metadata
                            .push((name.trim().to_string(), value.trim().to_string()));
                    }
                }
                Section::Contents => contents.push(line),
                _ => {}
            }
        }

        parsed.contents = if saw_banner {
            contents.join("\n").trim().to_string()
        } else {
            stdout.to_string()
        };
        parsed
    }
}

#[async_trait]
impl Transport for GrpcurlTransport {
    async fn execute(
        &self,
        request: &ResolvedRequest,
    ) -> Result<InvocationResult, TransportError> {
        match self.call(request).await {
            Ok(result) => {
                self.stats.record_result(&result);
                Ok(result)
            }
            Err(e) => {
                self.stats.record_error();
                Err(e)
            }
        }
    }

    fn transport_info(&self) -> TransportInfo {
        TransportInfo {
            transport_type: TransportType::Grpcurl,
            description: format!("gRPC via {}", self.config.grpcurl_path),
        }
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::command::CommandOutput;
    use secrecy::SecretString;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug)]
    struct FakeRunner {
        output: CommandOutput,
        seen: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(
            &self,
            _program: &str,
            args: &[String],
            _timeout: Duration,
        ) -> Result<CommandOutput, TransportError> {
            self.seen.lock().unwrap().push(args.to_vec());
            Ok(self.output.clone())
        }
    }

    fn grpc_request() -> ResolvedRequest {
        ResolvedRequest {
            protocol: Protocol::Grpc,
            target: "flan.example.com:443".to_string(),
            endpoint: "caikit.runtime.Nlp.NlpService/TextGenerationTaskPredict".to_string(),
            headers: vec![("mm-model-id".to_string(), "flan".to_string())],
            body: r#"{"text": "hi"}"#.to_string(),
            port: None,
            token: Some(SecretString::new("tok".into())),
            insecure: true,
            plaintext: false,
        }
    }

    fn transport(output: CommandOutput) -> (GrpcurlTransport, Arc<FakeRunner>) {
        let runner = Arc::new(FakeRunner {
            output,
            seen: Mutex::new(Vec::new()),
        });
        (
            GrpcurlTransport::with_runner(TransportConfig::default(), runner.clone()),
            runner,
        )
    }

    #[tokio::test]
    async fn test_arguments_layout() {
        let (transport, runner) = transport(CommandOutput {
            exit_code: Some(0),
            stdout: r#"{"generated_text": "74 degrees F"}"#.to_string(),
            stderr: String::new(),
        });
        let result = transport.execute(&grpc_request()).await.unwrap();
        assert!(result.success);

        let args = runner.seen.lock().unwrap()[0].clone();
        assert_eq!(&args[0..2], &["-v", "-insecure"]);
        assert_eq!(&args[2..4], &["-H", "mm-model-id: flan"]);
        assert_eq!(&args[4..6], &["-H", "Authorization: Bearer tok"]);
        assert_eq!(&args[6..8], &["-d", r#"{"text": "hi"}"#]);
        assert_eq!(args[args.len() - 2], "flan.example.com:443");
        assert_eq!(
            args[args.len() - 1],
            "caikit.runtime.Nlp.NlpService/TextGenerationTaskPredict"
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_unsuccessful_result() {
        let (transport, _) = transport(CommandOutput {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "ERROR:\n  Code: Unauthenticated\n  Message: credential not found".to_string(),
        });
        let result = transport.execute(&grpc_request()).await.unwrap();
        assert!(!result.success);
        assert!(result.raw_output.contains("Unauthenticated"));
        assert_eq!(transport.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_streaming_output_kept_in_order() {
        let stdout = "{\n  \"generated_text\": \"74\"\n}\n{\n  \"generated_text\": \" degrees F\"\n}\n";
        let (transport, _) = transport(CommandOutput {
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        });
        let result = transport.execute(&grpc_request()).await.unwrap();
        assert_eq!(result.raw_output, stdout);
        assert!(result.parsed_output.as_json().is_none());
    }

    #[tokio::test]
    async fn test_plaintext_flag() {
        let (transport, _) = transport(CommandOutput::default());
        let mut request = grpc_request();
        request.plaintext = true;
        assert_eq!(transport.arguments(&request)[1], "-plaintext");
    }

    const VERBOSE_UNARY: &str = "
Resolved method descriptor:
rpc TextGenerationTaskPredict ( .caikit.runtime.Nlp.TextGenerationTaskRequest ) returns ( .caikit_data_model.nlp.GeneratedTextResult );

Request metadata to send:
mm-model-id: flan

Response headers received:
content-type: application/grpc

Estimated response size: 24 bytes

Response contents:
{
  \"generated_text\": \"74 degrees F\"
}

Response trailers received:
(empty)
Sent 1 request and received 1 response
";

    #[tokio::test]
    async fn test_verbose_output_keeps_only_message_contents() {
        let (transport, _) = transport(CommandOutput {
            exit_code: Some(0),
            stdout: VERBOSE_UNARY.to_string(),
            stderr: String::new(),
        });
        let result = transport.execute(&grpc_request()).await.unwrap();
        let json = result.parsed_output.as_json().unwrap();
        assert_eq!(json["generated_text"], "74 degrees F");
        assert_eq!(result.header("content-type"), Some("application/grpc"));
        // Request metadata is not a response header
        assert_eq!(result.header("mm-model-id"), None);
    }

    #[test]
    fn test_verbose_streaming_messages_in_order() {
        let stdout = "Response headers received:\n(empty)\n\nResponse contents:\n{\n  \"text\": \"a\"\n}\n\nResponse contents:\n{\n  \"text\": \"b\"\n}\n\nResponse trailers received:\n(empty)\nSent 1 request and received 2 responses\n";
        let parsed = VerboseOutput::parse(stdout);
        assert_eq!(parsed.contents, "{\n  \"text\": \"a\"\n}\n\n{\n  \"text\": \"b\"\n}");
        assert!(parsed.metadata.is_empty());
    }

    #[tokio::test]
    async fn test_trailer_reason_survives_failed_exit() {
        let (transport, _) = transport(CommandOutput {
            exit_code: Some(1),
            stdout: "Response headers received:\n(empty)\n\nResponse trailers received:\nx-ext-auth-reason: credential not found\nSent 1 request and received 0 responses\n".to_string(),
            stderr: "ERROR:\n  Code: Unauthenticated\n  Message: Unauthorized\n".to_string(),
        });
        let result = transport.execute(&grpc_request()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.header("x-ext-auth-reason"), Some("credential not found"));
        assert!(result.raw_output.contains("x-ext-auth-reason: credential not found"));
        assert!(result.raw_output.contains("Code: Unauthenticated"));
    }

    #[derive(Debug)]
    struct BrokenRunner {
        timeout: bool,
    }

    #[async_trait]
    impl CommandRunner for BrokenRunner {
        async fn run(
            &self,
            program: &str,
            _args: &[String],
            timeout: Duration,
        ) -> Result<CommandOutput, TransportError> {
            if self.timeout {
                Err(TransportError::Timeout {
                    target: program.to_string(),
                    timeout,
                })
            } else {
                Err(TransportError::Command {
                    command: program.to_string(),
                    message: "failed to spawn: No such file or directory".to_string(),
                    output: String::new(),
                })
            }
        }
    }

    #[tokio::test]
    async fn test_runner_failures_name_target_and_method() {
        for timeout in [false, true] {
            let transport = GrpcurlTransport::with_runner(
                TransportConfig::default(),
                Arc::new(BrokenRunner { timeout }),
            );
            let err = transport.execute(&grpc_request()).await.unwrap_err();
            let message = err.to_string();
            assert!(message.contains("flan.example.com:443"), "{}", message);
            assert!(message.contains("TextGenerationTaskPredict"), "{}", message);
            assert!(!message.contains("Bearer tok"), "{}", message);
        }
    }
}
