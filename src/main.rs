//! serving-probe CLI
//!
//! Runs inference verification and canary estimation against a model-serving
//! endpoint from the command line.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serving_probe::checks::{wait_for_traffic_split, CanaryEstimator};
use serving_probe::config::{ConfigLoader, ProbeConfig};
use serving_probe::logging::{init_logging, LogFormat};
use serving_probe::{
    Expectation, InferenceCall, InferenceEngine, Protocol, RequestBuilder, ServiceEndpoint,
};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "serving-probe", version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log filter, overrides the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Console log format
    #[arg(long, global = true, value_parser = ["text", "json"])]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List runtimes and their inference types
    Runtimes {
        /// Show a single runtime
        #[arg(long)]
        runtime: Option<String>,
    },
    /// Send one inference request and validate the response
    Infer {
        #[command(flatten)]
        target: TargetArgs,

        /// Expected output; defaults to the runtime's declared output
        #[arg(long)]
        expect: Option<String>,

        /// Treat --expect as a regex searched in the output
        #[arg(long)]
        regex: bool,

        /// Expect an authorization rejection instead of a response
        #[arg(long)]
        expect_unauthorized: bool,
    },
    /// Estimate the share of traffic served by a canary
    Canary {
        #[command(flatten)]
        target: TargetArgs,

        /// Output only the new model version produces
        #[arg(long)]
        new_output: String,

        /// Output of the version being replaced
        #[arg(long)]
        old_output: Option<String>,

        /// Expected canary traffic percentage
        #[arg(long)]
        expected_percentage: f64,

        #[arg(long)]
        tolerance: Option<f64>,

        #[arg(long)]
        iterations: Option<u32>,

        /// Re-estimate until the split converges, bounded by `timeouts.route`
        #[arg(long)]
        wait: bool,
    },
    /// Send many requests concurrently and report the outcome
    FanOut {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(long, default_value_t = 10)]
        requests: usize,

        #[arg(long)]
        workers: Option<usize>,
    },
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Runtime name, e.g. caikit-tgis
    #[arg(long)]
    runtime: String,

    /// Inference type, e.g. all-tokens
    #[arg(long)]
    inference_type: String,

    /// http, https or grpc
    #[arg(long, default_value = "https")]
    protocol: String,

    #[arg(long)]
    model: String,

    /// Service URL or host[:port]
    #[arg(long)]
    endpoint: String,

    #[arg(long)]
    port: Option<u16>,

    /// Query text; the runtime default is used when omitted
    #[arg(long)]
    query: Option<String>,

    /// Bearer token
    #[arg(long, env = "SERVING_PROBE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// Plaintext gRPC
    #[arg(long)]
    plaintext: bool,
}

impl TargetArgs {
    fn call(&self) -> InferenceCall {
        let mut call = InferenceCall::new(&self.runtime, &self.inference_type, &self.model);
        call = match &self.query {
            Some(query) => call.with_query(query.as_str()),
            None => call.with_default_query(),
        };
        if let Some(token) = &self.token {
            call = call.with_token(token.clone());
        }
        call
    }

    fn engine(&self, config: &ProbeConfig) -> Result<InferenceEngine> {
        let protocol: Protocol = self.protocol.parse()?;
        let registry = Arc::new(config.load_registry()?);
        let mut endpoint = ServiceEndpoint::new(self.endpoint.clone());
        if let Some(port) = self.port {
            endpoint = endpoint.with_port(port);
        }
        let builder = RequestBuilder::new(registry, protocol, endpoint)
            .insecure(self.insecure || config.transport.insecure)
            .plaintext(self.plaintext);
        Ok(InferenceEngine::for_protocol(builder, &config.transport)?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ConfigLoader::new()
        .load_from_file(cli.config.as_deref())
        .load_from_env()
        .build()?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.log_format.as_deref() == Some("json") {
        config.logging.format = LogFormat::Json;
    }
    let _guard = init_logging(&config.logging)?;

    match cli.command {
        Command::Runtimes { runtime } => list_runtimes(&config, runtime.as_deref()),
        Command::Infer {
            target,
            expect,
            regex,
            expect_unauthorized,
        } => {
            let engine = target.engine(&config)?;
            let call = target.call();
            let result = if expect_unauthorized {
                engine.verify_unauthorized(&call).await?
            } else if let Some(expected) = expect {
                let expectation = if regex {
                    Expectation::regex(expected)
                } else {
                    Expectation::exact(expected)
                };
                engine.verify(&call, &expectation).await?
            } else if call.use_default_query {
                engine.verify_default(&call).await?
            } else {
                engine.verify(&call, &Expectation::success()).await?
            };
            println!("{}", result.raw_output);
            info!(runtime = %call.runtime, "Inference verified");
            Ok(())
        }
        Command::Canary {
            target,
            new_output,
            old_output,
            expected_percentage,
            tolerance,
            iterations,
            wait,
        } => {
            let engine = target.engine(&config)?;
            let mut estimator = CanaryEstimator::new(&engine, Expectation::exact(new_output));
            if let Some(old) = old_output {
                estimator = estimator.previous_version(Expectation::exact(old));
            }
            let call = target.call();
            let iterations = iterations.unwrap_or(config.canary.iterations);
            let tolerance = tolerance.unwrap_or(config.canary.tolerance);
            let report = if wait {
                wait_for_traffic_split(
                    &estimator,
                    &call,
                    iterations,
                    expected_percentage,
                    tolerance,
                    config.timeouts.route,
                )
                .await?
            } else {
                estimator.estimate(&call, iterations).await?
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            report
                .check(expected_percentage, tolerance)
                .context("Canary check failed")?;
            Ok(())
        }
        Command::FanOut {
            target,
            requests,
            workers,
        } => {
            let engine = target.engine(&config)?;
            let summary = engine
                .fan_out(
                    &target.call(),
                    requests,
                    workers.unwrap_or(config.fan_out.workers),
                )
                .await;
            println!(
                "{} requests: {} succeeded, {} failed",
                summary.total(),
                summary.succeeded(),
                summary.failed()
            );
            if summary.failed() > 0 {
                bail!("{} of {} requests failed", summary.failed(), summary.total());
            }
            Ok(())
        }
    }
}

fn list_runtimes(config: &ProbeConfig, only: Option<&str>) -> Result<()> {
    let registry = config.load_registry()?;
    let names: Vec<String> = match only {
        Some(name) => vec![name.to_string()],
        None => registry.runtime_names().map(String::from).collect(),
    };
    for name in names {
        println!("{}", name);
        for (inference_type, protocol) in registry.capabilities(&name)? {
            println!("  {:<20} {}", inference_type, protocol);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_canary_wait_flag() {
        let cli = Cli::try_parse_from([
            "serving-probe",
            "canary",
            "--runtime",
            "caikit-tgis",
            "--inference-type",
            "all-tokens",
            "--model",
            "flan",
            "--endpoint",
            "flan.example.com",
            "--new-output",
            "74 degrees F",
            "--expected-percentage",
            "30",
            "--wait",
        ])
        .unwrap();
        let Command::Canary {
            wait,
            expected_percentage,
            ..
        } = cli.command
        else {
            panic!("expected canary subcommand");
        };
        assert!(wait);
        assert_eq!(expected_percentage, 30.0);
    }
}
