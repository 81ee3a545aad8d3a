use serving_probe::config::ConfigLoader;
use serving_probe::logging::LogFormat;
use serving_probe::registry::{inference_types, runtimes};
use serving_probe::Protocol;
use std::io::Write;
use std::time::Duration;
use tempfile::{Builder, NamedTempFile};

fn config_file(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_toml_file_overrides_defaults() {
    let file = config_file(
        ".toml",
        r#"
[logging]
level = "debug"
format = "json"

[timeouts.replicas]
budget = 120

[canary]
tolerance = 5.0

[transport]
insecure = true
"#,
    );

    let config = ConfigLoader::new()
        .load_from_file(file.path().to_str())
        .build()
        .unwrap();

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.timeouts.replicas.budget, Duration::from_secs(120));
    // Untouched keys keep their defaults
    assert_eq!(config.timeouts.replicas.interval, Duration::from_secs(5));
    assert_eq!(config.canary.tolerance, 5.0);
    assert_eq!(config.canary.iterations, 20);
    assert!(config.transport.insecure);
}

#[test]
fn test_yaml_file_is_accepted() {
    let file = config_file(
        ".yaml",
        "fan_out:\n  workers: 16\ntimeouts:\n  pods:\n    budget: 60\n    interval: 2\n",
    );

    let config = ConfigLoader::new()
        .load_from_file(file.path().to_str())
        .build()
        .unwrap();

    assert_eq!(config.fan_out.workers, 16);
    assert_eq!(config.timeouts.pods.interval, Duration::from_secs(2));
}

#[test]
fn test_invalid_values_are_rejected() {
    let file = config_file(".toml", "[fan_out]\nworkers = 0\n");
    let err = ConfigLoader::new()
        .load_from_file(file.path().to_str())
        .build()
        .unwrap_err();
    assert!(format!("{:#}", err).contains("fan_out.workers"));
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let result = ConfigLoader::new()
        .load_from_file(Some("/nonexistent/serving-probe.toml"))
        .build();
    assert!(result.is_err());
}

#[test]
fn test_environment_overrides_file() {
    let file = config_file(".toml", "[canary]\niterations = 50\n");
    std::env::set_var("SERVING_PROBE__CANARY__ITERATIONS", "7");

    let config = ConfigLoader::new()
        .load_from_file(file.path().to_str())
        .load_from_env()
        .build();
    std::env::remove_var("SERVING_PROBE__CANARY__ITERATIONS");

    assert_eq!(config.unwrap().canary.iterations, 7);
}

#[test]
fn test_registry_file_overlays_builtin_templates() {
    let registry_file = config_file(
        ".yaml",
        r#"
runtimes:
  caikit-tgis:
    default_query:
      query_input: "What is the capital of France?"
      query_output: "Paris"
  my-runtime:
    inference_types:
      all-tokens:
        default_query:
          query_input: "ping"
          query_output: "pong"
        protocols:
          http:
            endpoint: v1/generate/$model_name
            header: "Content-Type: application/json"
            body: '{"prompt": "$query_input"}'
            response_fields_map:
              response_text: output
"#,
    );
    let config_path = config_file(
        ".toml",
        &format!(
            "registry_path = {:?}\n",
            registry_file.path().to_str().unwrap()
        ),
    );

    let config = ConfigLoader::new()
        .load_from_file(config_path.path().to_str())
        .build()
        .unwrap();
    let registry = config.load_registry().unwrap();

    let custom = registry
        .lookup("my-runtime", inference_types::ALL_TOKENS, Protocol::Http)
        .unwrap();
    assert_eq!(custom.endpoint, "v1/generate/$model_name");
    assert_eq!(custom.response_field_map.response_text.as_deref(), Some("output"));

    let overridden = registry
        .default_query(runtimes::CAIKIT_TGIS, inference_types::ALL_TOKENS)
        .unwrap();
    assert_eq!(overridden.query_output.as_deref(), Some("Paris"));

    // Builtin templates for the overridden runtime survive
    assert!(registry
        .lookup(runtimes::CAIKIT_TGIS, inference_types::STREAMING, Protocol::Grpc)
        .is_ok());
}
