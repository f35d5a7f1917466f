//! Integration tests for configuration loading

mod common;

use serial_test::serial;

use parley::cli::Cli;
use parley::config::Config;
use parley::providers::ProviderKind;

use common::temp_config_file;

#[test]
#[serial]
fn test_shipped_sample_config_is_valid() {
    let contents = std::fs::read_to_string(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/config/config.yaml"
    ))
    .expect("sample config present");
    let config = Config::from_yaml(&contents).expect("sample config parses");
    config.validate().expect("sample config validates");
    assert_eq!(config.provider.provider_type, ProviderKind::OpenAi);
    assert_eq!(config.engine.summary.threshold, 20);
}

#[test]
#[serial]
fn test_load_file_then_env_then_cli() {
    let (_dir, path) = temp_config_file(
        r#"
provider:
  type: gemini
  gemini:
    model: gemini-1.5-pro
engine:
  timeout_seconds: 45
  context:
    token_budget: 8000
storage:
  path: /from/file
"#,
    );

    std::env::set_var("PARLEY_TIMEOUT_SECONDS", "12");
    std::env::remove_var("PARLEY_STORAGE_PATH");
    std::env::remove_var("PARLEY_PROVIDER");

    let cli = Cli {
        storage_path: Some("/from/cli".to_string()),
        ..Cli::default()
    };
    let config = Config::load(path.to_str().unwrap(), &cli).unwrap();
    std::env::remove_var("PARLEY_TIMEOUT_SECONDS");

    assert_eq!(config.provider.provider_type, ProviderKind::Gemini);
    assert_eq!(config.provider.model_for(ProviderKind::Gemini), "gemini-1.5-pro");
    assert_eq!(config.engine.context.token_budget, 8000);
    assert_eq!(config.engine.timeout_seconds, 12);
    assert_eq!(config.storage.path.as_deref(), Some("/from/cli"));
    config.validate().unwrap();
}

#[test]
#[serial]
fn test_invalid_values_fail_validation() {
    let (_dir, path) = temp_config_file("provider:\n  type: openai\nengine:\n  temperature: 3.5\n");
    let config = Config::load(path.to_str().unwrap(), &Cli::default()).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("temperature"));
}

#[test]
#[serial]
fn test_unknown_provider_type_is_rejected() {
    let (_dir, path) = temp_config_file("provider:\n  type: copilot\n");
    assert!(Config::load(path.to_str().unwrap(), &Cli::default()).is_err());
}
