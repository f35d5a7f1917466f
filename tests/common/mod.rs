use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use parley::config::Config;
use parley::providers::ProviderKind;
use parley::storage::SledStore;
use parley::Engine;

/// Engine over a sled database in a fresh temporary directory
#[allow(dead_code)]
pub fn create_temp_engine(config: Config) -> (Engine, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let store = SledStore::new(tmp.path().join("parley.sled")).expect("failed to open sled store");
    (Engine::new(config, Arc::new(store)), tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Configuration pointing `kind` at a mock server
#[allow(dead_code)]
pub fn config_for_server(kind: ProviderKind, server_uri: &str) -> Config {
    let mut config = Config::default();
    config.provider.provider_type = kind;
    config.provider.openai.api_base = Some(server_uri.to_string());
    config.provider.openai.api_key = Some("sk-test".to_string());
    config.provider.anthropic.api_base = Some(server_uri.to_string());
    config.provider.anthropic.api_key = Some("ant-test".to_string());
    config.provider.gemini.api_base = Some(server_uri.to_string());
    config.provider.gemini.api_key = Some("gem-test".to_string());
    config.provider.ollama.host = server_uri.to_string();
    config.engine.timeout_seconds = 5;
    config
}

/// Server-sent event body with one `data:` event per payload
#[allow(dead_code)]
pub fn sse_body(payloads: &[&str]) -> String {
    payloads
        .iter()
        .map(|payload| format!("data: {}\n\n", payload))
        .collect()
}

/// OpenAI-style delta payload
#[allow(dead_code)]
pub fn openai_delta(text: &str) -> String {
    serde_json::json!({ "choices": [{ "index": 0, "delta": { "content": text } }] }).to_string()
}
