//! Tests for loading engine configuration from files
//!
//! These tests verify that:
//! - A YAML file drives the global rule, locale and resource overrides
//! - Message bundles referenced by the configuration reach problem payloads
//! - Broken files are reported as configuration errors

use exposed::prelude::*;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Note {
    #[serde(default)]
    id: i64,
    title: String,
}

impl Record for Note {
    type Id = i64;
}

fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path.display().to_string()
}

#[tokio::test]
async fn test_config_file_drives_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let messages = write_file(
        &dir,
        "messages.yaml",
        "en:\n  problem.access_forbidden.title: \"Nope\"\n",
    );
    let config = write_file(
        &dir,
        "engine.yaml",
        &format!(
            r#"
default_rule: authenticated
default_locale: en
messages: {messages}
resources:
  Note:
    name: memo
    rules:
      list: permit_all
"#
        ),
    );

    let host = ServerBuilder::new()
        .with_config_file(&config)
        .unwrap()
        .register(Component::record::<Note>().exposed())
        .build_host()
        .unwrap();
    assert_eq!(host.resource_names(), vec!["memo"]);

    let dispatcher = Arc::clone(&host.dispatcher);
    let listed = dispatcher
        .dispatch(DispatchRequest::new("memo", Capability::List))
        .await;
    assert_eq!(listed.outcome, Outcome::Succeeded);

    // Falls back to the global `authenticated` rule
    let created = dispatcher
        .dispatch(DispatchRequest::new("memo", Capability::Create).with_body(json!({"title": "x"})))
        .await;
    assert_eq!(created.outcome, Outcome::Denied);
    assert_eq!(created.problem().unwrap().title, "Nope");
}

#[test]
fn test_unparseable_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "engine.yaml", "default_rule: [unclosed");
    let err = EngineConfig::from_yaml_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_missing_message_bundle() {
    let config = EngineConfig {
        messages: Some("/no/such/messages.yaml".to_string()),
        ..Default::default()
    };
    let result = ServerBuilder::new()
        .with_config(config)
        .register(Component::record::<Note>().exposed())
        .build_host();
    assert!(matches!(result, Err(ConfigError::Io { .. })));
}
