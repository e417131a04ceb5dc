use super::*;
use crate::config::settings::{ACTIVE_BOT_STYLE, OPENAI_API_KEY};
use crate::config::{OpenAiConfig, RetrievalConfig, Settings};
use crate::database::Database;
use crate::database::models::NewBotStyle;
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(api_base: &str) -> Config {
    Config {
        openai: OpenAiConfig {
            api_base: api_base.to_string(),
            ..OpenAiConfig::default()
        },
        retrieval: RetrievalConfig::default(),
        base_dir: PathBuf::new(),
    }
}

async fn setup() -> (TempDir, Database, Settings) {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let database = Database::new(temp_dir.path().join("test.db"))
        .await
        .expect("can create database");
    let settings = Settings::load(database.pool().clone())
        .await
        .expect("can load settings");
    settings
        .set(OPENAI_API_KEY, "sk-test")
        .await
        .expect("can set key");

    (temp_dir, database, settings)
}

fn chat_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [ { "message": { "role": "assistant", "content": content } } ]
    })
}

#[tokio::test]
async fn client_requires_api_key() {
    if std::env::var(OPENAI_API_KEY).is_ok() {
        return;
    }

    let temp_dir = TempDir::new().expect("can create temp dir");
    let database = Database::new(temp_dir.path().join("test.db"))
        .await
        .expect("can create database");
    let settings = Settings::load(database.pool().clone())
        .await
        .expect("can load settings");

    assert!(ChatClient::new(&test_config("https://api.openai.com"), &settings).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn generate_returns_completion_content() {
    let mock_server = MockServer::start().await;
    let (_temp_dir, _database, settings) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("Hello there!")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client =
        ChatClient::new(&test_config(&mock_server.uri()), &settings).expect("can create client");

    let reply = tokio::task::spawn_blocking(move || {
        client.generate("How are you?", "Be friendly.", None)
    })
    .await
    .expect("task completes")
    .expect("generation succeeds");

    assert_eq!(reply, "Hello there!");

    let requests = mock_server.received_requests().await.expect("requests recorded");
    let body: serde_json::Value =
        serde_json::from_slice(&requests[0].body).expect("request body is JSON");

    assert_eq!(body["model"], "gpt-4o");
    let messages = body["messages"].as_array().expect("messages array");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "system");
    let system_content = messages[0]["content"].as_str().expect("system content");
    assert!(system_content.starts_with("Be friendly."));
    assert!(system_content.contains("Today's date is"));
    assert_eq!(messages[1]["role"], "user");
    assert_eq!(messages[1]["content"], "How are you?");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn generate_injects_context_as_system_segment() {
    let mock_server = MockServer::start().await;
    let (_temp_dir, _database, settings) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("Answer")))
        .mount(&mock_server)
        .await;

    let client =
        ChatClient::new(&test_config(&mock_server.uri()), &settings).expect("can create client");

    tokio::task::spawn_blocking(move || {
        client.generate(
            "What are your opening hours?",
            "Be helpful.",
            Some("Knowledge base information:\n\n1. Hours:\n9-5 weekdays\n\n"),
        )
    })
    .await
    .expect("task completes")
    .expect("generation succeeds");

    let requests = mock_server.received_requests().await.expect("requests recorded");
    let body: serde_json::Value =
        serde_json::from_slice(&requests[0].body).expect("request body is JSON");

    let messages = body["messages"].as_array().expect("messages array");
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1]["role"], "system");
    let context_content = messages[1]["content"].as_str().expect("context content");
    assert!(context_content.contains("Knowledge base information"));
    assert_eq!(messages[2]["role"], "user");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn generate_surfaces_api_errors() {
    let mock_server = MockServer::start().await;
    let (_temp_dir, _database, settings) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let client =
        ChatClient::new(&test_config(&mock_server.uri()), &settings).expect("can create client");

    let result =
        tokio::task::spawn_blocking(move || client.generate("hello", "Be friendly.", None))
            .await
            .expect("task completes");

    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn generate_rejects_empty_choices() {
    let mock_server = MockServer::start().await;
    let (_temp_dir, _database, settings) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
        )
        .mount(&mock_server)
        .await;

    let client =
        ChatClient::new(&test_config(&mock_server.uri()), &settings).expect("can create client");

    let result =
        tokio::task::spawn_blocking(move || client.generate("hello", "Be friendly.", None))
            .await
            .expect("task completes");

    assert!(result.is_err());
}

#[tokio::test]
async fn style_prompt_resolution_order() {
    let (_temp_dir, database, settings) = setup().await;
    let pool = database.pool();

    BotStyleQueries::create(
        pool,
        NewBotStyle {
            name: "cheerful".to_string(),
            prompt: "You are upbeat and cheerful.".to_string(),
            description: None,
            is_default: false,
        },
    )
    .await
    .expect("can create style");

    // Per-user override wins.
    let prompt = resolve_style_prompt(pool, &settings, Some("cheerful"))
        .await
        .expect("can resolve style");
    assert_eq!(prompt, "You are upbeat and cheerful.");

    // Without an override the configured active style applies.
    settings
        .set(ACTIVE_BOT_STYLE, "cheerful")
        .await
        .expect("can set style");
    let prompt = resolve_style_prompt(pool, &settings, None)
        .await
        .expect("can resolve style");
    assert_eq!(prompt, "You are upbeat and cheerful.");

    // An unknown name falls back to the seeded default row.
    let prompt = resolve_style_prompt(pool, &settings, Some("nonexistent"))
        .await
        .expect("can resolve style");
    let default = BotStyleQueries::get_default(pool)
        .await
        .expect("can get default")
        .expect("default exists");
    assert_eq!(prompt, default.prompt);
}
