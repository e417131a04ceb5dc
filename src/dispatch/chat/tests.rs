use super::*;
use crate::config::settings::OPENAI_API_KEY;
use crate::config::{OpenAiConfig, RetrievalConfig};
use crate::database::queries::{ChatMessageQueries, LineUserQueries};
use crate::index::storage::IndexStorage;
use crate::index::{SlotEntry, SlotTable, VectorIndex};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DIMENSION: usize = 4;

fn test_config(base_dir: &std::path::Path, api_base: &str) -> Config {
    Config {
        openai: OpenAiConfig {
            api_base: api_base.to_string(),
            embedding_dimension: DIMENSION as u32,
            ..OpenAiConfig::default()
        },
        retrieval: RetrievalConfig::default(),
        base_dir: base_dir.to_path_buf(),
    }
}

async fn setup(api_base: &str) -> (TempDir, Database, ChatHandler) {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let database = Database::new(temp_dir.path().join("test.db"))
        .await
        .expect("can create database");
    let settings = Arc::new(
        Settings::load(database.pool().clone())
            .await
            .expect("can load settings"),
    );

    let handler = ChatHandler::new(
        database.clone(),
        test_config(temp_dir.path(), api_base),
        settings,
    );

    (temp_dir, database, handler)
}

fn text_event(text: &str) -> Event {
    Event::TextMessage {
        user_id: "U1234".to_string(),
        reply_token: "token-1".to_string(),
        text: text.to_string(),
    }
}

#[tokio::test]
async fn text_message_persists_history_and_degrades_to_fallback() {
    // An unroutable API base makes generation fail regardless of whether a
    // key is present; the turn must still answer.
    let (_temp_dir, database, handler) = setup("http://127.0.0.1:9").await;

    let reply = handler
        .handle(&text_event("Hello!"))
        .await
        .expect("turn succeeds")
        .expect("reply produced");

    assert_eq!(reply.reply_token, "token-1");
    assert_eq!(reply.text, FALLBACK_REPLY);

    let user = LineUserQueries::get_by_line_id(database.pool(), "U1234")
        .await
        .expect("can get user")
        .expect("user was created");
    assert!(user.active_style.is_none());

    let messages = ChatMessageQueries::recent_for_user(database.pool(), "U1234", 10)
        .await
        .expect("can list messages");
    assert_eq!(messages.len(), 2);

    let inbound = messages
        .iter()
        .find(|message| message.is_user_message)
        .expect("inbound recorded");
    assert_eq!(inbound.message_text, "Hello!");

    let outbound = messages
        .iter()
        .find(|message| !message.is_user_message)
        .expect("outbound recorded");
    assert_eq!(outbound.message_text, FALLBACK_REPLY);
}

#[tokio::test]
async fn style_command_sets_user_style() {
    let (_temp_dir, database, handler) = setup("http://127.0.0.1:9").await;

    let reply = handler
        .handle(&text_event("/style cheerful"))
        .await
        .expect("turn succeeds")
        .expect("reply produced");

    assert_eq!(reply.text, "Style set to: cheerful");

    let user = LineUserQueries::get_by_line_id(database.pool(), "U1234")
        .await
        .expect("can get user")
        .expect("user exists");
    assert_eq!(user.active_style.as_deref(), Some("cheerful"));

    let messages = ChatMessageQueries::recent_for_user(database.pool(), "U1234", 10)
        .await
        .expect("can list messages");
    let outbound = messages
        .iter()
        .find(|message| !message.is_user_message)
        .expect("outbound recorded");
    assert_eq!(outbound.bot_style.as_deref(), Some("cheerful"));
}

#[tokio::test]
async fn style_command_without_name_explains_usage() {
    let (_temp_dir, _database, handler) = setup("http://127.0.0.1:9").await;

    let reply = handler
        .handle(&text_event("/style "))
        .await
        .expect("turn succeeds")
        .expect("reply produced");

    assert_eq!(reply.text, STYLE_USAGE);
}

#[tokio::test]
async fn search_command_reports_unavailable_when_disabled() {
    if std::env::var(crate::config::settings::WEB_SEARCH_ENABLED).is_ok() {
        return;
    }

    let (_temp_dir, _database, handler) = setup("http://127.0.0.1:9").await;

    let reply = handler
        .handle(&text_event("/search Taipei weather"))
        .await
        .expect("turn succeeds")
        .expect("reply produced");

    assert_eq!(reply.text, SEARCH_UNAVAILABLE);
}

#[tokio::test]
async fn search_command_without_query_explains_usage() {
    let (_temp_dir, _database, handler) = setup("http://127.0.0.1:9").await;

    let reply = handler
        .handle(&text_event("/search "))
        .await
        .expect("turn succeeds")
        .expect("reply produced");

    assert_eq!(reply.text, SEARCH_USAGE);
}

#[tokio::test]
async fn follow_events_produce_no_reply() {
    let (_temp_dir, _database, handler) = setup("http://127.0.0.1:9").await;

    let reply = handler
        .handle(&Event::Follow {
            user_id: "U1234".to_string(),
        })
        .await
        .expect("handle succeeds");

    assert!(reply.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn text_message_uses_retrieved_context() {
    let mock_server = MockServer::start().await;
    let (temp_dir, _database, handler) = setup(&mock_server.uri()).await;

    handler
        .settings
        .set(OPENAI_API_KEY, "sk-test")
        .await
        .expect("can set key");

    // One persisted document for the retriever to find.
    let storage = IndexStorage::new(temp_dir.path().join("index"), DIMENSION);
    let mut index = VectorIndex::new(DIMENSION);
    let mut table = SlotTable::new();
    let slot = index
        .add(&[0.1, 0.1, 0.1, 0.1])
        .expect("can add vector");
    table.insert(
        slot,
        SlotEntry::new(1, "Opening hours", "Open 9-5 on weekdays.", 500),
    );
    storage.persist(&index, &table).expect("can persist");

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [ { "embedding": [0.1, 0.1, 0.1, 0.1] } ]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [ { "message": { "role": "assistant", "content": "We open at 9." } } ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let reply = handler
        .handle(&text_event("When do you open?"))
        .await
        .expect("turn succeeds")
        .expect("reply produced");

    assert_eq!(reply.text, "We open at 9.");

    // The chat request must carry the retrieved context as a system
    // segment ahead of the user message.
    let requests = mock_server.received_requests().await.expect("requests recorded");
    let chat_request = requests
        .iter()
        .find(|request| request.url.path() == "/v1/chat/completions")
        .expect("chat request sent");
    let body: serde_json::Value =
        serde_json::from_slice(&chat_request.body).expect("request body is JSON");

    let messages = body["messages"].as_array().expect("messages array");
    assert_eq!(messages.len(), 3);
    let context = messages[1]["content"].as_str().expect("context present");
    assert!(context.contains("Knowledge base information"));
    assert!(context.contains("Opening hours"));
    assert!(context.contains("Open 9-5 on weekdays."));
}
