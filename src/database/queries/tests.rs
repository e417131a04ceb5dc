use super::*;
use crate::database::Database;
use tempfile::TempDir;

async fn create_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let database = Database::new(temp_dir.path().join("test.db"))
        .await
        .expect("Failed to create test database");

    (temp_dir, database)
}

#[tokio::test]
async fn document_crud_operations() {
    let (_temp_dir, database) = create_test_db().await;
    let pool = database.pool();

    let created = DocumentQueries::create(
        pool,
        NewDocument {
            title: "Shipping FAQ".to_string(),
            content: "We ship worldwide within 5 business days.".to_string(),
            filename: Some("shipping.txt".to_string()),
        },
    )
    .await
    .expect("Failed to create document");

    assert_eq!(created.title, "Shipping FAQ");
    assert!(created.is_active);

    let retrieved = DocumentQueries::get_by_id(pool, created.id)
        .await
        .expect("Failed to get document")
        .expect("Document should exist");

    assert_eq!(retrieved.id, created.id);
    assert_eq!(retrieved.filename.as_deref(), Some("shipping.txt"));

    let deleted = DocumentQueries::delete(pool, created.id)
        .await
        .expect("Failed to delete document");
    assert!(deleted);

    let not_found = DocumentQueries::get_by_id(pool, created.id)
        .await
        .expect("Query should succeed");
    assert!(not_found.is_none());
}

#[tokio::test]
async fn list_active_excludes_inactive_documents() {
    let (_temp_dir, database) = create_test_db().await;
    let pool = database.pool();

    for position in 0..3 {
        DocumentQueries::create(
            pool,
            NewDocument {
                title: format!("Document {}", position),
                content: "content".to_string(),
                filename: None,
            },
        )
        .await
        .expect("Failed to create document");
    }

    DocumentQueries::set_active(pool, 2, false)
        .await
        .expect("Failed to deactivate document");

    let active = DocumentQueries::list_active(pool)
        .await
        .expect("Failed to list active documents");

    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|document| document.id != 2));

    let count = DocumentQueries::count_active(pool)
        .await
        .expect("Failed to count");
    assert_eq!(count, 2);
}

#[tokio::test]
async fn list_active_is_ordered_by_id() {
    let (_temp_dir, database) = create_test_db().await;
    let pool = database.pool();

    for position in 0..5 {
        DocumentQueries::create(
            pool,
            NewDocument {
                title: format!("Document {}", position),
                content: "content".to_string(),
                filename: None,
            },
        )
        .await
        .expect("Failed to create document");
    }

    let active = DocumentQueries::list_active(pool)
        .await
        .expect("Failed to list active documents");

    let ids: Vec<i64> = active.iter().map(|document| document.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn line_user_get_or_create_is_idempotent() {
    let (_temp_dir, database) = create_test_db().await;
    let pool = database.pool();

    let first = LineUserQueries::get_or_create(pool, "U1234")
        .await
        .expect("Failed to create user");
    let second = LineUserQueries::get_or_create(pool, "U1234")
        .await
        .expect("Failed to get user");

    assert_eq!(first.id, second.id);
    assert_eq!(second.line_user_id, "U1234");
    assert!(second.active_style.is_none());
}

#[tokio::test]
async fn line_user_style_can_be_set() {
    let (_temp_dir, database) = create_test_db().await;
    let pool = database.pool();

    LineUserQueries::get_or_create(pool, "U1234")
        .await
        .expect("Failed to create user");

    let updated = LineUserQueries::set_style(pool, "U1234", "cheerful")
        .await
        .expect("Failed to set style");
    assert!(updated);

    let user = LineUserQueries::get_by_line_id(pool, "U1234")
        .await
        .expect("Failed to get user")
        .expect("User should exist");
    assert_eq!(user.active_style.as_deref(), Some("cheerful"));
}

#[tokio::test]
async fn chat_messages_are_recorded_and_listed() {
    let (_temp_dir, database) = create_test_db().await;
    let pool = database.pool();

    ChatMessageQueries::create(
        pool,
        NewChatMessage {
            line_user_id: "U1234".to_string(),
            is_user_message: true,
            message_text: "hello".to_string(),
            bot_style: None,
        },
    )
    .await
    .expect("Failed to create message");

    ChatMessageQueries::create(
        pool,
        NewChatMessage {
            line_user_id: "U1234".to_string(),
            is_user_message: false,
            message_text: "hi there".to_string(),
            bot_style: Some("default".to_string()),
        },
    )
    .await
    .expect("Failed to create message");

    let messages = ChatMessageQueries::recent_for_user(pool, "U1234", 10)
        .await
        .expect("Failed to list messages");

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].message_text, "hi there");
    assert!(!messages[0].is_user_message);
}

#[tokio::test]
async fn default_bot_style_is_seeded() {
    let (_temp_dir, database) = create_test_db().await;
    let pool = database.pool();

    let default = BotStyleQueries::get_default(pool)
        .await
        .expect("Failed to get default style")
        .expect("A default style should be seeded");

    assert_eq!(default.name, "default");
    assert!(default.is_default);
    assert!(!default.prompt.is_empty());
}

#[tokio::test]
async fn bot_style_lookup_by_name() {
    let (_temp_dir, database) = create_test_db().await;
    let pool = database.pool();

    BotStyleQueries::create(
        pool,
        NewBotStyle {
            name: "formal".to_string(),
            prompt: "You are a precise, formal assistant.".to_string(),
            description: None,
            is_default: false,
        },
    )
    .await
    .expect("Failed to create style");

    let style = BotStyleQueries::get_by_name(pool, "formal")
        .await
        .expect("Failed to get style")
        .expect("Style should exist");
    assert_eq!(style.prompt, "You are a precise, formal assistant.");

    let missing = BotStyleQueries::get_by_name(pool, "nonexistent")
        .await
        .expect("Query should succeed");
    assert!(missing.is_none());
}

#[tokio::test]
async fn settings_upsert_overwrites_existing_value() {
    let (_temp_dir, database) = create_test_db().await;
    let pool = database.pool();

    SettingQueries::upsert(pool, "RAG_ENABLED", "true")
        .await
        .expect("Failed to upsert setting");
    SettingQueries::upsert(pool, "RAG_ENABLED", "false")
        .await
        .expect("Failed to upsert setting");

    let setting = SettingQueries::get(pool, "RAG_ENABLED")
        .await
        .expect("Failed to get setting")
        .expect("Setting should exist");

    assert_eq!(setting.value.as_deref(), Some("false"));

    let all = SettingQueries::list_all(pool)
        .await
        .expect("Failed to list settings");
    assert_eq!(all.len(), 1);
}
