use super::*;
use crate::database::models::NewDocument;
use tempfile::TempDir;

#[tokio::test]
async fn database_creates_file_and_runs_migrations() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("nested").join("relay.db");

    let database = Database::new(&db_path)
        .await
        .expect("Failed to create database");

    assert!(db_path.exists());

    // Migrations are idempotent on reconnect.
    drop(database);
    Database::new(&db_path)
        .await
        .expect("Failed to reopen database");
}

#[tokio::test]
async fn document_store_wrappers_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let database = Database::new(temp_dir.path().join("relay.db"))
        .await
        .expect("Failed to create database");

    let created = database
        .create_document(NewDocument {
            title: "Refund policy".to_string(),
            content: "Refunds within 30 days.".to_string(),
            filename: None,
        })
        .await
        .expect("Failed to create document");

    let fetched = database
        .get_document(created.id)
        .await
        .expect("Failed to get document")
        .expect("Document should exist");
    assert_eq!(fetched.title, "Refund policy");

    let active = database
        .list_active_documents()
        .await
        .expect("Failed to list active documents");
    assert_eq!(active.len(), 1);

    let deleted = database
        .delete_document(created.id)
        .await
        .expect("Failed to delete document");
    assert!(deleted);

    let count = database
        .count_active_documents()
        .await
        .expect("Failed to count documents");
    assert_eq!(count, 0);
}
