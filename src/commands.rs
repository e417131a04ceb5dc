use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, Settings};
use crate::database::Database;
use crate::database::models::NewDocument;
use crate::database::queries::SettingQueries;
use crate::dispatch::{ChatHandler, Dispatcher, Event, EventKind};
use crate::embeddings::EmbeddingClient;
use crate::index::builder::IndexBuilder;
use crate::index::storage::IndexStorage;
use crate::retrieval::Retriever;

async fn open(base_dir: &Path) -> Result<(Config, Database, Arc<Settings>)> {
    let config = Config::load(base_dir)?;
    let database = Database::new(config.database_path())
        .await
        .context("Failed to initialize database")?;
    let settings = Arc::new(Settings::load(database.pool().clone()).await?);

    Ok((config, database, settings))
}

/// Add a document to the knowledge base and rebuild the index.
#[inline]
pub async fn add_document(
    base_dir: &Path,
    title: String,
    content: Option<String>,
    file: Option<PathBuf>,
) -> Result<()> {
    let content = match (content, file) {
        (Some(content), _) => content,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, None) => anyhow::bail!("Provide document content with --content or --file"),
    };

    let (config, database, settings) = open(base_dir).await?;

    let document = database
        .create_document(NewDocument {
            title,
            content,
            filename: None,
        })
        .await?;

    println!(
        "Added document {} ({})",
        style(&document.title).bold(),
        document.id
    );

    rebuild(&config, &database, &settings).await
}

#[inline]
pub async fn list_documents(base_dir: &Path) -> Result<()> {
    let (_config, database, _settings) = open(base_dir).await?;

    let documents = database.list_documents().await?;
    if documents.is_empty() {
        println!("The knowledge base is empty.");
        println!("Use 'ragline add <title> --content <text>' to add a document.");
        return Ok(());
    }

    println!("Knowledge base ({} documents):", documents.len());
    println!();

    for document in &documents {
        let marker = if document.is_active { "active" } else { "inactive" };
        println!(
            "{} (ID: {}, {})",
            style(&document.title).bold(),
            document.id,
            marker
        );
        println!(
            "   Uploaded: {}",
            document.uploaded_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!("   Length: {} characters", document.content.chars().count());
    }

    Ok(())
}

/// Delete a document and rebuild the index without it.
#[inline]
pub async fn delete_document(base_dir: &Path, id: i64) -> Result<()> {
    let (config, database, settings) = open(base_dir).await?;

    if !database.delete_document(id).await? {
        println!("Document {} not found.", id);
        return Ok(());
    }

    println!("Deleted document {}.", id);
    rebuild(&config, &database, &settings).await
}

/// Rebuild the vector index from the active documents.
#[inline]
pub async fn rebuild_index(base_dir: &Path) -> Result<()> {
    let (config, database, settings) = open(base_dir).await?;
    rebuild(&config, &database, &settings).await
}

async fn rebuild(config: &Config, database: &Database, settings: &Settings) -> Result<()> {
    let client = EmbeddingClient::new(config, settings)
        .context("Cannot rebuild index: embedding client unavailable")?;
    let storage = IndexStorage::from_config(config);
    let builder = IndexBuilder::new(database.clone(), client, storage, config);

    info!("Starting index rebuild");
    let report = builder.rebuild().await?;

    println!(
        "Indexed {}/{} documents{}",
        style(report.processed).bold(),
        report.total,
        if report.skipped > 0 {
            format!(" ({} skipped)", report.skipped)
        } else {
            String::new()
        }
    );

    Ok(())
}

/// Search the index and print the nearest documents.
#[inline]
pub async fn search(base_dir: &Path, query: String, top_k: Option<usize>) -> Result<()> {
    let (config, _database, settings) = open(base_dir).await?;

    let top_k = top_k.unwrap_or_else(|| settings.top_k());
    let retriever = Retriever::new(config, settings);

    match retriever.search(&query, top_k) {
        Some(results) => {
            for (position, result) in results.iter().enumerate() {
                println!(
                    "{}. {} (document {}, distance {:.4})",
                    position + 1,
                    style(&result.title).bold(),
                    result.document_id,
                    result.distance
                );
                println!("   {}", result.content_preview);
            }
        }
        None => println!("No results."),
    }

    Ok(())
}

/// Run one chat turn through the event dispatcher, as a webhook delivery
/// would.
#[inline]
pub async fn ask(base_dir: &Path, message: String, user: String) -> Result<()> {
    let (config, database, settings) = open(base_dir).await?;

    let mut dispatcher = Dispatcher::new();
    dispatcher.register(
        EventKind::TextMessage,
        Box::new(ChatHandler::new(database, config, settings)),
    );

    let event = Event::TextMessage {
        user_id: user,
        reply_token: "cli".to_string(),
        text: message,
    };

    match dispatcher.dispatch(&event).await? {
        Some(reply) => println!("{}", reply.text),
        None => println!("(no reply)"),
    }

    Ok(())
}

/// Show the current state of the document store, index and feature flags.
#[inline]
pub async fn show_status(base_dir: &Path) -> Result<()> {
    let (config, database, settings) = open(base_dir).await?;

    let documents = database.list_documents().await?;
    let active = documents.iter().filter(|doc| doc.is_active).count();

    let storage = IndexStorage::from_config(&config);
    let (index, _table) = storage.load();

    println!("Documents: {} total, {} active", documents.len(), active);
    println!("Index entries: {}", index.len());
    println!(
        "RAG: {}",
        if settings.rag_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "Web search: {}",
        if settings.web_search_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("Active style: {}", settings.active_style());
    if settings.openai_api_key().is_some() {
        println!("OpenAI API key: configured");
    } else {
        println!("OpenAI API key: {}", style("not configured").red());
    }

    Ok(())
}

#[inline]
pub async fn show_settings(base_dir: &Path) -> Result<()> {
    let (_config, database, _settings) = open(base_dir).await?;

    let rows = SettingQueries::list_all(database.pool()).await?;
    if rows.is_empty() {
        println!("No settings stored.");
        return Ok(());
    }

    for row in rows {
        println!("{} = {}", row.key, row.value.as_deref().unwrap_or(""));
    }

    Ok(())
}

#[inline]
pub async fn set_setting(base_dir: &Path, key: String, value: String) -> Result<()> {
    let (_config, _database, settings) = open(base_dir).await?;

    settings.set(&key, &value).await?;
    println!("Set {}.", key);

    Ok(())
}
