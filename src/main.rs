use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ragline::{RelayError, Result};
use ragline::commands::{
    add_document, ask, delete_document, list_documents, rebuild_index, search, set_setting,
    show_settings, show_status,
};
use ragline::config::default_base_dir;

#[derive(Parser)]
#[command(name = "ragline")]
#[command(about = "LINE chat-bot backend with retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// Base directory for the database, index and config file
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a document to the knowledge base and rebuild the index
    Add {
        /// Document title
        title: String,
        /// Document content as a literal string
        #[arg(long)]
        content: Option<String>,
        /// Read document content from a file
        #[arg(long, conflicts_with = "content")]
        file: Option<PathBuf>,
    },
    /// List knowledge base documents
    List,
    /// Delete a document and rebuild the index
    Delete {
        /// Document ID to delete
        id: i64,
    },
    /// Rebuild the vector index from the active documents
    Reindex,
    /// Search the index for the nearest documents
    Search {
        /// Query text
        query: String,
        /// Number of results to return
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Run one chat turn through the event dispatcher
    Ask {
        /// Message text
        message: String,
        /// LINE user id to attribute the turn to
        #[arg(long, default_value = "cli-user")]
        user: String,
    },
    /// Show document, index and feature-flag status
    Status,
    /// Show or change runtime settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show stored settings
    Show,
    /// Set a setting
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let base_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_base_dir().map_err(|error| RelayError::Config(error.to_string()))?,
    };

    match cli.command {
        Commands::Add {
            title,
            content,
            file,
        } => {
            add_document(&base_dir, title, content, file).await?;
        }
        Commands::List => {
            list_documents(&base_dir).await?;
        }
        Commands::Delete { id } => {
            delete_document(&base_dir, id).await?;
        }
        Commands::Reindex => {
            rebuild_index(&base_dir).await?;
        }
        Commands::Search { query, top_k } => {
            search(&base_dir, query, top_k).await?;
        }
        Commands::Ask { message, user } => {
            ask(&base_dir, message, user).await?;
        }
        Commands::Status => {
            show_status(&base_dir).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => show_settings(&base_dir).await?,
            ConfigAction::Set { key, value } => set_setting(&base_dir, key, value).await?,
        },
    }

    Ok(())
}
