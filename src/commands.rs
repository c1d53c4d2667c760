//! This module defines the command-line interface for the application using
//! `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line
//! arguments, and a `Commands` enum that represents the available
//! subcommands and their options. The subcommands mirror the backend's
//! entry points: the chat pipeline's `handle_message` and semantic memory's
//! add/search/delete/list, plus file ingestion and first-run setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Start an interactive chat session.
    #[clap(name = "chat", alias = "c")]
    Chat {
        /// User id the conversation history is keyed by.
        #[arg(name = "user", short = 'u', default_value = "default")]
        user: String,
    },

    /// Add a document to semantic memory.
    Add {
        /// The document text to embed and store.
        content: String,

        /// Free-form name of the document's origin.
        #[arg(name = "source", short = 's', default_value = "cli")]
        source: String,
    },

    /// Search semantic memory for documents relevant to a query.
    Search {
        /// The query text.
        query: String,

        /// Maximum number of documents to return.
        #[arg(name = "top-k", short = 'k', default_value_t = 5)]
        top_k: usize,
    },

    /// Delete a document by id. Later documents are renumbered to keep ids
    /// dense.
    Delete {
        /// The document id to delete.
        id: usize,
    },

    /// List stored documents in id order.
    List {
        /// Number of documents to skip.
        #[arg(long, default_value_t = 0)]
        skip: usize,

        /// Maximum number of documents to print.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Ingest a file into semantic memory. A `.json` array becomes one
    /// document per element; any other file becomes a single document
    /// sourced by its file name.
    Ingest {
        /// Path of the file to ingest.
        path: PathBuf,
    },

    /// Write a default configuration and persona to the config directory.
    Init,
}
