//! # Sibyl (library root)
//!
//! Sibyl is a retrieval-augmented chat backend. User messages are answered
//! by a language model conditioned on a bounded window of recent turns and
//! on semantically relevant snippets pulled from a persisted document store.
//!
//! The crate is organized leaf-first:
//! - [`index`] — exact nearest-neighbor structure over fixed-dimension
//!   vectors.
//! - [`memory`] — semantic memory composing the index with a positionally
//!   aligned metadata store, persisted across restarts.
//! - [`history`] — bounded per-user conversational cache.
//! - [`prompt`] — persona templates and deterministic prompt assembly.
//! - [`pipeline`] — the response pipeline tying retrieval, generation, and
//!   history together.
//! - [`embedding`] / [`inference`] — trait seams for the two external
//!   collaborators, with OpenAI-compatible implementations.
//! - [`config`], [`commands`], [`error`] — configuration, CLI, and the
//!   shared error taxonomy.
//!
//! The exposed surface for a surrounding application is semantic memory's
//! add/search/delete (via [`pipeline::ChatPipeline`] or
//! [`memory::SemanticMemory`] directly) and
//! [`pipeline::ChatPipeline::handle_message`].

use std::path::PathBuf;

use directories::ProjectDirs;

pub mod commands;
pub mod config;
pub mod embedding;
pub mod error;
pub mod history;
pub mod index;
pub mod inference;
pub mod memory;
pub mod pipeline;
pub mod prompt;

use crate::error::SibylError;

fn project_dirs() -> Result<ProjectDirs, SibylError> {
    ProjectDirs::from("com", "sibyl", "sibyl")
        .ok_or_else(|| SibylError::Config("unable to determine project directories".to_string()))
}

/// Return the per-platform configuration directory used by Sibyl
/// (e.g. `~/.config/sibyl` on Linux via XDG).
///
/// The directory is **not** created by this function; callers that need it
/// should create it with `fs::create_dir_all`.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be
/// determined, which is rare but possible in heavily sandboxed
/// environments.
pub fn config_dir() -> Result<PathBuf, SibylError> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

/// Return the per-platform data directory where the index and metadata
/// artifacts live, unless the config overrides it.
///
/// # Errors
/// Same failure mode as [`config_dir`].
pub fn data_dir() -> Result<PathBuf, SibylError> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}
