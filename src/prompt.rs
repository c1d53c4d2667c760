//! # Persona templates and prompt assembly
//!
//! A persona is a small YAML document holding the system preamble and the
//! speaker labels used when rendering conversation turns. Personas are
//! stored per-user under the application's configuration directory, inside
//! a `personas/` subfolder:
//!
//! ```text
//! <config_dir>/personas/<name>.yaml
//! ```
//!
//! ## Minimal YAML example
//!
//! ```yaml
//! system_prompt: "You are Sibyl, a careful financial assistant."
//! user_label: "User"
//! assistant_label: "Assistant"
//! ```
//!
//! [`assemble_prompt`] is a pure function: persona preamble, then
//! speaker-labeled history, then source-tagged retrieved snippets, then the
//! new message followed by a trailing assistant label the model is expected
//! to continue after. Identical inputs always yield an identical string;
//! determinism here is what makes the pipeline testable even though the
//! downstream generation step is stochastic.

use std::fs;

use serde::{Deserialize, Serialize};

use crate::error::SibylError;
use crate::history::ConversationTurn;
use crate::memory::DocumentRecord;

fn default_user_label() -> String {
    "User".to_string()
}

fn default_assistant_label() -> String {
    "Assistant".to_string()
}

/// A reusable persona: the fixed preamble plus speaker labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaTemplate {
    /// Global instruction used as the prompt's opening preamble.
    pub system_prompt: String,

    /// Label for the human speaker in rendered turns.
    #[serde(default = "default_user_label")]
    pub user_label: String,

    /// Label for the model speaker, also the trailing response sentinel.
    #[serde(default = "default_assistant_label")]
    pub assistant_label: String,
}

impl Default for PersonaTemplate {
    fn default() -> Self {
        Self {
            system_prompt: "You are Sibyl, a careful financial assistant. Answer using the \
                            conversation so far and the provided context, and say so plainly \
                            when the context does not cover the question."
                .to_string(),
            user_label: default_user_label(),
            assistant_label: default_assistant_label(),
        }
    }
}

/// Load a persona by name from the user's config directory.
///
/// Resolves `<config_dir>/personas/<name>.yaml`.
///
/// # Errors
/// Returns an error if the config directory cannot be determined, the file
/// cannot be read, or the YAML does not deserialize.
pub fn load_persona(name: &str) -> Result<PersonaTemplate, SibylError> {
    let path = crate::config_dir()?
        .join("personas")
        .join(format!("{name}.yaml"));

    tracing::info!("loading persona: {}", path.display());

    let content = fs::read_to_string(&path)?;
    let persona: PersonaTemplate = serde_yaml::from_str(&content)
        .map_err(|e| SibylError::Config(format!("invalid persona {}: {e}", path.display())))?;
    Ok(persona)
}

/// Combine persona, history, retrieved context, and the new message into the
/// exact text handed to the inference engine.
pub fn assemble_prompt(
    persona: &PersonaTemplate,
    history: &[ConversationTurn],
    context: &[DocumentRecord],
    message: &str,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&persona.system_prompt);
    prompt.push_str("\n\n");

    if !history.is_empty() {
        prompt.push_str("Previous conversation:\n");
        for turn in history {
            prompt.push_str(&format!(
                "{}: {}\n{}: {}\n",
                persona.user_label, turn.question, persona.assistant_label, turn.answer
            ));
        }
        prompt.push('\n');
    }

    if !context.is_empty() {
        prompt.push_str("Relevant context:\n");
        for record in context {
            prompt.push_str(&format!("[{}] {}\n", record.source, record.content));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "{}: {}\n{}:",
        persona.user_label, message, persona.assistant_label
    ));

    prompt
}
