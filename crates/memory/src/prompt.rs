//! Prompt rendering.

use crate::buffer::ConversationBuffer;

/// Instruction wrapper placed around the rendered history.
///
/// Rendering is a pure function of the buffer contents and the persona.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    persona: String,
}

impl PromptTemplate {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
        }
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    /// Render turns oldest-to-newest as `"<Role>: <content>"` lines inside
    /// the `[INST] ... [/INST]` preamble.
    pub fn render(&self, buffer: &ConversationBuffer) -> String {
        let history = buffer
            .iter()
            .map(|turn| format!("{}: {}", turn.role().label(), turn.content()))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "[INST] You are {persona}, a friendly AI assistant. Always respond in complete sentences.\n\
             Previous conversation:\n\
             {history}\n\
             Current response should be natural and complete.\n\
             [/INST]",
            persona = self.persona,
        )
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new("Reka")
    }
}
