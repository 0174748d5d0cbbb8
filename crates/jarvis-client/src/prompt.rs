//! Project prompt editor model.

use jarvis_core::{PromptMode, PromptUpdate, ValidationError};

/// Draft state of the prompt editor.
///
/// The editor keeps one buffer per mode so switching modes does not lose text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptEditor {
    mode: PromptMode,
    json_text: String,
    spec_text: String,
}

impl PromptEditor {
    /// Seed the editor from a project's current prompt.
    ///
    /// A prompt that parses as JSON is pretty-printed; anything else is wrapped
    /// as `{"role": <prompt>}`.
    #[must_use]
    pub fn seeded(current_prompt: &str) -> Self {
        let source = if current_prompt.is_empty() { "{}" } else { current_prompt };
        let json_text = serde_json::from_str::<serde_json::Value>(source)
            .ok()
            .and_then(|value| serde_json::to_string_pretty(&value).ok())
            .unwrap_or_else(|| {
                let wrapped = serde_json::json!({ "role": current_prompt });
                serde_json::to_string_pretty(&wrapped).unwrap_or_default()
            });

        Self {
            mode: PromptMode::JsonMerge,
            json_text,
            spec_text: String::new(),
        }
    }

    /// Active mode.
    #[must_use]
    pub const fn mode(&self) -> PromptMode {
        self.mode
    }

    /// Switch between JSON merge and text append.
    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            PromptMode::JsonMerge => PromptMode::TextAppend,
            PromptMode::TextAppend => PromptMode::JsonMerge,
        };
    }

    /// Buffer of the active mode.
    #[must_use]
    pub fn text(&self) -> &str {
        match self.mode {
            PromptMode::JsonMerge => &self.json_text,
            PromptMode::TextAppend => &self.spec_text,
        }
    }

    /// Mutable buffer of the active mode.
    pub fn text_mut(&mut self) -> &mut String {
        match self.mode {
            PromptMode::JsonMerge => &mut self.json_text,
            PromptMode::TextAppend => &mut self.spec_text,
        }
    }

    /// Validate the active buffer and build the update payload.
    ///
    /// # Errors
    ///
    /// `InvalidJson` if the JSON buffer does not parse, `EmptySpecification` if
    /// the text buffer is blank.
    pub fn build(&self) -> Result<PromptUpdate, ValidationError> {
        match self.mode {
            PromptMode::JsonMerge => {
                serde_json::from_str::<serde_json::Value>(&self.json_text)
                    .map_err(|e| ValidationError::InvalidJson(e.to_string()))?;
                Ok(PromptUpdate {
                    mode: PromptMode::JsonMerge,
                    content: self.json_text.clone(),
                })
            }
            PromptMode::TextAppend => {
                if self.spec_text.trim().is_empty() {
                    return Err(ValidationError::EmptySpecification);
                }
                Ok(PromptUpdate {
                    mode: PromptMode::TextAppend,
                    content: self.spec_text.clone(),
                })
            }
        }
    }
}
