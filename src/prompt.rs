//! Prompt assembly
//!
//! Builds the exact text handed to the model runtime from the identity
//! preamble, a bounded window of conversation history, and the new user
//! input, using the Llama 3 chat header convention.

use crate::types::message::{Message, Role};

/// Number of history turns included in a prompt by default.
pub const DEFAULT_HISTORY_WINDOW: usize = 8;

/// Builds model prompts from conversation history.
///
/// Pure and deterministic: the same preamble, history and input always
/// produce the same prompt.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
    history_window: usize,
}

impl PromptBuilder {
    pub fn new(system_prompt: impl Into<String>, history_window: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history_window,
        }
    }

    /// Format a prompt from `history` plus the new `user_input`.
    ///
    /// Only the most recent `history_window` turns are included; older
    /// turns are dropped, not summarized. The returned prompt ends with an
    /// open assistant header so the runtime continues from that point.
    pub fn format(&self, history: &[Message], user_input: &str) -> String {
        let mut prompt = String::new();
        prompt.push_str("<|begin_of_text|>");
        push_turn(&mut prompt, "system", &self.system_prompt);

        let start = history.len().saturating_sub(self.history_window);
        for message in &history[start..] {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => continue,
            };
            push_turn(&mut prompt, role, &message.content);
        }

        push_turn(&mut prompt, "user", user_input);
        prompt.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
        prompt
    }
}

fn push_turn(prompt: &mut String, role: &str, content: &str) {
    prompt.push_str("<|start_header_id|>");
    prompt.push_str(role);
    prompt.push_str("<|end_header_id|>\n\n");
    prompt.push_str(content);
    prompt.push_str("<|eot_id|>\n");
}
