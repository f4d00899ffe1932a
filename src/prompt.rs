use crate::constants::FORMAT_GUIDELINES;
use crate::types::{ChatMessage, Role};

pub fn enhance_prompt(message: &str) -> String {
    format!(
        "{}\n\nPlease format your response professionally using:\n{}",
        message, FORMAT_GUIDELINES
    )
}

pub fn enhance_prompt_with_file(message: &str, file_content: &str, file_name: &str) -> String {
    format!(
        "I'm sharing a file with you: {}\n\nFile content:\n{}\n\nUser question: {}\n\n\
         Please analyze this file and respond to my question. Format your response professionally using:\n{}",
        file_name, file_content, message, FORMAT_GUIDELINES
    )
}

/// The message list sent to the backend. `history` ends with the user message
/// that was just stored; it is replaced by its enhanced form.
pub fn build_context(mut history: Vec<ChatMessage>, enhanced: String) -> Vec<ChatMessage> {
    if history.last().is_some_and(|m| m.role == Role::User) {
        history.pop();
    }
    history.push(ChatMessage::new(Role::User, enhanced));
    history
}
