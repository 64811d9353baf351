//! Prompt templates and generation parameters — one canonical set per
//! operation.
//!
//! Earlier revisions of the app accumulated near-duplicate template and
//! parameter variants; this table is the single surviving policy. Do not
//! add per-call overrides — tune here.

use super::types::PromptReply;
use crate::shortcuts::Operation;
use serde::Serialize;

/// Fixed sampling parameters sent in the request `options` object.
///
/// Replace-style results get a deterministic seed: a paste-back must be
/// reproducible when a test (or a retry) runs the same input twice.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GenerationParams {
    pub temperature: f64,
    pub num_ctx: u32,
    pub num_predict: i32,
    pub top_p: f64,
    pub top_k: u32,
    pub repeat_penalty: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

const DISPLAY_PARAMS: GenerationParams = GenerationParams {
    temperature: 0.7,
    num_ctx: 4096,
    num_predict: 512,
    top_p: 0.9,
    top_k: 40,
    repeat_penalty: 1.1,
    seed: None,
};

const REPLACE_PARAMS: GenerationParams = GenerationParams {
    temperature: 0.3,
    num_ctx: 4096,
    num_predict: 1024,
    top_p: 0.9,
    top_k: 40,
    repeat_penalty: 1.1,
    seed: Some(42),
};

pub fn params_for(op: Operation) -> GenerationParams {
    match op {
        Operation::Explain | Operation::Summarize | Operation::Translate => DISPLAY_PARAMS,
        Operation::Revise | Operation::CustomPrompt => REPLACE_PARAMS,
    }
}

/// Build the full prompt for an operation over the captured text.
///
/// `user_prompt` is only meaningful for CustomPrompt and ignored elsewhere.
pub fn build_prompt(op: Operation, text: &str, user_prompt: Option<&str>) -> String {
    match op {
        Operation::Explain => format!(
            "Explain this text clearly and concisely. Use Markdown formatting (bold, italics, \
             lists, and headers) for structure and clarity. Do NOT use code blocks or backticks \
             in your response.\n\nText: {text}"
        ),
        Operation::Summarize => format!(
            "Provide a short, clear summary. Use Markdown formatting (bold, italics, lists, and \
             headers) for readability. Do NOT use code blocks or backticks in your response.\n\n\
             Text: {text}"
        ),
        Operation::Revise => format!(
            "Revise the following text to improve grammar and clarity. Never use em dashes in \
             your text. Avoid heavily altering the sentence structure. Output ONLY the revised \
             text with no explanations, notes, or meta-commentary. Do not add parenthetical \
             explanations or comments about your changes. Preserve all original line breaks, \
             paragraph spacing, and formatting.\n\nText: {text}"
        ),
        Operation::Translate => format!(
            "Translate the following text into English. If it is already in English, translate \
             it into French. Output ONLY the translated text, preserving the original line \
             breaks and paragraph spacing, with no explanations or notes.\n\nText: {text}"
        ),
        Operation::CustomPrompt => {
            let user_prompt = user_prompt.unwrap_or_default();
            format!(
                "Respond in valid JSON format with exactly two fields: \"type\" and \
                 \"response\".\n\nClassification rules:\n- type: \"question\" → user wants \
                 information, explanation, or understanding about the text\n- type: \
                 \"generate\" → user wants to create, modify, or generate new text\n\nRules:\n\
                 - Output ONLY valid JSON with no extra commentary\n- Do NOT add explanations \
                 or notes outside the JSON\n- The \"response\" field should contain your actual \
                 answer or generated text\n\nUser request: {user_prompt}\nText: {text}\n\n\
                 Example output format:\n\
                 {{\"type\": \"question\", \"response\": \"Your answer here\"}}\nOR\n\
                 {{\"type\": \"generate\", \"response\": \"Generated text here\"}}"
            )
        }
    }
}

/// The request `format` field — only CustomPrompt constrains the output.
pub fn format_for(op: Operation) -> Option<serde_json::Value> {
    match op {
        Operation::CustomPrompt => Some(PromptReply::schema()),
        _ => None,
    }
}
