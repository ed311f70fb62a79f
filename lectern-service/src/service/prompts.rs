//! Prompt templates for the generative and vision models.

/// Instruction sent to the vision model with each extracted image
pub const IMAGE_DESCRIPTION_PROMPT: &str = "Provide a concise description of the image content.";

/// Build the answering prompt from the question, retrieved context and answer format
pub fn build_answer_prompt(question: &str, context: &str, answer_format: &str) -> String {
    format!("Question: {question}\nContext: {context}\nAnswer: {answer_format}\n")
}
