// Prompt templates for the Interview module.
// Reuses the output-shape fragments from llm_client::prompts.

use crate::llm_client::prompts::{JSON_ARRAY_ONLY, JSON_OBJECT_ONLY};

/// Question generation prompt. Replace: {count}, {position}, {experience}, {description}, {shape_rule}
pub const QUESTIONS_PROMPT_TEMPLATE: &str = r#"Generate {count} interview questions for: {position} with {experience} years experience in {description}.

{shape_rule} Keep answers under 100 words.

Example: [{"question":"Q1 text","answer":"A1 text"},{"question":"Q2 text","answer":"A2 text"}]

JSON array:"#;

/// Answer evaluation prompt. Replace: {question}, {reference_answer}, {user_answer}, {shape_rule}
pub const FEEDBACK_PROMPT_TEMPLATE: &str = r#"You are an expert interview evaluator. Evaluate the following interview answer.

Interview Question: {question}
Expected Answer (Reference): {reference_answer}
Candidate's Answer: {user_answer}

Provide a detailed evaluation in JSON format with exactly these fields:
- "rating": A number from 1 to 10 (where 10 is excellent)
- "feedback": A detailed feedback (3-5 sentences) covering:
  * What the candidate did well
  * Areas for improvement
  * Specific suggestions to enhance the answer

Return this exact format:
{
  "rating": 8,
  "feedback": "Your answer demonstrates good understanding of the concept. However, you could improve by providing more specific examples..."
}

{shape_rule}"#;

pub fn questions_prompt(position: &str, description: &str, experience: &str, count: usize) -> String {
    QUESTIONS_PROMPT_TEMPLATE
        .replace("{shape_rule}", JSON_ARRAY_ONLY)
        .replace("{count}", &count.to_string())
        .replace("{position}", position.trim())
        .replace("{experience}", experience.trim())
        .replace("{description}", description.trim())
}

pub fn feedback_prompt(question: &str, reference_answer: &str, user_answer: &str) -> String {
    FEEDBACK_PROMPT_TEMPLATE
        .replace("{shape_rule}", JSON_OBJECT_ONLY)
        .replace("{question}", question.trim())
        .replace("{reference_answer}", reference_answer.trim())
        .replace("{user_answer}", user_answer.trim())
}
