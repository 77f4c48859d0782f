//! Deterministic fallback content used when the AI path fails.
//!
//! Pure functions: no I/O, no randomness. Same inputs, same output.

use crate::models::interview::{AnswerFeedback, QaPair};

pub const DEFAULT_QUESTION_COUNT: usize = 5;

const SUBSTITUTE_NOTICE: &str =
    "Note: this is a substitute evaluation because the AI service was unavailable.";

/// (question template, answer template). Placeholders: {position}, {stack}, {years}.
const QUESTION_BANK: &[(&str, &str)] = &[
    (
        "Tell me about your background as a {position}. What have you worked on over your {years}?",
        "Summarize two or three projects that match the role, your exact responsibilities, \
         the technologies involved ({stack}) and a measurable outcome for each.",
    ),
    (
        "Which parts of {stack} have you used most, and how did you apply them in production?",
        "Pick the tools you know best, explain a concrete feature you shipped with them, \
         the trade-offs you considered and what you would do differently today.",
    ),
    (
        "Describe the hardest technical problem you solved as a {position}. How did you approach it?",
        "Use the situation, task, action, result structure: set the context briefly, explain \
         how you narrowed the problem down, the fix you chose and its impact.",
    ),
    (
        "How do you keep code quality high in a codebase built with {stack}?",
        "Mention code review, automated tests at the right levels, linting and CI, and how you \
         balance quality against delivery deadlines.",
    ),
    (
        "Walk me through how you would design and deliver a new feature end to end as a {position}.",
        "Cover requirements gathering, design and data model, incremental implementation, \
         testing, rollout and monitoring after release.",
    ),
    (
        "How would you debug a production incident in a system that uses {stack}?",
        "Start from impact and recent changes, use logs, metrics and traces to isolate the fault, \
         mitigate first, then find the root cause and prevent recurrence.",
    ),
    (
        "Tell me about a time you disagreed with a teammate on a technical decision.",
        "Describe the disagreement neutrally, how you gathered evidence, how the decision was \
         made and what you learned about collaborating.",
    ),
    (
        "How do you stay current with changes in {stack}?",
        "Name specific sources and habits such as release notes, side projects or community \
         involvement, and give an example of something new you adopted at work.",
    ),
    (
        "What would you focus on in your first 90 days as a {position}?",
        "Learning the product and codebase, building relationships, delivering a small win early \
         and then identifying a larger improvement to own.",
    ),
    (
        "With {years} of experience, how do you help less experienced engineers grow?",
        "Give examples of mentoring through pairing, thoughtful code review, documentation and \
         giving teammates ownership of meaningful work.",
    ),
];

pub fn question_bank_size() -> usize {
    QUESTION_BANK.len()
}

/// Templated interview questions for the role. Returns `min(count, bank size)` pairs.
pub fn fallback_questions(
    position: &str,
    description: &str,
    experience: &str,
    count: usize,
) -> Vec<QaPair> {
    let position = or_default(position, "software engineer");
    let stack = or_default(description, "your main technologies");
    let years = years_phrase(experience);

    let fill = |template: &str| {
        template
            .replace("{position}", position)
            .replace("{stack}", stack)
            .replace("{years}", &years)
    };

    QUESTION_BANK
        .iter()
        .take(count)
        .map(|(question, answer)| QaPair {
            question: fill(question),
            answer: fill(answer),
        })
        .collect()
}

/// Length-based substitute evaluation of an answer.
///
/// - fewer than 50 characters: 3/10
/// - 50 to 200 characters: 6/10
/// - more than 200 characters: 7/10
pub fn fallback_feedback(answer: &str) -> AnswerFeedback {
    let length = answer.trim().chars().count();

    let (rating, advice) = match length {
        0..=49 => (
            3,
            "Your answer is quite brief. Elaborate with a specific example, explain your \
             reasoning and describe the outcome.",
        ),
        50..=200 => (
            6,
            "Your answer covers the basics. Strengthen it with concrete examples and \
             measurable results.",
        ),
        _ => (
            7,
            "Your answer is detailed. Keep every point tied to the question and highlight \
             the impact of your work.",
        ),
    };

    AnswerFeedback {
        rating,
        feedback: format!("{advice} {SUBSTITUTE_NOTICE}"),
    }
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default
    } else {
        trimmed
    }
}

fn years_phrase(experience: &str) -> String {
    match experience.trim().parse::<f64>() {
        Ok(years) if years == 1.0 => "1 year".to_string(),
        Ok(years) if years >= 0.0 => format!("{} years", experience.trim()),
        _ => "years in the field".to_string(),
    }
}
