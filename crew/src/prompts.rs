//! Prompt layout for task execution
//!
//! The system prompt frames the role; the user prompt carries the task, the
//! context from earlier tasks, the output contract and any revision feedback.

use crate::executor::ExecutionRequest;
use crate::role::Role;

const OUTPUT_RULES: &str = r#"## Guidelines
- Use the available tools when you need facts you do not have
- When you have everything you need, reply with your final answer only
- The final answer must be complete; it is handed on as-is
"#;

/// System prompt for a role
pub fn system_prompt(role: &Role) -> String {
    let mut prompt = format!("You are {}.", role.id());
    if !role.narrative().is_empty() {
        prompt.push(' ');
        prompt.push_str(role.narrative());
    }
    prompt.push_str("\nYour personal goal is: ");
    prompt.push_str(role.objective());
    prompt
}

/// User prompt for one attempt of a task
pub fn task_prompt(request: &ExecutionRequest) -> String {
    let mut prompt = String::new();

    prompt.push_str("Current Task: ");
    prompt.push_str(&request.description);
    prompt.push_str("\n\nThis is the expected criteria for your final answer: ");
    prompt.push_str(&request.expected_output);
    prompt.push('\n');

    if !request.context.is_empty() {
        prompt.push_str("\n## Context from earlier tasks\n");
        for (i, context) in request.context.iter().enumerate() {
            prompt.push_str(&format!("\n### Result {}\n{}\n", i + 1, context.trim()));
        }
    }

    if let Some(schema) = &request.output_schema {
        let rendered = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
        prompt.push_str("\n## Output Format\n");
        prompt.push_str("Your final answer MUST be a single JSON object matching this schema, with no other text:\n```json\n");
        prompt.push_str(&rendered);
        prompt.push_str("\n```\n");
    }

    for revision in &request.revisions {
        prompt.push_str("\n## Previous Answer\n");
        prompt.push_str(revision.previous_output.trim());
        prompt.push_str("\n\n## Feedback\n");
        prompt.push_str(revision.feedback.trim());
        prompt.push('\n');
    }
    if !request.revisions.is_empty() {
        prompt.push_str("\nRevise your answer to address the feedback.\n");
    }

    prompt.push('\n');
    prompt.push_str(OUTPUT_RULES);
    prompt
}
