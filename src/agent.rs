//! SQL agent - a bounded Thought/Action/Observation loop over the toolkit
//!
//! Each turn the model either names a tool to run or gives its final answer.
//! Tool failures (bad SQL, guard rejections, unknown tables) are fed back as
//! observations so the model can correct itself; the step bound caps how many
//! times it may try.

use crate::db::SqlToolkit;
use crate::error::{ChatSqlError, Result};
use crate::llm::{ChatMessage, ChatModel};
use crate::prompts::{build_system_prompt, tool_specs};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the model asked for in one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStep {
    FinalAnswer(String),
    Action { tool: String, input: String },
}

/// Parse one model reply into a step.
///
/// A reply containing `Final Answer:` terminates the loop and everything
/// after the marker (including any `Explanation:` section) is the answer.
/// Otherwise the reply must name an `Action:` and an `Action Input:`.
pub fn parse_step(reply: &str) -> Result<AgentStep> {
    if let Some(pos) = reply.find("Final Answer:") {
        let answer = reply[pos + "Final Answer:".len()..].trim();
        return Ok(AgentStep::FinalAnswer(answer.to_string()));
    }

    let action_pos = reply.find("Action:").ok_or_else(|| {
        ChatSqlError::Delegate(format!(
            "Model reply contains neither 'Final Answer:' nor 'Action:': {}",
            truncate(reply, 200)
        ))
    })?;
    let after_action = &reply[action_pos + "Action:".len()..];

    let input_pos = after_action.find("Action Input:").ok_or_else(|| {
        ChatSqlError::Delegate("Model reply has 'Action:' but no 'Action Input:'".to_string())
    })?;

    let tool = after_action[..input_pos]
        .trim()
        .trim_matches(|c| c == '[' || c == ']')
        .trim()
        .to_string();

    let mut input = &after_action[input_pos + "Action Input:".len()..];
    // Anything the model already hallucinated past its own action is noise.
    if let Some(obs) = input.find("Observation:") {
        input = &input[..obs];
    }

    Ok(AgentStep::Action {
        tool,
        input: strip_code_fences(input.trim()).to_string(),
    })
}

/// The prompt forbids markdown fences around SQL, but models add them anyway.
fn strip_code_fences(input: &str) -> &str {
    let trimmed = input.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line.
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// The query delegate: one question in, one textual answer out. Stateless
/// across questions.
pub struct SqlAgent {
    model: Arc<dyn ChatModel>,
    toolkit: Arc<SqlToolkit>,
    system_prompt: String,
    max_steps: usize,
}

impl SqlAgent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        toolkit: Arc<SqlToolkit>,
        top_k: usize,
        max_steps: usize,
    ) -> Self {
        Self {
            model,
            toolkit,
            system_prompt: build_system_prompt("SQLite", top_k, &tool_specs()),
            max_steps: max_steps.max(1),
        }
    }

    /// Run the reasoning loop for one question.
    pub async fn run(&self, question: &str) -> Result<String> {
        info!("Answering question: {}", question);

        let mut messages = vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(format!("Question: {}", question)),
        ];

        for step in 1..=self.max_steps {
            let reply = self.model.chat(&messages).await?;
            debug!("Model reply (step {}): {}", step, truncate(&reply, 500));
            messages.push(ChatMessage::assistant(reply.clone()));

            match parse_step(&reply) {
                Ok(AgentStep::FinalAnswer(answer)) => {
                    info!("Final answer after {} steps", step);
                    return Ok(answer);
                }
                Ok(AgentStep::Action { tool, input }) => {
                    let observation = self.dispatch(&tool, &input);
                    messages.push(ChatMessage::user(format!("Observation: {}", observation)));
                }
                Err(e) => {
                    warn!("Unparseable model reply at step {}: {}", step, e);
                    messages.push(ChatMessage::user(
                        "Observation: Your reply could not be parsed. Respond with either \
                         'Action:' and 'Action Input:' lines, or 'Final Answer:'."
                            .to_string(),
                    ));
                }
            }
        }

        Err(ChatSqlError::Delegate(format!(
            "No final answer after {} steps",
            self.max_steps
        )))
    }

    /// Execute one tool. Failures become observation text, never errors: the
    /// model is expected to read them and try again.
    fn dispatch(&self, tool: &str, input: &str) -> String {
        let result = match tool {
            "list_tables" => self
                .toolkit
                .list_tables()
                .map(|names| names.join(", ")),
            "describe_table" => self
                .toolkit
                .describe_table(input.trim().trim_matches('`').trim_matches('"'))
                .map(|info| info.render()),
            "run_query" => self.toolkit.run_query(input).map(|result| result.render()),
            other => Err(ChatSqlError::Delegate(format!(
                "Unknown tool '{}'. Available tools: list_tables, describe_table, run_query",
                other
            ))),
        };

        match result {
            Ok(text) => text,
            Err(e) => {
                warn!("Tool '{}' failed: {}", tool, e);
                format!("Error: {}", e)
            }
        }
    }
}

/// The boundary the web form calls: never panics, never propagates. Any
/// failure comes back as its text representation in place of an answer.
pub async fn answer_question(agent: &SqlAgent, question: &str) -> String {
    match agent.run(question).await {
        Ok(answer) => answer,
        Err(e) => e.to_string(),
    }
}
