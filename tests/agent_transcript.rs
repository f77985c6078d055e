//! Agent loop behavior against a scripted model: tool dispatch, retry on bad
//! SQL, the "Explanation:" contract, and error-to-string at the boundary.

use async_trait::async_trait;
use chat2sql::agent::{answer_question, SqlAgent};
use chat2sql::db::SqlToolkit;
use chat2sql::error::{ChatSqlError, Result};
use chat2sql::ingest::ingest_csv;
use chat2sql::llm::{ChatMessage, ChatModel};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Replays a fixed list of replies, one per chat call, and records every
/// observation it was shown.
struct ScriptedModel {
    replies: Mutex<Vec<String>>,
    observations: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(replies: &[&str]) -> Self {
        let mut replies: Vec<String> = replies.iter().map(|s| s.to_string()).collect();
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            observations: Mutex::new(Vec::new()),
        }
    }

    fn seen_observations(&self) -> Vec<String> {
        self.observations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        if let Some(last) = messages.last() {
            if last.role == "user" && last.content.starts_with("Observation:") {
                self.observations.lock().unwrap().push(last.content.clone());
            }
        }
        self.replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| ChatSqlError::Llm("script exhausted".to_string()))
    }
}

/// A model whose invocation always fails.
struct BrokenModel;

#[async_trait]
impl ChatModel for BrokenModel {
    async fn chat(&self, _messages: &[ChatMessage]) -> Result<String> {
        Err(ChatSqlError::Llm("connection refused".to_string()))
    }
}

fn covid_toolkit() -> Arc<SqlToolkit> {
    let dir = TempDir::new().unwrap();
    let csv_path = dir.path().join("all-states-history.csv");
    std::fs::write(
        &csv_path,
        "state,date,hospitalizedIncrease\n\
         FL,2020-03-01,11\n\
         FL,2021-03-01,7\n\
         NY,2020-03-01,25\n\
         NY,2021-03-01,13\n",
    )
    .unwrap();

    let mut conn = Connection::open_in_memory().unwrap();
    ingest_csv(&mut conn, "all_states_history", &csv_path).unwrap();
    Arc::new(SqlToolkit::new(conn, 30))
}

const FINAL_REPLY: &str = "Thought: I now know the final answer.\n\
Final Answer: FL had 18 hospitalized patients (11 in 2020, 7 in 2021) and NY had 38 (25 in 2020, 13 in 2021).\n\n\
Explanation:\n\
I queried the `all_states_history` table, summing `hospitalizedIncrease`\n\
per state and year. I used the following query\n\n\
```sql\n\
SELECT state, SUBSTR(date, 1, 4) AS year, SUM(hospitalizedIncrease)\n\
FROM all_states_history WHERE state IN ('FL', 'NY') GROUP BY state, year\n\
```";

#[tokio::test]
async fn end_to_end_transcript_produces_explained_answer() {
    let model = Arc::new(ScriptedModel::new(&[
        "Thought: see what tables exist.\nAction: list_tables\nAction Input: none",
        "Thought: inspect the table.\nAction: describe_table\nAction Input: all_states_history",
        "Thought: sum per state and year.\nAction: run_query\nAction Input:\n\
         SELECT state, SUBSTR(date, 1, 4) AS year, SUM(hospitalizedIncrease)\n\
         FROM all_states_history WHERE state IN ('FL', 'NY') GROUP BY state, year",
        FINAL_REPLY,
    ]));
    let agent = SqlAgent::new(model.clone(), covid_toolkit(), 30, 15);

    let answer = agent
        .run("Get no of patients per year from FL and NY using hospitalizedIncrease")
        .await
        .unwrap();

    assert!(answer.contains("Explanation:"));
    assert!(answer.contains("SELECT"));
    assert!(answer.contains("hospitalizedIncrease"));

    let observations = model.seen_observations();
    assert_eq!(observations.len(), 3);
    assert!(observations[0].contains("all_states_history"));
    assert!(observations[1].contains("hospitalizedIncrease"));
    // The query actually ran: FL summed to 11 and 7 per year.
    assert!(observations[2].contains("11"));
    assert!(observations[2].contains("7"));
}

#[tokio::test]
async fn bad_sql_is_observed_and_retried() {
    let model = Arc::new(ScriptedModel::new(&[
        "Action: run_query\nAction Input: SELECT nope FROM all_states_history",
        "Action: run_query\nAction Input: SELECT COUNT(*) FROM all_states_history",
        "Final Answer: There are 4 rows.\n\nExplanation:\nI used SELECT COUNT(*) FROM all_states_history.",
    ]));
    let agent = SqlAgent::new(model.clone(), covid_toolkit(), 30, 15);

    let answer = agent.run("How many rows are there?").await.unwrap();
    assert!(answer.contains("4 rows"));

    let observations = model.seen_observations();
    assert!(observations[0].contains("Error:"));
    assert!(observations[1].contains("(4)"));
}

#[tokio::test]
async fn dml_attempt_is_rejected_and_surfaced_to_the_model() {
    let model = Arc::new(ScriptedModel::new(&[
        "Action: run_query\nAction Input: DROP TABLE all_states_history",
        "Final Answer: I don't know",
    ]));
    let toolkit = covid_toolkit();
    let agent = SqlAgent::new(model.clone(), toolkit.clone(), 30, 15);

    let answer = agent.run("Please drop the table").await.unwrap();
    assert_eq!(answer, "I don't know");
    assert!(model.seen_observations()[0].contains("only SELECT statements are allowed"));

    // The table survived.
    assert_eq!(
        toolkit.list_tables().unwrap(),
        vec!["all_states_history".to_string()]
    );
}

#[tokio::test]
async fn unknown_tool_gets_a_corrective_observation() {
    let model = Arc::new(ScriptedModel::new(&[
        "Action: query_sql_db\nAction Input: SELECT 1",
        "Final Answer: done.\n\nExplanation:\nnothing to run.",
    ]));
    let agent = SqlAgent::new(model.clone(), covid_toolkit(), 30, 15);

    agent.run("anything").await.unwrap();
    assert!(model.seen_observations()[0].contains("Unknown tool 'query_sql_db'"));
}

#[tokio::test]
async fn wrapper_turns_model_failure_into_text() {
    let agent = SqlAgent::new(Arc::new(BrokenModel), covid_toolkit(), 30, 15);
    let answer = answer_question(&agent, "anything").await;
    assert!(answer.contains("connection refused"));
}

#[tokio::test]
async fn wrapper_turns_step_exhaustion_into_text() {
    let model = Arc::new(ScriptedModel::new(&[
        "Action: list_tables\nAction Input: none",
        "Action: list_tables\nAction Input: none",
    ]));
    let agent = SqlAgent::new(model, covid_toolkit(), 30, 2);

    let answer = answer_question(&agent, "anything").await;
    assert!(answer.contains("No final answer after 2 steps"));
}
