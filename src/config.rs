//! Process configuration
//!
//! All environment lookups happen once, here. Everything downstream receives
//! an explicit `Config` instead of reading the environment itself.

use crate::error::{ChatSqlError, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// OpenAI-compatible API key. Required.
    pub api_key: String,

    /// Chat model name
    pub model: String,

    /// Base URL of the chat-completions API
    pub base_url: String,

    /// Source CSV file loaded at startup
    pub csv_path: PathBuf,

    /// SQLite database file
    pub database_path: PathBuf,

    /// Name of the table the CSV is loaded into
    pub table_name: String,

    /// Address the web form listens on
    pub listen_addr: SocketAddr,

    /// Row cap applied to every query the agent runs
    pub top_k: usize,

    /// Upper bound on reasoning steps per question
    pub max_steps: usize,
}

impl Config {
    /// Build a config from the environment. `OPENAI_API_KEY` is the only
    /// required variable; everything else has a default.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ChatSqlError::Config("OPENAI_API_KEY is not set".to_string()))?;
        if api_key.trim().is_empty() {
            return Err(ChatSqlError::Config("OPENAI_API_KEY is empty".to_string()));
        }

        let listen_addr = env_or("CHAT2SQL_ADDR", "127.0.0.1:8080")
            .parse::<SocketAddr>()
            .map_err(|e| ChatSqlError::Config(format!("Invalid CHAT2SQL_ADDR: {}", e)))?;

        let top_k = env_or("CHAT2SQL_TOP_K", "30")
            .parse::<usize>()
            .map_err(|e| ChatSqlError::Config(format!("Invalid CHAT2SQL_TOP_K: {}", e)))?;

        let max_steps = env_or("CHAT2SQL_MAX_STEPS", "15")
            .parse::<usize>()
            .map_err(|e| ChatSqlError::Config(format!("Invalid CHAT2SQL_MAX_STEPS: {}", e)))?;

        Ok(Self {
            api_key,
            model: env_or("OPENAI_MODEL", "gpt-4o-mini"),
            base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            csv_path: PathBuf::from(env_or(
                "CHAT2SQL_CSV",
                "demos/data/all-states-history.csv",
            )),
            database_path: PathBuf::from(env_or("CHAT2SQL_DB", "db/chat2sql.db")),
            table_name: env_or("CHAT2SQL_TABLE", "all_states_history"),
            listen_addr,
            top_k,
            max_steps,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_to_default() {
        assert_eq!(env_or("CHAT2SQL_DOES_NOT_EXIST", "fallback"), "fallback");
    }
}
