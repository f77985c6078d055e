pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod guard;
pub mod ingest;
pub mod llm;
pub mod prompts;
pub mod server;
