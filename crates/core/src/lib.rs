pub mod config;
pub mod domain;
pub mod llm;
pub mod pdf;
pub mod pipeline;
pub mod prompt;
pub mod storage;
pub mod time;
