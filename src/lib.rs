pub mod agent;
pub mod catalog;
pub mod chat;
pub mod cli;
pub mod core;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod retrieval;
pub mod server;
pub mod session;
pub mod state;
pub mod vector;
