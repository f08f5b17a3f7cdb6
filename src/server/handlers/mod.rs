pub mod agents;
pub mod catalog;
pub mod chat;
pub mod extract;
pub mod health;
pub mod sessions;
pub mod vector;
