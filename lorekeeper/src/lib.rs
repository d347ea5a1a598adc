//! Lorebook maintenance for long-running role-play campaigns.
//!
//! Reads SillyTavern chat transcripts, extracts world-building entities
//! with a local LLM, scores them for confidence and hallucination risk,
//! and queues them for human review. Approved entities are merged into
//! the character's lorebook through a backup-and-atomic-write guard so a
//! character file can never be lost to a bad write.

pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod llm;
pub mod lorebook;
pub mod models;
pub mod processing;
pub mod services;
pub mod storage;
