//! Bestie - SMS bestie backend.
//!
//! Receives messaging-provider webhooks, generates replies through a
//! Redis-backed queue worker, and tracks affiliate links, clicks, and
//! purchases per conversation.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod intent;
pub mod linkwrap;
pub mod migrations;
pub mod models;
pub mod monetize;
pub mod outbound;
pub mod phone;
pub mod queue;
pub mod repository;
pub mod safety;
pub mod schema;
pub mod server;
pub mod services;
pub mod sms;
