//! Autogroup - rule-based asset groups
//!
//! Groups are persisted as boolean rule trees over asset attributes and
//! resolved on demand against the asset inventory. The library exposes all
//! modules for the binary and for testing.

pub mod errors;
pub mod events;
pub mod inventory;
pub mod jobs;
pub mod lock;
pub mod resolver;
pub mod rules;
pub mod settings;
pub mod srr;
pub mod storage;
pub mod web;
