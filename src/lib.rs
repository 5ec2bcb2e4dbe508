//! Medication directions, dose logging and adherence tracking.
//!
//! doselog keeps a list of prescription *directions* ("Metformin 500mg PO bid"),
//! a month-sharded log of doses actually taken, and measures each dose against
//! its schedule as an *offset* in periods:
//!
//! | Offset | Meaning |
//! |--------|---------|
//! | `0` | on time |
//! | `> 0` | late (PRN directions clamp to 0) |
//! | `< 0` | early (ad lib directions clamp to 0) |
//! | `null` | no prior dose to measure from |
//!
//! # Architecture
//!
//! - **Storage**: a transactional key-value store over SQLite, JSON values
//! - **Transport**: HTTP/JSON under `/meds` (axum) or MCP over stdio (rmcp)
//! - **Reminders**: a background scheduler that sends one batched notification
//!   when doses are overdue (log or Gotify)
//!
//! # Modules
//!
//! - [`config`]: configuration loading from TOML files and environment variables
//! - [`db`]: key-value store, schema and health checks
//! - [`meds`]: shorthand parsing, offsets and projection, the compliance log
//! - [`service`]: the public operations, serialized by one write lock
//! - [`scheduler`] and [`notify`]: due-dose reminders

pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod meds;
pub mod notify;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod tools;
