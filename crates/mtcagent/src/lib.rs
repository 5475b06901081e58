// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # mtcagent - MTConnect agent core
//!
//! Translates the SHDR adapter dialect from industrial machine adapters into
//! standards-conformant MTConnect XML served over HTTP. The agent sits
//! between many machine adapters (devices) and many observer clients
//! (dashboards, MES systems).
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                          HTTP surface                               |
//! |      GET /probe  /current  /sample  /assets  (readers only)         |
//! +---------------------------------------------------------------------+
//! |                         Query engine                                |
//! |   path filter -> registry + stores -> MTConnect XML documents       |
//! +---------------------------------------------------------------------+
//! |                           Stores                                    |
//! |   observation ring | current/last maps | condition channels | assets|
//! +---------------------------------------------------------------------+
//! |                       Ingest sequencer                              |
//! |   adapter TCP readers -> queue -> single writer (SHDR parser)       |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Data flow
//!
//! SHDR line -> parser -> (observations | asset command) -> store mutation
//! (with derived ASSET_CHANGED / ASSET_REMOVED events) -> HTTP request ->
//! query engine reads stores -> serializer emits XML.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mtcagent::{Agent, AgentConfig};
//!
//! fn main() -> mtcagent::Result<()> {
//!     let config = AgentConfig::from_file("agent.toml")
//!         .map_err(|e| mtcagent::Error::SchemaRejected(e.to_string()))?;
//!     let agent = Agent::start(&config)?;
//!     // ... serve until shutdown ...
//!     agent.stop();
//!     Ok(())
//! }
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Agent`] | Lifecycle owner: registry, stores, sequencer, HTTP |
//! | [`schema::DeviceRegistry`] | Device descriptions + path resolution |
//! | [`shdr::ShdrParser`] | SHDR line tokenizer (per adapter stream) |
//! | [`store::ObservationStore`] | Ring history + current/last hash maps |
//! | [`asset::AssetStore`] | Asset map + bounded snapshot history |
//! | [`query::QueryEngine`] | Read-side facade rendering XML |

/// Agent lifecycle (start/stop wiring).
pub mod agent;
/// Asset store and XML tree model.
pub mod asset;
/// Configuration constants and TOML config.
pub mod config;
/// Central error type.
pub mod error;
/// HTTP listener and request dispatch.
pub mod http;
/// Ingest sequencer and adapter clients.
pub mod ingest;
/// Query engine and MTConnect XML rendering.
pub mod query;
/// Device model, registry, path dialect, XML validation gate.
pub mod schema;
/// SHDR wire dialect parser.
pub mod shdr;
/// Observation storage.
pub mod store;
/// Timestamp helpers.
pub mod time;

pub use agent::Agent;
pub use config::{AgentConfig, ConfigError};
pub use error::{Error, Result};
