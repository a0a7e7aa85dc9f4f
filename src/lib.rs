//! Olaf - modular business application framework
//!
//! Olaf maps runtime-declared models onto a document database, guards
//! every operation with group based access rules and exposes the whole
//! object model over JSON-RPC 2.0.
//!
//! ## Architecture
//!
//! ```text
//! HTTP (hyper) ─► /token ──────────► auth (argon2 + JWT)
//!              └► /jsonrpc ─► rpc ─► odm::DocSet ─► security (ACL + DLS)
//!                                         │
//!                                         ▼
//!                                 db::DocumentStore (MongoDB | memory)
//! ```
//!
//! Addons (`modules`) contribute models and data; `base` is always present.

pub mod addons;
pub mod auth;
pub mod config;
pub mod db;
pub mod logging;
pub mod modules;
pub mod odm;
pub mod routes;
pub mod rpc;
pub mod security;
pub mod server;
pub mod types;

pub use config::Args;
pub use odm::{DocSet, Environment, Field, ModelDefinition, ModelRegistry};
pub use types::{OlafError, Result};
