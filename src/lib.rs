//! Persona command engine.
//!
//! Lets a conversational assistant switch between named personas in response
//! to inline text commands (`!coder`, `!reset`, `!list`,
//! `!download_personas`), with a hidden always-active controller persona
//! supplying baseline platform behavior. The hosting application calls
//! [`engine::PersonaEngine::process`] once per user message and inserts the
//! returned system prompt ahead of its model call.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod http_client;
pub mod importer;
pub mod patterns;
pub mod state;
pub mod store;

pub use catalog::{Catalog, CatalogMeta, Persona};
pub use config::EngineConfig;
pub use dispatch::Action;
pub use engine::{Notice, PersonaEngine, ProcessOutcome};
pub use error::EngineError;
pub use importer::ImportReport;
pub use state::{ConversationState, ConversationStore};
