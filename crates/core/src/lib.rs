//! # Aether Core
//!
//! Domain types, traits, and error definitions for the Prometheus Aether
//! prompting pipeline. It defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (the completion service, the record store)
//! is defined as a trait here. Implementations live in their respective
//! crates.

pub mod atom;
pub mod error;
pub mod message;
pub mod provider;
pub mod record;

// Re-export key types at crate root for ergonomics
pub use atom::{ATOM_META, AtomKey, AtomMeta, AtomSet, COMPLEXITY_LEVELS, ComplexityLevel};
pub use error::{Error, PromptError, ProviderError, Result, StoreError};
pub use message::{HistoryEntry, Message, Role, Speaker};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use record::{FeedbackRecord, RecordQuery, RecordSnapshot, RecordStore, TurnRecord};
