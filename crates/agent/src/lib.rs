//! The prompting pipeline for Prometheus Aether.
//!
//! 1. **Compose** an atom set (role, context, goal, process, format)
//! 2. **Assemble** it with history and memories into a message list
//! 3. **Stream** the reply through a transport and accumulate it
//! 4. **Record** the completed turns for later dataset export
//!
//! Also home to the offline helpers: the prompt forge and the heuristic
//! validator.

pub mod context;
pub mod forge;
pub mod session;
pub mod validator;

pub use context::{
    BASE_SYSTEM_PROMPT, ContextAssembler, HISTORY_WINDOW, PromptContext, build_messages,
    build_system_prompt,
};
pub use forge::forge;
pub use session::{ChatSession, Exchange};
pub use validator::{Grade, ValidationReport, validate};
