//! Context assembly.
//!
//! | Part | Source | Rule |
//! |------|--------|------|
//! | System | Base prompt | Always first, never trimmed |
//! | Memory section | Retrieved memories | Only when non-empty, one per line |
//! | Framework section | Atom set | Only non-blank atoms, canonical order |
//! | History | Session history | Most recent 20, order preserved |
//! | User message | Operator input | Always last, verbatim |

pub mod assembler;

pub use assembler::{
    BASE_SYSTEM_PROMPT, ContextAssembler, HISTORY_WINDOW, PromptContext, build_messages,
    build_system_prompt,
};
