//! Context assembly: atoms + history + memories → ordered message list.
//!
//! The output always has the shape
//!
//! 1. one `system` message: base instructions, then the optional memory
//!    section, then the optional framework section (in that order),
//! 2. the most recent [`HISTORY_WINDOW`] history entries, order preserved,
//! 3. one final `user` message holding the new message verbatim.
//!
//! # Determinism
//!
//! Assembly is pure and total: identical inputs always produce identical
//! output, and no input can make it fail.

use aether_core::atom::AtomSet;
use aether_core::message::{HistoryEntry, Message};

/// Number of history entries forwarded with each request.
pub const HISTORY_WINDOW: usize = 20;

pub const MEMORY_SECTION_HEADER: &str = "## USER CONTEXT (from memory):";
pub const FRAMEWORK_SECTION_HEADER: &str = "## ACTIVE PROMETHEUS FRAMEWORK:";

/// Fixed base instructions for every conversation.
pub const BASE_SYSTEM_PROMPT: &str = "\
You are PROMETHEUS AETHER, an advanced AI assistant powered by the PROMETHEUS prompting framework. You excel at understanding structured prompts and delivering precise, high-quality responses.

## YOUR CAPABILITIES:
- Deep understanding of the 5-atom PROMETHEUS framework (Role, Context, Goal, Process, Format)
- Ability to adapt your communication style based on the user's needs
- Expertise in prompt engineering and structured thinking
- Multi-language support (Dutch and English primarily)

## YOUR PERSONALITY:
- Professional yet approachable
- Concise and precise — every word has purpose
- You think step-by-step when faced with complex problems
- You proactively suggest improvements to unclear requests

## RESPONSE GUIDELINES:
1. Always acknowledge the user's intent before responding
2. Structure your responses clearly using markdown when appropriate
3. For complex tasks, break down your approach into steps
4. If a request is ambiguous, ask clarifying questions
5. Cite your reasoning when making recommendations";

/// Everything needed to build one request. Constructed fresh per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptContext<'a> {
    pub user_message: &'a str,
    pub session_history: &'a [HistoryEntry],
    pub user_memories: &'a [String],
    pub atoms: Option<&'a AtomSet>,
}

impl<'a> PromptContext<'a> {
    pub fn new(user_message: &'a str) -> Self {
        Self {
            user_message,
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: &'a [HistoryEntry]) -> Self {
        self.session_history = history;
        self
    }

    pub fn with_memories(mut self, memories: &'a [String]) -> Self {
        self.user_memories = memories;
        self
    }

    pub fn with_atoms(mut self, atoms: &'a AtomSet) -> Self {
        self.atoms = Some(atoms);
        self
    }

    /// The history entries that fall inside the window.
    pub fn windowed_history(&self) -> &'a [HistoryEntry] {
        let start = self.session_history.len().saturating_sub(HISTORY_WINDOW);
        &self.session_history[start..]
    }
}

/// Builds message lists around a base prompt. Stateless; create one and reuse it.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    base_prompt: String,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(BASE_SYSTEM_PROMPT)
    }
}

impl ContextAssembler {
    pub fn new(base_prompt: impl Into<String>) -> Self {
        Self {
            base_prompt: base_prompt.into(),
        }
    }

    pub fn base_prompt(&self) -> &str {
        &self.base_prompt
    }

    /// Base prompt plus the memory and framework sections that apply.
    pub fn system_prompt(&self, ctx: &PromptContext<'_>) -> String {
        let mut parts: Vec<String> = vec![self.base_prompt.clone()];

        if !ctx.user_memories.is_empty() {
            parts.push(format!(
                "\n{MEMORY_SECTION_HEADER}\n{}",
                ctx.user_memories.join("\n")
            ));
        }

        if let Some(atoms) = ctx.atoms {
            let lines: Vec<String> = atoms
                .present()
                .map(|(key, value)| format!("{}: {}", key.label(), value))
                .collect();
            if !lines.is_empty() {
                parts.push(format!("\n{FRAMEWORK_SECTION_HEADER}\n{}", lines.join("\n")));
            }
        }

        parts.join("\n")
    }

    /// The full message list for one request.
    ///
    /// Length is always `1 + min(history, HISTORY_WINDOW) + 1`.
    pub fn assemble(&self, ctx: &PromptContext<'_>) -> Vec<Message> {
        let history = ctx.windowed_history();
        let mut messages = Vec::with_capacity(history.len() + 2);

        messages.push(Message::system(self.system_prompt(ctx)));
        messages.extend(history.iter().map(Message::from));
        messages.push(Message::user(ctx.user_message));

        let dropped = ctx.session_history.len() - history.len();
        if dropped > 0 {
            tracing::debug!(
                dropped,
                forwarded = history.len(),
                "History truncated to window"
            );
        }

        messages
    }
}

/// [`ContextAssembler::system_prompt`] with the default base prompt.
pub fn build_system_prompt(ctx: &PromptContext<'_>) -> String {
    ContextAssembler::default().system_prompt(ctx)
}

/// [`ContextAssembler::assemble`] with the default base prompt.
pub fn build_messages(ctx: &PromptContext<'_>) -> Vec<Message> {
    ContextAssembler::default().assemble(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_core::atom::AtomKey;
    use aether_core::message::Role;

    fn history(n: usize) -> Vec<HistoryEntry> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    HistoryEntry::user(format!("q{i}"))
                } else {
                    HistoryEntry::assistant(format!("a{i}"))
                }
            })
            .collect()
    }

    #[test]
    fn bare_context_yields_system_and_user() {
        let messages = build_messages(&PromptContext::new("Hello"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, BASE_SYSTEM_PROMPT);
        assert_eq!(messages[1], Message::user("Hello"));
    }

    #[test]
    fn base_prompt_keeps_personality_wording() {
        assert!(BASE_SYSTEM_PROMPT.contains("- Concise and precise — every word has purpose\n"));
    }

    #[test]
    fn history_window_keeps_most_recent_in_order() {
        for n in [0, 1, 19, 20, 21, 45] {
            let h = history(n);
            let messages = build_messages(&PromptContext::new("next").with_history(&h));
            let forwarded = n.min(HISTORY_WINDOW);
            assert_eq!(messages.len(), forwarded + 2, "n = {n}");

            let expected: Vec<Message> = h[n - forwarded..].iter().map(Message::from).collect();
            assert_eq!(&messages[1..messages.len() - 1], expected.as_slice());
            assert_eq!(messages.last().unwrap().content, "next");
        }
    }

    #[test]
    fn memories_render_one_per_line() {
        let memories = vec!["Prefers Dutch".to_string(), "Works in logistics".to_string()];
        let prompt = build_system_prompt(&PromptContext::new("hi").with_memories(&memories));
        assert!(prompt.ends_with(
            "\n\n## USER CONTEXT (from memory):\nPrefers Dutch\nWorks in logistics"
        ));
        assert!(!prompt.contains(FRAMEWORK_SECTION_HEADER));
    }

    #[test]
    fn atoms_render_in_canonical_order_and_skip_blanks() {
        let atoms = AtomSet::new()
            .with(AtomKey::Format, "a table")
            .with(AtomKey::Goal, "rank vendors")
            .with(AtomKey::Process, "   ")
            .with(AtomKey::Role, "analyst")
            .with(AtomKey::Context, "Q3 review");
        let prompt = build_system_prompt(&PromptContext::new("go").with_atoms(&atoms));
        assert!(prompt.ends_with(
            "\n\n## ACTIVE PROMETHEUS FRAMEWORK:\n\
             ROLE: analyst\nCONTEXT: Q3 review\nGOAL: rank vendors\nFORMAT: a table"
        ));
        assert!(!prompt.contains("PROCESS:"));
    }

    #[test]
    fn all_blank_atoms_add_no_section() {
        let atoms = AtomSet::new().with(AtomKey::Role, " \t ");
        let prompt = build_system_prompt(&PromptContext::new("go").with_atoms(&atoms));
        assert_eq!(prompt, BASE_SYSTEM_PROMPT);
    }

    #[test]
    fn memory_section_precedes_framework_section() {
        let memories = vec!["m1".to_string()];
        let atoms = AtomSet::new().with(AtomKey::Goal, "g");
        let prompt = build_system_prompt(
            &PromptContext::new("x")
                .with_memories(&memories)
                .with_atoms(&atoms),
        );
        let mem = prompt.find(MEMORY_SECTION_HEADER).unwrap();
        let fw = prompt.find(FRAMEWORK_SECTION_HEADER).unwrap();
        assert!(mem < fw);
        assert!(prompt.ends_with("m1\n\n## ACTIVE PROMETHEUS FRAMEWORK:\nGOAL: g"));
    }

    #[test]
    fn user_message_is_verbatim() {
        let messages = build_messages(&PromptContext::new("  spaced\n"));
        assert_eq!(messages.last().unwrap().content, "  spaced\n");
    }

    #[test]
    fn custom_base_prompt() {
        let asm = ContextAssembler::new("Be brief.");
        let messages = asm.assemble(&PromptContext::new("hi"));
        assert_eq!(messages[0].content, "Be brief.");
    }

    #[test]
    fn deterministic_assembly() {
        let h = history(30);
        let memories = vec!["a".to_string()];
        let atoms = AtomSet::new().with(AtomKey::Context, "c").with(AtomKey::Goal, "g");
        let ctx = PromptContext::new("q")
            .with_history(&h)
            .with_memories(&memories)
            .with_atoms(&atoms);
        assert_eq!(build_messages(&ctx), build_messages(&ctx));
    }
}
