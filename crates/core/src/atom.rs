//! Prompt atoms: the five labeled fragments of a structured prompt.
//!
//! An [`AtomSet`] is ephemeral editing state. Only `context` and `goal` are
//! required for submission; `role`, `process` and `format` are enhancers.
//! The metadata tables in this module are process-wide and read-only.

use crate::error::PromptError;
use serde::{Deserialize, Serialize};

/// One of the five atom keys, in canonical rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtomKey {
    Role,
    Context,
    Goal,
    Process,
    Format,
}

impl AtomKey {
    /// All keys in canonical order: role, context, goal, process, format.
    pub const ALL: [AtomKey; 5] = [
        AtomKey::Role,
        AtomKey::Context,
        AtomKey::Goal,
        AtomKey::Process,
        AtomKey::Format,
    ];

    /// Keys that must be non-blank before a prompt can be submitted.
    pub const REQUIRED: [AtomKey; 2] = [AtomKey::Context, AtomKey::Goal];

    pub fn as_str(&self) -> &'static str {
        match self {
            AtomKey::Role => "role",
            AtomKey::Context => "context",
            AtomKey::Goal => "goal",
            AtomKey::Process => "process",
            AtomKey::Format => "format",
        }
    }

    /// Upper-case label used when rendering (`ROLE`, `CONTEXT`, ...).
    pub fn label(&self) -> &'static str {
        self.meta().label
    }

    pub fn is_required(&self) -> bool {
        Self::REQUIRED.contains(self)
    }

    pub fn meta(&self) -> &'static AtomMeta {
        &ATOM_META[*self as usize]
    }
}

impl std::fmt::Display for AtomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AtomKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "role" => Ok(AtomKey::Role),
            "context" => Ok(AtomKey::Context),
            "goal" => Ok(AtomKey::Goal),
            "process" => Ok(AtomKey::Process),
            "format" => Ok(AtomKey::Format),
            other => Err(format!("unknown atom '{other}'")),
        }
    }
}

/// The five atoms of a prompt. Missing fields deserialize as empty text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomSet {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub process: String,
    #[serde(default)]
    pub format: String,
}

impl AtomSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, key: AtomKey, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: AtomKey) -> &str {
        match key {
            AtomKey::Role => &self.role,
            AtomKey::Context => &self.context,
            AtomKey::Goal => &self.goal,
            AtomKey::Process => &self.process,
            AtomKey::Format => &self.format,
        }
    }

    pub fn set(&mut self, key: AtomKey, value: impl Into<String>) {
        let slot = match key {
            AtomKey::Role => &mut self.role,
            AtomKey::Context => &mut self.context,
            AtomKey::Goal => &mut self.goal,
            AtomKey::Process => &mut self.process,
            AtomKey::Format => &mut self.format,
        };
        *slot = value.into();
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Whitespace-only text counts as absent.
    pub fn is_present(&self, key: AtomKey) -> bool {
        !self.get(key).trim().is_empty()
    }

    /// Non-blank atoms in canonical order.
    pub fn present(&self) -> impl Iterator<Item = (AtomKey, &str)> + '_ {
        AtomKey::ALL
            .into_iter()
            .filter(|key| self.is_present(*key))
            .map(|key| (key, self.get(key)))
    }

    pub fn has_any(&self) -> bool {
        AtomKey::ALL.iter().any(|key| self.is_present(*key))
    }

    pub fn missing_required(&self) -> Vec<AtomKey> {
        AtomKey::REQUIRED
            .into_iter()
            .filter(|key| !self.is_present(*key))
            .collect()
    }

    pub fn is_submittable(&self) -> bool {
        self.missing_required().is_empty()
    }

    /// Reject the set when `context` or `goal` is blank.
    pub fn ensure_submittable(&self) -> Result<(), PromptError> {
        let missing = self.missing_required();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PromptError::IncompleteAtoms {
                missing: missing.iter().map(AtomKey::as_str).collect(),
            })
        }
    }
}

// ── Metadata tables ───────────────────────────────────────────────────────

/// Display metadata for one atom.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AtomMeta {
    pub key: AtomKey,
    pub icon: &'static str,
    pub label: &'static str,
    pub color: &'static str,
    /// Guiding question shown to the operator.
    pub question: &'static str,
    pub description: &'static str,
}

/// Indexed by `AtomKey as usize`.
pub static ATOM_META: [AtomMeta; 5] = [
    AtomMeta {
        key: AtomKey::Role,
        icon: "👤",
        label: "ROLE",
        color: "#00f0ff",
        question: "Wie is de expert?",
        description: "Define the persona or expertise that executes the task.",
    },
    AtomMeta {
        key: AtomKey::Context,
        icon: "🌐",
        label: "CONTEXT",
        color: "#ff00ff",
        question: "Wat is de situatie?",
        description: "Background information to help understand the task.",
    },
    AtomMeta {
        key: AtomKey::Goal,
        icon: "🎯",
        label: "GOAL",
        color: "#ffd700",
        question: "Wat moet er gebeuren?",
        description: "The core of the request: what you want to achieve.",
    },
    AtomMeta {
        key: AtomKey::Process,
        icon: "⚙️",
        label: "PROCESS",
        color: "#7000ff",
        question: "Hoe pak je het aan?",
        description: "Step-by-step approach description.",
    },
    AtomMeta {
        key: AtomKey::Format,
        icon: "📋",
        label: "FORMAT",
        color: "#00ff88",
        question: "Hoe ziet de output eruit?",
        description: "Specify the desired output format.",
    },
];

/// One rung of the prompting complexity ladder.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ComplexityLevel {
    pub level: u8,
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "use")]
    pub use_case: &'static str,
    pub example: &'static str,
    pub color: &'static str,
}

pub static COMPLEXITY_LEVELS: [ComplexityLevel; 7] = [
    ComplexityLevel {
        level: 1,
        name: "DIRECT PATTERN",
        description: "Simplest form: direct instruction without examples.",
        use_case: "Simple tasks, clear questions, standard transformations.",
        example: "\"Translate this text to Dutch.\"",
        color: "#00f0ff",
    },
    ComplexityLevel {
        level: 2,
        name: "FEW-SHOT PATTERN",
        description: "Provide input-output examples to demonstrate the desired pattern.",
        use_case: "When a specific format or style is needed.",
        example: "Input: \"Hello\" → Output: \"Hallo\"\nInput: \"Goodbye\" → Output: \"Tot ziens\"",
        color: "#00d4ff",
    },
    ComplexityLevel {
        level: 3,
        name: "CHAIN-OF-THOUGHT",
        description: "Ask the model to think step-by-step before answering.",
        use_case: "Complex problems, math, logical reasoning.",
        example: "\"Think step by step: If a train travels 120km in 2 hours...\"",
        color: "#7000ff",
    },
    ComplexityLevel {
        level: 4,
        name: "STRUCTURED PROTOCOL",
        description: "Define a strict schema the model must follow.",
        use_case: "Consistent output structure required.",
        example: "Output as JSON: { \"severity\": 1-10, \"location\": \"file:line\", \"fix\": \"...\" }",
        color: "#ff00ff",
    },
    ComplexityLevel {
        level: 5,
        name: "ReAct AGENTIC LOOP",
        description: "Reasoning + Acting cycle: Thought → Action → Observation → repeat.",
        use_case: "Multi-step tasks with intermediate actions.",
        example: "Thought: I need to search for...\nAction: search(\"query\")\nObservation: ...",
        color: "#ffd700",
    },
    ComplexityLevel {
        level: 6,
        name: "ADVERSARIAL REVIEW",
        description: "Two opposing agents: one creates, one critiques. Iterate until the quality threshold is met.",
        use_case: "Quality assurance critical.",
        example: "Creator: [solution] → Critic: [issues found] → Creator: [improved solution]",
        color: "#ff6600",
    },
    ComplexityLevel {
        level: 7,
        name: "MULTI-AGENT SWARM",
        description: "Team of specialized agents solving a complex problem collaboratively.",
        use_case: "Very complex tasks across multiple domains.",
        example: "Orchestrator → [Analyst, Developer, Reviewer] → Synthesized output",
        color: "#ff0044",
    },
];

/// Look up a complexity level by its 1-based number.
pub fn complexity_level(level: u8) -> Option<&'static ComplexityLevel> {
    COMPLEXITY_LEVELS.iter().find(|l| l.level == level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_table_is_indexed_by_key() {
        for key in AtomKey::ALL {
            assert_eq!(key.meta().key, key);
            assert_eq!(key.label(), key.as_str().to_uppercase());
        }
    }

    #[test]
    fn whitespace_only_atom_is_absent() {
        let atoms = AtomSet::new().with(AtomKey::Role, "   \n\t");
        assert!(!atoms.is_present(AtomKey::Role));
        assert!(!atoms.has_any());
    }

    #[test]
    fn submittable_requires_context_and_goal() {
        let atoms = AtomSet::new()
            .with(AtomKey::Role, "Rust mentor")
            .with(AtomKey::Context, "A CLI tool");
        assert!(!atoms.is_submittable());
        assert_eq!(
            atoms.ensure_submittable(),
            Err(PromptError::IncompleteAtoms {
                missing: vec!["goal"]
            })
        );

        let atoms = atoms.with(AtomKey::Goal, "Review the parser");
        assert!(atoms.ensure_submittable().is_ok());
    }

    #[test]
    fn present_iterates_in_canonical_order() {
        let atoms = AtomSet::new()
            .with(AtomKey::Format, "table")
            .with(AtomKey::Role, "analyst")
            .with(AtomKey::Goal, "summarize");
        let keys: Vec<AtomKey> = atoms.present().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![AtomKey::Role, AtomKey::Goal, AtomKey::Format]);
    }

    #[test]
    fn clear_resets_all_atoms() {
        let mut atoms = AtomSet::new().with(AtomKey::Context, "ctx");
        atoms.clear();
        assert_eq!(atoms, AtomSet::default());
    }

    #[test]
    fn partial_wire_object_deserializes() {
        let atoms: AtomSet = serde_json::from_str(r#"{"goal":"ship it"}"#).unwrap();
        assert_eq!(atoms.goal, "ship it");
        assert!(atoms.role.is_empty());
    }

    #[test]
    fn atom_key_parses_case_insensitively() {
        assert_eq!("Goal".parse::<AtomKey>(), Ok(AtomKey::Goal));
        assert!("tone".parse::<AtomKey>().is_err());
    }

    #[test]
    fn complexity_levels_are_numbered_one_to_seven() {
        assert_eq!(COMPLEXITY_LEVELS.len(), 7);
        assert_eq!(complexity_level(3).map(|l| l.name), Some("CHAIN-OF-THOUGHT"));
        assert!(complexity_level(8).is_none());
    }
}
