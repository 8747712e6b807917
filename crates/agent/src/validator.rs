//! Heuristic prompt validator.
//!
//! Checks free text for each of the five atoms and reports which are present,
//! a compliance score, and one tip per missing atom. An atom counts as
//! present when the text carries an explicit marker for it (`GOAL: ...` or a
//! `## GOAL` heading) or any of its English/Dutch cue words.

use aether_core::atom::AtomKey;
use serde::Serialize;

/// Points per detected atom; five atoms make 100.
pub const POINTS_PER_ATOM: u8 = 20;

/// Cue words and phrases per atom, matched on word boundaries.
fn keywords(key: AtomKey) -> &'static [&'static str] {
    match key {
        AtomKey::Role => &[
            "you are", "act as", "as an expert", "persona", "je bent", "jij bent", "als expert",
            "rol",
        ],
        AtomKey::Context => &[
            "context", "background", "situation", "given that", "achtergrond", "situatie",
        ],
        AtomKey::Goal => &[
            "goal", "objective", "i want", "i need", "your task", "doel", "ik wil", "taak",
        ],
        AtomKey::Process => &[
            "step by step", "steps", "first", "then", "approach", "stap", "stappen", "eerst",
            "daarna", "aanpak",
        ],
        AtomKey::Format => &[
            "format", "json", "table", "bullet", "markdown", "output as", "formaat", "tabel",
            "lijst",
        ],
    }
}

/// Result of validating one prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub role: bool,
    pub context: bool,
    pub goal: bool,
    pub process: bool,
    pub format: bool,
    /// 0..=100.
    pub score: u8,
    pub tips: Vec<String>,
}

/// Coarse reading of the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Strong,
    Partial,
    Weak,
}

impl ValidationReport {
    pub fn get(&self, key: AtomKey) -> bool {
        match key {
            AtomKey::Role => self.role,
            AtomKey::Context => self.context,
            AtomKey::Goal => self.goal,
            AtomKey::Process => self.process,
            AtomKey::Format => self.format,
        }
    }

    /// Context and goal were both found.
    pub fn is_complete(&self) -> bool {
        self.context && self.goal
    }

    pub fn grade(&self) -> Grade {
        match self.score {
            70.. => Grade::Strong,
            40.. => Grade::Partial,
            _ => Grade::Weak,
        }
    }
}

/// Validate free-form prompt text.
pub fn validate(text: &str) -> ValidationReport {
    let words = normalize(text);
    let found = |key: AtomKey| has_marker(text, key) || has_keyword(&words, key);

    let mut report = ValidationReport {
        role: found(AtomKey::Role),
        context: found(AtomKey::Context),
        goal: found(AtomKey::Goal),
        process: found(AtomKey::Process),
        format: found(AtomKey::Format),
        score: 0,
        tips: Vec::new(),
    };

    let mut score = 0u8;
    for key in AtomKey::ALL {
        if report.get(key) {
            score += POINTS_PER_ATOM;
        } else {
            report.tips.push(tip(key));
        }
    }
    report.score = score;

    tracing::debug!(score, complete = report.is_complete(), "Prompt validated");
    report
}

fn tip(key: AtomKey) -> String {
    let meta = key.meta();
    let required = if key.is_required() { " (required)" } else { "" };
    format!(
        "Add {}{required}: {} {}",
        meta.label, meta.question, meta.description
    )
}

/// `LABEL:` at the start of a line, or a markdown heading naming the atom.
fn has_marker(text: &str, key: AtomKey) -> bool {
    let name = key.as_str();
    text.lines().any(|line| {
        let line = line.trim_start();
        let heading = line.starts_with('#');
        let line = line.trim_start_matches('#').trim().to_lowercase();
        match line.strip_prefix(name) {
            Some(rest) => rest.starts_with(':') || (heading && rest.trim().is_empty()),
            None => false,
        }
    })
}

/// Lowercase words separated by single spaces, padded on both ends.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        out.push_str(&word.to_lowercase());
        out.push(' ');
    }
    out
}

fn has_keyword(words: &str, key: AtomKey) -> bool {
    keywords(key)
        .iter()
        .any(|kw| words.contains(&format!(" {kw} ")))
}
