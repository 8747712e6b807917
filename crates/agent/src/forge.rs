//! Prompt forge: renders an atom set as one structured prompt document.

use aether_core::atom::AtomSet;
use aether_core::error::PromptError;

/// Render every non-blank atom as a `## LABEL` block, in canonical order.
///
/// Fails when `context` or `goal` is blank, the same precondition that
/// guards chat submission.
pub fn forge(atoms: &AtomSet) -> Result<String, PromptError> {
    atoms.ensure_submittable()?;

    let blocks: Vec<String> = atoms
        .present()
        .map(|(key, value)| format!("## {}\n{}", key.label(), value.trim()))
        .collect();

    Ok(blocks.join("\n\n"))
}
