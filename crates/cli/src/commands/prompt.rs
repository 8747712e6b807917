//! `aether validate`, `aether forge`, `aether atoms` and `aether levels`.

use aether_agent::Grade;
use aether_core::atom::{AtomKey, COMPLEXITY_LEVELS};

use super::AtomArgs;

pub fn validate(text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = aether_agent::validate(text);

    let grade = match report.grade() {
        Grade::Strong => "strong",
        Grade::Partial => "partial",
        Grade::Weak => "weak",
    };
    println!("Prompt score: {}/100 ({grade})", report.score);
    println!();
    for key in AtomKey::ALL {
        let mark = if report.get(key) { "[x]" } else { "[ ]" };
        println!("  {mark} {} {}", key.meta().icon, key.label());
    }
    if !report.tips.is_empty() {
        println!();
        println!("Tips:");
        for tip in &report.tips {
            println!("  - {tip}");
        }
    }
    if !report.is_complete() {
        return Err("Prompt is missing CONTEXT or GOAL".into());
    }
    Ok(())
}

pub fn forge(atoms: AtomArgs) -> Result<(), Box<dyn std::error::Error>> {
    let prompt = aether_agent::forge(&atoms.into_atom_set())?;
    println!("{prompt}");
    Ok(())
}

pub fn atoms() {
    for key in AtomKey::ALL {
        let meta = key.meta();
        let required = if key.is_required() { " (required)" } else { "" };
        println!("{} {}{required}", meta.icon, meta.label);
        println!("   {}", meta.question);
        println!("   {}", meta.description);
        println!();
    }
}

pub fn levels() {
    for level in &COMPLEXITY_LEVELS {
        println!("{}. {}", level.level, level.name);
        println!("   {}", level.description);
        println!("   Use:     {}", level.use_case);
        println!("   Example: {}", level.example);
        println!();
    }
}
