pub mod chat;
pub mod dataset;
pub mod onboard;
pub mod prompt;
pub mod serve;

use aether_config::AppConfig;
use aether_core::atom::{AtomKey, AtomSet};

/// Atom flags shared by `chat` and `forge`.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct AtomArgs {
    /// Who the model should be
    #[arg(long)]
    pub role: Option<String>,

    /// Background the model needs (required with any atom)
    #[arg(long)]
    pub context: Option<String>,

    /// What the answer must achieve (required with any atom)
    #[arg(long)]
    pub goal: Option<String>,

    /// Steps or method to follow
    #[arg(long)]
    pub process: Option<String>,

    /// Shape of the answer
    #[arg(long)]
    pub format: Option<String>,
}

impl AtomArgs {
    pub fn into_atom_set(self) -> AtomSet {
        let mut atoms = AtomSet::new();
        let fields = [
            (AtomKey::Role, self.role),
            (AtomKey::Context, self.context),
            (AtomKey::Goal, self.goal),
            (AtomKey::Process, self.process),
            (AtomKey::Format, self.format),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                atoms.set(key, value);
            }
        }
        atoms
    }
}

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}
