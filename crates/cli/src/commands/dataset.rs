//! `aether export`, `aether stats` and `aether rate`: record store tooling.

use std::path::PathBuf;

use aether_core::message::Speaker;
use aether_core::record::{FeedbackRecord, RecordQuery, RecordStore, TurnRecord};
use aether_dataset::{build_dataset, dashboard_stats, export_file_name, write_export};

use super::load_config;

pub async fn export(
    output: Option<PathBuf>,
    session: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let store = aether_memory::open_store(&config.store).await?;

    let query = match &session {
        Some(id) => RecordQuery::session(id.clone()),
        None => RecordQuery::all(),
    };
    let examples = build_dataset(store.as_ref(), &query).await?;

    let path = output
        .unwrap_or_else(|| PathBuf::from(export_file_name(chrono::Utc::now().date_naive())));
    write_export(&path, &examples)?;

    let complete = examples.iter().filter(|e| e.is_complete()).count();
    println!("Dataset exported");
    println!("   File:      {}", path.display());
    println!("   Examples:  {}", examples.len());
    println!("   Rated:     {complete}");
    if let Some(id) = session {
        println!("   Session:   {id}");
    }
    Ok(())
}

pub async fn stats() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let store = aether_memory::open_store(&config.store).await?;
    let stats = dashboard_stats(store.as_ref()).await?;

    println!("Record Store Statistics");
    println!("=======================");
    println!("  Backend:   {}", store.name());
    println!("  Location:  {}", config.store.resolved_path().display());
    println!("  Users:     {}", stats.total_users);
    println!("  Sessions:  {}", stats.total_sessions);
    println!("  Turns:     {}", stats.total_turns);
    println!("  Feedback:  {}", stats.total_feedback);
    Ok(())
}

pub async fn rate(
    turn_id: String,
    rating: u8,
    preferred: Option<String>,
    kind: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let store = aether_memory::open_store(&config.store).await?;

    let turns = store.turns(&RecordQuery::all()).await?;
    ensure_rateable(&turns, &turn_id)?;

    let mut feedback = FeedbackRecord::new(turn_id, rating, kind);
    if let Some(text) = preferred {
        feedback = feedback.with_preferred(text);
    }
    let id = store.append_feedback(feedback).await?;

    println!("Feedback recorded ({id})");
    Ok(())
}

/// Feedback only joins an assistant turn, so refuse anything else.
fn ensure_rateable(turns: &[TurnRecord], turn_id: &str) -> Result<(), String> {
    match turns.iter().find(|t| t.id == turn_id) {
        None => Err(format!("No turn with id {turn_id}")),
        Some(turn) if turn.role != Speaker::Assistant => Err(format!(
            "Turn {turn_id} is a {} turn; only assistant replies can be rated",
            turn.role
        )),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns() -> Vec<TurnRecord> {
        vec![
            TurnRecord::new(Speaker::User, "What is Raft?", "s1", "u1"),
            TurnRecord::new(Speaker::Assistant, "A consensus protocol.", "s1", "u1"),
        ]
    }

    #[test]
    fn assistant_turn_is_rateable() {
        let turns = turns();
        assert!(ensure_rateable(&turns, &turns[1].id).is_ok());
    }

    #[test]
    fn user_turn_is_refused() {
        let turns = turns();
        let err = ensure_rateable(&turns, &turns[0].id).unwrap_err();
        assert!(err.contains("only assistant replies"));
    }

    #[test]
    fn unknown_turn_is_refused() {
        let err = ensure_rateable(&turns(), "missing").unwrap_err();
        assert!(err.contains("No turn with id missing"));
    }
}
