//! `aether chat`: interactive or single-message chat through the gateway.

use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use aether_agent::ChatSession;
use aether_core::atom::AtomKey;
use aether_providers::{ChatClient, StreamOutcome};

use super::{AtomArgs, load_config};

pub async fn run(
    message: Option<String>,
    atoms: AtomArgs,
    memories: Vec<String>,
    session_id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let client = ChatClient::from_config(&config);
    tracing::debug!(endpoint = %client.endpoint(), "Chat client ready");

    let mut session = ChatSession::new(Arc::new(client))
        .with_user(config.chat.user_id.clone(), config.chat.user_email.clone());
    if let Some(id) = session_id {
        session = session.with_session_id(id);
    }
    if config.chat.record_turns {
        let store = aether_memory::open_store(&config.store).await?;
        session = session.with_store(store);
    }
    session.set_atoms(atoms.into_atom_set());
    for memory in memories {
        session.add_memory(memory);
    }

    if let Some(msg) = message {
        submit_and_print(&mut session, &msg, "").await?;
        return Ok(());
    }

    println!();
    println!("  Aether: interactive chat");
    println!();
    println!("  Gateway:  {}", config.chat.gateway_url);
    println!("  Session:  {}", session.session_id());
    println!();
    println!("  /atom <key> <text>   set a prompt atom");
    println!("  /atoms               show the active atoms");
    println!("  /clear               clear all atoms");
    println!("  /memory <text>       add a memory");
    println!("  exit                 quit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            "/atoms" => print_atoms(&session),
            "/clear" => {
                session.clear_atoms();
                println!("  Atoms cleared.");
            }
            _ if line.starts_with("/atom ") => set_atom(&mut session, &line["/atom ".len()..]),
            _ if line.starts_with("/memory ") => {
                session.add_memory(line["/memory ".len()..].trim());
                println!("  Memory added ({} total).", session.memories().len());
            }
            _ => {
                if let Err(e) = submit_and_print(&mut session, line, "  Assistant > ").await {
                    eprintln!("  [Error] {e}");
                }
            }
        }
        println!();
    }

    println!();
    println!("  Session {} closed.", session.session_id());
    Ok(())
}

/// Submit one message, echoing the answer as it streams.
async fn submit_and_print(
    session: &mut ChatSession,
    message: &str,
    prefix: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    print!("{prefix}");
    std::io::stdout().flush()?;

    let mut printed = 0usize;
    let exchange = session
        .submit(message, |running: &str| {
            let mut out = std::io::stdout();
            let _ = write!(out, "{}", &running[printed..]);
            let _ = out.flush();
            printed = running.len();
        })
        .await?;

    match &exchange.outcome {
        StreamOutcome::Complete(_) => println!(),
        other => {
            if printed > 0 {
                println!();
            }
            if let Some(text) = other.display_text() {
                println!("{prefix}{text}");
            }
        }
    }
    if let Some(id) = &exchange.assistant_turn_id {
        eprintln!("  (turn {id})");
    }
    Ok(())
}

fn set_atom(session: &mut ChatSession, args: &str) {
    let (key, text) = args.trim().split_once(' ').unwrap_or((args.trim(), ""));
    match key.parse::<AtomKey>() {
        Ok(key) => {
            session.set_atom(key, text.trim());
            println!("  {} set.", key.label());
        }
        Err(e) => eprintln!("  [Error] {e}"),
    }
}

fn print_atoms(session: &ChatSession) {
    let atoms = session.atoms();
    for key in AtomKey::ALL {
        let marker = if key.is_required() { "*" } else { " " };
        let value = atoms.get(key);
        let shown = if value.trim().is_empty() { "-" } else { value };
        println!("  {marker}{:<8} {shown}", key.label());
    }
    if atoms.has_any() && !atoms.is_submittable() {
        let missing: Vec<&str> = atoms.missing_required().iter().map(|k| k.label()).collect();
        println!("  Missing: {}", missing.join(", "));
    }
}
