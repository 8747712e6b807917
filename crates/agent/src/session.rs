//! Chat session: the submit flow from typed message to recorded turns.
//!
//! A session owns the display history, the current atom set and memories.
//! Each [`ChatSession::submit`] validates, sends the request through a
//! [`ChatTransport`], accumulates the streamed reply and records the turns.
//! Failures degrade to the fallback message; only complete answers are
//! persisted.

use crate::context::HISTORY_WINDOW;
use aether_core::atom::{AtomKey, AtomSet};
use aether_core::error::PromptError;
use aether_core::message::{HistoryEntry, Speaker};
use aether_core::record::{RecordStore, TurnRecord};
use aether_providers::accumulator::{FALLBACK_MESSAGE, StreamOutcome, accumulate};
use aether_providers::chat_client::{ChatRequest, ChatTransport};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one submitted message.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub outcome: StreamOutcome,
    /// Id of the persisted user turn, when a store is attached and the write succeeded.
    pub user_turn_id: Option<String>,
    /// Id of the persisted assistant turn. Only complete answers get one.
    pub assistant_turn_id: Option<String>,
}

impl Exchange {
    /// What the operator should see for this exchange, if anything.
    pub fn reply(&self) -> Option<&str> {
        self.outcome.display_text()
    }
}

pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    store: Option<Arc<dyn RecordStore>>,
    session_id: String,
    user_id: String,
    user_email: Option<String>,
    history: Vec<HistoryEntry>,
    atoms: AtomSet,
    memories: Vec<String>,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            store: None,
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id: "local".into(),
            user_email: None,
            history: Vec::new(),
            atoms: AtomSet::default(),
            memories: Vec::new(),
        }
    }

    /// Record turns into `store` as they complete.
    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>, email: Option<String>) -> Self {
        self.user_id = user_id.into();
        self.user_email = email;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Every entry shown so far, including fallback replies.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn atoms(&self) -> &AtomSet {
        &self.atoms
    }

    pub fn set_atom(&mut self, key: AtomKey, value: impl Into<String>) {
        self.atoms.set(key, value);
    }

    pub fn set_atoms(&mut self, atoms: AtomSet) {
        self.atoms = atoms;
    }

    pub fn clear_atoms(&mut self) {
        self.atoms.clear();
    }

    pub fn add_memory(&mut self, memory: impl Into<String>) {
        self.memories.push(memory.into());
    }

    pub fn memories(&self) -> &[String] {
        &self.memories
    }

    /// The request that `submit(message)` would send right now.
    ///
    /// Atoms are attached only when at least one is non-blank, and then
    /// must satisfy the context/goal precondition.
    pub fn prepare(&self, message: &str) -> Result<ChatRequest, PromptError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(PromptError::EmptyMessage);
        }

        let start = self.history.len().saturating_sub(HISTORY_WINDOW);
        let mut request = ChatRequest::new(message)
            .with_history(self.history[start..].to_vec())
            .with_memories(self.memories.clone());

        if self.atoms.has_any() {
            self.atoms.ensure_submittable()?;
            request = request.with_atoms(self.atoms.clone());
        }
        Ok(request)
    }

    /// Send one message and wait for the full reply.
    ///
    /// `on_partial` receives the running answer after every delta. Only
    /// precondition violations are errors; transport failures come back as
    /// [`StreamOutcome::Failed`] with the fallback appended to the history.
    pub async fn submit(
        &mut self,
        message: &str,
        on_partial: impl FnMut(&str) + Send,
    ) -> Result<Exchange, PromptError> {
        let request = self.prepare(message)?;

        self.history.push(HistoryEntry::user(request.message.clone()));
        let user_turn_id = self.persist(Speaker::User, &request.message).await;

        debug!(session = %self.session_id, atoms = request.atoms.is_some(), "Submitting message");

        let outcome = match self.transport.send(&request).await {
            Ok(rx) => accumulate(rx, on_partial).await,
            Err(error) => {
                warn!(session = %self.session_id, error = %error, "Chat request failed");
                StreamOutcome::Failed {
                    error,
                    partial_chars: 0,
                }
            }
        };

        let assistant_turn_id = match &outcome {
            StreamOutcome::Complete(text) => {
                self.history.push(HistoryEntry::assistant(text.clone()));
                self.persist(Speaker::Assistant, text).await
            }
            StreamOutcome::Empty => {
                info!(session = %self.session_id, "Empty response, nothing recorded");
                None
            }
            StreamOutcome::Failed { .. } => {
                self.history.push(HistoryEntry::assistant(FALLBACK_MESSAGE));
                None
            }
        };

        Ok(Exchange {
            outcome,
            user_turn_id,
            assistant_turn_id,
        })
    }

    async fn persist(&self, role: Speaker, content: &str) -> Option<String> {
        let store = self.store.as_ref()?;
        let mut turn = TurnRecord::new(role, content, &self.session_id, &self.user_id);
        if let Some(email) = &self.user_email {
            turn = turn.with_email(email.clone());
        }
        match store.append_turn(turn).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(store = store.name(), error = %e, "Failed to record turn");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_core::error::ProviderError;
    use aether_core::record::RecordQuery;
    use aether_memory::InMemoryStore;
    use aether_providers::accumulator::DeltaReceiver;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a fixed script and remembers every request it saw.
    struct ScriptedTransport {
        script: Vec<Result<String, ProviderError>>,
        reject: bool,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedTransport {
        fn replying(deltas: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                script: deltas.iter().map(|d| Ok(d.to_string())).collect(),
                reject: false,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn with_script(script: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                script,
                reject: false,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn rejecting() -> Arc<Self> {
            Arc::new(Self {
                script: Vec::new(),
                reject: true,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn send(&self, request: &ChatRequest) -> Result<DeltaReceiver, ProviderError> {
            self.seen.lock().unwrap().push(request.clone());
            if self.reject {
                return Err(ProviderError::ApiError {
                    status_code: 500,
                    message: "boom".into(),
                });
            }
            let (tx, rx) = tokio::sync::mpsc::channel(self.script.len().max(1));
            for item in &self.script {
                tx.send(item.clone()).await.unwrap();
            }
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn complete_reply_is_shown_and_recorded() {
        let transport = ScriptedTransport::replying(&["Hel", "lo"]);
        let store = Arc::new(InMemoryStore::new());
        let mut session = ChatSession::new(transport.clone())
            .with_store(store.clone())
            .with_user("u1", Some("a@b.c".into()));

        let mut partials = Vec::new();
        let exchange = session
            .submit("  hi there ", |p| partials.push(p.to_string()))
            .await
            .unwrap();

        assert_eq!(partials, vec!["Hel", "Hello"]);
        assert_eq!(exchange.reply(), Some("Hello"));
        assert!(exchange.user_turn_id.is_some());
        assert!(exchange.assistant_turn_id.is_some());
        assert_eq!(
            session.history(),
            &[HistoryEntry::user("hi there"), HistoryEntry::assistant("Hello")]
        );

        let turns = store.turns(&RecordQuery::all()).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].role, Speaker::Assistant);
        assert_eq!(turns[1].user_email.as_deref(), Some("a@b.c"));
        assert_eq!(turns[0].session_id, session.session_id());

        let sent = transport.requests();
        assert_eq!(sent[0].message, "hi there");
        assert!(sent[0].history.is_empty());
        assert!(sent[0].atoms.is_none());
    }

    #[tokio::test]
    async fn incomplete_atoms_block_the_request() {
        let transport = ScriptedTransport::replying(&["never"]);
        let mut session = ChatSession::new(transport.clone());
        session.set_atom(AtomKey::Role, "editor");
        session.set_atom(AtomKey::Goal, "tighten prose");

        let err = session.submit("go", |_| {}).await.unwrap_err();
        assert_eq!(
            err,
            PromptError::IncompleteAtoms {
                missing: vec!["context"]
            }
        );
        assert!(transport.requests().is_empty());
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn complete_atoms_are_attached() {
        let transport = ScriptedTransport::replying(&["ok"]);
        let mut session = ChatSession::new(transport.clone());
        session.set_atom(AtomKey::Context, "release week");
        session.set_atom(AtomKey::Goal, "write notes");

        session.submit("go", |_| {}).await.unwrap();
        let sent = transport.requests();
        assert_eq!(sent[0].atoms.as_ref().unwrap().goal, "write notes");
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let mut session = ChatSession::new(ScriptedTransport::replying(&[]));
        let err = session.submit(" \n ", |_| {}).await.unwrap_err();
        assert_eq!(err, PromptError::EmptyMessage);
    }

    #[tokio::test]
    async fn empty_reply_adds_no_assistant_turn() {
        let store = Arc::new(InMemoryStore::new());
        let mut session =
            ChatSession::new(ScriptedTransport::replying(&[])).with_store(store.clone());

        let exchange = session.submit("hello?", |_| {}).await.unwrap();
        assert!(matches!(exchange.outcome, StreamOutcome::Empty));
        assert_eq!(exchange.reply(), None);
        assert_eq!(session.history().len(), 1);
        assert_eq!(store.turns(&RecordQuery::all()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transport_failure_shows_fallback_but_records_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let transport = ScriptedTransport::with_script(vec![
            Ok("half an ans".into()),
            Err(ProviderError::StreamInterrupted("reset".into())),
        ]);
        let mut session = ChatSession::new(transport).with_store(store.clone());

        let exchange = session.submit("question", |_| {}).await.unwrap();
        assert_eq!(exchange.reply(), Some(FALLBACK_MESSAGE));
        assert!(exchange.assistant_turn_id.is_none());
        assert_eq!(
            session.history().last(),
            Some(&HistoryEntry::assistant(FALLBACK_MESSAGE))
        );

        let turns = store.turns(&RecordQuery::all()).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Speaker::User);
    }

    #[tokio::test]
    async fn rejected_request_falls_back() {
        let mut session = ChatSession::new(ScriptedTransport::rejecting());
        let exchange = session.submit("hi", |_| {}).await.unwrap();
        assert!(exchange.outcome.is_failed());
        assert_eq!(exchange.reply(), Some(FALLBACK_MESSAGE));
    }

    #[tokio::test]
    async fn request_history_is_windowed() {
        let transport = ScriptedTransport::replying(&["r"]);
        let mut session = ChatSession::new(transport.clone());
        for i in 0..15 {
            session.submit(&format!("m{i}"), |_| {}).await.unwrap();
        }
        let sent = transport.requests();
        let last = sent.last().unwrap();
        assert_eq!(session.history().len(), 30);
        assert_eq!(last.history.len(), HISTORY_WINDOW);
        assert_eq!(last.history.last().unwrap(), &HistoryEntry::assistant("r"));
        assert_eq!(last.history[0], HistoryEntry::user("m4"));
    }

    #[tokio::test]
    async fn memories_travel_with_request() {
        let transport = ScriptedTransport::replying(&["ok"]);
        let mut session = ChatSession::new(transport.clone());
        session.add_memory("Prefers short answers");
        session.submit("hi", |_| {}).await.unwrap();
        assert_eq!(transport.requests()[0].memories, vec!["Prefers short answers"]);
    }
}
