/// Chat session state machine.
///
/// Owns the transcript and connection status and orchestrates the token
/// source and the agent session client. Headless by design — the TUI and
/// one-shot mode drive it, and the tests drive it with mocks.
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::agent::AgentSession;
use crate::auth::TokenSource;
use crate::config::AgentConfig;
use crate::error::ChatError;

// ── Messages ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One transcript entry. Immutable once created; the transcript is
/// append-only and insertion order is display order.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// What became of a send request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Round trip completed; the reply (or filler) was appended.
    Delivered,
    /// Blank text, not connected, or no session client — nothing happened.
    Ignored,
    /// Another send holds the in-flight slot.
    Busy,
}

/// Builds a fresh agent session bound to one configuration. Injected so
/// tests substitute mocks and the app substitutes the Copilot Studio client.
pub type SessionFactory = Box<dyn Fn(&AgentConfig) -> Arc<dyn AgentSession> + Send + Sync>;

// ── State machine ─────────────────────────────────────────────────────────────

pub struct ChatSession {
    config: AgentConfig,
    status: SessionStatus,
    messages: Vec<Message>,
    tokens: Arc<dyn TokenSource>,
    factory: SessionFactory,
    agent: Option<Arc<dyn AgentSession>>,
    /// Conversation handle reported by the agent; exists only while connected.
    conversation_id: Option<String>,
    /// Single-slot in-flight guard: held for the duration of one send,
    /// overlapping attempts are rejected rather than queued.
    send_in_flight: bool,
    next_id: u64,
}

impl ChatSession {
    pub fn new(config: AgentConfig, tokens: Arc<dyn TokenSource>, factory: SessionFactory) -> Self {
        Self {
            config,
            status: SessionStatus::Disconnected,
            messages: Vec::new(),
            tokens,
            factory,
            agent: None,
            conversation_id: None,
            send_in_flight: false,
            next_id: 0,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Replace the configuration. Only honored while disconnected — the four
    /// values are frozen for the lifetime of a connection.
    pub fn set_config(&mut self, config: AgentConfig) {
        if self.status == SessionStatus::Disconnected {
            self.config = config;
        }
    }

    /// Validate, acquire a token, open a conversation. On success the
    /// transcript is seeded with the greeting when the agent offers one; on
    /// any failure the session is back where it started.
    pub async fn connect(&mut self) -> Result<(), ChatError> {
        let missing = self.config.missing_fields();
        if !missing.is_empty() {
            return Err(ChatError::Validation(missing.join(", ")));
        }

        self.status = SessionStatus::Connecting;
        let agent = (self.factory)(&self.config);
        let result = async {
            let token = self.tokens.access_token(&self.config).await?;
            agent
                .start(&token)
                .await
                .map_err(|e| ChatError::SessionInit(e.to_string()))
        }
        .await;

        match result {
            Ok(reply) => {
                self.agent = Some(agent);
                self.status = SessionStatus::Connected;
                self.conversation_id = reply.conversation_id;
                if !reply.content.is_empty() {
                    self.push(Role::Assistant, reply.content);
                }
                Ok(())
            }
            Err(e) => {
                self.agent = None;
                self.status = SessionStatus::Disconnected;
                Err(e)
            }
        }
    }

    /// Forward one message. A fresh token is requested for every send; the
    /// user message is appended before the network round trip and is kept
    /// even when delivery fails.
    pub async fn send(&mut self, text: &str) -> Result<SendOutcome, ChatError> {
        if text.trim().is_empty() || self.status != SessionStatus::Connected {
            return Ok(SendOutcome::Ignored);
        }
        let Some(agent) = self.agent.clone() else {
            return Ok(SendOutcome::Ignored);
        };
        if self.send_in_flight {
            return Ok(SendOutcome::Busy);
        }
        self.send_in_flight = true;
        self.push(Role::User, text.to_string());

        let result = async {
            let token = self.tokens.access_token(&self.config).await?;
            agent
                .send(text, &token)
                .await
                .map_err(|e| ChatError::Send(e.to_string()))
        }
        .await;
        self.send_in_flight = false;

        match result {
            Ok(reply) => {
                if reply.conversation_id.is_some() {
                    self.conversation_id = reply.conversation_id;
                }
                if !reply.content.is_empty() {
                    self.push(Role::Assistant, reply.content);
                }
                Ok(SendOutcome::Delivered)
            }
            Err(e) => Err(e),
        }
    }

    /// Unconditional and idempotent: drops the session client, transcript,
    /// and in-flight slot in one step.
    pub fn disconnect(&mut self) {
        self.status = SessionStatus::Disconnected;
        self.agent = None;
        self.conversation_id = None;
        self.messages.clear();
        self.send_in_flight = false;
    }

    fn push(&mut self, role: Role, content: String) {
        self.next_id += 1;
        self.messages.push(Message {
            id: format!("{}-{}", role.as_str(), self.next_id),
            content,
            role,
            timestamp: Utc::now(),
        });
    }

    #[cfg(test)]
    fn occupy_send_slot(&mut self) {
        self.send_in_flight = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentReply;
    use crate::error::AuthError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ── Mocks ─────────────────────────────────────────────────────────────────

    struct FixedTokens {
        calls: AtomicUsize,
    }

    impl FixedTokens {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenSource for FixedTokens {
        async fn access_token(&self, _config: &AgentConfig) -> Result<String, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("T1".to_string())
        }
    }

    struct RejectingTokens;

    #[async_trait]
    impl TokenSource for RejectingTokens {
        async fn access_token(&self, _config: &AgentConfig) -> Result<String, AuthError> {
            Err(AuthError::classify("consent_required", "admin consent needed"))
        }
    }

    struct ScriptedAgent {
        greeting: &'static str,
        reply: &'static str,
        fail_sends: bool,
        sent: Mutex<Vec<String>>,
    }

    impl ScriptedAgent {
        fn new(greeting: &'static str, reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                greeting,
                reply,
                fail_sends: false,
                sent: Mutex::new(Vec::new()),
            })
        }

        fn failing(greeting: &'static str) -> Arc<Self> {
            Arc::new(Self {
                greeting,
                reply: "",
                fail_sends: true,
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AgentSession for ScriptedAgent {
        async fn start(&self, token: &str) -> anyhow::Result<AgentReply> {
            assert_eq!(token, "T1");
            Ok(AgentReply {
                content: self.greeting.to_string(),
                conversation_id: Some("conv-1".to_string()),
            })
        }

        async fn send(&self, text: &str, token: &str) -> anyhow::Result<AgentReply> {
            assert_eq!(token, "T1");
            self.sent.lock().unwrap().push(text.to_string());
            if self.fail_sends {
                anyhow::bail!("wire dropped");
            }
            Ok(AgentReply {
                content: self.reply.to_string(),
                conversation_id: Some("conv-1".to_string()),
            })
        }
    }

    fn complete_config() -> AgentConfig {
        AgentConfig {
            environment_id: "env-1".to_string(),
            agent_id: "cr123_agent".to_string(),
            tenant_id: "tenant-1".to_string(),
            client_id: "client-1".to_string(),
        }
    }

    fn session_with(
        config: AgentConfig,
        tokens: Arc<dyn TokenSource>,
        agent: Arc<ScriptedAgent>,
    ) -> ChatSession {
        ChatSession::new(config, tokens, Box::new(move |_| agent.clone()))
    }

    // ── Connect ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn missing_field_fails_validation_before_any_network() {
        let tokens = FixedTokens::new();
        let agent = ScriptedAgent::new("Hi there", "Hi back");
        let mut config = complete_config();
        config.tenant_id.clear();
        let mut session = session_with(config, tokens.clone(), agent.clone());

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
        assert_eq!(session.status(), SessionStatus::Disconnected);
        assert_eq!(tokens.calls(), 0);
        assert!(agent.sent().is_empty());
    }

    #[tokio::test]
    async fn connect_seeds_exactly_one_greeting() {
        let mut session = session_with(
            complete_config(),
            FixedTokens::new(),
            ScriptedAgent::new("Hi there", "Hi back"),
        );
        session.connect().await.unwrap();
        assert_eq!(session.status(), SessionStatus::Connected);
        assert_eq!(session.conversation_id(), Some("conv-1"));
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].role, Role::Assistant);
        assert_eq!(session.messages()[0].content, "Hi there");
    }

    #[tokio::test]
    async fn empty_greeting_seeds_nothing() {
        let mut session = session_with(
            complete_config(),
            FixedTokens::new(),
            ScriptedAgent::new("", "Hi back"),
        );
        session.connect().await.unwrap();
        assert_eq!(session.status(), SessionStatus::Connected);
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn auth_failure_returns_to_disconnected() {
        let mut session = session_with(
            complete_config(),
            Arc::new(RejectingTokens),
            ScriptedAgent::new("Hi there", "Hi back"),
        );
        let err = session.connect().await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(err.class(), "consent_required");
        assert_eq!(session.status(), SessionStatus::Disconnected);
        assert!(session.messages().is_empty());
    }

    // ── Send ──────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn blank_sends_are_no_ops() {
        let tokens = FixedTokens::new();
        let agent = ScriptedAgent::new("Hi there", "Hi back");
        let mut session = session_with(complete_config(), tokens.clone(), agent.clone());
        session.connect().await.unwrap();
        let calls_after_connect = tokens.calls();

        assert_eq!(session.send("").await.unwrap(), SendOutcome::Ignored);
        assert_eq!(session.send("   ").await.unwrap(), SendOutcome::Ignored);
        assert_eq!(session.messages().len(), 1);
        assert_eq!(tokens.calls(), calls_after_connect);
        assert!(agent.sent().is_empty());
    }

    #[tokio::test]
    async fn send_before_connect_is_a_no_op() {
        let agent = ScriptedAgent::new("Hi there", "Hi back");
        let mut session = session_with(complete_config(), FixedTokens::new(), agent.clone());
        assert_eq!(session.send("hello").await.unwrap(), SendOutcome::Ignored);
        assert!(session.messages().is_empty());
        assert!(agent.sent().is_empty());
    }

    #[tokio::test]
    async fn overlapping_send_is_rejected_not_queued() {
        let agent = ScriptedAgent::new("Hi there", "Hi back");
        let mut session = session_with(complete_config(), FixedTokens::new(), agent.clone());
        session.connect().await.unwrap();

        session.occupy_send_slot();
        assert_eq!(session.send("hello").await.unwrap(), SendOutcome::Busy);
        assert_eq!(session.messages().len(), 1);
        assert!(agent.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_send_keeps_the_optimistic_user_message() {
        let agent = ScriptedAgent::failing("Hi there");
        let mut session = session_with(complete_config(), FixedTokens::new(), agent.clone());
        session.connect().await.unwrap();

        let err = session.send("hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Send(_)));
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].role, Role::User);
        assert_eq!(session.messages()[1].content, "hello");

        // The slot is released — the next send goes through to the wire.
        let _ = session.send("again").await;
        assert_eq!(agent.sent(), vec!["hello", "again"]);
    }

    #[tokio::test]
    async fn each_send_requests_a_fresh_token() {
        let tokens = FixedTokens::new();
        let agent = ScriptedAgent::new("", "ok");
        let mut session = session_with(complete_config(), tokens.clone(), agent);
        session.connect().await.unwrap();
        session.send("one").await.unwrap();
        session.send("two").await.unwrap();
        assert_eq!(tokens.calls(), 3); // connect + two sends
    }

    // ── Disconnect ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn disconnect_clears_everything_idempotently() {
        let mut session = session_with(
            complete_config(),
            FixedTokens::new(),
            ScriptedAgent::new("Hi there", "Hi back"),
        );
        session.connect().await.unwrap();
        session.send("hello").await.unwrap();
        assert!(!session.messages().is_empty());

        session.disconnect();
        assert_eq!(session.status(), SessionStatus::Disconnected);
        assert_eq!(session.conversation_id(), None);
        assert!(session.messages().is_empty());

        session.disconnect();
        assert_eq!(session.status(), SessionStatus::Disconnected);
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn config_is_frozen_while_connected() {
        let mut session = session_with(
            complete_config(),
            FixedTokens::new(),
            ScriptedAgent::new("Hi there", "Hi back"),
        );
        session.connect().await.unwrap();

        let mut changed = complete_config();
        changed.environment_id = "other-env".to_string();
        session.set_config(changed.clone());
        assert_eq!(session.config().environment_id, "env-1");

        session.disconnect();
        session.set_config(changed);
        assert_eq!(session.config().environment_id, "other-env");
    }

    // ── End to end ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn full_conversation_flow() {
        let agent = ScriptedAgent::new("Hi there", "Hi back");
        let mut session = session_with(complete_config(), FixedTokens::new(), agent.clone());

        session.connect().await.unwrap();
        assert_eq!(
            session.send("Hello").await.unwrap(),
            SendOutcome::Delivered
        );

        let transcript: Vec<(Role, &str)> = session
            .messages()
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            transcript,
            vec![
                (Role::Assistant, "Hi there"),
                (Role::User, "Hello"),
                (Role::Assistant, "Hi back"),
            ]
        );
        assert_eq!(agent.sent(), vec!["Hello"]);

        // Ids are unique and ordering is stable.
        let mut ids: Vec<&str> = session.messages().iter().map(|m| m.id.as_str()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }
}
